//! Map review-comment anchors onto live buffer lines.
//!
//! A review comment is anchored to a diff-relative index in the base diff
//! (base commit → PR head). Translating that anchor to a line in the buffer
//! the user is editing takes two steps:
//!
//! 1. Resolve the anchor to a PR-head line number using the base diff.
//!    Anchors on deleted lines have no head line and are unmappable.
//! 2. Walk a second, zero-context diff (PR head → current buffer text) and
//!    shift the head line by the user's insertions and deletions.
//!
//! Both steps are linear in the size of their diff, so the full remap can
//! run on every buffer change without blocking anything.

use crate::model::FileDiff;
use similar::{ChangeTag, TextDiff};

/// Where a comment anchor lands in the live buffer.
///
/// Consumers must render `Approximate` and `Unmappable` differently from
/// `Exact` rather than treating a best-effort position as authoritative.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferLine {
    /// The anchored line is present, 1-based.
    Exact(u32),
    /// The anchored line sits inside a region the user rewrote; this is the
    /// closest position within that region.
    Approximate(u32),
    /// The anchored line no longer exists in the buffer.
    Unmappable,
}

impl BufferLine {
    /// The mapped line number, if any.
    pub fn line(&self) -> Option<u32> {
        match self {
            BufferLine::Exact(n) | BufferLine::Approximate(n) => Some(*n),
            BufferLine::Unmappable => None,
        }
    }

    /// Whether the anchor resolved to some buffer line.
    pub fn is_mapped(&self) -> bool {
        !matches!(self, BufferLine::Unmappable)
    }
}

/// One edited region of the PR-head → live-buffer diff.
///
/// Unlike a parsed [`crate::model::DiffChunk`], edit chunks carry no context
/// lines: `old_lines` and `new_lines` are exactly the removed and inserted
/// text. An insertion has empty `old_lines`, a deletion empty `new_lines`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditChunk {
    /// 1-based first head line covered (for pure insertions: the head line
    /// the new text was inserted before).
    pub old_start: u32,
    /// Head lines removed by the edit.
    pub old_lines: Vec<String>,
    /// 1-based first buffer line covered.
    pub new_start: u32,
    /// Buffer lines inserted by the edit.
    pub new_lines: Vec<String>,
}

/// Compute the zero-context edit chunks between the PR-head content and the
/// current buffer text.
pub fn edit_chunks(head: &str, buffer: &str) -> Vec<EditChunk> {
    let diff = TextDiff::from_lines(head, buffer);

    let mut chunks: Vec<EditChunk> = Vec::new();
    let mut current: Option<EditChunk> = None;
    // 0-based counts of old/new lines consumed so far.
    let mut old_pos = 0u32;
    let mut new_pos = 0u32;

    for change in diff.iter_all_changes() {
        match change.tag() {
            ChangeTag::Equal => {
                if let Some(chunk) = current.take() {
                    chunks.push(chunk);
                }
                old_pos += 1;
                new_pos += 1;
            }
            ChangeTag::Delete => {
                let chunk = current.get_or_insert_with(|| EditChunk {
                    old_start: old_pos + 1,
                    old_lines: Vec::new(),
                    new_start: new_pos + 1,
                    new_lines: Vec::new(),
                });
                chunk
                    .old_lines
                    .push(strip_newline(change.value()).to_string());
                old_pos += 1;
            }
            ChangeTag::Insert => {
                let chunk = current.get_or_insert_with(|| EditChunk {
                    old_start: old_pos + 1,
                    old_lines: Vec::new(),
                    new_start: new_pos + 1,
                    new_lines: Vec::new(),
                });
                chunk
                    .new_lines
                    .push(strip_newline(change.value()).to_string());
                new_pos += 1;
            }
        }
    }
    if let Some(chunk) = current.take() {
        chunks.push(chunk);
    }

    chunks
}

fn strip_newline(line: &str) -> &str {
    line.trim_end_matches('\n').trim_end_matches('\r')
}

/// Resolve a comment anchor to its PR-head line number.
///
/// Additions and context lines carry a new-side line number; anchors on
/// deleted lines return `None` — there is nothing in the head version to
/// point at.
pub fn anchor_to_head_line(file: &FileDiff, diff_index: u32) -> Option<u32> {
    file.line_at_index(diff_index).and_then(|line| line.new_line)
}

/// Translate a PR-head line number forward through the user's edits.
pub fn head_line_to_buffer(edits: &[EditChunk], head_line: u32) -> BufferLine {
    let mut delta = 0i64;

    for chunk in edits {
        let old_len = chunk.old_lines.len() as u32;
        let new_len = chunk.new_lines.len() as u32;

        if head_line < chunk.old_start {
            // Before this (and every later) edit; only earlier deltas apply.
            break;
        }

        if head_line < chunk.old_start + old_len {
            // Inside an edited region.
            let offset = (head_line - chunk.old_start) as usize;
            let content = &chunk.old_lines[offset];
            if let Some(pos) = chunk.new_lines.iter().position(|l| l == content) {
                // The exact text survived the rewrite (e.g. a duplicated
                // line the diff attributed to the replaced region).
                return BufferLine::Exact(chunk.new_start + pos as u32);
            }
            if new_len == 0 {
                return BufferLine::Unmappable;
            }
            let clamped = offset.min(new_len as usize - 1) as u32;
            return BufferLine::Approximate(chunk.new_start + clamped);
        }

        delta += i64::from(new_len) - i64::from(old_len);
    }

    let mapped = i64::from(head_line) + delta;
    debug_assert!(mapped >= 1, "head line {head_line} mapped below 1");
    BufferLine::Exact(mapped as u32)
}

/// Map a comment anchor all the way to the live buffer.
pub fn map_anchor(file: &FileDiff, edits: &[EditChunk], diff_index: u32) -> BufferLine {
    match anchor_to_head_line(file, diff_index) {
        Some(head_line) => head_line_to_buffer(edits, head_line),
        None => BufferLine::Unmappable,
    }
}
