//! Parse unified diff format (as returned by the GitHub API).

use crate::model::{DiffChunk, DiffLine, FileDiff, FileStatus};
use thiserror::Error;
use unidiff::{Hunk as UnidiffHunk, PatchSet, PatchedFile};

/// Errors that can occur during diff parsing.
///
/// Callers treat any of these as "no diff available" for the affected file
/// and disable inline commenting; they are never propagated into a rendering
/// path.
#[derive(Debug, Error)]
pub enum DiffParseError {
    #[error("failed to parse diff: {0}")]
    ParseFailed(String),
    #[error("diff contains no files")]
    Empty,
    #[error("expected a single-file diff, found {0} files")]
    MultipleFiles(usize),
}

/// Parse a unified diff covering any number of files.
///
/// # Arguments
/// * `diff_text` - The unified diff text (GitHub `diff` media type or
///   `git diff` output)
pub fn parse_unified_diff(diff_text: &str) -> Result<Vec<FileDiff>, DiffParseError> {
    let mut patch_set = PatchSet::new();
    patch_set
        .parse(diff_text)
        .map_err(|e| DiffParseError::ParseFailed(e.to_string()))?;

    patch_set.files().iter().map(parse_patched_file).collect()
}

/// Parse diff text that must describe exactly one file.
///
/// This is the form the review session uses when it is handed a per-file
/// patch; anything else is rejected rather than silently taking the first
/// file.
pub fn parse_file_diff(diff_text: &str) -> Result<FileDiff, DiffParseError> {
    let mut files = parse_unified_diff(diff_text)?;
    match files.len() {
        0 => Err(DiffParseError::Empty),
        1 => Ok(files.remove(0)),
        n => Err(DiffParseError::MultipleFiles(n)),
    }
}

fn parse_patched_file(file: &PatchedFile) -> Result<FileDiff, DiffParseError> {
    let target = clean_path(&file.target_file);
    let source = clean_path(&file.source_file);

    let mut file_diff = FileDiff::new(&target);
    file_diff.status = determine_status(&source, &target);

    if source != target && !source.is_empty() && source != "/dev/null" {
        file_diff.old_path = Some(source);
    }

    // For deleted files the interesting path is the old one.
    if target == "/dev/null" || target.is_empty() {
        if let Some(old) = file_diff.old_path.take() {
            file_diff.path = old;
        }
    }

    // The diff-relative index counts lines below the file's first `@@`
    // header; every later hunk header consumes one index itself. This is
    // the GitHub review-comment "position" convention.
    let mut diff_index = 0u32;
    for (chunk_no, hunk) in file.hunks().iter().enumerate() {
        if chunk_no > 0 {
            diff_index += 1;
        }
        file_diff
            .chunks
            .push(parse_hunk(hunk, &mut diff_index)?);
    }

    file_diff.recalculate_stats();
    Ok(file_diff)
}

fn parse_hunk(hunk: &UnidiffHunk, diff_index: &mut u32) -> Result<DiffChunk, DiffParseError> {
    let mut parsed = DiffChunk::new(
        hunk.source_start as u32,
        hunk.source_length as u32,
        hunk.target_start as u32,
        hunk.target_length as u32,
    );

    if !hunk.section_header.is_empty() {
        parsed.section = Some(hunk.section_header.clone());
    }

    for line in hunk.lines() {
        *diff_index += 1;
        let content = line.value.to_string();
        let old_line = line.source_line_no.map(|n| n as u32);
        let new_line = line.target_line_no.map(|n| n as u32);

        let parsed_line = match line.line_type.as_str() {
            " " => {
                let (old, new) = match (old_line, new_line) {
                    (Some(o), Some(n)) => (o, n),
                    _ => {
                        return Err(DiffParseError::ParseFailed(format!(
                            "context line without line numbers: {content:?}"
                        )))
                    }
                };
                DiffLine::context(content, old, new, *diff_index)
            }
            "+" => {
                let new = new_line.ok_or_else(|| {
                    DiffParseError::ParseFailed(format!(
                        "addition without a new line number: {content:?}"
                    ))
                })?;
                DiffLine::addition(content, new, *diff_index)
            }
            "-" => {
                let old = old_line.ok_or_else(|| {
                    DiffParseError::ParseFailed(format!(
                        "deletion without an old line number: {content:?}"
                    ))
                })?;
                DiffLine::deletion(content, old, *diff_index)
            }
            // "\ No newline at end of file" occupies a diff index but is
            // not a line of either file version.
            "\\" => continue,
            other => {
                return Err(DiffParseError::ParseFailed(format!(
                    "unknown line type {other:?}"
                )))
            }
        };
        parsed.lines.push(parsed_line);
    }

    Ok(parsed)
}

fn determine_status(source: &str, target: &str) -> FileStatus {
    if source == "/dev/null" || source.is_empty() {
        FileStatus::Added
    } else if target == "/dev/null" || target.is_empty() {
        FileStatus::Deleted
    } else if source != target {
        FileStatus::Renamed
    } else {
        FileStatus::Modified
    }
}

/// Clean the path by removing a/b prefixes from git diff output.
fn clean_path(path: &str) -> String {
    let path = path.trim();

    if let Some(stripped) = path.strip_prefix("a/") {
        return stripped.to_string();
    }
    if let Some(stripped) = path.strip_prefix("b/") {
        return stripped.to_string();
    }

    path.to_string()
}
