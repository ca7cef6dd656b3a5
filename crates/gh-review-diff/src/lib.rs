//! # gh-review-diff
//!
//! Diff model, unified-diff parsing and comment-anchor position mapping for
//! pull-request reviews.
//!
//! ## Design Principles
//!
//! This crate is pure data and algorithms — no async, no network, no editor
//! types. The session layer feeds it diff text and buffer snapshots and gets
//! back parsed chunks and mapped line numbers, which keeps the mapping logic
//! testable with nothing but strings.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use gh_review_diff::{parse_file_diff, edit_chunks, map_anchor, BufferLine};
//!
//! let file = parse_file_diff(diff_text)?;
//! let edits = edit_chunks(head_content, buffer_text);
//! match map_anchor(&file, &edits, comment_position) {
//!     BufferLine::Exact(line) => show_glyph_at(line),
//!     BufferLine::Approximate(line) => show_detached_glyph_at(line),
//!     BufferLine::Unmappable => hide_glyph(),
//! }
//! ```

pub mod mapper;
pub mod model;
pub mod parser;

pub use mapper::{anchor_to_head_line, edit_chunks, head_line_to_buffer, map_anchor};
pub use mapper::{BufferLine, EditChunk};
pub use model::{DiffChunk, DiffLine, FileDiff, FileStatus, LineKind};
pub use parser::{parse_file_diff, parse_unified_diff, DiffParseError};
