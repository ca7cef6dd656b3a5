//! Error taxonomy for the review-session engine.
//!
//! Nothing in here is fatal to the host process: parsing and mapping
//! problems degrade a single file's inline comments, stale commits block
//! posting until resolved, and network failures leave prior state untouched
//! for the caller to retry.

use gh_review_diff::DiffParseError;
use thiserror::Error;

/// Errors surfaced by sessions, session files and the session manager.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The requested path is not part of the pull request's diff.
    #[error("file {0} is not part of the pull request diff")]
    FileNotInDiff(String),

    /// The local checkout no longer matches the commit the review positions
    /// refer to. Posting is blocked until a push or refresh realigns them.
    #[error("checkout {actual} does not match review head {expected}; push or refresh before commenting")]
    StaleCommit { expected: String, actual: String },

    /// The given diff position does not exist in the file's diff.
    #[error("position {0} does not exist in the file's diff")]
    PositionUnresolvable(u32),

    /// The referenced comment does not exist (or is still a local
    /// placeholder where a server-confirmed comment is required).
    #[error("comment {0} not found")]
    CommentNotFound(String),

    /// No pending review to submit or discard.
    #[error("no pending review to operate on")]
    NoPendingReview,

    /// A pending review already exists for this session.
    #[error("a pending review is already in progress")]
    ReviewAlreadyStarted,

    /// The pull request diff could not be parsed.
    #[error(transparent)]
    DiffParse(#[from] DiffParseError),

    /// A remote API call failed. Retrying is the caller's responsibility.
    #[error("review API request failed: {0}")]
    Api(#[from] anyhow::Error),
}
