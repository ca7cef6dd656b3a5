//! Review API data transfer objects
//!
//! These types represent the data returned from the review API.
//! They are intentionally separate from the session's domain models
//! to keep this crate pure and reusable.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A pull request from the review API, trimmed to what the session
/// engine needs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PullRequestInfo {
    /// PR number (e.g., 123)
    pub number: u64,

    /// PR title
    pub title: String,

    /// Author's login
    pub author: String,

    /// Base branch name (e.g., "main")
    pub base_branch: String,

    /// Base commit SHA (the target branch)
    pub base_sha: String,

    /// HEAD branch name (e.g., "feature/foo")
    pub head_branch: String,

    /// HEAD commit SHA (the PR branch)
    pub head_sha: String,

    /// PR URL for opening in browser
    pub html_url: String,

    /// When the PR was created
    pub created_at: DateTime<Utc>,

    /// When the PR was last updated
    pub updated_at: DateTime<Utc>,
}

/// A review comment on a pull request, as stored by the server.
///
/// `original_position` is the diff-relative index the comment was posted
/// against (the stable anchor); `position` is the server's recomputation
/// against the latest head and goes null when the comment is outdated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommentData {
    /// Server comment id
    pub id: u64,

    /// File path the comment is on
    pub path: String,

    /// Diff-relative index against the current head (null when outdated)
    pub position: Option<u32>,

    /// Diff-relative index against the commit the comment was posted on
    pub original_position: Option<u32>,

    /// HEAD SHA at the time the server last repositioned the comment
    pub commit_id: String,

    /// HEAD SHA the comment was originally posted against
    pub original_commit_id: String,

    /// Author's login
    pub author: String,

    /// Comment body (markdown)
    pub body: String,

    /// Id of the comment this replies to, for threaded conversations
    pub in_reply_to: Option<u64>,

    /// Id of the review this comment belongs to, if any
    pub review_id: Option<u64>,

    /// When the comment was created
    pub created_at: DateTime<Utc>,

    /// When the comment was last updated
    pub updated_at: DateTime<Utc>,
}

/// The verdict submitted with a review.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReviewVerdict {
    /// Approve the pull request.
    Approve,
    /// Request changes.
    RequestChanges,
    /// Just leave comments (neutral).
    Comment,
}

impl ReviewVerdict {
    /// Convert to the API's string representation.
    pub fn as_api_str(&self) -> &'static str {
        match self {
            ReviewVerdict::Approve => "APPROVE",
            ReviewVerdict::RequestChanges => "REQUEST_CHANGES",
            ReviewVerdict::Comment => "COMMENT",
        }
    }
}
