//! Review API trait definition
//!
//! This module defines the `ReviewApi` trait the session engine talks to.
//! Implementations can be direct (hitting the GitHub API) or fakes for
//! tests; the engine never assumes more than this surface.

use crate::types::{CommentData, PullRequestInfo, ReviewVerdict};
use async_trait::async_trait;

/// Remote review API boundary
///
/// Everything the review-session engine needs from the server, and nothing
/// more. Mutating calls return the authoritative server object so callers
/// can confirm optimistic local state.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync` to allow sharing across
/// async tasks and threads.
#[async_trait]
pub trait ReviewApi: Send + Sync {
    /// Resolve the authenticated user's login.
    ///
    /// Needed so locally-posted placeholder comments carry the author the
    /// server will report back.
    async fn current_user(&self) -> anyhow::Result<String>;

    /// Fetch a single pull request by number.
    ///
    /// # Arguments
    ///
    /// * `owner` - Repository owner (user or organization)
    /// * `repo` - Repository name
    /// * `number` - Pull request number
    async fn fetch_pull_request(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
    ) -> anyhow::Result<PullRequestInfo>;

    /// Fetch the unified diff for a pull request (base → head), covering
    /// every changed file.
    async fn fetch_diff(&self, owner: &str, repo: &str, number: u64) -> anyhow::Result<String>;

    /// Fetch all review comments (inline line comments) on a pull request.
    async fn fetch_review_comments(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
    ) -> anyhow::Result<Vec<CommentData>>;

    /// Fetch a file's content at a specific commit.
    ///
    /// # Arguments
    ///
    /// * `reference` - Commit SHA (or ref) to read at
    /// * `path` - File path relative to the repository root
    async fn fetch_file_content(
        &self,
        owner: &str,
        repo: &str,
        reference: &str,
        path: &str,
    ) -> anyhow::Result<String>;

    /// Create a review comment anchored at a diff position.
    ///
    /// When the authenticated user has a pending review on the pull
    /// request, the server attaches the comment to that draft; otherwise it
    /// is published immediately.
    ///
    /// # Arguments
    ///
    /// * `commit_id` - HEAD SHA the position refers to
    /// * `path` - File path relative to the repository root
    /// * `position` - Diff-relative index within the file's diff
    /// * `body` - Comment body (markdown)
    ///
    /// # Returns
    ///
    /// The created comment as stored by the server.
    #[allow(clippy::too_many_arguments)]
    async fn create_review_comment(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
        commit_id: &str,
        path: &str,
        position: u32,
        body: &str,
    ) -> anyhow::Result<CommentData>;

    /// Reply to an existing review comment, extending its thread.
    async fn create_reply(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
        in_reply_to: u64,
        body: &str,
    ) -> anyhow::Result<CommentData>;

    /// Delete a review comment.
    async fn delete_review_comment(
        &self,
        owner: &str,
        repo: &str,
        comment_id: u64,
    ) -> anyhow::Result<()>;

    /// Find the authenticated user's pending (draft) review on a pull
    /// request, if one exists.
    ///
    /// Drafts of other users are invisible to the API, so any pending
    /// review returned belongs to the authenticated user.
    async fn find_pending_review(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
    ) -> anyhow::Result<Option<u64>>;

    /// Start a pending (draft) review on a pull request.
    ///
    /// # Returns
    ///
    /// The server id of the pending review.
    async fn create_pending_review(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
    ) -> anyhow::Result<u64>;

    /// Submit a pending review, publishing its comments as one review
    /// event.
    async fn submit_pending_review(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
        review_id: u64,
        verdict: ReviewVerdict,
        body: Option<&str>,
    ) -> anyhow::Result<()>;

    /// Delete a pending review, discarding its draft comments.
    async fn delete_pending_review(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
        review_id: u64,
    ) -> anyhow::Result<()>;
}
