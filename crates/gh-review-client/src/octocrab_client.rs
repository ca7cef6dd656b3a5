//! Octocrab-based review API client
//!
//! Direct implementation of the `ReviewApi` trait against the GitHub REST
//! API. Typed octocrab calls are used where the typed surface covers the
//! endpoint; review-comment and pending-review routes go through raw
//! requests with local serde types.

use crate::client::ReviewApi;
use crate::types::{CommentData, PullRequestInfo, ReviewVerdict};
use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::debug;
use octocrab::Octocrab;
use serde::Deserialize;
use std::sync::Arc;

/// Direct GitHub review API client using octocrab
#[derive(Debug, Clone)]
pub struct OctocrabReviewApi {
    octocrab: Arc<Octocrab>,
}

impl OctocrabReviewApi {
    /// Create a new client with the given octocrab instance
    pub fn new(octocrab: Arc<Octocrab>) -> Self {
        Self { octocrab }
    }

    /// Get a reference to the underlying octocrab instance
    pub fn octocrab(&self) -> &Octocrab {
        &self.octocrab
    }
}

/// Review comment as returned by the REST API.
#[derive(Debug, Deserialize)]
struct RawReviewComment {
    id: u64,
    path: String,
    position: Option<u32>,
    original_position: Option<u32>,
    commit_id: String,
    original_commit_id: String,
    user: RawUser,
    body: String,
    in_reply_to_id: Option<u64>,
    pull_request_review_id: Option<u64>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct RawUser {
    login: String,
}

/// Review as returned by the REST API (only the fields we read).
#[derive(Debug, Deserialize)]
struct RawReview {
    id: u64,
    state: String,
}

fn convert_comment(raw: RawReviewComment) -> CommentData {
    CommentData {
        id: raw.id,
        path: raw.path,
        position: raw.position,
        original_position: raw.original_position,
        commit_id: raw.commit_id,
        original_commit_id: raw.original_commit_id,
        author: raw.user.login,
        body: raw.body,
        in_reply_to: raw.in_reply_to_id,
        review_id: raw.pull_request_review_id,
        created_at: raw.created_at,
        updated_at: raw.updated_at,
    }
}

#[async_trait]
impl ReviewApi for OctocrabReviewApi {
    async fn current_user(&self) -> anyhow::Result<String> {
        let user = self
            .octocrab
            .current()
            .user()
            .await
            .context("Failed to resolve authenticated user")?;
        Ok(user.login)
    }

    async fn fetch_pull_request(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
    ) -> anyhow::Result<PullRequestInfo> {
        debug!("Fetching PR {}/{}#{}", owner, repo, number);

        let pr = self.octocrab.pulls(owner, repo).get(number).await?;

        Ok(PullRequestInfo {
            number: pr.number,
            title: pr.title.clone().unwrap_or_default(),
            author: pr
                .user
                .as_ref()
                .map(|u| u.login.clone())
                .unwrap_or_else(|| "unknown".to_string()),
            base_branch: pr.base.ref_field.clone(),
            base_sha: pr.base.sha.clone(),
            head_branch: pr.head.ref_field.clone(),
            head_sha: pr.head.sha.clone(),
            html_url: pr
                .html_url
                .as_ref()
                .map(|u| u.to_string())
                .unwrap_or_default(),
            created_at: pr.created_at.unwrap_or_else(chrono::Utc::now),
            updated_at: pr.updated_at.unwrap_or_else(chrono::Utc::now),
        })
    }

    async fn fetch_diff(&self, owner: &str, repo: &str, number: u64) -> anyhow::Result<String> {
        debug!("Fetching diff for {}/{}#{}", owner, repo, number);

        let diff = self
            .octocrab
            .pulls(owner, repo)
            .get_diff(number)
            .await
            .context("Failed to fetch pull request diff")?;
        Ok(diff)
    }

    async fn fetch_review_comments(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
    ) -> anyhow::Result<Vec<CommentData>> {
        debug!("Fetching review comments for {}/{}#{}", owner, repo, number);

        let mut comments = Vec::new();
        let mut page = 1u32;
        const PER_PAGE: u32 = 100;

        loop {
            let route = format!(
                "/repos/{}/{}/pulls/{}/comments?per_page={}&page={}",
                owner, repo, number, PER_PAGE, page
            );
            let batch: Vec<RawReviewComment> = self.octocrab.get(route, None::<&()>).await?;
            let batch_len = batch.len();
            comments.extend(batch.into_iter().map(convert_comment));

            if batch_len < PER_PAGE as usize {
                break;
            }
            page += 1;
        }

        debug!(
            "Fetched {} review comments for {}/{}#{}",
            comments.len(),
            owner,
            repo,
            number
        );
        Ok(comments)
    }

    async fn fetch_file_content(
        &self,
        owner: &str,
        repo: &str,
        reference: &str,
        path: &str,
    ) -> anyhow::Result<String> {
        debug!("Fetching {}@{} from {}/{}", path, reference, owner, repo);

        let items = self
            .octocrab
            .repos(owner, repo)
            .get_content()
            .path(path)
            .r#ref(reference)
            .send()
            .await
            .with_context(|| format!("Failed to fetch content of {path}@{reference}"))?;

        let content = items
            .items
            .into_iter()
            .next()
            .with_context(|| format!("No content returned for {path}@{reference}"))?;

        content
            .decoded_content()
            .with_context(|| format!("Content of {path}@{reference} is not valid UTF-8"))
    }

    async fn create_review_comment(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
        commit_id: &str,
        path: &str,
        position: u32,
        body: &str,
    ) -> anyhow::Result<CommentData> {
        debug!(
            "Posting review comment on {}/{}#{} {}:{}",
            owner, repo, number, path, position
        );

        let route = format!("/repos/{}/{}/pulls/{}/comments", owner, repo, number);
        let payload = serde_json::json!({
            "body": body,
            "commit_id": commit_id,
            "path": path,
            "position": position,
        });

        let raw: RawReviewComment = self.octocrab.post(route, Some(&payload)).await?;
        Ok(convert_comment(raw))
    }

    async fn create_reply(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
        in_reply_to: u64,
        body: &str,
    ) -> anyhow::Result<CommentData> {
        debug!(
            "Replying to comment {} on {}/{}#{}",
            in_reply_to, owner, repo, number
        );

        let route = format!(
            "/repos/{}/{}/pulls/{}/comments/{}/replies",
            owner, repo, number, in_reply_to
        );
        let payload = serde_json::json!({ "body": body });

        let raw: RawReviewComment = self.octocrab.post(route, Some(&payload)).await?;
        Ok(convert_comment(raw))
    }

    async fn delete_review_comment(
        &self,
        owner: &str,
        repo: &str,
        comment_id: u64,
    ) -> anyhow::Result<()> {
        debug!("Deleting review comment {} on {}/{}", comment_id, owner, repo);

        let route = format!("/repos/{}/{}/pulls/comments/{}", owner, repo, comment_id);
        let _ = self
            .octocrab
            ._delete(route, None::<&()>)
            .await
            .context("Failed to delete review comment")?;
        Ok(())
    }

    async fn find_pending_review(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
    ) -> anyhow::Result<Option<u64>> {
        let route = format!("/repos/{}/{}/pulls/{}/reviews", owner, repo, number);
        let reviews: Vec<RawReview> = self.octocrab.get(route, None::<&()>).await?;

        Ok(reviews
            .into_iter()
            .find(|r| r.state == "PENDING")
            .map(|r| r.id))
    }

    async fn create_pending_review(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
    ) -> anyhow::Result<u64> {
        debug!("Starting pending review on {}/{}#{}", owner, repo, number);

        // Posting a review without an event leaves it in PENDING state.
        let route = format!("/repos/{}/{}/pulls/{}/reviews", owner, repo, number);
        let payload = serde_json::json!({});

        let review: RawReview = self.octocrab.post(route, Some(&payload)).await?;
        Ok(review.id)
    }

    async fn submit_pending_review(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
        review_id: u64,
        verdict: ReviewVerdict,
        body: Option<&str>,
    ) -> anyhow::Result<()> {
        debug!(
            "Submitting review {} on {}/{}#{} as {}",
            review_id,
            owner,
            repo,
            number,
            verdict.as_api_str()
        );

        let route = format!(
            "/repos/{}/{}/pulls/{}/reviews/{}/events",
            owner, repo, number, review_id
        );
        let payload = serde_json::json!({
            "event": verdict.as_api_str(),
            "body": body.unwrap_or(""),
        });

        let _: RawReview = self.octocrab.post(route, Some(&payload)).await?;
        Ok(())
    }

    async fn delete_pending_review(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
        review_id: u64,
    ) -> anyhow::Result<()> {
        debug!(
            "Discarding pending review {} on {}/{}#{}",
            review_id, owner, repo, number
        );

        let route = format!(
            "/repos/{}/{}/pulls/{}/reviews/{}",
            owner, repo, number, review_id
        );
        let _ = self
            .octocrab
            ._delete(route, None::<&()>)
            .await
            .context("Failed to delete pending review")?;
        Ok(())
    }
}
