//! In-memory fakes for session tests.
//!
//! The fakes implement the same traits the host wires up, with call
//! counters so tests can assert how often the engine actually hits the
//! remote.

use crate::git::GitProvider;
use anyhow::bail;
use async_trait::async_trait;
use chrono::Utc;
use gh_review_client::{CommentData, PullRequestInfo, ReviewApi, ReviewVerdict};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;

pub(crate) const HEAD_SHA: &str = "head111";
pub(crate) const BASE_SHA: &str = "base000";

/// Unified diff used across session tests: `src/sample.rs` with lines 1-10
/// unchanged and an eleventh line added (diff position 11).
pub(crate) fn sample_diff_text() -> String {
    let mut text = String::from(
        "diff --git a/src/sample.rs b/src/sample.rs\n\
         index 1111111..2222222 100644\n\
         --- a/src/sample.rs\n\
         +++ b/src/sample.rs\n\
         @@ -1,10 +1,11 @@\n",
    );
    for n in 1..=10 {
        text.push_str(&format!(" line {n}\n"));
    }
    text.push_str("+added line\n");
    text
}

/// The PR-head content matching [`sample_diff_text`].
pub(crate) fn sample_head_content() -> String {
    let mut text: String = (1..=10).map(|n| format!("line {n}\n")).collect();
    text.push_str("added line\n");
    text
}

pub(crate) fn sample_pull_request() -> PullRequestInfo {
    PullRequestInfo {
        number: 7,
        title: "Add the eleventh line".to_string(),
        author: "author".to_string(),
        base_branch: "main".to_string(),
        base_sha: BASE_SHA.to_string(),
        head_branch: "feature/eleven".to_string(),
        head_sha: HEAD_SHA.to_string(),
        html_url: "https://github.com/octo/widgets/pull/7".to_string(),
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

pub(crate) struct FakeReviewApi {
    pub user: String,
    pr: Mutex<PullRequestInfo>,
    diff_text: Mutex<String>,
    comments: Mutex<Vec<CommentData>>,
    /// (reference, path) → content
    contents: Mutex<HashMap<(String, String), String>>,
    next_comment_id: AtomicU64,
    next_review_id: AtomicU64,
    pending_review: Mutex<Option<u64>>,

    pub fail_user: AtomicBool,
    pub fail_posts: AtomicBool,
    pub fail_deletes: AtomicBool,

    pub user_calls: AtomicUsize,
    pub diff_fetches: AtomicUsize,
    pub comment_fetches: AtomicUsize,
    pub content_fetches: AtomicUsize,
}

impl FakeReviewApi {
    pub fn new() -> Self {
        let api = Self {
            user: "me".to_string(),
            pr: Mutex::new(sample_pull_request()),
            diff_text: Mutex::new(sample_diff_text()),
            comments: Mutex::new(Vec::new()),
            contents: Mutex::new(HashMap::new()),
            next_comment_id: AtomicU64::new(100),
            next_review_id: AtomicU64::new(500),
            pending_review: Mutex::new(None),
            fail_user: AtomicBool::new(false),
            fail_posts: AtomicBool::new(false),
            fail_deletes: AtomicBool::new(false),
            user_calls: AtomicUsize::new(0),
            diff_fetches: AtomicUsize::new(0),
            comment_fetches: AtomicUsize::new(0),
            content_fetches: AtomicUsize::new(0),
        };
        api.set_content(HEAD_SHA, "src/sample.rs", &sample_head_content());
        api
    }

    pub fn set_content(&self, reference: &str, path: &str, content: &str) {
        self.contents
            .lock()
            .unwrap()
            .insert((reference.to_string(), path.to_string()), content.to_string());
    }

    pub fn set_head_sha(&self, sha: &str) {
        self.pr.lock().unwrap().head_sha = sha.to_string();
    }

    /// Seed a server-side review comment at a diff position.
    pub fn seed_comment(&self, author: &str, body: &str, position: u32) -> u64 {
        let id = self.next_comment_id.fetch_add(1, Ordering::SeqCst);
        let now = Utc::now();
        self.comments.lock().unwrap().push(CommentData {
            id,
            path: "src/sample.rs".to_string(),
            position: Some(position),
            original_position: Some(position),
            commit_id: HEAD_SHA.to_string(),
            original_commit_id: HEAD_SHA.to_string(),
            author: author.to_string(),
            body: body.to_string(),
            in_reply_to: None,
            review_id: None,
            created_at: now,
            updated_at: now,
        });
        id
    }

    pub fn server_comments(&self) -> Vec<CommentData> {
        self.comments.lock().unwrap().clone()
    }
}

#[async_trait]
impl ReviewApi for FakeReviewApi {
    async fn current_user(&self) -> anyhow::Result<String> {
        self.user_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_user.load(Ordering::SeqCst) {
            bail!("credentials rejected");
        }
        Ok(self.user.clone())
    }

    async fn fetch_pull_request(
        &self,
        _owner: &str,
        _repo: &str,
        _number: u64,
    ) -> anyhow::Result<PullRequestInfo> {
        Ok(self.pr.lock().unwrap().clone())
    }

    async fn fetch_diff(&self, _owner: &str, _repo: &str, _number: u64) -> anyhow::Result<String> {
        self.diff_fetches.fetch_add(1, Ordering::SeqCst);
        // Widen the race window for at-most-once construction tests.
        tokio::task::yield_now().await;
        Ok(self.diff_text.lock().unwrap().clone())
    }

    async fn fetch_review_comments(
        &self,
        _owner: &str,
        _repo: &str,
        _number: u64,
    ) -> anyhow::Result<Vec<CommentData>> {
        self.comment_fetches.fetch_add(1, Ordering::SeqCst);
        tokio::task::yield_now().await;
        Ok(self.comments.lock().unwrap().clone())
    }

    async fn fetch_file_content(
        &self,
        _owner: &str,
        _repo: &str,
        reference: &str,
        path: &str,
    ) -> anyhow::Result<String> {
        self.content_fetches.fetch_add(1, Ordering::SeqCst);
        tokio::task::yield_now().await;
        match self
            .contents
            .lock()
            .unwrap()
            .get(&(reference.to_string(), path.to_string()))
        {
            Some(content) => Ok(content.clone()),
            None => bail!("no content for {path}@{reference}"),
        }
    }

    async fn create_review_comment(
        &self,
        _owner: &str,
        _repo: &str,
        _number: u64,
        commit_id: &str,
        path: &str,
        position: u32,
        body: &str,
    ) -> anyhow::Result<CommentData> {
        if self.fail_posts.load(Ordering::SeqCst) {
            bail!("injected post failure");
        }
        let id = self.next_comment_id.fetch_add(1, Ordering::SeqCst);
        let now = Utc::now();
        let comment = CommentData {
            id,
            path: path.to_string(),
            position: Some(position),
            original_position: Some(position),
            commit_id: commit_id.to_string(),
            original_commit_id: commit_id.to_string(),
            author: self.user.clone(),
            body: body.to_string(),
            in_reply_to: None,
            review_id: *self.pending_review.lock().unwrap(),
            created_at: now,
            updated_at: now,
        };
        self.comments.lock().unwrap().push(comment.clone());
        Ok(comment)
    }

    async fn create_reply(
        &self,
        _owner: &str,
        _repo: &str,
        _number: u64,
        in_reply_to: u64,
        body: &str,
    ) -> anyhow::Result<CommentData> {
        if self.fail_posts.load(Ordering::SeqCst) {
            bail!("injected post failure");
        }
        let parent = self
            .comments
            .lock()
            .unwrap()
            .iter()
            .find(|c| c.id == in_reply_to)
            .cloned();
        let Some(parent) = parent else {
            bail!("no comment {in_reply_to} to reply to");
        };
        let id = self.next_comment_id.fetch_add(1, Ordering::SeqCst);
        let now = Utc::now();
        let comment = CommentData {
            id,
            path: parent.path.clone(),
            position: parent.position,
            original_position: parent.original_position,
            commit_id: parent.commit_id.clone(),
            original_commit_id: parent.original_commit_id.clone(),
            author: self.user.clone(),
            body: body.to_string(),
            in_reply_to: Some(in_reply_to),
            review_id: *self.pending_review.lock().unwrap(),
            created_at: now,
            updated_at: now,
        };
        self.comments.lock().unwrap().push(comment.clone());
        Ok(comment)
    }

    async fn delete_review_comment(
        &self,
        _owner: &str,
        _repo: &str,
        comment_id: u64,
    ) -> anyhow::Result<()> {
        if self.fail_deletes.load(Ordering::SeqCst) {
            bail!("injected delete failure");
        }
        let mut comments = self.comments.lock().unwrap();
        let before = comments.len();
        comments.retain(|c| c.id != comment_id);
        if comments.len() == before {
            bail!("no comment {comment_id} to delete");
        }
        Ok(())
    }

    async fn find_pending_review(
        &self,
        _owner: &str,
        _repo: &str,
        _number: u64,
    ) -> anyhow::Result<Option<u64>> {
        Ok(*self.pending_review.lock().unwrap())
    }

    async fn create_pending_review(
        &self,
        _owner: &str,
        _repo: &str,
        _number: u64,
    ) -> anyhow::Result<u64> {
        let id = self.next_review_id.fetch_add(1, Ordering::SeqCst);
        *self.pending_review.lock().unwrap() = Some(id);
        Ok(id)
    }

    async fn submit_pending_review(
        &self,
        _owner: &str,
        _repo: &str,
        _number: u64,
        review_id: u64,
        _verdict: ReviewVerdict,
        _body: Option<&str>,
    ) -> anyhow::Result<()> {
        let mut pending = self.pending_review.lock().unwrap();
        if *pending != Some(review_id) {
            bail!("no pending review {review_id}");
        }
        *pending = None;
        Ok(())
    }

    async fn delete_pending_review(
        &self,
        _owner: &str,
        _repo: &str,
        _number: u64,
        review_id: u64,
    ) -> anyhow::Result<()> {
        let mut pending = self.pending_review.lock().unwrap();
        if *pending != Some(review_id) {
            bail!("no pending review {review_id}");
        }
        *pending = None;
        self.comments
            .lock()
            .unwrap()
            .retain(|c| c.review_id != Some(review_id));
        Ok(())
    }
}

pub(crate) struct FakeGit {
    root: PathBuf,
    commit: Mutex<String>,
}

impl FakeGit {
    pub fn new(root: impl Into<PathBuf>, commit: &str) -> Self {
        Self {
            root: root.into(),
            commit: Mutex::new(commit.to_string()),
        }
    }

    pub fn set_commit(&self, sha: &str) {
        *self.commit.lock().unwrap() = sha.to_string();
    }
}

impl GitProvider for FakeGit {
    fn repository_root(&self) -> PathBuf {
        self.root.clone()
    }

    fn checked_out_commit(&self, _path: &str) -> anyhow::Result<String> {
        Ok(self.commit.lock().unwrap().clone())
    }
}
