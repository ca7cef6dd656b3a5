//! The per-pull-request review session.

use crate::error::SessionError;
use crate::event::SessionEvent;
use crate::file::SessionFile;
use crate::git::GitProvider;
use crate::thread::{CommentId, ReviewComment};
use gh_review_client::{CommentData, PullRequestInfo, ReviewApi, ReviewVerdict};
use gh_review_diff::{parse_unified_diff, FileDiff, FileStatus};
use log::{debug, warn};
use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex, RwLock as StdRwLock};
use tokio::sync::{broadcast, Mutex, OnceCell};

/// Identifies the pull request a session reviews.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullRequestHandle {
    pub owner: String,
    pub repo: String,
    pub number: u64,
}

impl std::fmt::Display for PullRequestHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}#{}", self.owner, self.repo, self.number)
    }
}

/// Whole-PR server data, fetched once and reused by every file until the
/// next refresh.
#[derive(Default)]
struct RemoteCache {
    diff: Option<Arc<Vec<FileDiff>>>,
    comments: Option<Arc<Vec<CommentData>>>,
}

/// The set of tracked files, diffs and threads for one pull request under
/// review.
///
/// Files are built lazily per relative path, with at most one instance per
/// path: concurrent [`Session::get_file`] callers for the same path await
/// the same in-flight construction and exactly one set of fetches runs.
pub struct Session {
    handle: PullRequestHandle,
    api: Arc<dyn ReviewApi>,
    git: Arc<dyn GitProvider>,
    current_user: String,
    info: StdRwLock<PullRequestInfo>,
    remote: Mutex<RemoteCache>,
    files: StdMutex<HashMap<String, Arc<OnceCell<Arc<SessionFile>>>>>,
    /// Serializes the pending-review lifecycle operations.
    review_gate: Mutex<()>,
    pending_review: StdMutex<Option<u64>>,
    events: broadcast::Sender<SessionEvent>,
}

impl Session {
    /// Open a review session for a pull request.
    ///
    /// Fetches the PR metadata, resolves the authenticated user and picks
    /// up any pending review left over from an earlier session.
    pub async fn open(
        api: Arc<dyn ReviewApi>,
        git: Arc<dyn GitProvider>,
        owner: &str,
        repo: &str,
        number: u64,
    ) -> Result<Arc<Self>, SessionError> {
        let info = api.fetch_pull_request(owner, repo, number).await?;
        let current_user = api.current_user().await?;
        let pending_review = api.find_pending_review(owner, repo, number).await?;
        let (events, _) = broadcast::channel(64);

        debug!(
            "opened review session for {owner}/{repo}#{number} at {}",
            info.head_sha
        );

        Ok(Arc::new(Self {
            handle: PullRequestHandle {
                owner: owner.to_string(),
                repo: repo.to_string(),
                number,
            },
            api,
            git,
            current_user,
            info: StdRwLock::new(info),
            remote: Mutex::new(RemoteCache::default()),
            files: StdMutex::new(HashMap::new()),
            review_gate: Mutex::new(()),
            pending_review: StdMutex::new(pending_review),
            events,
        }))
    }

    /// The pull request this session reviews.
    pub fn handle(&self) -> &PullRequestHandle {
        &self.handle
    }

    /// Login of the authenticated user; author of optimistic placeholders.
    pub fn current_user(&self) -> &str {
        &self.current_user
    }

    /// Snapshot of the PR metadata.
    pub fn pull_request(&self) -> PullRequestInfo {
        self.info.read().unwrap().clone()
    }

    /// Whether comments are currently batched into a draft review.
    pub fn has_pending_review(&self) -> bool {
        self.pending_review.lock().unwrap().is_some()
    }

    /// Subscribe to this session's change notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Paths changed by the pull request, in diff order.
    pub async fn changed_paths(&self) -> Result<Vec<String>, SessionError> {
        let (diff, _) = self.remote_state().await?;
        Ok(diff.iter().map(|f| f.path.clone()).collect())
    }

    /// Get the session file for a relative path, constructing it on first
    /// request.
    pub async fn get_file(&self, path: &str) -> Result<Arc<SessionFile>, SessionError> {
        let slot = {
            let mut files = self.files.lock().unwrap();
            files
                .entry(path.to_string())
                .or_insert_with(|| Arc::new(OnceCell::new()))
                .clone()
        };

        let file = slot.get_or_try_init(|| self.build_file(path)).await?;
        Ok(Arc::clone(file))
    }

    /// The session file for a path, if it has already been constructed.
    ///
    /// Used on hot paths (buffer-change remaps) that must not trigger
    /// network fetches.
    pub fn try_file(&self, path: &str) -> Option<Arc<SessionFile>> {
        let files = self.files.lock().unwrap();
        files.get(path).and_then(|slot| slot.get().cloned())
    }

    /// All files constructed so far.
    pub fn files(&self) -> Vec<Arc<SessionFile>> {
        let files = self.files.lock().unwrap();
        files.values().filter_map(|slot| slot.get().cloned()).collect()
    }

    /// Whether a new comment can be posted on the file right now.
    ///
    /// False while the local checkout diverges from the review head (the
    /// comment would land on lines the server cannot see).
    pub async fn can_comment(&self, path: &str) -> bool {
        match self.get_file(path).await {
            Ok(file) => !file.needs_push().await,
            Err(_) => false,
        }
    }

    /// Post a review comment at a diff position.
    ///
    /// The comment is appended locally as a placeholder before the network
    /// call, so consumers see it immediately; a failed post rolls the
    /// placeholder back and leaves prior state untouched.
    pub async fn post_comment(
        &self,
        path: &str,
        position: u32,
        body: &str,
    ) -> Result<ReviewComment, SessionError> {
        let file = self.get_file(path).await?;

        if file.needs_push().await {
            return Err(SessionError::StaleCommit {
                expected: file.commit_sha().await,
                actual: file.buffer_commit().await.unwrap_or_default(),
            });
        }
        if !file.has_position(position).await {
            return Err(SessionError::PositionUnresolvable(position));
        }

        let head_sha = file.commit_sha().await;
        let placeholder =
            ReviewComment::pending(self.current_user.clone(), body, head_sha.clone(), position);
        file.add_comment(placeholder.clone()).await;

        let result = self
            .api
            .create_review_comment(
                &self.handle.owner,
                &self.handle.repo,
                self.handle.number,
                &head_sha,
                file.relative_path(),
                position,
                body,
            )
            .await;

        match result {
            Ok(data) => {
                file.confirm_comment(&placeholder.id, &data).await;
                Ok(ReviewComment::from_data(&data, position))
            }
            Err(err) => {
                warn!("posting comment on {} failed: {err}", self.handle);
                file.remove_comment(&placeholder.id).await;
                Err(SessionError::Api(err))
            }
        }
    }

    /// Reply to an existing comment, extending its thread.
    pub async fn post_reply(
        &self,
        path: &str,
        in_reply_to: &CommentId,
        body: &str,
    ) -> Result<ReviewComment, SessionError> {
        let file = self.get_file(path).await?;

        // Replies need a server-confirmed parent.
        let CommentId::Posted(parent_id) = in_reply_to else {
            return Err(SessionError::CommentNotFound(in_reply_to.to_string()));
        };
        let Some(parent) = file.find_comment(in_reply_to).await else {
            return Err(SessionError::CommentNotFound(in_reply_to.to_string()));
        };

        let placeholder = ReviewComment::pending(
            self.current_user.clone(),
            body,
            parent.commit_sha.clone(),
            parent.original_position,
        );
        file.add_comment(placeholder.clone()).await;

        let result = self
            .api
            .create_reply(
                &self.handle.owner,
                &self.handle.repo,
                self.handle.number,
                *parent_id,
                body,
            )
            .await;

        match result {
            Ok(data) => {
                file.confirm_comment(&placeholder.id, &data).await;
                Ok(ReviewComment::from_data(&data, parent.original_position))
            }
            Err(err) => {
                warn!("replying to {in_reply_to} on {} failed: {err}", self.handle);
                file.remove_comment(&placeholder.id).await;
                Err(SessionError::Api(err))
            }
        }
    }

    /// Delete a comment, optimistically removing it locally and restoring
    /// it if the server refuses.
    pub async fn delete_comment(&self, path: &str, id: &CommentId) -> Result<(), SessionError> {
        let file = self.get_file(path).await?;

        let Some(removed) = file.remove_comment(id).await else {
            return Err(SessionError::CommentNotFound(id.to_string()));
        };

        // A placeholder never reached the server; local removal is all
        // there is to do.
        let CommentId::Posted(server_id) = id else {
            return Ok(());
        };

        match self
            .api
            .delete_review_comment(&self.handle.owner, &self.handle.repo, *server_id)
            .await
        {
            Ok(()) => Ok(()),
            Err(err) => {
                warn!("deleting {id} on {} failed: {err}", self.handle);
                file.add_comment(removed).await;
                Err(SessionError::Api(err))
            }
        }
    }

    /// Start a pending (draft) review. Subsequent comments attach to the
    /// draft until it is submitted or discarded.
    pub async fn start_review(&self) -> Result<u64, SessionError> {
        let _gate = self.review_gate.lock().await;
        if self.has_pending_review() {
            return Err(SessionError::ReviewAlreadyStarted);
        }

        let id = self
            .api
            .create_pending_review(&self.handle.owner, &self.handle.repo, self.handle.number)
            .await?;
        *self.pending_review.lock().unwrap() = Some(id);
        let _ = self
            .events
            .send(SessionEvent::PendingReviewChanged { active: true });
        Ok(id)
    }

    /// Submit the pending review with a verdict, publishing its comments.
    pub async fn submit_review(
        &self,
        verdict: ReviewVerdict,
        body: Option<&str>,
    ) -> Result<(), SessionError> {
        let _gate = self.review_gate.lock().await;
        let Some(id) = *self.pending_review.lock().unwrap() else {
            return Err(SessionError::NoPendingReview);
        };

        self.api
            .submit_pending_review(
                &self.handle.owner,
                &self.handle.repo,
                self.handle.number,
                id,
                verdict,
                body,
            )
            .await?;
        *self.pending_review.lock().unwrap() = None;
        let _ = self
            .events
            .send(SessionEvent::PendingReviewChanged { active: false });
        drop(_gate);

        // The published comments are now server-visible; a failed refresh
        // only delays them until the next one.
        if let Err(err) = self.refresh().await {
            warn!("refresh after review submit failed: {err}");
        }
        Ok(())
    }

    /// Discard the pending review and its draft comments.
    pub async fn discard_review(&self) -> Result<(), SessionError> {
        let _gate = self.review_gate.lock().await;
        let Some(id) = *self.pending_review.lock().unwrap() else {
            return Err(SessionError::NoPendingReview);
        };

        self.api
            .delete_pending_review(&self.handle.owner, &self.handle.repo, self.handle.number, id)
            .await?;
        *self.pending_review.lock().unwrap() = None;
        let _ = self
            .events
            .send(SessionEvent::PendingReviewChanged { active: false });
        drop(_gate);

        if let Err(err) = self.refresh().await {
            warn!("refresh after review discard failed: {err}");
        }
        Ok(())
    }

    /// Refetch PR metadata, diff and comments, and push the fresh data into
    /// every constructed file. Each file publishes exactly one change
    /// notification.
    pub async fn refresh(&self) -> Result<(), SessionError> {
        let handle = &self.handle;
        let info = self
            .api
            .fetch_pull_request(&handle.owner, &handle.repo, handle.number)
            .await?;
        let diff_text = self
            .api
            .fetch_diff(&handle.owner, &handle.repo, handle.number)
            .await?;
        let diff = Arc::new(parse_unified_diff(&diff_text)?);
        let comments = Arc::new(
            self.api
                .fetch_review_comments(&handle.owner, &handle.repo, handle.number)
                .await?,
        );

        let old_head = {
            let mut current = self.info.write().unwrap();
            let old = current.head_sha.clone();
            *current = info.clone();
            old
        };
        {
            let mut cache = self.remote.lock().await;
            cache.diff = Some(Arc::clone(&diff));
            cache.comments = Some(Arc::clone(&comments));
        }

        for file in self.files() {
            let path = file.relative_path().to_string();
            let buffer_sha = self.git.checked_out_commit(&path).ok();
            let file_diff = diff.iter().find(|fd| fd.matches_path(&path));

            match file_diff {
                Some(fd) => {
                    let file_comments = comments_for(&comments, fd);
                    let head_content = if fd.status == FileStatus::Deleted {
                        String::new()
                    } else if info.head_sha != old_head {
                        self.api
                            .fetch_file_content(
                                &handle.owner,
                                &handle.repo,
                                &info.head_sha,
                                &fd.path,
                            )
                            .await?
                    } else {
                        file.head_content().await
                    };
                    file.apply_refresh(
                        fd.clone(),
                        head_content,
                        info.head_sha.clone(),
                        buffer_sha,
                        &file_comments,
                    )
                    .await;
                }
                None => {
                    // The file dropped out of the diff (e.g. a force-push
                    // reverted it); nothing can anchor any more.
                    debug!("{path} no longer in diff of {handle}");
                    let file_comments: Vec<CommentData> = comments
                        .iter()
                        .filter(|c| c.path == path)
                        .cloned()
                        .collect();
                    file.apply_refresh(
                        FileDiff::new(path.clone()),
                        String::new(),
                        info.head_sha.clone(),
                        buffer_sha,
                        &file_comments,
                    )
                    .await;
                }
            }
        }

        let _ = self.events.send(SessionEvent::Refreshed);
        Ok(())
    }

    async fn remote_state(
        &self,
    ) -> Result<(Arc<Vec<FileDiff>>, Arc<Vec<CommentData>>), SessionError> {
        let mut cache = self.remote.lock().await;
        if cache.diff.is_none() {
            let handle = &self.handle;
            let text = self
                .api
                .fetch_diff(&handle.owner, &handle.repo, handle.number)
                .await?;
            cache.diff = Some(Arc::new(parse_unified_diff(&text)?));
        }
        if cache.comments.is_none() {
            let handle = &self.handle;
            let comments = self
                .api
                .fetch_review_comments(&handle.owner, &handle.repo, handle.number)
                .await?;
            cache.comments = Some(Arc::new(comments));
        }
        Ok((
            Arc::clone(cache.diff.as_ref().unwrap()),
            Arc::clone(cache.comments.as_ref().unwrap()),
        ))
    }

    async fn build_file(&self, path: &str) -> Result<Arc<SessionFile>, SessionError> {
        let (diff, comments) = self.remote_state().await?;

        let file_diff = diff
            .iter()
            .find(|fd| fd.matches_path(path))
            .cloned()
            .ok_or_else(|| SessionError::FileNotInDiff(path.to_string()))?;

        let head_sha = self.info.read().unwrap().head_sha.clone();
        let head_content = if file_diff.status == FileStatus::Deleted {
            String::new()
        } else {
            self.api
                .fetch_file_content(
                    &self.handle.owner,
                    &self.handle.repo,
                    &head_sha,
                    &file_diff.path,
                )
                .await?
        };
        let buffer_sha = self.git.checked_out_commit(&file_diff.path).ok();
        let file_comments = comments_for(&comments, &file_diff);
        let canonical_path = file_diff.path.clone();

        debug!("built session file {canonical_path} for {}", self.handle);

        Ok(Arc::new(SessionFile::new(
            canonical_path,
            file_diff,
            head_content,
            head_sha,
            buffer_sha,
            &file_comments,
            self.events.clone(),
        )))
    }
}

/// Server comments belonging to a file, resolving renames through the old
/// path.
fn comments_for(comments: &[CommentData], file_diff: &FileDiff) -> Vec<CommentData> {
    comments
        .iter()
        .filter(|c| file_diff.matches_path(&c.path))
        .cloned()
        .collect()
}
