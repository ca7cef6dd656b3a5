//! One reviewed file: diff, comment threads and their live-buffer mapping.

use crate::event::SessionEvent;
use crate::thread::{
    build_threads, carry_forward_pending, CommentId, InlineCommentThread, ReviewComment,
};
use gh_review_client::CommentData;
use gh_review_diff::{edit_chunks, map_anchor, EditChunk, FileDiff};
use log::debug;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{broadcast, Mutex};

/// Aggregates one file's diff, comment threads and commit tracking.
///
/// All mutation goes through a single async mutex, so a refresh and an
/// optimistic comment append are serialized against each other and a
/// consumer never observes a half-rebuilt thread list. Each mutation
/// publishes exactly one [`SessionEvent::FileChanged`].
///
/// The file receives data and emits events; it never calls the network
/// itself — the owning session feeds it.
#[derive(Debug)]
pub struct SessionFile {
    relative_path: String,
    state: Mutex<FileState>,
    /// Monotonic ticket for buffer updates; remaps carrying a superseded
    /// ticket are discarded instead of applied.
    edit_generation: AtomicU64,
    notify: broadcast::Sender<SessionEvent>,
}

#[derive(Debug)]
struct FileState {
    /// Parsed diff (base commit → PR head) for this file.
    diff: FileDiff,
    /// PR-head content, the baseline the live buffer is diffed against.
    head_content: String,
    /// HEAD SHA the diff and comment positions refer to.
    head_sha: String,
    /// Commit the working tree has checked out, when known.
    buffer_sha: Option<String>,
    /// Edits the user has made since checkout (PR head → live buffer).
    edits: Vec<EditChunk>,
    threads: Vec<InlineCommentThread>,
}

impl FileState {
    fn remap_all(&mut self) {
        for thread in &mut self.threads {
            thread.buffer_line = map_anchor(&self.diff, &self.edits, thread.anchor);
        }
    }

    fn remap_thread(&mut self, anchor: u32) {
        if let Some(thread) = self.threads.iter_mut().find(|t| t.anchor == anchor) {
            thread.buffer_line = map_anchor(&self.diff, &self.edits, thread.anchor);
        }
    }

    fn needs_push(&self) -> bool {
        match &self.buffer_sha {
            Some(sha) => sha != &self.head_sha,
            // Without local git information we assume the checkout matches.
            None => false,
        }
    }
}

impl SessionFile {
    pub(crate) fn new(
        relative_path: impl Into<String>,
        diff: FileDiff,
        head_content: String,
        head_sha: impl Into<String>,
        buffer_sha: Option<String>,
        comments: &[CommentData],
        notify: broadcast::Sender<SessionEvent>,
    ) -> Self {
        let mut state = FileState {
            diff,
            head_content,
            head_sha: head_sha.into(),
            buffer_sha,
            edits: Vec::new(),
            threads: build_threads(comments),
        };
        state.remap_all();

        Self {
            relative_path: relative_path.into(),
            state: Mutex::new(state),
            edit_generation: AtomicU64::new(0),
            notify,
        }
    }

    /// Path relative to the repository root.
    pub fn relative_path(&self) -> &str {
        &self.relative_path
    }

    /// HEAD SHA the diff and comment positions refer to.
    pub async fn commit_sha(&self) -> String {
        self.state.lock().await.head_sha.clone()
    }

    /// Commit the working tree has checked out, when known.
    pub async fn buffer_commit(&self) -> Option<String> {
        self.state.lock().await.buffer_sha.clone()
    }

    /// Whether the local checkout diverged from the review head. While
    /// true, posting new comments is refused with a stale-commit error.
    pub async fn needs_push(&self) -> bool {
        self.state.lock().await.needs_push()
    }

    /// Snapshot of the file's diff.
    pub async fn diff(&self) -> FileDiff {
        self.state.lock().await.diff.clone()
    }

    /// Snapshot of the PR-head content.
    pub(crate) async fn head_content(&self) -> String {
        self.state.lock().await.head_content.clone()
    }

    /// Snapshot of the comment threads with their current buffer mapping.
    pub async fn threads(&self) -> Vec<InlineCommentThread> {
        self.state.lock().await.threads.clone()
    }

    /// Look up a comment by id across all threads.
    pub async fn find_comment(&self, id: &CommentId) -> Option<ReviewComment> {
        self.state
            .lock()
            .await
            .threads
            .iter()
            .flat_map(|t| &t.comments)
            .find(|c| &c.id == id)
            .cloned()
    }

    /// Whether the given diff position exists in this file's diff.
    pub async fn has_position(&self, diff_index: u32) -> bool {
        self.state.lock().await.diff.line_at_index(diff_index).is_some()
    }

    /// Replace diff and threads with fresh server data.
    ///
    /// Threads are rebuilt wholesale from the server comments; local
    /// placeholders the server does not confirm yet are carried forward.
    /// Publishes exactly one change notification.
    pub(crate) async fn apply_refresh(
        &self,
        diff: FileDiff,
        head_content: String,
        head_sha: String,
        buffer_sha: Option<String>,
        comments: &[CommentData],
    ) {
        let mut state = self.state.lock().await;

        let pending: Vec<ReviewComment> = state
            .threads
            .iter()
            .flat_map(|t| &t.comments)
            .filter(|c| c.is_pending())
            .cloned()
            .collect();

        let mut threads = build_threads(comments);
        carry_forward_pending(&mut threads, pending);

        state.diff = diff;
        state.head_content = head_content;
        state.head_sha = head_sha;
        state.buffer_sha = buffer_sha;
        state.threads = threads;
        state.remap_all();
        drop(state);

        self.emit();
    }

    /// Append a comment to the thread at its anchor, creating the thread if
    /// none exists. Only that thread is remapped.
    pub(crate) async fn add_comment(&self, comment: ReviewComment) {
        let mut state = self.state.lock().await;
        let anchor = comment.original_position;

        match state.threads.iter().position(|t| t.anchor == anchor) {
            Some(at) => state.threads[at].comments.push(comment),
            None => {
                let mut thread = InlineCommentThread::new(anchor);
                thread.comments.push(comment);
                let at = state.threads.partition_point(|t| t.anchor < anchor);
                state.threads.insert(at, thread);
            }
        }
        state.remap_thread(anchor);
        drop(state);

        self.emit();
    }

    /// Swap a placeholder for the server's confirmed copy, in place.
    pub(crate) async fn confirm_comment(&self, placeholder: &CommentId, data: &CommentData) {
        let mut state = self.state.lock().await;
        let mut confirmed = false;
        for thread in &mut state.threads {
            if let Some(comment) = thread.comments.iter_mut().find(|c| &c.id == placeholder) {
                comment.id = CommentId::Posted(data.id);
                comment.commit_sha = data.original_commit_id.clone();
                comment.created_at = data.created_at;
                comment.updated_at = data.updated_at;
                confirmed = true;
                break;
            }
        }
        drop(state);

        if confirmed {
            self.emit();
        } else {
            // A refresh replaced the placeholder first; the server copy is
            // already (or will be) present via reconciliation.
            debug!(
                "placeholder {} in {} already reconciled",
                placeholder, self.relative_path
            );
        }
    }

    /// Remove a comment, dropping its thread if it becomes empty. Returns
    /// the removed comment for rollback purposes.
    pub(crate) async fn remove_comment(&self, id: &CommentId) -> Option<ReviewComment> {
        let mut state = self.state.lock().await;
        let mut removed = None;
        for thread in &mut state.threads {
            if let Some(at) = thread.comments.iter().position(|c| &c.id == id) {
                removed = Some(thread.comments.remove(at));
                break;
            }
        }
        state.threads.retain(|t| !t.comments.is_empty());
        drop(state);

        if removed.is_some() {
            self.emit();
        }
        removed
    }

    /// Record that the working tree moved to a different commit (e.g. the
    /// host observed a checkout or push without running a full refresh).
    pub async fn set_buffer_commit(&self, sha: Option<String>) {
        let mut state = self.state.lock().await;
        if state.buffer_sha == sha {
            return;
        }
        state.buffer_sha = sha;
        drop(state);
        self.emit();
    }

    /// Claim a ticket for an upcoming buffer remap. Tickets are claimed in
    /// event order; a remap whose ticket is no longer the newest is stale.
    pub fn next_edit_generation(&self) -> u64 {
        self.edit_generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Recompute the head→buffer edits and remap every thread.
    ///
    /// Returns false (and changes nothing) when `generation` has been
    /// superseded by a newer buffer change, so the mapping always reflects
    /// the latest edit.
    pub async fn update_buffer(&self, buffer_text: &str, generation: u64) -> bool {
        if generation < self.edit_generation.load(Ordering::SeqCst) {
            debug!("discarding superseded remap of {}", self.relative_path);
            return false;
        }

        // Diff outside the state lock; only the head snapshot is needed.
        let head = self.head_content().await;
        let edits = edit_chunks(&head, buffer_text);

        let mut state = self.state.lock().await;
        if generation < self.edit_generation.load(Ordering::SeqCst) {
            debug!("discarding superseded remap of {}", self.relative_path);
            return false;
        }
        state.edits = edits;
        state.remap_all();
        drop(state);

        self.emit();
        true
    }

    fn emit(&self) {
        // No receivers is fine; margins subscribe lazily.
        let _ = self.notify.send(SessionEvent::FileChanged {
            path: self.relative_path.clone(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use gh_review_diff::{BufferLine, DiffChunk, DiffLine};
    use pretty_assertions::assert_eq;
    use tokio::sync::broadcast::error::TryRecvError;

    /// One chunk: old lines 1-10 unchanged, line 11 added.
    fn sample_diff() -> FileDiff {
        let mut file = FileDiff::new("src/sample.rs");
        let mut chunk = DiffChunk::new(1, 10, 1, 11);
        for n in 1..=10u32 {
            chunk
                .lines
                .push(DiffLine::context(format!("line {n}"), n, n, n));
        }
        chunk.lines.push(DiffLine::addition("added line", 11, 11));
        file.chunks.push(chunk);
        file.recalculate_stats();
        file
    }

    fn sample_head() -> String {
        let mut text: String = (1..=10).map(|n| format!("line {n}\n")).collect();
        text.push_str("added line\n");
        text
    }

    fn server_comment(id: u64, position: u32) -> CommentData {
        CommentData {
            id,
            path: "src/sample.rs".to_string(),
            position: Some(position),
            original_position: Some(position),
            commit_id: "head111".to_string(),
            original_commit_id: "head111".to_string(),
            author: "reviewer".to_string(),
            body: format!("comment {id}"),
            in_reply_to: None,
            review_id: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn new_file(comments: &[CommentData]) -> (SessionFile, broadcast::Receiver<SessionEvent>) {
        let (tx, rx) = broadcast::channel(16);
        let file = SessionFile::new(
            "src/sample.rs",
            sample_diff(),
            sample_head(),
            "head111",
            Some("head111".to_string()),
            comments,
            tx,
        );
        (file, rx)
    }

    fn assert_one_event(rx: &mut broadcast::Receiver<SessionEvent>) {
        match rx.try_recv() {
            Ok(SessionEvent::FileChanged { path }) => assert_eq!(path, "src/sample.rs"),
            other => panic!("expected FileChanged, got {other:?}"),
        }
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
    }

    #[tokio::test]
    async fn test_threads_map_on_construction() {
        let (file, _rx) = new_file(&[server_comment(1, 11), server_comment(2, 3)]);

        let threads = file.threads().await;
        assert_eq!(threads.len(), 2);
        assert_eq!(threads[0].anchor, 3);
        assert_eq!(threads[0].buffer_line, BufferLine::Exact(3));
        assert_eq!(threads[1].anchor, 11);
        assert_eq!(threads[1].buffer_line, BufferLine::Exact(11));
    }

    #[tokio::test]
    async fn test_refresh_is_idempotent_and_notifies_once() {
        let (file, mut rx) = new_file(&[server_comment(1, 11)]);
        let comments = vec![server_comment(1, 11), server_comment(2, 3)];

        file.apply_refresh(
            sample_diff(),
            sample_head(),
            "head111".to_string(),
            Some("head111".to_string()),
            &comments,
        )
        .await;
        assert_one_event(&mut rx);
        let first = file.threads().await;

        file.apply_refresh(
            sample_diff(),
            sample_head(),
            "head111".to_string(),
            Some("head111".to_string()),
            &comments,
        )
        .await;
        assert_one_event(&mut rx);
        let second = file.threads().await;

        assert_eq!(first.len(), second.len());
        for (a, b) in first.iter().zip(&second) {
            assert_eq!(a.anchor, b.anchor);
            assert_eq!(a.buffer_line, b.buffer_line);
            let ids_a: Vec<&CommentId> = a.comments.iter().map(|c| &c.id).collect();
            let ids_b: Vec<&CommentId> = b.comments.iter().map(|c| &c.id).collect();
            assert_eq!(ids_a, ids_b);
        }
    }

    #[tokio::test]
    async fn test_optimistic_add_is_visible_immediately() {
        let (file, mut rx) = new_file(&[]);
        let placeholder = ReviewComment::pending("me", "needs a test", "head111", 11);

        file.add_comment(placeholder.clone()).await;
        assert_one_event(&mut rx);

        let threads = file.threads().await;
        assert_eq!(threads.len(), 1);
        assert_eq!(threads[0].anchor, 11);
        assert!(threads[0].has_pending());
        assert_eq!(threads[0].comments[0].id, placeholder.id);
        assert_eq!(threads[0].buffer_line, BufferLine::Exact(11));
    }

    #[tokio::test]
    async fn test_refresh_carries_unconfirmed_placeholder() {
        let (file, _rx) = new_file(&[]);
        let placeholder = ReviewComment::pending("me", "needs a test", "head111", 11);
        file.add_comment(placeholder.clone()).await;

        // Server data does not contain the placeholder yet.
        file.apply_refresh(
            sample_diff(),
            sample_head(),
            "head111".to_string(),
            Some("head111".to_string()),
            &[server_comment(1, 3)],
        )
        .await;

        let threads = file.threads().await;
        assert_eq!(threads.len(), 2);
        assert_eq!(threads[1].comments[0].id, placeholder.id);
    }

    #[tokio::test]
    async fn test_confirm_swaps_placeholder_id() {
        let (file, _rx) = new_file(&[]);
        let placeholder = ReviewComment::pending("me", "needs a test", "head111", 11);
        file.add_comment(placeholder.clone()).await;

        let mut confirmed = server_comment(42, 11);
        confirmed.author = "me".to_string();
        confirmed.body = "needs a test".to_string();
        file.confirm_comment(&placeholder.id, &confirmed).await;

        let threads = file.threads().await;
        assert_eq!(threads[0].comments[0].id, CommentId::Posted(42));
        assert!(!threads[0].has_pending());
    }

    #[tokio::test]
    async fn test_remove_comment_drops_empty_thread() {
        let (file, _rx) = new_file(&[]);
        let placeholder = ReviewComment::pending("me", "oops", "head111", 11);
        file.add_comment(placeholder.clone()).await;

        let removed = file.remove_comment(&placeholder.id).await;
        assert!(removed.is_some());
        assert!(file.threads().await.is_empty());
    }

    #[tokio::test]
    async fn test_buffer_update_remaps_threads() {
        let (file, mut rx) = new_file(&[server_comment(1, 11)]);

        let buffer = format!("inserted at top\n{}", sample_head());
        let generation = file.next_edit_generation();
        assert!(file.update_buffer(&buffer, generation).await);
        assert_one_event(&mut rx);

        let threads = file.threads().await;
        assert_eq!(threads[0].buffer_line, BufferLine::Exact(12));
    }

    #[tokio::test]
    async fn test_superseded_buffer_update_is_discarded() {
        let (file, mut rx) = new_file(&[server_comment(1, 11)]);

        let stale_generation = file.next_edit_generation();
        let fresh_generation = file.next_edit_generation();

        // Newest edit applies.
        let fresh = format!("one\ntwo\n{}", sample_head());
        assert!(file.update_buffer(&fresh, fresh_generation).await);
        assert_one_event(&mut rx);

        // The older in-flight remap arrives late and is discarded.
        let stale = format!("one\n{}", sample_head());
        assert!(!file.update_buffer(&stale, stale_generation).await);
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));

        let threads = file.threads().await;
        assert_eq!(threads[0].buffer_line, BufferLine::Exact(13));
    }

    #[tokio::test]
    async fn test_needs_push_tracks_sha_divergence() {
        let (tx, _rx) = broadcast::channel(16);
        let file = SessionFile::new(
            "src/sample.rs",
            sample_diff(),
            sample_head(),
            "head111",
            Some("local999".to_string()),
            &[],
            tx,
        );

        assert!(file.needs_push().await);

        file.set_buffer_commit(Some("head111".to_string())).await;
        assert!(!file.needs_push().await);
    }
}
