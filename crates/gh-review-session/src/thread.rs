//! Inline comment threads and their reconciliation with server state.

use chrono::{DateTime, Utc};
use gh_review_client::CommentData;
use gh_review_diff::BufferLine;
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

/// Identifies a review comment.
///
/// Locally-posted comments start out with a client-generated placeholder id
/// and are swapped to the server id once the post is confirmed.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CommentId {
    /// Client-generated placeholder, awaiting server confirmation.
    Pending(Uuid),
    /// Server-assigned id.
    Posted(u64),
}

impl CommentId {
    /// Whether this id is still a local placeholder.
    pub fn is_pending(&self) -> bool {
        matches!(self, CommentId::Pending(_))
    }
}

impl fmt::Display for CommentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommentId::Pending(uuid) => write!(f, "pending:{uuid}"),
            CommentId::Posted(id) => write!(f, "#{id}"),
        }
    }
}

/// A single review comment, owned by exactly one thread.
#[derive(Debug, Clone)]
pub struct ReviewComment {
    pub id: CommentId,
    /// Author's login.
    pub author: String,
    /// Comment body (markdown).
    pub body: String,
    /// HEAD SHA the comment was posted against.
    pub commit_sha: String,
    /// Diff-relative index the comment anchors to.
    pub original_position: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ReviewComment {
    /// Create a local placeholder for an optimistic post.
    pub fn pending(
        author: impl Into<String>,
        body: impl Into<String>,
        commit_sha: impl Into<String>,
        original_position: u32,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: CommentId::Pending(Uuid::new_v4()),
            author: author.into(),
            body: body.into(),
            commit_sha: commit_sha.into(),
            original_position,
            created_at: now,
            updated_at: now,
        }
    }

    /// Build from a server comment, with the anchor the caller resolved
    /// (replies inherit their parent's anchor).
    pub fn from_data(data: &CommentData, anchor: u32) -> Self {
        Self {
            id: CommentId::Posted(data.id),
            author: data.author.clone(),
            body: data.body.clone(),
            commit_sha: data.original_commit_id.clone(),
            original_position: anchor,
            created_at: data.created_at,
            updated_at: data.updated_at,
        }
    }

    /// Whether this comment is still awaiting server confirmation.
    pub fn is_pending(&self) -> bool {
        self.id.is_pending()
    }
}

/// A logical review conversation anchored to one diff position.
#[derive(Debug, Clone)]
pub struct InlineCommentThread {
    /// Diff-relative index the conversation anchors to.
    pub anchor: u32,
    /// Where the anchor currently lands in the live buffer; recomputed on
    /// every remap.
    pub buffer_line: BufferLine,
    /// Comments in conversation order.
    pub comments: Vec<ReviewComment>,
}

impl InlineCommentThread {
    pub fn new(anchor: u32) -> Self {
        Self {
            anchor,
            buffer_line: BufferLine::Unmappable,
            comments: Vec::new(),
        }
    }

    /// The first comment's id, i.e. the id replies should reference.
    pub fn root_id(&self) -> Option<&CommentId> {
        self.comments.first().map(|c| &c.id)
    }

    /// Whether any comment in the thread is still a local placeholder.
    pub fn has_pending(&self) -> bool {
        self.comments.iter().any(|c| c.is_pending())
    }
}

/// Group server comments into threads keyed by their diff anchor.
///
/// Replies carry no position of their own; their anchor is resolved by
/// following `in_reply_to` to a parent that has one. Comments with no
/// resolvable anchor (e.g. outdated beyond recovery) are dropped — there is
/// nothing in the diff to attach them to.
pub(crate) fn build_threads(comments: &[CommentData]) -> Vec<InlineCommentThread> {
    let by_id: HashMap<u64, &CommentData> = comments.iter().map(|c| (c.id, c)).collect();

    let mut threads: Vec<InlineCommentThread> = Vec::new();
    for comment in comments {
        let Some(anchor) = resolve_anchor(comment, &by_id) else {
            continue;
        };
        let at = match threads.iter().position(|t| t.anchor == anchor) {
            Some(at) => at,
            None => {
                threads.push(InlineCommentThread::new(anchor));
                threads.len() - 1
            }
        };
        threads[at].comments.push(ReviewComment::from_data(comment, anchor));
    }

    for thread in &mut threads {
        thread
            .comments
            .sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| cmp_ids(&a.id, &b.id)));
    }
    threads.sort_by_key(|t| t.anchor);
    threads
}

fn cmp_ids(a: &CommentId, b: &CommentId) -> std::cmp::Ordering {
    match (a, b) {
        (CommentId::Posted(x), CommentId::Posted(y)) => x.cmp(y),
        // Placeholders sort after confirmed comments of the same instant.
        (CommentId::Posted(_), CommentId::Pending(_)) => std::cmp::Ordering::Less,
        (CommentId::Pending(_), CommentId::Posted(_)) => std::cmp::Ordering::Greater,
        (CommentId::Pending(x), CommentId::Pending(y)) => x.cmp(y),
    }
}

fn resolve_anchor(comment: &CommentData, by_id: &HashMap<u64, &CommentData>) -> Option<u32> {
    if let Some(position) = comment.original_position {
        return Some(position);
    }
    let mut current = comment;
    let mut hops = 0;
    while let Some(parent_id) = current.in_reply_to {
        let parent = by_id.get(&parent_id)?;
        if let Some(position) = parent.original_position {
            return Some(position);
        }
        current = parent;
        hops += 1;
        if hops > 64 {
            // Broken reply chain; treat as unanchored.
            return None;
        }
    }
    None
}

/// Re-attach local placeholders the fresh server data does not confirm.
///
/// A placeholder is confirmed — and therefore dropped in favor of the
/// server's copy — when the fresh data contains a non-pending comment with
/// the same author, body and original position. Unconfirmed placeholders
/// are carried forward so an in-flight post is never lost to a concurrent
/// refresh.
pub(crate) fn carry_forward_pending(
    threads: &mut Vec<InlineCommentThread>,
    pending: Vec<ReviewComment>,
) {
    for placeholder in pending {
        let confirmed = threads.iter().flat_map(|t| &t.comments).any(|c| {
            !c.is_pending()
                && c.author == placeholder.author
                && c.body == placeholder.body
                && c.original_position == placeholder.original_position
        });
        if confirmed {
            continue;
        }

        let anchor = placeholder.original_position;
        match threads.iter().position(|t| t.anchor == anchor) {
            Some(at) => threads[at].comments.push(placeholder),
            None => {
                let mut thread = InlineCommentThread::new(anchor);
                thread.comments.push(placeholder);
                let at = threads.partition_point(|t| t.anchor < anchor);
                threads.insert(at, thread);
            }
        }
    }
}
