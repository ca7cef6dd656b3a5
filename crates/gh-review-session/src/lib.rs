//! # gh-review-session
//!
//! Pull-request review sessions for editor hosts: per-file diffs and
//! comment threads, live mapping of comment anchors onto edited buffer
//! lines, optimistic comment posting and pending-review state.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │                   SessionManager                      │
//! │  ensure_initialized / current session / buffer        │
//! │  registry / debounced buffer remaps                   │
//! └──────────────────────────┬───────────────────────────┘
//!                            │ current
//!                            ▼
//! ┌──────────────────────────────────────────────────────┐
//! │                       Session                         │
//! │  one pull request: lazy path → SessionFile map,       │
//! │  optimistic post/reply/delete, pending review         │
//! └──────────────────────────┬───────────────────────────┘
//!                            │ per path
//!                            ▼
//! ┌──────────────────────────────────────────────────────┐
//! │                     SessionFile                       │
//! │  diff + threads + buffer mapping, serialized          │
//! │  mutation, one change event per mutation              │
//! └──────────────────────────────────────────────────────┘
//! ```
//!
//! The manager is an explicit, injected coordinator: construct one, share
//! it with every consumer, and subscribe to its [`watch`] channel for
//! current-session changes. Consumers subscribe to a session's
//! [`SessionEvent`] broadcast and re-query the state they render when an
//! event arrives.
//!
//! ## Threading
//!
//! Everything here is `Send + Sync` and runs on a tokio runtime. Remaps
//! triggered by buffer changes are debounced onto background tasks and
//! discarded when superseded, so consumers never observe a mapping older
//! than the newest edit. Nothing blocks the host's UI thread: the host
//! pushes buffer text in and receives events back.
//!
//! [`watch`]: tokio::sync::watch

pub mod error;
pub mod event;
pub mod file;
pub mod git;
pub mod manager;
pub mod session;
pub mod thread;

#[cfg(test)]
pub(crate) mod test_support;

pub use error::SessionError;
pub use event::SessionEvent;
pub use file::SessionFile;
pub use git::GitProvider;
pub use manager::{BufferId, ManagerState, SessionManager, TextBufferInfo};
pub use session::{PullRequestHandle, Session};
pub use thread::{CommentId, InlineCommentThread, ReviewComment};

// Re-export the mapping result type consumers match on.
pub use gh_review_diff::BufferLine;
