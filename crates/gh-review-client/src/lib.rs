//! Review API client for pull-request review sessions
//!
//! This crate defines the trait boundary between the review-session engine
//! and the remote review API, plus the shipped GitHub implementation.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │                ReviewApi trait                   │
//! │  - fetch_pull_request() / fetch_diff()           │
//! │  - fetch_review_comments()                       │
//! │  - create_review_comment() / create_reply()      │
//! │  - pending-review lifecycle                      │
//! └─────────────────────────────────────────────────┘
//!                        │
//!                        ▼
//!              ┌──────────────────────┐
//!              │  OctocrabReviewApi   │
//!              │  (GitHub REST)       │
//!              └──────────────────────┘
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use gh_review_client::{OctocrabReviewApi, ReviewApi};
//! use std::sync::Arc;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let octocrab = octocrab::Octocrab::builder()
//!     .personal_token("token".to_string())
//!     .build()?;
//!
//! let api = OctocrabReviewApi::new(Arc::new(octocrab));
//! let pr = api.fetch_pull_request("owner", "repo", 123).await?;
//! println!("reviewing {} ({})", pr.title, pr.head_sha);
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod octocrab_client;
pub mod types;

pub use client::ReviewApi;
pub use octocrab_client::OctocrabReviewApi;
pub use types::{CommentData, PullRequestInfo, ReviewVerdict};

// Re-export octocrab so consumers don't need to depend on it directly
pub use octocrab;
