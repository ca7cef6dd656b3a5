//! Local repository boundary.

use std::path::PathBuf;

/// The engine's view of local git state.
///
/// Implemented by the host. The engine only needs to know where the working
/// tree lives (to resolve editor buffers to repository-relative paths) and
/// which commit a file's on-disk version came from (to detect stale review
/// positions). File content at the review head is fetched through the
/// review API, which is authoritative for commits the local clone may not
/// have.
pub trait GitProvider: Send + Sync {
    /// Absolute path of the repository working tree root.
    fn repository_root(&self) -> PathBuf;

    /// The commit SHA the working tree currently has checked out for the
    /// given repository-relative path.
    fn checked_out_commit(&self, path: &str) -> anyhow::Result<String>;
}
