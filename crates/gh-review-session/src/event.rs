//! Typed change notifications published to session consumers.

/// An event published on a session's broadcast channel.
///
/// Consumers (margins, glyphs, peek views) subscribe once and re-query the
/// session state they care about when an event arrives; the event itself
/// carries only enough to decide whether to re-query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// A file's diff, threads or mapped line numbers changed.
    ///
    /// Raised exactly once per refresh, comment mutation or applied buffer
    /// remap of the named file.
    FileChanged { path: String },

    /// The session's pending-review flag flipped.
    PendingReviewChanged { active: bool },

    /// A full refresh from the server completed.
    Refreshed,
}
