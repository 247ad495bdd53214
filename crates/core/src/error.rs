//! Error types for the pacing library.

/// Errors that can occur around the pacing engine.
///
/// The [`OverbufferWindow`](crate::pacing::OverbufferWindow) itself never
/// fails: every decision is either "send now" or a future time. Errors come
/// from the layers around it:
///
/// - **Configuration**: [`InvalidConfig`](Self::InvalidConfig), returned
///   by [`PacingConfig::validate`](crate::PacingConfig::validate).
/// - **Transport**: [`Io`](Self::Io), socket failures while sending.
/// - **Session**: [`SessionNotFound`](Self::SessionNotFound),
///   [`TrackNotFound`](Self::TrackNotFound),
///   [`SessionNotPlaying`](Self::SessionNotPlaying).
/// - **Server**: [`NotStarted`](Self::NotStarted),
///   [`AlreadyRunning`](Self::AlreadyRunning).
#[derive(Debug, thiserror::Error)]
pub enum PacingError {
    /// Underlying I/O or socket error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A pacing parameter is outside its valid range.
    #[error("invalid pacing config: {field} {reason}")]
    InvalidConfig {
        field: &'static str,
        reason: &'static str,
    },

    /// No session with the given ID exists in the [`SessionManager`](crate::session::SessionManager).
    #[error("session not found: {0}")]
    SessionNotFound(String),

    /// The session exists but has no track at the given index.
    #[error("track {track} not found in session {session}")]
    TrackNotFound { session: String, track: usize },

    /// Pause requested for a session that is not playing.
    #[error("session not in playing state: {0}")]
    SessionNotPlaying(String),

    /// [`Server::start`](crate::Server::start) has not been called yet.
    #[error("server not started")]
    NotStarted,

    /// [`Server::start`](crate::Server::start) was called while already running.
    #[error("server already running")]
    AlreadyRunning,
}

/// Convenience alias for `Result<T, PacingError>`.
pub type Result<T> = std::result::Result<T, PacingError>;
