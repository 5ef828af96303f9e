//! Error types for meshcache

use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while serving or populating the cache
///
/// `Clone` because a single outcome is handed to every caller that was
/// coalesced onto the same in-flight load.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Empty key
    #[error("key is required")]
    InvalidKey,

    /// No group registered under this name
    #[error("no such group: {0}")]
    GroupNotFound(String),

    /// The user-supplied loader failed
    #[error("{0}")]
    Loader(String),

    // =========================================================================
    // Peer Transport Errors
    // =========================================================================
    /// Transport-level failure talking to a peer
    #[error("peer connection error: {0}")]
    PeerConnection(String),

    /// Peer answered with a non-success status
    #[error("peer returned {status}: {body}")]
    PeerStatus { status: u16, body: String },

    /// Peer response body could not be read
    #[error("reading peer response body: {0}")]
    PeerResponse(String),

    // =========================================================================
    // Setup Errors
    // =========================================================================
    /// A peer picker was attached to a group twice
    #[error("peers already registered for group {0}")]
    PeersAlreadyRegistered(String),

    /// Registry refused to replace an existing group
    #[error("group already registered: {0}")]
    DuplicateGroup(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Shorthand for loader implementations
    pub fn loader(reason: impl std::fmt::Display) -> Self {
        Error::Loader(reason.to_string())
    }

    /// True for failures that originate in the peer transport
    pub fn is_peer_error(&self) -> bool {
        matches!(
            self,
            Error::PeerConnection(_) | Error::PeerStatus { .. } | Error::PeerResponse(_)
        )
    }
}
