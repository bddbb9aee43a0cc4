//! Error types for drift-relay.

/// Main error type for relay operations.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    /// Protocol error.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Protocol layer errors. Always isolated to one connection: a peer's
/// malformed traffic never affects other peers or topics.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Envelope could not be decoded.
    #[error("invalid envelope: {reason}")]
    InvalidEnvelope {
        /// Why the envelope was rejected.
        reason: String,
    },

    /// Frame exceeded the configured size limit.
    #[error("frame too large: {size} > {limit}")]
    FrameTooLarge {
        /// Declared frame size.
        size: usize,
        /// Configured limit.
        limit: usize,
    },

    /// A join envelope arrived without a topic.
    #[error("missing topic on join")]
    MissingTopic,

    /// A second join arrived on an already-joined connection.
    #[error("topic already set for this connection")]
    AlreadyJoined,

    /// A non-join envelope arrived before the join.
    #[error("join required before other messages")]
    JoinRequired,

    /// Socket-level failure.
    #[error("stream error: {0}")]
    Stream(String),
}

/// Result type alias for relay operations.
pub type Result<T> = std::result::Result<T, RelayError>;

/// Result type alias for protocol operations.
pub type ProtocolResult<T> = std::result::Result<T, ProtocolError>;
