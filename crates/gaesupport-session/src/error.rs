//! Error types for cache, entity store and session operations.

/// Error type for cache client operations.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// Transport failure talking to the cache server.
    #[error("Cache I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Connecting or waiting for a reply took too long.
    #[error("Cache operation timed out")]
    Timeout,

    /// Key rejected before it reached the server.
    #[error("Invalid cache key: {0}")]
    InvalidKey(String),

    /// Server replied with an error line.
    #[error("Cache server error: {0}")]
    Server(String),

    /// Reply did not follow the protocol.
    #[error("Cache protocol error: {0}")]
    Protocol(String),

    /// Cache backend is unavailable.
    #[error("Cache unavailable")]
    Unavailable,
}

/// Error type for durable entity store operations.
#[derive(Debug, thiserror::Error)]
pub enum EntityError {
    /// HTTP transport failure.
    #[error("Datastore request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The datastore API returned a non-success status.
    #[error("Datastore API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// No access token could be obtained.
    #[error("Datastore credentials error: {0}")]
    Credentials(#[from] gaesupport_types::Error),

    /// Entity does not match its kind's schema.
    #[error("Schema violation: {0}")]
    Schema(String),

    /// Response could not be decoded.
    #[error("Failed to decode datastore response: {0}")]
    Decode(String),

    /// Store is unavailable.
    #[error("Entity store unavailable")]
    Unavailable,
}

/// Error type for session store operations that surface failures.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Entity(#[from] EntityError),
}

/// Result type for cache operations.
pub type CacheResult<T> = std::result::Result<T, CacheError>;

/// Result type for entity store operations.
pub type EntityResult<T> = std::result::Result<T, EntityError>;

/// Result type for session store operations.
pub type SessionResult<T> = std::result::Result<T, SessionError>;
