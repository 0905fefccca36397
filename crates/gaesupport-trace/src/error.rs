//! Error types for trace submission.

/// Error type for trace submission.
#[derive(Debug, thiserror::Error)]
pub enum TraceError {
    /// HTTP transport failure.
    #[error("Trace request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The tracing API returned a non-success status.
    #[error("Trace API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// No access token could be obtained.
    #[error("Trace credentials error: {0}")]
    Credentials(#[from] gaesupport_types::Error),

    /// A batch could not be serialized or parsed.
    #[error("Invalid trace batch: {0}")]
    Batch(#[from] serde_json::Error),
}

/// Result type for trace submission.
pub type TraceResult<T> = std::result::Result<T, TraceError>;
