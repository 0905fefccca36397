//! Error types shared by the gaesupport crates.

use thiserror::Error;

/// Result type alias using the shared error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while resolving ambient credentials.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Credentials error: {0}")]
    Credentials(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Invalid token response: {0}")]
    InvalidResponse(String),
}
