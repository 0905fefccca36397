//! Access tokens from ambient cloud credentials.
//!
//! Cloud APIs are called with a bearer token obtained from the instance
//! metadata server. No credential flows are implemented here; the runtime
//! environment is expected to provide a service account.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::{Error, Result};

/// Token endpoint of the instance metadata server.
pub const METADATA_TOKEN_URL: &str =
    "http://metadata.google.internal/computeMetadata/v1/instance/service-accounts/default/token";

/// Refresh this long before the advertised expiry.
const REFRESH_BUFFER_SECS: i64 = 60;

/// Source of bearer tokens for cloud API calls.
#[async_trait]
pub trait TokenProvider: Send + Sync + std::fmt::Debug {
    /// Current access token, or `None` when requests go out unauthenticated
    /// (e.g. against a local emulator).
    async fn access_token(&self) -> Result<Option<String>>;
}

/// Shared token provider handle.
pub type SharedTokenProvider = Arc<dyn TokenProvider>;

/// A fixed token, or none at all.
#[derive(Debug, Clone, Default)]
pub struct StaticTokenProvider {
    token: Option<String>,
}

impl StaticTokenProvider {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: Some(token.into()),
        }
    }

    /// Provider that never attaches a token.
    pub fn anonymous() -> Self {
        Self { token: None }
    }
}

#[async_trait]
impl TokenProvider for StaticTokenProvider {
    async fn access_token(&self) -> Result<Option<String>> {
        Ok(self.token.clone())
    }
}

#[derive(Debug, Deserialize)]
struct MetadataToken {
    access_token: String,
    expires_in: i64,
}

#[derive(Debug, Clone)]
struct CachedToken {
    value: String,
    expires_at: DateTime<Utc>,
}

/// Token provider backed by the instance metadata server.
///
/// Tokens are cached until shortly before they expire.
#[derive(Debug)]
pub struct MetadataTokenProvider {
    client: reqwest::Client,
    endpoint: String,
    cached: RwLock<Option<CachedToken>>,
}

impl MetadataTokenProvider {
    pub fn new() -> Self {
        Self::with_endpoint(METADATA_TOKEN_URL)
    }

    /// Use a custom token endpoint.
    pub fn with_endpoint(endpoint: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .unwrap_or_default();
        Self {
            client,
            endpoint: endpoint.into(),
            cached: RwLock::new(None),
        }
    }

    async fn fetch(&self) -> Result<CachedToken> {
        let response = self
            .client
            .get(&self.endpoint)
            .header("Metadata-Flavor", "Google")
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Error::Credentials(format!(
                "metadata server returned {}",
                response.status()
            )));
        }

        let token: MetadataToken = response
            .json()
            .await
            .map_err(|e| Error::InvalidResponse(e.to_string()))?;

        debug!(expires_in = token.expires_in, "Fetched access token from metadata server");

        Ok(CachedToken {
            value: token.access_token,
            expires_at: Utc::now() + chrono::Duration::seconds(token.expires_in),
        })
    }
}

impl Default for MetadataTokenProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TokenProvider for MetadataTokenProvider {
    async fn access_token(&self) -> Result<Option<String>> {
        {
            let cached = self.cached.read().await;
            if let Some(token) = cached.as_ref()
                && Utc::now() + chrono::Duration::seconds(REFRESH_BUFFER_SECS) < token.expires_at
            {
                return Ok(Some(token.value.clone()));
            }
        }

        let token = self.fetch().await?;
        let value = token.value.clone();
        *self.cached.write().await = Some(token);
        Ok(Some(value))
    }
}
