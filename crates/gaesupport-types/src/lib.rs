//! Shared types for the gaesupport crates.
//!
//! - [`AppIdentity`]: application and module identity of the running
//!   deployment, used to namespace session keys and derive the project id.
//! - [`TokenProvider`]: access tokens from ambient cloud credentials.
//! - Configuration capability traits so the session and trace crates do not
//!   depend on the full configuration structure.

pub mod config;
pub mod credentials;
pub mod error;
pub mod identity;

pub use config::{
    ConfigProvider, HasSessionConfig, HasTraceConfig, SessionConfigProvider,
    TraceConfigProvider, defaults as config_defaults,
};
pub use credentials::{
    METADATA_TOKEN_URL, MetadataTokenProvider, SharedTokenProvider, StaticTokenProvider,
    TokenProvider,
};
pub use error::{Error, Result};
pub use identity::AppIdentity;
