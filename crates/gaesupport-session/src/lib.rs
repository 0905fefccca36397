//! Write-through session storage.
//!
//! This crate connects a pluggable session handler to two backing services:
//! - a key-value cache ([`CacheClient`], memcached in production) holding
//!   each session payload with a TTL of the configured max lifetime
//! - a durable entity store ([`EntityStore`], Cloud Datastore in production)
//!   holding the `sessions` kind, used as fallback on cache miss and as the
//!   source of truth for stale-session purges
//!
//! Reads try the cache first and fall back to the durable store. Writes
//! always refresh the cache and only rewrite the durable entity when the
//! payload changed since it was read.
//!
//! # Example
//!
//! ```rust,ignore
//! use gaesupport_session::{DataStoreSessionHandler, SessionHandler, SessionStoreConfig};
//!
//! let config = SessionStoreConfig::new(identity.session_prefix())
//!     .with_max_lifetime(Duration::from_secs(3600));
//! let mut handler = DataStoreSessionHandler::new(cache, store, config);
//!
//! let payload = handler.read(&session_id).await;
//! handler.write(&session_id, &updated).await;
//! handler.close().await;
//! ```

mod cache;
mod config;
mod datastore;
mod entity;
mod error;
mod handler;
mod memcache;
mod memory;
mod store;
mod ttl;

pub use cache::{CacheClient, SharedCache};
pub use config::SessionStoreConfig;
pub use datastore::{DATASTORE_API_URL, DatastoreClient, MAX_MUTATIONS_PER_COMMIT};
pub use entity::{
    Entity, EntityStore, FilterOp, Key, Property, PropertyDef, PropertyFilter, Query, Schema,
    SharedEntityStore, Value, ValueKind, session_schema,
};
pub use error::{CacheError, CacheResult, EntityError, EntityResult, SessionError, SessionResult};
pub use handler::SessionHandler;
pub use memcache::{MAX_KEY_LENGTH, MAX_VALUE_LENGTH, MemcacheClient};
pub use memory::{InMemoryCache, InMemoryEntityStore};
pub use store::{DataStoreSessionHandler, GcReport, SESSION_KIND};
pub use ttl::TtlTracker;
