//! Write-through session handler over a cache and a durable entity store.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use tracing::{debug, info, trace, warn};

use crate::cache::SharedCache;
use crate::config::SessionStoreConfig;
use crate::entity::{FilterOp, Key, Query, Schema, SharedEntityStore, Value, session_schema};
use crate::error::{EntityResult, SessionResult};
use crate::handler::SessionHandler;

/// Entity kind holding durable session copies.
pub const SESSION_KIND: &str = "sessions";

const DATA_PROPERTY: &str = "data";
const LAST_ACCESS_PROPERTY: &str = "lastaccess";

/// Outcome of a stale-session purge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GcReport {
    /// Stale entities matched by the query.
    pub found: usize,
    /// Entities deleted.
    pub deleted: usize,
}

/// Session handler writing through to memcached and Cloud Datastore.
///
/// One instance serves one request. The clock is read once at construction:
/// every durable write in the request stamps the same `lastaccess`, and the
/// purge threshold is fixed relative to it.
pub struct DataStoreSessionHandler {
    cache: SharedCache,
    store: SharedEntityStore,
    schema: Schema,
    config: SessionStoreConfig,
    last_access: DateTime<Utc>,
    delete_before: DateTime<Utc>,
    /// Payload as last read from, or written to, the durable store.
    original: Option<String>,
}

impl std::fmt::Debug for DataStoreSessionHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataStoreSessionHandler")
            .field("config", &self.config)
            .field("last_access", &self.last_access)
            .field("delete_before", &self.delete_before)
            .finish_non_exhaustive()
    }
}

impl DataStoreSessionHandler {
    pub fn new(cache: SharedCache, store: SharedEntityStore, config: SessionStoreConfig) -> Self {
        Self::with_clock(cache, store, config, Utc::now())
    }

    /// Create a handler whose notion of "now" is fixed to `now`.
    pub fn with_clock(
        cache: SharedCache,
        store: SharedEntityStore,
        config: SessionStoreConfig,
        now: DateTime<Utc>,
    ) -> Self {
        let stale_after = TimeDelta::from_std(config.stale_after).unwrap_or(TimeDelta::days(1));
        let delete_before = now
            .checked_sub_signed(stale_after)
            .unwrap_or(DateTime::<Utc>::MIN_UTC);

        Self {
            cache,
            store,
            schema: session_schema(),
            config,
            last_access: now,
            delete_before,
            original: None,
        }
    }

    pub fn config(&self) -> &SessionStoreConfig {
        &self.config
    }

    /// Timestamp stamped on durable writes.
    pub fn last_access(&self) -> DateTime<Utc> {
        self.last_access
    }

    /// Entities last accessed strictly before this are stale.
    pub fn delete_before(&self) -> DateTime<Utc> {
        self.delete_before
    }

    /// Delete every durable session entity last accessed before
    /// [`delete_before`](Self::delete_before).
    ///
    /// Unlike the request path this surfaces store failures: it is run by a
    /// scheduler that needs to know the purge did not happen.
    pub async fn purge_stale(&self) -> SessionResult<GcReport> {
        let query = Query::kind(self.schema.kind()).keys_only().filter(
            LAST_ACCESS_PROPERTY,
            FilterOp::LessThan,
            Value::from(self.delete_before),
        );
        let stale = self.store.query(&query).await?;

        info!(
            count = stale.len(),
            threshold = %self.delete_before.to_rfc3339(),
            "Found stale sessions"
        );

        if stale.is_empty() {
            return Ok(GcReport::default());
        }

        let keys: Vec<Key> = stale.into_iter().map(|e| e.key).collect();
        self.store.delete(&keys).await?;

        Ok(GcReport {
            found: keys.len(),
            deleted: keys.len(),
        })
    }

    fn session_key(&self, id: &str) -> String {
        format!("{}{}", self.config.key_prefix, id)
    }

    async fn upsert(&self, key: &str, data: &str) -> EntityResult<()> {
        let entity = self.schema.create_entity(
            key,
            [
                (DATA_PROPERTY, Value::from(data)),
                (LAST_ACCESS_PROPERTY, Value::from(self.last_access)),
            ],
        )?;
        self.store.upsert(&entity).await
    }
}

#[async_trait]
impl SessionHandler for DataStoreSessionHandler {
    async fn open(&mut self, _save_path: &str, _session_name: &str) -> bool {
        true
    }

    async fn close(&mut self) -> bool {
        match self.cache.close().await {
            Ok(closed) => closed,
            Err(e) => {
                warn!(error = %e, "Failed to close session cache");
                false
            }
        }
    }

    async fn read(&mut self, id: &str) -> String {
        let key = self.session_key(id);
        self.original = None;

        match self.cache.get(&key).await {
            Ok(Some(data)) => {
                trace!(key = %key, "Session cache hit");
                self.original = Some(data.clone());
                return data;
            }
            Ok(None) => trace!(key = %key, "Session cache miss"),
            Err(e) => warn!(key = %key, error = %e, "Session cache read failed"),
        }

        match self.store.fetch_by_key(&self.schema.key(&key)).await {
            Ok(Some(entity)) => {
                debug!(key = %key, "Session loaded from datastore");
                let data = entity.get_str(DATA_PROPERTY).unwrap_or_default().to_string();
                self.original = Some(data.clone());
                data
            }
            Ok(None) => String::new(),
            Err(e) => {
                warn!(key = %key, error = %e, "Session datastore read failed");
                String::new()
            }
        }
    }

    async fn write(&mut self, id: &str, data: &str) -> bool {
        let key = self.session_key(id);

        let cached = match self.cache.set(&key, data, self.config.max_lifetime).await {
            Ok(stored) => stored,
            Err(e) => {
                warn!(key = %key, error = %e, "Session cache write failed");
                false
            }
        };

        if self.original.as_deref() == Some(data) {
            trace!(key = %key, "Session unchanged, skipping datastore write");
            return cached;
        }

        match self.upsert(&key, data).await {
            Ok(()) => {
                debug!(key = %key, bytes = data.len(), "Session written to datastore");
                self.original = Some(data.to_string());
            }
            Err(e) => warn!(key = %key, error = %e, "Session datastore write failed"),
        }

        cached
    }

    async fn destroy(&mut self, id: &str) -> bool {
        let key = self.session_key(id);
        self.original = None;

        let deleted = match self.cache.delete(&key).await {
            Ok(deleted) => deleted,
            Err(e) => {
                warn!(key = %key, error = %e, "Session cache delete failed");
                false
            }
        };

        let entity_key = self.schema.key(&key);
        match self.store.fetch_by_key(&entity_key).await {
            Ok(Some(_)) => {
                if let Err(e) = self.store.delete(&[entity_key]).await {
                    warn!(key = %key, error = %e, "Session datastore delete failed");
                }
            }
            Ok(None) => {}
            Err(e) => warn!(key = %key, error = %e, "Session datastore lookup failed"),
        }

        deleted
    }

    async fn gc(&mut self, _max_lifetime: Duration) -> bool {
        // Cache entries expire on their own; durable purges run via purge_stale.
        true
    }
}
