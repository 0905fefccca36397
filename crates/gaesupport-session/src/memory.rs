//! In-memory adapters for the cache and entity store ports.
//!
//! Used by tests and local development. Both can be switched into an
//! "unavailable" mode where every call fails, to exercise degraded paths.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::cache::CacheClient;
use crate::entity::{Entity, EntityStore, Key, Query};
use crate::error::{CacheError, CacheResult, EntityError, EntityResult};
use crate::ttl::TtlTracker;

/// memcached treats a zero TTL as "never expires".
const NO_EXPIRY: Duration = Duration::from_secs(60 * 60 * 24 * 365 * 10);

#[derive(Debug, Default)]
struct CacheState {
    values: HashMap<String, String>,
    ttl: TtlTracker,
}

/// Process-local cache with per-key TTL expiry.
#[derive(Debug, Default)]
pub struct InMemoryCache {
    state: Mutex<CacheState>,
    unavailable: AtomicBool,
    gets: AtomicUsize,
    sets: AtomicUsize,
    deletes: AtomicUsize,
    closes: AtomicUsize,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call fail with [`CacheError::Unavailable`].
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Value for a key without counting a `get`.
    pub fn peek(&self, key: &str) -> Option<String> {
        let state = self.state.lock();
        if state.ttl.is_expired(key) {
            return None;
        }
        state.values.get(key).cloned()
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        let mut state = self.state.lock();
        Self::evict_expired(&mut state);
        state.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get_count(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }

    pub fn set_count(&self) -> usize {
        self.sets.load(Ordering::SeqCst)
    }

    pub fn delete_count(&self) -> usize {
        self.deletes.load(Ordering::SeqCst)
    }

    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    fn check_available(&self) -> CacheResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(CacheError::Unavailable)
        } else {
            Ok(())
        }
    }

    fn evict_expired(state: &mut CacheState) {
        for key in state.ttl.drain_expired() {
            state.values.remove(&key);
        }
    }
}

#[async_trait]
impl CacheClient for InMemoryCache {
    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;
        let mut state = self.state.lock();
        Self::evict_expired(&mut state);
        Ok(state.values.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<bool> {
        self.sets.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;
        let ttl = if ttl.is_zero() { NO_EXPIRY } else { ttl };
        let mut state = self.state.lock();
        state.values.insert(key.to_string(), value.to_string());
        state.ttl.set(key, ttl);
        Ok(true)
    }

    async fn delete(&self, key: &str) -> CacheResult<bool> {
        self.deletes.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;
        let mut state = self.state.lock();
        Self::evict_expired(&mut state);
        state.ttl.remove(key);
        Ok(state.values.remove(key).is_some())
    }

    async fn close(&self) -> CacheResult<bool> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(true)
    }
}

/// Process-local entity store evaluating typed query filters.
#[derive(Debug, Default)]
pub struct InMemoryEntityStore {
    entities: Mutex<BTreeMap<Key, Entity>>,
    unavailable: AtomicBool,
    fetches: AtomicUsize,
    upserts: AtomicUsize,
    deletes: AtomicUsize,
    queries: AtomicUsize,
}

impl InMemoryEntityStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an entity directly, bypassing counters.
    pub fn seed(&self, entity: Entity) {
        self.entities.lock().insert(entity.key.clone(), entity);
    }

    /// Stored entity for a key, bypassing counters.
    pub fn entity(&self, key: &Key) -> Option<Entity> {
        self.entities.lock().get(key).cloned()
    }

    pub fn len(&self) -> usize {
        self.entities.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.lock().is_empty()
    }

    /// Make every subsequent call fail with [`EntityError::Unavailable`].
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn upsert_count(&self) -> usize {
        self.upserts.load(Ordering::SeqCst)
    }

    /// Number of `delete` calls (not keys).
    pub fn delete_count(&self) -> usize {
        self.deletes.load(Ordering::SeqCst)
    }

    pub fn query_count(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }

    fn check_available(&self) -> EntityResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(EntityError::Unavailable)
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl EntityStore for InMemoryEntityStore {
    async fn fetch_by_key(&self, key: &Key) -> EntityResult<Option<Entity>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;
        Ok(self.entities.lock().get(key).cloned())
    }

    async fn upsert(&self, entity: &Entity) -> EntityResult<()> {
        self.upserts.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;
        self.entities
            .lock()
            .insert(entity.key.clone(), entity.clone());
        Ok(())
    }

    async fn delete(&self, keys: &[Key]) -> EntityResult<()> {
        self.deletes.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;
        let mut entities = self.entities.lock();
        for key in keys {
            entities.remove(key);
        }
        Ok(())
    }

    async fn query(&self, query: &Query) -> EntityResult<Vec<Entity>> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;
        Ok(self
            .entities
            .lock()
            .values()
            .filter(|e| query.matches(e))
            .map(|e| {
                if query.keys_only {
                    Entity::new(e.key.clone())
                } else {
                    e.clone()
                }
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{FilterOp, Value, session_schema};
    use chrono::{TimeZone, Utc};

    #[tokio::test]
    async fn test_cache_set_get_delete() {
        let cache = InMemoryCache::new();
        assert!(cache.set("k", "v", Duration::from_secs(60)).await.unwrap());
        assert_eq!(cache.get("k").await.unwrap().as_deref(), Some("v"));
        assert!(cache.delete("k").await.unwrap());
        assert!(!cache.delete("k").await.unwrap());
        assert_eq!(cache.get("k").await.unwrap(), None);
        assert_eq!(cache.set_count(), 1);
        assert_eq!(cache.delete_count(), 2);
    }

    #[tokio::test]
    async fn test_cache_ttl_expiry() {
        let cache = InMemoryCache::new();
        cache.set("k", "v", Duration::from_millis(10)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(cache.get("k").await.unwrap(), None);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_cache_zero_ttl_never_expires() {
        let cache = InMemoryCache::new();
        cache.set("k", "v", Duration::ZERO).await.unwrap();
        assert_eq!(cache.peek("k").as_deref(), Some("v"));
    }

    #[tokio::test]
    async fn test_cache_unavailable() {
        let cache = InMemoryCache::new();
        cache.set_unavailable(true);
        assert!(matches!(
            cache.get("k").await,
            Err(CacheError::Unavailable)
        ));
        assert!(cache.set("k", "v", Duration::from_secs(1)).await.is_err());
        assert!(cache.close().await.unwrap());
    }

    #[tokio::test]
    async fn test_store_query_filters() {
        let store = InMemoryEntityStore::new();
        let schema = session_schema();
        let old = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let new = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
        let cutoff = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();

        store.seed(
            schema
                .create_entity("old", [("lastaccess", Value::from(old))])
                .unwrap(),
        );
        store.seed(
            schema
                .create_entity("new", [("lastaccess", Value::from(new))])
                .unwrap(),
        );

        let query =
            Query::kind(schema.kind()).filter("lastaccess", FilterOp::LessThan, cutoff.into());
        let found = store.query(&query).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].key.name, "old");
    }

    #[tokio::test]
    async fn test_store_keys_only_query_drops_properties() {
        let store = InMemoryEntityStore::new();
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap();
        store.seed(
            session_schema()
                .create_entity("old", [("data", Value::from("x")), ("lastaccess", Value::from(at))])
                .unwrap(),
        );

        let query = Query::kind("sessions")
            .filter("lastaccess", FilterOp::LessThan, Value::from(at + chrono::TimeDelta::hours(1)))
            .keys_only();
        let found = store.query(&query).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].key.name, "old");
        assert!(found[0].properties.is_empty());
    }

    #[tokio::test]
    async fn test_store_upsert_delete_counts() {
        let store = InMemoryEntityStore::new();
        let entity = session_schema()
            .create_entity("a", [("data", Value::from("x"))])
            .unwrap();
        store.upsert(&entity).await.unwrap();
        store.upsert(&entity).await.unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(store.upsert_count(), 2);

        store.delete(&[entity.key.clone()]).await.unwrap();
        assert!(store.is_empty());
        assert_eq!(store.delete_count(), 1);
    }

    #[tokio::test]
    async fn test_store_unavailable() {
        let store = InMemoryEntityStore::new();
        store.set_unavailable(true);
        let key = Key::new("sessions", "a");
        assert!(matches!(
            store.fetch_by_key(&key).await,
            Err(EntityError::Unavailable)
        ));
    }
}
