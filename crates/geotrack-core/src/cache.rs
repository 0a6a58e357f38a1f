//! Time-bounded caching of geofence lookups.
//!
//! Geofences change rarely and are read once per event, so
//! [`CachedGeofenceStore`] keeps each cell's geofences for a fixed TTL in
//! front of any [`GeofenceStore`]. The cache is an ordinary value owned by
//! whoever builds the ingestor; expiry and invalidation are explicit.

use std::collections::HashMap;
use std::hash::Hash;
use std::time::Duration;

use geotrack_types::{Geofence, GridCell};
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::debug;

use crate::error::StoreError;
use crate::store::GeofenceStore;

/// A map whose entries expire `ttl` after insertion.
#[derive(Debug)]
pub struct TimedCache<K, V> {
    ttl: Duration,
    entries: HashMap<K, (Instant, V)>,
}

impl<K: Eq + Hash, V: Clone> TimedCache<K, V> {
    /// An empty cache with the given time-to-live.
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: HashMap::new(),
        }
    }

    /// The cached value for `key`, unless it is missing or expired.
    pub fn get(&self, key: &K) -> Option<V> {
        let (inserted, value) = self.entries.get(key)?;
        (inserted.elapsed() < self.ttl).then(|| value.clone())
    }

    /// Cache `value` under `key`, restarting its TTL.
    pub fn insert(&mut self, key: K, value: V) {
        self.entries.insert(key, (Instant::now(), value));
    }

    /// Drop the entry for `key`.
    pub fn invalidate(&mut self, key: &K) {
        self.entries.remove(key);
    }

    /// Drop every entry.
    pub fn invalidate_all(&mut self) {
        self.entries.clear();
    }

    /// Drop expired entries.
    pub fn purge_expired(&mut self) {
        let ttl = self.ttl;
        self.entries.retain(|_, (inserted, _)| inserted.elapsed() < ttl);
    }

    /// Number of stored entries, expired ones included.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A [`GeofenceStore`] that caches the wrapped store's answers.
#[derive(Debug)]
pub struct CachedGeofenceStore<S> {
    inner: S,
    by_cell: RwLock<TimedCache<GridCell, Vec<Geofence>>>,
    listing: RwLock<TimedCache<(), Vec<Geofence>>>,
}

impl<S: GeofenceStore> CachedGeofenceStore<S> {
    /// Wrap `inner`, caching results for `ttl`.
    pub fn new(inner: S, ttl: Duration) -> Self {
        Self {
            inner,
            by_cell: RwLock::new(TimedCache::new(ttl)),
            listing: RwLock::new(TimedCache::new(ttl)),
        }
    }

    /// Forget everything, e.g. after geofences were re-provisioned.
    pub async fn invalidate_all(&self) {
        self.by_cell.write().await.invalidate_all();
        self.listing.write().await.invalidate_all();
    }

    /// Forget the cached geofences of one cell.
    pub async fn invalidate_cell(&self, cell: GridCell) {
        self.by_cell.write().await.invalidate(&cell);
        self.listing.write().await.invalidate_all();
    }

    /// The wrapped store.
    pub const fn inner(&self) -> &S {
        &self.inner
    }
}

impl<S: GeofenceStore> GeofenceStore for CachedGeofenceStore<S> {
    async fn list_geofences(&self) -> Result<Vec<Geofence>, StoreError> {
        if let Some(hit) = self.listing.read().await.get(&()) {
            return Ok(hit);
        }
        let geofences = self.inner.list_geofences().await?;
        self.listing.write().await.insert((), geofences.clone());
        Ok(geofences)
    }

    async fn geofences_in_cell(&self, cell: GridCell) -> Result<Vec<Geofence>, StoreError> {
        if let Some(hit) = self.by_cell.read().await.get(&cell) {
            return Ok(hit);
        }
        let geofences = self.inner.geofences_in_cell(cell).await?;
        debug!(%cell, count = geofences.len(), "geofence cache refreshed");
        let mut by_cell = self.by_cell.write().await;
        by_cell.purge_expired();
        by_cell.insert(cell, geofences.clone());
        Ok(geofences)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn entries_expire_after_ttl() {
        let mut cache = TimedCache::new(Duration::from_secs(10));
        cache.insert("a", 1);
        assert_eq!(cache.get(&"a"), Some(1));
        tokio::time::advance(Duration::from_secs(9)).await;
        assert_eq!(cache.get(&"a"), Some(1));
        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(cache.get(&"a"), None);
        cache.purge_expired();
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn invalidate_drops_entries() {
        let mut cache = TimedCache::new(Duration::from_secs(60));
        cache.insert(1, "x");
        cache.insert(2, "y");
        cache.invalidate(&1);
        assert_eq!(cache.get(&1), None);
        assert_eq!(cache.len(), 1);
        cache.invalidate_all();
        assert!(cache.is_empty());
    }

    #[derive(Default)]
    struct CountingStore {
        calls: AtomicUsize,
    }

    impl GeofenceStore for CountingStore {
        async fn list_geofences(&self) -> Result<Vec<Geofence>, StoreError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Vec::new())
        }

        async fn geofences_in_cell(&self, _cell: GridCell) -> Result<Vec<Geofence>, StoreError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Vec::new())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn cached_store_hits_inner_once_per_ttl() {
        let store = CachedGeofenceStore::new(CountingStore::default(), Duration::from_secs(60));
        let cell = GridCell::new(1, 2);
        for _ in 0..3 {
            assert!(store.geofences_in_cell(cell).await.is_ok());
        }
        assert_eq!(store.inner().calls.load(Ordering::SeqCst), 1);

        tokio::time::advance(Duration::from_secs(61)).await;
        assert!(store.geofences_in_cell(cell).await.is_ok());
        assert_eq!(store.inner().calls.load(Ordering::SeqCst), 2);

        store.invalidate_all().await;
        assert!(store.geofences_in_cell(cell).await.is_ok());
        assert!(store.list_geofences().await.is_ok());
        assert!(store.list_geofences().await.is_ok());
        assert_eq!(store.inner().calls.load(Ordering::SeqCst), 4);
    }
}
