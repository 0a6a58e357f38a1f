//! In-process collaborators backed by `tokio` locks.
//!
//! Used by tests and by single-node deployments without `PostgreSQL`. Each
//! store upholds the same contracts as its database-backed counterpart,
//! including the all-or-nothing conditional interval insert.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use geotrack_types::{
    EntityId, Geofence, GeofenceId, GridCell, LocationEvent, MembershipInterval,
};
use tokio::sync::RwLock;

use crate::error::StoreError;
use crate::store::{GeofenceStore, IntervalStore, LatestLocationStore};

/// Geofences held in memory, indexed by owning cell.
#[derive(Debug, Default)]
pub struct MemoryGeofenceStore {
    by_cell: RwLock<HashMap<GridCell, Vec<Geofence>>>,
}

impl MemoryGeofenceStore {
    /// An empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// A store pre-loaded with `geofences`.
    pub fn with_geofences(geofences: impl IntoIterator<Item = Geofence>) -> Self {
        let mut by_cell: HashMap<GridCell, Vec<Geofence>> = HashMap::new();
        for geofence in geofences {
            by_cell.entry(geofence.grid_cell).or_default().push(geofence);
        }
        Self {
            by_cell: RwLock::new(by_cell),
        }
    }

    /// Add a geofence under its owning cell.
    pub async fn insert(&self, geofence: Geofence) {
        self.by_cell
            .write()
            .await
            .entry(geofence.grid_cell)
            .or_default()
            .push(geofence);
    }
}

impl GeofenceStore for MemoryGeofenceStore {
    async fn list_geofences(&self) -> Result<Vec<Geofence>, StoreError> {
        let by_cell = self.by_cell.read().await;
        Ok(by_cell.values().flatten().cloned().collect())
    }

    async fn geofences_in_cell(&self, cell: GridCell) -> Result<Vec<Geofence>, StoreError> {
        let by_cell = self.by_cell.read().await;
        Ok(by_cell.get(&cell).cloned().unwrap_or_default())
    }
}

/// Membership intervals held in memory.
#[derive(Debug, Default)]
pub struct MemoryIntervalStore {
    intervals: RwLock<Vec<MembershipInterval>>,
}

impl MemoryIntervalStore {
    /// An empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Every interval ever recorded, in insertion order.
    pub async fn all(&self) -> Vec<MembershipInterval> {
        self.intervals.read().await.clone()
    }
}

impl IntervalStore for MemoryIntervalStore {
    async fn open_intervals(
        &self,
        entity_id: EntityId,
        at: DateTime<Utc>,
    ) -> Result<Vec<MembershipInterval>, StoreError> {
        let intervals = self.intervals.read().await;
        Ok(intervals
            .iter()
            .filter(|i| i.entity_id == entity_id && i.is_open() && i.entry_timestamp <= at)
            .cloned()
            .collect())
    }

    async fn insert_open_intervals(
        &self,
        entity_id: EntityId,
        geofence_ids: &[GeofenceId],
        entry: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut intervals = self.intervals.write().await;
        let conflict = geofence_ids.iter().find(|gid| {
            intervals
                .iter()
                .any(|i| i.entity_id == entity_id && i.geofence_id == **gid && i.is_open())
        });
        if let Some(&geofence_id) = conflict {
            return Err(StoreError::IntervalConflict {
                entity_id,
                geofence_id,
            });
        }
        for &geofence_id in geofence_ids {
            intervals.push(MembershipInterval::open(entity_id, geofence_id, entry));
        }
        Ok(())
    }

    async fn close_open_intervals(
        &self,
        entity_id: EntityId,
        geofence_ids: &[GeofenceId],
        exit: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let mut intervals = self.intervals.write().await;
        let mut closed: u64 = 0;
        for interval in intervals.iter_mut().filter(|i| {
            i.entity_id == entity_id
                && i.is_open()
                && i.entry_timestamp < exit
                && geofence_ids.contains(&i.geofence_id)
        }) {
            interval.exit_timestamp = Some(exit);
            closed = closed.saturating_add(1);
        }
        Ok(closed)
    }

    async fn recent_intervals(
        &self,
        entity_id: EntityId,
        limit: usize,
    ) -> Result<Vec<MembershipInterval>, StoreError> {
        let intervals = self.intervals.read().await;
        let mut recent: Vec<MembershipInterval> = intervals
            .iter()
            .filter(|i| i.entity_id == entity_id)
            .cloned()
            .collect();
        recent.sort_by(|a, b| b.entry_timestamp.cmp(&a.entry_timestamp));
        recent.truncate(limit);
        Ok(recent)
    }
}

/// Latest locations held in memory.
#[derive(Debug, Default)]
pub struct MemoryLocationStore {
    latest: RwLock<HashMap<EntityId, LocationEvent>>,
}

impl MemoryLocationStore {
    /// An empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// The latest location recorded for `entity_id`.
    pub async fn latest(&self, entity_id: EntityId) -> Option<LocationEvent> {
        self.latest.read().await.get(&entity_id).cloned()
    }
}

impl LatestLocationStore for MemoryLocationStore {
    async fn set_latest_location(&self, event: &LocationEvent) -> Result<(), StoreError> {
        self.latest
            .write()
            .await
            .insert(event.entity_id, event.clone());
        Ok(())
    }
}
