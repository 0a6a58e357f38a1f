//! Collaborator interfaces: the stores and the pub/sub hub.
//!
//! The core never talks to a database or socket directly. It is generic
//! over these traits; `geotrack-db` and `geotrack-hub` provide the
//! production implementations and [`crate::memory`] provides in-process
//! ones. Methods return `Send` futures so that callers can run them on a
//! multi-threaded runtime and put them under a deadline.

use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use geotrack_types::{
    EntityId, Geofence, GeofenceId, GridCell, GroupOp, LocationEvent, MembershipInterval,
    Notification,
};

use crate::error::{HubError, StoreError};

/// Default number of intervals returned by [`IntervalStore::recent_intervals`].
pub const DEFAULT_RECENT_INTERVALS: usize = 5;

/// Read access to provisioned geofences.
pub trait GeofenceStore: Send + Sync {
    /// Every geofence.
    fn list_geofences(&self) -> impl Future<Output = Result<Vec<Geofence>, StoreError>> + Send;

    /// Geofences whose owning cell equals `cell`.
    fn geofences_in_cell(
        &self,
        cell: GridCell,
    ) -> impl Future<Output = Result<Vec<Geofence>, StoreError>> + Send;
}

/// Persistence of membership intervals.
///
/// Implementations must keep at most one open interval per
/// (entity, geofence) pair.
pub trait IntervalStore: Send + Sync {
    /// Open intervals of `entity_id` entered at or before `at`.
    fn open_intervals(
        &self,
        entity_id: EntityId,
        at: DateTime<Utc>,
    ) -> impl Future<Output = Result<Vec<MembershipInterval>, StoreError>> + Send;

    /// Open one interval per geofence, all entered at `entry`.
    ///
    /// All-or-nothing: if any pair already has an open interval nothing is
    /// written and [`StoreError::IntervalConflict`] is returned.
    fn insert_open_intervals(
        &self,
        entity_id: EntityId,
        geofence_ids: &[GeofenceId],
        entry: DateTime<Utc>,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Close the open intervals of `entity_id` in `geofence_ids` at `exit`.
    ///
    /// Only intervals entered strictly before `exit` are closed. Returns the
    /// number of intervals closed.
    fn close_open_intervals(
        &self,
        entity_id: EntityId,
        geofence_ids: &[GeofenceId],
        exit: DateTime<Utc>,
    ) -> impl Future<Output = Result<u64, StoreError>> + Send;

    /// The latest `limit` intervals of `entity_id`, newest entry first.
    fn recent_intervals(
        &self,
        entity_id: EntityId,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<MembershipInterval>, StoreError>> + Send;
}

/// The latest known position of every entity.
pub trait LatestLocationStore: Send + Sync {
    /// Record `event` as the entity's latest location.
    fn set_latest_location(
        &self,
        event: &LocationEvent,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;
}

/// Group-addressed message delivery.
pub trait PubSubHub: Send + Sync {
    /// Apply membership changes in order.
    fn apply_group_ops(&self, ops: &[GroupOp])
    -> impl Future<Output = Result<(), HubError>> + Send;

    /// Deliver each notification to every member of its group.
    fn publish(
        &self,
        notifications: &[Notification],
    ) -> impl Future<Output = Result<(), HubError>> + Send;
}

impl<T: GeofenceStore> GeofenceStore for Arc<T> {
    fn list_geofences(&self) -> impl Future<Output = Result<Vec<Geofence>, StoreError>> + Send {
        self.as_ref().list_geofences()
    }

    fn geofences_in_cell(
        &self,
        cell: GridCell,
    ) -> impl Future<Output = Result<Vec<Geofence>, StoreError>> + Send {
        self.as_ref().geofences_in_cell(cell)
    }
}

impl<T: IntervalStore> IntervalStore for Arc<T> {
    fn open_intervals(
        &self,
        entity_id: EntityId,
        at: DateTime<Utc>,
    ) -> impl Future<Output = Result<Vec<MembershipInterval>, StoreError>> + Send {
        self.as_ref().open_intervals(entity_id, at)
    }

    fn insert_open_intervals(
        &self,
        entity_id: EntityId,
        geofence_ids: &[GeofenceId],
        entry: DateTime<Utc>,
    ) -> impl Future<Output = Result<(), StoreError>> + Send {
        self.as_ref()
            .insert_open_intervals(entity_id, geofence_ids, entry)
    }

    fn close_open_intervals(
        &self,
        entity_id: EntityId,
        geofence_ids: &[GeofenceId],
        exit: DateTime<Utc>,
    ) -> impl Future<Output = Result<u64, StoreError>> + Send {
        self.as_ref()
            .close_open_intervals(entity_id, geofence_ids, exit)
    }

    fn recent_intervals(
        &self,
        entity_id: EntityId,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<MembershipInterval>, StoreError>> + Send {
        self.as_ref().recent_intervals(entity_id, limit)
    }
}

impl<T: LatestLocationStore> LatestLocationStore for Arc<T> {
    fn set_latest_location(
        &self,
        event: &LocationEvent,
    ) -> impl Future<Output = Result<(), StoreError>> + Send {
        self.as_ref().set_latest_location(event)
    }
}

impl<T: PubSubHub> PubSubHub for Arc<T> {
    fn apply_group_ops(
        &self,
        ops: &[GroupOp],
    ) -> impl Future<Output = Result<(), HubError>> + Send {
        self.as_ref().apply_group_ops(ops)
    }

    fn publish(
        &self,
        notifications: &[Notification],
    ) -> impl Future<Output = Result<(), HubError>> + Send {
        self.as_ref().publish(notifications)
    }
}
