//! Per-entity geofence entry/exit tracking.
//!
//! Membership is kept as intervals in an [`IntervalStore`]. Each new
//! position is diffed against the entity's open intervals:
//!
//! - `entered` = colliding geofences without an open interval
//! - `exited` = open intervals whose geofence no longer collides
//!
//! Intervals entered at exactly the event time count as open when computing
//! `entered`, so replaying an event changes nothing, but only intervals
//! entered strictly earlier can be exited. A closed interval therefore
//! always has `entry < exit`.
//!
//! Event times are truncated to whole microseconds before use, the
//! resolution the interval stores keep, so the tracker and the store always
//! compare the same instant.

use std::collections::BTreeSet;

use chrono::{DateTime, SubsecRound as _, Utc};
use geotrack_types::{EntityId, GeofenceId, MembershipInterval};
use tracing::debug;

use crate::error::StoreError;
use crate::matcher::GeofenceMatcher;
use crate::store::{GeofenceStore, IntervalStore};

/// Fractional-second digits kept by the interval stores (microseconds).
pub const STORED_SUBSEC_DIGITS: u16 = 6;

/// Geofences entered and exited by one position update.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Transitions {
    /// Newly entered geofences.
    pub entered: BTreeSet<GeofenceId>,
    /// Newly exited geofences.
    pub exited: BTreeSet<GeofenceId>,
}

impl Transitions {
    /// Whether nothing changed.
    pub fn is_empty(&self) -> bool {
        self.entered.is_empty() && self.exited.is_empty()
    }
}

/// Computes and persists membership transitions.
#[derive(Debug, Clone)]
pub struct TransitionTracker<G, I> {
    matcher: GeofenceMatcher<G>,
    intervals: I,
}

impl<G: GeofenceStore, I: IntervalStore> TransitionTracker<G, I> {
    /// A tracker matching against `geofences` and recording into `intervals`.
    pub const fn new(geofences: G, intervals: I) -> Self {
        Self {
            matcher: GeofenceMatcher::new(geofences),
            intervals,
        }
    }

    /// Diff the entity's open intervals against the geofences containing
    /// `(lng, lat)` and persist the result.
    ///
    /// New intervals are opened before old ones are closed. Opening is
    /// all-or-nothing and fails with [`StoreError::IntervalConflict`] if an
    /// open interval exists that this event cannot see (one entered after
    /// `at`), in which case nothing is closed either. If the store closes
    /// fewer intervals than were exited, fails with
    /// [`StoreError::IncompleteClose`] instead of reporting the exits.
    pub async fn compute_transitions(
        &self,
        entity_id: EntityId,
        lng: f64,
        lat: f64,
        at: DateTime<Utc>,
    ) -> Result<Transitions, StoreError> {
        let at = at.trunc_subsecs(STORED_SUBSEC_DIGITS);
        let open = self.intervals.open_intervals(entity_id, at).await?;
        let colliding = self.matcher.colliding_geofences(lng, lat).await?;

        let open_ids: BTreeSet<GeofenceId> = open.iter().map(|i| i.geofence_id).collect();
        let exitable: BTreeSet<GeofenceId> = open
            .iter()
            .filter(|i| i.entry_timestamp < at)
            .map(|i| i.geofence_id)
            .collect();

        let transitions = Transitions {
            entered: colliding.difference(&open_ids).copied().collect(),
            exited: exitable.difference(&colliding).copied().collect(),
        };

        if !transitions.entered.is_empty() {
            let ids: Vec<GeofenceId> = transitions.entered.iter().copied().collect();
            self.intervals
                .insert_open_intervals(entity_id, &ids, at)
                .await?;
        }
        if !transitions.exited.is_empty() {
            let ids: Vec<GeofenceId> = transitions.exited.iter().copied().collect();
            let closed = self
                .intervals
                .close_open_intervals(entity_id, &ids, at)
                .await?;
            let expected = u64::try_from(ids.len()).unwrap_or(u64::MAX);
            if closed != expected {
                return Err(StoreError::IncompleteClose {
                    entity_id,
                    expected,
                    closed,
                });
            }
        }

        if !transitions.is_empty() {
            debug!(
                %entity_id,
                entered = transitions.entered.len(),
                exited = transitions.exited.len(),
                "membership changed"
            );
        }
        Ok(transitions)
    }

    /// The entity's latest intervals, newest entry first.
    pub async fn recent_intervals(
        &self,
        entity_id: EntityId,
        limit: usize,
    ) -> Result<Vec<MembershipInterval>, StoreError> {
        self.intervals.recent_intervals(entity_id, limit).await
    }

    /// The matcher used for containment.
    pub const fn matcher(&self) -> &GeofenceMatcher<G> {
        &self.matcher
    }

    /// The interval store.
    pub const fn intervals(&self) -> &I {
        &self.intervals
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::TimeZone;
    use geotrack_types::{Geofence, Position};

    use super::*;
    use crate::memory::{MemoryGeofenceStore, MemoryIntervalStore};
    use crate::store::DEFAULT_RECENT_INTERVALS;

    /// Interval store whose close reports nothing closed.
    struct NothingClosed(MemoryIntervalStore);

    impl IntervalStore for NothingClosed {
        async fn open_intervals(
            &self,
            entity_id: EntityId,
            at: DateTime<Utc>,
        ) -> Result<Vec<MembershipInterval>, StoreError> {
            self.0.open_intervals(entity_id, at).await
        }

        async fn insert_open_intervals(
            &self,
            entity_id: EntityId,
            geofence_ids: &[GeofenceId],
            entry: DateTime<Utc>,
        ) -> Result<(), StoreError> {
            self.0.insert_open_intervals(entity_id, geofence_ids, entry).await
        }

        async fn close_open_intervals(
            &self,
            _entity_id: EntityId,
            _geofence_ids: &[GeofenceId],
            _exit: DateTime<Utc>,
        ) -> Result<u64, StoreError> {
            Ok(0)
        }

        async fn recent_intervals(
            &self,
            entity_id: EntityId,
            limit: usize,
        ) -> Result<Vec<MembershipInterval>, StoreError> {
            self.0.recent_intervals(entity_id, limit).await
        }
    }

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000_i64.saturating_add(secs), 0)
            .single()
            .unwrap_or_default()
    }

    fn at_nanos(nanos: u32) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000, nanos)
            .single()
            .unwrap_or_default()
    }

    fn rect(west: f64, south: f64, east: f64, north: f64) -> Geofence {
        Geofence::new(
            GeofenceId::new(),
            "rect",
            vec![
                Position::new(west, south),
                Position::new(east, south),
                Position::new(east, north),
                Position::new(west, north),
                Position::new(west, south),
            ],
        )
    }

    struct Fixture {
        a: GeofenceId,
        b: GeofenceId,
        intervals: Arc<MemoryIntervalStore>,
        tracker: TransitionTracker<MemoryGeofenceStore, Arc<MemoryIntervalStore>>,
    }

    /// A covers [0.1, 0.6]^2, B covers [0.4, 0.9]^2, both owned by cell (0, 0).
    fn fixture() -> Fixture {
        let a = rect(0.1, 0.1, 0.6, 0.6);
        let b = rect(0.4, 0.4, 0.9, 0.9);
        let (a_id, b_id) = (a.id, b.id);
        let intervals = Arc::new(MemoryIntervalStore::new());
        let tracker = TransitionTracker::new(
            MemoryGeofenceStore::with_geofences([a, b]),
            Arc::clone(&intervals),
        );
        Fixture {
            a: a_id,
            b: b_id,
            intervals,
            tracker,
        }
    }

    #[tokio::test]
    async fn replaying_an_event_is_idempotent() {
        let f = fixture();
        let entity = EntityId::new();
        let first = f.tracker.compute_transitions(entity, 0.2, 0.2, at(0)).await;
        assert_eq!(first.ok().map(|t| t.entered), Some(BTreeSet::from([f.a])));

        let second = f.tracker.compute_transitions(entity, 0.2, 0.2, at(0)).await;
        assert_eq!(second.ok(), Some(Transitions::default()));
        assert_eq!(f.intervals.all().await.len(), 1);
    }

    #[tokio::test]
    async fn enter_then_exit_closes_one_interval() {
        let f = fixture();
        let entity = EntityId::new();
        assert!(f.tracker.compute_transitions(entity, 0.2, 0.2, at(0)).await.is_ok());
        let out = f.tracker.compute_transitions(entity, 5.5, 5.5, at(30)).await;
        assert_eq!(
            out.ok(),
            Some(Transitions {
                entered: BTreeSet::new(),
                exited: BTreeSet::from([f.a]),
            })
        );

        let all = f.intervals.all().await;
        assert_eq!(all.len(), 1);
        let interval = all.first();
        assert_eq!(interval.and_then(|i| i.exit_timestamp), Some(at(30)));
        assert!(interval.is_some_and(|i| i.entry_timestamp < at(30)));
    }

    #[tokio::test]
    async fn moving_into_overlap_enters_only_the_new_geofence() {
        let f = fixture();
        let entity = EntityId::new();
        assert!(f.tracker.compute_transitions(entity, 0.2, 0.2, at(0)).await.is_ok());
        let both = f.tracker.compute_transitions(entity, 0.5, 0.5, at(10)).await;
        assert_eq!(
            both.ok(),
            Some(Transitions {
                entered: BTreeSet::from([f.b]),
                exited: BTreeSet::new(),
            })
        );
    }

    #[tokio::test]
    async fn crossing_between_geofences_enters_and_exits() {
        let f = fixture();
        let entity = EntityId::new();
        assert!(f.tracker.compute_transitions(entity, 0.2, 0.2, at(0)).await.is_ok());
        let crossed = f.tracker.compute_transitions(entity, 0.8, 0.8, at(10)).await;
        assert_eq!(
            crossed.ok(),
            Some(Transitions {
                entered: BTreeSet::from([f.b]),
                exited: BTreeSet::from([f.a]),
            })
        );
    }

    #[tokio::test]
    async fn no_change_writes_nothing() {
        let f = fixture();
        let entity = EntityId::new();
        let outside = f.tracker.compute_transitions(entity, 3.0, 3.0, at(0)).await;
        assert_eq!(outside.ok(), Some(Transitions::default()));
        assert!(f.intervals.all().await.is_empty());
    }

    #[tokio::test]
    async fn out_of_order_event_surfaces_conflict() {
        let f = fixture();
        let entity = EntityId::new();
        assert!(f.tracker.compute_transitions(entity, 0.2, 0.2, at(10)).await.is_ok());
        // An older ping in A cannot see the interval entered at t=10.
        let stale = f.tracker.compute_transitions(entity, 0.2, 0.2, at(5)).await;
        assert!(matches!(stale, Err(StoreError::IntervalConflict { .. })));
        assert_eq!(f.intervals.all().await.len(), 1);
    }

    #[tokio::test]
    async fn entities_are_tracked_independently() {
        let f = fixture();
        let (one, two) = (EntityId::new(), EntityId::new());
        assert!(f.tracker.compute_transitions(one, 0.2, 0.2, at(0)).await.is_ok());
        let other = f.tracker.compute_transitions(two, 0.2, 0.2, at(0)).await;
        assert_eq!(other.ok().map(|t| t.entered), Some(BTreeSet::from([f.a])));
        let history = f
            .tracker
            .recent_intervals(one, DEFAULT_RECENT_INTERVALS)
            .await
            .unwrap_or_default();
        assert_eq!(history.len(), 1);
    }

    #[tokio::test]
    async fn short_close_is_an_error_not_an_exit() {
        let fence = rect(0.1, 0.1, 0.6, 0.6);
        let tracker = TransitionTracker::new(
            MemoryGeofenceStore::with_geofences([fence]),
            NothingClosed(MemoryIntervalStore::new()),
        );
        let entity = EntityId::new();
        assert!(tracker.compute_transitions(entity, 0.2, 0.2, at(0)).await.is_ok());

        let out = tracker.compute_transitions(entity, 5.5, 5.5, at(30)).await;
        assert!(matches!(
            out,
            Err(StoreError::IncompleteClose {
                expected: 1,
                closed: 0,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn sub_microsecond_times_collapse_to_one_instant() {
        let f = fixture();
        let entity = EntityId::new();
        let entered = f
            .tracker
            .compute_transitions(entity, 0.2, 0.2, at_nanos(123_456_700))
            .await;
        assert_eq!(entered.ok().map(|t| t.entered), Some(BTreeSet::from([f.a])));

        // Same stored microsecond as the entry, so it cannot exit.
        let out = f
            .tracker
            .compute_transitions(entity, 5.5, 5.5, at_nanos(123_456_900))
            .await;
        assert_eq!(out.ok(), Some(Transitions::default()));

        let all = f.intervals.all().await;
        assert_eq!(all.len(), 1);
        let interval = all.first();
        assert_eq!(interval.map(|i| i.entry_timestamp), Some(at_nanos(123_456_000)));
        assert!(interval.is_some_and(|i| i.exit_timestamp.is_none()));
    }
}
