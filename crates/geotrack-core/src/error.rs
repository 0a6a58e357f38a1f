//! Error types for the tracking core.
//!
//! Errors are layered the way they propagate: collaborators fail with
//! [`StoreError`] or [`HubError`], one event fails with an [`IngestError`],
//! and a batch reports its failed events together as a [`BatchError`]
//! inside a [`BatchOutcome`] that still carries every notification the
//! successful events produced.

use core::fmt;

use geotrack_types::{ConnectionId, EntityId, GeofenceId, Notification};

/// Failure of a storage collaborator.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The store could not be reached or rejected the operation.
    #[error("{store} store unavailable: {message}")]
    Unavailable {
        /// Which store failed (`geofence`, `interval`, `location`).
        store: &'static str,
        /// Description of the failure.
        message: String,
    },

    /// An open interval already exists for this pair.
    ///
    /// Means two writers raced on the same entity, or events for one
    /// entity arrived out of order. Never an ordinary outage.
    #[error("open interval already exists for entity {entity_id} in geofence {geofence_id}")]
    IntervalConflict {
        /// The entity.
        entity_id: EntityId,
        /// The geofence.
        geofence_id: GeofenceId,
    },

    /// Fewer intervals were closed than exits were detected.
    ///
    /// The exits were computed from intervals the store then did not
    /// close, so the store and the tracker disagree on what is open.
    #[error("closed {closed} of {expected} open intervals for entity {entity_id}")]
    IncompleteClose {
        /// The entity.
        entity_id: EntityId,
        /// Intervals the tracker meant to close.
        expected: u64,
        /// Intervals the store reported closed.
        closed: u64,
    },

    /// A stored record could not be encoded or decoded.
    #[error("stored record malformed: {message}")]
    Serialization {
        /// Description of the failure.
        message: String,
    },
}

impl StoreError {
    /// Shorthand for [`StoreError::Unavailable`].
    pub fn unavailable(store: &'static str, message: impl fmt::Display) -> Self {
        Self::Unavailable {
            store,
            message: message.to_string(),
        }
    }
}

/// Failure of the pub/sub hub.
#[derive(Debug, thiserror::Error)]
pub enum HubError {
    /// The connection is not (or no longer) registered with the hub.
    #[error("connection {connection_id} is not registered")]
    UnknownConnection {
        /// The missing connection.
        connection_id: ConnectionId,
    },

    /// The hub could not be reached.
    #[error("hub unavailable: {message}")]
    Unavailable {
        /// Description of the failure.
        message: String,
    },
}

/// Failure while processing a single location event.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    /// The payload is not a valid location event.
    #[error("malformed location event: {source}")]
    Deserialize {
        /// The underlying JSON error.
        #[from]
        source: serde_json::Error,
    },

    /// The coordinates are non-finite or outside WGS84 ranges.
    #[error("coordinates out of range: lng={lng}, lat={lat}")]
    InvalidCoordinates {
        /// Reported longitude.
        lng: f64,
        /// Reported latitude.
        lat: f64,
    },

    /// A collaborator failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The event did not finish before its deadline.
    #[error("event processing exceeded {timeout_ms}ms")]
    Timeout {
        /// The deadline in milliseconds.
        timeout_ms: u64,
    },
}

impl IngestError {
    /// Whether this error means the one-open-interval invariant was about
    /// to be broken, as opposed to an ordinary input or outage problem.
    pub const fn is_invariant_violation(&self) -> bool {
        matches!(
            self,
            Self::Store(StoreError::IntervalConflict { .. } | StoreError::IncompleteClose { .. })
        )
    }
}

/// One failed event within a batch.
#[derive(Debug, thiserror::Error)]
#[error("event #{index}{}: {error}", entity_suffix(.entity_id.as_ref()))]
pub struct EventFailure {
    /// Position of the event in the batch, zero-based.
    pub index: usize,
    /// The entity, if the payload got far enough to name one.
    pub entity_id: Option<EntityId>,
    /// What went wrong.
    #[source]
    pub error: IngestError,
}

fn entity_suffix(entity_id: Option<&EntityId>) -> String {
    entity_id.map_or_else(String::new, |id| format!(" (entity {id})"))
}

/// Failures collected over a whole batch.
#[derive(Debug, thiserror::Error)]
pub enum BatchError {
    /// Exactly one event failed.
    #[error(transparent)]
    Single(EventFailure),

    /// More than one event failed.
    #[error("{} events failed: {}", .0.len(), join_failures(.0))]
    Aggregate(Vec<EventFailure>),
}

fn join_failures(failures: &[EventFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl BatchError {
    /// Collapse per-event failures into a batch error, if there were any.
    pub fn from_failures(mut failures: Vec<EventFailure>) -> Option<Self> {
        match failures.len() {
            0 => None,
            1 => failures.pop().map(Self::Single),
            _ => Some(Self::Aggregate(failures)),
        }
    }

    /// Every failed event, in batch order.
    pub fn failures(&self) -> &[EventFailure] {
        match self {
            Self::Single(failure) => core::slice::from_ref(failure),
            Self::Aggregate(failures) => failures,
        }
    }
}

/// Result of ingesting one batch.
///
/// `notifications` is always deliverable, even when `error` is set: it holds
/// everything the successful events produced. Failed events are not retried.
#[derive(Debug, Default)]
pub struct BatchOutcome {
    /// Notifications from the successful events, in batch order.
    pub notifications: Vec<Notification>,
    /// The failed events, if any.
    pub error: Option<BatchError>,
}

impl BatchOutcome {
    /// Whether every event in the batch succeeded.
    pub const fn is_clean(&self) -> bool {
        self.error.is_none()
    }

    /// Split into the deliverable notifications and a conventional result.
    pub fn into_parts(self) -> (Vec<Notification>, Result<(), BatchError>) {
        let result = self.error.map_or(Ok(()), Err);
        (self.notifications, result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failure(index: usize) -> EventFailure {
        EventFailure {
            index,
            entity_id: None,
            error: IngestError::Timeout { timeout_ms: 10 },
        }
    }

    #[test]
    fn no_failures_is_no_error() {
        assert!(BatchError::from_failures(Vec::new()).is_none());
    }

    #[test]
    fn one_failure_is_reported_alone() {
        let error = BatchError::from_failures(vec![failure(1)]);
        assert!(matches!(error, Some(BatchError::Single(EventFailure { index: 1, .. }))));
    }

    #[test]
    fn several_failures_are_aggregated_in_order() {
        let error = BatchError::from_failures(vec![failure(0), failure(4)]);
        let indexes: Vec<usize> = error
            .as_ref()
            .map(|e| e.failures().iter().map(|f| f.index).collect())
            .unwrap_or_default();
        assert_eq!(indexes, vec![0, 4]);
        let message = error.map(|e| e.to_string()).unwrap_or_default();
        assert!(message.starts_with("2 events failed"));
    }

    #[test]
    fn conflict_is_an_invariant_violation() {
        let conflict = IngestError::from(StoreError::IntervalConflict {
            entity_id: EntityId::new(),
            geofence_id: GeofenceId::new(),
        });
        assert!(conflict.is_invariant_violation());
        let outage = IngestError::from(StoreError::unavailable("interval", "refused"));
        assert!(!outage.is_invariant_violation());
        let short = IngestError::from(StoreError::IncompleteClose {
            entity_id: EntityId::new(),
            expected: 2,
            closed: 1,
        });
        assert!(short.is_invariant_violation());
    }

    #[test]
    fn failure_message_names_entity() {
        let id = EntityId::new();
        let failure = EventFailure {
            index: 2,
            entity_id: Some(id),
            error: IngestError::InvalidCoordinates { lng: 0.0, lat: 95.0 },
        };
        assert!(failure.to_string().contains(&id.to_string()));
    }
}
