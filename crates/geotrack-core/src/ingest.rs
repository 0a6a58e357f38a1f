//! Batch ingestion of serialized location events.
//!
//! Events are processed one at a time, in batch order, so two pings of the
//! same entity within a batch apply in the order they arrived. A failing
//! event is logged, recorded in the batch's [`BatchError`], and skipped;
//! the rest of the batch still runs and its notifications are still
//! returned.
//!
//! Per event:
//! 1. deserialize and validate the coordinates
//! 2. record the latest location, emit `locationUpdated`
//! 3. compute transitions, emit `geofenceEntered` / `geofenceExited`
//!
//! All notifications of an event target the group of the event's cell and
//! are released only if every step succeeded. Each event runs under its own
//! deadline; a timeout fails that event alone.

use std::time::Duration;

use geotrack_types::{LocationEvent, Notification, group_key};
use tracing::{debug, error, warn};

use crate::error::{BatchError, BatchOutcome, EventFailure, IngestError};
use crate::store::{GeofenceStore, IntervalStore, LatestLocationStore};
use crate::tracker::TransitionTracker;

/// Turns batches of raw location events into hub notifications.
#[derive(Debug, Clone)]
pub struct BatchIngestor<G, I, L> {
    tracker: TransitionTracker<G, I>,
    locations: L,
    event_timeout: Duration,
}

impl<G, I, L> BatchIngestor<G, I, L>
where
    G: GeofenceStore,
    I: IntervalStore,
    L: LatestLocationStore,
{
    /// An ingestor over the given collaborators.
    pub const fn new(
        tracker: TransitionTracker<G, I>,
        locations: L,
        event_timeout: Duration,
    ) -> Self {
        Self {
            tracker,
            locations,
            event_timeout,
        }
    }

    /// Process every payload in `raw_events`.
    ///
    /// Never fails as a whole: the outcome carries the notifications of all
    /// successful events plus, if any event failed, a [`BatchError`]
    /// describing exactly the failed ones.
    pub async fn ingest<B: AsRef<[u8]>>(&self, raw_events: &[B]) -> BatchOutcome {
        let mut notifications = Vec::new();
        let mut failures = Vec::new();

        for (index, raw) in raw_events.iter().enumerate() {
            let event = match serde_json::from_slice::<LocationEvent>(raw.as_ref()) {
                Ok(event) => event,
                Err(source) => {
                    let failure = EventFailure {
                        index,
                        entity_id: None,
                        error: IngestError::from(source),
                    };
                    error!(index, error = %failure.error, "failed to process location event");
                    failures.push(failure);
                    continue;
                }
            };

            match self.process_with_deadline(&event).await {
                Ok(produced) => notifications.extend(produced),
                Err(err) => {
                    if err.is_invariant_violation() {
                        warn!(
                            index,
                            entity_id = %event.entity_id,
                            "interval invariant violated; events out of order or concurrent writers"
                        );
                    }
                    error!(
                        index,
                        entity_id = %event.entity_id,
                        error = %err,
                        "failed to process location event"
                    );
                    failures.push(EventFailure {
                        index,
                        entity_id: Some(event.entity_id),
                        error: err,
                    });
                }
            }
        }

        debug!(
            events = raw_events.len(),
            failed = failures.len(),
            notifications = notifications.len(),
            "batch ingested"
        );
        BatchOutcome {
            notifications,
            error: BatchError::from_failures(failures),
        }
    }

    /// Process one already-deserialized event under the per-event deadline.
    pub async fn process_with_deadline(
        &self,
        event: &LocationEvent,
    ) -> Result<Vec<Notification>, IngestError> {
        match tokio::time::timeout(self.event_timeout, self.process_event(event)).await {
            Ok(result) => result,
            Err(_elapsed) => Err(IngestError::Timeout {
                timeout_ms: u64::try_from(self.event_timeout.as_millis()).unwrap_or(u64::MAX),
            }),
        }
    }

    async fn process_event(&self, event: &LocationEvent) -> Result<Vec<Notification>, IngestError> {
        if !event.has_valid_coordinates() {
            return Err(IngestError::InvalidCoordinates {
                lng: event.lng,
                lat: event.lat,
            });
        }
        let group = group_key(event.cell());

        self.locations.set_latest_location(event).await?;
        let mut notifications = vec![Notification::LocationUpdated {
            entity_id: event.entity_id,
            lat: event.lat,
            lng: event.lng,
            ts_millis: event.ts_millis(),
            group: group.clone(),
        }];

        let transitions = self
            .tracker
            .compute_transitions(event.entity_id, event.lng, event.lat, event.ts)
            .await?;
        notifications.extend(transitions.entered.iter().map(|&geofence_id| {
            Notification::GeofenceEntered {
                entity_id: event.entity_id,
                geofence_id,
                group: group.clone(),
            }
        }));
        notifications.extend(transitions.exited.iter().map(|&geofence_id| {
            Notification::GeofenceExited {
                entity_id: event.entity_id,
                geofence_id,
                group: group.clone(),
            }
        }));
        Ok(notifications)
    }

    /// The transition tracker.
    pub const fn tracker(&self) -> &TransitionTracker<G, I> {
        &self.tracker
    }

    /// The latest-location store.
    pub const fn locations(&self) -> &L {
        &self.locations
    }
}
