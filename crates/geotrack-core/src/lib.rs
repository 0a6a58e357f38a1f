//! Geofence transition tracking and subscriber routing.
//!
//! This crate owns the hot path from a raw location ping to the
//! notifications a map client receives: which geofences an entity entered
//! or left, and which pub/sub group should hear about it. Storage and
//! transport sit behind the traits in [`store`].
//!
//! # Modules
//!
//! - [`config`] -- Configuration loading from `geotrack-config.yaml` into
//!   strongly-typed structs.
//! - [`error`] -- Store, hub, per-event, and batch error types.
//! - [`store`] -- Collaborator traits for geofences, intervals, latest
//!   locations, and the hub.
//! - [`memory`] -- In-process implementations of the store traits.
//! - [`cache`] -- [`TimedCache`] and the caching [`CachedGeofenceStore`].
//! - [`geometry`] -- Point-in-polygon tests for geofence borders.
//! - [`matcher`] -- [`GeofenceMatcher`], partition-pruned containment.
//! - [`tracker`] -- [`TransitionTracker`], the membership interval state
//!   machine.
//! - [`subscription`] -- [`sync_groups`], viewport interest to group ops.
//! - [`ingest`] -- [`BatchIngestor`], partial-failure batch processing.
//!
//! [`TimedCache`]: cache::TimedCache
//! [`CachedGeofenceStore`]: cache::CachedGeofenceStore
//! [`GeofenceMatcher`]: matcher::GeofenceMatcher
//! [`TransitionTracker`]: tracker::TransitionTracker
//! [`sync_groups`]: subscription::sync_groups
//! [`BatchIngestor`]: ingest::BatchIngestor

pub mod cache;
pub mod config;
pub mod error;
pub mod geometry;
pub mod ingest;
pub mod matcher;
pub mod memory;
pub mod store;
pub mod subscription;
pub mod tracker;

pub use error::{BatchError, BatchOutcome, EventFailure, HubError, IngestError, StoreError};
pub use store::{GeofenceStore, IntervalStore, LatestLocationStore, PubSubHub};
