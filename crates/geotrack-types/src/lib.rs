//! Shared type definitions for the Geotrack geofencing pipeline.
//!
//! This crate is the single source of truth for the records that flow
//! between the ingest engine, storage, and the pub/sub hub. Wire-facing
//! types flow downstream to `TypeScript` via `ts-rs` for map clients.
//!
//! # Modules
//!
//! - [`ids`] -- Type-safe UUID wrappers for entities, geofences, connections
//! - [`grid`] -- One-degree grid cells, group keys, viewport enumeration
//! - [`structs`] -- Location events, geofences, membership intervals
//! - [`notifications`] -- Hub notifications and group membership ops

pub mod grid;
pub mod ids;
pub mod notifications;
pub mod structs;

// Re-export all public types at crate root for convenience.
pub use grid::{
    GridCell, GroupKey, cell_of, cells_in_viewport, group_key, normalize_latitude,
    normalize_longitude,
};
pub use ids::{ConnectionId, EntityId, GeofenceId};
pub use notifications::{
    GEOFENCE_ENTERED, GEOFENCE_EXITED, GroupOp, HubMessage, LOCATION_UPDATED, Notification,
};
pub use structs::{Geofence, LocationEvent, MembershipInterval, Position};
