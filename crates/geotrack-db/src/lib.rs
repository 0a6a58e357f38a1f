//! Data layer for Geotrack (`PostgreSQL` + `Dragonfly`).
//!
//! `PostgreSQL` holds the provisioned geofences and every membership
//! interval ever recorded. `Dragonfly` holds the latest location of each
//! entity. Each store implements the matching trait from `geotrack-core`.
//!
//! ```text
//! BatchIngestor
//!     |
//!     +-- geofences_in_cell ----> PostgreSQL (PgGeofenceStore)
//!     +-- open/close intervals -> PostgreSQL (PgIntervalStore)
//!     +-- set_latest_location --> Dragonfly  (DragonflyPool)
//! ```
//!
//! # Modules
//!
//! - [`postgres`] -- `PostgreSQL` connection pool and configuration
//! - [`geofence_store`] -- Geofence lookups by owning grid cell
//! - [`interval_store`] -- Conditional interval open/close and history
//! - [`dragonfly`] -- `Dragonfly` (Redis-compatible) latest locations
//! - [`error`] -- Shared error types

pub mod dragonfly;
pub mod error;
pub mod geofence_store;
pub mod interval_store;
pub mod postgres;

// Re-export primary types for convenience.
pub use dragonfly::DragonflyPool;
pub use error::DbError;
pub use geofence_store::{GeofenceRow, PgGeofenceStore};
pub use interval_store::{IntervalRow, OpenResult, PgIntervalStore};
pub use postgres::{PostgresConfig, PostgresPool};
