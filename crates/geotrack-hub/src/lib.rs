//! WebSocket pub/sub hub for geotracking notifications.
//!
//! Map clients connect over `WebSocket`, declare the one-degree grid cells
//! they are looking at, and receive `locationUpdated`, `geofenceEntered`,
//! and `geofenceExited` messages for those cells. Group membership is
//! keyed by `grid:{lng}:{lat}`, matching the group every notification
//! carries.
//!
//! [`HubState`] implements [`PubSubHub`](geotrack_core::PubSubHub); the
//! tracker binary shares one instance between this server and its
//! ingestion loop.

pub mod error;
pub mod handlers;
pub mod router;
pub mod server;
pub mod startup;
pub mod state;
pub mod ws;

pub use error::HubServerError;
pub use router::build_router;
pub use server::{ServerConfig, ServerError};
pub use startup::spawn_hub;
pub use state::{HubState, HubStats};
