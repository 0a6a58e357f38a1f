//! Axum router construction for the hub.

use std::sync::Arc;

use axum::Router;
use axum::routing::get;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::state::HubState;
use crate::ws;

/// Build the hub router.
///
/// - `GET /ws` -- subscriber `WebSocket`
/// - `GET /api/health` -- liveness plus connection and group counts
/// - `GET /api/connections/{id}/cells` -- a connection's subscribed cells
///
/// CORS allows any origin so map clients can be served from elsewhere.
pub fn build_router(state: Arc<HubState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/ws", get(ws::ws_subscribe))
        .route("/api/health", get(handlers::health))
        .route("/api/connections/{id}/cells", get(handlers::connection_cells))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
