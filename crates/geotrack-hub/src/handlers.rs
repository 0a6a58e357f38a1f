//! REST handlers.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use geotrack_types::{ConnectionId, GridCell};
use serde::Serialize;

use crate::error::HubServerError;
use crate::state::{HubState, HubStats};

/// Body of `GET /api/health`.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Always `"ok"` while the server answers.
    pub status: &'static str,
    /// Registry counts.
    #[serde(flatten)]
    pub stats: HubStats,
}

/// `GET /api/health`
pub async fn health(State(state): State<Arc<HubState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        stats: state.stats().await,
    })
}

/// `GET /api/connections/{id}/cells` -- the cells a connection is
/// subscribed to.
///
/// # Errors
///
/// Returns [`HubServerError::InvalidUuid`] for a malformed id and
/// [`HubServerError::NotFound`] for an unknown connection.
pub async fn connection_cells(
    State(state): State<Arc<HubState>>,
    Path(id): Path<String>,
) -> Result<Json<Vec<GridCell>>, HubServerError> {
    let connection_id: ConnectionId = id
        .parse()
        .map_err(|e: uuid::Error| HubServerError::InvalidUuid(format!("{id}: {e}")))?;
    let cells = state
        .baseline(connection_id)
        .await
        .ok_or_else(|| HubServerError::NotFound(format!("connection {connection_id}")))?;
    Ok(Json(cells.into_iter().collect()))
}
