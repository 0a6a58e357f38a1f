//! `WebSocket` handler for map subscribers.
//!
//! Clients connect to `GET /ws` and tell the hub which grid cells they are
//! looking at, either as an explicit list or as a viewport:
//!
//! ```json
//! {"type": "updateMapGridGroups", "newCells": [[24, 60], [25, 60]]}
//! {"type": "updateViewport", "west": 24.1, "south": 59.9, "east": 25.3, "north": 60.4}
//! ```
//!
//! The hub diffs the request against the cells it last applied for the
//! connection and adjusts group membership. Notifications for the groups
//! arrive as `{"target": ..., "arguments": [...]}` text frames.

use std::collections::BTreeSet;
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use geotrack_core::subscription::MAX_CELLS_PER_CONNECTION;
use geotrack_types::{ConnectionId, GridCell, cells_in_viewport};
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::state::{HubState, Outbound};

/// A message sent by a subscriber.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientMessage {
    /// Subscribe to exactly these cells.
    #[serde(rename_all = "camelCase")]
    UpdateMapGridGroups {
        /// Cells the client wants now, as `[lng, lat]` pairs.
        new_cells: Vec<GridCell>,
    },
    /// Subscribe to the cells covered by a map viewport.
    UpdateViewport {
        /// Western edge in degrees.
        west: f64,
        /// Southern edge in degrees.
        south: f64,
        /// Eastern edge in degrees.
        east: f64,
        /// Northern edge in degrees.
        north: f64,
    },
}

impl ClientMessage {
    /// The cells this message asks for.
    ///
    /// Viewport enumeration stops one past the per-connection ceiling, so
    /// an oversized viewport still trips the ceiling without enumerating
    /// the whole globe.
    pub fn requested_cells(&self) -> BTreeSet<GridCell> {
        match self {
            Self::UpdateMapGridGroups { new_cells } => new_cells.iter().copied().collect(),
            Self::UpdateViewport {
                west,
                south,
                east,
                north,
            } => cells_in_viewport(*west, *south, *east, *north, MAX_CELLS_PER_CONNECTION),
        }
    }
}

/// Upgrade an HTTP request to a subscriber connection.
///
/// # Route
///
/// `GET /ws`
pub async fn ws_subscribe(
    ws: WebSocketUpgrade,
    State(state): State<Arc<HubState>>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_ws(socket, state))
}

/// Register the connection, run it until either side hangs up, and then
/// remove it from every group.
async fn handle_ws(socket: WebSocket, state: Arc<HubState>) {
    let (connection_id, rx) = state.register().await;
    debug!(%connection_id, "subscriber connected");

    run_session(socket, &state, connection_id, rx).await;

    state.unregister(connection_id).await;
    debug!(%connection_id, "subscriber disconnected");
}

async fn run_session(
    mut socket: WebSocket,
    state: &HubState,
    connection_id: ConnectionId,
    mut rx: mpsc::Receiver<Outbound>,
) {
    loop {
        tokio::select! {
            outbound = rx.recv() => {
                let Some(json) = outbound else {
                    return;
                };
                if socket.send(Message::Text(json.as_ref().into())).await.is_err() {
                    return;
                }
            }
            msg = socket.recv() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        handle_client_message(state, connection_id, text.as_str()).await;
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if socket.send(Message::Pong(data)).await.is_err() {
                            return;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => return,
                    Some(Err(e)) => {
                        debug!(%connection_id, "WebSocket error: {e}");
                        return;
                    }
                    Some(Ok(_)) => {}
                }
            }
        }
    }
}

/// Apply one subscriber message. Malformed messages are logged and
/// ignored so a bad frame does not drop the connection.
async fn handle_client_message(state: &HubState, connection_id: ConnectionId, text: &str) {
    let message: ClientMessage = match serde_json::from_str(text) {
        Ok(message) => message,
        Err(e) => {
            warn!(%connection_id, error = %e, "ignoring malformed subscriber message");
            return;
        }
    };

    match state
        .update_interest(connection_id, message.requested_cells())
        .await
    {
        Ok(ops) => debug!(%connection_id, ops = ops.len(), "group membership updated"),
        Err(e) => warn!(%connection_id, error = %e, "failed to update group membership"),
    }
}
