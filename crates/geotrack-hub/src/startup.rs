//! Hub startup helper for embedding in the tracker binary.
//!
//! [`spawn_hub`] binds eagerly, so an unusable address fails startup
//! instead of surfacing later on a background task, and then serves on a
//! spawned Tokio task.
//!
//! ```rust,ignore
//! use geotrack_hub::{HubState, ServerConfig, spawn_hub};
//! use std::sync::Arc;
//!
//! let hub = Arc::new(HubState::new());
//! let handle = spawn_hub(&ServerConfig::default(), Arc::clone(&hub)).await?;
//! ```

use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::server::{self, ServerConfig, ServerError};
use crate::state::HubState;

/// Bind the hub's listener and serve it on a background task.
///
/// # Errors
///
/// Returns [`ServerError::Bind`] if the address cannot be bound.
pub async fn spawn_hub(
    config: &ServerConfig,
    state: Arc<HubState>,
) -> Result<JoinHandle<()>, ServerError> {
    let listener = server::bind(config).await?;

    let handle = tokio::spawn(async move {
        if let Err(e) = server::serve(listener, state).await {
            tracing::error!(error = %e, "Hub server exited with error");
        }
    });

    tracing::info!(host = %config.host, port = config.port, "Hub server spawned");
    Ok(handle)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn spawns_on_an_ephemeral_port() {
        let config = ServerConfig {
            host: String::from("127.0.0.1"),
            port: 0,
        };
        let handle = spawn_hub(&config, Arc::new(HubState::new())).await;
        assert!(handle.as_ref().is_ok_and(|h| !h.is_finished()));
        if let Ok(handle) = handle {
            handle.abort();
        }
    }

    #[tokio::test]
    async fn malformed_host_fails_before_spawning() {
        let config = ServerConfig {
            host: String::from("not a host"),
            port: 8080,
        };
        let result = spawn_hub(&config, Arc::new(HubState::new())).await;
        assert!(matches!(result, Err(ServerError::Bind(_))));
    }
}
