//! Geotracking ingestion worker.
//!
//! Consumes location pings from NATS, detects geofence entries and exits,
//! and fans the resulting notifications out through the embedded
//! `WebSocket` hub to subscribers watching the affected grid cells.
//!
//! # Startup Sequence
//!
//! 1. Load configuration (`geotrack-config.yaml`, or the path given as the
//!    first argument or in `GEOTRACK_CONFIG`)
//! 2. Initialize structured logging (tracing)
//! 3. Connect to `PostgreSQL` and run migrations
//! 4. Connect to `Dragonfly`
//! 5. Start the hub server
//! 6. Subscribe to the location subject in the worker queue group
//! 7. Batch, ingest, and publish until the stream closes or `Ctrl-C`
//!
//! Any failure in steps 1-6 is fatal. Failures inside a batch are logged
//! and the batch is not retried.

mod batcher;
mod error;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context as _;
use geotrack_core::cache::CachedGeofenceStore;
use geotrack_core::config::{InfrastructureConfig, LogFormat, LoggingConfig, TrackerConfig};
use geotrack_core::ingest::BatchIngestor;
use geotrack_core::tracker::TransitionTracker;
use geotrack_core::{GeofenceStore, IntervalStore, LatestLocationStore, PubSubHub};
use geotrack_db::{DragonflyPool, PostgresPool};
use geotrack_hub::{HubState, ServerConfig};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::error::EngineError;

/// Environment variable naming the config file.
const CONFIG_PATH_ENV: &str = "GEOTRACK_CONFIG";

/// Config file used when none is named.
const DEFAULT_CONFIG_PATH: &str = "geotrack-config.yaml";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Configuration first, so logging can honour it.
    let config_path = config_path();
    let config = load_config(&config_path)
        .with_context(|| format!("failed to load {}", config_path.display()))?;

    // 2. Logging.
    init_tracing(&config.logging);
    info!(
        config = %config_path.display(),
        max_batch_size = config.ingest.max_batch_size,
        batch_linger_ms = config.ingest.batch_linger_ms,
        event_timeout_ms = config.ingest.event_timeout_ms,
        "geotrack-engine starting"
    );

    // 3-4. Stores.
    let postgres = connect_postgres(&config.infrastructure.postgres_url)
        .await
        .context("PostgreSQL is required")?;
    let dragonfly = connect_dragonfly(&config.infrastructure.dragonfly_url)
        .await
        .context("Dragonfly is required")?;

    let tracker = TransitionTracker::new(
        CachedGeofenceStore::new(postgres.geofences(), config.ingest.geofence_cache_ttl()),
        postgres.intervals(),
    );
    let ingestor = BatchIngestor::new(tracker, dragonfly, config.ingest.event_timeout());

    // 5. Hub.
    let hub = Arc::new(HubState::new());
    let hub_handle = start_hub(&config.infrastructure, Arc::clone(&hub))
        .await
        .context("failed to start hub server")?;

    // 6. Location stream.
    let mut locations = subscribe_locations(&config.infrastructure)
        .await
        .context("failed to subscribe to location stream")?;
    info!(
        subject = config.infrastructure.location_subject,
        queue_group = config.infrastructure.queue_group,
        "Consuming location events"
    );

    // 7. Ingest loop.
    let max_batch_size = config.ingest.max_batch_size;
    let linger = config.ingest.batch_linger();
    loop {
        let batch = tokio::select! {
            batch = batcher::collect_batch(&mut locations, max_batch_size, linger) => batch,
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown requested");
                break;
            }
        };
        let Some(batch) = batch else {
            warn!("Location subscription closed");
            break;
        };
        process_batch(&ingestor, hub.as_ref(), batch).await;
    }

    hub_handle.abort();
    postgres.close().await;
    info!("geotrack-engine shutdown complete");
    Ok(())
}

/// Ingest one batch and publish whatever it produced.
///
/// Notifications from the successful events are published even when other
/// events in the batch failed.
async fn process_batch<G, I, L, H>(
    ingestor: &BatchIngestor<G, I, L>,
    hub: &H,
    batch: Vec<async_nats::Message>,
) where
    G: GeofenceStore,
    I: IntervalStore,
    L: LatestLocationStore,
    H: PubSubHub,
{
    let payloads: Vec<_> = batch.into_iter().map(|message| message.payload).collect();
    let (notifications, result) = ingestor.ingest(&payloads).await.into_parts();

    if let Err(e) = hub.publish(&notifications).await {
        warn!(error = %e, "Failed to publish notifications");
    }

    match result {
        Ok(()) => debug!(
            events = payloads.len(),
            notifications = notifications.len(),
            "Batch processed"
        ),
        Err(e) => error!(
            events = payloads.len(),
            failed = e.failures().len(),
            error = %e,
            "Batch completed with failures, not retried"
        ),
    }
}

/// The config file named on the command line, in the environment, or the
/// default.
fn config_path() -> PathBuf {
    std::env::args()
        .nth(1)
        .or_else(|| std::env::var(CONFIG_PATH_ENV).ok())
        .map_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH), PathBuf::from)
}

fn load_config(path: &Path) -> Result<TrackerConfig, EngineError> {
    Ok(TrackerConfig::load(path)?)
}

/// Install the global subscriber. `RUST_LOG` wins over the configured level.
fn init_tracing(logging: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);
    match logging.format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Pretty => builder.init(),
    }
}

async fn connect_postgres(url: &str) -> Result<PostgresPool, EngineError> {
    let pool = PostgresPool::connect_url(url).await?;
    pool.run_migrations().await?;
    info!("PostgreSQL connected and migrated");
    Ok(pool)
}

async fn connect_dragonfly(url: &str) -> Result<DragonflyPool, EngineError> {
    Ok(DragonflyPool::connect(url).await?)
}

async fn start_hub(
    infrastructure: &InfrastructureConfig,
    hub: Arc<HubState>,
) -> Result<tokio::task::JoinHandle<()>, EngineError> {
    let server = ServerConfig {
        host: infrastructure.hub_host.clone(),
        port: infrastructure.hub_port,
    };
    Ok(geotrack_hub::spawn_hub(&server, hub).await?)
}

/// Join the worker queue group on the location subject, so each message
/// goes to exactly one worker.
async fn subscribe_locations(
    infrastructure: &InfrastructureConfig,
) -> Result<async_nats::Subscriber, EngineError> {
    let nats_url = &infrastructure.nats_url;
    let client = async_nats::connect(nats_url)
        .await
        .map_err(|e| EngineError::Nats {
            message: format!("failed to connect to NATS at {nats_url}: {e}"),
        })?;
    let subject = infrastructure.location_subject.clone();
    client
        .queue_subscribe(subject.clone(), infrastructure.queue_group.clone())
        .await
        .map_err(|e| EngineError::Nats {
            message: format!("failed to subscribe to {subject}: {e}"),
        })
}
