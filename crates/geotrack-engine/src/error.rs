//! Error types for the ingestion worker.
//!
//! [`EngineError`] covers every startup step that can fail. Any of them is
//! fatal; `main` adds context with `anyhow` and exits.

/// Startup failure of the ingestion worker.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Configuration loading failed.
    #[error("config error: {source}")]
    Config {
        /// The underlying config error.
        #[from]
        source: geotrack_core::config::ConfigError,
    },

    /// A database could not be reached or migrated.
    #[error("database error: {source}")]
    Database {
        /// The underlying database error.
        #[from]
        source: geotrack_db::DbError,
    },

    /// NATS connection or subscription failed.
    #[error("NATS error: {message}")]
    Nats {
        /// Description of the NATS failure.
        message: String,
    },

    /// The hub server failed to start.
    #[error("hub error: {source}")]
    Hub {
        /// The underlying server error.
        #[from]
        source: geotrack_hub::ServerError,
    },
}
