//! `Dragonfly` (Redis-compatible) latest-location state.
//!
//! Only the newest ping of each entity is kept here; history lives
//! elsewhere. Writes are unconditional overwrites.
//!
//! # Key Patterns
//!
//! | Pattern | Type | Description |
//! |---------|------|-------------|
//! | `entity:{id}:location` | JSON | Latest [`LocationEvent`] of the entity |

use fred::prelude::*;
use geotrack_core::{LatestLocationStore, StoreError};
use geotrack_types::{EntityId, LocationEvent};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::DbError;

/// Store name used in error reports.
const STORE: &str = "location";

/// Connection handle to a `Dragonfly` (Redis-compatible) instance.
#[derive(Clone)]
pub struct DragonflyPool {
    client: Client,
}

impl DragonflyPool {
    /// Connect to `Dragonfly` at the given URL.
    ///
    /// The URL should follow the Redis URL scheme:
    /// `redis://host:port` or `redis://host:port/db`
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Config`] if the URL cannot be parsed.
    /// Returns [`DbError::Dragonfly`] if the connection fails.
    pub async fn connect(url: &str) -> Result<Self, DbError> {
        let config = Config::from_url(url)
            .map_err(|e| DbError::Config(format!("Invalid Dragonfly URL: {e}")))?;

        let client = Builder::from_config(config).build()?;
        client.init().await?;

        tracing::info!("Connected to Dragonfly");
        Ok(Self { client })
    }

    /// Serialize `value` as JSON and store it at `key`.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Serialization`] if serialization fails.
    /// Returns [`DbError::Dragonfly`] if the write fails.
    pub async fn set_json<T: Serialize + Sync>(&self, key: &str, value: &T) -> Result<(), DbError> {
        let json = serde_json::to_string(value)?;
        let _: () = self.client.set(key, json.as_str(), None, None, false).await?;
        Ok(())
    }

    /// Read the value at `key` and deserialize it from JSON.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Serialization`] if deserialization fails.
    /// Returns [`DbError::Dragonfly`] if the read fails.
    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, DbError> {
        let value: Option<String> = self.client.get(key).await?;
        Ok(value.map(|s| serde_json::from_str(&s)).transpose()?)
    }

    /// Delete a key.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Dragonfly`] if the delete fails.
    pub async fn delete(&self, key: &str) -> Result<(), DbError> {
        let _: u32 = self.client.del(key).await?;
        Ok(())
    }

    /// The latest location of `entity_id`, if one was recorded.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the read or deserialization fails.
    pub async fn latest_location(
        &self,
        entity_id: EntityId,
    ) -> Result<Option<LocationEvent>, DbError> {
        self.get_json(&location_key(entity_id)).await
    }
}

impl LatestLocationStore for DragonflyPool {
    async fn set_latest_location(&self, event: &LocationEvent) -> Result<(), StoreError> {
        self.set_json(&location_key(event.entity_id), event)
            .await
            .map_err(|e| e.into_store_error(STORE))
    }
}

/// Key holding the latest location of `entity_id`.
pub fn location_key(entity_id: EntityId) -> String {
    format!("entity:{entity_id}:location")
}
