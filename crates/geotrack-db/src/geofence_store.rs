//! Geofence records in `PostgreSQL`.
//!
//! Each row carries its owning grid cell as two integer columns; the
//! per-cell lookup is an index scan on `(grid_lng, grid_lat)`. The border
//! is stored as a JSON array of `[lng, lat]` pairs.

use geotrack_core::{GeofenceStore, StoreError};
use geotrack_types::{Geofence, GeofenceId, GridCell, Position};
use sqlx::PgPool;
use sqlx::types::Json;
use uuid::Uuid;

use crate::error::DbError;

/// Store name used in error reports.
const STORE: &str = "geofence";

/// Operations on the `geofences` table.
#[derive(Debug, Clone)]
pub struct PgGeofenceStore {
    pool: PgPool,
}

impl PgGeofenceStore {
    /// Create a store bound to a connection pool.
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert or replace a geofence.
    ///
    /// Provisioning lives outside the tracker; this exists for seeding and
    /// tests.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Postgres`] if the write fails.
    pub async fn upsert(&self, geofence: &Geofence) -> Result<(), DbError> {
        sqlx::query(
            r"INSERT INTO geofences (id, name, grid_lng, grid_lat, border)
              VALUES ($1, $2, $3, $4, $5)
              ON CONFLICT (id) DO UPDATE
              SET name = EXCLUDED.name,
                  grid_lng = EXCLUDED.grid_lng,
                  grid_lat = EXCLUDED.grid_lat,
                  border = EXCLUDED.border",
        )
        .bind(geofence.id.into_inner())
        .bind(&geofence.name)
        .bind(geofence.grid_cell.lng())
        .bind(geofence.grid_cell.lat())
        .bind(Json(&geofence.border))
        .execute(&self.pool)
        .await?;
        tracing::debug!(geofence_id = %geofence.id, cell = %geofence.grid_cell, "Upserted geofence");
        Ok(())
    }

    /// Every geofence.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Postgres`] if the query fails.
    pub async fn fetch_all(&self) -> Result<Vec<Geofence>, DbError> {
        let rows = sqlx::query_as::<_, GeofenceRow>(
            r"SELECT id, name, grid_lng, grid_lat, border FROM geofences ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Geofence::from).collect())
    }

    /// Geofences owned by `cell`.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Postgres`] if the query fails.
    pub async fn fetch_in_cell(&self, cell: GridCell) -> Result<Vec<Geofence>, DbError> {
        let rows = sqlx::query_as::<_, GeofenceRow>(
            r"SELECT id, name, grid_lng, grid_lat, border
              FROM geofences
              WHERE grid_lng = $1 AND grid_lat = $2
              ORDER BY id",
        )
        .bind(cell.lng())
        .bind(cell.lat())
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Geofence::from).collect())
    }
}

impl GeofenceStore for PgGeofenceStore {
    async fn list_geofences(&self) -> Result<Vec<Geofence>, StoreError> {
        self.fetch_all().await.map_err(|e| e.into_store_error(STORE))
    }

    async fn geofences_in_cell(&self, cell: GridCell) -> Result<Vec<Geofence>, StoreError> {
        self.fetch_in_cell(cell)
            .await
            .map_err(|e| e.into_store_error(STORE))
    }
}

/// A row from the `geofences` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct GeofenceRow {
    /// Geofence identifier.
    pub id: Uuid,
    /// Display name.
    pub name: String,
    /// Owning cell, longitude index.
    pub grid_lng: i32,
    /// Owning cell, latitude index.
    pub grid_lat: i32,
    /// Closed outer ring.
    pub border: Json<Vec<Position>>,
}

impl From<GeofenceRow> for Geofence {
    fn from(row: GeofenceRow) -> Self {
        Self {
            id: GeofenceId::from(row.id),
            name: row.name,
            border: row.border.0,
            grid_cell: GridCell::new(row.grid_lng, row.grid_lat),
        }
    }
}
