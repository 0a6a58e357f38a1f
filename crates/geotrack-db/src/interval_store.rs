//! Membership intervals in `PostgreSQL`.
//!
//! The partial unique index `geofence_intervals_one_open` allows one row
//! with a null `exit_timestamp` per (entity, geofence). Opening intervals
//! inserts with `ON CONFLICT DO NOTHING` inside a transaction and rolls
//! back if any row was skipped, which makes the open a conditional,
//! all-or-nothing write.

use chrono::{DateTime, Utc};
use geotrack_core::{IntervalStore, StoreError};
use geotrack_types::{EntityId, GeofenceId, MembershipInterval};
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::DbError;

/// Store name used in error reports.
const STORE: &str = "interval";

/// Outcome of a conditional open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenResult {
    /// Every interval was opened.
    Opened,
    /// This geofence already had an open interval; nothing was written.
    Conflict(GeofenceId),
}

/// Operations on the `geofence_intervals` table.
#[derive(Debug, Clone)]
pub struct PgIntervalStore {
    pool: PgPool,
}

impl PgIntervalStore {
    /// Create a store bound to a connection pool.
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Open intervals of `entity_id` entered at or before `at`.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Postgres`] if the query fails.
    pub async fn fetch_open(
        &self,
        entity_id: EntityId,
        at: DateTime<Utc>,
    ) -> Result<Vec<MembershipInterval>, DbError> {
        let rows = sqlx::query_as::<_, IntervalRow>(
            r"SELECT entity_id, geofence_id, entry_timestamp, exit_timestamp
              FROM geofence_intervals
              WHERE entity_id = $1 AND exit_timestamp IS NULL AND entry_timestamp <= $2",
        )
        .bind(entity_id.into_inner())
        .bind(at)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(MembershipInterval::from).collect())
    }

    /// Open one interval per geofence unless any of them is already open.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Postgres`] if the transaction fails.
    pub async fn open(
        &self,
        entity_id: EntityId,
        geofence_ids: &[GeofenceId],
        entry: DateTime<Utc>,
    ) -> Result<OpenResult, DbError> {
        if geofence_ids.is_empty() {
            return Ok(OpenResult::Opened);
        }
        let ids: Vec<Uuid> = geofence_ids.iter().map(|id| id.into_inner()).collect();

        let mut tx = self.pool.begin().await?;
        let inserted: Vec<Uuid> = sqlx::query_scalar(
            r"INSERT INTO geofence_intervals (entity_id, geofence_id, entry_timestamp)
              SELECT $1, g, $3 FROM UNNEST($2::UUID[]) AS g
              ON CONFLICT (entity_id, geofence_id) WHERE exit_timestamp IS NULL DO NOTHING
              RETURNING geofence_id",
        )
        .bind(entity_id.into_inner())
        .bind(&ids)
        .bind(entry)
        .fetch_all(&mut *tx)
        .await?;

        if let Some(&skipped) = ids.iter().find(|id| !inserted.contains(*id)) {
            tx.rollback().await?;
            return Ok(OpenResult::Conflict(GeofenceId::from(skipped)));
        }
        tx.commit().await?;
        tracing::debug!(%entity_id, count = ids.len(), "Opened intervals");
        Ok(OpenResult::Opened)
    }

    /// Close the open intervals of `entity_id` in `geofence_ids` that were
    /// entered before `exit`. Returns the number of rows closed.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Postgres`] if the update fails.
    pub async fn close(
        &self,
        entity_id: EntityId,
        geofence_ids: &[GeofenceId],
        exit: DateTime<Utc>,
    ) -> Result<u64, DbError> {
        if geofence_ids.is_empty() {
            return Ok(0);
        }
        let ids: Vec<Uuid> = geofence_ids.iter().map(|id| id.into_inner()).collect();
        let result = sqlx::query(
            r"UPDATE geofence_intervals
              SET exit_timestamp = $3
              WHERE entity_id = $1
                AND geofence_id = ANY($2)
                AND exit_timestamp IS NULL
                AND entry_timestamp < $3",
        )
        .bind(entity_id.into_inner())
        .bind(&ids)
        .bind(exit)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// The latest `limit` intervals of `entity_id`, newest entry first.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Postgres`] if the query fails.
    pub async fn fetch_recent(
        &self,
        entity_id: EntityId,
        limit: usize,
    ) -> Result<Vec<MembershipInterval>, DbError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = sqlx::query_as::<_, IntervalRow>(
            r"SELECT entity_id, geofence_id, entry_timestamp, exit_timestamp
              FROM geofence_intervals
              WHERE entity_id = $1
              ORDER BY entry_timestamp DESC
              LIMIT $2",
        )
        .bind(entity_id.into_inner())
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(MembershipInterval::from).collect())
    }
}

impl IntervalStore for PgIntervalStore {
    async fn open_intervals(
        &self,
        entity_id: EntityId,
        at: DateTime<Utc>,
    ) -> Result<Vec<MembershipInterval>, StoreError> {
        self.fetch_open(entity_id, at)
            .await
            .map_err(|e| e.into_store_error(STORE))
    }

    async fn insert_open_intervals(
        &self,
        entity_id: EntityId,
        geofence_ids: &[GeofenceId],
        entry: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        match self.open(entity_id, geofence_ids, entry).await {
            Ok(OpenResult::Opened) => Ok(()),
            Ok(OpenResult::Conflict(geofence_id)) => Err(StoreError::IntervalConflict {
                entity_id,
                geofence_id,
            }),
            Err(e) => Err(e.into_store_error(STORE)),
        }
    }

    async fn close_open_intervals(
        &self,
        entity_id: EntityId,
        geofence_ids: &[GeofenceId],
        exit: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        self.close(entity_id, geofence_ids, exit)
            .await
            .map_err(|e| e.into_store_error(STORE))
    }

    async fn recent_intervals(
        &self,
        entity_id: EntityId,
        limit: usize,
    ) -> Result<Vec<MembershipInterval>, StoreError> {
        self.fetch_recent(entity_id, limit)
            .await
            .map_err(|e| e.into_store_error(STORE))
    }
}

/// A row from the `geofence_intervals` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct IntervalRow {
    /// The entity.
    pub entity_id: Uuid,
    /// The geofence.
    pub geofence_id: Uuid,
    /// When the entity entered.
    pub entry_timestamp: DateTime<Utc>,
    /// When the entity left, if it has.
    pub exit_timestamp: Option<DateTime<Utc>>,
}

impl From<IntervalRow> for MembershipInterval {
    fn from(row: IntervalRow) -> Self {
        Self {
            entity_id: EntityId::from(row.entity_id),
            geofence_id: GeofenceId::from(row.geofence_id),
            entry_timestamp: row.entry_timestamp,
            exit_timestamp: row.exit_timestamp,
        }
    }
}
