//! PostgreSQL implementation of the event and snapshot stores.

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use super::models::{EventRow, SnapshotRow};
use super::{CasOutcome, EventStore, InsertOutcome, SnapshotStore, StoreError};
use crate::domain::{EventRecord, LogId, SequenceId, Snapshot};

/// PostgreSQL-backed stores using `sqlx::PgPool`.
///
/// One value implements both [`EventStore`] and [`SnapshotStore`]; clone it
/// to hand the same pool to each role.
#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Creates the stores over the given connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Returns the underlying pool.
    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Applies the embedded schema migrations.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if a migration fails.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::Database(e.to_string()))?;
        tracing::info!("event log schema is up to date");
        Ok(())
    }
}

fn db_err(e: sqlx::Error) -> StoreError {
    StoreError::Database(e.to_string())
}

#[async_trait]
impl EventStore for PostgresStore {
    async fn append(
        &self,
        log_id: &LogId,
        event_id: Uuid,
        payload: &[u8],
    ) -> Result<SequenceId, StoreError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        // Holding a per-log lock until commit makes sequence ids of one log
        // become visible in the order they were assigned.
        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
            .bind(log_id.as_str())
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;

        let sequence_id = sqlx::query_scalar::<_, i64>(
            "INSERT INTO event_log (event_id, log_id, payload) VALUES ($1, $2, $3) \
             RETURNING sequence_id",
        )
        .bind(event_id)
        .bind(log_id.as_str())
        .bind(payload)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db) if db.is_unique_violation() => {
                StoreError::DuplicateEvent {
                    log_id: log_id.clone(),
                    event_id,
                }
            }
            other => db_err(other),
        })?;

        tx.commit().await.map_err(db_err)?;
        Ok(SequenceId::new(sequence_id))
    }

    async fn find_sequence_id(
        &self,
        log_id: &LogId,
        event_id: Uuid,
    ) -> Result<Option<SequenceId>, StoreError> {
        let row = sqlx::query_scalar::<_, i64>(
            "SELECT sequence_id FROM event_log WHERE log_id = $1 AND event_id = $2",
        )
        .bind(log_id.as_str())
        .bind(event_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(row.map(SequenceId::new))
    }

    async fn query_after(
        &self,
        log_id: &LogId,
        after: SequenceId,
    ) -> Result<Vec<EventRecord>, StoreError> {
        let rows = sqlx::query_as::<_, EventRow>(
            "SELECT sequence_id, event_id, log_id, payload, created_at FROM event_log \
             WHERE log_id = $1 AND sequence_id > $2 ORDER BY sequence_id ASC",
        )
        .bind(log_id.as_str())
        .bind(after.get())
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.into_iter().map(EventRecord::try_from).collect()
    }
}

#[async_trait]
impl SnapshotStore for PostgresStore {
    async fn find(&self, log_id: &LogId) -> Result<Option<Snapshot>, StoreError> {
        let row = sqlx::query_as::<_, SnapshotRow>(
            "SELECT log_id, snapshot_id, payload, updated_at FROM snapshot WHERE log_id = $1",
        )
        .bind(log_id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(row.map(Snapshot::from))
    }

    async fn insert_if_absent(
        &self,
        log_id: &LogId,
        snapshot: &Snapshot,
    ) -> Result<InsertOutcome, StoreError> {
        let result = sqlx::query(
            "INSERT INTO snapshot (log_id, snapshot_id, payload) VALUES ($1, $2, $3) \
             ON CONFLICT (log_id) DO NOTHING",
        )
        .bind(log_id.as_str())
        .bind(snapshot.snapshot_id)
        .bind(&snapshot.payload)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(if result.rows_affected() == 0 {
            InsertOutcome::AlreadyExists
        } else {
            InsertOutcome::Inserted
        })
    }

    async fn compare_and_swap(
        &self,
        log_id: &LogId,
        expected_id: Uuid,
        replacement: &Snapshot,
    ) -> Result<CasOutcome, StoreError> {
        let result = sqlx::query(
            "UPDATE snapshot SET snapshot_id = $3, payload = $4, updated_at = now() \
             WHERE log_id = $1 AND snapshot_id = $2",
        )
        .bind(log_id.as_str())
        .bind(expected_id)
        .bind(replacement.snapshot_id)
        .bind(&replacement.payload)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(if result.rows_affected() == 0 {
            CasOutcome::Mismatch
        } else {
            CasOutcome::Swapped
        })
    }
}
