//! Postgres implementation of the synced-pair registry.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::debug;

use tasklink_core::registry::{
    NewSyncedPair, RegistryError, RegistryResult, SyncRegistry, SyncedPair,
};
use tasklink_core::types::SourceObjectType;

/// Registry over the `synced_pairs` table.
#[derive(Debug, Clone)]
pub struct PgSyncRegistry {
    pool: PgPool,
}

#[derive(Debug, sqlx::FromRow)]
struct SyncedPairRow {
    source_object_id: String,
    source_object_type: String,
    target_object_id: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<SyncedPairRow> for SyncedPair {
    type Error = RegistryError;

    fn try_from(row: SyncedPairRow) -> Result<Self, Self::Error> {
        let source_object_type: SourceObjectType =
            row.source_object_type.parse().map_err(|e: String| {
                RegistryError::storage(format!("corrupt synced_pairs row: {e}"))
            })?;
        Ok(SyncedPair {
            source_object_id: row.source_object_id,
            source_object_type,
            target_object_id: row.target_object_id,
            created_at: row.created_at,
        })
    }
}

impl PgSyncRegistry {
    /// Create a registry over an existing connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SyncRegistry for PgSyncRegistry {
    async fn find_by_source(
        &self,
        source_object_id: &str,
        source_object_type: SourceObjectType,
    ) -> RegistryResult<Option<SyncedPair>> {
        let row: Option<SyncedPairRow> = sqlx::query_as(
            r"
            SELECT source_object_id, source_object_type, target_object_id, created_at
            FROM synced_pairs
            WHERE source_object_id = $1 AND source_object_type = $2
            ",
        )
        .bind(source_object_id)
        .bind(source_object_type.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| RegistryError::storage_with_source("find_by_source failed", e))?;

        row.map(SyncedPair::try_from).transpose()
    }

    async fn find_by_target(&self, target_object_id: &str) -> RegistryResult<Option<SyncedPair>> {
        let row: Option<SyncedPairRow> = sqlx::query_as(
            r"
            SELECT source_object_id, source_object_type, target_object_id, created_at
            FROM synced_pairs
            WHERE target_object_id = $1
            ",
        )
        .bind(target_object_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| RegistryError::storage_with_source("find_by_target failed", e))?;

        row.map(SyncedPair::try_from).transpose()
    }

    async fn insert_if_absent(&self, pair: NewSyncedPair) -> RegistryResult<bool> {
        let result = sqlx::query(
            r"
            INSERT INTO synced_pairs (source_object_id, source_object_type, target_object_id)
            VALUES ($1, $2, $3)
            ON CONFLICT (source_object_id, source_object_type) DO NOTHING
            ",
        )
        .bind(&pair.source_object_id)
        .bind(pair.source_object_type.as_str())
        .bind(&pair.target_object_id)
        .execute(&self.pool)
        .await
        .map_err(|e| RegistryError::storage_with_source("insert_if_absent failed", e))?;

        let inserted = result.rows_affected() > 0;
        debug!(
            source_object_id = %pair.source_object_id,
            source_object_type = %pair.source_object_type,
            target_object_id = %pair.target_object_id,
            inserted,
            "synced pair insert"
        );
        Ok(inserted)
    }
}
