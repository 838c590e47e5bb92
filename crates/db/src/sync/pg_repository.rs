use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::sync::models::{Checkpoint, RunStatus, SyncRun};
use crate::sync::repositories::{CheckpointRepository, SyncRunRepository};
use storemesh_common::error::{MeshError, MeshResult};
use storemesh_common::types::EntityType;

const RUN_COLUMNS: &str =
    "id, tenant_id, entity_type, status, items_processed, items_skipped, error_message, \
     started_at, completed_at";

#[derive(Clone)]
pub struct PgSyncRunRepository {
    pool: PgPool,
}

impl PgSyncRunRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn map_row(row: sqlx::postgres::PgRow) -> MeshResult<SyncRun> {
        let entity_type: String = row.get("entity_type");
        let status: String = row.get("status");
        Ok(SyncRun {
            id: row.get("id"),
            tenant_id: row.get("tenant_id"),
            entity_type: entity_type
                .parse::<EntityType>()
                .map_err(|e| MeshError::Database(e.to_string()))?,
            status: status
                .parse::<RunStatus>()
                .map_err(|e| MeshError::Database(e.to_string()))?,
            items_processed: row.get("items_processed"),
            items_skipped: row.get("items_skipped"),
            error_message: row.get("error_message"),
            started_at: row.get("started_at"),
            completed_at: row.get("completed_at"),
        })
    }
}

#[async_trait]
impl SyncRunRepository for PgSyncRunRepository {
    async fn start(&self, tenant_id: Uuid, entity_type: EntityType) -> MeshResult<SyncRun> {
        let row = sqlx::query(&format!(
            "insert into sync_runs (id, tenant_id, entity_type, status, started_at)
             values ($1, $2, $3, 'running', $4)
             returning {RUN_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(tenant_id)
        .bind(entity_type.as_str())
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| MeshError::Database(e.to_string()))?;

        Self::map_row(row)
    }

    async fn finish(
        &self,
        id: Uuid,
        status: RunStatus,
        items_processed: i32,
        items_skipped: i32,
        error_message: Option<&str>,
    ) -> MeshResult<SyncRun> {
        // The status guard keeps terminal rows immutable.
        let row = sqlx::query(&format!(
            "update sync_runs
             set status = $1, items_processed = $2, items_skipped = $3,
                 error_message = $4, completed_at = $5
             where id = $6 and status = 'running'
             returning {RUN_COLUMNS}"
        ))
        .bind(status.as_str())
        .bind(items_processed)
        .bind(items_skipped)
        .bind(error_message)
        .bind(Utc::now())
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| MeshError::Database(e.to_string()))?;

        match row {
            Some(r) => Self::map_row(r),
            None => Err(MeshError::Internal(format!(
                "sync run {id} is not running; refusing to finalize twice"
            ))),
        }
    }

    async fn list_recent(
        &self,
        tenant_id: Uuid,
        entity_type: Option<EntityType>,
        limit: i64,
    ) -> MeshResult<Vec<SyncRun>> {
        let rows = match entity_type {
            Some(et) => {
                sqlx::query(&format!(
                    "select {RUN_COLUMNS} from sync_runs
                     where tenant_id = $1 and entity_type = $2
                     order by started_at desc limit $3"
                ))
                .bind(tenant_id)
                .bind(et.as_str())
                .bind(limit)
                .fetch_all(&self.pool)
                .await
            }
            None => {
                sqlx::query(&format!(
                    "select {RUN_COLUMNS} from sync_runs
                     where tenant_id = $1
                     order by started_at desc limit $2"
                ))
                .bind(tenant_id)
                .bind(limit)
                .fetch_all(&self.pool)
                .await
            }
        }
        .map_err(|e| MeshError::Database(e.to_string()))?;

        rows.into_iter().map(Self::map_row).collect()
    }

    async fn latest(
        &self,
        tenant_id: Uuid,
        entity_type: EntityType,
    ) -> MeshResult<Option<SyncRun>> {
        let row = sqlx::query(&format!(
            "select {RUN_COLUMNS} from sync_runs
             where tenant_id = $1 and entity_type = $2
             order by started_at desc limit 1"
        ))
        .bind(tenant_id)
        .bind(entity_type.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| MeshError::Database(e.to_string()))?;

        match row {
            Some(r) => Ok(Some(Self::map_row(r)?)),
            None => Ok(None),
        }
    }
}

#[derive(Clone)]
pub struct PgCheckpointRepository {
    pool: PgPool,
}

impl PgCheckpointRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn map_row(row: sqlx::postgres::PgRow) -> MeshResult<Checkpoint> {
        let entity_type: String = row.get("entity_type");
        Ok(Checkpoint {
            tenant_id: row.get("tenant_id"),
            entity_type: entity_type
                .parse::<EntityType>()
                .map_err(|e| MeshError::Database(e.to_string()))?,
            last_synced_at: row.get("last_synced_at"),
            updated_at: row.get("updated_at"),
        })
    }
}

#[async_trait]
impl CheckpointRepository for PgCheckpointRepository {
    async fn get(
        &self,
        tenant_id: Uuid,
        entity_type: EntityType,
    ) -> MeshResult<Option<Checkpoint>> {
        let row = sqlx::query(
            "select tenant_id, entity_type, last_synced_at, updated_at
             from sync_checkpoints
             where tenant_id = $1 and entity_type = $2",
        )
        .bind(tenant_id)
        .bind(entity_type.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| MeshError::Database(e.to_string()))?;

        match row {
            Some(r) => Ok(Some(Self::map_row(r)?)),
            None => Ok(None),
        }
    }

    async fn advance(
        &self,
        tenant_id: Uuid,
        entity_type: EntityType,
        watermark: DateTime<Utc>,
    ) -> MeshResult<Checkpoint> {
        let row = sqlx::query(
            "insert into sync_checkpoints (tenant_id, entity_type, last_synced_at, updated_at)
             values ($1, $2, $3, $4)
             on conflict (tenant_id, entity_type) do update set
               last_synced_at = greatest(sync_checkpoints.last_synced_at, excluded.last_synced_at),
               updated_at = excluded.updated_at
             returning tenant_id, entity_type, last_synced_at, updated_at",
        )
        .bind(tenant_id)
        .bind(entity_type.as_str())
        .bind(watermark)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| MeshError::Database(e.to_string()))?;

        Self::map_row(row)
    }

    async fn reset(&self, tenant_id: Uuid, entity_type: EntityType) -> MeshResult<()> {
        sqlx::query("delete from sync_checkpoints where tenant_id = $1 and entity_type = $2")
            .bind(tenant_id)
            .bind(entity_type.as_str())
            .execute(&self.pool)
            .await
            .map_err(|e| MeshError::Database(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
pub(crate) async fn ensure_schema(pool: &PgPool) -> Option<()> {
    sqlx::query(
        "create table if not exists sync_runs (
           id uuid primary key,
           tenant_id uuid not null,
           entity_type text not null,
           status text not null,
           items_processed integer not null default 0,
           items_skipped integer not null default 0,
           error_message text,
           started_at timestamptz not null,
           completed_at timestamptz
         )",
    )
    .execute(pool)
    .await
    .ok()?;

    sqlx::query(
        "create table if not exists sync_checkpoints (
           tenant_id uuid not null,
           entity_type text not null,
           last_synced_at timestamptz not null,
           updated_at timestamptz not null,
           primary key (tenant_id, entity_type)
         )",
    )
    .execute(pool)
    .await
    .ok()?;
    Some(())
}
