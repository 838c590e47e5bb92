use async_trait::async_trait;
use chrono::{DateTime, Utc};
use storemesh_common::error::MeshResult;
use storemesh_common::types::EntityType;
use uuid::Uuid;

use crate::sync::models::{Checkpoint, RunStatus, SyncRun};

#[async_trait]
pub trait SyncRunRepository: Send + Sync {
    /// Insert a new run row in `running` state.
    async fn start(&self, tenant_id: Uuid, entity_type: EntityType) -> MeshResult<SyncRun>;

    /// Finalize a run. The error message, if any, is stored verbatim.
    async fn finish(
        &self,
        id: Uuid,
        status: RunStatus,
        items_processed: i32,
        items_skipped: i32,
        error_message: Option<&str>,
    ) -> MeshResult<SyncRun>;

    async fn list_recent(
        &self,
        tenant_id: Uuid,
        entity_type: Option<EntityType>,
        limit: i64,
    ) -> MeshResult<Vec<SyncRun>>;

    /// Most recent run for one (tenant, entity type), if any.
    async fn latest(
        &self,
        tenant_id: Uuid,
        entity_type: EntityType,
    ) -> MeshResult<Option<SyncRun>>;
}

#[async_trait]
pub trait CheckpointRepository: Send + Sync {
    async fn get(
        &self,
        tenant_id: Uuid,
        entity_type: EntityType,
    ) -> MeshResult<Option<Checkpoint>>;

    /// Advance the watermark. Monotonic: a value older than the stored one
    /// is a no-op, so a failed page can never move the cursor backwards.
    async fn advance(
        &self,
        tenant_id: Uuid,
        entity_type: EntityType,
        watermark: DateTime<Utc>,
    ) -> MeshResult<Checkpoint>;

    /// Drop the watermark so the next incremental run starts from scratch.
    async fn reset(&self, tenant_id: Uuid, entity_type: EntityType) -> MeshResult<()>;
}
