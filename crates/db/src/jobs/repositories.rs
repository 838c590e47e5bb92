use async_trait::async_trait;
use chrono::{DateTime, Utc};
use storemesh_common::error::MeshResult;
use storemesh_common::types::EntityType;
use uuid::Uuid;

use crate::jobs::models::{EnqueueOutcome, NewSyncJob, SyncJob};

#[async_trait]
pub trait JobRepository: Send + Sync {
    /// Enqueue a job, deduplicating against any queued or running job for the
    /// same `(tenant_id, entity_type)`. At most one job per key is ever
    /// active, which is what serializes runs within a key stream.
    async fn enqueue(&self, job: NewSyncJob) -> MeshResult<EnqueueOutcome>;

    /// Claim the oldest eligible queued job, marking it running and bumping
    /// `attempts`. Safe for concurrent workers (`for update skip locked`).
    async fn claim_next(&self, now: DateTime<Utc>) -> MeshResult<Option<SyncJob>>;

    /// Put a transiently-failed job back in the queue, eligible at `run_after`.
    async fn schedule_retry(
        &self,
        id: Uuid,
        error: &str,
        run_after: DateTime<Utc>,
    ) -> MeshResult<()>;

    async fn mark_succeeded(&self, id: Uuid) -> MeshResult<()>;

    /// Terminal failure. `dead = true` marks the retry ceiling exhausted.
    async fn mark_failed(&self, id: Uuid, error: &str, dead: bool) -> MeshResult<()>;

    /// Flag the active job for this key, if any. The coordinator polls the
    /// flag between pages.
    async fn request_cancel(&self, tenant_id: Uuid, entity_type: EntityType) -> MeshResult<bool>;

    async fn cancel_requested(&self, id: Uuid) -> MeshResult<bool>;

    async fn find(&self, id: Uuid) -> MeshResult<Option<SyncJob>>;
}
