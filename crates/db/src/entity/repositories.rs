use async_trait::async_trait;
use storemesh_common::error::MeshResult;
use storemesh_common::types::EntityType;
use uuid::Uuid;

use crate::entity::models::{
    CanonicalEntity, CanonicalRecord, ReplayCursor, UpsertOutcome, UpsertResult,
};

#[async_trait]
pub trait CanonicalEntityRepository: Send + Sync {
    /// Upsert one record by `(tenant_id, entity_type, external_id)`.
    ///
    /// A record whose `external_updated_at` is not newer than the stored row
    /// leaves the projection untouched but still refreshes `synced_at`.
    async fn upsert(&self, record: &CanonicalRecord) -> MeshResult<UpsertOutcome>;

    /// Upsert a page of records. Failures are isolated per record: the rest
    /// of the batch commits and the failure is counted in `failed`.
    async fn upsert_batch(&self, records: &[CanonicalRecord]) -> MeshResult<UpsertResult>;

    /// Flip the status to `deleted`. Remote deletions are never destructive
    /// removes locally.
    async fn mark_deleted(
        &self,
        tenant_id: Uuid,
        entity_type: EntityType,
        external_id: i64,
    ) -> MeshResult<bool>;

    async fn find(
        &self,
        tenant_id: Uuid,
        entity_type: EntityType,
        external_id: i64,
    ) -> MeshResult<Option<CanonicalEntity>>;

    /// Stable keyset page over all tenants for one entity type, ordered by
    /// `(tenant_id, external_id)`. Used by index rebuilds.
    async fn list_page(
        &self,
        entity_type: EntityType,
        after: Option<ReplayCursor>,
        limit: i64,
    ) -> MeshResult<Vec<CanonicalEntity>>;

    async fn count(&self, tenant_id: Uuid, entity_type: EntityType) -> MeshResult<i64>;
}
