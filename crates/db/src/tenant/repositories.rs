use async_trait::async_trait;
use uuid::Uuid;

use crate::tenant::models::{NewTenant, Tenant};
use storemesh_common::error::MeshResult;

#[async_trait]
pub trait TenantRepository: Send + Sync {
    async fn create(&self, tenant: NewTenant) -> MeshResult<Tenant>;

    async fn find(&self, id: Uuid) -> MeshResult<Option<Tenant>>;

    async fn list_enabled(&self) -> MeshResult<Vec<Tenant>>;

    /// Soft-enable/disable. Disabled tenants are skipped by the sync engine
    /// and rejected at the webhook ingress.
    async fn set_enabled(&self, id: Uuid, enabled: bool) -> MeshResult<()>;

    async fn update_credentials(
        &self,
        id: Uuid,
        consumer_key: &str,
        consumer_secret: &str,
    ) -> MeshResult<()>;
}
