use async_trait::async_trait;
use chrono::Utc;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::tenant::models::{NewTenant, Tenant};
use crate::tenant::repositories::TenantRepository;
use storemesh_common::error::{MeshError, MeshResult};

const TENANT_COLUMNS: &str = "id, name, base_url, consumer_key, consumer_secret, webhook_secret, \
     currency, timezone, enabled, created_at, updated_at";

#[derive(Clone)]
pub struct PgTenantRepository {
    pool: PgPool,
}

impl PgTenantRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn map_row(row: sqlx::postgres::PgRow) -> MeshResult<Tenant> {
        Ok(Tenant {
            id: row.get("id"),
            name: row.get("name"),
            base_url: row.get("base_url"),
            consumer_key: row.get("consumer_key"),
            consumer_secret: row.get("consumer_secret"),
            webhook_secret: row.get("webhook_secret"),
            currency: row.get("currency"),
            timezone: row.get("timezone"),
            enabled: row.get("enabled"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        })
    }
}

#[async_trait]
impl TenantRepository for PgTenantRepository {
    async fn create(&self, tenant: NewTenant) -> MeshResult<Tenant> {
        let row = sqlx::query(&format!(
            "insert into tenants
             (id, name, base_url, consumer_key, consumer_secret, webhook_secret, currency, timezone)
             values ($1, $2, $3, $4, $5, $6, $7, $8)
             returning {TENANT_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(&tenant.name)
        .bind(&tenant.base_url)
        .bind(&tenant.consumer_key)
        .bind(&tenant.consumer_secret)
        .bind(&tenant.webhook_secret)
        .bind(&tenant.currency)
        .bind(&tenant.timezone)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| MeshError::Database(e.to_string()))?;

        Self::map_row(row)
    }

    async fn find(&self, id: Uuid) -> MeshResult<Option<Tenant>> {
        let row = sqlx::query(&format!(
            "select {TENANT_COLUMNS} from tenants where id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| MeshError::Database(e.to_string()))?;

        match row {
            Some(r) => Ok(Some(Self::map_row(r)?)),
            None => Ok(None),
        }
    }

    async fn list_enabled(&self) -> MeshResult<Vec<Tenant>> {
        let rows = sqlx::query(&format!(
            "select {TENANT_COLUMNS} from tenants where enabled order by created_at"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| MeshError::Database(e.to_string()))?;

        rows.into_iter().map(Self::map_row).collect()
    }

    async fn set_enabled(&self, id: Uuid, enabled: bool) -> MeshResult<()> {
        sqlx::query("update tenants set enabled = $1, updated_at = $2 where id = $3")
            .bind(enabled)
            .bind(Utc::now())
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| MeshError::Database(e.to_string()))?;
        Ok(())
    }

    async fn update_credentials(
        &self,
        id: Uuid,
        consumer_key: &str,
        consumer_secret: &str,
    ) -> MeshResult<()> {
        sqlx::query(
            "update tenants
             set consumer_key = $1, consumer_secret = $2, updated_at = $3
             where id = $4",
        )
        .bind(consumer_key)
        .bind(consumer_secret)
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| MeshError::Database(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
pub(crate) async fn ensure_schema(pool: &PgPool) -> Option<()> {
    sqlx::query(
        "create table if not exists tenants (
           id uuid primary key,
           name text not null,
           base_url text not null,
           consumer_key text not null,
           consumer_secret text not null,
           webhook_secret text not null,
           currency text not null default 'USD',
           timezone text not null default 'UTC',
           enabled boolean not null default true,
           created_at timestamptz not null default now(),
           updated_at timestamptz not null default now()
         )",
    )
    .execute(pool)
    .await
    .ok()?;
    Some(())
}
