use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::entity::models::{
    CanonicalEntity, CanonicalRecord, ReplayCursor, UpsertOutcome, UpsertResult,
};
use crate::entity::repositories::CanonicalEntityRepository;
use storemesh_common::error::{MeshError, MeshResult};
use storemesh_common::types::EntityType;

const ENTITY_COLUMNS: &str = "id, tenant_id, entity_type, external_id, status, title, \
     total_amount, currency, customer_email, rating, external_created_at, external_updated_at, \
     payload, schema_version, synced_at, first_seen_at";

#[derive(Clone)]
pub struct PgCanonicalRepository {
    pool: PgPool,
}

impl PgCanonicalRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn map_row(row: sqlx::postgres::PgRow) -> MeshResult<CanonicalEntity> {
        let entity_type: String = row.get("entity_type");
        Ok(CanonicalEntity {
            id: row.get("id"),
            tenant_id: row.get("tenant_id"),
            entity_type: entity_type
                .parse::<EntityType>()
                .map_err(|e| MeshError::Database(e.to_string()))?,
            external_id: row.get("external_id"),
            status: row.get("status"),
            title: row.get("title"),
            total_amount: row.get("total_amount"),
            currency: row.get("currency"),
            customer_email: row.get("customer_email"),
            rating: row.get("rating"),
            external_created_at: row.get("external_created_at"),
            external_updated_at: row.get("external_updated_at"),
            payload: row.get("payload"),
            schema_version: row.get("schema_version"),
            synced_at: row.get("synced_at"),
            first_seen_at: row.get("first_seen_at"),
        })
    }

    async fn stored_watermark(
        &self,
        record: &CanonicalRecord,
    ) -> MeshResult<Option<DateTime<Utc>>> {
        let row = sqlx::query(
            "select external_updated_at from canonical_records
             where tenant_id = $1 and entity_type = $2 and external_id = $3",
        )
        .bind(record.tenant_id)
        .bind(record.entity_type.as_str())
        .bind(record.external_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| MeshError::Database(e.to_string()))?;

        Ok(row.map(|r| r.get("external_updated_at")))
    }
}

#[async_trait]
impl CanonicalEntityRepository for PgCanonicalRepository {
    async fn upsert(&self, record: &CanonicalRecord) -> MeshResult<UpsertOutcome> {
        let now = Utc::now();

        match self.stored_watermark(record).await? {
            None => {
                // Fresh row. The on-conflict arm only covers a concurrent
                // insert from another key stream racing this one.
                sqlx::query(
                    "insert into canonical_records
                     (id, tenant_id, entity_type, external_id, status, title, total_amount,
                      currency, customer_email, rating, external_created_at, external_updated_at,
                      payload, schema_version, synced_at, first_seen_at)
                     values ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $15)
                     on conflict (tenant_id, entity_type, external_id) do update set
                       synced_at = excluded.synced_at",
                )
                .bind(Uuid::new_v4())
                .bind(record.tenant_id)
                .bind(record.entity_type.as_str())
                .bind(record.external_id)
                .bind(&record.status)
                .bind(&record.title)
                .bind(record.total_amount)
                .bind(&record.currency)
                .bind(&record.customer_email)
                .bind(record.rating)
                .bind(record.external_created_at)
                .bind(record.external_updated_at)
                .bind(&record.payload)
                .bind(record.schema_version)
                .bind(now)
                .execute(&self.pool)
                .await
                .map_err(|e| MeshError::Database(e.to_string()))?;

                Ok(UpsertOutcome::Inserted)
            }
            Some(stored) if record.external_updated_at > stored => {
                sqlx::query(
                    "update canonical_records set
                       status = $1, title = $2, total_amount = $3, currency = $4,
                       customer_email = $5, rating = $6, external_created_at = $7,
                       external_updated_at = $8, payload = $9, schema_version = $10,
                       synced_at = $11
                     where tenant_id = $12 and entity_type = $13 and external_id = $14",
                )
                .bind(&record.status)
                .bind(&record.title)
                .bind(record.total_amount)
                .bind(&record.currency)
                .bind(&record.customer_email)
                .bind(record.rating)
                .bind(record.external_created_at)
                .bind(record.external_updated_at)
                .bind(&record.payload)
                .bind(record.schema_version)
                .bind(now)
                .bind(record.tenant_id)
                .bind(record.entity_type.as_str())
                .bind(record.external_id)
                .execute(&self.pool)
                .await
                .map_err(|e| MeshError::Database(e.to_string()))?;

                Ok(UpsertOutcome::Updated)
            }
            Some(_) => {
                // Not newer: confirmed unchanged, only the ingestion time moves.
                sqlx::query(
                    "update canonical_records set synced_at = $1
                     where tenant_id = $2 and entity_type = $3 and external_id = $4",
                )
                .bind(now)
                .bind(record.tenant_id)
                .bind(record.entity_type.as_str())
                .bind(record.external_id)
                .execute(&self.pool)
                .await
                .map_err(|e| MeshError::Database(e.to_string()))?;

                Ok(UpsertOutcome::Unchanged)
            }
        }
    }

    async fn upsert_batch(&self, records: &[CanonicalRecord]) -> MeshResult<UpsertResult> {
        let mut result = UpsertResult::default();

        for record in records {
            match self.upsert(record).await {
                Ok(outcome) => result.record(outcome),
                Err(e) => {
                    tracing::warn!(
                        tenant_id = %record.tenant_id,
                        entity_type = %record.entity_type,
                        external_id = record.external_id,
                        error = %e,
                        "failed to upsert canonical record"
                    );
                    result.record_failure(record.external_updated_at);
                }
            }
        }

        Ok(result)
    }

    async fn mark_deleted(
        &self,
        tenant_id: Uuid,
        entity_type: EntityType,
        external_id: i64,
    ) -> MeshResult<bool> {
        let done = sqlx::query(
            "update canonical_records set status = 'deleted', synced_at = $1
             where tenant_id = $2 and entity_type = $3 and external_id = $4",
        )
        .bind(Utc::now())
        .bind(tenant_id)
        .bind(entity_type.as_str())
        .bind(external_id)
        .execute(&self.pool)
        .await
        .map_err(|e| MeshError::Database(e.to_string()))?;

        Ok(done.rows_affected() > 0)
    }

    async fn find(
        &self,
        tenant_id: Uuid,
        entity_type: EntityType,
        external_id: i64,
    ) -> MeshResult<Option<CanonicalEntity>> {
        let row = sqlx::query(&format!(
            "select {ENTITY_COLUMNS} from canonical_records
             where tenant_id = $1 and entity_type = $2 and external_id = $3"
        ))
        .bind(tenant_id)
        .bind(entity_type.as_str())
        .bind(external_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| MeshError::Database(e.to_string()))?;

        match row {
            Some(r) => Ok(Some(Self::map_row(r)?)),
            None => Ok(None),
        }
    }

    async fn list_page(
        &self,
        entity_type: EntityType,
        after: Option<ReplayCursor>,
        limit: i64,
    ) -> MeshResult<Vec<CanonicalEntity>> {
        let cursor = after.unwrap_or(ReplayCursor {
            tenant_id: Uuid::nil(),
            external_id: i64::MIN,
        });

        let rows = sqlx::query(&format!(
            "select {ENTITY_COLUMNS} from canonical_records
             where entity_type = $1 and (tenant_id, external_id) > ($2, $3)
             order by tenant_id, external_id
             limit $4"
        ))
        .bind(entity_type.as_str())
        .bind(cursor.tenant_id)
        .bind(cursor.external_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| MeshError::Database(e.to_string()))?;

        rows.into_iter().map(Self::map_row).collect()
    }

    async fn count(&self, tenant_id: Uuid, entity_type: EntityType) -> MeshResult<i64> {
        let row = sqlx::query(
            "select count(*) as n from canonical_records
             where tenant_id = $1 and entity_type = $2",
        )
        .bind(tenant_id)
        .bind(entity_type.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| MeshError::Database(e.to_string()))?;

        Ok(row.get("n"))
    }
}

#[cfg(test)]
pub(crate) async fn ensure_schema(pool: &PgPool) -> Option<()> {
    sqlx::query(
        "create table if not exists canonical_records (
           id uuid primary key,
           tenant_id uuid not null,
           entity_type text not null,
           external_id bigint not null,
           status text,
           title text,
           total_amount numeric,
           currency text,
           customer_email text,
           rating integer check (rating is null or rating between 1 and 5),
           external_created_at timestamptz,
           external_updated_at timestamptz not null,
           payload jsonb not null,
           schema_version integer not null,
           synced_at timestamptz not null,
           first_seen_at timestamptz not null
         )",
    )
    .execute(pool)
    .await
    .ok()?;

    sqlx::query(
        "create unique index if not exists canonical_records_key_uidx
         on canonical_records(tenant_id, entity_type, external_id)",
    )
    .execute(pool)
    .await
    .ok()?;
    Some(())
}
