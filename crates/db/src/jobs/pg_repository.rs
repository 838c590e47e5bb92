use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::jobs::models::{EnqueueOutcome, JobStatus, NewSyncJob, SyncJob, SyncMode};
use crate::jobs::repositories::JobRepository;
use storemesh_common::error::{MeshError, MeshResult};
use storemesh_common::types::EntityType;

const JOB_COLUMNS: &str =
    "id, tenant_id, entity_type, mode, external_id, status, attempts, run_after, \
     cancel_requested, last_error, started_at, finished_at, created_at, updated_at";

#[derive(Clone)]
pub struct PgJobRepository {
    pool: PgPool,
}

impl PgJobRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn map_row(row: sqlx::postgres::PgRow) -> MeshResult<SyncJob> {
        let entity_type: String = row.get("entity_type");
        let mode: String = row.get("mode");
        let status: String = row.get("status");
        Ok(SyncJob {
            id: row.get("id"),
            tenant_id: row.get("tenant_id"),
            entity_type: entity_type
                .parse::<EntityType>()
                .map_err(|e| MeshError::Database(e.to_string()))?,
            mode: mode
                .parse::<SyncMode>()
                .map_err(|e| MeshError::Database(e.to_string()))?,
            external_id: row.get("external_id"),
            status: status
                .parse::<JobStatus>()
                .map_err(|e| MeshError::Database(e.to_string()))?,
            attempts: row.get("attempts"),
            run_after: row.get("run_after"),
            cancel_requested: row.get("cancel_requested"),
            last_error: row.get("last_error"),
            started_at: row.get("started_at"),
            finished_at: row.get("finished_at"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        })
    }
}

#[async_trait]
impl JobRepository for PgJobRepository {
    async fn enqueue(&self, job: NewSyncJob) -> MeshResult<EnqueueOutcome> {
        // Dedup rests on the partial unique index over active jobs: the
        // second of two racing inserts for the same key hits the conflict
        // arbiter and comes back as Deduped.
        let row = sqlx::query(&format!(
            "insert into sync_jobs (id, tenant_id, entity_type, mode, external_id, status, run_after)
             values ($1, $2, $3, $4, $5, 'queued', $6)
             on conflict (tenant_id, entity_type) where status in ('queued', 'running')
             do nothing
             returning {JOB_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(job.tenant_id)
        .bind(job.entity_type.as_str())
        .bind(job.mode.as_str())
        .bind(job.external_id)
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| MeshError::Database(e.to_string()))?;

        match row {
            Some(r) => Ok(EnqueueOutcome::Accepted(Self::map_row(r)?)),
            None => Ok(EnqueueOutcome::Deduped),
        }
    }

    async fn claim_next(&self, now: DateTime<Utc>) -> MeshResult<Option<SyncJob>> {
        let row = sqlx::query(&format!(
            "update sync_jobs
             set status = 'running', attempts = attempts + 1, started_at = $1, updated_at = $1
             where id = (
               select id from sync_jobs
               where status = 'queued' and run_after <= $1
               order by run_after
               limit 1
               for update skip locked
             )
             returning {JOB_COLUMNS}"
        ))
        .bind(now)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| MeshError::Database(e.to_string()))?;

        match row {
            Some(r) => Ok(Some(Self::map_row(r)?)),
            None => Ok(None),
        }
    }

    async fn schedule_retry(
        &self,
        id: Uuid,
        error: &str,
        run_after: DateTime<Utc>,
    ) -> MeshResult<()> {
        sqlx::query(
            "update sync_jobs
             set status = 'queued', last_error = $1, run_after = $2, updated_at = $3
             where id = $4",
        )
        .bind(error)
        .bind(run_after)
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| MeshError::Database(e.to_string()))?;
        Ok(())
    }

    async fn mark_succeeded(&self, id: Uuid) -> MeshResult<()> {
        let now = Utc::now();
        sqlx::query(
            "update sync_jobs
             set status = 'succeeded', finished_at = $1, updated_at = $1
             where id = $2",
        )
        .bind(now)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| MeshError::Database(e.to_string()))?;
        Ok(())
    }

    async fn mark_failed(&self, id: Uuid, error: &str, dead: bool) -> MeshResult<()> {
        let status = if dead { "dead" } else { "failed" };
        let now = Utc::now();
        sqlx::query(
            "update sync_jobs
             set status = $1, last_error = $2, finished_at = $3, updated_at = $3
             where id = $4",
        )
        .bind(status)
        .bind(error)
        .bind(now)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| MeshError::Database(e.to_string()))?;
        Ok(())
    }

    async fn request_cancel(&self, tenant_id: Uuid, entity_type: EntityType) -> MeshResult<bool> {
        let done = sqlx::query(
            "update sync_jobs
             set cancel_requested = true, updated_at = $1
             where tenant_id = $2 and entity_type = $3 and status in ('queued', 'running')",
        )
        .bind(Utc::now())
        .bind(tenant_id)
        .bind(entity_type.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| MeshError::Database(e.to_string()))?;

        Ok(done.rows_affected() > 0)
    }

    async fn cancel_requested(&self, id: Uuid) -> MeshResult<bool> {
        let row = sqlx::query("select cancel_requested from sync_jobs where id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| MeshError::Database(e.to_string()))?;

        Ok(row.map(|r| r.get("cancel_requested")).unwrap_or(false))
    }

    async fn find(&self, id: Uuid) -> MeshResult<Option<SyncJob>> {
        let row = sqlx::query(&format!("select {JOB_COLUMNS} from sync_jobs where id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| MeshError::Database(e.to_string()))?;

        match row {
            Some(r) => Ok(Some(Self::map_row(r)?)),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
pub(crate) async fn ensure_schema(pool: &PgPool) -> Option<()> {
    sqlx::query(
        "create table if not exists sync_jobs (
           id uuid primary key,
           tenant_id uuid not null,
           entity_type text not null,
           mode text not null,
           external_id bigint,
           status text not null default 'queued',
           attempts integer not null default 0,
           run_after timestamptz not null default now(),
           cancel_requested boolean not null default false,
           last_error text,
           started_at timestamptz,
           finished_at timestamptz,
           created_at timestamptz not null default now(),
           updated_at timestamptz not null default now()
         )",
    )
    .execute(pool)
    .await
    .ok()?;
    sqlx::query(
        "create unique index if not exists sync_jobs_active_key
         on sync_jobs (tenant_id, entity_type)
         where status in ('queued', 'running')",
    )
    .execute(pool)
    .await
    .ok()?;
    Some(())
}
