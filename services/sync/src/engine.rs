use uuid::Uuid;

use storemesh_common::error::MeshError;
use storemesh_db::entity::repositories::CanonicalEntityRepository;
use storemesh_db::jobs::models::{SyncJob, SyncMode};
use storemesh_db::jobs::repositories::JobRepository;
use storemesh_db::sync::models::RunStatus;
use storemesh_db::sync::repositories::{CheckpointRepository, SyncRunRepository};
use storemesh_db::tenant::models::Tenant;
use storemesh_db::tenant::repositories::TenantRepository;
use storemesh_search::{SearchDocument, SearchProjector};

use crate::mapper::map_record;
use crate::remote::{RemoteClient, RemoteClientConfig, RemoteClientError};

/// How a job attempt failed, from the worker's point of view: transient
/// failures go back to the queue with backoff, permanent ones do not.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("{0}")]
    Transient(String),

    #[error("{0}")]
    Permanent(String),

    #[error("cancelled by operator")]
    Cancelled,
}

fn db(e: MeshError) -> EngineError {
    EngineError::Transient(e.to_string())
}

fn classify(e: RemoteClientError) -> EngineError {
    if e.is_transient() {
        EngineError::Transient(e.to_string())
    } else {
        EngineError::Permanent(e.to_string())
    }
}

#[derive(Debug, Clone)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub status: RunStatus,
    pub items_processed: i32,
    pub items_skipped: i32,
}

#[derive(Default)]
struct Tally {
    processed: i32,
    skipped: i32,
}

/// Executes one sync job end to end: fetch from the remote, map, upsert into
/// the canonical store, mirror into the search index, advance the checkpoint,
/// finalize the run row.
pub struct SyncRunner<T, C, R, K, J> {
    tenants: T,
    canonical: C,
    runs: R,
    checkpoints: K,
    jobs: J,
    projector: SearchProjector,
    client_config: RemoteClientConfig,
}

impl<T, C, R, K, J> SyncRunner<T, C, R, K, J>
where
    T: TenantRepository,
    C: CanonicalEntityRepository,
    R: SyncRunRepository,
    K: CheckpointRepository,
    J: JobRepository,
{
    pub fn new(
        tenants: T,
        canonical: C,
        runs: R,
        checkpoints: K,
        jobs: J,
        projector: SearchProjector,
        client_config: RemoteClientConfig,
    ) -> Self {
        Self {
            tenants,
            canonical,
            runs,
            checkpoints,
            jobs,
            projector,
            client_config,
        }
    }

    pub async fn execute(&self, job: &SyncJob) -> Result<RunSummary, EngineError> {
        let tenant = self
            .tenants
            .find(job.tenant_id)
            .await
            .map_err(db)?
            .ok_or_else(|| EngineError::Permanent(format!("unknown tenant {}", job.tenant_id)))?;
        if !tenant.enabled {
            return Err(EngineError::Permanent(format!(
                "tenant {} is disabled",
                tenant.id
            )));
        }

        let client = RemoteClient::for_tenant(&tenant, self.client_config.clone())
            .map_err(|e| EngineError::Permanent(e.to_string()))?;

        let run = self
            .runs
            .start(job.tenant_id, job.entity_type)
            .await
            .map_err(db)?;

        tracing::info!(
            run_id = %run.id,
            tenant_id = %job.tenant_id,
            entity_type = %job.entity_type,
            mode = %job.mode,
            "sync run started"
        );

        let mut tally = Tally::default();
        let outcome = match job.mode {
            SyncMode::SingleRecord => self.sync_single(&client, &tenant, job, &mut tally).await,
            SyncMode::Incremental | SyncMode::Full => {
                self.sync_collection(&client, job, &mut tally).await
            }
        };

        match outcome {
            Ok(()) => {
                let status = if tally.skipped > 0 {
                    RunStatus::Partial
                } else {
                    RunStatus::Success
                };
                let run = self
                    .runs
                    .finish(run.id, status, tally.processed, tally.skipped, None)
                    .await
                    .map_err(db)?;

                tracing::info!(
                    run_id = %run.id,
                    status = %status,
                    processed = tally.processed,
                    skipped = tally.skipped,
                    "sync run completed"
                );

                Ok(RunSummary {
                    run_id: run.id,
                    status,
                    items_processed: tally.processed,
                    items_skipped: tally.skipped,
                })
            }
            Err(e) => {
                let message = e.to_string();
                tracing::error!(run_id = %run.id, error = %message, "sync run failed");
                if let Err(finish_err) = self
                    .runs
                    .finish(
                        run.id,
                        RunStatus::Failed,
                        tally.processed,
                        tally.skipped,
                        Some(&message),
                    )
                    .await
                {
                    tracing::error!(run_id = %run.id, error = %finish_err, "failed to finalize run");
                }
                Err(e)
            }
        }
    }

    async fn sync_collection(
        &self,
        client: &RemoteClient,
        job: &SyncJob,
        tally: &mut Tally,
    ) -> Result<(), EngineError> {
        let modified_after = match job.mode {
            SyncMode::Incremental => self
                .checkpoints
                .get(job.tenant_id, job.entity_type)
                .await
                .map_err(db)?
                .map(|c| c.last_synced_at),
            _ => None,
        };

        let mut page = 1u32;
        loop {
            // Cancellation is polled between pages, never mid-page, so a
            // cancelled run leaves whole pages applied or not at all.
            if self.jobs.cancel_requested(job.id).await.map_err(db)? {
                return Err(EngineError::Cancelled);
            }

            let remote_page = client
                .fetch_page(job.entity_type, page, modified_after)
                .await
                .map_err(classify)?;

            let mut mapped = Vec::with_capacity(remote_page.records.len());
            for raw in &remote_page.records {
                match map_record(job.tenant_id, job.entity_type, raw) {
                    Ok(record) => mapped.push(record),
                    Err(e) => {
                        tracing::warn!(
                            tenant_id = %job.tenant_id,
                            entity_type = %job.entity_type,
                            error = %e,
                            "skipping unmappable record"
                        );
                        tally.skipped += 1;
                    }
                }
            }

            let upserted = self.canonical.upsert_batch(&mapped).await.map_err(db)?;
            tally.processed += upserted.applied() as i32;
            tally.skipped += upserted.failed as i32;

            // Index lag is never fatal; the rebuild endpoint reconciles it.
            let docs: Vec<SearchDocument> = mapped.iter().map(SearchDocument::from).collect();
            match self.projector.project(job.entity_type, &docs).await {
                Ok(result) => tally.skipped += result.failed as i32,
                Err(e) => {
                    tracing::warn!(error = %e, "search projection failed for page");
                    tally.skipped += docs.len() as i32;
                }
            }

            // Per-page advancement: a crash mid-run resumes from the last
            // fully applied page instead of refetching everything. The cursor
            // stays below the oldest record that failed to persist, so the
            // next incremental run fetches it again.
            let watermark = mapped
                .iter()
                .map(|r| r.external_updated_at)
                .filter(|ts| upserted.earliest_failed_at.map_or(true, |failed| *ts < failed))
                .max();
            if let Some(watermark) = watermark {
                self.checkpoints
                    .advance(job.tenant_id, job.entity_type, watermark)
                    .await
                    .map_err(db)?;
            }

            if !remote_page.has_more {
                return Ok(());
            }
            page += 1;
        }
    }

    async fn sync_single(
        &self,
        client: &RemoteClient,
        tenant: &Tenant,
        job: &SyncJob,
        tally: &mut Tally,
    ) -> Result<(), EngineError> {
        let external_id = job.external_id.ok_or_else(|| {
            EngineError::Permanent("single_record job without an external id".to_string())
        })?;

        match client
            .fetch_one(job.entity_type, external_id)
            .await
            .map_err(classify)?
        {
            Some(raw) => {
                let record = map_record(job.tenant_id, job.entity_type, &raw)
                    .map_err(|e| EngineError::Permanent(e.to_string()))?;
                self.canonical.upsert(&record).await.map_err(db)?;
                tally.processed += 1;

                let doc = SearchDocument::from(&record);
                if let Err(e) = self
                    .projector
                    .project(job.entity_type, std::slice::from_ref(&doc))
                    .await
                {
                    tracing::warn!(error = %e, "search projection failed for record");
                    tally.skipped += 1;
                }
            }
            None => {
                // Gone on the remote side. Soft-delete locally and push the
                // tombstoned document so the index agrees.
                self.canonical
                    .mark_deleted(job.tenant_id, job.entity_type, external_id)
                    .await
                    .map_err(db)?;
                tally.processed += 1;

                if let Some(entity) = self
                    .canonical
                    .find(job.tenant_id, job.entity_type, external_id)
                    .await
                    .map_err(db)?
                {
                    let doc = SearchDocument::from(&entity);
                    if let Err(e) = self
                        .projector
                        .project(job.entity_type, std::slice::from_ref(&doc))
                        .await
                    {
                        tracing::warn!(error = %e, "search projection failed for tombstone");
                        tally.skipped += 1;
                    }
                }

                tracing::info!(
                    tenant_id = %tenant.id,
                    entity_type = %job.entity_type,
                    external_id,
                    "remote record gone, marked deleted"
                );
            }
        }

        Ok(())
    }
}
