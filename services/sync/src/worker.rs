use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;

use storemesh_common::error::MeshResult;
use storemesh_db::entity::repositories::CanonicalEntityRepository;
use storemesh_db::jobs::models::SyncJob;
use storemesh_db::jobs::repositories::JobRepository;
use storemesh_db::sync::repositories::{CheckpointRepository, SyncRunRepository};
use storemesh_db::tenant::repositories::TenantRepository;

use crate::engine::{EngineError, RunSummary, SyncRunner};

/// Retry delays cap out at five minutes.
const MAX_BACKOFF_SECS: u64 = 300;

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub concurrency: usize,
    pub max_attempts: i32,
    pub poll_interval_secs: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            max_attempts: 5,
            poll_interval_secs: 5,
        }
    }
}

impl WorkerConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let concurrency = std::env::var("SYNC_WORKER_CONCURRENCY")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.concurrency);
        let max_attempts = std::env::var("SYNC_MAX_ATTEMPTS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.max_attempts);
        let poll_interval_secs = std::env::var("SYNC_POLL_INTERVAL_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.poll_interval_secs);
        Self {
            concurrency,
            max_attempts,
            poll_interval_secs,
        }
    }
}

/// Exponential backoff by attempt number, starting at 2s for the first retry.
pub fn retry_backoff(attempt: i32) -> Duration {
    let attempt = attempt.clamp(0, 30) as u32;
    Duration::from_secs(std::cmp::min(1u64 << attempt, MAX_BACKOFF_SECS))
}

pub fn next_attempt_at(now: DateTime<Utc>, attempt: i32) -> DateTime<Utc> {
    now + chrono::Duration::seconds(retry_backoff(attempt).as_secs() as i64)
}

/// Move a finished attempt to its next state: succeeded, retried with
/// backoff, dead after the attempt ceiling, or failed outright.
pub async fn settle<W>(
    jobs: &W,
    job: &SyncJob,
    outcome: Result<RunSummary, EngineError>,
    max_attempts: i32,
    now: DateTime<Utc>,
) -> MeshResult<()>
where
    W: JobRepository,
{
    match outcome {
        Ok(summary) => {
            tracing::info!(
                job_id = %job.id,
                run_id = %summary.run_id,
                status = %summary.status,
                "job succeeded"
            );
            jobs.mark_succeeded(job.id).await
        }
        Err(EngineError::Cancelled) => {
            jobs.mark_failed(job.id, "cancelled by operator", false).await
        }
        Err(EngineError::Permanent(message)) => {
            tracing::error!(job_id = %job.id, error = %message, "job failed permanently");
            jobs.mark_failed(job.id, &message, false).await
        }
        Err(EngineError::Transient(message)) => {
            if job.attempts >= max_attempts {
                tracing::error!(
                    job_id = %job.id,
                    attempts = job.attempts,
                    error = %message,
                    "retry ceiling exhausted, job is dead"
                );
                jobs.mark_failed(job.id, &message, true).await
            } else {
                let run_after = next_attempt_at(now, job.attempts);
                tracing::warn!(
                    job_id = %job.id,
                    attempts = job.attempts,
                    run_after = %run_after,
                    error = %message,
                    "transient failure, retry scheduled"
                );
                jobs.schedule_retry(job.id, &message, run_after).await
            }
        }
    }
}

/// Spawn `concurrency` workers, each claiming and executing jobs until the
/// shutdown signal flips.
pub fn spawn_pool<T, C, R, K, J, W>(
    runner: Arc<SyncRunner<T, C, R, K, J>>,
    jobs: W,
    config: WorkerConfig,
    shutdown: tokio::sync::watch::Receiver<bool>,
) -> Vec<JoinHandle<()>>
where
    T: TenantRepository + 'static,
    C: CanonicalEntityRepository + 'static,
    R: SyncRunRepository + 'static,
    K: CheckpointRepository + 'static,
    J: JobRepository + 'static,
    W: JobRepository + Clone + 'static,
{
    (0..config.concurrency)
        .map(|worker_id| {
            let runner = Arc::clone(&runner);
            let jobs = jobs.clone();
            let config = config.clone();
            let mut shutdown = shutdown.clone();
            tokio::spawn(async move {
                tracing::info!(worker_id, "sync worker started");
                loop {
                    if *shutdown.borrow() {
                        break;
                    }

                    let claimed = match jobs.claim_next(Utc::now()).await {
                        Ok(claimed) => claimed,
                        Err(e) => {
                            tracing::error!(worker_id, error = %e, "claim failed");
                            None
                        }
                    };

                    match claimed {
                        Some(job) => {
                            let outcome = runner.execute(&job).await;
                            if let Err(e) =
                                settle(&jobs, &job, outcome, config.max_attempts, Utc::now()).await
                            {
                                tracing::error!(job_id = %job.id, error = %e, "failed to settle job");
                            }
                        }
                        None => {
                            // Idle. Wait out the poll interval unless shutdown
                            // lands first.
                            let sleep =
                                tokio::time::sleep(Duration::from_secs(config.poll_interval_secs));
                            tokio::select! {
                                _ = sleep => {}
                                _ = shutdown.changed() => {}
                            }
                        }
                    }
                }
                tracing::info!(worker_id, "sync worker stopped");
            })
        })
        .collect()
}
