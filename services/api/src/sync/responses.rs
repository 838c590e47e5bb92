use chrono::{DateTime, Utc};
use serde::Serialize;
use storemesh_common::types::EntityType;
use storemesh_db::sync::models::SyncRun;
use uuid::Uuid;

#[derive(Debug, Serialize)]
pub struct TriggerResponse {
    pub job_id: Option<Uuid>,
    /// True when a queued or running job for the same key absorbed this
    /// trigger.
    pub deduped: bool,
}

#[derive(Debug, Serialize)]
pub struct CancelResponse {
    pub cancelled: bool,
}

#[derive(Debug, Serialize)]
pub struct RunsResponse {
    pub runs: Vec<RunView>,
}

#[derive(Debug, Serialize)]
pub struct RunView {
    pub id: Uuid,
    pub entity_type: EntityType,
    pub status: String,
    pub items_processed: i32,
    pub items_skipped: i32,
    pub error_message: Option<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl From<SyncRun> for RunView {
    fn from(run: SyncRun) -> Self {
        Self {
            id: run.id,
            entity_type: run.entity_type,
            status: run.status.as_str().to_string(),
            items_processed: run.items_processed,
            items_skipped: run.items_skipped,
            error_message: run.error_message,
            started_at: run.started_at,
            completed_at: run.completed_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub entities: Vec<EntityStatus>,
}

/// Per-entity-type sync state: the latest run, the incremental watermark and
/// the canonical row count.
#[derive(Debug, Serialize)]
pub struct EntityStatus {
    pub entity_type: EntityType,
    pub last_run: Option<RunView>,
    pub checkpoint: Option<DateTime<Utc>>,
    pub records: i64,
}
