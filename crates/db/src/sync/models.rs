use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use storemesh_common::error::MeshError;
use storemesh_common::types::EntityType;
use uuid::Uuid;

/// Terminal and in-flight states of one synchronization run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Success,
    Failed,
    Partial,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Running => "running",
            RunStatus::Success => "success",
            RunStatus::Failed => "failed",
            RunStatus::Partial => "partial",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, RunStatus::Running)
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunStatus {
    type Err = MeshError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running" => Ok(RunStatus::Running),
            "success" => Ok(RunStatus::Success),
            "failed" => Ok(RunStatus::Failed),
            "partial" => Ok(RunStatus::Partial),
            other => Err(MeshError::Validation(format!("unknown run status: {other}"))),
        }
    }
}

/// One row per run attempt, the audit record the presentation layer reads.
///
/// Created when a run starts, mutated only by that run, immutable once
/// terminal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncRun {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub entity_type: EntityType,
    pub status: RunStatus,
    pub items_processed: i32,
    pub items_skipped: i32,
    pub error_message: Option<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Per (tenant, entity type) incremental watermark.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    pub tenant_id: Uuid,
    pub entity_type: EntityType,
    pub last_synced_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
