use serde::Deserialize;
use storemesh_common::types::EntityType;
use storemesh_db::jobs::models::SyncMode;

#[derive(Debug, Deserialize)]
pub struct TriggerRequest {
    pub entity_type: EntityType,
    /// Defaults to incremental.
    pub mode: Option<SyncMode>,
    /// Required when `mode` is `single_record`.
    pub external_id: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct CancelRequest {
    pub entity_type: EntityType,
}

#[derive(Debug, Deserialize)]
pub struct RunsQuery {
    pub entity_type: Option<EntityType>,
    pub limit: Option<i64>,
}
