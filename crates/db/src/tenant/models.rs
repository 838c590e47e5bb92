use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One connected remote store. Owns all synced data via `tenant_id`.
///
/// Tenants are never hard-deleted while data exists; `enabled = false`
/// soft-disables them instead.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tenant {
    pub id: Uuid,
    pub name: String,
    pub base_url: String,
    pub consumer_key: String,
    pub consumer_secret: String,
    pub webhook_secret: String,
    pub currency: String,
    pub timezone: String,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for onboarding a new tenant.
#[derive(Debug, Clone)]
pub struct NewTenant {
    pub name: String,
    pub base_url: String,
    pub consumer_key: String,
    pub consumer_secret: String,
    pub webhook_secret: String,
    pub currency: String,
    pub timezone: String,
}
