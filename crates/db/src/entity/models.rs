use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use storemesh_common::types::EntityType;
use uuid::Uuid;

/// Version stamp written next to every preserved payload. Bumped when the
/// projected column set changes, so old payloads can be re-projected.
pub const SCHEMA_VERSION: i32 = 1;

/// A mapped remote record ready to be upserted.
///
/// The projection (`status`, `total_amount`, ...) backs queries; the verbatim
/// remote representation rides along in `payload` for forward compatibility.
/// All four entity types share this shape; fields that do not apply to a
/// given type are simply `None`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CanonicalRecord {
    pub tenant_id: Uuid,
    pub entity_type: EntityType,
    pub external_id: i64,
    pub status: Option<String>,
    pub title: Option<String>,
    pub total_amount: Option<Decimal>,
    pub currency: Option<String>,
    pub customer_email: Option<String>,
    pub rating: Option<i32>,
    pub external_created_at: Option<DateTime<Utc>>,
    /// Remote-side modification time; drives incremental cursors and the
    /// stale-upsert guard.
    pub external_updated_at: DateTime<Utc>,
    pub payload: serde_json::Value,
    pub schema_version: i32,
}

/// A stored canonical row, as read back from the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CanonicalEntity {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub entity_type: EntityType,
    pub external_id: i64,
    pub status: Option<String>,
    pub title: Option<String>,
    pub total_amount: Option<Decimal>,
    pub currency: Option<String>,
    pub customer_email: Option<String>,
    pub rating: Option<i32>,
    pub external_created_at: Option<DateTime<Utc>>,
    pub external_updated_at: DateTime<Utc>,
    pub payload: serde_json::Value,
    pub schema_version: i32,
    pub synced_at: DateTime<Utc>,
    pub first_seen_at: DateTime<Utc>,
}

/// What a single upsert did to the stored row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Updated,
    /// Incoming `external_updated_at` was not newer; projected fields were
    /// left alone but `synced_at` was refreshed.
    Unchanged,
}

/// Aggregate outcome of one batch upsert.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct UpsertResult {
    pub inserted: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub failed: usize,
    /// Oldest `external_updated_at` among records that failed to persist.
    /// The incremental cursor must stay below it so those records are
    /// fetched again.
    pub earliest_failed_at: Option<DateTime<Utc>>,
}

impl UpsertResult {
    pub fn record(&mut self, outcome: UpsertOutcome) {
        match outcome {
            UpsertOutcome::Inserted => self.inserted += 1,
            UpsertOutcome::Updated => self.updated += 1,
            UpsertOutcome::Unchanged => self.unchanged += 1,
        }
    }

    pub fn record_failure(&mut self, external_updated_at: DateTime<Utc>) {
        self.failed += 1;
        self.earliest_failed_at = Some(match self.earliest_failed_at {
            Some(cur) => cur.min(external_updated_at),
            None => external_updated_at,
        });
    }

    pub fn applied(&self) -> usize {
        self.inserted + self.updated + self.unchanged
    }
}

/// Keyset cursor for replaying the store in stable order (index rebuilds).
#[derive(Debug, Clone, Copy)]
pub struct ReplayCursor {
    pub tenant_id: Uuid,
    pub external_id: i64,
}

impl CanonicalEntity {
    pub fn replay_cursor(&self) -> ReplayCursor {
        ReplayCursor {
            tenant_id: self.tenant_id,
            external_id: self.external_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn upsert_result_accumulates_outcomes() {
        let mut result = UpsertResult::default();
        result.record(UpsertOutcome::Inserted);
        result.record(UpsertOutcome::Inserted);
        result.record(UpsertOutcome::Updated);
        result.record(UpsertOutcome::Unchanged);

        assert_eq!(result.inserted, 2);
        assert_eq!(result.updated, 1);
        assert_eq!(result.unchanged, 1);
        assert_eq!(result.failed, 0);
        assert_eq!(result.applied(), 4);
    }

    #[test]
    fn failures_keep_the_oldest_timestamp() {
        let older = Utc.with_ymd_and_hms(2026, 1, 5, 0, 0, 0).unwrap();
        let newer = Utc.with_ymd_and_hms(2026, 1, 9, 0, 0, 0).unwrap();

        let mut result = UpsertResult::default();
        assert!(result.earliest_failed_at.is_none());

        result.record_failure(newer);
        result.record_failure(older);
        result.record_failure(newer);

        assert_eq!(result.failed, 3);
        assert_eq!(result.earliest_failed_at, Some(older));
    }
}
