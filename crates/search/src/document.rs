use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use storemesh_common::types::EntityType;
use storemesh_db::entity::models::{CanonicalEntity, CanonicalRecord};
use uuid::Uuid;

/// The flattened projection written to the document index. Only projected
/// fields are mirrored; the raw payload stays in the canonical store.
#[derive(Debug, Clone, Serialize)]
pub struct SearchDocument {
    pub tenant_id: Uuid,
    pub entity_type: EntityType,
    pub external_id: i64,
    pub status: Option<String>,
    pub title: Option<String>,
    pub total_amount: Option<Decimal>,
    pub currency: Option<String>,
    pub customer_email: Option<String>,
    pub rating: Option<i32>,
    pub external_updated_at: DateTime<Utc>,
}

impl SearchDocument {
    /// Document id: stable per canonical row, so re-projection overwrites
    /// instead of duplicating.
    pub fn doc_id(&self) -> String {
        format!("{}:{}", self.tenant_id, self.external_id)
    }
}

impl From<&CanonicalRecord> for SearchDocument {
    fn from(record: &CanonicalRecord) -> Self {
        Self {
            tenant_id: record.tenant_id,
            entity_type: record.entity_type,
            external_id: record.external_id,
            status: record.status.clone(),
            title: record.title.clone(),
            total_amount: record.total_amount,
            currency: record.currency.clone(),
            customer_email: record.customer_email.clone(),
            rating: record.rating,
            external_updated_at: record.external_updated_at,
        }
    }
}

impl From<&CanonicalEntity> for SearchDocument {
    fn from(entity: &CanonicalEntity) -> Self {
        Self {
            tenant_id: entity.tenant_id,
            entity_type: entity.entity_type,
            external_id: entity.external_id,
            status: entity.status.clone(),
            title: entity.title.clone(),
            total_amount: entity.total_amount,
            currency: entity.currency.clone(),
            customer_email: entity.customer_email.clone(),
            rating: entity.rating,
            external_updated_at: entity.external_updated_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use storemesh_db::entity::models::SCHEMA_VERSION;

    fn record(tenant: Uuid) -> CanonicalRecord {
        CanonicalRecord {
            tenant_id: tenant,
            entity_type: EntityType::Product,
            external_id: 42,
            status: Some("publish".to_string()),
            title: Some("Organic Honey".to_string()),
            total_amount: Some(Decimal::new(1250, 2)),
            currency: Some("EUR".to_string()),
            customer_email: None,
            rating: None,
            external_created_at: None,
            external_updated_at: Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap(),
            payload: serde_json::json!({ "id": 42 }),
            schema_version: SCHEMA_VERSION,
        }
    }

    #[test]
    fn doc_id_is_tenant_scoped() {
        let tenant = Uuid::new_v4();
        let doc = SearchDocument::from(&record(tenant));
        assert_eq!(doc.doc_id(), format!("{tenant}:42"));
    }

    #[test]
    fn document_drops_the_raw_payload() {
        let doc = SearchDocument::from(&record(Uuid::new_v4()));
        let json = serde_json::to_value(&doc).unwrap();
        assert!(json.get("payload").is_none());
        assert_eq!(json["title"], "Organic Honey");
        assert_eq!(json["entity_type"], "product");
    }
}
