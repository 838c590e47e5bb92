use chrono::{DateTime, NaiveDateTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use storemesh_common::types::EntityType;
use storemesh_db::entity::models::{CanonicalRecord, SCHEMA_VERSION};

#[derive(Debug, thiserror::Error)]
pub enum MapError {
    #[error("missing required field: {0}")]
    MissingField(&'static str),

    #[error("invalid field {field}: {reason}")]
    InvalidField { field: &'static str, reason: String },
}

/// Map one raw remote record into its canonical form.
///
/// Pure and deterministic: no I/O, no clock reads. A record that cannot be
/// mapped is a data error the caller counts as skipped; it must never abort
/// the surrounding batch.
///
/// The full remote payload is preserved verbatim so projection changes can be
/// replayed without refetching.
pub fn map_record(
    tenant_id: Uuid,
    entity_type: EntityType,
    raw: &serde_json::Value,
) -> Result<CanonicalRecord, MapError> {
    let external_id = raw["id"].as_i64().ok_or(MapError::MissingField("id"))?;

    let external_created_at = opt_timestamp(raw, "date_created_gmt")?;
    // Reviews carry no modification time; creation time stands in for it.
    let external_updated_at = match opt_timestamp(raw, "date_modified_gmt")? {
        Some(ts) => ts,
        None => external_created_at.ok_or(MapError::MissingField("date_modified_gmt"))?,
    };

    let mut record = CanonicalRecord {
        tenant_id,
        entity_type,
        external_id,
        status: opt_string(raw, "status"),
        title: None,
        total_amount: None,
        currency: None,
        customer_email: None,
        rating: None,
        external_created_at,
        external_updated_at,
        payload: raw.clone(),
        schema_version: SCHEMA_VERSION,
    };

    match entity_type {
        EntityType::Product => {
            record.title = opt_string(raw, "name");
            record.total_amount = opt_money(raw, "price")?;
        }
        EntityType::Order => {
            record.title = opt_string(raw, "number").map(|n| format!("Order #{n}"));
            record.total_amount = opt_money(raw, "total")?;
            record.currency = opt_string(raw, "currency");
            record.customer_email = raw["billing"]["email"].as_str().map(str::to_string);
        }
        EntityType::Customer => {
            record.title = full_name(raw);
            record.customer_email = opt_string(raw, "email");
        }
        EntityType::Review => {
            record.title = opt_string(raw, "reviewer");
            record.customer_email = opt_string(raw, "reviewer_email");
            record.rating = match raw.get("rating") {
                None | Some(serde_json::Value::Null) => None,
                Some(v) => Some(v.as_i64().and_then(|r| i32::try_from(r).ok()).ok_or_else(
                    || MapError::InvalidField {
                        field: "rating",
                        reason: format!("not an integer: {v}"),
                    },
                )?),
            };
        }
    }

    Ok(record)
}

fn opt_string(raw: &serde_json::Value, field: &str) -> Option<String> {
    raw[field].as_str().filter(|s| !s.is_empty()).map(str::to_string)
}

fn full_name(raw: &serde_json::Value) -> Option<String> {
    let first = raw["first_name"].as_str().unwrap_or("");
    let last = raw["last_name"].as_str().unwrap_or("");
    let name = format!("{first} {last}").trim().to_string();
    (!name.is_empty()).then_some(name)
}

/// Money comes over the wire as a decimal string ("19.99"). An empty string
/// means unset, not zero.
fn opt_money(
    raw: &serde_json::Value,
    field: &'static str,
) -> Result<Option<Decimal>, MapError> {
    match raw.get(field) {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(serde_json::Value::String(s)) if s.is_empty() => Ok(None),
        Some(serde_json::Value::String(s)) => {
            s.parse::<Decimal>()
                .map(Some)
                .map_err(|e| MapError::InvalidField {
                    field,
                    reason: e.to_string(),
                })
        }
        Some(other) => Err(MapError::InvalidField {
            field,
            reason: format!("expected decimal string, got: {other}"),
        }),
    }
}

/// Remote GMT timestamps lack an offset ("2026-01-15T10:00:00"); RFC 3339 is
/// accepted too.
fn opt_timestamp(
    raw: &serde_json::Value,
    field: &'static str,
) -> Result<Option<DateTime<Utc>>, MapError> {
    let Some(s) = raw[field].as_str().filter(|s| !s.is_empty()) else {
        return Ok(None);
    };

    if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S") {
        return Ok(Some(naive.and_utc()));
    }
    DateTime::parse_from_rfc3339(s)
        .map(|dt| Some(dt.with_timezone(&Utc)))
        .map_err(|e| MapError::InvalidField {
            field,
            reason: e.to_string(),
        })
}
