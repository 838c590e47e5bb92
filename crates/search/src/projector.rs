use chrono::Utc;
use reqwest::{Client, StatusCode};
use std::time::Duration;

use storemesh_common::error::MeshError;
use storemesh_common::types::EntityType;
use storemesh_db::entity::repositories::CanonicalEntityRepository;

use crate::document::SearchDocument;

const REPLAY_PAGE_SIZE: i64 = 500;

#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    #[error("HTTP {status}: {body}")]
    Http { status: StatusCode, body: String },

    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("canonical store read failed: {0}")]
    Store(#[from] MeshError),

    #[error("document serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Outcome of one bulk projection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProjectResult {
    pub indexed: usize,
    pub failed: usize,
}

/// Outcome of a full index rebuild.
#[derive(Debug, Clone)]
pub struct RebuildReport {
    pub index: String,
    pub indexed: usize,
    pub failed: usize,
}

/// One-way mirror of the canonical store into a document index
/// (Elasticsearch-compatible bulk API). Never the source of truth; always
/// rebuildable from scratch.
#[derive(Clone)]
pub struct SearchProjector {
    client: Client,
    base_url: String,
}

/// Read alias the projector writes through; rebuilds swap it to a fresh
/// physical index.
pub fn write_alias(entity_type: EntityType) -> String {
    format!("storemesh-{}", entity_type.as_str())
}

impl SearchProjector {
    pub fn new(base_url: &str, timeout_secs: u64) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Mirror a batch of documents into the per-type alias. Item-level
    /// failures are counted, not fatal; the index is rebuildable.
    pub async fn project(
        &self,
        entity_type: EntityType,
        docs: &[SearchDocument],
    ) -> Result<ProjectResult, SearchError> {
        self.bulk(&write_alias(entity_type), docs).await
    }

    /// Drop-and-replace rebuild: fresh physical index with explicit mappings,
    /// full replay of the canonical store for all tenants, then an alias
    /// swap. Safe to run online; readers stay on the old index until the
    /// swap.
    pub async fn rebuild_index<R>(
        &self,
        entity_type: EntityType,
        repo: &R,
    ) -> Result<RebuildReport, SearchError>
    where
        R: CanonicalEntityRepository,
    {
        let alias = write_alias(entity_type);
        let physical = format!("{alias}-{}", Utc::now().timestamp());

        self.create_index(&physical).await?;

        let mut indexed = 0;
        let mut failed = 0;
        let mut cursor = None;
        loop {
            let page = repo
                .list_page(entity_type, cursor, REPLAY_PAGE_SIZE)
                .await?;
            if page.is_empty() {
                break;
            }
            cursor = page.last().map(|e| e.replay_cursor());

            let docs: Vec<SearchDocument> = page.iter().map(SearchDocument::from).collect();
            let result = self.bulk(&physical, &docs).await?;
            indexed += result.indexed;
            failed += result.failed;
        }

        let old_indices = self.resolve_alias(&alias).await?;
        self.swap_alias(&alias, &physical, &old_indices).await?;

        // Old physical indices are cleanup, not correctness.
        for old in &old_indices {
            if let Err(e) = self.delete_index(old).await {
                tracing::warn!(index = %old, error = %e, "failed to delete old index");
            }
        }

        tracing::info!(
            entity_type = %entity_type,
            index = %physical,
            indexed,
            failed,
            "index rebuild completed"
        );

        Ok(RebuildReport {
            index: physical,
            indexed,
            failed,
        })
    }

    async fn bulk(&self, index: &str, docs: &[SearchDocument]) -> Result<ProjectResult, SearchError> {
        if docs.is_empty() {
            return Ok(ProjectResult::default());
        }

        let mut body = String::new();
        for doc in docs {
            let action = serde_json::json!({
                "index": { "_index": index, "_id": doc.doc_id() }
            });
            body.push_str(&action.to_string());
            body.push('\n');
            body.push_str(&serde_json::to_string(doc)?);
            body.push('\n');
        }

        let response = self
            .client
            .post(format!("{}/_bulk", self.base_url))
            .header("content-type", "application/x-ndjson")
            .body(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SearchError::Http { status, body });
        }

        let parsed: serde_json::Value = response.json().await?;
        let mut failed = 0;
        if parsed["errors"].as_bool() == Some(true) {
            if let Some(items) = parsed["items"].as_array() {
                for item in items {
                    let item_status = item["index"]["status"].as_u64().unwrap_or(0);
                    if item_status >= 300 {
                        failed += 1;
                    }
                }
            }
        }

        Ok(ProjectResult {
            indexed: docs.len() - failed,
            failed,
        })
    }

    async fn create_index(&self, index: &str) -> Result<(), SearchError> {
        let mappings = serde_json::json!({
            "mappings": {
                "properties": {
                    "tenant_id": { "type": "keyword" },
                    "entity_type": { "type": "keyword" },
                    "external_id": { "type": "long" },
                    "status": { "type": "keyword" },
                    "title": { "type": "text" },
                    "total_amount": { "type": "keyword" },
                    "currency": { "type": "keyword" },
                    "customer_email": { "type": "keyword" },
                    "rating": { "type": "integer" },
                    "external_updated_at": { "type": "date" }
                }
            }
        });

        let response = self
            .client
            .put(format!("{}/{index}", self.base_url))
            .json(&mappings)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SearchError::Http { status, body });
        }
        Ok(())
    }

    /// Physical indices currently behind the alias; empty when the alias does
    /// not exist yet (first rebuild).
    async fn resolve_alias(&self, alias: &str) -> Result<Vec<String>, SearchError> {
        let response = self
            .client
            .get(format!("{}/_alias/{alias}", self.base_url))
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(Vec::new());
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SearchError::Http { status, body });
        }

        let parsed: serde_json::Value = response.json().await?;
        Ok(parsed
            .as_object()
            .map(|o| o.keys().cloned().collect())
            .unwrap_or_default())
    }

    async fn swap_alias(
        &self,
        alias: &str,
        new_index: &str,
        old_indices: &[String],
    ) -> Result<(), SearchError> {
        let mut actions: Vec<serde_json::Value> = old_indices
            .iter()
            .map(|old| serde_json::json!({ "remove": { "index": old, "alias": alias } }))
            .collect();
        actions.push(serde_json::json!({ "add": { "index": new_index, "alias": alias } }));

        let response = self
            .client
            .post(format!("{}/_aliases", self.base_url))
            .json(&serde_json::json!({ "actions": actions }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SearchError::Http { status, body });
        }
        Ok(())
    }

    async fn delete_index(&self, index: &str) -> Result<(), SearchError> {
        let response = self
            .client
            .delete(format!("{}/{index}", self.base_url))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SearchError::Http { status, body });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use storemesh_common::error::MeshResult;
    use storemesh_db::entity::models::{
        CanonicalEntity, CanonicalRecord, ReplayCursor, UpsertOutcome, UpsertResult,
        SCHEMA_VERSION,
    };
    use uuid::Uuid;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn entity(tenant: Uuid, external_id: i64) -> CanonicalEntity {
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap();
        CanonicalEntity {
            id: Uuid::new_v4(),
            tenant_id: tenant,
            entity_type: EntityType::Product,
            external_id,
            status: Some("publish".to_string()),
            title: Some(format!("Product {external_id}")),
            total_amount: None,
            currency: None,
            customer_email: None,
            rating: None,
            external_created_at: None,
            external_updated_at: now,
            payload: serde_json::json!({ "id": external_id }),
            schema_version: SCHEMA_VERSION,
            synced_at: now,
            first_seen_at: now,
        }
    }

    fn doc(tenant: Uuid, external_id: i64) -> SearchDocument {
        SearchDocument::from(&entity(tenant, external_id))
    }

    /// In-memory canonical store, enough for replaying rebuilds.
    struct FakeStore {
        entities: Vec<CanonicalEntity>,
    }

    #[async_trait]
    impl CanonicalEntityRepository for FakeStore {
        async fn upsert(&self, _: &CanonicalRecord) -> MeshResult<UpsertOutcome> {
            unreachable!("not used by rebuild")
        }
        async fn upsert_batch(&self, _: &[CanonicalRecord]) -> MeshResult<UpsertResult> {
            unreachable!("not used by rebuild")
        }
        async fn mark_deleted(&self, _: Uuid, _: EntityType, _: i64) -> MeshResult<bool> {
            unreachable!("not used by rebuild")
        }
        async fn find(
            &self,
            _: Uuid,
            _: EntityType,
            _: i64,
        ) -> MeshResult<Option<CanonicalEntity>> {
            unreachable!("not used by rebuild")
        }
        async fn list_page(
            &self,
            entity_type: EntityType,
            after: Option<ReplayCursor>,
            limit: i64,
        ) -> MeshResult<Vec<CanonicalEntity>> {
            let mut matching: Vec<&CanonicalEntity> = self
                .entities
                .iter()
                .filter(|e| e.entity_type == entity_type)
                .collect();
            matching.sort_by_key(|e| (e.tenant_id, e.external_id));

            let filtered: Vec<CanonicalEntity> = matching
                .into_iter()
                .filter(|e| match after {
                    Some(c) => (e.tenant_id, e.external_id) > (c.tenant_id, c.external_id),
                    None => true,
                })
                .take(limit as usize)
                .cloned()
                .collect();
            Ok(filtered)
        }
        async fn count(&self, _: Uuid, _: EntityType) -> MeshResult<i64> {
            Ok(self.entities.len() as i64)
        }
    }

    fn bulk_ok(items: usize) -> serde_json::Value {
        let items: Vec<serde_json::Value> = (0..items)
            .map(|_| serde_json::json!({ "index": { "status": 201 } }))
            .collect();
        serde_json::json!({ "errors": false, "items": items })
    }

    #[tokio::test]
    async fn project_bulk_indexes_into_alias() {
        let server = MockServer::start().await;
        let tenant = Uuid::new_v4();

        Mock::given(method("POST"))
            .and(path("/_bulk"))
            .and(body_string_contains("storemesh-product"))
            .and(body_string_contains(format!("{tenant}:1")))
            .respond_with(ResponseTemplate::new(200).set_body_json(bulk_ok(2)))
            .expect(1)
            .mount(&server)
            .await;

        let projector = SearchProjector::new(&server.uri(), 5).unwrap();
        let result = projector
            .project(EntityType::Product, &[doc(tenant, 1), doc(tenant, 2)])
            .await
            .unwrap();

        assert_eq!(result.indexed, 2);
        assert_eq!(result.failed, 0);
    }

    #[tokio::test]
    async fn project_empty_batch_skips_the_request() {
        let server = MockServer::start().await;
        // No mock mounted: any request would 404 and fail the test.
        let projector = SearchProjector::new(&server.uri(), 5).unwrap();
        let result = projector.project(EntityType::Product, &[]).await.unwrap();
        assert_eq!(result, ProjectResult::default());
    }

    #[tokio::test]
    async fn project_counts_item_level_failures() {
        let server = MockServer::start().await;

        let body = serde_json::json!({
            "errors": true,
            "items": [
                { "index": { "status": 201 } },
                { "index": { "status": 400, "error": { "type": "mapper_parsing_exception" } } }
            ]
        });
        Mock::given(method("POST"))
            .and(path("/_bulk"))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(&server)
            .await;

        let projector = SearchProjector::new(&server.uri(), 5).unwrap();
        let tenant = Uuid::new_v4();
        let result = projector
            .project(EntityType::Product, &[doc(tenant, 1), doc(tenant, 2)])
            .await
            .unwrap();

        assert_eq!(result.indexed, 1);
        assert_eq!(result.failed, 1);
    }

    #[tokio::test]
    async fn project_surfaces_http_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/_bulk"))
            .respond_with(ResponseTemplate::new(503).set_body_string("unavailable"))
            .mount(&server)
            .await;

        let projector = SearchProjector::new(&server.uri(), 5).unwrap();
        let err = projector
            .project(EntityType::Product, &[doc(Uuid::new_v4(), 1)])
            .await
            .unwrap_err();
        assert!(matches!(err, SearchError::Http { .. }));
    }

    #[tokio::test]
    async fn rebuild_creates_replays_and_swaps() {
        let server = MockServer::start().await;
        let tenant = Uuid::new_v4();

        // Fresh physical index.
        Mock::given(method("PUT"))
            .and(body_string_contains("mappings"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
            .expect(1)
            .mount(&server)
            .await;

        // Replay bulk.
        Mock::given(method("POST"))
            .and(path("/_bulk"))
            .respond_with(ResponseTemplate::new(200).set_body_json(bulk_ok(3)))
            .expect(1)
            .mount(&server)
            .await;

        // No alias yet (first rebuild).
        Mock::given(method("GET"))
            .and(path("/_alias/storemesh-product"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;

        // Alias swap.
        Mock::given(method("POST"))
            .and(path("/_aliases"))
            .and(body_string_contains("storemesh-product"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
            .expect(1)
            .mount(&server)
            .await;

        let store = FakeStore {
            entities: vec![entity(tenant, 1), entity(tenant, 2), entity(tenant, 3)],
        };
        let projector = SearchProjector::new(&server.uri(), 5).unwrap();
        let report = projector
            .rebuild_index(EntityType::Product, &store)
            .await
            .unwrap();

        assert_eq!(report.indexed, 3);
        assert_eq!(report.failed, 0);
        assert!(report.index.starts_with("storemesh-product-"));
    }

    #[tokio::test]
    async fn rebuild_removes_previous_indices_from_alias() {
        let server = MockServer::start().await;

        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/_alias/storemesh-product"))
            .respond_with(ResponseTemplate::new(200).set_body_json(
                serde_json::json!({ "storemesh-product-100": { "aliases": {} } }),
            ))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/_aliases"))
            .and(body_string_contains("remove"))
            .and(body_string_contains("storemesh-product-100"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
            .expect(1)
            .mount(&server)
            .await;
        // Old index cleanup.
        Mock::given(method("DELETE"))
            .and(path("/storemesh-product-100"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
            .expect(1)
            .mount(&server)
            .await;

        let store = FakeStore { entities: vec![] };
        let projector = SearchProjector::new(&server.uri(), 5).unwrap();
        let report = projector
            .rebuild_index(EntityType::Product, &store)
            .await
            .unwrap();
        assert_eq!(report.indexed, 0);
    }

    #[test]
    fn write_alias_is_per_type() {
        assert_eq!(write_alias(EntityType::Product), "storemesh-product");
        assert_eq!(write_alias(EntityType::Review), "storemesh-review");
    }
}
