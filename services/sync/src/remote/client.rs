use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::{Client, Response, StatusCode};

use storemesh_common::types::EntityType;
use storemesh_db::tenant::models::Tenant;

/// The remote caps `per_page` at 100; anything above it is quietly truncated
/// server-side, so we clamp client-side to keep pagination honest.
const MAX_PAGE_SIZE: u32 = 100;

#[derive(Debug, Clone)]
pub struct RemoteClientConfig {
    pub page_size: u32,
    pub max_retries: u32,
    pub timeout_secs: u64,
}

impl Default for RemoteClientConfig {
    fn default() -> Self {
        Self {
            page_size: 100,
            max_retries: 3,
            timeout_secs: 30,
        }
    }
}

impl RemoteClientConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let page_size = std::env::var("REMOTE_PAGE_SIZE")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.page_size);
        let max_retries = std::env::var("REMOTE_MAX_RETRIES")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.max_retries);
        let timeout_secs = std::env::var("REMOTE_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.timeout_secs);
        Self {
            page_size,
            max_retries,
            timeout_secs,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RemoteClientError {
    #[error("HTTP {status}: {body}")]
    HttpError { status: StatusCode, body: String },

    #[error("request failed: {0}")]
    RequestError(#[from] reqwest::Error),

    #[error("malformed response body: {0}")]
    Decode(reqwest::Error),

    #[error("max retries exceeded after {attempts} attempts: {last_error}")]
    MaxRetriesExceeded { attempts: u32, last_error: String },
}

impl RemoteClientError {
    /// Whether the failure is worth a job-level retry. Non-429 4xx responses
    /// mean the request itself is wrong (bad credentials, bad path) and will
    /// not fix themselves; a body that fails to decode will come back just as
    /// broken on the next attempt.
    pub fn is_transient(&self) -> bool {
        match self {
            RemoteClientError::HttpError { status, .. } => status.is_server_error(),
            RemoteClientError::RequestError(_) => true,
            RemoteClientError::Decode(_) => false,
            RemoteClientError::MaxRetriesExceeded { .. } => true,
        }
    }
}

/// One page of raw remote records.
#[derive(Debug)]
pub struct RemotePage {
    pub records: Vec<serde_json::Value>,
    pub has_more: bool,
}

/// Per-tenant read client for the store's REST API (WooCommerce-compatible:
/// basic auth with consumer key/secret, `X-WP-TotalPages` pagination).
///
/// Records come back as raw JSON; interpreting them is the mapper's job, so
/// one remote schema change cannot strand a whole page in a decode error.
#[derive(Clone)]
pub struct RemoteClient {
    client: Client,
    base_url: String,
    consumer_key: String,
    consumer_secret: String,
    config: RemoteClientConfig,
}

fn collection_path(entity_type: EntityType) -> &'static str {
    match entity_type {
        EntityType::Product => "products",
        EntityType::Order => "orders",
        EntityType::Customer => "customers",
        EntityType::Review => "products/reviews",
    }
}

impl RemoteClient {
    pub fn for_tenant(tenant: &Tenant, config: RemoteClientConfig) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            base_url: tenant.base_url.trim_end_matches('/').to_string(),
            consumer_key: tenant.consumer_key.clone(),
            consumer_secret: tenant.consumer_secret.clone(),
            config,
        })
    }

    /// Fetch one page of a collection, oldest-modified first so checkpoint
    /// advancement per page is safe. `modified_after` is exclusive on the
    /// remote side.
    pub async fn fetch_page(
        &self,
        entity_type: EntityType,
        page: u32,
        modified_after: Option<DateTime<Utc>>,
    ) -> Result<RemotePage, RemoteClientError> {
        let per_page = self.config.page_size.min(MAX_PAGE_SIZE);
        let mut url = format!(
            "{}/wp-json/wc/v3/{}?page={}&per_page={}&orderby=date&order=asc",
            self.base_url,
            collection_path(entity_type),
            page,
            per_page,
        );
        if let Some(since) = modified_after {
            url.push_str(&format!(
                "&modified_after={}",
                since.format("%Y-%m-%dT%H:%M:%S")
            ));
        }

        let response = self.request_with_retry(&url).await?;

        let total_pages: u32 = response
            .headers()
            .get("x-wp-totalpages")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok())
            .unwrap_or(1);

        let records: Vec<serde_json::Value> = response
            .json()
            .await
            .map_err(RemoteClientError::Decode)?;

        Ok(RemotePage {
            records,
            has_more: page < total_pages,
        })
    }

    /// Fetch a single record by id. `Ok(None)` means the remote no longer has
    /// it, which the engine treats as a deletion.
    pub async fn fetch_one(
        &self,
        entity_type: EntityType,
        external_id: i64,
    ) -> Result<Option<serde_json::Value>, RemoteClientError> {
        let url = format!(
            "{}/wp-json/wc/v3/{}/{}",
            self.base_url,
            collection_path(entity_type),
            external_id,
        );

        match self.request_with_retry(&url).await {
            Ok(response) => Ok(Some(
                response.json().await.map_err(RemoteClientError::Decode)?,
            )),
            Err(RemoteClientError::HttpError { status, .. })
                if status == StatusCode::NOT_FOUND =>
            {
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    async fn request_with_retry(&self, url: &str) -> Result<Response, RemoteClientError> {
        let mut last_error = String::new();

        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                let backoff_secs = std::cmp::min(1u64 << attempt, 30);
                tracing::warn!(attempt, backoff_secs, "retrying after backoff");
                tokio::time::sleep(Duration::from_secs(backoff_secs)).await;
            }

            let response = match self
                .client
                .get(url)
                .basic_auth(&self.consumer_key, Some(&self.consumer_secret))
                .send()
                .await
            {
                Ok(resp) => resp,
                Err(e) => {
                    last_error = e.to_string();
                    if e.is_timeout() || e.is_connect() {
                        continue;
                    }
                    return Err(RemoteClientError::RequestError(e));
                }
            };

            let status = response.status();

            if status.is_success() {
                return Ok(response);
            }

            // Honor Retry-After header for 429
            if status == StatusCode::TOO_MANY_REQUESTS {
                if let Some(retry_after) = response
                    .headers()
                    .get("retry-after")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse::<u64>().ok())
                {
                    let wait = std::cmp::min(retry_after, 60);
                    tracing::warn!(wait, "rate-limited, waiting Retry-After");
                    tokio::time::sleep(Duration::from_secs(wait)).await;
                }
                last_error = "429 Too Many Requests".to_string();
                continue;
            }

            // Retry on 5xx
            if status.is_server_error() {
                let body = response.text().await.unwrap_or_default();
                last_error = format!("{status}: {body}");
                continue;
            }

            // Fail fast on 4xx (except 429 handled above)
            let body = response.text().await.unwrap_or_default();
            return Err(RemoteClientError::HttpError { status, body });
        }

        Err(RemoteClientError::MaxRetriesExceeded {
            attempts: self.config.max_retries + 1,
            last_error,
        })
    }
}
