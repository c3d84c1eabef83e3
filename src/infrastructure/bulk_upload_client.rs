//! HTTP client for the bulk product upload endpoints
//!
//! Every request is scoped to one tenant through the `X-Tenant-ID` header,
//! fixed when the client is built. The client never retries on its own:
//! a failed upload or poll is surfaced once and the caller decides.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, ClientBuilder, Response};
use serde_json::{Value, json};
use tracing::{debug, error, info, warn};
use url::Url;

use crate::domain::batch::{Batch, BatchListPayload, BatchSnapshot};
use crate::domain::repositories::BulkUploadApi;
use crate::domain::upload_file::UploadFile;
use crate::infrastructure::config::ApiConfig;
use crate::infrastructure::upload_error::BulkUploadError;

/// `X-Tenant-ID`, lowercase as header names are stored
pub const TENANT_HEADER: &str = "x-tenant-id";

const BULK_UPLOAD_PATH: [&str; 2] = ["products", "bulk-upload"];

/// Configuration for the bulk upload client
#[derive(Debug, Clone)]
pub struct BulkUploadClientConfig {
    pub base_url: String,
    pub tenant_id: String,
    /// 0 disables the client-side timeout
    pub timeout_seconds: u64,
    pub user_agent: String,
}

impl BulkUploadClientConfig {
    pub fn from_api_config(api: &ApiConfig) -> Result<Self, BulkUploadError> {
        let tenant_id = api
            .tenant_id
            .as_deref()
            .map(str::trim)
            .filter(|tenant| !tenant.is_empty())
            .ok_or_else(|| {
                BulkUploadError::configuration(
                    "tenant id is not set (use --tenant or MARKETPLACE_OPS_TENANT_ID)",
                )
            })?;

        Ok(Self {
            base_url: api.base_url.clone(),
            tenant_id: tenant_id.to_string(),
            timeout_seconds: api.request_timeout_seconds,
            user_agent: api.user_agent.clone(),
        })
    }
}

/// reqwest-backed implementation of [`BulkUploadApi`]
#[derive(Debug, Clone)]
pub struct BulkUploadClient {
    client: Client,
    base: Url,
    /// Optional label for provenance in logs (e.g. "cli", "approval")
    context_label: Option<String>,
}

impl BulkUploadClient {
    pub fn from_api_config(api: &ApiConfig) -> Result<Self, BulkUploadError> {
        Self::with_config(BulkUploadClientConfig::from_api_config(api)?)
    }

    pub fn with_config(config: BulkUploadClientConfig) -> Result<Self, BulkUploadError> {
        let base = Url::parse(config.base_url.trim()).map_err(|e| {
            BulkUploadError::configuration(format!("invalid base URL {:?}: {}", config.base_url, e))
        })?;
        if !matches!(base.scheme(), "http" | "https") || base.cannot_be_a_base() {
            return Err(BulkUploadError::configuration(format!(
                "base URL must be an http(s) URL, got {:?}",
                config.base_url
            )));
        }

        let tenant = HeaderValue::from_str(&config.tenant_id).map_err(|e| {
            BulkUploadError::configuration(format!("tenant id is not a valid header value: {}", e))
        })?;
        let mut headers = HeaderMap::new();
        headers.insert(HeaderName::from_static(TENANT_HEADER), tenant);

        let mut builder = ClientBuilder::new()
            .user_agent(&config.user_agent)
            .default_headers(headers)
            .gzip(true);
        if config.timeout_seconds > 0 {
            builder = builder.timeout(Duration::from_secs(config.timeout_seconds));
        }
        let client = builder.build().map_err(|e| {
            BulkUploadError::configuration(format!("failed to create HTTP client: {}", e))
        })?;

        info!("🔧 Bulk upload client ready for {} (tenant {})", base, config.tenant_id);

        Ok(Self {
            client,
            base,
            context_label: None,
        })
    }

    /// Set a human-readable context label for log provenance
    pub fn with_context_label(mut self, label: &str) -> Self {
        self.context_label = Some(label.to_string());
        self
    }

    /// Base URL joined with `products/bulk-upload` and `extra` path segments.
    ///
    /// Any path prefix on the base (e.g. `/api/v1`) is kept and each
    /// segment is percent-encoded.
    pub fn endpoint(&self, extra: &[&str]) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments
                .pop_if_empty()
                .extend(BULK_UPLOAD_PATH)
                .extend(extra);
        }
        url
    }

    fn label(&self) -> &str {
        self.context_label.as_deref().unwrap_or("bulk-upload")
    }

    async fn send(
        &self,
        request: reqwest::RequestBuilder,
        method: &str,
        url: &Url,
    ) -> Result<Response, BulkUploadError> {
        debug!("🌐 [{}] {} {}", self.label(), method, url);
        let response = request.send().await.map_err(|e| {
            error!("❌ [{}] {} {} failed: {}", self.label(), method, url, e);
            BulkUploadError::network(&e)
        })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        // The body may hold a structured `detail`/`error` worth surfacing
        let body = response.text().await.unwrap_or_default();
        warn!("❌ [{}] HTTP {} from {} {}", self.label(), status.as_u16(), method, url);
        Err(BulkUploadError::http_status(status.as_u16(), &body))
    }

    async fn read_text(response: Response, url: &Url) -> Result<String, BulkUploadError> {
        response.text().await.map_err(|e| {
            error!("Failed to read response body from {}: {}", url, e);
            BulkUploadError::network(&e)
        })
    }
}

#[async_trait]
impl BulkUploadApi for BulkUploadClient {
    async fn submit(
        &self,
        file: &UploadFile,
        vendor_id: &str,
        store_id: &str,
    ) -> Result<Value, BulkUploadError> {
        let vendor_id = vendor_id.trim();
        let store_id = store_id.trim();
        if vendor_id.is_empty() {
            return Err(BulkUploadError::MissingVendor);
        }
        if store_id.is_empty() {
            return Err(BulkUploadError::MissingStore {
                vendor_id: vendor_id.to_string(),
            });
        }

        let part = Part::bytes(file.bytes.clone())
            .file_name(file.file_name.clone())
            .mime_str(&file.mime_type)
            .map_err(|e| {
                BulkUploadError::configuration(format!("invalid MIME type {:?}: {}", file.mime_type, e))
            })?;
        let form = Form::new()
            .part("file", part)
            .text("vendor_id", vendor_id.to_string())
            .text("store_id", store_id.to_string());

        let url = self.endpoint(&[]);
        info!(
            "📤 [{}] Uploading {} ({} bytes) for vendor {} / store {}",
            self.label(),
            file.file_name,
            file.byte_len(),
            vendor_id,
            store_id
        );
        let response = self
            .send(self.client.post(url.clone()).multipart(form), "POST", &url)
            .await?;
        let text = Self::read_text(response, &url).await?;

        // A 2xx body that is not JSON is kept as text so the normalizer can report it
        Ok(match serde_json::from_str(&text) {
            Ok(value) => value,
            Err(_) if text.trim().is_empty() => Value::Null,
            Err(_) => Value::String(text),
        })
    }

    async fn fetch_status(&self, batch_id: &str) -> Result<BatchSnapshot, BulkUploadError> {
        let url = self.endpoint(&[batch_id]);
        let response = self.send(self.client.get(url.clone()), "GET", &url).await?;
        let text = Self::read_text(response, &url).await?;

        let snapshot = serde_json::from_str(&text)
            .and_then(|raw| BatchSnapshot::from_raw(raw, batch_id))
            .map_err(|e| BulkUploadError::invalid_payload(url.as_str(), e))?;
        debug!("📊 Batch {} status: {}", snapshot.batch.batch_id, snapshot.batch.status);
        Ok(snapshot)
    }

    async fn list_batches(
        &self,
        vendor_id: &str,
        store_id: &str,
    ) -> Result<Vec<Batch>, BulkUploadError> {
        let url = self.endpoint(&["batches"]);
        let request = self
            .client
            .get(url.clone())
            .query(&[("vendor_id", vendor_id), ("store_id", store_id)]);
        let response = self.send(request, "GET", &url).await?;
        let text = Self::read_text(response, &url).await?;

        let batches = serde_json::from_str::<BatchListPayload>(&text)
            .map_err(|e| BulkUploadError::invalid_payload(url.as_str(), e))?
            .into_batches();
        debug!("📋 {} batches for vendor {} / store {}", batches.len(), vendor_id, store_id);
        Ok(batches)
    }

    async fn approve(&self, batch_id: &str, approved_by: &str) -> Result<(), BulkUploadError> {
        let url = self.endpoint(&[batch_id, "approve"]);
        let request = self
            .client
            .post(url.clone())
            .json(&json!({ "approved_by": approved_by }));
        self.send(request, "POST", &url).await?;
        info!("✅ [{}] Batch {} approved by {}", self.label(), batch_id, approved_by);
        Ok(())
    }

    async fn download_template(&self) -> Result<String, BulkUploadError> {
        let url = self.endpoint(&["template"]);
        let response = self.send(self.client.get(url.clone()), "GET", &url).await?;
        Self::read_text(response, &url).await
    }
}
