//! Backend interface for the bulk upload endpoints
//!
//! The application layer only talks to the backend through this trait, so the
//! upload flow, history and approval can run against the real HTTP client or
//! an in-process double.

use async_trait::async_trait;
use serde_json::Value;

use crate::domain::batch::{Batch, BatchSnapshot};
use crate::domain::upload_file::UploadFile;
use crate::infrastructure::upload_error::BulkUploadError;

#[async_trait]
pub trait BulkUploadApi: Send + Sync {
    /// `POST /products/bulk-upload`. Returns the raw body of a 2xx response.
    async fn submit(
        &self,
        file: &UploadFile,
        vendor_id: &str,
        store_id: &str,
    ) -> Result<Value, BulkUploadError>;

    /// `GET /products/bulk-upload/{batch_id}`. Read-only and idempotent.
    async fn fetch_status(&self, batch_id: &str) -> Result<BatchSnapshot, BulkUploadError>;

    /// `GET /products/bulk-upload/batches?vendor_id&store_id`
    async fn list_batches(&self, vendor_id: &str, store_id: &str)
    -> Result<Vec<Batch>, BulkUploadError>;

    /// `POST /products/bulk-upload/{batch_id}/approve`
    async fn approve(&self, batch_id: &str, approved_by: &str) -> Result<(), BulkUploadError>;

    /// `GET /products/bulk-upload/template`, raw CSV text.
    async fn download_template(&self) -> Result<String, BulkUploadError>;
}
