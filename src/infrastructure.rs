//! Infrastructure layer: HTTP client, configuration and logging

pub mod bulk_upload_client;
pub mod config; // Configuration file management
pub mod logging; // Logging infrastructure
pub mod upload_error;

// Re-export commonly used items
pub use bulk_upload_client::{BulkUploadClient, BulkUploadClientConfig};
pub use config::{AppConfig, ConfigManager};
pub use upload_error::BulkUploadError;
