//! Domain module - upload pipeline types and rules
//!
//! Everything here is synchronous and free of I/O, apart from the
//! [`repositories::BulkUploadApi`] trait the infrastructure layer implements.

pub mod batch;
pub mod repositories;
pub mod upload_file;
pub mod upload_outcome;
pub mod upload_session;
pub mod vendor_context;

// Re-export commonly used items for convenience
pub use batch::{Batch, BatchSnapshot, BatchStatus};
pub use repositories::BulkUploadApi;
pub use upload_file::UploadFile;
pub use upload_outcome::{NormalizedResponse, UploadOutcome, normalize_response};
pub use upload_session::{UploadEvent, UploadSession, UploadStatus};
pub use vendor_context::VendorContext;
