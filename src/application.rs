//! Application layer module
//!
//! Stateful services that drive the domain rules against a
//! [`BulkUploadApi`](crate::domain::BulkUploadApi) backend.

pub mod batch_approval;
pub mod batch_history;
pub mod upload_controller;

pub use batch_approval::{ApprovalError, BatchApprovals};
pub use batch_history::BatchHistory;
pub use upload_controller::{UploadController, UploadControllerConfig};
