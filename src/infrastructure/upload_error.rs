//! Error types for the bulk upload client
//!
//! Transport failures keep whatever the server sent back (status code and
//! parsed body) so the upload flow can build its synthetic error object from
//! the same fields a successful response would have carried.

use std::path::Path;

use serde_json::Value;
use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum BulkUploadError {
    /// No response at all: connection refused, DNS, timeout, TLS.
    #[error("HTTP request failed: {message}")]
    Network { message: String },

    /// The server answered with a non-success status.
    #[error("{message}")]
    HttpStatus {
        status: u16,
        message: String,
        body: Option<Value>,
    },

    #[error("Invalid response payload from {endpoint}: {reason}")]
    InvalidPayload { endpoint: String, reason: String },

    #[error("No vendor selected")]
    MissingVendor,

    #[error("No store found for vendor {vendor_id}")]
    MissingStore { vendor_id: String },

    #[error("Failed to read upload file {path}: {reason}")]
    FileRead { path: String, reason: String },

    #[error("An upload is already {status}; wait for it to finish or retry")]
    UploadInProgress { status: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },
}

impl BulkUploadError {
    pub fn network(error: &reqwest::Error) -> Self {
        Self::Network {
            message: error.to_string(),
        }
    }

    /// Build an HTTP status error from the raw response body.
    ///
    /// The body is kept only when it parses as JSON.
    pub fn http_status(status: u16, body_text: &str) -> Self {
        Self::HttpStatus {
            status,
            message: format!("Request failed with status code {status}"),
            body: serde_json::from_str(body_text).ok(),
        }
    }

    pub fn file_read(path: &Path, error: &std::io::Error) -> Self {
        Self::FileRead {
            path: path.display().to_string(),
            reason: error.to_string(),
        }
    }

    pub fn invalid_payload(endpoint: &str, reason: impl ToString) -> Self {
        Self::InvalidPayload {
            endpoint: endpoint.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Transport-level status code, when the server answered at all.
    pub const fn status_code(&self) -> Option<u16> {
        match self {
            Self::HttpStatus { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Parsed error body returned by the server, if any.
    pub const fn response_body(&self) -> Option<&Value> {
        match self {
            Self::HttpStatus { body, .. } => body.as_ref(),
            _ => None,
        }
    }

    /// Message to surface when the body has nothing better.
    ///
    /// Pure network failures have none: their text is connection plumbing,
    /// not something a vendor can act on, so the caller falls back to a
    /// generic message and the detail goes to the log.
    pub fn display_message(&self) -> Option<String> {
        match self {
            Self::Network { .. } => None,
            other => Some(other.to_string()),
        }
    }
}
