//! Vendor/store selection that scopes uploads and batch history

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::infrastructure::upload_error::BulkUploadError;

/// Selected vendor and its primary store
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct VendorContext {
    pub vendor_id: String,
    /// `None` when the vendor has no store yet
    pub store_id: Option<String>,
}

impl VendorContext {
    pub fn new(vendor_id: impl Into<String>, store_id: Option<String>) -> Self {
        Self {
            vendor_id: vendor_id.into(),
            store_id,
        }
    }

    pub fn with_store(vendor_id: impl Into<String>, store_id: impl Into<String>) -> Self {
        Self::new(vendor_id, Some(store_id.into()))
    }

    /// Upload is disabled whenever no store exists for the selected vendor.
    pub fn upload_enabled(&self) -> bool {
        self.scope().is_ok()
    }

    /// The `(vendor_id, store_id)` pair every upload and history query needs.
    pub fn scope(&self) -> Result<(&str, &str), BulkUploadError> {
        let vendor_id = self.vendor_id.trim();
        if vendor_id.is_empty() {
            return Err(BulkUploadError::MissingVendor);
        }
        match self.store_id.as_deref().map(str::trim) {
            Some(store_id) if !store_id.is_empty() => Ok((vendor_id, store_id)),
            _ => Err(BulkUploadError::MissingStore {
                vendor_id: vendor_id.to_string(),
            }),
        }
    }
}
