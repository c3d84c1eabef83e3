//! File payload for a bulk upload

use std::path::Path;

use tracing::warn;

use crate::infrastructure::upload_error::BulkUploadError;

pub const CSV_MIME_TYPE: &str = "text/csv";

/// A file read into memory, ready to be sent as a multipart part
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadFile {
    pub file_name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl UploadFile {
    pub fn from_bytes(file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        let file_name = file_name.into();
        let mime_type = mime_type_for(&file_name).to_string();
        Self {
            file_name,
            mime_type,
            bytes,
        }
    }

    pub async fn from_path(path: &Path) -> Result<Self, BulkUploadError> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| BulkUploadError::file_read(path, &e))?;
        let file_name = path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("upload.csv")
            .to_string();
        Ok(Self::from_bytes(file_name, bytes))
    }

    /// Case-insensitive extension match against e.g. `[".csv"]`.
    pub fn has_accepted_extension(&self, accepted: &[String]) -> bool {
        let name = self.file_name.to_ascii_lowercase();
        accepted
            .iter()
            .map(|ext| ext.trim().trim_start_matches('.').to_ascii_lowercase())
            .any(|ext| name.rsplit_once('.').is_some_and(|(_, actual)| actual == ext))
    }

    /// The type filter is advisory: a mismatch is logged and the server decides.
    pub fn check_accepted(&self, accepted: &[String]) -> bool {
        let ok = accepted.is_empty() || self.has_accepted_extension(accepted);
        if !ok {
            warn!(
                file = %self.file_name,
                ?accepted,
                "file type is not in the accepted list, sending anyway"
            );
        }
        ok
    }

    pub fn byte_len(&self) -> usize {
        self.bytes.len()
    }
}

fn mime_type_for(file_name: &str) -> &'static str {
    if file_name.to_ascii_lowercase().ends_with(".csv") {
        CSV_MIME_TYPE
    } else {
        "application/octet-stream"
    }
}
