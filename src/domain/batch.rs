//! Server-owned bulk upload batch records
//!
//! Batches are fetched read-only from the backend. The only mutation this
//! crate performs on them is the approval request, and even then the local
//! copy is never patched: the list is refetched so `approved_at` is always
//! server-confirmed.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use ts_rs::TS;

/// Processing status reported by the backend for a batch
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum BatchStatus {
    Processing,
    Complete,
    Error,
    /// Any status string this client does not know about
    #[default]
    #[serde(other)]
    Other,
}

impl BatchStatus {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Processing => "processing",
            Self::Complete => "complete",
            Self::Error => "error",
            Self::Other => "other",
        }
    }
}

impl std::fmt::Display for BatchStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One submitted CSV file and its server-side processing record
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Batch {
    /// Empty when the status endpoint omits it; the poller fills in the requested id.
    #[serde(default, deserialize_with = "lenient_id")]
    pub batch_id: String,
    #[serde(default, deserialize_with = "lenient_status")]
    pub status: BatchStatus,
    #[serde(default, deserialize_with = "lenient_text")]
    pub filename: Option<String>,
    /// Counts are `null` while the backend is still validating rows; read as 0.
    #[serde(default, deserialize_with = "lenient_count")]
    pub total_products: u64,
    #[serde(default, deserialize_with = "lenient_count")]
    pub valid_products: u64,
    #[serde(default, deserialize_with = "lenient_count")]
    pub invalid_products: u64,
    #[serde(default, deserialize_with = "lenient_count")]
    pub warning_products: u64,
    /// Observed both as a 0-1 fraction and as a 0-100 percentage
    #[serde(default, deserialize_with = "lenient_rate")]
    pub success_rate: Option<f64>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub created_at: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub updated_at: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub approved_at: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub approved_by: Option<String>,
    /// Failure description attached to `status = error` batches, under either key
    #[serde(default, deserialize_with = "lenient_text")]
    pub error: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub message: Option<String>,
}

// Batch records are server-owned and loosely typed. Field-level leniency keeps
// one odd value from failing a whole poll or list response.

/// Ids come back as strings or numbers; numbers are kept as their JSON text.
fn lenient_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::Null => String::new(),
        Value::String(text) => text,
        other => other.to_string(),
    })
}

fn lenient_status<'de, D: Deserializer<'de>>(deserializer: D) -> Result<BatchStatus, D::Error> {
    let value = Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).unwrap_or_default())
}

fn lenient_text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::Null => None,
        Value::String(text) => Some(text),
        other => Some(other.to_string()),
    })
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn lenient_count<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
    let count = match Value::deserialize(deserializer)? {
        Value::Number(number) => number.as_u64().or_else(|| {
            number
                .as_f64()
                .filter(|value| value.is_finite() && *value >= 0.0)
                .map(|value| value.round() as u64)
        }),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    };
    Ok(count.unwrap_or_default())
}

fn lenient_rate<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<f64>, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    })
}

impl Batch {
    /// Presence of `approved_at` is the approval marker.
    pub const fn is_approved(&self) -> bool {
        self.approved_at.is_some()
    }

    /// Human-readable reason for a failed batch, if the backend gave one.
    pub fn failure_reason(&self) -> Option<&str> {
        self.error
            .as_deref()
            .or(self.message.as_deref())
            .filter(|reason| !reason.trim().is_empty())
    }

    /// A batch can be approved only once, and only after processing completed.
    pub fn is_approvable(&self) -> bool {
        self.status == BatchStatus::Complete && !self.is_approved()
    }

    /// Success rate as a whole percentage.
    ///
    /// Values above 1 are taken as percentages already, anything else as a
    /// fraction. This is a heuristic; the backend has not confirmed which
    /// scale it uses.
    pub fn success_rate_percent(&self) -> Option<u32> {
        let value = self.success_rate?;
        if !value.is_finite() || value < 0.0 {
            return None;
        }
        let percent = if value > 1.0 { value } else { value * 100.0 };
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        Some(percent.round().min(f64::from(u32::MAX)) as u32)
    }
}

/// One status response: the typed view plus the body exactly as received.
///
/// The raw body is what the upload session keeps as its `result`, so fields
/// [`Batch`] does not model still reach the renderer.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchSnapshot {
    pub batch: Batch,
    pub raw: Value,
}

impl BatchSnapshot {
    /// Parse a status body. `requested_id` stands in for a missing `batch_id`.
    pub fn from_raw(raw: Value, requested_id: &str) -> Result<Self, serde_json::Error> {
        let mut batch = Batch::deserialize(&raw)?;
        if batch.batch_id.is_empty() {
            batch.batch_id = requested_id.to_string();
        }
        Ok(Self { batch, raw })
    }
}

/// The batch listing endpoint returns either a bare array or an `{items}` envelope.
///
/// Rows are kept raw until [`BatchListPayload::into_batches`] so a single
/// malformed row is skipped instead of failing the whole list.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum BatchListPayload {
    Bare(Vec<Value>),
    Envelope { items: Vec<Value> },
}

impl BatchListPayload {
    pub fn into_batches(self) -> Vec<Batch> {
        let rows = match self {
            Self::Bare(rows) | Self::Envelope { items: rows } => rows,
        };
        rows.into_iter()
            .enumerate()
            .filter_map(|(index, row)| match Batch::deserialize(&row) {
                Ok(batch) => Some(batch),
                Err(e) => {
                    tracing::warn!("Skipping unreadable batch row {}: {}", index, e);
                    None
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn batch(status: BatchStatus, approved_at: Option<&str>) -> Batch {
        Batch {
            batch_id: "b1".to_string(),
            status,
            approved_at: approved_at.map(str::to_string),
            ..Batch::default()
        }
    }

    #[test]
    fn test_only_complete_unapproved_batches_are_approvable() {
        assert!(batch(BatchStatus::Complete, None).is_approvable());
        assert!(!batch(BatchStatus::Complete, Some("2024-05-01T10:00:00Z")).is_approvable());
        assert!(!batch(BatchStatus::Processing, None).is_approvable());
        assert!(!batch(BatchStatus::Error, None).is_approvable());
        assert!(!batch(BatchStatus::Other, None).is_approvable());
    }

    #[test]
    fn test_success_rate_accepts_both_scales() {
        let mut b = Batch::default();
        b.success_rate = Some(0.934);
        assert_eq!(b.success_rate_percent(), Some(93));

        b.success_rate = Some(87.6);
        assert_eq!(b.success_rate_percent(), Some(88));

        b.success_rate = Some(1.0);
        assert_eq!(b.success_rate_percent(), Some(100));

        b.success_rate = None;
        assert_eq!(b.success_rate_percent(), None);

        b.success_rate = Some(f64::NAN);
        assert_eq!(b.success_rate_percent(), None);
    }

    #[test]
    fn test_unknown_status_is_preserved_as_other() {
        let parsed: Batch = serde_json::from_value(json!({
            "batch_id": "b9",
            "status": "queued"
        }))
        .unwrap();
        assert_eq!(parsed.status, BatchStatus::Other);
    }

    #[test]
    fn test_failure_reason_prefers_error_key() {
        let parsed: Batch = serde_json::from_value(json!({
            "batch_id": "b2",
            "status": "error",
            "error": "Row 4: missing SKU",
            "message": "Processing failed"
        }))
        .unwrap();
        assert_eq!(parsed.failure_reason(), Some("Row 4: missing SKU"));

        let blank = Batch {
            message: Some("  ".to_string()),
            ..Batch::default()
        };
        assert_eq!(blank.failure_reason(), None);
    }

    #[test]
    fn test_list_payload_shapes_parse_identically() {
        let rows = json!([
            {"batch_id": "a", "status": "complete", "total_products": 10},
            {"batch_id": "b", "status": "processing"}
        ]);
        let bare: BatchListPayload = serde_json::from_value(rows.clone()).unwrap();
        let envelope: BatchListPayload = serde_json::from_value(json!({ "items": rows })).unwrap();

        assert_eq!(bare.into_batches(), envelope.into_batches());
    }

    #[test]
    fn test_numeric_batch_id_is_read_as_text() {
        let parsed: Batch = serde_json::from_value(json!({
            "batch_id": 42,
            "status": "complete"
        }))
        .unwrap();
        assert_eq!(parsed.batch_id, "42");
        assert_eq!(parsed.status, BatchStatus::Complete);
    }

    #[test]
    fn test_pending_counts_may_be_null() {
        let parsed: Batch = serde_json::from_value(json!({
            "batch_id": "b1",
            "status": "processing",
            "total_products": 120,
            "valid_products": null,
            "invalid_products": null,
            "warning_products": "3",
            "success_rate": null,
            "approved_at": null
        }))
        .unwrap();
        assert_eq!(parsed.total_products, 120);
        assert_eq!(parsed.valid_products, 0);
        assert_eq!(parsed.invalid_products, 0);
        assert_eq!(parsed.warning_products, 3);
        assert_eq!(parsed.success_rate, None);
        assert!(!parsed.is_approved());
    }

    #[test]
    fn test_null_status_reads_as_other() {
        let parsed: Batch = serde_json::from_value(json!({"batch_id": "b1", "status": null})).unwrap();
        assert_eq!(parsed.status, BatchStatus::Other);
    }

    #[test]
    fn test_list_skips_only_the_unreadable_row() {
        let payload: BatchListPayload = serde_json::from_value(json!({"items": [
            {"batch_id": "a", "status": "complete", "total_products": null},
            "not a batch",
            {"batch_id": 7, "status": "processing", "valid_products": null}
        ]}))
        .unwrap();

        let batches = payload.into_batches();
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0].batch_id, "a");
        assert_eq!(batches[0].total_products, 0);
        assert_eq!(batches[1].batch_id, "7");
        assert_eq!(batches[1].status, BatchStatus::Processing);
    }

    #[test]
    fn test_snapshot_keeps_unmodeled_fields() {
        let raw = json!({
            "status": "complete",
            "duplicate_skus": ["A1", "A7"],
            "total_products": 10
        });
        let snapshot = BatchSnapshot::from_raw(raw.clone(), "b1").unwrap();
        assert_eq!(snapshot.batch.batch_id, "b1");
        assert_eq!(snapshot.batch.total_products, 10);
        assert_eq!(snapshot.raw, raw);

        assert!(BatchSnapshot::from_raw(json!("maintenance"), "b1").is_err());
    }

    #[test]
    fn test_empty_list_payloads() {
        let bare: BatchListPayload = serde_json::from_value(json!([])).unwrap();
        assert!(bare.into_batches().is_empty());

        let envelope: BatchListPayload = serde_json::from_value(json!({ "items": [] })).unwrap();
        assert!(envelope.into_batches().is_empty());
    }
}
