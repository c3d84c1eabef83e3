//! Boundary normalization of bulk upload responses
//!
//! The backend reports upload failures in several envelopes (`errors[]`,
//! `error`, `message`, `detail`) depending on which code path rejected the
//! file. Everything past this module sees only [`UploadOutcome`].

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use ts_rs::TS;

/// Shown when a response carries neither a batch id nor any error marker.
pub const UNKNOWN_ERROR_MESSAGE: &str = "Unknown error occurred.";

/// Used as the synthetic `detail` when a failed upload left nothing better.
pub const UPLOAD_FAILED_MESSAGE: &str = "Upload failed";

const BATCH_ID_KEY: &str = "batch_id";
const ERRORS_KEY: &str = "errors";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum Classification {
    Success,
    Error,
}

/// Uniform `{classification, errors, result}` triple
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct NormalizedResponse {
    pub classification: Classification,
    pub errors: Vec<String>,
    #[ts(type = "unknown")]
    pub result: Value,
    pub batch_id: Option<String>,
}

/// Tagged result of one upload attempt, produced only by [`UploadOutcome::from_response`]
#[derive(Debug, Clone, PartialEq)]
pub enum UploadOutcome {
    /// The server accepted the file and created a batch.
    Accepted { batch_id: String, result: Value },
    /// The server, or the transport, rejected the upload.
    ///
    /// `errors` is empty when the caller should render `result` directly.
    Rejected {
        errors: Vec<String>,
        result: Value,
        status_code: Option<u16>,
    },
}

impl UploadOutcome {
    pub fn from_response(raw: Value, status_code: Option<u16>) -> Self {
        let normalized = normalize_response(&raw, status_code);
        match (normalized.classification, normalized.batch_id) {
            (Classification::Success, Some(batch_id)) => Self::Accepted {
                batch_id,
                result: normalized.result,
            },
            _ => Self::Rejected {
                errors: normalized.errors,
                result: normalized.result,
                status_code,
            },
        }
    }
}

/// Classify a raw upload response.
///
/// Rules apply in order:
/// 1. no batch id and any of `detail`/`error`/`message` → error, empty list
///    (the caller shows the object itself so the failure is not rendered twice)
/// 2. non-empty `errors` array → error with that array verbatim
/// 3. a single `error`, `message` or `detail` → error with that one message
/// 4. batch id present → success
/// 5. anything else → error with [`UNKNOWN_ERROR_MESSAGE`]
pub fn normalize_response(raw: &Value, status_code: Option<u16>) -> NormalizedResponse {
    let batch_id = truthy_text(raw, BATCH_ID_KEY);
    let single_message = ["error", "message", "detail"]
        .into_iter()
        .find_map(|key| truthy_text(raw, key));

    let error = |errors: Vec<String>| NormalizedResponse {
        classification: Classification::Error,
        errors,
        result: raw.clone(),
        batch_id: batch_id.clone(),
    };

    if batch_id.is_none() && single_message.is_some() {
        tracing::debug!(?status_code, "upload rejected with a structured error body");
        return error(Vec::new());
    }

    if let Some(errors) = error_list(raw) {
        return error(errors);
    }

    if let Some(message) = single_message {
        return error(vec![message]);
    }

    if batch_id.is_some() {
        return NormalizedResponse {
            classification: Classification::Success,
            errors: Vec::new(),
            result: raw.clone(),
            batch_id: batch_id.clone(),
        };
    }

    error(vec![UNKNOWN_ERROR_MESSAGE.to_string()])
}

/// Build the synthetic `{detail}` object for a failed upload request.
///
/// Preference: body `detail`, then body `error`, then the transport's own
/// message, then [`UPLOAD_FAILED_MESSAGE`].
pub fn synthesize_failure(body: Option<&Value>, transport_message: Option<&str>) -> Value {
    let detail = body
        .and_then(|body| truthy_text(body, "detail").or_else(|| truthy_text(body, "error")))
        .or_else(|| {
            transport_message
                .map(str::trim)
                .filter(|message| !message.is_empty())
                .map(str::to_string)
        })
        .unwrap_or_else(|| UPLOAD_FAILED_MESSAGE.to_string());

    json!({ "detail": detail })
}

/// Field value as display text, if it is "present" in the loose sense the
/// backend relies on: not null, not an empty string, not `false`, not `0`.
fn truthy_text(raw: &Value, key: &str) -> Option<String> {
    let value = raw.as_object().and_then(|object: &Map<String, Value>| object.get(key))?;
    match value {
        Value::Null | Value::Bool(false) => None,
        Value::String(text) if text.is_empty() => None,
        Value::String(text) => Some(text.clone()),
        Value::Number(number) if number.as_f64() == Some(0.0) => None,
        other => Some(other.to_string()),
    }
}

fn error_list(raw: &Value) -> Option<Vec<String>> {
    let items = raw.get(ERRORS_KEY)?.as_array()?;
    if items.is_empty() {
        return None;
    }
    Some(
        items
            .iter()
            .map(|item| match item {
                Value::String(text) => text.clone(),
                other => other.to_string(),
            })
            .collect(),
    )
}
