//! Upload session state machine
//!
//! One [`UploadSession`] tracks a single upload attempt through
//! `idle → uploading → processing → complete`, with `error` reachable from
//! `uploading` and `processing`. Sessions are immutable values: every event
//! produces a new session through [`UploadSession::apply`], and the owner
//! replaces its copy wholesale.
//!
//! Each submit or retry starts a new generation. Asynchronous results carry
//! the generation they were started under and are dropped when it no longer
//! matches, so a poll that fires after a retry cannot resurrect an old attempt.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use ts_rs::TS;
use uuid::Uuid;

use crate::domain::batch::{BatchSnapshot, BatchStatus};
use crate::domain::upload_outcome::UploadOutcome;

/// Shown when a polled batch reports `status = error` without a reason.
pub const BATCH_FAILED_MESSAGE: &str = "Batch processing failed.";

/// Lifecycle status of an upload attempt
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum UploadStatus {
    #[default]
    Idle,
    Uploading,
    Processing,
    Error,
    Complete,
}

impl UploadStatus {
    /// A new submission is blocked while the previous one is in flight.
    pub const fn is_busy(self) -> bool {
        matches!(self, Self::Uploading | Self::Processing)
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Uploading => "uploading",
            Self::Processing => "processing",
            Self::Error => "error",
            Self::Complete => "complete",
        }
    }
}

impl std::fmt::Display for UploadStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Client-local, never persisted state of one upload attempt
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct UploadSession {
    pub generation: u64,
    /// Correlation id for logs, assigned on submit
    pub attempt_id: Option<Uuid>,
    pub status: UploadStatus,
    pub batch_id: Option<String>,
    pub errors: Vec<String>,
    /// Last raw server payload, `null` until the server answers
    #[ts(type = "unknown")]
    pub result: Value,
    pub response_status_code: Option<u16>,
}

/// Inputs to the state machine
#[derive(Debug, Clone)]
pub enum UploadEvent {
    /// The user submitted a file.
    Submit,
    /// The upload request finished, successfully or not.
    Responded { generation: u64, outcome: UploadOutcome },
    /// The status poll (scheduled or manual) returned a batch.
    Polled {
        generation: u64,
        snapshot: BatchSnapshot,
    },
    /// The status poll itself failed; the batch state is still unknown.
    PollFailed { generation: u64, reason: String },
    /// Explicit retry / new upload.
    Retry,
}

impl UploadSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compute the session that follows `event`.
    ///
    /// Events that do not apply to the current status, or that belong to an
    /// older generation, leave the session unchanged.
    #[must_use]
    pub fn apply(&self, event: UploadEvent) -> Self {
        match event {
            UploadEvent::Submit => self.on_submit(),
            UploadEvent::Retry => self.on_retry(),
            UploadEvent::Responded { generation, outcome } => {
                if !self.accepts(generation, UploadStatus::Uploading) {
                    return self.clone();
                }
                self.on_response(outcome)
            }
            UploadEvent::Polled {
                generation,
                snapshot,
            } => {
                if !self.accepts(generation, UploadStatus::Processing) {
                    return self.clone();
                }
                self.on_poll(snapshot)
            }
            UploadEvent::PollFailed { generation, reason } => {
                if self.accepts(generation, UploadStatus::Processing) {
                    tracing::warn!(
                        batch_id = ?self.batch_id,
                        "status poll failed, batch state still unknown: {reason}"
                    );
                }
                self.clone()
            }
        }
    }

    pub fn can_submit(&self) -> bool {
        !self.status.is_busy()
    }

    fn accepts(&self, generation: u64, expected: UploadStatus) -> bool {
        if generation != self.generation {
            tracing::debug!(
                stale = generation,
                current = self.generation,
                "ignoring event from a previous upload attempt"
            );
            return false;
        }
        self.status == expected
    }

    fn on_submit(&self) -> Self {
        if !self.can_submit() {
            tracing::debug!(status = %self.status, "submit ignored while an upload is in flight");
            return self.clone();
        }
        Self {
            generation: self.generation + 1,
            attempt_id: Some(Uuid::new_v4()),
            status: UploadStatus::Uploading,
            ..Self::default()
        }
    }

    fn on_retry(&self) -> Self {
        Self {
            generation: self.generation + 1,
            ..Self::default()
        }
    }

    fn on_response(&self, outcome: UploadOutcome) -> Self {
        match outcome {
            UploadOutcome::Accepted { batch_id, result } => Self {
                status: UploadStatus::Processing,
                batch_id: Some(batch_id),
                errors: Vec::new(),
                result,
                ..self.clone()
            },
            UploadOutcome::Rejected {
                errors,
                result,
                status_code,
            } => Self {
                status: UploadStatus::Error,
                batch_id: None,
                errors,
                result,
                response_status_code: status_code,
                ..self.clone()
            },
        }
    }

    fn on_poll(&self, snapshot: BatchSnapshot) -> Self {
        let BatchSnapshot { batch, raw: result } = snapshot;
        match batch.status {
            BatchStatus::Complete => Self {
                status: UploadStatus::Complete,
                result,
                ..self.clone()
            },
            BatchStatus::Error => Self {
                status: UploadStatus::Error,
                errors: vec![
                    batch
                        .failure_reason()
                        .unwrap_or(BATCH_FAILED_MESSAGE)
                        .to_string(),
                ],
                result,
                ..self.clone()
            },
            BatchStatus::Processing | BatchStatus::Other => Self {
                result,
                ..self.clone()
            },
        }
    }
}
