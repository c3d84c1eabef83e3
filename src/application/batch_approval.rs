//! Reviewer approval of completed batches
//!
//! Approval is one-way and only allowed for a `complete` batch that has no
//! `approved_at` yet. Requests are tracked per batch id, so one batch being
//! approved never blocks another. After a successful approval the history
//! is refetched rather than patched, so `approved_at` always comes from the
//! server.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

use thiserror::Error;
use tracing::{info, warn};

use crate::application::batch_history::BatchHistory;
use crate::domain::batch::{Batch, BatchStatus};
use crate::domain::repositories::BulkUploadApi;
use crate::infrastructure::upload_error::BulkUploadError;

#[derive(Error, Debug)]
pub enum ApprovalError {
    #[error("Batch {batch_id} is {status}; only complete batches can be approved")]
    NotComplete { batch_id: String, status: BatchStatus },

    #[error("Batch {batch_id} was already approved at {approved_at}")]
    AlreadyApproved { batch_id: String, approved_at: String },

    #[error("A reviewer name is required to approve a batch")]
    MissingReviewer,

    #[error("Approval of batch {batch_id} is already in progress")]
    InFlight { batch_id: String },

    #[error("Approval of batch {batch_id} failed: {source}")]
    Request {
        batch_id: String,
        #[source]
        source: BulkUploadError,
    },
}

pub struct BatchApprovals<A: BulkUploadApi> {
    api: Arc<A>,
    history: Arc<BatchHistory<A>>,
    in_flight: Mutex<HashSet<String>>,
}

/// Removes the batch id from the in-flight set when the request ends, however it ends
struct InFlightGuard<'a> {
    in_flight: &'a Mutex<HashSet<String>>,
    batch_id: String,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.batch_id);
    }
}

impl<A: BulkUploadApi> BatchApprovals<A> {
    pub fn new(api: Arc<A>, history: Arc<BatchHistory<A>>) -> Self {
        Self {
            api,
            history,
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    pub fn is_in_flight(&self, batch_id: &str) -> bool {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(batch_id)
    }

    /// Whether the approve action should be offered for `batch`.
    pub fn can_approve(&self, batch: &Batch) -> bool {
        batch.is_approvable() && !self.is_in_flight(&batch.batch_id)
    }

    /// Approve `batch` as `reviewer` and return the refetched history.
    ///
    /// On failure the history is left untouched.
    pub async fn approve(&self, batch: &Batch, reviewer: Option<&str>) -> Result<Vec<Batch>, ApprovalError> {
        let reviewer = reviewer
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .ok_or(ApprovalError::MissingReviewer)?;

        if let Some(approved_at) = &batch.approved_at {
            return Err(ApprovalError::AlreadyApproved {
                batch_id: batch.batch_id.clone(),
                approved_at: approved_at.clone(),
            });
        }
        if batch.status != BatchStatus::Complete {
            return Err(ApprovalError::NotComplete {
                batch_id: batch.batch_id.clone(),
                status: batch.status.clone(),
            });
        }

        let _guard = self.begin(&batch.batch_id)?;

        self.api
            .approve(&batch.batch_id, reviewer)
            .await
            .map_err(|source| {
                warn!("❌ Approval of batch {} failed: {}", batch.batch_id, source);
                ApprovalError::Request {
                    batch_id: batch.batch_id.clone(),
                    source,
                }
            })?;
        info!("✅ Batch {} approved by {}", batch.batch_id, reviewer);

        match self.history.refresh().await {
            Ok(batches) => Ok(batches),
            Err(e) => {
                warn!("Batch history refresh after approval failed: {}", e);
                Ok(self.history.batches().await)
            }
        }
    }

    fn begin(&self, batch_id: &str) -> Result<InFlightGuard<'_>, ApprovalError> {
        let inserted = self
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(batch_id.to_string());
        if !inserted {
            return Err(ApprovalError::InFlight {
                batch_id: batch_id.to_string(),
            });
        }
        Ok(InFlightGuard {
            in_flight: &self.in_flight,
            batch_id: batch_id.to_string(),
        })
    }
}
