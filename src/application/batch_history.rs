//! Batch history for the selected vendor/store
//!
//! The list is a read-only mirror of the server. It is refetched when the
//! vendor/store pair changes, on explicit refresh, and after an approval.
//!
//! Every fetch is numbered. A response is applied only if no newer fetch or
//! selection started while it was in flight, so a slow answer for a previous
//! store never replaces the list of the store selected last.

use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::domain::batch::Batch;
use crate::domain::repositories::BulkUploadApi;
use crate::domain::vendor_context::VendorContext;
use crate::infrastructure::upload_error::BulkUploadError;

#[derive(Debug, Default)]
struct HistoryState {
    /// `(vendor_id, store_id)` the list belongs to
    scope: Option<(String, String)>,
    batches: Vec<Batch>,
    /// Most recent selection, possibly still loading
    selected: Option<(String, String)>,
    /// Bumped by every fetch and selection change
    request: u64,
}

impl HistoryState {
    fn holds(&self, vendor_id: &str, store_id: &str) -> bool {
        self.scope
            .as_ref()
            .is_some_and(|(vendor, store)| vendor == vendor_id && store == store_id)
    }
}

pub struct BatchHistory<A: BulkUploadApi> {
    api: Arc<A>,
    state: RwLock<HistoryState>,
}

impl<A: BulkUploadApi> BatchHistory<A> {
    pub fn new(api: Arc<A>) -> Self {
        Self {
            api,
            state: RwLock::new(HistoryState::default()),
        }
    }

    /// Switch to `context`, refetching only if the vendor/store pair changed.
    ///
    /// A context without a store clears the list.
    pub async fn select_context(&self, context: &VendorContext) -> Result<Vec<Batch>, BulkUploadError> {
        let Ok((vendor_id, store_id)) = context.scope() else {
            let mut state = self.state.write().await;
            if state.scope.take().is_some() {
                debug!("vendor context has no store, clearing batch history");
            }
            state.batches.clear();
            state.selected = None;
            state.request += 1;
            return Ok(Vec::new());
        };

        {
            let mut state = self.state.write().await;
            if state.holds(vendor_id, store_id) {
                if state.selected != state.scope {
                    // Back to the loaded store while another one was loading
                    state.selected = state.scope.clone();
                    state.request += 1;
                }
                return Ok(state.batches.clone());
            }
        }

        self.fetch(vendor_id, store_id).await
    }

    /// Refetch the list for the most recently selected vendor/store.
    pub async fn refresh(&self) -> Result<Vec<Batch>, BulkUploadError> {
        let scope = self.state.read().await.selected.clone();
        match scope {
            Some((vendor_id, store_id)) => self.fetch(&vendor_id, &store_id).await,
            None => Ok(Vec::new()),
        }
    }

    pub async fn batches(&self) -> Vec<Batch> {
        self.state.read().await.batches.clone()
    }

    pub async fn find(&self, batch_id: &str) -> Option<Batch> {
        self.state
            .read()
            .await
            .batches
            .iter()
            .find(|batch| batch.batch_id == batch_id)
            .cloned()
    }

    /// Fetch and store the list for one vendor/store.
    ///
    /// When a newer fetch or selection started meanwhile, the response is
    /// dropped and the list currently held is returned instead.
    async fn fetch(&self, vendor_id: &str, store_id: &str) -> Result<Vec<Batch>, BulkUploadError> {
        let scope = (vendor_id.to_string(), store_id.to_string());
        let request = {
            let mut state = self.state.write().await;
            state.request += 1;
            state.selected = Some(scope.clone());
            state.request
        };

        let batches = self.api.list_batches(vendor_id, store_id).await?;

        let mut state = self.state.write().await;
        if state.request != request {
            debug!(
                request,
                current = state.request,
                "discarding stale batch list for vendor {} / store {}",
                vendor_id,
                store_id
            );
            return Ok(state.batches.clone());
        }
        info!("📋 Loaded {} batches for vendor {} / store {}", batches.len(), vendor_id, store_id);
        state.scope = Some(scope);
        state.batches = batches.clone();
        Ok(batches)
    }
}
