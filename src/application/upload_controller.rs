//! Async driver for the upload state machine
//!
//! [`UploadController`] owns the single active [`UploadSession`], runs the
//! upload request, and schedules the one delayed status poll that follows an
//! accepted upload. Every change is published on a `watch` channel so a UI or
//! CLI can render the latest session without holding the lock.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{RwLock, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::domain::repositories::BulkUploadApi;
use crate::domain::upload_file::UploadFile;
use crate::domain::upload_outcome::{UploadOutcome, synthesize_failure};
use crate::domain::upload_session::{UploadEvent, UploadSession, UploadStatus};
use crate::domain::vendor_context::VendorContext;
use crate::infrastructure::config::UploadConfig;
use crate::infrastructure::upload_error::BulkUploadError;

#[derive(Debug, Clone)]
pub struct UploadControllerConfig {
    /// Delay before the single follow-up status poll
    pub poll_delay: Duration,
    pub accepted_extensions: Vec<String>,
}

impl UploadControllerConfig {
    pub fn from_upload_config(upload: &UploadConfig) -> Self {
        Self {
            poll_delay: upload.poll_delay(),
            accepted_extensions: upload.accepted_extensions.clone(),
        }
    }
}

impl Default for UploadControllerConfig {
    fn default() -> Self {
        Self::from_upload_config(&UploadConfig::default())
    }
}

struct PollTask {
    generation: u64,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

struct ControllerState {
    session: UploadSession,
    /// Bumped by exactly one on every retry so the file picker can clear itself
    file_clear_signal: u64,
    poll: Option<PollTask>,
}

struct Shared {
    state: RwLock<ControllerState>,
    updates: watch::Sender<UploadSession>,
}

impl Shared {
    /// Apply `event` and publish the new session if anything changed.
    async fn transition(&self, event: UploadEvent) -> UploadSession {
        let mut state = self.state.write().await;
        self.transition_locked(&mut state, event)
    }

    fn transition_locked(&self, state: &mut ControllerState, event: UploadEvent) -> UploadSession {
        let next = state.session.apply(event);
        if next != state.session {
            debug!(
                generation = next.generation,
                "upload session {} → {}",
                state.session.status,
                next.status
            );
            state.session = next.clone();
            self.updates.send_replace(next.clone());
        }
        next
    }
}

/// Owner of the active upload session
pub struct UploadController<A: BulkUploadApi + 'static> {
    api: Arc<A>,
    shared: Arc<Shared>,
    config: UploadControllerConfig,
    shutdown: CancellationToken,
}

impl<A: BulkUploadApi + 'static> UploadController<A> {
    pub fn new(api: Arc<A>, config: UploadControllerConfig) -> Self {
        let session = UploadSession::new();
        let (updates, _) = watch::channel(session.clone());
        Self {
            api,
            shared: Arc::new(Shared {
                state: RwLock::new(ControllerState {
                    session,
                    file_clear_signal: 0,
                    poll: None,
                }),
                updates,
            }),
            config,
            shutdown: CancellationToken::new(),
        }
    }

    pub async fn session(&self) -> UploadSession {
        self.shared.state.read().await.session.clone()
    }

    pub async fn file_clear_signal(&self) -> u64 {
        self.shared.state.read().await.file_clear_signal
    }

    /// Receiver that always holds the latest session
    pub fn subscribe(&self) -> watch::Receiver<UploadSession> {
        self.shared.updates.subscribe()
    }

    /// Whether the submit action should be enabled for `context`.
    pub async fn can_submit(&self, context: &VendorContext) -> bool {
        context.upload_enabled() && self.session().await.can_submit()
    }

    /// Upload `file` for the vendor/store in `context`.
    ///
    /// Transport and server rejections are not returned as `Err`: they land
    /// in the returned session as `status = error`. `Err` means nothing was
    /// sent, either because no store is selected or because an upload is
    /// already in flight.
    pub async fn submit(
        &self,
        file: UploadFile,
        context: &VendorContext,
    ) -> Result<UploadSession, BulkUploadError> {
        let (vendor_id, store_id) = context.scope()?;
        file.check_accepted(&self.config.accepted_extensions);

        let session = {
            let mut state = self.shared.state.write().await;
            if state.session.status.is_busy() {
                return Err(BulkUploadError::UploadInProgress {
                    status: state.session.status.to_string(),
                });
            }
            cancel_poll(&mut state);
            self.shared.transition_locked(&mut state, UploadEvent::Submit)
        };
        let generation = session.generation;

        info!(
            attempt_id = ?session.attempt_id,
            "📤 Submitting {} for vendor {} / store {}",
            file.file_name,
            vendor_id,
            store_id
        );

        let outcome = match self.api.submit(&file, vendor_id, store_id).await {
            Ok(raw) => UploadOutcome::from_response(raw, None),
            Err(e) => {
                if matches!(e, BulkUploadError::Network { .. }) {
                    error!(attempt_id = ?session.attempt_id, "Upload request failed: {}", e);
                } else {
                    warn!(attempt_id = ?session.attempt_id, "Upload rejected: {}", e);
                }
                let synthetic = synthesize_failure(e.response_body(), e.display_message().as_deref());
                UploadOutcome::from_response(synthetic, e.status_code())
            }
        };

        let mut state = self.shared.state.write().await;
        let session = self
            .shared
            .transition_locked(&mut state, UploadEvent::Responded { generation, outcome });

        match (&session.status, &session.batch_id) {
            (UploadStatus::Processing, Some(batch_id)) if session.generation == generation => {
                info!("📦 Batch {} accepted, status check in {:?}", batch_id, self.config.poll_delay);
                state.poll = Some(self.spawn_poll(generation, batch_id.clone()));
            }
            (UploadStatus::Error, _) => {
                info!(errors = ?session.errors, "Upload ended in error");
            }
            _ => {}
        }

        Ok(session)
    }

    /// Wait for the scheduled status poll, if any, to finish.
    pub async fn wait_for_poll(&self) -> UploadSession {
        let task = self.shared.state.write().await.poll.take();
        if let Some(task) = task {
            if let Err(e) = task.handle.await {
                if !e.is_cancelled() {
                    error!("Status poll task failed: {}", e);
                }
            }
        }
        self.session().await
    }

    /// Poll the batch status once more.
    ///
    /// Only meaningful while `processing`; in any other status the current
    /// session is returned unchanged.
    pub async fn refresh(&self) -> Result<UploadSession, BulkUploadError> {
        let session = self.session().await;
        let batch_id = match (&session.status, &session.batch_id) {
            (UploadStatus::Processing, Some(batch_id)) => batch_id.clone(),
            _ => {
                debug!(status = %session.status, "refresh ignored, no batch in processing");
                return Ok(session);
            }
        };

        match self.api.fetch_status(&batch_id).await {
            Ok(snapshot) => Ok(self
                .shared
                .transition(UploadEvent::Polled {
                    generation: session.generation,
                    snapshot,
                })
                .await),
            Err(e) => {
                self.shared
                    .transition(UploadEvent::PollFailed {
                        generation: session.generation,
                        reason: e.to_string(),
                    })
                    .await;
                Err(e)
            }
        }
    }

    /// Reset to `idle` for a new upload, cancelling any pending poll.
    pub async fn retry(&self) -> UploadSession {
        let mut state = self.shared.state.write().await;
        cancel_poll(&mut state);
        state.file_clear_signal += 1;
        let session = self.shared.transition_locked(&mut state, UploadEvent::Retry);
        info!(generation = session.generation, "🔄 Upload session reset");
        session
    }

    fn spawn_poll(&self, generation: u64, batch_id: String) -> PollTask {
        let cancel = self.shutdown.child_token();
        let token = cancel.clone();
        let api = Arc::clone(&self.api);
        let shared = Arc::clone(&self.shared);
        let delay = self.config.poll_delay;

        let handle = tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {
                    debug!(generation, "status poll for {} cancelled", batch_id);
                }
                _ = async {
                    tokio::time::sleep(delay).await;
                    let event = match api.fetch_status(&batch_id).await {
                        Ok(snapshot) => UploadEvent::Polled { generation, snapshot },
                        Err(e) => UploadEvent::PollFailed {
                            generation,
                            reason: e.to_string(),
                        },
                    };
                    shared.transition(event).await;
                } => {}
            }
        });

        PollTask {
            generation,
            cancel,
            handle,
        }
    }
}

fn cancel_poll(state: &mut ControllerState) {
    if let Some(task) = state.poll.take() {
        debug!(generation = task.generation, "cancelling pending status poll");
        task.cancel.cancel();
    }
}

impl<A: BulkUploadApi + 'static> Drop for UploadController<A> {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::batch::{Batch, BatchSnapshot, BatchStatus};
    use async_trait::async_trait;
    use serde_json::{Value, json};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// In-process backend with canned responses
    struct FakeApi {
        submit_response: Mutex<Option<Result<Value, BulkUploadError>>>,
        status: Mutex<BatchStatus>,
        status_calls: AtomicUsize,
    }

    impl FakeApi {
        fn accepting(batch_id: &str, status: BatchStatus) -> Self {
            Self {
                submit_response: Mutex::new(Some(Ok(json!({ "batch_id": batch_id })))),
                status: Mutex::new(status),
                status_calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl BulkUploadApi for FakeApi {
        async fn submit(&self, _: &UploadFile, _: &str, _: &str) -> Result<Value, BulkUploadError> {
            self.submit_response
                .lock()
                .unwrap()
                .take()
                .unwrap_or_else(|| Ok(json!({ "batch_id": "again" })))
        }

        async fn fetch_status(&self, batch_id: &str) -> Result<BatchSnapshot, BulkUploadError> {
            self.status_calls.fetch_add(1, Ordering::SeqCst);
            let status = self.status.lock().unwrap().clone();
            let raw = json!({ "batch_id": batch_id, "status": status.as_str() });
            Ok(BatchSnapshot::from_raw(raw, batch_id).unwrap())
        }

        async fn list_batches(&self, _: &str, _: &str) -> Result<Vec<Batch>, BulkUploadError> {
            Ok(Vec::new())
        }

        async fn approve(&self, _: &str, _: &str) -> Result<(), BulkUploadError> {
            Ok(())
        }

        async fn download_template(&self) -> Result<String, BulkUploadError> {
            Ok(String::new())
        }
    }

    fn controller(api: FakeApi, poll_delay: Duration) -> (Arc<FakeApi>, UploadController<FakeApi>) {
        let api = Arc::new(api);
        let config = UploadControllerConfig {
            poll_delay,
            accepted_extensions: vec![".csv".to_string()],
        };
        (Arc::clone(&api), UploadController::new(api, config))
    }

    fn csv() -> UploadFile {
        UploadFile::from_bytes("products.csv", b"sku,name\nA1,Lamp\n".to_vec())
    }

    fn context() -> VendorContext {
        VendorContext::with_store("v1", "s1")
    }

    #[tokio::test]
    async fn test_missing_store_sends_nothing() {
        let (api, controller) = controller(FakeApi::accepting("b1", BatchStatus::Complete), Duration::ZERO);
        let err = controller
            .submit(csv(), &VendorContext::new("v1", None))
            .await
            .unwrap_err();

        assert!(matches!(err, BulkUploadError::MissingStore { .. }));
        assert_eq!(controller.session().await.status, UploadStatus::Idle);
        assert!(api.submit_response.lock().unwrap().is_some());
    }

    #[tokio::test]
    async fn test_single_poll_reaches_complete() {
        let (api, controller) = controller(FakeApi::accepting("b1", BatchStatus::Complete), Duration::from_millis(10));
        let session = controller.submit(csv(), &context()).await.unwrap();
        assert_eq!(session.status, UploadStatus::Processing);

        let session = controller.wait_for_poll().await;
        assert_eq!(session.status, UploadStatus::Complete);
        assert_eq!(api.status_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_submit_blocked_while_processing() {
        let (_api, controller) = controller(FakeApi::accepting("b1", BatchStatus::Processing), Duration::from_secs(60));
        controller.submit(csv(), &context()).await.unwrap();

        let err = controller.submit(csv(), &context()).await.unwrap_err();
        assert!(matches!(err, BulkUploadError::UploadInProgress { .. }));
        assert!(!controller.can_submit(&context()).await);
    }

    #[tokio::test]
    async fn test_retry_cancels_pending_poll() {
        let (api, controller) = controller(FakeApi::accepting("b1", BatchStatus::Complete), Duration::from_millis(50));
        controller.submit(csv(), &context()).await.unwrap();

        let session = controller.retry().await;
        assert_eq!(session.status, UploadStatus::Idle);
        assert_eq!(controller.file_clear_signal().await, 1);

        tokio::time::sleep(Duration::from_millis(120)).await;
        assert_eq!(controller.session().await.status, UploadStatus::Idle);
        assert_eq!(api.status_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_subscribers_see_latest_session() {
        let (_api, controller) = controller(FakeApi::accepting("b1", BatchStatus::Processing), Duration::from_secs(60));
        let receiver = controller.subscribe();
        controller.submit(csv(), &context()).await.unwrap();

        assert_eq!(receiver.borrow().status, UploadStatus::Processing);
        assert_eq!(receiver.borrow().batch_id.as_deref(), Some("b1"));
    }
}
