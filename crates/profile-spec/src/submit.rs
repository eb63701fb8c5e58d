use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::notify::{NoticeKind, NotificationSink};
use crate::report::FieldError;
use crate::template::{NoticeKey, TemplateEngine};
use crate::upload::FileMeta;

/// Whether a save is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionState {
    #[default]
    Ready,
    InFlight,
}

/// Everything handed to the backend on save.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Submission {
    pub form_id: String,
    pub values: Map<String, Value>,
    /// Uploaded slots only, keyed by slot id.
    #[serde(default)]
    pub attachments: BTreeMap<String, FileMeta>,
}

impl Submission {
    pub fn to_cbor(&self) -> Result<Vec<u8>, serde_cbor::Error> {
        serde_cbor::to_vec(self)
    }

    pub fn from_cbor(bytes: &[u8]) -> Result<Self, serde_cbor::Error> {
        serde_cbor::from_slice(bytes)
    }

    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// Acknowledgement returned by a successful save.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaveReceipt {
    pub form_id: String,
    pub revision: u64,
    pub field_count: usize,
    pub attachment_count: usize,
    pub saved_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{reason}")]
pub struct BackendError {
    pub reason: String,
}

impl BackendError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubmitError {
    #[error("submission blocked by {} invalid field(s)", .0.len())]
    Invalid(Vec<FieldError>),
    #[error("a save is already in flight")]
    InFlight,
    #[error("save failed: {0}")]
    Backend(#[from] BackendError),
}

/// Where submissions are persisted.
#[async_trait]
pub trait ProfileBackend: Send + Sync {
    async fn save(&self, submission: &Submission) -> Result<SaveReceipt, BackendError>;
}

/// Waits a fixed delay, then acknowledges with an increasing revision.
#[derive(Debug)]
pub struct SimulatedBackend {
    delay: Duration,
    revision: AtomicU64,
}

impl SimulatedBackend {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            revision: AtomicU64::new(0),
        }
    }
}

#[async_trait]
impl ProfileBackend for SimulatedBackend {
    async fn save(&self, submission: &Submission) -> Result<SaveReceipt, BackendError> {
        tokio::time::sleep(self.delay).await;
        let revision = self.revision.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(SaveReceipt {
            form_id: submission.form_id.clone(),
            revision,
            field_count: submission.values.len(),
            attachment_count: submission.attachments.len(),
            saved_at: Utc::now(),
        })
    }
}

/// Runs saves one at a time. Clones share the same in-flight flag.
#[derive(Clone)]
pub struct SubmitCoordinator {
    inner: Arc<CoordinatorInner>,
}

struct CoordinatorInner {
    state: watch::Sender<SubmissionState>,
    backend: Arc<dyn ProfileBackend>,
    sink: Arc<dyn NotificationSink>,
    templates: Arc<TemplateEngine>,
}

impl std::fmt::Debug for SubmitCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubmitCoordinator")
            .field("state", &self.state())
            .finish()
    }
}

impl SubmitCoordinator {
    pub fn new(
        backend: Arc<dyn ProfileBackend>,
        sink: Arc<dyn NotificationSink>,
        templates: Arc<TemplateEngine>,
    ) -> Self {
        Self {
            inner: Arc::new(CoordinatorInner {
                state: watch::Sender::new(SubmissionState::Ready),
                backend,
                sink,
                templates,
            }),
        }
    }

    pub fn state(&self) -> SubmissionState {
        *self.inner.state.borrow()
    }

    pub fn is_in_flight(&self) -> bool {
        self.state() == SubmissionState::InFlight
    }

    pub fn subscribe(&self) -> watch::Receiver<SubmissionState> {
        self.inner.state.subscribe()
    }

    /// Saves `submission`; rejected while another save is in flight.
    pub async fn save(&self, submission: &Submission) -> Result<SaveReceipt, SubmitError> {
        let outcome = {
            let _in_flight = self.begin()?;
            debug!(form = %submission.form_id, "save started");
            self.inner.backend.save(submission).await
        };

        match outcome {
            Ok(receipt) => {
                info!(form = %receipt.form_id, revision = receipt.revision, "save completed");
                self.notify(NoticeKey::SaveSucceeded, NoticeKind::Success, json!({}));
                Ok(receipt)
            }
            Err(err) => {
                warn!(form = %submission.form_id, reason = %err.reason, "save failed");
                self.notify(
                    NoticeKey::SaveFailed,
                    NoticeKind::Error,
                    json!({ "reason": err.reason }),
                );
                Err(err.into())
            }
        }
    }

    fn begin(&self) -> Result<InFlightGuard<'_>, SubmitError> {
        let started = self.inner.state.send_if_modified(|state| match state {
            SubmissionState::Ready => {
                *state = SubmissionState::InFlight;
                true
            }
            SubmissionState::InFlight => false,
        });
        if started {
            Ok(InFlightGuard {
                state: &self.inner.state,
            })
        } else {
            debug!("save rejected; another save is in flight");
            Err(SubmitError::InFlight)
        }
    }

    fn notify(&self, key: NoticeKey, kind: NoticeKind, data: Value) {
        let message = self.inner.templates.render_lossy(key, &data);
        self.inner.sink.display(&message, kind);
    }
}

/// Returns the coordinator to `Ready` on completion, failure or drop.
struct InFlightGuard<'a> {
    state: &'a watch::Sender<SubmissionState>,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.state.send_replace(SubmissionState::Ready);
    }
}
