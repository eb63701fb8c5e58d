use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use globset::GlobSet;
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::config::FormConfig;
use crate::notify::{NoticeKind, NotificationSink};
use crate::spec::attachment::{SlotKind, SlotSpec};
use crate::spec::form::SpecError;
use crate::template::{NoticeKey, TemplateEngine, format_bytes};

/// A file handed over by the file picker. Contents are never read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectedFile {
    pub name: String,
    pub size: u64,
    pub mime: String,
}

impl SelectedFile {
    pub fn new(name: impl Into<String>, size: u64, mime: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            size,
            mime: mime.into(),
        }
    }
}

/// Coarse MIME grouping used by views.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MimeCategory {
    Image,
    Pdf,
    Other,
}

impl MimeCategory {
    pub fn of(mime: &str) -> Self {
        let mime = mime.to_ascii_lowercase();
        if mime.starts_with("image/") {
            MimeCategory::Image
        } else if mime == "application/pdf" {
            MimeCategory::Pdf
        } else {
            MimeCategory::Other
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileOrigin {
    Selected,
    Preset,
}

/// Metadata of the file attached to an uploaded slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMeta {
    pub name: String,
    pub size: u64,
    pub mime: String,
    pub category: MimeCategory,
    pub origin: FileOrigin,
}

impl FileMeta {
    fn selected(file: &SelectedFile) -> Self {
        Self {
            name: file.name.clone(),
            size: file.size,
            mime: file.mime.clone(),
            category: MimeCategory::of(&file.mime),
            origin: FileOrigin::Selected,
        }
    }

    fn preset(id: &str) -> Self {
        Self {
            name: id.to_string(),
            size: 0,
            mime: "image/*".into(),
            category: MimeCategory::Image,
            origin: FileOrigin::Preset,
        }
    }
}

/// Lifecycle of one upload widget. Only `Uploaded` carries file metadata.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SlotState {
    #[default]
    Idle,
    Uploading,
    Uploaded(FileMeta),
    Failed(String),
}

impl SlotState {
    pub fn attachment(&self) -> Option<&FileMeta> {
        match self {
            SlotState::Uploaded(file) => Some(file),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SlotState::Idle => "idle",
            SlotState::Uploading => "uploading",
            SlotState::Uploaded(_) => "uploaded",
            SlotState::Failed(_) => "failed",
        }
    }
}

/// Pre-flight rejection; the slot keeps its state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConstraintViolation {
    #[error("{name} is {size} bytes, above the {max} byte limit")]
    TooLarge { name: String, size: u64, max: u64 },
    #[error("{name} ({mime}) is not an accepted file type")]
    UnsupportedType { name: String, mime: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{reason}")]
pub struct UploadError {
    pub reason: String,
}

impl UploadError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SlotError {
    #[error(transparent)]
    Constraint(#[from] ConstraintViolation),
    #[error("slot '{0}' is busy uploading")]
    Busy(String),
    #[error("upload failed: {0}")]
    Upload(#[from] UploadError),
    #[error("unknown preset avatar '{0}'")]
    UnknownPreset(String),
}

/// Moves a selected file to wherever attachments live.
#[async_trait]
pub trait Uploader: Send + Sync {
    async fn upload(&self, slot: &SlotSpec, file: &FileMeta) -> Result<(), UploadError>;
}

/// Waits a fixed delay per slot kind, then succeeds.
#[derive(Debug, Clone)]
pub struct SimulatedUploader {
    document_delay: Duration,
    avatar_delay: Duration,
}

impl SimulatedUploader {
    pub fn new(document_delay: Duration, avatar_delay: Duration) -> Self {
        Self {
            document_delay,
            avatar_delay,
        }
    }

    pub fn from_config(config: &FormConfig) -> Self {
        Self::new(
            config.upload_delay(SlotKind::Document),
            config.upload_delay(SlotKind::Avatar),
        )
    }
}

#[async_trait]
impl Uploader for SimulatedUploader {
    async fn upload(&self, slot: &SlotSpec, _file: &FileMeta) -> Result<(), UploadError> {
        let delay = match slot.kind {
            SlotKind::Avatar => self.avatar_delay,
            SlotKind::Document => self.document_delay,
        };
        tokio::time::sleep(delay).await;
        Ok(())
    }
}

/// One attachment widget and its own state machine.
///
/// State lives in a watch channel so views can follow transitions; the
/// channel is never borrowed across an await point.
pub struct UploadSlot {
    spec: SlotSpec,
    accept: GlobSet,
    state: watch::Sender<SlotState>,
    uploader: Arc<dyn Uploader>,
    sink: Arc<dyn NotificationSink>,
    templates: Arc<TemplateEngine>,
}

impl std::fmt::Debug for UploadSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UploadSlot")
            .field("id", &self.spec.id)
            .field("state", &*self.state.borrow())
            .finish()
    }
}

impl UploadSlot {
    pub fn new(
        spec: SlotSpec,
        uploader: Arc<dyn Uploader>,
        sink: Arc<dyn NotificationSink>,
        templates: Arc<TemplateEngine>,
    ) -> Result<Self, SpecError> {
        let accept = spec
            .policy
            .accept_set()
            .map_err(|source| SpecError::InvalidAccept {
                slot: spec.id.clone(),
                source,
            })?;
        Ok(Self {
            spec,
            accept,
            state: watch::Sender::new(SlotState::Idle),
            uploader,
            sink,
            templates,
        })
    }

    pub fn id(&self) -> &str {
        &self.spec.id
    }

    pub fn spec(&self) -> &SlotSpec {
        &self.spec
    }

    pub fn state(&self) -> SlotState {
        self.state.borrow().clone()
    }

    pub fn attachment(&self) -> Option<FileMeta> {
        self.state.borrow().attachment().cloned()
    }

    pub fn is_uploading(&self) -> bool {
        matches!(*self.state.borrow(), SlotState::Uploading)
    }

    pub fn subscribe(&self) -> watch::Receiver<SlotState> {
        self.state.subscribe()
    }

    /// Size and type checks done before any upload starts.
    pub fn preflight(&self, file: &SelectedFile) -> Result<(), ConstraintViolation> {
        if let Some(max) = self.spec.policy.max_bytes
            && file.size > max
        {
            return Err(ConstraintViolation::TooLarge {
                name: file.name.clone(),
                size: file.size,
                max,
            });
        }

        if !self.spec.policy.accept.is_empty()
            && !self.accept.is_match(&file.mime)
            && !self.accept.is_match(&file.name)
        {
            return Err(ConstraintViolation::UnsupportedType {
                name: file.name.clone(),
                mime: file.mime.clone(),
            });
        }

        Ok(())
    }

    /// Starts an upload of `file` and waits for its single completion.
    ///
    /// Dropping the returned future before completion puts the slot back
    /// in the state it had before the call.
    pub async fn select(&self, file: SelectedFile) -> Result<FileMeta, SlotError> {
        if self.is_uploading() {
            return Err(SlotError::Busy(self.spec.id.clone()));
        }

        if let Err(violation) = self.preflight(&file) {
            warn!(
                slot = %self.spec.id,
                file = %file.name,
                %violation,
                "file rejected before upload"
            );
            self.notify_violation(&violation);
            return Err(violation.into());
        }

        let pending = self.begin()?;
        let meta = FileMeta::selected(&file);
        debug!(slot = %self.spec.id, file = %meta.name, size = meta.size, "upload started");

        match self.uploader.upload(&self.spec, &meta).await {
            Ok(()) => {
                pending.finish(SlotState::Uploaded(meta.clone()));
                info!(slot = %self.spec.id, file = %meta.name, "upload completed");
                let key = match self.spec.kind {
                    SlotKind::Avatar => NoticeKey::AvatarUpdated,
                    SlotKind::Document => NoticeKey::UploadSucceeded,
                };
                self.notify(key, NoticeKind::Success, json!({ "label": self.spec.label }));
                Ok(meta)
            }
            Err(err) => {
                pending.finish(SlotState::Failed(err.reason.clone()));
                warn!(
                    slot = %self.spec.id,
                    file = %meta.name,
                    reason = %err.reason,
                    "upload failed"
                );
                self.notify(
                    NoticeKey::UploadFailed,
                    NoticeKind::Error,
                    json!({ "label": self.spec.label, "reason": err.reason }),
                );
                Err(err.into())
            }
        }
    }

    /// Attaches a built-in avatar without an upload round-trip.
    pub fn choose_preset(&self, preset: &str) -> Result<FileMeta, SlotError> {
        if !self.spec.policy.presets.iter().any(|id| id == preset) {
            return Err(SlotError::UnknownPreset(preset.to_string()));
        }

        let meta = FileMeta::preset(preset);
        let attached = self.state.send_if_modified(|state| {
            if matches!(state, SlotState::Uploading) {
                return false;
            }
            *state = SlotState::Uploaded(meta.clone());
            true
        });
        if !attached {
            return Err(SlotError::Busy(self.spec.id.clone()));
        }

        info!(slot = %self.spec.id, preset, "preset attached");
        self.notify(
            NoticeKey::AvatarUpdated,
            NoticeKind::Success,
            json!({ "label": self.spec.label }),
        );
        Ok(meta)
    }

    /// Clears the slot. Returns whether the state changed.
    pub fn remove(&self) -> Result<bool, SlotError> {
        let mut previous = None;
        self.state.send_if_modified(|state| match state {
            SlotState::Uploading | SlotState::Idle => {
                previous = Some(state.clone());
                false
            }
            SlotState::Uploaded(_) | SlotState::Failed(_) => {
                previous = Some(std::mem::replace(state, SlotState::Idle));
                true
            }
        });

        match previous {
            Some(SlotState::Uploading) => Err(SlotError::Busy(self.spec.id.clone())),
            Some(SlotState::Failed(_)) => {
                debug!(slot = %self.spec.id, "failed upload cleared");
                Ok(true)
            }
            Some(SlotState::Uploaded(file)) => {
                info!(slot = %self.spec.id, file = %file.name, "attachment removed");
                self.notify(
                    NoticeKey::Removed,
                    NoticeKind::Success,
                    json!({ "label": self.spec.label }),
                );
                Ok(true)
            }
            Some(SlotState::Idle) | None => Ok(false),
        }
    }

    fn begin(&self) -> Result<PendingUpload<'_>, SlotError> {
        let mut previous = None;
        self.state.send_if_modified(|state| {
            if matches!(state, SlotState::Uploading) {
                return false;
            }
            previous = Some(std::mem::replace(state, SlotState::Uploading));
            true
        });
        match previous {
            Some(previous) => Ok(PendingUpload {
                state: &self.state,
                previous: Some(previous),
            }),
            None => Err(SlotError::Busy(self.spec.id.clone())),
        }
    }

    fn notify_violation(&self, violation: &ConstraintViolation) {
        let (key, data) = match violation {
            ConstraintViolation::TooLarge { name, max, .. } => (
                NoticeKey::TooLarge,
                json!({ "label": self.spec.label, "file": name, "limit": format_bytes(*max) }),
            ),
            ConstraintViolation::UnsupportedType { name, mime } => (
                NoticeKey::UnsupportedType,
                json!({ "label": self.spec.label, "file": name, "mime": mime }),
            ),
        };
        self.notify(key, NoticeKind::Error, data);
    }

    fn notify(&self, key: NoticeKey, kind: NoticeKind, data: serde_json::Value) {
        let message = self.templates.render_lossy(key, &data);
        self.sink.display(&message, kind);
    }
}

/// Restores the pre-upload state unless finished.
struct PendingUpload<'a> {
    state: &'a watch::Sender<SlotState>,
    previous: Option<SlotState>,
}

impl PendingUpload<'_> {
    fn finish(mut self, next: SlotState) {
        self.previous = None;
        self.state.send_replace(next);
    }
}

impl Drop for PendingUpload<'_> {
    fn drop(&mut self) {
        if let Some(previous) = self.previous.take() {
            debug!("upload abandoned; restoring previous slot state");
            self.state.send_replace(previous);
        }
    }
}
