use std::sync::{Arc, Mutex, PoisonError};

use serde::Serialize;
use tracing::{info, warn};

/// Tone of a user-facing notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeKind {
    Success,
    Error,
}

impl NoticeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NoticeKind::Success => "success",
            NoticeKind::Error => "error",
        }
    }
}

/// A short message shown outside the form, e.g. as a toast.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
    pub kind: NoticeKind,
    pub message: String,
}

/// Receives upload, removal and save outcomes.
///
/// Field validation errors never go through a sink; they stay inline.
pub trait NotificationSink: Send + Sync {
    fn display(&self, message: &str, kind: NoticeKind);
}

/// Writes notices to the tracing subscriber.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl NotificationSink for TracingSink {
    fn display(&self, message: &str, kind: NoticeKind) {
        match kind {
            NoticeKind::Success => info!(notice = message, "success"),
            NoticeKind::Error => warn!(notice = message, "error"),
        }
    }
}

/// Keeps every notice in memory; clones share the same buffer.
#[derive(Debug, Default, Clone)]
pub struct RecordingSink {
    notices: Arc<Mutex<Vec<Notice>>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notices(&self) -> Vec<Notice> {
        self.notices
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Removes and returns everything recorded so far.
    pub fn drain(&self) -> Vec<Notice> {
        std::mem::take(&mut *self.notices.lock().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn count(&self, kind: NoticeKind) -> usize {
        self.notices
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|notice| notice.kind == kind)
            .count()
    }
}

impl NotificationSink for RecordingSink {
    fn display(&self, message: &str, kind: NoticeKind) {
        self.notices
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Notice {
                kind,
                message: message.to_string(),
            });
    }
}
