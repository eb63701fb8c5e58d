use handlebars::Handlebars;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::warn;

/// Notification messages rendered from templates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKey {
    UploadSucceeded,
    AvatarUpdated,
    UploadFailed,
    Removed,
    TooLarge,
    UnsupportedType,
    SaveSucceeded,
    SaveFailed,
}

impl NoticeKey {
    pub const ALL: [NoticeKey; 8] = [
        NoticeKey::UploadSucceeded,
        NoticeKey::AvatarUpdated,
        NoticeKey::UploadFailed,
        NoticeKey::Removed,
        NoticeKey::TooLarge,
        NoticeKey::UnsupportedType,
        NoticeKey::SaveSucceeded,
        NoticeKey::SaveFailed,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            NoticeKey::UploadSucceeded => "upload_succeeded",
            NoticeKey::AvatarUpdated => "avatar_updated",
            NoticeKey::UploadFailed => "upload_failed",
            NoticeKey::Removed => "removed",
            NoticeKey::TooLarge => "too_large",
            NoticeKey::UnsupportedType => "unsupported_type",
            NoticeKey::SaveSucceeded => "save_succeeded",
            NoticeKey::SaveFailed => "save_failed",
        }
    }
}

/// Template sources; every entry can be overridden from config.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NoticeTemplates {
    pub upload_succeeded: String,
    pub avatar_updated: String,
    pub upload_failed: String,
    pub removed: String,
    pub too_large: String,
    pub unsupported_type: String,
    pub save_succeeded: String,
    pub save_failed: String,
}

impl Default for NoticeTemplates {
    fn default() -> Self {
        Self {
            upload_succeeded: "{{label}} uploaded successfully".into(),
            avatar_updated: "{{label}} updated successfully".into(),
            upload_failed: "{{label}} upload failed: {{reason}}".into(),
            removed: "{{label}} removed".into(),
            too_large: "{{label}} size should be less than {{limit}}".into(),
            unsupported_type: "{{file}} is not an accepted format for {{label}}".into(),
            save_succeeded: "Profile updated successfully".into(),
            save_failed: "Profile update failed: {{reason}}".into(),
        }
    }
}

impl NoticeTemplates {
    fn source(&self, key: NoticeKey) -> &str {
        match key {
            NoticeKey::UploadSucceeded => &self.upload_succeeded,
            NoticeKey::AvatarUpdated => &self.avatar_updated,
            NoticeKey::UploadFailed => &self.upload_failed,
            NoticeKey::Removed => &self.removed,
            NoticeKey::TooLarge => &self.too_large,
            NoticeKey::UnsupportedType => &self.unsupported_type,
            NoticeKey::SaveSucceeded => &self.save_succeeded,
            NoticeKey::SaveFailed => &self.save_failed,
        }
    }
}

#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("invalid template '{name}': {source}")]
    Compile {
        name: &'static str,
        #[source]
        source: Box<handlebars::TemplateError>,
    },
    #[error("failed to render '{name}': {source}")]
    Render {
        name: &'static str,
        #[source]
        source: Box<handlebars::RenderError>,
    },
}

/// Strict-mode handlebars registry holding the notice templates.
#[derive(Debug, Clone)]
pub struct TemplateEngine {
    registry: Handlebars<'static>,
}

impl TemplateEngine {
    pub fn new(templates: &NoticeTemplates) -> Result<Self, TemplateError> {
        let mut registry = Handlebars::new();
        registry.set_strict_mode(true);
        registry.register_escape_fn(handlebars::no_escape);
        for key in NoticeKey::ALL {
            registry
                .register_template_string(key.name(), templates.source(key))
                .map_err(|source| TemplateError::Compile {
                    name: key.name(),
                    source: Box::new(source),
                })?;
        }
        Ok(Self { registry })
    }

    pub fn render(&self, key: NoticeKey, data: &Value) -> Result<String, TemplateError> {
        self.registry
            .render(key.name(), data)
            .map_err(|source| TemplateError::Render {
                name: key.name(),
                source: Box::new(source),
            })
    }

    /// Like [`render`](Self::render) but never fails; falls back to the key name.
    pub fn render_lossy(&self, key: NoticeKey, data: &Value) -> String {
        self.render(key, data).unwrap_or_else(|err| {
            warn!(error = %err, "notice template failed to render");
            key.name().replace('_', " ")
        })
    }
}

/// Formats a byte limit the way the notices show it (`5MB`, `200KB`).
pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    if bytes >= MB && bytes % MB == 0 {
        format!("{}MB", bytes / MB)
    } else if bytes >= KB && bytes % KB == 0 {
        format!("{}KB", bytes / KB)
    } else {
        format!("{} bytes", bytes)
    }
}
