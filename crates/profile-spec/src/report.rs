use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A failing rule on one field, surfaced inline next to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[error("{field}: {message}")]
pub struct FieldError {
    pub field: String,
    pub path: String,
    pub message: String,
    pub code: String,
}

impl FieldError {
    pub fn new(field: &str, message: impl Into<String>, code: &str) -> Self {
        Self {
            field: field.to_string(),
            path: format!("/{}", field),
            message: message.into(),
            code: code.to_string(),
        }
    }
}

/// Outcome of validating a full value map.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ValidationResult {
    pub valid: bool,
    pub errors: Vec<FieldError>,
    /// Required fields that were empty; each also has an entry in `errors`.
    #[serde(default)]
    pub missing_required: Vec<String>,
    #[serde(default)]
    pub unknown_fields: Vec<String>,
}

impl ValidationResult {
    pub fn error_for(&self, field: &str) -> Option<&FieldError> {
        self.errors.iter().find(|error| error.field == field)
    }

    pub fn failing_fields(&self) -> Vec<&str> {
        self.errors.iter().map(|error| error.field.as_str()).collect()
    }
}
