use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::{Map, Value};
use thiserror::Error;
use tracing::debug;

use crate::report::{FieldError, ValidationResult};
use crate::spec::field::FieldSpec;
use crate::spec::form::FormSpec;
use crate::validate::{validate, validate_field};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FormError {
    #[error("form has no field named '{0}'")]
    UnknownField(String),
    #[error("form has no attachment slot named '{0}'")]
    UnknownSlot(String),
}

/// Read-only view of one field: its definition, current value and error.
#[derive(Debug, Clone, Copy)]
pub struct ValidatedField<'a> {
    pub spec: &'a FieldSpec,
    pub value: &'a Value,
    pub error: Option<&'a FieldError>,
}

impl ValidatedField<'_> {
    pub fn is_valid(&self) -> bool {
        self.error.is_none()
    }
}

/// Current values and inline errors of one form instance.
///
/// Every key of the value map belongs to a field of the form; a field
/// without an error entry currently passes its rules.
#[derive(Debug, Clone)]
pub struct FormState {
    spec: Arc<FormSpec>,
    values: Map<String, Value>,
    errors: BTreeMap<String, FieldError>,
}

impl FormState {
    /// Seeds every field with its default.
    pub fn new(spec: Arc<FormSpec>) -> Self {
        let values = initial_values(&spec);
        Self {
            spec,
            values,
            errors: BTreeMap::new(),
        }
    }

    pub fn spec(&self) -> &FormSpec {
        &self.spec
    }

    /// Stores `value` and re-runs that field's rules.
    pub fn set_value(
        &mut self,
        name: &str,
        value: Value,
    ) -> Result<Option<&FieldError>, FormError> {
        let field = self
            .spec
            .field(name)
            .ok_or_else(|| FormError::UnknownField(name.to_string()))?;

        match validate_field(field, Some(&value)) {
            Some(error) => {
                debug!(field = name, code = %error.code, "field failed validation");
                self.errors.insert(name.to_string(), error);
            }
            None => {
                self.errors.remove(name);
            }
        }
        self.values.insert(name.to_string(), value);
        Ok(self.errors.get(name))
    }

    /// Runs every rule and replaces the error map with the outcome.
    pub fn validate_all(&mut self) -> ValidationResult {
        let result = validate(&self.spec, &Value::Object(self.values.clone()));
        self.errors = result
            .errors
            .iter()
            .map(|error| (error.field.clone(), error.clone()))
            .collect();
        result
    }

    /// Back to defaults, with no errors.
    pub fn reset(&mut self) {
        self.values = initial_values(&self.spec);
        self.errors.clear();
    }

    pub fn value(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn values(&self) -> &Map<String, Value> {
        &self.values
    }

    pub fn error(&self, name: &str) -> Option<&FieldError> {
        self.errors.get(name)
    }

    pub fn errors(&self) -> impl Iterator<Item = &FieldError> {
        self.errors.values()
    }

    pub fn field(&self, name: &str) -> Option<ValidatedField<'_>> {
        let spec = self.spec.field(name)?;
        let value = self.values.get(name)?;
        Some(ValidatedField {
            spec,
            value,
            error: self.errors.get(name),
        })
    }

    /// Fields in schema order.
    pub fn fields(&self) -> impl Iterator<Item = ValidatedField<'_>> {
        self.spec
            .fields
            .iter()
            .filter_map(|field| self.field(&field.id))
    }
}

fn initial_values(spec: &FormSpec) -> Map<String, Value> {
    spec.fields
        .iter()
        .map(|field| (field.id.clone(), field.initial_value()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn spec() -> Arc<FormSpec> {
        let raw = json!({
            "id": "state",
            "title": "State",
            "version": "1.0",
            "fields": [
                {
                    "id": "name",
                    "type": "string",
                    "title": "Name",
                    "constraint": { "min_len": 3, "message": "Name must be at least 3 characters" }
                },
                {
                    "id": "theme",
                    "type": "enum",
                    "title": "Theme",
                    "required": false,
                    "choices": ["light", "dark"],
                    "default_value": "dark"
                }
            ]
        });
        Arc::new(FormSpec::from_json_str(&raw.to_string()).expect("spec"))
    }

    #[test]
    fn new_state_is_seeded_with_defaults() {
        let state = FormState::new(spec());
        assert_eq!(state.value("name"), Some(&json!("")));
        assert_eq!(state.value("theme"), Some(&json!("dark")));
        assert_eq!(state.errors().count(), 0);
    }

    #[test]
    fn set_value_tracks_error_until_fixed() {
        let mut state = FormState::new(spec());
        let error = state
            .set_value("name", json!("Jo"))
            .expect("known field")
            .cloned()
            .expect("error");
        assert_eq!(error.message, "Name must be at least 3 characters");
        assert!(state.error("name").is_some());

        let error = state.set_value("name", json!("Joan")).expect("known field");
        assert!(error.is_none());
        assert!(state.error("name").is_none());
    }

    #[test]
    fn unknown_field_leaves_state_untouched() {
        let mut state = FormState::new(spec());
        let err = state.set_value("nickname", json!("jj")).unwrap_err();
        assert_eq!(err, FormError::UnknownField("nickname".into()));
        assert!(state.value("nickname").is_none());
    }

    #[test]
    fn reset_restores_defaults_and_clears_errors() {
        let mut state = FormState::new(spec());
        state.set_value("theme", json!("light")).expect("theme");
        state.validate_all();
        assert!(state.error("name").is_some());

        state.reset();
        assert_eq!(state.value("theme"), Some(&json!("dark")));
        assert!(state.error("name").is_none());
    }
}
