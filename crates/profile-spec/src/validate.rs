use std::collections::BTreeSet;
use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;
use serde_json::Value;

use crate::report::{FieldError, ValidationResult};
use crate::spec::field::{Constraint, FieldSpec, FieldType, TextFormat};
use crate::spec::form::FormSpec;

const EMAIL_PATTERN: &str = r"^[^\s@]+@[^\s@]+\.[^\s@]+$";
pub(crate) const DATE_FORMAT: &str = "%Y-%m-%d";

static EMAIL: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(EMAIL_PATTERN).ok());

/// Validates a whole value map against its form definition.
pub fn validate(spec: &FormSpec, values: &Value) -> ValidationResult {
    let values_map = values.as_object().cloned().unwrap_or_default();

    let mut errors = Vec::new();
    let mut missing_required = Vec::new();

    for field in &spec.fields {
        let value = values_map.get(&field.id);
        if let Some(error) = validate_field(field, value) {
            if error.code == "required" {
                missing_required.push(field.id.clone());
            }
            errors.push(error);
        }
    }

    let all_ids: BTreeSet<_> = spec.fields.iter().map(|field| field.id.as_str()).collect();
    let unknown_fields: Vec<String> = values_map
        .keys()
        .filter(|key| !all_ids.contains(key.as_str()))
        .cloned()
        .collect();

    ValidationResult {
        valid: errors.is_empty() && unknown_fields.is_empty(),
        errors,
        missing_required,
        unknown_fields,
    }
}

/// Runs one field's rules; the first failing rule wins.
pub fn validate_field(field: &FieldSpec, value: Option<&Value>) -> Option<FieldError> {
    let value = match value {
        Some(value) if !is_blank(value) => value,
        _ if field.required => return Some(required_error(field)),
        _ => return None,
    };

    if !matches_type(field, value) {
        return Some(FieldError::new(&field.id, "type mismatch", "type_mismatch"));
    }

    if matches!(field.kind, FieldType::Date)
        && let Some(text) = value.as_str()
        && NaiveDate::parse_from_str(text, DATE_FORMAT).is_err()
    {
        return Some(FieldError::new(
            &field.id,
            "date must use the YYYY-MM-DD format",
            "date_format",
        ));
    }

    if let Some(constraint) = &field.constraint
        && let Some(error) = enforce_constraint(field, value, constraint)
    {
        return Some(error);
    }

    if let Some(choices) = &field.choices
        && let Some(text) = value.as_str()
        && !choices.iter().any(|choice| choice == text)
    {
        return Some(FieldError::new(
            &field.id,
            format!("must be one of: {}", choices.join(", ")),
            "enum_mismatch",
        ));
    }

    None
}

/// Absent-equivalent values: `null` and the empty string.
pub fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(text) => text.is_empty(),
        _ => false,
    }
}

pub(crate) fn matches_type(field: &FieldSpec, value: &Value) -> bool {
    match field.kind {
        FieldType::String | FieldType::Enum | FieldType::Date => value.is_string(),
        FieldType::Boolean => value.is_boolean(),
    }
}

fn required_error(field: &FieldSpec) -> FieldError {
    let message = field
        .required_message
        .clone()
        .or_else(|| {
            field
                .constraint
                .as_ref()
                .and_then(|constraint| constraint.message.clone())
        })
        .unwrap_or_else(|| format!("{} is required", field.title));
    FieldError::new(&field.id, message, "required")
}

fn enforce_constraint(
    field: &FieldSpec,
    value: &Value,
    constraint: &Constraint,
) -> Option<FieldError> {
    let text = value.as_str()?;

    if let Some(pattern) = &constraint.pattern
        && let Ok(regex) = Regex::new(pattern)
        && !regex.is_match(text)
    {
        return Some(constraint_error(
            field,
            constraint,
            "value does not match the expected pattern",
            "pattern_mismatch",
        ));
    }

    if let Some(TextFormat::Email) = constraint.format
        && !EMAIL.as_ref().is_some_and(|regex| regex.is_match(text))
    {
        return Some(constraint_error(
            field,
            constraint,
            "must be a valid email address",
            "email_format",
        ));
    }

    let length = text.chars().count();

    if let Some(min_len) = constraint.min_len
        && length < min_len
    {
        return Some(constraint_error(
            field,
            constraint,
            &format!("must be at least {} characters", min_len),
            "min_length",
        ));
    }

    if let Some(max_len) = constraint.max_len
        && length > max_len
    {
        return Some(constraint_error(
            field,
            constraint,
            &format!("must be at most {} characters", max_len),
            "max_length",
        ));
    }

    None
}

fn constraint_error(
    field: &FieldSpec,
    constraint: &Constraint,
    fallback: &str,
    code: &str,
) -> FieldError {
    let message = constraint
        .message
        .clone()
        .unwrap_or_else(|| fallback.to_string());
    FieldError::new(&field.id, message, code)
}
