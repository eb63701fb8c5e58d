use std::collections::BTreeSet;

use regex::Regex;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::spec::attachment::SlotSpec;
use crate::spec::field::{FieldSpec, FieldType};
use crate::validate::matches_type;

/// Presentation hints for a form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct FormPresentation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intro: Option<String>,
    /// Display order of field sections; unlisted sections follow in field order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sections: Vec<String>,
}

/// Top-level form definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct FormSpec {
    pub id: String,
    pub title: String,
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub presentation: Option<FormPresentation>,
    pub fields: Vec<FieldSpec>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<SlotSpec>,
}

#[derive(Debug, Error)]
pub enum SpecError {
    #[error("failed to parse form spec: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("duplicate field id '{0}'")]
    DuplicateField(String),
    #[error("duplicate attachment slot id '{0}'")]
    DuplicateSlot(String),
    #[error("enum field '{0}' declares no choices")]
    MissingChoices(String),
    #[error("default value of field '{0}' does not match its type or choices")]
    InvalidDefault(String),
    #[error("field '{field}' has an invalid pattern: {source}")]
    InvalidPattern {
        field: String,
        #[source]
        source: regex::Error,
    },
    #[error("slot '{slot}' has an invalid accept pattern: {source}")]
    InvalidAccept {
        slot: String,
        #[source]
        source: globset::Error,
    },
}

impl FormSpec {
    /// Parses and checks a spec in one go.
    pub fn from_json_str(json: &str) -> Result<Self, SpecError> {
        let spec: FormSpec = serde_json::from_str(json)?;
        spec.check()?;
        Ok(spec)
    }

    pub fn field(&self, id: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|field| field.id == id)
    }

    pub fn slot(&self, id: &str) -> Option<&SlotSpec> {
        self.attachments.iter().find(|slot| slot.id == id)
    }

    /// Section names in display order.
    pub fn sections(&self) -> Vec<String> {
        let mut ordered: Vec<String> = self
            .presentation
            .as_ref()
            .map(|presentation| presentation.sections.clone())
            .unwrap_or_default();
        for field in &self.fields {
            if let Some(section) = &field.section
                && !ordered.contains(section)
            {
                ordered.push(section.clone());
            }
        }
        ordered
    }

    /// Structural checks that serde cannot express.
    pub fn check(&self) -> Result<(), SpecError> {
        let mut seen = BTreeSet::new();
        for field in &self.fields {
            if !seen.insert(field.id.as_str()) {
                return Err(SpecError::DuplicateField(field.id.clone()));
            }
            check_field(field)?;
        }

        let mut slots = BTreeSet::new();
        for slot in &self.attachments {
            if !slots.insert(slot.id.as_str()) {
                return Err(SpecError::DuplicateSlot(slot.id.clone()));
            }
            slot.policy
                .accept_set()
                .map_err(|source| SpecError::InvalidAccept {
                    slot: slot.id.clone(),
                    source,
                })?;
        }

        Ok(())
    }
}

fn check_field(field: &FieldSpec) -> Result<(), SpecError> {
    if matches!(field.kind, FieldType::Enum)
        && field
            .choices
            .as_ref()
            .is_none_or(|choices| choices.is_empty())
    {
        return Err(SpecError::MissingChoices(field.id.clone()));
    }

    if let Some(pattern) = field
        .constraint
        .as_ref()
        .and_then(|constraint| constraint.pattern.as_deref())
    {
        Regex::new(pattern).map_err(|source| SpecError::InvalidPattern {
            field: field.id.clone(),
            source,
        })?;
    }

    if let Some(default) = &field.default_value {
        let in_choices = match (&field.choices, default.as_str()) {
            (Some(choices), Some(text)) => choices.iter().any(|choice| choice == text),
            _ => true,
        };
        if !matches_type(field, default) || !in_choices {
            return Err(SpecError::InvalidDefault(field.id.clone()));
        }
    }

    Ok(())
}
