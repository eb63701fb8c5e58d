use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Value kinds accepted by a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    String,
    Boolean,
    Enum,
    /// ISO calendar date (`YYYY-MM-DD`) carried as a string.
    Date,
}

impl FieldType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldType::String => "string",
            FieldType::Boolean => "boolean",
            FieldType::Enum => "enum",
            FieldType::Date => "date",
        }
    }
}

/// Well-known text formats checked without a hand-written pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum TextFormat {
    Email,
}

/// Rules applied to a non-empty value.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
pub struct Constraint {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<TextFormat>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_len: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_len: Option<usize>,
    /// Message reported when any rule of this constraint fails.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// A single named input of the form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct FieldSpec {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: FieldType,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub placeholder: Option<String>,
    /// Fields are required unless explicitly marked optional.
    #[serde(default = "default_required")]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub choices: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub constraint: Option<Constraint>,
}

fn default_required() -> bool {
    true
}

impl FieldSpec {
    /// Value a fresh form starts with for this field.
    pub fn initial_value(&self) -> Value {
        if let Some(default) = &self.default_value {
            return default.clone();
        }
        match self.kind {
            FieldType::String | FieldType::Enum => Value::String(String::new()),
            FieldType::Boolean | FieldType::Date => Value::Null,
        }
    }

    pub fn is_optional(&self) -> bool {
        !self.required
    }
}
