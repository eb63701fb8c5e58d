use serde_json::{Map, Value, json};

use crate::spec::field::{FieldSpec, FieldType, TextFormat};
use crate::spec::form::FormSpec;

/// JSON Schema (draft 2020-12) describing the value map of `spec`.
pub fn generate(spec: &FormSpec) -> Value {
    let mut properties = Map::new();
    let mut required = Vec::new();

    for field in &spec.fields {
        properties.insert(field.id.clone(), field_schema(field));
        if field.required {
            required.push(Value::String(field.id.clone()));
        }
    }

    json!({
        "$schema": "https://json-schema.org/draft/2020-12/schema",
        "title": spec.title,
        "type": "object",
        "properties": properties,
        "required": required,
        "additionalProperties": false,
    })
}

fn field_schema(field: &FieldSpec) -> Value {
    let mut schema = Map::new();
    schema.insert("title".into(), Value::String(field.title.clone()));
    if let Some(description) = &field.description {
        schema.insert("description".into(), Value::String(description.clone()));
    }

    match field.kind {
        FieldType::Boolean => {
            schema.insert("type".into(), json!("boolean"));
        }
        FieldType::String | FieldType::Enum => {
            schema.insert("type".into(), json!("string"));
        }
        FieldType::Date if field.required => {
            schema.insert("type".into(), json!("string"));
            schema.insert("format".into(), json!("date"));
        }
        // Blank optional dates are stored as "" or null; neither carries the date format.
        FieldType::Date => {
            schema.insert(
                "anyOf".into(),
                json!([
                    { "type": "string", "format": "date" },
                    { "enum": ["", null] }
                ]),
            );
        }
    }

    if !field.required
        && let Some(kind) = schema.remove("type")
    {
        schema.insert("type".into(), json!([kind, "null"]));
    }

    if let Some(choices) = &field.choices {
        let mut allowed: Vec<Value> = choices.iter().cloned().map(Value::String).collect();
        if !field.required {
            allowed.push(Value::String(String::new()));
            allowed.push(Value::Null);
        }
        schema.insert("enum".into(), Value::Array(allowed));
    }

    if let Some(constraint) = &field.constraint {
        if let Some(min_len) = constraint.min_len {
            schema.insert("minLength".into(), json!(min_len));
        }
        if let Some(max_len) = constraint.max_len {
            schema.insert("maxLength".into(), json!(max_len));
        }
        if let Some(pattern) = &constraint.pattern {
            schema.insert("pattern".into(), json!(pattern));
        }
        if let Some(TextFormat::Email) = constraint.format {
            schema.insert("format".into(), json!("email"));
        }
    }

    if field.required
        && matches!(field.kind, FieldType::String)
        && !schema.contains_key("minLength")
    {
        schema.insert("minLength".into(), json!(1));
    }

    if let Some(default) = &field.default_value {
        schema.insert("default".into(), default.clone());
    }

    Value::Object(schema)
}
