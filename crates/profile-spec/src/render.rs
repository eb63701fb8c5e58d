use serde_json::{Map, Value, json};

use crate::controller::FormController;
use crate::spec::attachment::SlotKind;
use crate::spec::field::FieldType;
use crate::upload::{FileMeta, SlotState};

/// Status labels returned by the renderers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderStatus {
    /// At least one field fails its rules.
    NeedInput,
    /// Every field passes; the form can be submitted.
    Complete,
    /// A save is in flight.
    Saving,
}

impl RenderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RenderStatus::NeedInput => "need_input",
            RenderStatus::Complete => "complete",
            RenderStatus::Saving => "saving",
        }
    }
}

/// Counters of required fields that currently pass.
#[derive(Debug, Clone)]
pub struct RenderProgress {
    pub valid: usize,
    pub total: usize,
}

#[derive(Debug, Clone)]
pub struct RenderField {
    pub id: String,
    pub title: String,
    pub section: Option<String>,
    pub description: Option<String>,
    pub kind: FieldType,
    pub required: bool,
    pub value: Value,
    pub error: Option<String>,
    pub choices: Option<Vec<String>>,
}

#[derive(Debug, Clone)]
pub struct RenderSlot {
    pub id: String,
    pub label: String,
    pub description: Option<String>,
    pub kind: SlotKind,
    pub state: SlotState,
}

/// Collected payload used by both text and JSON renderers.
#[derive(Debug, Clone)]
pub struct RenderPayload {
    pub form_id: String,
    pub form_title: String,
    pub form_version: String,
    pub status: RenderStatus,
    pub progress: RenderProgress,
    pub help: Option<String>,
    pub sections: Vec<String>,
    pub fields: Vec<RenderField>,
    pub slots: Vec<RenderSlot>,
}

/// Snapshot of a controller for rendering. Runs full validation on a copy
/// of the field state so the controller's inline errors stay untouched.
pub fn build_render_payload(controller: &FormController) -> RenderPayload {
    let spec = controller.spec();
    let mut state = controller.state().clone();
    let validation = state.validate_all();

    let fields = state
        .fields()
        .map(|field| RenderField {
            id: field.spec.id.clone(),
            title: field.spec.title.clone(),
            section: field.spec.section.clone(),
            description: field.spec.description.clone(),
            kind: field.spec.kind,
            required: field.spec.required,
            value: field.value.clone(),
            error: controller
                .error(&field.spec.id)
                .map(|error| error.message.clone()),
            choices: field.spec.choices.clone(),
        })
        .collect::<Vec<_>>();

    let total = spec.fields.iter().filter(|field| field.required).count();
    let valid = spec
        .fields
        .iter()
        .filter(|field| field.required && validation.error_for(&field.id).is_none())
        .count();

    let slots = controller
        .slots()
        .iter()
        .map(|slot| RenderSlot {
            id: slot.id().to_string(),
            label: slot.spec().label.clone(),
            description: slot.spec().description.clone(),
            kind: slot.spec().kind,
            state: slot.state(),
        })
        .collect();

    let status = if controller.is_saving() {
        RenderStatus::Saving
    } else if validation.valid {
        RenderStatus::Complete
    } else {
        RenderStatus::NeedInput
    };

    let help = spec
        .presentation
        .as_ref()
        .and_then(|presentation| presentation.intro.clone())
        .or_else(|| spec.description.clone());

    RenderPayload {
        form_id: spec.id.clone(),
        form_title: spec.title.clone(),
        form_version: spec.version.clone(),
        status,
        progress: RenderProgress { valid, total },
        help,
        sections: spec.sections(),
        fields,
        slots,
    }
}

/// Render the payload as a structured JSON-friendly value.
pub fn render_json_ui(payload: &RenderPayload) -> Value {
    let fields = payload
        .fields
        .iter()
        .map(|field| {
            let mut map = Map::new();
            map.insert("id".into(), Value::String(field.id.clone()));
            map.insert("title".into(), Value::String(field.title.clone()));
            map.insert(
                "section".into(),
                field
                    .section
                    .clone()
                    .map(Value::String)
                    .unwrap_or(Value::Null),
            );
            map.insert("type".into(), Value::String(field.kind.as_str().to_string()));
            map.insert("required".into(), Value::Bool(field.required));
            map.insert("value".into(), field.value.clone());
            if let Some(description) = &field.description {
                map.insert("description".into(), Value::String(description.clone()));
            }
            if let Some(error) = &field.error {
                map.insert("error".into(), Value::String(error.clone()));
            }
            if let Some(choices) = &field.choices {
                map.insert(
                    "choices".into(),
                    Value::Array(choices.iter().cloned().map(Value::String).collect()),
                );
            }
            Value::Object(map)
        })
        .collect::<Vec<_>>();

    let slots = payload
        .slots
        .iter()
        .map(|slot| {
            let mut map = Map::new();
            map.insert("id".into(), Value::String(slot.id.clone()));
            map.insert("label".into(), Value::String(slot.label.clone()));
            map.insert("kind".into(), Value::String(slot.kind.as_str().to_string()));
            map.insert("state".into(), Value::String(slot.state.as_str().to_string()));
            if let Some(file) = slot.state.attachment() {
                map.insert("file".into(), file_json(file));
            }
            if let SlotState::Failed(reason) = &slot.state {
                map.insert("reason".into(), Value::String(reason.clone()));
            }
            Value::Object(map)
        })
        .collect::<Vec<_>>();

    json!({
        "form_id": payload.form_id,
        "form_title": payload.form_title,
        "form_version": payload.form_version,
        "status": payload.status.as_str(),
        "progress": {
            "valid": payload.progress.valid,
            "total": payload.progress.total,
        },
        "help": payload.help,
        "sections": payload.sections,
        "fields": fields,
        "attachments": slots,
    })
}

/// Render the payload as human-friendly text.
pub fn render_text(payload: &RenderPayload) -> String {
    let mut lines = Vec::new();
    lines.push(format!("Form: {} ({})", payload.form_title, payload.form_id));
    lines.push(format!(
        "Status: {} ({}/{} required fields valid)",
        payload.status.as_str(),
        payload.progress.valid,
        payload.progress.total
    ));
    if let Some(help) = &payload.help {
        lines.push(format!("Help: {}", help));
    }

    for section in &payload.sections {
        lines.push(format!("{}:", section));
        for field in payload
            .fields
            .iter()
            .filter(|field| field.section.as_deref() == Some(section.as_str()))
        {
            lines.push(field_line(field));
        }
    }
    let unsectioned = payload
        .fields
        .iter()
        .filter(|field| field.section.is_none())
        .collect::<Vec<_>>();
    if !unsectioned.is_empty() {
        lines.push("Other:".to_string());
        for field in unsectioned {
            lines.push(field_line(field));
        }
    }

    if !payload.slots.is_empty() {
        lines.push("Attachments:".to_string());
        for slot in &payload.slots {
            let mut entry = format!(" - {} [{}]", slot.label, slot.state.as_str());
            match &slot.state {
                SlotState::Uploaded(file) => {
                    entry.push_str(&format!(" {} ({} bytes)", file.name, file.size));
                }
                SlotState::Failed(reason) => {
                    entry.push_str(&format!(" {}", reason));
                }
                SlotState::Idle | SlotState::Uploading => {}
            }
            lines.push(entry);
        }
    }

    lines.join("\n")
}

fn field_line(field: &RenderField) -> String {
    let mut entry = format!(" - {} ({})", field.id, field.title);
    if field.required {
        entry.push_str(" [required]");
    }
    entry.push_str(&format!(" = {}", value_to_display(&field.value)));
    if let Some(error) = &field.error {
        entry.push_str(&format!("  ! {}", error));
    }
    entry
}

fn file_json(file: &FileMeta) -> Value {
    json!({
        "name": file.name,
        "size": file.size,
        "mime": file.mime,
        "category": file.category,
        "origin": file.origin,
    })
}

fn value_to_display(value: &Value) -> String {
    match value {
        Value::Null => "-".to_string(),
        Value::String(text) if text.is_empty() => "-".to_string(),
        Value::String(text) => text.clone(),
        Value::Bool(flag) => flag.to_string(),
        other => other.to_string(),
    }
}
