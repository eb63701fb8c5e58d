use profile_spec::{
    FieldError, FieldType, NoticeKind, NotificationSink, RenderPayload, SaveReceipt, Submission,
    ValidatedField, ValidationResult,
};
use serde_json::Value;
use tracing::debug;

/// Prints notices as they arrive.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleSink;

impl NotificationSink for ConsoleSink {
    fn display(&self, message: &str, kind: NoticeKind) {
        debug!(kind = kind.as_str(), notice = message, "notice");
        match kind {
            NoticeKind::Success => println!("✔ {}", message),
            NoticeKind::Error => eprintln!("✖ {}", message),
        }
    }
}

/// Prints prompts, inline errors and the final summary of a session.
pub struct Presenter {
    header_printed: bool,
    show_json: bool,
}

impl Presenter {
    pub fn new(show_json: bool) -> Self {
        Self {
            header_printed: false,
            show_json,
        }
    }

    pub fn show_header(&mut self, payload: &RenderPayload) {
        if self.header_printed {
            return;
        }
        println!("Form: {}", payload.form_title);
        if let Some(help) = &payload.help {
            println!("Help: {}", help);
        }
        self.header_printed = true;
    }

    pub fn show_section(&self, section: &str) {
        println!();
        println!("== {} ==", section);
    }

    pub fn show_prompt(&self, prompt: &PromptContext) {
        let mut line = format!("{}/{} {}", prompt.index, prompt.total, prompt.title);
        if prompt.required {
            line.push_str(" *");
        }
        if let Some(hint) = &prompt.hint {
            line.push(' ');
            line.push_str(hint);
        }
        if let Some(current) = &prompt.current {
            line.push_str(&format!(" [{}]", current));
        }
        println!("{}", line);
        if let Some(description) = &prompt.description {
            println!("{}", description);
        }
    }

    pub fn show_field_error(&self, error: &FieldError) {
        eprintln!("Invalid value: {}", error.message);
    }

    pub fn show_parse_error(&self, message: &str) {
        eprintln!("Invalid value: {}", message);
    }

    pub fn show_completion(&self, submission: &Submission, receipt: &SaveReceipt) {
        println!(
            "Saved {} (revision {}, {} fields, {} attachments) at {}",
            receipt.form_id,
            receipt.revision,
            receipt.field_count,
            receipt.attachment_count,
            receipt.saved_at.to_rfc3339()
        );
        match submission.to_cbor() {
            Ok(bytes) => println!("Submission (CBOR hex): {}", encode_hex(&bytes)),
            Err(err) => eprintln!("Failed to serialize submission to CBOR: {}", err),
        }
        if self.show_json {
            match submission.to_json_pretty() {
                Ok(pretty) => println!("{}", pretty),
                Err(err) => eprintln!("Failed to serialize submission to JSON: {}", err),
            }
        }
    }
}

pub fn describe_validation(result: &ValidationResult) {
    if !result.errors.is_empty() {
        println!("Errors:");
        for error in &result.errors {
            println!("  {} - {}", error.path, error.message);
        }
    }
    if !result.missing_required.is_empty() {
        println!(
            "Missing required fields: {}",
            result.missing_required.join(", ")
        );
    }
    if !result.unknown_fields.is_empty() {
        println!("Unknown fields: {}", result.unknown_fields.join(", "));
    }
}

/// Context used to format a single prompt.
pub struct PromptContext {
    pub index: usize,
    pub total: usize,
    pub title: String,
    pub description: Option<String>,
    pub required: bool,
    pub hint: Option<String>,
    pub current: Option<String>,
}

impl PromptContext {
    pub fn new(field: &ValidatedField<'_>, index: usize, total: usize) -> Self {
        let spec = field.spec;
        let choices = spec.choices.as_deref().unwrap_or_default();
        Self {
            index,
            total,
            title: spec.title.clone(),
            description: spec.description.clone().or_else(|| spec.placeholder.clone()),
            required: spec.required,
            hint: hint_for(spec.kind, choices),
            current: current_display(field.value),
        }
    }
}

fn hint_for(kind: FieldType, choices: &[String]) -> Option<String> {
    match kind {
        FieldType::Boolean => Some("(yes/no)".to_string()),
        FieldType::Date => Some("(YYYY-MM-DD)".to_string()),
        FieldType::Enum if !choices.is_empty() => Some(format!("({})", choices.join("/"))),
        _ => None,
    }
}

fn current_display(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(text) if text.is_empty() => None,
        Value::String(text) => Some(text.clone()),
        Value::Bool(flag) => Some(if *flag { "yes" } else { "no" }.to_string()),
        other => Some(other.to_string()),
    }
}

pub fn encode_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|byte| format!("{:02x}", byte)).collect()
}
