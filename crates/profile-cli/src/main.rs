mod presenter;

use clap::{Parser, Subcommand, ValueEnum};
use presenter::{ConsoleSink, Presenter, PromptContext, describe_validation};
use profile_spec::{
    FieldType, FormConfig, FormController, FormSpec, SelectedFile, Services, SlotKind,
    SubmitError, build_render_payload, profile_form, render_json_ui, render_text, validate,
    values_schema,
};
use serde_json::Value;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::runtime::Runtime;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

#[derive(Parser)]
#[command(
    author,
    version,
    about = "Employee profile form CLI",
    long_about = "Validates, edits and saves employee profiles with simulated uploads and a guarded save"
)]
struct Cli {
    /// Log filter for stderr output (falls back to RUST_LOG, then "warn").
    #[arg(long, global = true, value_name = "FILTER")]
    log_level: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum RenderMode {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Command {
    /// Print the form definition.
    Describe {
        /// Form definition JSON (defaults to the built-in employee profile).
        #[arg(long, value_name = "SPEC")]
        spec: Option<PathBuf>,
    },
    /// Print the JSON Schema describing a value map for the form.
    Schema {
        #[arg(long, value_name = "SPEC")]
        spec: Option<PathBuf>,
    },
    /// Print the JSON Schema of the form definition format itself.
    SpecSchema,
    /// Validate a value map against the form.
    Validate {
        /// Path to the values JSON file.
        #[arg(long, value_name = "VALUES")]
        values: PathBuf,
        #[arg(long, value_name = "SPEC")]
        spec: Option<PathBuf>,
    },
    /// Apply values and attachments, then submit.
    Save {
        #[arg(long, value_name = "VALUES")]
        values: PathBuf,
        /// Attachment as SLOT=PATH or SLOT=PATH:MIME; repeatable.
        #[arg(long = "attach", value_name = "SLOT=PATH[:MIME]")]
        attachments: Vec<String>,
        /// Built-in avatar to use instead of an uploaded picture.
        #[arg(long, value_name = "ID")]
        avatar_preset: Option<String>,
        #[arg(long, value_name = "SPEC")]
        spec: Option<PathBuf>,
        /// Timing and message overrides (defaults to PROFILE_FORM_CONFIG).
        #[arg(long, value_name = "CONFIG")]
        config: Option<PathBuf>,
        /// Also print the submission as JSON.
        #[arg(long)]
        submission_json: bool,
        #[arg(long, value_enum, default_value_t = RenderMode::Text)]
        format: RenderMode,
    },
    /// Prompt for each field, re-asking until it passes, then submit.
    Edit {
        /// Optional JSON file with starting values.
        #[arg(long, value_name = "VALUES")]
        values: Option<PathBuf>,
        #[arg(long, value_name = "SPEC")]
        spec: Option<PathBuf>,
        #[arg(long, value_name = "CONFIG")]
        config: Option<PathBuf>,
        #[arg(long)]
        submission_json: bool,
    },
}

fn main() -> CliResult<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_level.as_deref())?;
    match cli.command {
        Command::Describe { spec } => run_describe(spec),
        Command::Schema { spec } => run_schema(spec),
        Command::SpecSchema => run_spec_schema(),
        Command::Validate { values, spec } => run_validate(values, spec),
        Command::Save {
            values,
            attachments,
            avatar_preset,
            spec,
            config,
            submission_json,
            format,
        } => run_save(SaveArgs {
            values,
            attachments,
            avatar_preset,
            spec,
            config,
            submission_json,
            format,
        }),
        Command::Edit {
            values,
            spec,
            config,
            submission_json,
        } => run_edit(values, spec, config, submission_json),
    }
}

fn init_tracing(log_level: Option<&str>) -> CliResult<()> {
    let filter = match log_level {
        Some(level) => EnvFilter::try_new(level)?,
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init()
        .map_err(|err| err.to_string())?;
    Ok(())
}

fn load_spec(path: Option<&Path>) -> CliResult<FormSpec> {
    match path {
        Some(path) => {
            let contents = fs::read_to_string(path)?;
            Ok(FormSpec::from_json_str(&contents)?)
        }
        None => Ok(profile_form()?),
    }
}

fn load_values(path: &Path) -> CliResult<Value> {
    let contents = fs::read_to_string(path)?;
    let values: Value = serde_json::from_str(&contents)?;
    if !values.is_object() {
        return Err(format!("{} must contain a JSON object", path.display()).into());
    }
    Ok(values)
}

fn run_describe(spec_path: Option<PathBuf>) -> CliResult<()> {
    let spec = load_spec(spec_path.as_deref())?;
    println!("{}", serde_json::to_string_pretty(&spec)?);
    Ok(())
}

fn run_schema(spec_path: Option<PathBuf>) -> CliResult<()> {
    let spec = load_spec(spec_path.as_deref())?;
    println!("{}", serde_json::to_string_pretty(&values_schema(&spec))?);
    Ok(())
}

fn run_spec_schema() -> CliResult<()> {
    let schema = schemars::schema_for!(FormSpec);
    println!("{}", serde_json::to_string_pretty(&schema)?);
    Ok(())
}

fn run_validate(values_path: PathBuf, spec_path: Option<PathBuf>) -> CliResult<()> {
    let spec = load_spec(spec_path.as_deref())?;
    let values = load_values(&values_path)?;

    let result = validate(&spec, &values);
    println!(
        "Validation result: {}",
        if result.valid { "valid" } else { "invalid" }
    );
    describe_validation(&result);

    if result.valid {
        Ok(())
    } else {
        Err("validation failed".into())
    }
}

struct SaveArgs {
    values: PathBuf,
    attachments: Vec<String>,
    avatar_preset: Option<String>,
    spec: Option<PathBuf>,
    config: Option<PathBuf>,
    submission_json: bool,
    format: RenderMode,
}

fn build_controller(spec: FormSpec, config_path: Option<&Path>) -> CliResult<FormController> {
    let config = FormConfig::resolve(config_path)?;
    let services = Services::simulated(&config, Arc::new(ConsoleSink))?;
    Ok(FormController::new(Arc::new(spec), services)?)
}

fn runtime() -> CliResult<Runtime> {
    Ok(tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()?)
}

fn run_save(args: SaveArgs) -> CliResult<()> {
    let spec = load_spec(args.spec.as_deref())?;
    let values = load_values(&args.values)?;
    let mut controller = build_controller(spec, args.config.as_deref())?;
    let attachments = args
        .attachments
        .iter()
        .map(|raw| parse_attachment(raw))
        .collect::<Result<Vec<_>, _>>()?;

    if let Some(map) = values.as_object() {
        for (name, value) in map {
            controller.set_value(name, value.clone())?;
        }
    }

    let runtime = runtime()?;
    for attachment in attachments {
        let file = attachment.selected_file()?;
        let slot = controller.slot(&attachment.slot)?;
        // Rejections and failures are already reported through the sink.
        if let Err(err) = runtime.block_on(slot.select(file)) {
            warn!(slot = %attachment.slot, error = %err, "attachment not uploaded");
        }
    }
    if let Some(preset) = &args.avatar_preset {
        let slot = controller
            .slots()
            .iter()
            .find(|slot| slot.spec().kind == SlotKind::Avatar)
            .ok_or("form has no avatar slot")?;
        slot.choose_preset(preset)?;
    }

    let presenter = Presenter::new(args.submission_json);
    let outcome = runtime.block_on(controller.submit());
    print_render_output(args.format, &controller)?;
    match outcome {
        Ok(receipt) => {
            presenter.show_completion(&controller.submission(), &receipt);
            Ok(())
        }
        Err(SubmitError::Invalid(errors)) => {
            eprintln!("Submission blocked:");
            for error in &errors {
                eprintln!("  {} - {}", error.path, error.message);
            }
            Err("validation failed".into())
        }
        Err(err) => Err(err.into()),
    }
}

fn run_edit(
    values_path: Option<PathBuf>,
    spec_path: Option<PathBuf>,
    config_path: Option<PathBuf>,
    submission_json: bool,
) -> CliResult<()> {
    let spec = load_spec(spec_path.as_deref())?;
    let mut controller = build_controller(spec, config_path.as_deref())?;
    if let Some(path) = values_path {
        let values = load_values(&path)?;
        if let Some(map) = values.as_object() {
            for (name, value) in map {
                controller.set_value(name, value.clone())?;
            }
        }
    }

    let mut presenter = Presenter::new(submission_json);
    presenter.show_header(&build_render_payload(&controller));

    let field_ids = controller
        .spec()
        .fields
        .iter()
        .map(|field| (field.id.clone(), field.section.clone()))
        .collect::<Vec<_>>();
    let total = field_ids.len();
    let mut current_section: Option<String> = None;

    for (index, (field_id, section)) in field_ids.iter().enumerate() {
        if section.is_some() && *section != current_section {
            if let Some(name) = section {
                presenter.show_section(name);
            }
            current_section = section.clone();
        }
        loop {
            let (prompt, kind) = {
                let field = controller
                    .state()
                    .field(field_id)
                    .ok_or_else(|| format!("field '{}' not found", field_id))?;
                (
                    PromptContext::new(&field, index + 1, total),
                    field.spec.kind,
                )
            };
            presenter.show_prompt(&prompt);
            let raw = read_answer()?;
            if raw.eq_ignore_ascii_case("exit") {
                return Err("edit aborted by user".into());
            }
            // Blank keeps the current value only while it passes validation.
            if raw.is_empty() && prompt.current.is_some() && controller.error(field_id).is_none() {
                break;
            }
            let value = match parse_input(kind, &raw) {
                Ok(value) => value,
                Err(message) => {
                    presenter.show_parse_error(&message);
                    continue;
                }
            };
            match controller.set_value(field_id, value)? {
                Some(error) => presenter.show_field_error(error),
                None => break,
            }
        }
    }

    let runtime = runtime()?;
    match runtime.block_on(controller.submit()) {
        Ok(receipt) => {
            info!(revision = receipt.revision, "profile saved");
            presenter.show_completion(&controller.submission(), &receipt);
            Ok(())
        }
        Err(SubmitError::Invalid(errors)) => {
            for error in &errors {
                presenter.show_field_error(error);
            }
            Err("validation failed".into())
        }
        Err(err) => Err(err.into()),
    }
}

fn read_answer() -> CliResult<String> {
    print!("> ");
    io::stdout().flush()?;
    let mut input = String::new();
    if io::stdin().read_line(&mut input)? == 0 {
        return Err("input ended before the form was complete".into());
    }
    Ok(input.trim().to_string())
}

/// Converts typed text into the value stored for a field of `kind`.
fn parse_input(kind: FieldType, raw: &str) -> Result<Value, String> {
    match kind {
        FieldType::Boolean => match raw.to_lowercase().as_str() {
            "true" | "t" | "yes" | "y" | "1" => Ok(Value::Bool(true)),
            "false" | "f" | "no" | "n" | "0" => Ok(Value::Bool(false)),
            "" => Ok(Value::Null),
            _ => Err("Please enter yes or no.".to_string()),
        },
        FieldType::Date if raw.is_empty() => Ok(Value::Null),
        FieldType::String | FieldType::Enum | FieldType::Date => {
            Ok(Value::String(raw.to_string()))
        }
    }
}

/// One `--attach` argument.
#[derive(Debug, PartialEq, Eq)]
struct AttachmentArg {
    slot: String,
    path: PathBuf,
    mime: Option<String>,
}

impl AttachmentArg {
    fn selected_file(&self) -> CliResult<SelectedFile> {
        let metadata = fs::metadata(&self.path)
            .map_err(|err| format!("cannot read {}: {}", self.path.display(), err))?;
        let name = self
            .path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .ok_or_else(|| format!("{} has no file name", self.path.display()))?;
        let mime = self
            .mime
            .clone()
            .unwrap_or_else(|| guess_mime(&self.path).to_string());
        Ok(SelectedFile::new(name, metadata.len(), mime))
    }
}

fn parse_attachment(raw: &str) -> Result<AttachmentArg, String> {
    let (slot, rest) = raw
        .split_once('=')
        .ok_or_else(|| format!("attachment '{}' must look like SLOT=PATH[:MIME]", raw))?;
    if slot.trim().is_empty() || rest.trim().is_empty() {
        return Err(format!(
            "attachment '{}' must look like SLOT=PATH[:MIME]",
            raw
        ));
    }
    let (path, mime) = match rest.rsplit_once(':') {
        Some((path, mime)) if mime.contains('/') && !path.is_empty() => {
            (path, Some(mime.to_string()))
        }
        _ => (rest, None),
    };
    Ok(AttachmentArg {
        slot: slot.trim().to_string(),
        path: PathBuf::from(path),
        mime,
    })
}

fn guess_mime(path: &Path) -> &'static str {
    let extension = path
        .extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    match extension.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "pdf" => "application/pdf",
        _ => "application/octet-stream",
    }
}

fn print_render_output(mode: RenderMode, controller: &FormController) -> CliResult<()> {
    let payload = build_render_payload(controller);
    match mode {
        RenderMode::Text => println!("{}", render_text(&payload)),
        RenderMode::Json => println!(
            "{}",
            serde_json::to_string_pretty(&render_json_ui(&payload))?
        ),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_cmd::Command;
    use serde_json::json;

    #[test]
    fn attachment_with_explicit_mime() {
        let parsed = parse_attachment("passport=/tmp/scan.bin:application/pdf").unwrap();
        assert_eq!(
            parsed,
            AttachmentArg {
                slot: "passport".into(),
                path: PathBuf::from("/tmp/scan.bin"),
                mime: Some("application/pdf".into()),
            }
        );
    }

    #[test]
    fn attachment_without_mime_keeps_whole_path() {
        let parsed = parse_attachment("pan-card=C:scan.png").unwrap();
        assert_eq!(parsed.path, PathBuf::from("C:scan.png"));
        assert_eq!(parsed.mime, None);
    }

    #[test]
    fn attachment_requires_slot_and_path() {
        assert!(parse_attachment("passport.pdf").is_err());
        assert!(parse_attachment("=passport.pdf").is_err());
        assert!(parse_attachment("passport=").is_err());
    }

    #[test]
    fn mime_is_guessed_from_extension() {
        assert_eq!(guess_mime(Path::new("me.JPG")), "image/jpeg");
        assert_eq!(guess_mime(Path::new("cert.pdf")), "application/pdf");
        assert_eq!(guess_mime(Path::new("notes")), "application/octet-stream");
    }

    #[test]
    fn boolean_input_accepts_yes_and_no() {
        assert_eq!(parse_input(FieldType::Boolean, "Y").unwrap(), json!(true));
        assert_eq!(parse_input(FieldType::Boolean, "no").unwrap(), json!(false));
        assert!(parse_input(FieldType::Boolean, "maybe").is_err());
    }

    #[test]
    fn blank_date_becomes_null() {
        assert_eq!(parse_input(FieldType::Date, "").unwrap(), Value::Null);
        assert_eq!(
            parse_input(FieldType::Date, "1990-04-12").unwrap(),
            json!("1990-04-12")
        );
    }

    #[test]
    fn values_file_must_hold_an_object() -> Result<(), Box<dyn std::error::Error>> {
        let mut file = tempfile::NamedTempFile::new()?;
        write!(file, "[1, 2, 3]")?;
        let err = load_values(file.path()).unwrap_err();
        assert!(err.to_string().contains("must contain a JSON object"));
        Ok(())
    }

    #[test]
    fn spec_schema_lists_form_fields() -> Result<(), Box<dyn std::error::Error>> {
        let output = Command::cargo_bin("profile-form")?
            .arg("spec-schema")
            .output()?;
        assert!(output.status.success());
        let schema: Value = serde_json::from_slice(&output.stdout)?;
        assert!(schema["properties"].get("fields").is_some());
        assert!(schema["properties"].get("attachments").is_some());
        Ok(())
    }
}
