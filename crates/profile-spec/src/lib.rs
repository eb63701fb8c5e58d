#![allow(missing_docs)]

pub mod config;
pub mod controller;
pub mod notify;
pub mod profile;
pub mod render;
pub mod report;
pub mod spec;
pub mod state;
pub mod submit;
pub mod template;
pub mod upload;
pub mod validate;
pub mod values_schema;

pub use config::{CONFIG_ENV, ConfigError, FormConfig};
pub use controller::{BuildError, FormController, Services};
pub use notify::{Notice, NoticeKind, NotificationSink, RecordingSink, TracingSink};
pub use profile::{PROFILE_FORM_JSON, profile_form};
pub use render::{
    RenderField, RenderPayload, RenderProgress, RenderSlot, RenderStatus, build_render_payload,
    render_json_ui, render_text,
};
pub use report::{FieldError, ValidationResult};
pub use spec::{
    Constraint, FieldSpec, FieldType, FormSpec, SlotKind, SlotPolicy, SlotSpec, SpecError,
    TextFormat,
};
pub use state::{FormError, FormState, ValidatedField};
pub use submit::{
    BackendError, ProfileBackend, SaveReceipt, SimulatedBackend, Submission, SubmissionState,
    SubmitCoordinator, SubmitError,
};
pub use template::{NoticeKey, NoticeTemplates, TemplateEngine, TemplateError};
pub use upload::{
    ConstraintViolation, FileMeta, FileOrigin, MimeCategory, SelectedFile, SimulatedUploader,
    SlotError, SlotState, UploadError, UploadSlot, Uploader,
};
pub use validate::validate;
pub use values_schema::generate as values_schema;
