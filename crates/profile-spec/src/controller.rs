use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::{Map, Value};
use thiserror::Error;
use tracing::info;

use crate::config::FormConfig;
use crate::notify::NotificationSink;
use crate::report::{FieldError, ValidationResult};
use crate::spec::form::{FormSpec, SpecError};
use crate::state::{FormError, FormState, ValidatedField};
use crate::submit::{
    ProfileBackend, SaveReceipt, SimulatedBackend, Submission, SubmitCoordinator, SubmitError,
};
use crate::template::{TemplateEngine, TemplateError};
use crate::upload::{FileMeta, SimulatedUploader, UploadSlot, Uploader};

#[derive(Debug, Error)]
pub enum BuildError {
    #[error(transparent)]
    Spec(#[from] SpecError),
    #[error(transparent)]
    Template(#[from] TemplateError),
}

/// Collaborators a controller talks to.
#[derive(Clone)]
pub struct Services {
    pub uploader: Arc<dyn Uploader>,
    pub backend: Arc<dyn ProfileBackend>,
    pub sink: Arc<dyn NotificationSink>,
    pub templates: Arc<TemplateEngine>,
}

impl Services {
    /// Fixed-delay uploader and backend timed from `config`.
    pub fn simulated(
        config: &FormConfig,
        sink: Arc<dyn NotificationSink>,
    ) -> Result<Self, TemplateError> {
        Ok(Self {
            uploader: Arc::new(SimulatedUploader::from_config(config)),
            backend: Arc::new(SimulatedBackend::new(config.save_delay())),
            sink,
            templates: Arc::new(TemplateEngine::new(&config.notices)?),
        })
    }
}

/// One mounted form: field state, its attachment slots and the save gate.
///
/// Slots are siblings of the field state; they never affect validity.
#[derive(Debug)]
pub struct FormController {
    spec: Arc<FormSpec>,
    state: FormState,
    slots: Vec<UploadSlot>,
    coordinator: SubmitCoordinator,
}

impl FormController {
    pub fn new(spec: Arc<FormSpec>, services: Services) -> Result<Self, BuildError> {
        spec.check()?;
        let slots = spec
            .attachments
            .iter()
            .map(|slot| {
                UploadSlot::new(
                    slot.clone(),
                    services.uploader.clone(),
                    services.sink.clone(),
                    services.templates.clone(),
                )
            })
            .collect::<Result<Vec<_>, _>>()?;
        let coordinator = SubmitCoordinator::new(
            services.backend.clone(),
            services.sink.clone(),
            services.templates.clone(),
        );
        Ok(Self {
            state: FormState::new(spec.clone()),
            spec,
            slots,
            coordinator,
        })
    }

    pub fn spec(&self) -> &FormSpec {
        &self.spec
    }

    pub fn set_value(
        &mut self,
        name: &str,
        value: Value,
    ) -> Result<Option<&FieldError>, FormError> {
        self.state.set_value(name, value)
    }

    pub fn validate_all(&mut self) -> ValidationResult {
        self.state.validate_all()
    }

    /// Validates everything, then saves; nothing is sent if any field fails.
    pub async fn submit(&mut self) -> Result<SaveReceipt, SubmitError> {
        let validation = self.state.validate_all();
        if !validation.valid {
            info!(
                form = %self.spec.id,
                failing = validation.errors.len(),
                "submit blocked by invalid fields"
            );
            return Err(SubmitError::Invalid(validation.errors));
        }
        let submission = self.submission();
        self.coordinator.save(&submission).await
    }

    pub fn reset(&mut self) {
        self.state.reset();
    }

    /// Current values plus every uploaded attachment.
    pub fn submission(&self) -> Submission {
        Submission {
            form_id: self.spec.id.clone(),
            values: self.state.values().clone(),
            attachments: self.attachments(),
        }
    }

    pub fn attachments(&self) -> BTreeMap<String, FileMeta> {
        self.slots
            .iter()
            .filter_map(|slot| slot.attachment().map(|file| (slot.id().to_string(), file)))
            .collect()
    }

    pub fn state(&self) -> &FormState {
        &self.state
    }

    pub fn values(&self) -> &Map<String, Value> {
        self.state.values()
    }

    pub fn value(&self, name: &str) -> Option<&Value> {
        self.state.value(name)
    }

    pub fn error(&self, name: &str) -> Option<&FieldError> {
        self.state.error(name)
    }

    pub fn errors(&self) -> impl Iterator<Item = &FieldError> {
        self.state.errors()
    }

    pub fn fields(&self) -> impl Iterator<Item = ValidatedField<'_>> {
        self.state.fields()
    }

    pub fn slot(&self, id: &str) -> Result<&UploadSlot, FormError> {
        self.slots
            .iter()
            .find(|slot| slot.id() == id)
            .ok_or_else(|| FormError::UnknownSlot(id.to_string()))
    }

    pub fn slots(&self) -> &[UploadSlot] {
        &self.slots
    }

    pub fn coordinator(&self) -> &SubmitCoordinator {
        &self.coordinator
    }

    pub fn is_saving(&self) -> bool {
        self.coordinator.is_in_flight()
    }
}
