use crate::spec::form::{FormSpec, SpecError};

/// The canonical employee profile form, embedded at build time.
pub const PROFILE_FORM_JSON: &str = include_str!("../assets/profile_form.json");

pub fn profile_form() -> Result<FormSpec, SpecError> {
    FormSpec::from_json_str(PROFILE_FORM_JSON)
}
