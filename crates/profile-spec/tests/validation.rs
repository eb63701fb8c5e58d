use serde_json::{Value, json};

use profile_spec::{FormSpec, profile_form, validate, values_schema};

fn fixture(name: &str) -> &'static str {
    match name {
        "valid_profile" => include_str!("../tests/fixtures/valid_profile.json"),
        _ => panic!("unknown fixture {}", name),
    }
}

fn valid_values() -> Value {
    serde_json::from_str(fixture("valid_profile")).expect("fixture")
}

fn with(mut values: Value, key: &str, value: Value) -> Value {
    values
        .as_object_mut()
        .expect("object")
        .insert(key.to_string(), value);
    values
}

fn spec() -> FormSpec {
    profile_form().expect("profile spec")
}

#[test]
fn valid_fixture_passes() {
    let result = validate(&spec(), &valid_values());
    assert!(result.valid, "unexpected errors: {:?}", result.errors);
    assert!(result.missing_required.is_empty());
}

#[test]
fn bad_email_and_short_mobile_yield_exactly_two_errors() {
    let values = with(valid_values(), "email", json!("not-an-email"));
    let values = with(values, "mobileNumber", json!("123"));
    let result = validate(&spec(), &values);

    assert!(!result.valid);
    assert_eq!(result.errors.len(), 2);
    assert_eq!(
        result.error_for("email").map(|error| error.message.as_str()),
        Some("Please enter a valid email address")
    );
    assert_eq!(
        result
            .error_for("mobileNumber")
            .map(|error| error.message.as_str()),
        Some("Mobile number must be at least 10 digits")
    );
}

#[test]
fn every_required_field_fails_when_empty() {
    let spec = spec();
    let result = validate(&spec, &json!({}));
    let required: Vec<&str> = spec
        .fields
        .iter()
        .filter(|field| field.required)
        .map(|field| field.id.as_str())
        .collect();

    assert_eq!(result.failing_fields(), required);
    assert_eq!(result.missing_required.len(), required.len());
    assert_eq!(
        result
            .error_for("employeeId")
            .map(|error| error.message.as_str()),
        Some("Employee ID is required")
    );
    assert_eq!(
        result.error_for("fullName").map(|error| error.message.as_str()),
        Some("Full name must be at least 3 characters")
    );
}

#[test]
fn optional_fields_never_block_when_empty() {
    let values = with(valid_values(), "gender", json!(""));
    let values = with(values, "dateOfBirth", Value::Null);
    let values = with(values, "whatsappNumber", json!(""));
    let result = validate(&spec(), &values);
    assert!(result.valid, "unexpected errors: {:?}", result.errors);
}

#[test]
fn preferences_are_checked_against_choices() {
    let values = with(valid_values(), "theme", json!("sepia"));
    let result = validate(&spec(), &values);
    let error = result.error_for("theme").expect("theme error");
    assert_eq!(error.code, "enum_mismatch");
    assert_eq!(error.path, "/theme");
}

#[test]
fn unknown_fields_are_reported() {
    let values = with(valid_values(), "nickname", json!("JD"));
    let result = validate(&spec(), &values);
    assert!(!result.valid);
    assert!(result.errors.is_empty());
    assert_eq!(result.unknown_fields, vec!["nickname"]);
}

#[test]
fn values_schema_marks_required_and_formats() {
    let schema = values_schema(&spec());
    let required = schema["required"].as_array().expect("required");
    assert!(required.iter().any(|value| value == "fullName"));
    assert!(!required.iter().any(|value| value == "whatsappNumber"));
    assert_eq!(schema["properties"]["email"]["format"], "email");
    assert_eq!(schema["properties"]["fullName"]["minLength"], 3);
    assert_eq!(schema["properties"]["theme"]["default"], "system");
    assert_eq!(
        schema["properties"]["dateOfBirth"]["anyOf"],
        json!([
            { "type": "string", "format": "date" },
            { "enum": ["", null] }
        ])
    );
    assert!(schema["properties"]["dateOfBirth"].get("format").is_none());
    assert_eq!(
        schema["properties"]["whatsappNumber"]["type"],
        json!(["string", "null"])
    );
}
