use std::sync::Arc;

use serde_json::{Value, json};

use profile_spec::{
    FormConfig, FormController, RecordingSink, RenderStatus, SelectedFile, Services,
    build_render_payload, profile_form, render_json_ui, render_text,
};

fn controller() -> FormController {
    let services = Services::simulated(&FormConfig::default(), Arc::new(RecordingSink::new()))
        .expect("services");
    FormController::new(Arc::new(profile_form().expect("profile spec")), services)
        .expect("controller")
}

fn fill_valid(controller: &mut FormController) {
    let values: Value =
        serde_json::from_str(include_str!("fixtures/valid_profile.json")).expect("fixture");
    for (name, value) in values.as_object().expect("object") {
        controller
            .set_value(name, value.clone())
            .expect("known field");
    }
}

#[test]
fn fresh_form_needs_input() {
    let controller = controller();
    let payload = build_render_payload(&controller);

    assert_eq!(payload.status, RenderStatus::NeedInput);
    assert_eq!(payload.progress.valid, 0);
    assert_eq!(payload.progress.total, 9);
    // Rendering must not surface errors for fields the user has not touched.
    assert!(payload.fields.iter().all(|field| field.error.is_none()));
    assert_eq!(controller.errors().count(), 0);
}

#[test]
fn text_shows_sections_and_inline_errors() {
    let mut controller = controller();
    controller
        .set_value("fullName", json!("Jo"))
        .expect("field");

    let text = render_text(&build_render_payload(&controller));

    assert!(text.starts_with("Form: Employee Profile (employee-profile)"));
    assert!(text.contains("Status: need_input (0/9 required fields valid)"));
    assert!(text.contains("Personal Information:"));
    assert!(text.contains(
        " - fullName (Full Name) [required] = Jo  ! Full name must be at least 3 characters"
    ));
    assert!(text.contains("Attachments:"));
    assert!(text.contains(" - Profile picture [idle]"));
}

#[tokio::test(start_paused = true)]
async fn json_ui_reports_complete_form_and_uploaded_files() {
    let mut controller = controller();
    fill_valid(&mut controller);
    controller
        .slot("passport")
        .expect("slot")
        .select(SelectedFile::new("passport.pdf", 48_000, "application/pdf"))
        .await
        .expect("upload");

    let ui = render_json_ui(&build_render_payload(&controller));

    assert_eq!(ui["form_id"], "employee-profile");
    assert_eq!(ui["status"], "complete");
    assert_eq!(ui["progress"], json!({ "valid": 9, "total": 9 }));
    let passport = ui["attachments"]
        .as_array()
        .expect("attachments")
        .iter()
        .find(|slot| slot["id"] == "passport")
        .expect("passport slot");
    assert_eq!(passport["state"], "uploaded");
    assert_eq!(passport["file"]["name"], "passport.pdf");
    assert_eq!(passport["file"]["category"], "pdf");
}
