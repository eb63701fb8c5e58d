use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use profile_spec::{
    ConstraintViolation, FileMeta, FileOrigin, MimeCategory, NoticeKind, NoticeTemplates,
    RecordingSink, SelectedFile, SimulatedUploader, SlotError, SlotSpec, SlotState,
    TemplateEngine, UploadError, UploadSlot, Uploader, profile_form,
};

/// Fails the first `failures` uploads, then succeeds.
struct FlakyUploader {
    failures: AtomicUsize,
}

#[async_trait]
impl Uploader for FlakyUploader {
    async fn upload(&self, _slot: &SlotSpec, _file: &FileMeta) -> Result<(), UploadError> {
        tokio::time::sleep(Duration::from_millis(200)).await;
        let remaining = self.failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures.store(remaining - 1, Ordering::SeqCst);
            return Err(UploadError::new("connection reset"));
        }
        Ok(())
    }
}

fn slot_spec(id: &str) -> SlotSpec {
    profile_form()
        .expect("profile spec")
        .slot(id)
        .cloned()
        .expect("slot")
}

fn slot_with(id: &str, uploader: Arc<dyn Uploader>, sink: &RecordingSink) -> UploadSlot {
    let templates = TemplateEngine::new(&NoticeTemplates::default()).expect("templates");
    UploadSlot::new(
        slot_spec(id),
        uploader,
        Arc::new(sink.clone()),
        Arc::new(templates),
    )
    .expect("slot")
}

fn simulated_slot(id: &str, sink: &RecordingSink) -> UploadSlot {
    let uploader =
        SimulatedUploader::new(Duration::from_millis(1500), Duration::from_millis(1000));
    slot_with(id, Arc::new(uploader), sink)
}

fn passport_pdf() -> SelectedFile {
    SelectedFile::new("passport.pdf", 48_000, "application/pdf")
}

#[tokio::test(start_paused = true)]
async fn oversized_avatar_stays_idle_with_one_notice() {
    let sink = RecordingSink::new();
    let slot = simulated_slot("avatar", &sink);
    let file = SelectedFile::new("portrait.png", 6 * 1024 * 1024, "image/png");

    let err = slot.select(file).await.unwrap_err();

    assert!(matches!(
        err,
        SlotError::Constraint(ConstraintViolation::TooLarge { max, .. }) if max == 5 * 1024 * 1024
    ));
    assert_eq!(slot.state(), SlotState::Idle);
    let notices = sink.notices();
    assert_eq!(notices.len(), 1);
    assert_eq!(notices[0].kind, NoticeKind::Error);
    assert_eq!(notices[0].message, "Profile picture size should be less than 5MB");
}

#[tokio::test(start_paused = true)]
async fn unsupported_type_is_rejected_before_upload() {
    let sink = RecordingSink::new();
    let slot = simulated_slot("pan-card", &sink);
    let file = SelectedFile::new("notes.txt", 120, "text/plain");

    let err = slot.select(file).await.unwrap_err();

    assert!(matches!(
        err,
        SlotError::Constraint(ConstraintViolation::UnsupportedType { .. })
    ));
    assert_eq!(slot.state(), SlotState::Idle);
    assert_eq!(sink.count(NoticeKind::Error), 1);
    assert_eq!(
        sink.notices()[0].message,
        "notes.txt is not an accepted format for PAN Card"
    );
}

#[tokio::test(start_paused = true)]
async fn valid_file_moves_through_uploading_once() {
    let sink = RecordingSink::new();
    let slot = simulated_slot("passport", &sink);
    let mut states = slot.subscribe();

    let (result, seen) = tokio::join!(slot.select(passport_pdf()), async {
        let mut seen = Vec::new();
        while states.changed().await.is_ok() {
            let state = states.borrow_and_update().clone();
            let settled = matches!(state, SlotState::Uploaded(_) | SlotState::Failed(_));
            seen.push(state.as_str());
            if settled {
                break;
            }
        }
        seen
    });

    let meta = result.expect("upload");
    assert_eq!(seen, vec!["uploading", "uploaded"]);
    assert_eq!(meta.name, "passport.pdf");
    assert_eq!(meta.size, 48_000);
    assert_eq!(meta.mime, "application/pdf");
    assert_eq!(meta.category, MimeCategory::Pdf);
    assert_eq!(meta.origin, FileOrigin::Selected);
    assert_eq!(slot.attachment(), Some(meta));

    let notices = sink.notices();
    assert_eq!(notices.len(), 1);
    assert_eq!(notices[0].message, "Passport uploaded successfully");
}

#[tokio::test(start_paused = true)]
async fn avatar_upload_reports_update() {
    let sink = RecordingSink::new();
    let slot = simulated_slot("avatar", &sink);

    slot.select(SelectedFile::new("me.JPG", 200_000, "image/jpeg"))
        .await
        .expect("upload");

    assert_eq!(
        sink.notices()[0].message,
        "Profile picture updated successfully"
    );
}

#[tokio::test(start_paused = true)]
async fn second_removal_is_a_no_op() {
    let sink = RecordingSink::new();
    let slot = simulated_slot("passport", &sink);
    slot.select(passport_pdf()).await.expect("upload");
    sink.drain();

    assert!(slot.remove().expect("remove"));
    assert_eq!(slot.state(), SlotState::Idle);
    assert!(slot.attachment().is_none());
    assert_eq!(sink.notices().len(), 1);
    assert_eq!(sink.notices()[0].message, "Passport removed");

    assert!(!slot.remove().expect("second remove"));
    assert_eq!(slot.state(), SlotState::Idle);
    assert_eq!(sink.notices().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn slot_rejects_new_work_while_uploading() {
    let sink = RecordingSink::new();
    let slot = simulated_slot("passport", &sink);
    let other = SelectedFile::new("scan.png", 10_000, "image/png");

    let (first, second, removal) = tokio::join!(
        slot.select(passport_pdf()),
        slot.select(other),
        async { slot.remove() }
    );

    assert!(first.is_ok());
    assert_eq!(second.unwrap_err(), SlotError::Busy("passport".into()));
    assert_eq!(removal.unwrap_err(), SlotError::Busy("passport".into()));
    assert_eq!(
        slot.attachment().map(|file| file.name),
        Some("passport.pdf".into())
    );
}

#[tokio::test(start_paused = true)]
async fn sibling_slots_upload_independently() {
    let sink = RecordingSink::new();
    let passport = simulated_slot("passport", &sink);
    let pan = simulated_slot("pan-card", &sink);

    let (a, b) = tokio::join!(
        passport.select(passport_pdf()),
        pan.select(SelectedFile::new("pan.jpeg", 30_000, "image/jpeg"))
    );

    assert!(a.is_ok());
    assert!(b.is_ok());
    assert_eq!(sink.count(NoticeKind::Success), 2);
}

#[tokio::test(start_paused = true)]
async fn failed_upload_can_be_retried() {
    let sink = RecordingSink::new();
    let uploader = FlakyUploader {
        failures: AtomicUsize::new(1),
    };
    let slot = slot_with("passport", Arc::new(uploader), &sink);

    let err = slot.select(passport_pdf()).await.unwrap_err();
    assert_eq!(err, SlotError::Upload(UploadError::new("connection reset")));
    assert_eq!(slot.state(), SlotState::Failed("connection reset".into()));
    assert!(slot.attachment().is_none());
    assert_eq!(
        sink.notices()[0].message,
        "Passport upload failed: connection reset"
    );

    slot.select(passport_pdf()).await.expect("retry");
    assert!(matches!(slot.state(), SlotState::Uploaded(_)));
}

#[tokio::test(start_paused = true)]
async fn clearing_a_failed_slot_is_silent() {
    let sink = RecordingSink::new();
    let uploader = FlakyUploader {
        failures: AtomicUsize::new(1),
    };
    let slot = slot_with("passport", Arc::new(uploader), &sink);
    slot.select(passport_pdf()).await.unwrap_err();
    sink.drain();

    assert!(slot.remove().expect("remove"));
    assert_eq!(slot.state(), SlotState::Idle);
    assert!(sink.notices().is_empty());
}

#[tokio::test(start_paused = true)]
async fn preset_is_rejected_while_uploading() {
    let sink = RecordingSink::new();
    let slot = simulated_slot("avatar", &sink);
    let file = SelectedFile::new("me.png", 200_000, "image/png");

    let (uploaded, preset) = tokio::join!(slot.select(file), async {
        slot.choose_preset("avatar-1")
    });

    assert_eq!(preset.unwrap_err(), SlotError::Busy("avatar".into()));
    let meta = uploaded.expect("upload");
    assert_eq!(meta.origin, FileOrigin::Selected);
    assert_eq!(slot.attachment(), Some(meta));
    assert_eq!(sink.count(NoticeKind::Success), 1);
}

#[tokio::test(start_paused = true)]
async fn abandoned_upload_restores_previous_state() {
    let sink = RecordingSink::new();
    let slot = simulated_slot("passport", &sink);

    let outcome =
        tokio::time::timeout(Duration::from_millis(10), slot.select(passport_pdf())).await;

    assert!(outcome.is_err());
    assert_eq!(slot.state(), SlotState::Idle);
    assert!(sink.notices().is_empty());
}

#[tokio::test(start_paused = true)]
async fn preset_avatar_attaches_without_upload() {
    let sink = RecordingSink::new();
    let slot = simulated_slot("avatar", &sink);

    let meta = slot.choose_preset("avatar-3").expect("preset");
    assert_eq!(meta.origin, FileOrigin::Preset);
    assert_eq!(slot.attachment(), Some(meta));
    assert_eq!(sink.count(NoticeKind::Success), 1);

    assert_eq!(
        slot.choose_preset("avatar-99").unwrap_err(),
        SlotError::UnknownPreset("avatar-99".into())
    );
}
