//! Synchronous submission rejections: bad payloads and unknown kinds leave
//! no trace behind.

mod common;

use common::Harness;
use serde_json::json;
use tracklab_core::jobs::SubmitError;

#[tokio::test]
async fn unknown_kind_fails_without_creating_anything() {
    let h = Harness::new();

    let err = h
        .gateway
        .submit("frobnicate", json!({"file_path": "a.wav"}))
        .await
        .unwrap_err();
    assert!(matches!(err, SubmitError::UnknownKind(_)));
    assert!(err.to_string().contains("frobnicate"));

    assert_eq!(h.backend.record_count(), 0);
    assert_eq!(h.backend.queue_len(), 0);
    assert_eq!(h.events.publish_count(), 0);
}

#[tokio::test]
async fn missing_required_field_is_rejected() {
    let h = Harness::new();

    let err = h.gateway.submit("analyze", json!({})).await.unwrap_err();
    assert!(matches!(err, SubmitError::Validation(_)));
    assert_eq!(h.backend.record_count(), 0);
}

#[tokio::test]
async fn wrong_field_type_is_rejected() {
    let h = Harness::new();

    let err = h
        .gateway
        .submit("align", json!({"vocal_path": "v.wav", "target_bpm": "fast"}))
        .await
        .unwrap_err();
    assert!(matches!(err, SubmitError::Validation(_)));
}

#[tokio::test]
async fn out_of_range_number_is_rejected() {
    let h = Harness::new();

    let err = h
        .gateway
        .submit("align", json!({"vocal_path": "v.wav", "target_bpm": -10.0}))
        .await
        .unwrap_err();
    assert!(matches!(err, SubmitError::Validation(_)));

    let err = h
        .gateway
        .submit("autotune", json!({"vocal_path": "v.wav", "strength": 2.0}))
        .await
        .unwrap_err();
    assert!(matches!(err, SubmitError::Validation(_)));
}

#[tokio::test]
async fn unknown_payload_fields_are_rejected() {
    let h = Harness::new();

    let err = h
        .gateway
        .submit("denoise", json!({"vocal_path": "v.wav", "gain": 3}))
        .await
        .unwrap_err();
    assert!(matches!(err, SubmitError::Validation(_)));
    assert_eq!(h.backend.record_count(), 0);
}
