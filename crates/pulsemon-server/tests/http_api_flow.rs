mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use common::{
    build_test_context, get_text, post_json, post_text, send_request, test_keypair, TestOptions,
};
use pulsemon_codec::pipeline::{
    compression_stage, encryption_stage, signature_stage, Pipeline,
};
use pulsemon_common::headers;
use serde_json::json;

#[tokio::test]
async fn ping_reports_healthy() {
    let ctx = build_test_context(TestOptions::default());
    let (status, body) = get_text(&ctx.app, "/ping").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "OK");
}

#[tokio::test]
async fn counter_text_updates_accumulate() {
    let ctx = build_test_context(TestOptions::default());

    let (status, body) = post_text(&ctx.app, "/update/counter/foo/3").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "3");

    let (status, body) = post_text(&ctx.app, "/update/counter/foo/4").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "7");

    let (status, body) = get_text(&ctx.app, "/value/counter/foo").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "7");
}

#[tokio::test]
async fn gauge_json_round_trip() {
    let ctx = build_test_context(TestOptions::default());

    let (status, _) = post_text(&ctx.app, "/update/gauge/bar/1.5").await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = post_json(&ctx.app, "/value/", json!({"id": "bar", "type": "gauge"})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"id": "bar", "type": "gauge", "value": 1.5}));
}

#[tokio::test]
async fn json_update_returns_stored_metric() {
    let ctx = build_test_context(TestOptions::default());

    let (status, body) = post_json(
        &ctx.app,
        "/update/",
        json!({"id": "hits", "type": "counter", "delta": 5}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"id": "hits", "type": "counter", "delta": 5}));

    let (status, body) = post_json(
        &ctx.app,
        "/update/",
        json!({"id": "hits", "type": "counter", "delta": 2}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"id": "hits", "type": "counter", "delta": 7}));
}

#[tokio::test]
async fn bulk_updates_applied_twice() {
    let ctx = build_test_context(TestOptions::default());
    let batch = json!([
        {"id": "a", "type": "counter", "delta": 1},
        {"id": "b", "type": "gauge", "value": 2.0}
    ]);

    let (status, first) = post_json(&ctx.app, "/updates/", batch.clone()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first[0]["delta"], 1);

    let (status, second) = post_json(&ctx.app, "/updates/", batch).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(second[0]["delta"], 2);
    assert_eq!(second[1]["value"], 2.0);

    let (status, body) = get_text(&ctx.app, "/value/counter/a").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "2");

    let (status, body) = get_text(&ctx.app, "/value/gauge/b").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "2");
}

#[tokio::test]
async fn unknown_metric_is_not_found() {
    let ctx = build_test_context(TestOptions::default());
    let (status, _) = get_text(&ctx.app, "/value/counter/missing").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = post_json(&ctx.app, "/value/", json!({"id": "missing", "type": "gauge"})).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn kind_mismatch_read_is_not_found() {
    let ctx = build_test_context(TestOptions::default());
    post_text(&ctx.app, "/update/counter/foo/3").await;
    let (status, _) = get_text(&ctx.app, "/value/gauge/foo").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn bad_kind_and_bad_value_are_rejected() {
    let ctx = build_test_context(TestOptions::default());

    let (status, _) = post_text(&ctx.app, "/update/histogram/foo/3").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = post_text(&ctx.app, "/update/counter/foo/1.5").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = post_json(&ctx.app, "/update/", json!({"id": "x"})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn index_renders_metrics_table() {
    let ctx = build_test_context(TestOptions::default());
    post_text(&ctx.app, "/update/counter/foo/7").await;
    post_text(&ctx.app, "/update/gauge/bar/1.5").await;

    let (status, body) = get_text(&ctx.app, "/").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("<td>foo</td><td>counter</td><td>7</td>"));
    assert!(body.contains("<td>bar</td><td>gauge</td><td>1.5</td>"));
}

#[tokio::test]
async fn subnet_filter_rejects_outside_address() {
    let ctx = build_test_context(TestOptions {
        trusted_subnet: Some("192.168.0.0/16".to_string()),
        ..TestOptions::default()
    });

    let req = Request::builder()
        .method("POST")
        .uri("/update/counter/foo/3")
        .header(headers::REAL_IP, "10.0.0.1")
        .body(Body::empty())
        .unwrap();
    let (status, _) = send_request(&ctx.app, req).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // Missing header is equally untrusted.
    let (status, _) = post_text(&ctx.app, "/update/counter/foo/3").await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn subnet_filter_accepts_member_address() {
    let ctx = build_test_context(TestOptions {
        trusted_subnet: Some("192.168.0.0/16".to_string()),
        ..TestOptions::default()
    });

    let req = Request::builder()
        .method("POST")
        .uri("/update/counter/foo/3")
        .header(headers::REAL_IP, "192.168.1.20")
        .body(Body::empty())
        .unwrap();
    let (status, body) = send_request(&ctx.app, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(String::from_utf8_lossy(&body), "3");
}

#[tokio::test]
async fn encrypted_compressed_signed_update_round_trips() {
    let secret = "shared-secret".to_string();
    let (private, public) = test_keypair();
    let ctx = build_test_context(TestOptions {
        secret_key: Some(secret.clone()),
        private_key: Some(private),
        ..TestOptions::default()
    });

    let mut pipeline = Pipeline::default();
    pipeline.push(signature_stage(secret.into_bytes()));
    pipeline.push(encryption_stage(public));
    pipeline.push(compression_stage());

    let mut body = serde_json::to_vec(&json!({"id": "secure", "type": "gauge", "value": 42.5}))
        .unwrap();
    let ctx_out = pipeline.run(&mut body).unwrap();

    let req = Request::builder()
        .method("POST")
        .uri("/update/")
        .header("Content-Type", "application/json")
        .header(headers::CONTENT_ENCODING, "gzip")
        .header(headers::SIGNATURE, ctx_out.get(headers::SIGNATURE).unwrap())
        .body(Body::from(body))
        .unwrap();
    let (status, _) = send_request(&ctx.app, req).await;
    assert_eq!(status, StatusCode::OK);

    let (status, value) = get_text(&ctx.app, "/value/gauge/secure").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(value, "42.5");
}

#[tokio::test]
async fn tampered_signature_is_rejected() {
    let secret = "shared-secret".to_string();
    let ctx = build_test_context(TestOptions {
        secret_key: Some(secret.clone()),
        ..TestOptions::default()
    });

    let body = serde_json::to_vec(&json!({"id": "x", "type": "counter", "delta": 1})).unwrap();
    let signature = pulsemon_codec::sign::sign_data(b"different payload", secret.as_bytes());

    let req = Request::builder()
        .method("POST")
        .uri("/update/")
        .header("Content-Type", "application/json")
        .header(headers::SIGNATURE, signature)
        .body(Body::from(body))
        .unwrap();
    let (status, _) = send_request(&ctx.app, req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn unsigned_request_passes_when_secret_configured() {
    let ctx = build_test_context(TestOptions {
        secret_key: Some("shared-secret".to_string()),
        ..TestOptions::default()
    });
    let (status, _) = post_text(&ctx.app, "/update/counter/foo/3").await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn garbled_ciphertext_is_rejected() {
    let (private, _) = test_keypair();
    let ctx = build_test_context(TestOptions {
        private_key: Some(private),
        ..TestOptions::default()
    });

    let req = Request::builder()
        .method("POST")
        .uri("/update/")
        .header("Content-Type", "application/json")
        .body(Body::from(vec![0u8; 64]))
        .unwrap();
    let (status, _) = send_request(&ctx.app, req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn oversized_body_is_rejected() {
    let ctx = build_test_context(TestOptions::default());
    let huge = vec![b'x'; common::MAX_TEST_BODY + 1];
    let req = Request::builder()
        .method("POST")
        .uri("/update/")
        .header("Content-Type", "application/json")
        .body(Body::from(huge))
        .unwrap();
    let (status, _) = send_request(&ctx.app, req).await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
}

#[tokio::test]
async fn sync_save_mode_persists_after_every_mutation() {
    use pulsemon_server::app;
    use pulsemon_server::service::MetricsService;
    use pulsemon_server::state::AppState;
    use pulsemon_storage::memory::MemoryRepository;
    use pulsemon_storage::saver::FileSaver;
    use std::sync::Arc;

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("metrics.json");

    let repo = Arc::new(MemoryRepository::new());
    let mut state = AppState::new(MetricsService::new(repo.clone()));
    state.sync_saver = Some(Arc::new(FileSaver::new(&path, repo)));
    let app = app::build_router(state, common::MAX_TEST_BODY);

    let (status, _) = post_text(&app, "/update/counter/foo/3").await;
    assert_eq!(status, StatusCode::OK);

    let saved: serde_json::Value =
        serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
    assert_eq!(saved[0]["id"], "foo");
    assert_eq!(saved[0]["delta"], 3);
}

#[tokio::test]
async fn gzipped_request_without_other_options_is_accepted() {
    let ctx = build_test_context(TestOptions::default());

    let body = serde_json::to_vec(&json!({"id": "zipped", "type": "counter", "delta": 9})).unwrap();
    let compressed = pulsemon_codec::compress::compress(&body).unwrap();

    let req = Request::builder()
        .method("POST")
        .uri("/update/")
        .header("Content-Type", "application/json")
        .header(headers::CONTENT_ENCODING, "gzip")
        .body(Body::from(compressed))
        .unwrap();
    let (status, _) = send_request(&ctx.app, req).await;
    assert_eq!(status, StatusCode::OK);

    let (status, value) = get_text(&ctx.app, "/value/counter/zipped").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(value, "9");
}
