#![allow(dead_code)]

use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use pulsemon_server::app;
use pulsemon_server::service::MetricsService;
use pulsemon_server::state::AppState;
use pulsemon_storage::memory::MemoryRepository;
use rsa::{RsaPrivateKey, RsaPublicKey};
use serde_json::Value;
use tower::util::ServiceExt;

pub const MAX_TEST_BODY: usize = 64 * 1024;

pub struct TestContext {
    pub state: AppState,
    pub app: Router,
}

#[derive(Default)]
pub struct TestOptions {
    pub secret_key: Option<String>,
    pub private_key: Option<RsaPrivateKey>,
    pub trusted_subnet: Option<String>,
}

pub fn build_test_context(options: TestOptions) -> TestContext {
    let repo = Arc::new(MemoryRepository::new());
    let mut state = AppState::new(MetricsService::new(repo));

    if let Some(secret) = options.secret_key {
        state.secret_key = Some(secret.into_bytes());
    }
    if let Some(key) = options.private_key {
        state.private_key = Some(Arc::new(key));
    }
    if let Some(subnet) = options.trusted_subnet {
        state.trusted_subnet = Some(subnet.parse().expect("subnet should parse"));
    }

    let app = app::build_router(state.clone(), MAX_TEST_BODY);
    TestContext { state, app }
}

pub fn test_keypair() -> (RsaPrivateKey, RsaPublicKey) {
    let mut rng = rand::thread_rng();
    let private = RsaPrivateKey::new(&mut rng, 2048).expect("keygen should succeed");
    let public = RsaPublicKey::from(&private);
    (private, public)
}

pub async fn read_body(resp: axum::response::Response) -> Vec<u8> {
    to_bytes(resp.into_body(), usize::MAX)
        .await
        .expect("body should read")
        .to_vec()
}

/// Sends a request and returns status + raw body.
pub async fn send_request(app: &Router, req: Request<Body>) -> (StatusCode, Vec<u8>) {
    let resp = app
        .clone()
        .oneshot(req)
        .await
        .expect("request should be handled");
    let status = resp.status();
    (status, read_body(resp).await)
}

pub async fn post_text(app: &Router, uri: &str) -> (StatusCode, String) {
    let req = Request::builder()
        .method("POST")
        .uri(uri)
        .body(Body::empty())
        .expect("request should build");
    let (status, body) = send_request(app, req).await;
    (status, String::from_utf8_lossy(&body).to_string())
}

pub async fn get_text(app: &Router, uri: &str) -> (StatusCode, String) {
    let req = Request::builder()
        .uri(uri)
        .body(Body::empty())
        .expect("request should build");
    let (status, body) = send_request(app, req).await;
    (status, String::from_utf8_lossy(&body).to_string())
}

pub async fn post_json(app: &Router, uri: &str, body: Value) -> (StatusCode, Value) {
    let req = Request::builder()
        .method("POST")
        .uri(uri)
        .header("Content-Type", "application/json")
        .body(Body::from(body.to_string()))
        .expect("request should build");
    let (status, bytes) = send_request(app, req).await;
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).to_string()))
    };
    (status, json)
}
