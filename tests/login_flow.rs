//! Drives the HTTP router end-to-end with in-memory credentials and a manual clock.

use anyhow::Result;
use argon2::Params;
use axum::{
    body::{to_bytes, Body},
    http::{
        header::{CONTENT_TYPE, RETRY_AFTER, USER_AGENT},
        Request, StatusCode,
    },
    Router,
};
use portier::guard::{
    AdmissionOrchestrator, Argon2Comparator, AuditPipeline, AuditSink, ClientStateStore,
    GuardConfig, HashComparator, InMemoryCredentialStore, ManualClock, OffloadStrategy,
    VerificationOffloader,
};
use serde_json::{json, Map, Value};
use std::{
    sync::{Arc, Mutex},
    time::Duration,
};
use tower::ServiceExt;

#[derive(Default)]
struct MemorySink(Mutex<Vec<Map<String, Value>>>);

impl AuditSink for MemorySink {
    fn emit(&self, record: &Map<String, Value>) -> Result<()> {
        self.0
            .lock()
            .map_err(|_| anyhow::anyhow!("poisoned"))?
            .push(record.clone());
        Ok(())
    }
}

impl MemorySink {
    fn records(&self) -> Vec<Map<String, Value>> {
        self.0.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

struct TestApp {
    router: Router,
    clock: Arc<ManualClock>,
    sink: Arc<MemorySink>,
}

fn test_app(strategy: OffloadStrategy) -> Result<TestApp> {
    let config = GuardConfig::new();
    let comparator = Arc::new(Argon2Comparator::with_params(
        Params::new(64, 1, 1, None).map_err(|e| anyhow::anyhow!("{e}"))?,
    ));

    let mut credentials = InMemoryCredentialStore::new();
    credentials.insert("user1", comparator.hash(b"Password123!")?);

    let clock = Arc::new(ManualClock::new());
    let store = Arc::new(ClientStateStore::with_clock(&config, clock.clone()));
    let offloader = Arc::new(VerificationOffloader::new(
        Arc::new(credentials),
        comparator,
        strategy,
    )?);

    let sink = Arc::new(MemorySink::default());
    let audit = Arc::new(AuditPipeline::new(&config).with_sink(sink.clone()));

    let orchestrator = Arc::new(AdmissionOrchestrator::new(config, store, offloader, audit));

    Ok(TestApp {
        router: portier::api::app(orchestrator),
        clock,
        sink,
    })
}

fn login_request(client: &str, body: &str, query: &str) -> Result<Request<Body>> {
    Ok(Request::builder()
        .method("POST")
        .uri(format!("/login{query}"))
        .header(CONTENT_TYPE, "application/json")
        .header("x-forwarded-for", client)
        .header(USER_AGENT, "login-flow-test/1.0")
        .body(Body::from(body.to_string()))?)
}

fn credentials(username: &str, password: &str) -> String {
    json!({ "username": username, "password": password }).to_string()
}

async fn send(app: &TestApp, request: Request<Body>) -> Result<(StatusCode, Option<String>, Value)> {
    let response = app.router.clone().oneshot(request).await?;
    let status = response.status();
    let retry_after = response
        .headers()
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let body = to_bytes(response.into_body(), usize::MAX).await?;
    Ok((status, retry_after, serde_json::from_slice(&body)?))
}

#[tokio::test]
async fn correct_password_is_authenticated() -> Result<()> {
    let app = test_app(OffloadStrategy::Always)?;
    let (status, _, body) = send(
        &app,
        login_request("10.0.0.1", &credentials("user1", "Password123!"), "")?,
    )
    .await?;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ok"], json!(true));
    assert_eq!(body["message"], json!("authenticated"));
    assert_eq!(body["offloaded"], json!(true));
    assert!(body["verification_elapsed_ms"].is_number());
    assert!(body["verification_elapsed_seconds"].is_number());
    Ok(())
}

#[tokio::test]
async fn failures_back_off_per_client() -> Result<()> {
    let app = test_app(OffloadStrategy::Never)?;

    let (status, _, body) = send(
        &app,
        login_request("10.0.0.2", &credentials("user1", "wrong"), "")?,
    )
    .await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["reason"], json!("invalid_credentials"));
    assert_eq!(body["failure_count"], json!(1));
    assert_eq!(body["backoff_seconds"], json!(1.0));
    assert_eq!(body["retry_after_seconds"], json!(1.0));

    // Correct password, but the client is still blocked.
    let (status, retry_after, body) = send(
        &app,
        login_request("10.0.0.2", &credentials("user1", "Password123!"), "")?,
    )
    .await?;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(retry_after.as_deref(), Some("1"));
    assert_eq!(body["reason"], json!("rate_limited"));
    assert_eq!(body["retry_after_seconds"], json!(1.0));

    // Another client is unaffected.
    let (status, _, _) = send(
        &app,
        login_request("10.0.0.3", &credentials("user1", "Password123!"), "")?,
    )
    .await?;
    assert_eq!(status, StatusCode::OK);

    app.clock.advance(Duration::from_secs(1));
    let (status, _, _) = send(
        &app,
        login_request("10.0.0.2", &credentials("user1", "Password123!"), "")?,
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    Ok(())
}

#[tokio::test]
async fn unknown_user_looks_like_wrong_password() -> Result<()> {
    let app = test_app(OffloadStrategy::Never)?;
    let (status, _, body) = send(
        &app,
        login_request("10.0.0.4", &credentials("ghost", "Password123!"), "")?,
    )
    .await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["reason"], json!("invalid_credentials"));
    assert_eq!(body["failure_count"], json!(1));
    Ok(())
}

#[tokio::test]
async fn malformed_body_is_bad_request_and_not_audited() -> Result<()> {
    let app = test_app(OffloadStrategy::Never)?;
    let (status, _, body) = send(&app, login_request("10.0.0.5", "{not json", "")?).await?;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({ "ok": false, "reason": "invalid_json" }));
    assert!(app.sink.records().is_empty());
    Ok(())
}

#[tokio::test]
async fn invalid_input_is_rejected_and_audited() -> Result<()> {
    let app = test_app(OffloadStrategy::Never)?;
    let long_username = "a".repeat(33);
    let (status, _, body) = send(
        &app,
        login_request("10.0.0.6", &credentials(&long_username, "pw"), "")?,
    )
    .await?;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({ "ok": false, "reason": "username too long" }));

    let records = app.sink.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0]["event_type"], json!("login_rejected"));
    assert_eq!(records[0]["client_id"], json!("10.0.0.6"));
    assert_eq!(records[0]["username"], json!("a".repeat(32)));
    assert_eq!(records[0]["password"], json!("***MASKED***"));
    Ok(())
}

#[tokio::test]
async fn offload_follows_query_flag_when_requested() -> Result<()> {
    let app = test_app(OffloadStrategy::OnRequest)?;

    let (_, _, body) = send(
        &app,
        login_request("10.0.0.7", &credentials("user1", "Password123!"), "?offload=1")?,
    )
    .await?;
    assert_eq!(body["offloaded"], json!(true));

    let (_, _, body) = send(
        &app,
        login_request("10.0.0.7", &credentials("user1", "Password123!"), "")?,
    )
    .await?;
    assert_eq!(body["offloaded"], json!(false));
    Ok(())
}

#[tokio::test]
async fn audit_user_agent_is_truncated() -> Result<()> {
    let app = test_app(OffloadStrategy::Never)?;
    let request = Request::builder()
        .method("POST")
        .uri("/login")
        .header("x-forwarded-for", "10.0.0.8")
        .header(USER_AGENT, "x".repeat(200))
        .body(Body::from(credentials("user1", "Password123!")))?;
    let (status, _, _) = send(&app, request).await?;
    assert_eq!(status, StatusCode::OK);

    let records = app.sink.records();
    let user_agent = records[0]["user_agent"].as_str().unwrap_or_default();
    assert_eq!(user_agent, format!("{}...(truncated)", "x".repeat(120)));
    Ok(())
}

#[tokio::test]
async fn health_and_request_id() -> Result<()> {
    let app = test_app(OffloadStrategy::Never)?;
    let response = app
        .router
        .clone()
        .oneshot(Request::builder().uri("/health").body(Body::empty())?)
        .await?;

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("x-app"));
    assert!(response.headers().contains_key("x-request-id"));

    let body = to_bytes(response.into_body(), usize::MAX).await?;
    let body: Value = serde_json::from_slice(&body)?;
    assert_eq!(body["ok"], json!(true));
    assert_eq!(body["name"], json!("portier"));
    Ok(())
}
