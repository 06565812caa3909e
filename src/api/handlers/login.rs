use super::{extract_client_id, extract_user_agent};
use crate::guard::{
    parse_payload, round_millis, round_seconds, AdmissionOrchestrator, AttemptOutcome,
    LoginAttempt,
};
use axum::{
    body::Bytes,
    extract::{ConnectInfo, Extension, Query},
    http::{header::RETRY_AFTER, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use std::{net::SocketAddr, sync::Arc, time::Duration};
use utoipa::{IntoParams, ToSchema};

/// Documented request body. The handler parses raw bytes so malformed JSON gets its own answer.
#[derive(ToSchema, Deserialize, Debug)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(IntoParams, Deserialize, Debug, Default)]
#[into_params(parameter_in = Query)]
pub struct LoginQuery {
    /// `1` or `true` asks for the comparison to run off the request task
    /// when the server is configured for `on-request` offloading.
    offload: Option<String>,
}

impl LoginQuery {
    fn offload_requested(&self) -> bool {
        matches!(self.offload.as_deref(), Some("1" | "true" | "yes"))
    }
}

#[derive(ToSchema, Serialize, Deserialize, Debug, Default, PartialEq)]
pub struct LoginResponse {
    ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    retry_after_seconds: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    failure_count: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    backoff_seconds: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    verification_elapsed_ms: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    verification_elapsed_seconds: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    offloaded: Option<bool>,
}

impl LoginResponse {
    fn failed(reason: &str) -> Self {
        Self {
            ok: false,
            reason: Some(reason.to_string()),
            ..Self::default()
        }
    }
}

#[utoipa::path(
    post,
    path = "/login",
    params(LoginQuery),
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Credentials verified", body = LoginResponse),
        (status = 400, description = "Malformed body or invalid username/password shape", body = LoginResponse),
        (status = 401, description = "Credentials did not match; client is now backing off", body = LoginResponse),
        (status = 429, description = "Client is blocked; see Retry-After", body = LoginResponse),
    ),
    tag = "login"
)]
pub async fn login(
    Extension(orchestrator): Extension<Arc<AdmissionOrchestrator>>,
    peer: Option<ConnectInfo<SocketAddr>>,
    query: Option<Query<LoginQuery>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let query = query.map(|Query(query)| query).unwrap_or_default();
    let attempt = LoginAttempt {
        client_id: extract_client_id(&headers, peer.map(|ConnectInfo(addr)| addr)),
        user_agent: extract_user_agent(&headers),
        offload_requested: query.offload_requested(),
        payload: parse_payload(&body),
    };

    outcome_response(orchestrator.attempt(attempt).await)
}

fn outcome_response(outcome: AttemptOutcome) -> Response {
    match outcome {
        AttemptOutcome::RateLimited { retry_after } => {
            let mut headers = HeaderMap::new();
            headers.insert(RETRY_AFTER, HeaderValue::from(retry_after_header(retry_after)));
            let body = LoginResponse {
                retry_after_seconds: Some(round_seconds(retry_after)),
                ..LoginResponse::failed("rate_limited")
            };
            (StatusCode::TOO_MANY_REQUESTS, headers, Json(body)).into_response()
        }
        AttemptOutcome::Malformed(err) => (
            StatusCode::BAD_REQUEST,
            Json(LoginResponse::failed(&err.to_string())),
        )
            .into_response(),
        AttemptOutcome::Rejected { reason } => {
            (StatusCode::BAD_REQUEST, Json(LoginResponse::failed(reason))).into_response()
        }
        AttemptOutcome::Authenticated { elapsed, offloaded } => {
            let body = LoginResponse {
                ok: true,
                message: Some("authenticated".to_string()),
                verification_elapsed_ms: Some(round_millis(elapsed)),
                verification_elapsed_seconds: Some(round_seconds(elapsed)),
                offloaded: Some(offloaded),
                ..LoginResponse::default()
            };
            (StatusCode::OK, Json(body)).into_response()
        }
        AttemptOutcome::InvalidCredentials {
            failure_count,
            backoff,
            elapsed,
            offloaded,
        } => {
            let body = LoginResponse {
                failure_count: Some(failure_count),
                backoff_seconds: Some(round_seconds(backoff)),
                retry_after_seconds: Some(round_seconds(backoff)),
                verification_elapsed_ms: Some(round_millis(elapsed)),
                verification_elapsed_seconds: Some(round_seconds(elapsed)),
                offloaded: Some(offloaded),
                ..LoginResponse::failed("invalid_credentials")
            };
            (StatusCode::UNAUTHORIZED, Json(body)).into_response()
        }
    }
}

/// Whole seconds, rounded up so clients never retry early.
fn retry_after_header(retry_after: Duration) -> u64 {
    retry_after.as_secs() + u64::from(retry_after.subsec_nanos() > 0)
}
