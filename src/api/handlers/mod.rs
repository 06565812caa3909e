//! Route handlers and the request metadata helpers they share.

pub mod health;
pub mod login;

use axum::http::{header::USER_AGENT, HeaderMap};
use std::net::SocketAddr;

/// Identifier used for rate limiting when nothing better is known.
pub const UNKNOWN_CLIENT: &str = "unknown";

/// Client identifier: first `X-Forwarded-For` entry, then `X-Real-IP`, then the peer address.
pub fn extract_client_id(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|value| !value.is_empty());
    if let Some(forwarded) = forwarded {
        return forwarded.to_string();
    }

    headers
        .get("x-real-ip")
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .or_else(|| peer.map(|addr| addr.ip().to_string()))
        .unwrap_or_else(|| UNKNOWN_CLIENT.to_string())
}

pub fn extract_user_agent(headers: &HeaderMap) -> String {
    headers
        .get(USER_AGENT)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_string()
}
