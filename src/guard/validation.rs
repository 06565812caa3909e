//! Request body parsing and credential shape checks.

use regex::Regex;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::fmt;

use super::config::GuardConfig;

#[derive(Deserialize)]
struct RawPayload {
    #[serde(default)]
    username: String,
    #[serde(default)]
    password: String,
}

/// Login body. Missing fields parse as empty strings and are then rejected by
/// [`validate`].
pub struct LoginPayload {
    pub username: String,
    pub password: SecretString,
}

impl fmt::Debug for LoginPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoginPayload")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PayloadError {
    #[error("invalid_json")]
    InvalidJson,
}

/// Parse a request body into a [`LoginPayload`].
///
/// # Errors
/// Returns `PayloadError::InvalidJson` when the body is not a JSON object with
/// string `username`/`password` fields.
pub fn parse_payload(body: &[u8]) -> Result<LoginPayload, PayloadError> {
    let raw: RawPayload = serde_json::from_slice(body).map_err(|_| PayloadError::InvalidJson)?;
    Ok(LoginPayload {
        username: raw.username,
        password: SecretString::from(raw.password),
    })
}

/// Credentials that passed every shape check.
pub struct Credentials {
    pub username: String,
    pub password: SecretString,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

/// A rejected payload, keeping what was submitted so it can be audited.
#[derive(Debug)]
pub struct Rejection {
    pub reason: &'static str,
    pub username: String,
    pub password: SecretString,
}

fn valid_username_chars(username: &str) -> bool {
    Regex::new(r"^[A-Za-z0-9_.-]+$").is_ok_and(|re| re.is_match(username))
}

/// Check the username and password shape. The first violation wins.
///
/// # Errors
/// Returns a [`Rejection`] carrying the reason string sent back to the client.
pub fn validate(payload: LoginPayload, config: &GuardConfig) -> Result<Credentials, Rejection> {
    let username = payload.username.trim().to_string();
    let password = payload.password;

    let reason = {
        let raw = password.expose_secret();
        if username.is_empty() || raw.is_empty() {
            Some("username/password required")
        } else if username.chars().count() > config.max_username_length() {
            Some("username too long")
        } else if raw.len() > config.max_password_bytes() {
            Some("password too long")
        } else if !valid_username_chars(&username) {
            Some("username has invalid characters")
        } else {
            None
        }
    };

    match reason {
        Some(reason) => Err(Rejection {
            reason,
            username,
            password,
        }),
        None => Ok(Credentials { username, password }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(username: &str, password: &str) -> LoginPayload {
        LoginPayload {
            username: username.to_string(),
            password: SecretString::from(password),
        }
    }

    fn reason(username: &str, password: &str) -> Option<&'static str> {
        validate(payload(username, password), &GuardConfig::new())
            .err()
            .map(|rejection| rejection.reason)
    }

    #[test]
    fn accepts_well_formed_credentials() {
        let result = validate(payload("  user.name-1_ ", "Password123!"), &GuardConfig::new());
        assert!(result.is_ok());
        if let Ok(credentials) = result {
            assert_eq!(credentials.username, "user.name-1_");
        }
    }

    #[test]
    fn requires_both_fields() {
        assert_eq!(reason("", "pw"), Some("username/password required"));
        assert_eq!(reason("user", ""), Some("username/password required"));
        assert_eq!(reason("   ", "pw"), Some("username/password required"));
    }

    #[test]
    fn enforces_username_length() {
        assert_eq!(reason(&"a".repeat(32), "pw"), None);
        assert_eq!(reason(&"a".repeat(33), "pw"), Some("username too long"));
    }

    #[test]
    fn enforces_password_bytes_not_chars() {
        assert_eq!(reason("user", &"p".repeat(72)), None);
        assert_eq!(reason("user", &"p".repeat(73)), Some("password too long"));
        // 37 two-byte characters = 74 bytes
        assert_eq!(reason("user", &"é".repeat(37)), Some("password too long"));
    }

    #[test]
    fn rejects_invalid_username_characters() {
        assert_eq!(
            reason("user name", "pw"),
            Some("username has invalid characters")
        );
        assert_eq!(
            reason("user@host", "pw"),
            Some("username has invalid characters")
        );
    }

    #[test]
    fn length_is_checked_before_characters() {
        assert_eq!(reason(&"!".repeat(40), "pw"), Some("username too long"));
    }

    #[test]
    fn parse_payload_defaults_missing_fields() {
        let parsed = parse_payload(br#"{"username": "user1"}"#);
        assert!(parsed.is_ok());
        if let Ok(parsed) = parsed {
            assert_eq!(parsed.username, "user1");
            assert!(parsed.password.expose_secret().is_empty());
        }
    }

    #[test]
    fn parse_payload_rejects_garbage() {
        assert_eq!(
            parse_payload(b"not json").err(),
            Some(PayloadError::InvalidJson)
        );
        assert_eq!(
            parse_payload(b"42").err(),
            Some(PayloadError::InvalidJson)
        );
    }

    #[test]
    fn debug_hides_password() {
        let rendered = format!("{:?}", payload("user1", "Password123!"));
        assert!(!rendered.contains("Password123!"));
    }
}
