//! # Portier (credential verification gate)
//!
//! `portier` verifies username/password pairs while slowing down clients that keep
//! getting them wrong.
//!
//! ## Admission
//!
//! Every client identifier (usually the caller's IP) carries a failure count. Each
//! failed verification blocks the client for `base * 2^(failures - 1)` seconds, capped
//! at a maximum. Attempts during a block are refused with the remaining time and never
//! reach the password hash. A success or a quiet period longer than the reset window
//! clears the history.
//!
//! ## Verification
//!
//! Stored credentials are Argon2id PHC strings. The comparison is deliberately slow, so
//! it can run on the blocking thread pool while the async runtime keeps answering other
//! clients. Unknown usernames are compared against a dummy hash and cost the same as a
//! wrong password.
//!
//! ## Audit
//!
//! Every decision (blocked, rejected, success, failure) produces one structured record.
//! Passwords are always masked and long user agents truncated before a record leaves
//! the process.

pub mod api;
pub mod cli;
pub mod guard;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_git_commit_hash_format() {
        if GIT_COMMIT_HASH == "unknown" {
            // Acceptable in non-git build environments
            return;
        }
        assert!(
            GIT_COMMIT_HASH.chars().all(|c| c.is_ascii_hexdigit()),
            "GIT_COMMIT_HASH should be a hex string, got: {GIT_COMMIT_HASH}"
        );
        assert!(
            GIT_COMMIT_HASH.len() >= 7,
            "GIT_COMMIT_HASH should be at least 7 characters long, got: {GIT_COMMIT_HASH}"
        );
    }

    #[test]
    fn test_app_user_agent_format() {
        assert!(APP_USER_AGENT.starts_with(env!("CARGO_PKG_NAME")));
        assert!(APP_USER_AGENT.contains(env!("CARGO_PKG_VERSION")));
    }
}
