//! Credential verification guarded by per-client exponential backoff.
//!
//! The pieces compose in one direction:
//!
//! - [`ClientStateStore`] remembers failures per client identifier and decides admission.
//! - [`BackoffPolicy`] turns a failure count into a block duration.
//! - [`VerificationOffloader`] runs the expensive password comparison, inline or on the
//!   blocking pool, and pads unknown usernames with a dummy comparison.
//! - [`AuditPipeline`] sanitizes one record per decision and fans it out to sinks.
//! - [`AdmissionOrchestrator`] drives a single attempt through all of the above.

pub mod audit;
pub mod backoff;
pub mod clock;
pub mod config;
pub mod credentials;
pub mod orchestrator;
pub mod store;
pub mod validation;
pub mod verifier;

#[cfg(test)]
pub(crate) mod test_support;

pub use audit::{
    AuditEvent, AuditEventType, AuditPipeline, AuditSink, JsonLinesAuditSink, TracingAuditSink,
};
pub use backoff::BackoffPolicy;
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::GuardConfig;
pub use credentials::{CredentialStore, CredentialsError, InMemoryCredentialStore, StoredCredential};
pub use orchestrator::{AdmissionOrchestrator, AttemptOutcome, LoginAttempt};
pub use store::{Admission, ClientAttemptState, ClientStateStore, FailureRecord};
pub use validation::{parse_payload, LoginPayload, PayloadError};
pub use verifier::{Argon2Comparator, HashComparator, OffloadStrategy, VerificationOffloader};

use std::time::Duration;

/// Seconds rounded to three decimals.
#[allow(clippy::cast_precision_loss)]
#[must_use]
pub fn round_seconds(duration: Duration) -> f64 {
    (duration.as_micros() as f64 / 1000.0).round() / 1000.0
}

/// Milliseconds rounded to two decimals.
#[allow(clippy::cast_precision_loss)]
#[must_use]
pub fn round_millis(duration: Duration) -> f64 {
    (duration.as_micros() as f64 / 10.0).round() / 100.0
}
