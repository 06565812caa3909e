//! Request lifecycle: admission check, input validation, verification, state update, audit.
//!
//! ```text
//! Start -> AdmissionChecked -> Blocked                         (429, login_blocked)
//!                           -> Malformed                       (400, not audited)
//!                           -> InputValidated -> Rejected      (400, login_rejected)
//!                                             -> Verified -> Success (200, login_success)
//!                                                         -> Failure (401, login_fail)
//! ```
//!
//! Nothing is kept between requests here; cross-request memory lives in the
//! [`ClientStateStore`].

use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument, warn};

use super::{
    audit::{AuditEvent, AuditEventType, AuditPipeline},
    config::GuardConfig,
    store::{Admission, ClientStateStore},
    validation::{validate, LoginPayload, PayloadError},
    verifier::VerificationOffloader,
};

/// One login request as seen by the core.
#[derive(Debug)]
pub struct LoginAttempt {
    pub client_id: String,
    pub user_agent: String,
    /// Only consulted when the offload strategy is `OnRequest`.
    pub offload_requested: bool,
    pub payload: Result<LoginPayload, PayloadError>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AttemptOutcome {
    RateLimited {
        retry_after: Duration,
    },
    Malformed(PayloadError),
    Rejected {
        reason: &'static str,
    },
    Authenticated {
        elapsed: Duration,
        offloaded: bool,
    },
    InvalidCredentials {
        failure_count: u32,
        backoff: Duration,
        elapsed: Duration,
        offloaded: bool,
    },
}

pub struct AdmissionOrchestrator {
    config: GuardConfig,
    store: Arc<ClientStateStore>,
    offloader: Arc<VerificationOffloader>,
    audit: Arc<AuditPipeline>,
}

impl AdmissionOrchestrator {
    #[must_use]
    pub fn new(
        config: GuardConfig,
        store: Arc<ClientStateStore>,
        offloader: Arc<VerificationOffloader>,
        audit: Arc<AuditPipeline>,
    ) -> Self {
        Self {
            config,
            store,
            offloader,
            audit,
        }
    }

    /// Run one login attempt to completion. Never fails; every path maps to an outcome.
    #[instrument(skip_all, fields(client_id = %attempt.client_id))]
    pub async fn attempt(&self, attempt: LoginAttempt) -> AttemptOutcome {
        let LoginAttempt {
            client_id,
            user_agent,
            offload_requested,
            payload,
        } = attempt;

        if let Admission::Blocked { retry_after } = self.store.check_admission(&client_id).await {
            info!(
                retry_after_ms = u64::try_from(retry_after.as_millis()).unwrap_or(u64::MAX),
                "Login blocked"
            );
            self.audit.record_event(
                AuditEvent::new(AuditEventType::LoginBlocked, &client_id)
                    .retry_after(retry_after)
                    .user_agent(&user_agent),
            );
            return AttemptOutcome::RateLimited { retry_after };
        }

        let payload = match payload {
            Ok(payload) => payload,
            Err(err) => {
                debug!("Malformed login payload: {err}");
                return AttemptOutcome::Malformed(err);
            }
        };

        let credentials = match validate(payload, &self.config) {
            Ok(credentials) => credentials,
            Err(rejection) => {
                debug!(reason = rejection.reason, "Login input rejected");
                self.audit.record_event(
                    AuditEvent::new(AuditEventType::LoginRejected, &client_id)
                        .username(&rejection.username)
                        .password(&rejection.password)
                        .reason(rejection.reason)
                        .user_agent(&user_agent),
                );
                return AttemptOutcome::Rejected {
                    reason: rejection.reason,
                };
            }
        };

        let started = Instant::now();
        let verification = self
            .offloader
            .verify(
                &credentials.username,
                &credentials.password,
                offload_requested,
            )
            .await;
        let elapsed = started.elapsed();
        debug!(
            comparison_ms = u64::try_from(verification.elapsed.as_millis()).unwrap_or(u64::MAX),
            offloaded = verification.offloaded,
            "Password verification finished"
        );

        if verification.verified {
            self.store.record_success(&client_id).await;
            info!(username = %credentials.username, "Login succeeded");
            self.audit.record_event(
                AuditEvent::new(AuditEventType::LoginSuccess, &client_id)
                    .username(&credentials.username)
                    .password(&credentials.password)
                    .verification_elapsed(elapsed)
                    .offloaded(verification.offloaded)
                    .user_agent(&user_agent),
            );
            return AttemptOutcome::Authenticated {
                elapsed,
                offloaded: verification.offloaded,
            };
        }

        let failure = self.store.record_failure(&client_id).await;
        warn!(
            username = %credentials.username,
            failure_count = failure.failure_count,
            "Login failed"
        );
        self.audit.record_event(
            AuditEvent::new(AuditEventType::LoginFail, &client_id)
                .username(&credentials.username)
                .password(&credentials.password)
                .failure_count(failure.failure_count)
                .backoff(failure.backoff)
                .verification_elapsed(elapsed)
                .offloaded(verification.offloaded)
                .user_agent(&user_agent),
        );

        AttemptOutcome::InvalidCredentials {
            failure_count: failure.failure_count,
            backoff: failure.backoff,
            elapsed,
            offloaded: verification.offloaded,
        }
    }
}

impl std::fmt::Debug for AdmissionOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdmissionOrchestrator")
            .field("config", &self.config)
            .field("offloader", &self.offloader)
            .finish_non_exhaustive()
    }
}
