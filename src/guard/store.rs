//! Per-client failure history.
//!
//! Every read-modify-write goes through one map-wide lock. Operations hold it for a
//! handful of field updates only; password verification never runs under it.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::debug;

use super::{
    backoff::BackoffPolicy,
    clock::{Clock, SystemClock},
    config::GuardConfig,
};

/// Attempt history for one client identifier.
///
/// `failure_count == 0` implies both timestamps are `None`. When set,
/// `blocked_until == last_failure_at + backoff(failure_count)`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ClientAttemptState {
    failure_count: u32,
    blocked_until: Option<Instant>,
    last_failure_at: Option<Instant>,
}

impl ClientAttemptState {
    #[must_use]
    pub fn failure_count(&self) -> u32 {
        self.failure_count
    }

    #[must_use]
    pub fn blocked_until(&self) -> Option<Instant> {
        self.blocked_until
    }

    #[must_use]
    pub fn last_failure_at(&self) -> Option<Instant> {
        self.last_failure_at
    }

    fn reset(&mut self) {
        *self = Self::default();
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Admission {
    Admitted,
    Blocked { retry_after: Duration },
}

impl Admission {
    #[must_use]
    pub fn is_admitted(&self) -> bool {
        matches!(self, Self::Admitted)
    }

    #[must_use]
    pub fn retry_after(&self) -> Duration {
        match self {
            Self::Admitted => Duration::ZERO,
            Self::Blocked { retry_after } => *retry_after,
        }
    }
}

/// Result of recording a failed verification.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FailureRecord {
    pub failure_count: u32,
    pub backoff: Duration,
}

#[derive(Debug)]
pub struct ClientStateStore {
    states: Mutex<HashMap<String, ClientAttemptState>>,
    backoff: BackoffPolicy,
    reset_window: Duration,
    clock: Arc<dyn Clock>,
}

impl ClientStateStore {
    #[must_use]
    pub fn new(config: &GuardConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    #[must_use]
    pub fn with_clock(config: &GuardConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            states: Mutex::new(HashMap::new()),
            backoff: BackoffPolicy::from_config(config),
            reset_window: config.reset_window(),
            clock,
        }
    }

    /// Atomically fetch-or-create the state for `client_id` and run `update` on it.
    ///
    /// This is the only way state is created; every public operation funnels
    /// through here so "read or insert, then mutate" is a single critical section.
    pub async fn upsert<R>(
        &self,
        client_id: &str,
        update: impl FnOnce(&mut ClientAttemptState, Instant) -> R,
    ) -> R {
        let mut states = self.states.lock().await;
        let now = self.clock.now();
        let state = states.entry(client_id.to_string()).or_default();
        update(state, now)
    }

    /// Decide whether `client_id` may attempt a login right now.
    ///
    /// Failure history older than the reset window is discarded first.
    pub async fn check_admission(&self, client_id: &str) -> Admission {
        let reset_window = self.reset_window;
        self.upsert(client_id, |state, now| {
            if state.failure_count > 0 {
                let expired = state
                    .last_failure_at
                    .is_some_and(|at| now.saturating_duration_since(at) >= reset_window);
                if expired {
                    debug!(client_id, "failure history expired");
                    state.reset();
                }
            }

            match state.blocked_until {
                Some(until) if now < until => Admission::Blocked {
                    retry_after: until.saturating_duration_since(now),
                },
                _ => Admission::Admitted,
            }
        })
        .await
    }

    /// Count one more consecutive failure and start a new lockout.
    pub async fn record_failure(&self, client_id: &str) -> FailureRecord {
        let backoff_policy = self.backoff;
        self.upsert(client_id, |state, now| {
            state.failure_count = state.failure_count.saturating_add(1);
            state.last_failure_at = Some(now);
            let backoff = backoff_policy.compute(state.failure_count);
            state.blocked_until = Some(now + backoff);
            FailureRecord {
                failure_count: state.failure_count,
                backoff,
            }
        })
        .await
    }

    /// Clear failure history. Clients without recorded state are left untouched.
    pub async fn record_success(&self, client_id: &str) {
        let mut states = self.states.lock().await;
        if let Some(state) = states.get_mut(client_id) {
            state.reset();
        }
    }

    /// Copy of the current state, if the client has been seen.
    pub async fn snapshot(&self, client_id: &str) -> Option<ClientAttemptState> {
        self.states.lock().await.get(client_id).copied()
    }

    /// Number of tracked client identifiers.
    pub async fn len(&self) -> usize {
        self.states.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.states.lock().await.is_empty()
    }
}
