//! Tunables for backoff, failure-history expiry, input limits and audit truncation.

use std::time::Duration;

const DEFAULT_BASE_BACKOFF: Duration = Duration::from_secs(1);
const DEFAULT_MAX_BACKOFF: Duration = Duration::from_secs(60);
const DEFAULT_RESET_WINDOW: Duration = Duration::from_secs(300);
const DEFAULT_MAX_USERNAME_LENGTH: usize = 32;
// The hash primitive only looks at the first 72 bytes of a password.
const DEFAULT_MAX_PASSWORD_BYTES: usize = 72;
const DEFAULT_USER_AGENT_LIMIT: usize = 120;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GuardConfig {
    base_backoff: Duration,
    max_backoff: Duration,
    reset_window: Duration,
    max_username_length: usize,
    max_password_bytes: usize,
    user_agent_limit: usize,
}

impl GuardConfig {
    /// Default config: 1s->60s exponential backoff, failure history dropped after
    /// 5 minutes of inactivity, 32 character usernames and 72 byte passwords.
    #[must_use]
    pub fn new() -> Self {
        Self {
            base_backoff: DEFAULT_BASE_BACKOFF,
            max_backoff: DEFAULT_MAX_BACKOFF,
            reset_window: DEFAULT_RESET_WINDOW,
            max_username_length: DEFAULT_MAX_USERNAME_LENGTH,
            max_password_bytes: DEFAULT_MAX_PASSWORD_BYTES,
            user_agent_limit: DEFAULT_USER_AGENT_LIMIT,
        }
    }

    #[must_use]
    pub fn with_base_backoff_seconds(mut self, seconds: u64) -> Self {
        self.base_backoff = Duration::from_secs(seconds);
        self
    }

    #[must_use]
    pub fn with_max_backoff_seconds(mut self, seconds: u64) -> Self {
        self.max_backoff = Duration::from_secs(seconds);
        self
    }

    #[must_use]
    pub fn with_reset_window_seconds(mut self, seconds: u64) -> Self {
        self.reset_window = Duration::from_secs(seconds);
        self
    }

    #[must_use]
    pub fn with_max_username_length(mut self, length: usize) -> Self {
        self.max_username_length = length;
        self
    }

    #[must_use]
    pub fn with_max_password_bytes(mut self, bytes: usize) -> Self {
        self.max_password_bytes = bytes;
        self
    }

    #[must_use]
    pub fn with_user_agent_limit(mut self, limit: usize) -> Self {
        self.user_agent_limit = limit;
        self
    }

    /// Clamp values into a usable range: zero durations and lengths fall back to
    /// one unit, and the backoff ceiling is never below the base.
    #[must_use]
    pub fn normalize(self) -> Self {
        let base_backoff = if self.base_backoff.is_zero() {
            Duration::from_secs(1)
        } else {
            self.base_backoff
        };
        let max_backoff = if self.max_backoff < base_backoff {
            base_backoff
        } else {
            self.max_backoff
        };
        let reset_window = if self.reset_window.is_zero() {
            Duration::from_secs(1)
        } else {
            self.reset_window
        };
        Self {
            base_backoff,
            max_backoff,
            reset_window,
            max_username_length: self.max_username_length.max(1),
            max_password_bytes: self.max_password_bytes.max(1),
            user_agent_limit: self.user_agent_limit.max(1),
        }
    }

    #[must_use]
    pub fn base_backoff(&self) -> Duration {
        self.base_backoff
    }

    #[must_use]
    pub fn max_backoff(&self) -> Duration {
        self.max_backoff
    }

    #[must_use]
    pub fn reset_window(&self) -> Duration {
        self.reset_window
    }

    #[must_use]
    pub fn max_username_length(&self) -> usize {
        self.max_username_length
    }

    #[must_use]
    pub fn max_password_bytes(&self) -> usize {
        self.max_password_bytes
    }

    #[must_use]
    pub fn user_agent_limit(&self) -> usize {
        self.user_agent_limit
    }
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self::new()
    }
}
