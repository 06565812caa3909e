//! Password comparison, optionally moved off the async executor.
//!
//! The comparison is CPU-bound by construction. Running it on the blocking pool keeps
//! admission checks for other clients responsive while a hash is being computed;
//! running it inline is cheaper for tests and tiny deployments. Both paths return
//! the same answer for the same input.

use argon2::{
    Algorithm, Argon2, Params, PasswordHash, PasswordHasher, PasswordVerifier, Version,
    password_hash::SaltString,
};
use rand::{rngs::OsRng, RngCore};
use secrecy::{ExposeSecret, SecretString};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error};

use super::credentials::{CredentialStore, CredentialsError, StoredCredential};

/// The expensive hash primitive, treated as a black box.
pub trait HashComparator: Send + Sync {
    /// Produce a stored credential for `password`.
    ///
    /// # Errors
    /// Returns an error if the primitive rejects its input or parameters.
    fn hash(&self, password: &[u8]) -> Result<StoredCredential, CredentialsError>;

    /// `true` when `password` matches `stored`. Malformed hashes never match.
    fn compare(&self, password: &[u8], stored: &StoredCredential) -> bool;
}

/// Argon2id over PHC strings.
#[derive(Clone, Debug)]
pub struct Argon2Comparator {
    params: Params,
}

impl Argon2Comparator {
    #[must_use]
    pub fn new() -> Self {
        Self {
            params: Params::default(),
        }
    }

    /// Cost parameters only affect newly produced hashes; verification reads the
    /// parameters embedded in the stored PHC string.
    #[must_use]
    pub fn with_params(params: Params) -> Self {
        Self { params }
    }

    fn argon2(&self) -> Argon2<'static> {
        Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params.clone())
    }
}

impl Default for Argon2Comparator {
    fn default() -> Self {
        Self::new()
    }
}

impl HashComparator for Argon2Comparator {
    fn hash(&self, password: &[u8]) -> Result<StoredCredential, CredentialsError> {
        let salt = SaltString::generate(&mut OsRng);
        self.argon2()
            .hash_password(password, &salt)
            .map(|hash| StoredCredential::new(hash.to_string()))
            .map_err(|err| CredentialsError::Hash(err.to_string()))
    }

    fn compare(&self, password: &[u8], stored: &StoredCredential) -> bool {
        PasswordHash::new(stored.as_str())
            .is_ok_and(|hash| self.argon2().verify_password(password, &hash).is_ok())
    }
}

/// Where the comparison runs.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OffloadStrategy {
    /// Always on the blocking pool.
    #[default]
    Always,
    /// Always inline on the calling task.
    Never,
    /// On the blocking pool only when the request asks for it.
    OnRequest,
}

impl OffloadStrategy {
    #[must_use]
    pub fn should_offload(self, requested: bool) -> bool {
        match self {
            Self::Always => true,
            Self::Never => false,
            Self::OnRequest => requested,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Always => "always",
            Self::Never => "never",
            Self::OnRequest => "on-request",
        }
    }
}

impl fmt::Display for OffloadStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OffloadStrategy {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "always" => Ok(Self::Always),
            "never" => Ok(Self::Never),
            "on-request" | "on_request" => Ok(Self::OnRequest),
            other => Err(format!("invalid offload strategy: {other}")),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Verification {
    pub verified: bool,
    pub offloaded: bool,
    /// Wall-clock time spent in the comparison itself.
    pub elapsed: Duration,
}

pub struct VerificationOffloader {
    credentials: Arc<dyn CredentialStore>,
    comparator: Arc<dyn HashComparator>,
    strategy: OffloadStrategy,
    // Compared against when the username is unknown so both paths cost the same.
    dummy: StoredCredential,
}

impl VerificationOffloader {
    /// # Errors
    /// Returns an error if the comparator cannot produce the padding hash.
    pub fn new(
        credentials: Arc<dyn CredentialStore>,
        comparator: Arc<dyn HashComparator>,
        strategy: OffloadStrategy,
    ) -> Result<Self, CredentialsError> {
        let mut filler = [0u8; 32];
        OsRng.fill_bytes(&mut filler);
        let dummy = comparator.hash(&filler)?;

        Ok(Self {
            credentials,
            comparator,
            strategy,
            dummy,
        })
    }

    #[must_use]
    pub fn strategy(&self) -> OffloadStrategy {
        self.strategy
    }

    /// Check `password` against the stored credential for `username`.
    ///
    /// Unknown usernames report `verified = false` after a comparison of equal cost.
    pub async fn verify(
        &self,
        username: &str,
        password: &SecretString,
        offload_requested: bool,
    ) -> Verification {
        let offloaded = self.strategy.should_offload(offload_requested);
        let stored = self.credentials.lookup(username);
        if stored.is_none() {
            debug!(username, "unknown username, comparing against padding hash");
        }

        if !offloaded {
            let (verified, elapsed) = compare_timed(
                self.comparator.as_ref(),
                password,
                stored.as_ref(),
                &self.dummy,
            );
            return Verification {
                verified,
                offloaded,
                elapsed,
            };
        }

        let comparator = self.comparator.clone();
        let dummy = self.dummy.clone();
        let password = SecretString::from(password.expose_secret().to_owned());
        let task = tokio::task::spawn_blocking(move || {
            compare_timed(comparator.as_ref(), &password, stored.as_ref(), &dummy)
        });

        match task.await {
            Ok((verified, elapsed)) => Verification {
                verified,
                offloaded,
                elapsed,
            },
            Err(err) => {
                error!("Offloaded password verification failed: {err}");
                Verification {
                    verified: false,
                    offloaded,
                    elapsed: Duration::ZERO,
                }
            }
        }
    }
}

impl fmt::Debug for VerificationOffloader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VerificationOffloader")
            .field("strategy", &self.strategy)
            .finish_non_exhaustive()
    }
}

fn compare_timed(
    comparator: &dyn HashComparator,
    password: &SecretString,
    stored: Option<&StoredCredential>,
    dummy: &StoredCredential,
) -> (bool, Duration) {
    let started = Instant::now();
    let password = password.expose_secret().as_bytes();
    let verified = match stored {
        Some(stored) => comparator.compare(password, stored),
        None => {
            let _ = comparator.compare(password, dummy);
            false
        }
    };
    (verified, started.elapsed())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::guard::credentials::InMemoryCredentialStore;
    use crate::guard::test_support::{cheap_argon2, CountingComparator};
    use std::sync::atomic::Ordering;

    fn offloader(strategy: OffloadStrategy) -> (VerificationOffloader, Arc<CountingComparator>) {
        let comparator = Arc::new(CountingComparator::new(Duration::ZERO));
        let mut credentials = InMemoryCredentialStore::new();
        credentials.insert("user1", StoredCredential::new("Password123!"));
        let offloader =
            VerificationOffloader::new(Arc::new(credentials), comparator.clone(), strategy);
        match offloader {
            Ok(offloader) => (offloader, comparator),
            Err(err) => panic!("offloader setup failed: {err}"),
        }
    }

    #[test]
    fn argon2_round_trip() -> anyhow::Result<()> {
        let comparator = cheap_argon2();
        let stored = comparator.hash(b"Password123!")?;
        assert!(stored.as_str().starts_with("$argon2id$"));
        assert!(comparator.compare(b"Password123!", &stored));
        assert!(!comparator.compare(b"password123!", &stored));
        Ok(())
    }

    #[test]
    fn argon2_rejects_malformed_hash() {
        let comparator = cheap_argon2();
        assert!(!comparator.compare(b"anything", &StoredCredential::new("not-a-phc-string")));
    }

    #[test]
    fn offload_strategy_parsing() {
        assert_eq!(
            "always".parse::<OffloadStrategy>(),
            Ok(OffloadStrategy::Always)
        );
        assert_eq!("NEVER".parse::<OffloadStrategy>(), Ok(OffloadStrategy::Never));
        assert_eq!(
            "on-request".parse::<OffloadStrategy>(),
            Ok(OffloadStrategy::OnRequest)
        );
        assert!("sometimes".parse::<OffloadStrategy>().is_err());
    }

    #[test]
    fn offload_strategy_decision() {
        assert!(OffloadStrategy::Always.should_offload(false));
        assert!(!OffloadStrategy::Never.should_offload(true));
        assert!(OffloadStrategy::OnRequest.should_offload(true));
        assert!(!OffloadStrategy::OnRequest.should_offload(false));
    }

    #[tokio::test]
    async fn inline_and_offloaded_agree() {
        let password = SecretString::from("Password123!");
        let wrong = SecretString::from("nope");

        for strategy in [OffloadStrategy::Never, OffloadStrategy::Always] {
            let (offloader, _) = offloader(strategy);
            let ok = offloader.verify("user1", &password, false).await;
            assert!(ok.verified, "{strategy}");
            assert_eq!(ok.offloaded, strategy == OffloadStrategy::Always);

            let bad = offloader.verify("user1", &wrong, false).await;
            assert!(!bad.verified, "{strategy}");
        }
    }

    #[tokio::test]
    async fn on_request_follows_the_flag() {
        let (offloader, _) = offloader(OffloadStrategy::OnRequest);
        let password = SecretString::from("Password123!");
        assert!(offloader.verify("user1", &password, true).await.offloaded);
        assert!(!offloader.verify("user1", &password, false).await.offloaded);
    }

    #[tokio::test]
    async fn unknown_user_is_padded_and_rejected() {
        let (offloader, comparator) = offloader(OffloadStrategy::Never);
        let before = comparator.calls.load(Ordering::SeqCst);

        let result = offloader
            .verify("ghost", &SecretString::from("Password123!"), false)
            .await;

        assert!(!result.verified);
        assert_eq!(comparator.calls.load(Ordering::SeqCst), before + 1);
    }

    #[tokio::test]
    async fn reports_comparison_time() {
        let comparator = Arc::new(CountingComparator::new(Duration::from_millis(20)));
        let mut credentials = InMemoryCredentialStore::new();
        credentials.insert("user1", StoredCredential::new("pw"));
        let offloader = VerificationOffloader::new(
            Arc::new(credentials),
            comparator,
            OffloadStrategy::Always,
        );
        let Ok(offloader) = offloader else {
            panic!("offloader setup failed");
        };

        let result = offloader.verify("user1", &SecretString::from("pw"), false).await;
        assert!(result.verified);
        assert!(result.elapsed >= Duration::from_millis(20));
    }
}
