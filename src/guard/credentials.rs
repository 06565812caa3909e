//! Stored password hashes, looked up by username.

use secrecy::{ExposeSecret, SecretString};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;

#[derive(Debug, thiserror::Error)]
pub enum CredentialsError {
    #[error("failed to read credentials file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("invalid credentials file {path}: {source}")]
    Parse {
        path: String,
        source: serde_json::Error,
    },
    #[error("failed to hash password: {0}")]
    Hash(String),
}

/// Pre-computed password hash (PHC string). Never mutated by this crate.
#[derive(Clone, PartialEq, Eq)]
pub struct StoredCredential(String);

impl StoredCredential {
    #[must_use]
    pub fn new(phc: impl Into<String>) -> Self {
        Self(phc.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for StoredCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("StoredCredential(***)")
    }
}

/// Source of stored credentials.
pub trait CredentialStore: Send + Sync {
    fn lookup(&self, username: &str) -> Option<StoredCredential>;
}

#[derive(Clone, Debug, Default)]
pub struct InMemoryCredentialStore {
    entries: HashMap<String, StoredCredential>,
}

impl InMemoryCredentialStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a JSON object mapping usernames to PHC hashes.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or is not a JSON object of strings.
    pub fn from_json_file(path: &Path) -> Result<Self, CredentialsError> {
        let display = path.display().to_string();
        let raw = std::fs::read_to_string(path).map_err(|source| CredentialsError::Read {
            path: display.clone(),
            source,
        })?;
        Self::from_json(&raw).map_err(|source| CredentialsError::Parse {
            path: display,
            source,
        })
    }

    /// # Errors
    /// Returns an error if `raw` is not a JSON object of strings.
    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        let entries: HashMap<String, String> = serde_json::from_str(raw)?;
        Ok(Self {
            entries: entries
                .into_iter()
                .map(|(username, phc)| (username, StoredCredential::new(phc)))
                .collect(),
        })
    }

    pub fn insert(&mut self, username: impl Into<String>, credential: StoredCredential) {
        self.entries.insert(username.into(), credential);
    }

    /// Hash `password` with `hasher` and store it under `username`.
    ///
    /// # Errors
    /// Returns an error if hashing fails.
    pub fn insert_password(
        &mut self,
        username: impl Into<String>,
        password: &SecretString,
        hasher: &dyn super::verifier::HashComparator,
    ) -> Result<(), CredentialsError> {
        let credential = hasher.hash(password.expose_secret().as_bytes())?;
        self.insert(username, credential);
        Ok(())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl CredentialStore for InMemoryCredentialStore {
    fn lookup(&self, username: &str) -> Option<StoredCredential> {
        self.entries.get(username).cloned()
    }
}
