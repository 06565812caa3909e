//! Shared helpers for guard tests.

use argon2::Params;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use super::{
    audit::{AuditPipeline, AuditSink},
    clock::ManualClock,
    config::GuardConfig,
    credentials::{CredentialsError, InMemoryCredentialStore, StoredCredential},
    orchestrator::AdmissionOrchestrator,
    store::ClientStateStore,
    verifier::{Argon2Comparator, HashComparator, OffloadStrategy, VerificationOffloader},
};

/// Argon2id with the smallest cost the primitive accepts.
pub(crate) fn cheap_argon2() -> Argon2Comparator {
    Argon2Comparator::with_params(Params::new(64, 1, 1, None).unwrap_or_default())
}

/// Plain-text comparator that counts calls and can simulate an expensive hash.
#[derive(Debug)]
pub(crate) struct CountingComparator {
    pub(crate) calls: AtomicUsize,
    delay: Duration,
}

impl CountingComparator {
    pub(crate) fn new(delay: Duration) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            delay,
        }
    }
}

impl HashComparator for CountingComparator {
    fn hash(&self, password: &[u8]) -> Result<StoredCredential, CredentialsError> {
        Ok(StoredCredential::new(String::from_utf8_lossy(password)))
    }

    fn compare(&self, password: &[u8], stored: &StoredCredential) -> bool {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        stored.as_str().as_bytes() == password
    }
}

/// Audit sink that keeps every emitted record in memory.
#[derive(Debug, Default)]
pub(crate) struct CapturingSink {
    records: std::sync::Mutex<Vec<serde_json::Map<String, serde_json::Value>>>,
}

impl CapturingSink {
    pub(crate) fn records(&self) -> Vec<serde_json::Map<String, serde_json::Value>> {
        self.records
            .lock()
            .map(|records| records.clone())
            .unwrap_or_default()
    }
}

impl AuditSink for CapturingSink {
    fn emit(&self, record: &serde_json::Map<String, serde_json::Value>) -> anyhow::Result<()> {
        self.records
            .lock()
            .map_err(|_| anyhow::anyhow!("capture lock poisoned"))?
            .push(record.clone());
        Ok(())
    }
}

pub(crate) struct Harness {
    pub(crate) orchestrator: Arc<AdmissionOrchestrator>,
    pub(crate) store: Arc<ClientStateStore>,
    pub(crate) clock: Arc<ManualClock>,
    pub(crate) sink: Arc<CapturingSink>,
    pub(crate) comparator: Arc<CountingComparator>,
}

/// Orchestrator wired with a manual clock, `user1 / Password123!`, and a capturing sink.
pub(crate) fn harness(strategy: OffloadStrategy, comparison_delay: Duration) -> Harness {
    let config = GuardConfig::new();
    let clock = Arc::new(ManualClock::new());
    let store = Arc::new(ClientStateStore::with_clock(&config, clock.clone()));
    let comparator = Arc::new(CountingComparator::new(comparison_delay));

    let mut credentials = InMemoryCredentialStore::new();
    credentials.insert("user1", StoredCredential::new("Password123!"));

    let offloader =
        match VerificationOffloader::new(Arc::new(credentials), comparator.clone(), strategy) {
            Ok(offloader) => Arc::new(offloader),
            Err(err) => panic!("offloader setup failed: {err}"),
        };

    let sink = Arc::new(CapturingSink::default());
    let sink_dyn: Arc<dyn AuditSink> = sink.clone();
    let audit = Arc::new(AuditPipeline::new(&config).with_sink(sink_dyn));

    Harness {
        orchestrator: Arc::new(AdmissionOrchestrator::new(
            config,
            store.clone(),
            offloader,
            audit,
        )),
        store,
        clock,
        sink,
        comparator,
    }
}
