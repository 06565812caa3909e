use crate::{
    api,
    cli::telemetry,
    guard::{
        AdmissionOrchestrator, Argon2Comparator, AuditPipeline, ClientStateStore,
        GuardConfig, InMemoryCredentialStore, JsonLinesAuditSink, OffloadStrategy,
        TracingAuditSink, VerificationOffloader,
    },
};
use anyhow::{Context, Result};
use std::{path::PathBuf, sync::Arc};
use tracing::{info, warn};

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub credentials: PathBuf,
    pub offload: OffloadStrategy,
    pub config: GuardConfig,
    pub audit_log: Option<PathBuf>,
}

/// Build the orchestrator from `args` without binding a socket.
///
/// # Errors
/// Returns an error if the credentials file or the audit log cannot be opened.
pub fn build_orchestrator(args: &Args) -> Result<Arc<AdmissionOrchestrator>> {
    let credentials = InMemoryCredentialStore::from_json_file(&args.credentials)
        .context("Failed to load credentials")?;
    if credentials.is_empty() {
        warn!(
            "No credentials loaded from {}; every login will fail",
            args.credentials.display()
        );
    }
    info!(
        users = credentials.len(),
        offload = %args.offload,
        "Credentials loaded"
    );

    let offloader = VerificationOffloader::new(
        Arc::new(credentials),
        Arc::new(Argon2Comparator::new()),
        args.offload,
    )
    .context("Failed to prepare password verifier")?;

    let mut audit = AuditPipeline::new(&args.config).with_sink(Arc::new(TracingAuditSink));
    if let Some(path) = &args.audit_log {
        audit = audit.with_sink(Arc::new(JsonLinesAuditSink::open(path)?));
        info!("Audit records appended to {}", path.display());
    }

    let store = Arc::new(ClientStateStore::new(&args.config));

    Ok(Arc::new(AdmissionOrchestrator::new(
        args.config,
        store,
        Arc::new(offloader),
        Arc::new(audit),
    )))
}

/// Execute the server action.
/// # Errors
/// Returns an error if setup fails or the server stops with an error.
pub async fn execute(args: Args) -> Result<()> {
    let orchestrator = build_orchestrator(&args)?;

    let result = api::new(args.port, orchestrator).await;

    telemetry::shutdown_tracer();

    result
}
