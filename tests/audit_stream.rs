//! The subscriber installed at startup keeps the audit stream at the default verbosity.
//!
//! Installing a global subscriber is once per process, so this file holds a single test.

use anyhow::Result;
use portier::{cli::telemetry, guard::audit::AUDIT_TARGET};
use tracing::Level;

#[test]
fn default_verbosity_keeps_audit_records() -> Result<()> {
    temp_env::with_vars(
        [
            ("RUST_LOG", None::<&str>),
            ("OTEL_EXPORTER_OTLP_ENDPOINT", None),
        ],
        || telemetry::init(None),
    )?;

    assert!(tracing::enabled!(target: AUDIT_TARGET, Level::INFO));
    assert!(tracing::enabled!(Level::ERROR));
    assert!(!tracing::enabled!(Level::INFO));
    Ok(())
}
