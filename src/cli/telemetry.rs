//! Process-wide tracing setup.
//!
//! Two `fmt` layers sit behind one [`EnvFilter`]:
//!
//! - diagnostics, pretty printed without targets, at the verbosity chosen with `-v`;
//! - the audit stream ([`AUDIT_TARGET`]), one compact line per decision with its target,
//!   always enabled at `info`.
//!
//! Spans are exported over OTLP/gRPC only when `OTEL_EXPORTER_OTLP_ENDPOINT` is set.

use crate::guard::audit::AUDIT_TARGET;
use anyhow::{anyhow, Result};
use base64ct::{Base64, Encoding};
use once_cell::sync::OnceCell;
use opentelemetry::propagation::TextMapCompositePropagator;
use opentelemetry::{global, trace::TracerProvider as _, KeyValue};
use opentelemetry_otlp::{Compression, WithExportConfig, WithTonicConfig};
use opentelemetry_sdk::{
    propagation::{BaggagePropagator, TraceContextPropagator},
    trace::SdkTracerProvider,
    Resource,
};
use std::{env::var, time::Duration};
use tonic::{
    metadata::{Ascii, Binary, MetadataKey, MetadataMap, MetadataValue},
    transport::ClientTlsConfig,
};
use tracing::{debug, info, warn, Level};
use tracing_subscriber::{filter::filter_fn, fmt, layer::SubscriberExt, EnvFilter, Layer, Registry};
use ulid::Ulid;

static TRACER_PROVIDER: OnceCell<SdkTracerProvider> = OnceCell::new();

/// Dependencies that are noisy below these levels.
const DEPENDENCY_DIRECTIVES: [&str; 3] = ["hyper=error", "tokio=error", "opentelemetry_sdk=warn"];

/// Collector settings taken from the standard `OTEL_*` variables.
#[derive(Debug, PartialEq, Eq)]
struct CollectorSettings {
    endpoint: String,
    protocol: Option<String>,
    headers: Vec<(String, String)>,
    instance_id: String,
}

impl CollectorSettings {
    /// `None` when no collector endpoint is configured.
    fn from_env() -> Option<Self> {
        let endpoint = var("OTEL_EXPORTER_OTLP_ENDPOINT")
            .ok()
            .filter(|endpoint| !endpoint.trim().is_empty())?;

        Some(Self {
            endpoint: with_scheme(endpoint.trim()),
            protocol: var("OTEL_EXPORTER_OTLP_PROTOCOL").ok(),
            headers: var("OTEL_EXPORTER_OTLP_HEADERS")
                .map(|raw| header_pairs(&raw))
                .unwrap_or_default(),
            instance_id: var("OTEL_SERVICE_INSTANCE_ID")
                .unwrap_or_else(|_| Ulid::new().to_string()),
        })
    }

    /// Host name to verify against when the collector speaks TLS.
    fn tls_domain(&self) -> Option<&str> {
        self.endpoint
            .strip_prefix("https://")
            .and_then(|rest| rest.split('/').next())
            .and_then(|authority| authority.split(':').next())
            .filter(|host| !host.is_empty())
    }

    /// gRPC metadata for every export; `-bin` keys carry base64 values.
    fn metadata(&self) -> Result<MetadataMap> {
        let mut metadata = MetadataMap::with_capacity(self.headers.len());

        for (name, value) in &self.headers {
            let name = name.to_ascii_lowercase();
            if name.ends_with("-bin") {
                let bytes = Base64::decode_vec(value)
                    .map_err(|e| anyhow!("failed to base64-decode value for key {name}: {e}"))?;
                let key = MetadataKey::<Binary>::from_bytes(name.as_bytes())
                    .map_err(|e| anyhow!("invalid binary metadata key {name}: {e}"))?;
                metadata.insert_bin(key, MetadataValue::from_bytes(&bytes));
            } else {
                let key = MetadataKey::<Ascii>::from_bytes(name.as_bytes())
                    .map_err(|e| anyhow!("invalid ASCII metadata key {name}: {e}"))?;
                let value: MetadataValue<Ascii> = value
                    .parse()
                    .map_err(|e| anyhow!("invalid ASCII metadata value for key {name}: {e}"))?;
                metadata.insert(key, value);
            }
        }

        Ok(metadata)
    }
}

/// `key=value` pairs separated by commas; pairs without `=` are skipped.
fn header_pairs(raw: &str) -> Vec<(String, String)> {
    raw.split(',')
        .filter_map(|pair| {
            let (key, value) = pair.split_once('=')?;
            Some((key.trim().to_string(), value.trim().to_string()))
        })
        .collect()
}

/// gRPC collectors default to https.
fn with_scheme(endpoint: &str) -> String {
    if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
        endpoint.to_string()
    } else {
        format!("https://{}", endpoint.trim_end_matches('/'))
    }
}

fn install_tracer_provider(settings: &CollectorSettings) -> Result<SdkTracerProvider> {
    let mut exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(&settings.endpoint)
        .with_compression(Compression::Gzip)
        .with_timeout(Duration::from_secs(3));

    if let Some(domain) = settings.tls_domain() {
        exporter = exporter.with_tls_config(
            ClientTlsConfig::new()
                .domain_name(domain.to_string())
                .with_native_roots(),
        );
    }

    if !settings.headers.is_empty() {
        exporter = exporter.with_metadata(settings.metadata()?);
    }

    let provider = SdkTracerProvider::builder()
        .with_batch_exporter(exporter.build()?)
        .with_resource(
            Resource::builder_empty()
                .with_attributes(vec![
                    KeyValue::new("service.name", env!("CARGO_PKG_NAME")),
                    KeyValue::new("service.version", env!("CARGO_PKG_VERSION")),
                    KeyValue::new("service.instance.id", settings.instance_id.clone()),
                ])
                .build(),
        )
        .build();

    let _ = TRACER_PROVIDER.set(provider.clone());
    global::set_tracer_provider(provider.clone());
    global::set_text_map_propagator(TextMapCompositePropagator::new(vec![
        Box::new(TraceContextPropagator::new()),
        Box::new(BaggagePropagator::new()),
    ]));

    Ok(provider)
}

/// Verbosity (default `error`, overridable with `RUST_LOG`) for diagnostics, `info` for audit.
fn env_filter(verbosity_level: Option<Level>) -> Result<EnvFilter> {
    let mut filter = EnvFilter::builder()
        .with_default_directive(verbosity_level.unwrap_or(Level::ERROR).into())
        .from_env_lossy();

    for directive in DEPENDENCY_DIRECTIVES {
        filter = filter.add_directive(directive.parse()?);
    }

    Ok(filter.add_directive(format!("{AUDIT_TARGET}=info").parse()?))
}

/// Install the global subscriber.
///
/// # Errors
///
/// Returns an error if the filter, the span exporter or the subscriber cannot be set up.
pub fn init(verbosity_level: Option<Level>) -> Result<()> {
    let diagnostics = fmt::layer()
        .with_file(false)
        .with_line_number(false)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_target(false)
        .pretty()
        .with_filter(filter_fn(|metadata| metadata.target() != AUDIT_TARGET));

    let audit = fmt::layer()
        .with_target(true)
        .compact()
        .with_filter(filter_fn(|metadata| metadata.target() == AUDIT_TARGET));

    let collector = CollectorSettings::from_env();
    let spans = match &collector {
        Some(settings) => {
            let provider = install_tracer_provider(settings)?;
            Some(tracing_opentelemetry::layer().with_tracer(provider.tracer(env!("CARGO_PKG_NAME"))))
        }
        None => None,
    };

    let subscriber = Registry::default()
        .with(diagnostics)
        .with(audit)
        .with(spans)
        .with(env_filter(verbosity_level)?);
    tracing::subscriber::set_global_default(subscriber)?;

    if let Some(settings) = collector {
        info!(endpoint = %settings.endpoint, "Exporting spans over OTLP");
        if let Some(protocol) = settings.protocol.filter(|protocol| protocol != "grpc") {
            warn!("OTEL_EXPORTER_OTLP_PROTOCOL={protocol} ignored, spans are sent over grpc");
        }
    }

    Ok(())
}

/// Flush and stop the span exporter; a no-op when tracing export is off.
pub fn shutdown_tracer() {
    if let Some(provider) = TRACER_PROVIDER.get() {
        debug!("shutting down tracer provider");
        if let Err(err) = provider.shutdown() {
            debug!("tracer provider shutdown failed: {err}");
        }
    }
}
