//! Audit trail of admission decisions.
//!
//! Every decision becomes a flat JSON object. Before any sink sees it the pipeline:
//! 1) replaces a `password` field with [`REDACTED`],
//! 2) truncates `user_agent` to the configured limit and appends [`TRUNCATION_MARKER`],
//! 3) truncates `username` to the maximum accepted username length.
//!
//! Sinks are best effort. A failing or panicking sink is logged and skipped; it never
//! changes the outcome of the login it describes.

use anyhow::{Context, Result};
use chrono::{SecondsFormat, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde_json::{Map, Value};
use std::fs::OpenOptions;
use std::io::{BufWriter, Write};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tracing::{error, info, warn};

use super::{config::GuardConfig, round_millis, round_seconds};

pub const REDACTED: &str = "***MASKED***";
pub const TRUNCATION_MARKER: &str = "...(truncated)";
/// Tracing target of the audit stream; kept enabled regardless of verbosity.
pub const AUDIT_TARGET: &str = "audit";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AuditEventType {
    LoginBlocked,
    LoginRejected,
    LoginSuccess,
    LoginFail,
}

impl AuditEventType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::LoginBlocked => "login_blocked",
            Self::LoginRejected => "login_rejected",
            Self::LoginSuccess => "login_success",
            Self::LoginFail => "login_fail",
        }
    }
}

/// Builder for one unsanitized audit record.
#[derive(Clone)]
pub struct AuditEvent {
    fields: Map<String, Value>,
}

impl std::fmt::Debug for AuditEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditEvent")
            .field("keys", &self.fields.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl AuditEvent {
    #[must_use]
    pub fn new(event_type: AuditEventType, client_id: &str) -> Self {
        let mut fields = Map::new();
        fields.insert(
            "timestamp".to_string(),
            Value::from(Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)),
        );
        fields.insert("event_type".to_string(), Value::from(event_type.as_str()));
        fields.insert("client_id".to_string(), Value::from(client_id));
        Self { fields }
    }

    fn set(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.fields.insert(key.to_string(), value.into());
        self
    }

    #[must_use]
    pub fn username(self, username: &str) -> Self {
        self.set("username", username)
    }

    /// Attach the submitted password. The pipeline replaces it before emission.
    #[must_use]
    pub fn password(self, password: &SecretString) -> Self {
        self.set("password", password.expose_secret())
    }

    #[must_use]
    pub fn reason(self, reason: &str) -> Self {
        self.set("reason", reason)
    }

    #[must_use]
    pub fn failure_count(self, count: u32) -> Self {
        self.set("failure_count", count)
    }

    #[must_use]
    pub fn backoff(self, backoff: Duration) -> Self {
        self.set("backoff_seconds", round_seconds(backoff))
    }

    #[must_use]
    pub fn retry_after(self, retry_after: Duration) -> Self {
        self.set("retry_after_seconds", round_seconds(retry_after))
    }

    #[must_use]
    pub fn verification_elapsed(self, elapsed: Duration) -> Self {
        self.set("verification_elapsed_ms", round_millis(elapsed))
    }

    #[must_use]
    pub fn offloaded(self, offloaded: bool) -> Self {
        self.set("offloaded", offloaded)
    }

    #[must_use]
    pub fn user_agent(self, user_agent: &str) -> Self {
        self.set("user_agent", user_agent)
    }

    #[must_use]
    pub fn into_fields(self) -> Map<String, Value> {
        self.fields
    }
}

/// Destination for sanitized records.
///
/// `emit` runs on the request task, so it must not block on I/O. Implementations
/// should not panic either; the pipeline contains a panic and drops the record.
pub trait AuditSink: Send + Sync {
    /// # Errors
    /// Returns an error if the record could not be written; the pipeline logs and ignores it.
    fn emit(&self, record: &Map<String, Value>) -> Result<()>;
}

/// Emits each record as a JSON string on the [`AUDIT_TARGET`] tracing target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn emit(&self, record: &Map<String, Value>) -> Result<()> {
        let line = serde_json::to_string(record)?;
        info!(target: AUDIT_TARGET, "{line}");
        Ok(())
    }
}

/// Appends one JSON object per line to a file.
///
/// `emit` only queues the line. A dedicated writer thread owns the file, writes whatever
/// is queued and flushes once the queue is drained. Dropping the sink closes the queue
/// and waits for the writer to finish.
#[derive(Debug)]
pub struct JsonLinesAuditSink {
    path: PathBuf,
    queue: Option<UnboundedSender<String>>,
    writer: Option<JoinHandle<()>>,
}

impl JsonLinesAuditSink {
    /// # Errors
    /// Returns an error if the file cannot be opened for appending or the writer
    /// thread cannot be started.
    pub fn open(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("Failed to open audit log: {}", path.display()))?;

        let (queue, lines) = unbounded_channel();
        let target = path.to_path_buf();
        let writer = std::thread::Builder::new()
            .name("audit-writer".to_string())
            .spawn(move || write_lines(BufWriter::new(file), lines, &target))
            .context("Failed to start audit writer thread")?;

        Ok(Self {
            path: path.to_path_buf(),
            queue: Some(queue),
            writer: Some(writer),
        })
    }
}

fn write_lines<W: Write>(mut out: W, mut lines: UnboundedReceiver<String>, path: &Path) {
    while let Some(line) = lines.blocking_recv() {
        let mut result = writeln!(out, "{line}");
        while let Ok(line) = lines.try_recv() {
            result = result.and_then(|()| writeln!(out, "{line}"));
        }
        if let Err(err) = result.and_then(|()| out.flush()) {
            error!("Failed to append to {}: {err}", path.display());
        }
    }
}

impl AuditSink for JsonLinesAuditSink {
    fn emit(&self, record: &Map<String, Value>) -> Result<()> {
        let line = serde_json::to_string(record)?;
        self.queue
            .as_ref()
            .context("audit log closed")?
            .send(line)
            .map_err(|_| anyhow::anyhow!("audit writer for {} stopped", self.path.display()))
    }
}

impl Drop for JsonLinesAuditSink {
    fn drop(&mut self) {
        self.queue.take();
        if let Some(writer) = self.writer.take() {
            if writer.join().is_err() {
                error!("audit writer for {} panicked", self.path.display());
            }
        }
    }
}

pub struct AuditPipeline {
    sinks: Vec<Arc<dyn AuditSink>>,
    max_username_length: usize,
    user_agent_limit: usize,
}

impl AuditPipeline {
    /// A pipeline without sinks; add them with [`AuditPipeline::with_sink`].
    #[must_use]
    pub fn new(config: &GuardConfig) -> Self {
        Self {
            sinks: Vec::new(),
            max_username_length: config.max_username_length(),
            user_agent_limit: config.user_agent_limit(),
        }
    }

    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    /// Apply redaction and truncation rules to a record.
    #[must_use]
    pub fn sanitize(&self, mut fields: Map<String, Value>) -> Map<String, Value> {
        if let Some(password) = fields.get_mut("password") {
            *password = Value::from(REDACTED);
        }

        if let Some(Value::String(user_agent)) = fields.get_mut("user_agent") {
            if user_agent.chars().count() > self.user_agent_limit {
                let mut truncated: String =
                    user_agent.chars().take(self.user_agent_limit).collect();
                truncated.push_str(TRUNCATION_MARKER);
                *user_agent = truncated;
            }
        }

        if let Some(Value::String(username)) = fields.get_mut("username") {
            if username.chars().count() > self.max_username_length {
                *username = username.chars().take(self.max_username_length).collect();
            }
        }

        fields
    }

    /// Sanitize and hand the record to every sink. Never fails and never unwinds.
    pub fn record(&self, fields: Map<String, Value>) {
        let sanitized = self.sanitize(fields);
        for sink in &self.sinks {
            match catch_unwind(AssertUnwindSafe(|| sink.emit(&sanitized))) {
                Ok(Ok(())) => {}
                Ok(Err(err)) => warn!("Audit sink failed, record dropped: {err:#}"),
                Err(_) => error!("Audit sink panicked, record dropped"),
            }
        }
    }

    pub fn record_event(&self, event: AuditEvent) {
        self.record(event.into_fields());
    }
}

impl std::fmt::Debug for AuditPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditPipeline")
            .field("sinks", &self.sinks.len())
            .field("max_username_length", &self.max_username_length)
            .field("user_agent_limit", &self.user_agent_limit)
            .finish()
    }
}
