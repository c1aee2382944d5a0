//! Append-only JSON-lines audit trail.
//!
//! One line per exchange call attempt or validation failure. Writing never
//! fails from the caller's point of view: sink errors go to stderr and
//! `tracing`, and the next write reopens the file.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex as StdMutex};

use serde::{Deserialize, Serialize};
use strum::Display;
use time::OffsetDateTime;
use tokio::fs::{self, File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, error};

/// Which exchange operation a record belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Operation {
    /// `POST /fapi/v1/order`.
    PlaceOrder,
    /// `DELETE /fapi/v1/order`.
    CancelOrder,
    /// `DELETE /fapi/v1/allOpenOrders`.
    CancelAll,
    /// `GET /fapi/v1/openOrders`.
    OpenOrders,
    /// `GET /fapi/v1/ticker/price`.
    TickerPrice,
    /// `GET /fapi/v2/account`.
    AccountBalance,
    /// `GET /fapi/v2/positionRisk`.
    Position,
    /// `GET /fapi/v1/time`.
    ServerTime,
    /// Input rejected before any request was sent.
    Validate,
}

/// How a recorded attempt ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Outcome {
    /// 2xx with a usable payload.
    Success,
    /// Rejected by the exchange or unparseable payload.
    ExchangeRejected,
    /// Timeout or connection failure.
    NetworkFailure,
    /// Never sent.
    ValidationFailed,
    /// Request could not be built or sent (signing, IO).
    LocalError,
}

/// One audit line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    /// When the attempt finished.
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    /// Operation name.
    pub operation: Operation,
    /// 1-based attempt number (0 for validation failures).
    pub attempt: u32,
    /// Request as sent, without credentials.
    pub request: serde_json::Value,
    /// Response payload on success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<serde_json::Value>,
    /// Error text on failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Outcome class.
    pub outcome: Outcome,
}

impl AuditRecord {
    /// Record for a successful attempt.
    pub fn success(
        operation: Operation,
        attempt: u32,
        request: serde_json::Value,
        response: serde_json::Value,
    ) -> Self {
        Self {
            timestamp: OffsetDateTime::now_utc(),
            operation,
            attempt,
            request,
            response: Some(response),
            error: None,
            outcome: Outcome::Success,
        }
    }

    /// Record for a failed attempt.
    pub fn failure(
        operation: Operation,
        attempt: u32,
        request: serde_json::Value,
        outcome: Outcome,
        error: impl ToString,
    ) -> Self {
        Self {
            timestamp: OffsetDateTime::now_utc(),
            operation,
            attempt,
            request,
            response: None,
            error: Some(error.to_string()),
            outcome,
        }
    }
}

enum Sink {
    File {
        path: PathBuf,
        handle: Mutex<Option<File>>,
    },
    Memory(StdMutex<Vec<AuditRecord>>),
}

/// Shared handle to the audit trail. Cloning shares the same sink.
#[derive(Clone)]
pub struct AuditLog {
    sink: Arc<Sink>,
}

impl std::fmt::Debug for AuditLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.sink.as_ref() {
            Sink::File { path, .. } => f.debug_struct("AuditLog").field("path", path).finish(),
            Sink::Memory(_) => f.debug_struct("AuditLog").field("path", &"<memory>").finish(),
        }
    }
}

impl AuditLog {
    /// Audit log appending to `path`. The file is opened lazily on first write.
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self {
            sink: Arc::new(Sink::File {
                path: path.into(),
                handle: Mutex::new(None),
            }),
        }
    }

    /// In-memory audit log.
    pub fn memory() -> Self {
        Self {
            sink: Arc::new(Sink::Memory(StdMutex::new(Vec::new()))),
        }
    }

    /// Append a record. Never fails.
    pub async fn record(&self, record: AuditRecord) {
        debug!(
            operation = %record.operation,
            attempt = record.attempt,
            outcome = %record.outcome,
            "audit"
        );
        match self.sink.as_ref() {
            Sink::Memory(records) => match records.lock() {
                Ok(mut records) => records.push(record),
                Err(e) => report_failure(Path::new("<memory>"), &e.to_string()),
            },
            Sink::File { path, handle } => {
                let mut line = match serde_json::to_string(&record) {
                    Ok(line) => line,
                    Err(e) => {
                        report_failure(path, &format!("serialize: {e}"));
                        return;
                    }
                };
                line.push('\n');

                let mut guard = handle.lock().await;
                if let Err(e) = append(path, &mut guard, line.as_bytes()).await {
                    // Drop the handle so the next record reopens the file.
                    *guard = None;
                    report_failure(path, &e.to_string());
                }
            }
        }
    }

    /// Records held by an in-memory log; empty for file logs.
    pub fn records(&self) -> Vec<AuditRecord> {
        match self.sink.as_ref() {
            Sink::Memory(records) => records.lock().map(|r| r.clone()).unwrap_or_default(),
            Sink::File { .. } => Vec::new(),
        }
    }
}

async fn append(path: &Path, handle: &mut Option<File>, bytes: &[u8]) -> std::io::Result<()> {
    if handle.is_none() {
        *handle = Some(open(path).await?);
    }
    if let Some(file) = handle.as_mut() {
        file.write_all(bytes).await?;
        file.flush().await?;
    }
    Ok(())
}

async fn open(path: &Path) -> std::io::Result<File> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).await?;
        }
    }
    OpenOptions::new().create(true).append(true).open(path).await
}

fn report_failure(path: &Path, reason: &str) {
    eprintln!("warning: audit log write to {} failed: {reason}", path.display());
    error!(path = %path.display(), %reason, "audit log write failed");
}
