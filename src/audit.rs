//! Audit trail: append-only record of every governance decision
//!
//! Provides an `AuditSink` trait for durable storage and an `AuditLogger`
//! that stamps non-decreasing event times, applies the write timeout, and
//! maps sink failures to `AuditWriteFailed`.

use crate::error::{with_timeout, GovernanceError, Result};
use crate::types::TableRef;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, RwLock};

/// `object_type` for table-level records
pub const OBJECT_TABLE: &str = "TABLE";

/// `object_type` for pass-level records
pub const OBJECT_RUN: &str = "RUN";

/// Audit `action` values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditAction {
    TagApplied,
    TagUpdated,
    PolicyAttached,
    PolicySkipped,
    PolicyConflict,
    AlertUntaggedTable,
    Error,
    Noop,
    RunSummary,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TagApplied => "TAG_APPLIED",
            Self::TagUpdated => "TAG_UPDATED",
            Self::PolicyAttached => "POLICY_ATTACHED",
            Self::PolicySkipped => "POLICY_SKIPPED",
            Self::PolicyConflict => "POLICY_CONFLICT",
            Self::AlertUntaggedTable => "ALERT_UNTAGGED_TABLE",
            Self::Error => "ERROR",
            Self::Noop => "NOOP",
            Self::RunSummary => "RUN_SUMMARY",
        }
    }
}

impl std::fmt::Display for AuditAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One immutable audit entry
///
/// Field names are the persisted log columns and stay snake_case.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub event_time: DateTime<Utc>,
    pub object_type: String,
    pub object_name: String,
    pub column_name: Option<String>,
    pub action: AuditAction,
    pub details: String,
}

impl AuditRecord {
    /// A record about a table, or one of its columns
    pub fn table(
        table: &TableRef,
        column: Option<&str>,
        action: AuditAction,
        details: impl Into<String>,
    ) -> Self {
        Self {
            event_time: Utc::now(),
            object_type: OBJECT_TABLE.to_string(),
            object_name: table.to_string(),
            column_name: column.map(str::to_string),
            action,
            details: details.into(),
        }
    }

    /// An `ERROR` record carrying the error code and message
    pub fn error(table: &TableRef, column: Option<&str>, error: &GovernanceError) -> Self {
        Self::table(
            table,
            column,
            AuditAction::Error,
            format!("{}: {}", error.code(), error),
        )
    }

    /// A pass-level record keyed by run id
    pub fn run(run_id: &str, action: AuditAction, details: impl Into<String>) -> Self {
        Self {
            event_time: Utc::now(),
            object_type: OBJECT_RUN.to_string(),
            object_name: run_id.to_string(),
            column_name: None,
            action,
            details: details.into(),
        }
    }
}

/// Trait for durable audit storage
///
/// `append` must write the whole record or nothing.
#[async_trait]
pub trait AuditSink: Send + Sync {
    /// Append one record
    async fn append(&self, record: &AuditRecord) -> Result<()>;

    /// Sink name (e.g., "memory", "jsonl", "sql")
    fn name(&self) -> &str;
}

/// Stamps, times out and forwards records to a sink
pub struct AuditLogger {
    sink: Arc<dyn AuditSink>,
    timeout: Duration,
    /// Last emitted event time; held across the append so the sink sees
    /// records in time order
    last_time: Mutex<Option<DateTime<Utc>>>,
}

impl AuditLogger {
    pub fn new(sink: Arc<dyn AuditSink>, timeout: Duration) -> Self {
        Self {
            sink,
            timeout,
            last_time: Mutex::new(None),
        }
    }

    pub fn sink_name(&self) -> &str {
        self.sink.name()
    }

    /// Append a record with a non-decreasing `event_time`
    pub async fn record(&self, mut record: AuditRecord) -> Result<AuditRecord> {
        let mut last = self.last_time.lock().await;
        let now = Utc::now();
        record.event_time = match *last {
            Some(previous) if previous > now => previous,
            _ => now,
        };

        with_timeout(
            self.timeout,
            format!("audit append {}", record.action),
            self.sink.append(&record),
        )
        .await
        .map_err(|e| match e {
            GovernanceError::AuditWriteFailed(_) => e,
            other => GovernanceError::AuditWriteFailed(format!(
                "{} {} ({}): {}",
                record.action, record.object_name, self.sink.name(), other
            )),
        })?;

        *last = Some(record.event_time);

        tracing::debug!(
            action = %record.action,
            object = %record.object_name,
            column = ?record.column_name,
            "Audit record written"
        );
        Ok(record)
    }
}

/// In-memory audit sink for development and testing
#[derive(Default)]
pub struct MemoryAuditSink {
    records: RwLock<Vec<AuditRecord>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// All records in append order
    pub async fn records(&self) -> Vec<AuditRecord> {
        self.records.read().await.clone()
    }

    pub async fn count(&self) -> usize {
        self.records.read().await.len()
    }

    /// Records with the given action, in append order
    pub async fn with_action(&self, action: AuditAction) -> Vec<AuditRecord> {
        self.records
            .read()
            .await
            .iter()
            .filter(|r| r.action == action)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl AuditSink for MemoryAuditSink {
    async fn append(&self, record: &AuditRecord) -> Result<()> {
        self.records.write().await.push(record.clone());
        Ok(())
    }

    fn name(&self) -> &str {
        "memory"
    }
}

/// JSON-lines file sink
///
/// Each record is serialized to one line and written with a single
/// `write_all` while holding the sink lock, so lines never interleave.
pub struct JsonlAuditSink {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonlAuditSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read every record back, in file order
    pub async fn load(&self) -> Result<Vec<AuditRecord>> {
        if !tokio::fs::try_exists(&self.path).await.unwrap_or(false) {
            return Ok(Vec::new());
        }

        let content = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            GovernanceError::AuditWriteFailed(format!(
                "Failed to read audit log {}: {}",
                self.path.display(),
                e
            ))
        })?;

        content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| serde_json::from_str(line).map_err(GovernanceError::from))
            .collect()
    }
}

#[async_trait]
impl AuditSink for JsonlAuditSink {
    async fn append(&self, record: &AuditRecord) -> Result<()> {
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');

        let _guard = self.lock.lock().await;

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                GovernanceError::AuditWriteFailed(format!(
                    "Failed to create audit directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| {
                GovernanceError::AuditWriteFailed(format!(
                    "Failed to open audit log {}: {}",
                    self.path.display(),
                    e
                ))
            })?;

        file.write_all(&line).await.map_err(|e| {
            GovernanceError::AuditWriteFailed(format!(
                "Failed to append to audit log {}: {}",
                self.path.display(),
                e
            ))
        })?;
        file.flush().await.map_err(|e| {
            GovernanceError::AuditWriteFailed(format!(
                "Failed to flush audit log {}: {}",
                self.path.display(),
                e
            ))
        })?;

        Ok(())
    }

    fn name(&self) -> &str {
        "jsonl"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t1() -> TableRef {
        TableRef::new("PUBLIC", "T1")
    }

    struct BrokenSink;

    #[async_trait]
    impl AuditSink for BrokenSink {
        async fn append(&self, _record: &AuditRecord) -> Result<()> {
            Err(GovernanceError::Backend("log table dropped".to_string()))
        }

        fn name(&self) -> &str {
            "broken"
        }
    }

    #[test]
    fn test_action_strings() {
        assert_eq!(AuditAction::AlertUntaggedTable.as_str(), "ALERT_UNTAGGED_TABLE");
        assert_eq!(
            serde_json::to_string(&AuditAction::PolicySkipped).unwrap(),
            "\"POLICY_SKIPPED\""
        );
        assert_eq!(
            serde_json::to_string(&AuditAction::Noop).unwrap(),
            "\"NOOP\""
        );
    }

    #[test]
    fn test_record_uses_log_column_names() {
        let record = AuditRecord::table(&t1(), Some("email"), AuditAction::TagApplied, "DATA_SENSITIVITY=PII");
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["object_type"], "TABLE");
        assert_eq!(json["object_name"], "PUBLIC.T1");
        assert_eq!(json["column_name"], "email");
        assert_eq!(json["action"], "TAG_APPLIED");
        assert_eq!(json["details"], "DATA_SENSITIVITY=PII");
        assert!(json.get("event_time").is_some());

        let run = AuditRecord::run("run-1", AuditAction::RunSummary, "{}");
        let json = serde_json::to_value(&run).unwrap();
        assert!(json["column_name"].is_null());
        assert_eq!(json["object_type"], "RUN");
    }

    #[test]
    fn test_error_record_details() {
        let err = GovernanceError::ClassificationUnavailable {
            table: "PUBLIC.T1".to_string(),
            column: "phone".to_string(),
            attempts: 3,
            reason: "timed out".to_string(),
        };
        let record = AuditRecord::error(&t1(), Some("phone"), &err);
        assert_eq!(record.action, AuditAction::Error);
        assert!(record.details.starts_with("CLASSIFICATION_UNAVAILABLE: "));
    }

    #[tokio::test]
    async fn test_logger_times_are_non_decreasing() {
        let sink = Arc::new(MemoryAuditSink::new());
        let logger = Arc::new(AuditLogger::new(sink.clone(), Duration::from_secs(1)));

        let mut handles = Vec::new();
        for i in 0..20 {
            let logger = logger.clone();
            handles.push(tokio::spawn(async move {
                logger
                    .record(AuditRecord::table(
                        &TableRef::new("PUBLIC", format!("T{}", i)),
                        None,
                        AuditAction::Noop,
                        "",
                    ))
                    .await
                    .unwrap();
            }));
        }
        for h in handles {
            h.await.unwrap();
        }

        let records = sink.records().await;
        assert_eq!(records.len(), 20);
        assert!(records.windows(2).all(|w| w[0].event_time <= w[1].event_time));
    }

    #[tokio::test]
    async fn test_sink_failure_is_audit_write_failed() {
        let logger = AuditLogger::new(Arc::new(BrokenSink), Duration::from_secs(1));
        let err = logger
            .record(AuditRecord::table(&t1(), None, AuditAction::PolicyAttached, "PII_ROW_POLICY"))
            .await
            .unwrap_err();
        assert!(matches!(err, GovernanceError::AuditWriteFailed(_)));
        assert!(err.to_string().contains("log table dropped"));
    }

    #[tokio::test]
    async fn test_memory_sink_filters_by_action() {
        let sink = MemoryAuditSink::new();
        sink.append(&AuditRecord::table(&t1(), Some("a"), AuditAction::TagApplied, "PII"))
            .await
            .unwrap();
        sink.append(&AuditRecord::table(&t1(), None, AuditAction::PolicySkipped, ""))
            .await
            .unwrap();

        assert_eq!(sink.count().await, 2);
        assert_eq!(sink.with_action(AuditAction::TagApplied).await.len(), 1);
        assert!(sink.with_action(AuditAction::Error).await.is_empty());
    }

    #[tokio::test]
    async fn test_jsonl_sink_append_and_load() {
        let dir = std::env::temp_dir().join(format!("a3s-governance-test-{}", uuid::Uuid::new_v4()));
        let path = dir.join("nested").join("audit.jsonl");
        let sink = Arc::new(JsonlAuditSink::new(&path));

        assert!(sink.load().await.unwrap().is_empty());

        let mut handles = Vec::new();
        for i in 0..10 {
            let sink = sink.clone();
            handles.push(tokio::spawn(async move {
                sink.append(&AuditRecord::table(
                    &TableRef::new("PUBLIC", "T1"),
                    Some(&format!("c{}", i)),
                    AuditAction::TagApplied,
                    "DATA_SENSITIVITY=INTERNAL",
                ))
                .await
                .unwrap();
            }));
        }
        for h in handles {
            h.await.unwrap();
        }

        let records = sink.load().await.unwrap();
        assert_eq!(records.len(), 10);
        assert!(records.iter().all(|r| r.action == AuditAction::TagApplied));

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 10);

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
