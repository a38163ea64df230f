//! Core catalog and decision types
//!
//! All types use camelCase JSON serialization, except `SensitivityLabel`
//! which serializes to the uppercase tag values stored in the catalog.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// Fully qualified table identity: `(schema, name)`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableRef {
    pub schema: String,
    pub name: String,
}

impl TableRef {
    pub fn new(schema: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.schema, self.name)
    }
}

impl FromStr for TableRef {
    type Err = String;

    /// Parse `SCHEMA.NAME`; the name may not be empty
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('.') {
            Some((schema, name)) if !schema.is_empty() && !name.is_empty() => {
                Ok(Self::new(schema, name))
            }
            _ => Err(format!("expected SCHEMA.NAME, got '{}'", s)),
        }
    }
}

/// A column as described by the catalog
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Column {
    pub name: String,
    pub data_type: String,
}

impl Column {
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
        }
    }
}

/// Sensitivity vocabulary, ordered by protection required
///
/// `Public < Internal < Confidential < Pii`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SensitivityLabel {
    Public,
    Internal,
    Confidential,
    Pii,
}

impl SensitivityLabel {
    /// The complete vocabulary, highest protection first
    pub const ALL: [SensitivityLabel; 4] = [
        SensitivityLabel::Pii,
        SensitivityLabel::Confidential,
        SensitivityLabel::Internal,
        SensitivityLabel::Public,
    ];

    /// Catalog tag value for this label
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pii => "PII",
            Self::Confidential => "CONFIDENTIAL",
            Self::Internal => "INTERNAL",
            Self::Public => "PUBLIC",
        }
    }

    /// Parse a label, tolerating case, surrounding whitespace and a trailing period
    ///
    /// Returns `None` for anything outside the vocabulary; there is no coercion.
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        let normalized = trimmed
            .strip_suffix('.')
            .unwrap_or(trimmed)
            .trim()
            .to_ascii_uppercase();
        Self::ALL
            .into_iter()
            .find(|label| label.as_str() == normalized)
    }

    /// Whether this label requires the PII row access policy
    pub fn requires_row_policy(&self) -> bool {
        matches!(self, Self::Pii)
    }
}

impl fmt::Display for SensitivityLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Current tag state of a column as read from the catalog
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TagState {
    /// Never classified
    Absent,
    /// Carries a vocabulary label
    Labeled(SensitivityLabel),
    /// Carries a value written outside this system
    Unrecognized(String),
}

impl TagState {
    /// Interpret a raw tag value read from the catalog
    pub fn from_raw(raw: Option<&str>) -> Self {
        match raw {
            None => Self::Absent,
            Some(value) if value.trim().is_empty() => Self::Absent,
            Some(value) => match SensitivityLabel::parse(value) {
                Some(label) => Self::Labeled(label),
                None => Self::Unrecognized(value.to_string()),
            },
        }
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, Self::Absent)
    }

    pub fn label(&self) -> Option<SensitivityLabel> {
        match self {
            Self::Labeled(label) => Some(*label),
            _ => None,
        }
    }
}

impl fmt::Display for TagState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Absent => f.write_str("<none>"),
            Self::Labeled(label) => write!(f, "{}", label),
            Self::Unrecognized(raw) => write!(f, "{}", raw),
        }
    }
}

/// Outcome of classifying one column, never persisted directly
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassificationResult {
    pub table: TableRef,
    pub column: String,
    pub label: SensitivityLabel,
    pub sample_size: usize,
    pub timestamp: DateTime<Utc>,
}

/// A row access policy attached to a table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyAttachment {
    pub table: TableRef,
    pub policy_name: String,
    pub key_columns: Vec<String>,
}

/// Tag mutation decided by the reconciler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagAction {
    /// Current tag already equals the new label
    NoOp,
    /// No tag present; set it
    Apply(SensitivityLabel),
    /// A different tag present; replace it
    Update {
        from: Option<SensitivityLabel>,
        to: SensitivityLabel,
    },
}

impl TagAction {
    /// Label to write, if the action mutates the catalog
    pub fn target(&self) -> Option<SensitivityLabel> {
        match self {
            Self::NoOp => None,
            Self::Apply(label) => Some(*label),
            Self::Update { to, .. } => Some(*to),
        }
    }
}

/// Row policy step decided by the enforcer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyAction {
    /// Required and absent
    Attach { key_columns: Vec<String> },
    /// Required and already attached
    Skip,
    /// A different policy is attached; operator must resolve
    Conflict { existing: String },
    /// Not required
    None,
}

/// Which tables a pass covers
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum RunScope {
    #[default]
    All,
    Tables(BTreeSet<TableRef>),
}

impl RunScope {
    /// Scope limited to the given tables
    pub fn tables(tables: impl IntoIterator<Item = TableRef>) -> Self {
        Self::Tables(tables.into_iter().collect())
    }

    pub fn includes(&self, table: &TableRef) -> bool {
        match self {
            Self::All => true,
            Self::Tables(set) => set.contains(table),
        }
    }
}

/// Aggregated counters for one pass
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    /// Run identifier (run-<uuid>)
    pub run_id: String,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub tables_processed: u64,
    pub tags_applied: u64,
    pub tags_updated: u64,
    pub tags_unchanged: u64,
    pub policies_attached: u64,
    pub policies_skipped: u64,
    pub conflicts: u64,
    pub errors: u64,
    pub alerts: u64,
    /// Tables whose audit trail could not be completed
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub retry_tables: Vec<TableRef>,
    /// Pass stopped early by a cancel request
    #[serde(default)]
    pub cancelled: bool,
}

impl RunSummary {
    pub fn new() -> Self {
        Self {
            run_id: format!("run-{}", uuid::Uuid::new_v4()),
            started_at: Some(Utc::now()),
            ..Default::default()
        }
    }

    /// Fold one table's counters into the pass totals
    pub fn absorb(&mut self, table: &TableRef, stats: &TableStats) {
        self.tags_applied += stats.tags_applied;
        self.tags_updated += stats.tags_updated;
        self.tags_unchanged += stats.tags_unchanged;
        self.policies_attached += stats.policies_attached;
        self.policies_skipped += stats.policies_skipped;
        self.conflicts += stats.conflicts;
        self.errors += stats.errors;
        self.alerts += stats.alerts;
        match stats.status {
            TableStatus::Done => self.tables_processed += 1,
            TableStatus::RetryPending => {
                self.tables_processed += 1;
                self.retry_tables.push(table.clone());
            }
            TableStatus::Cancelled => self.cancelled = true,
        }
    }
}

/// Terminal state of a table pipeline within a pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TableStatus {
    #[default]
    Done,
    /// Audit trail incomplete; reprocess next pass
    RetryPending,
    /// Stopped at an audit checkpoint after cancellation
    Cancelled,
}

/// Per-table counters produced by one pipeline
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableStats {
    pub status: TableStatus,
    pub records: u64,
    pub tags_applied: u64,
    pub tags_updated: u64,
    pub tags_unchanged: u64,
    pub policies_attached: u64,
    pub policies_skipped: u64,
    pub conflicts: u64,
    pub errors: u64,
    pub alerts: u64,
}
