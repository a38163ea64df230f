//! Error types for a3s-governance

use thiserror::Error;

/// Errors that can occur during a governance pass
#[derive(Debug, Error)]
pub enum GovernanceError {
    /// Metadata repository unreachable; fatal to the whole run
    #[error("Catalog unavailable: {0}")]
    CatalogUnavailable(String),

    /// No usable sample values and the empty-sample policy forbids a default
    #[error("Insufficient sample for {table}.{column}: {reason}")]
    InsufficientSample {
        table: String,
        column: String,
        reason: String,
    },

    /// Classification capability failed or timed out after all attempts
    #[error("Classification unavailable for {table}.{column} after {attempts} attempt(s): {reason}")]
    ClassificationUnavailable {
        table: String,
        column: String,
        attempts: u32,
        reason: String,
    },

    /// Classification capability returned a value outside the vocabulary
    #[error("Classification for {table}.{column} returned invalid label '{value}'")]
    ClassificationInvalid {
        table: String,
        column: String,
        value: String,
    },

    /// Writing a column tag failed
    #[error("Failed to set tag on {table}.{column}: {reason}")]
    TagWriteFailed {
        table: String,
        column: String,
        reason: String,
    },

    /// Row access policy could not be attached
    #[error("Failed to attach policy '{policy}' to {table}: {reason}")]
    PolicyAttachFailed {
        table: String,
        policy: String,
        reason: String,
    },

    /// A different row access policy is already attached
    #[error("Table {table} already has policy '{existing}' attached, expected '{expected}'")]
    PolicyConflict {
        table: String,
        existing: String,
        expected: String,
    },

    /// Audit sink unreachable; the affected table is not considered done
    #[error("Audit write failed: {0}")]
    AuditWriteFailed(String),

    /// Notification delivery failure
    #[error("Notification failed: {0}")]
    Notification(String),

    /// Table requested in the run scope is not present in the catalog
    #[error("Table not found: {0}")]
    TableNotFound(String),

    /// Serialization/deserialization failure
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Timeout of an external call
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// Capability-specific backend error
    #[error("Backend error: {0}")]
    Backend(String),
}

impl GovernanceError {
    /// Stable code used in `ERROR` audit details
    pub fn code(&self) -> &'static str {
        match self {
            Self::CatalogUnavailable(_) => "CATALOG_UNAVAILABLE",
            Self::InsufficientSample { .. } => "INSUFFICIENT_SAMPLE",
            Self::ClassificationUnavailable { .. } => "CLASSIFICATION_UNAVAILABLE",
            Self::ClassificationInvalid { .. } => "CLASSIFICATION_INVALID",
            Self::TagWriteFailed { .. } => "TAG_WRITE_FAILED",
            Self::PolicyAttachFailed { .. } => "POLICY_ATTACH_FAILED",
            Self::PolicyConflict { .. } => "POLICY_CONFLICT",
            Self::AuditWriteFailed(_) => "AUDIT_WRITE_FAILED",
            Self::Notification(_) => "NOTIFICATION_FAILED",
            Self::TableNotFound(_) => "TABLE_NOT_FOUND",
            Self::Serialization(_) => "SERIALIZATION",
            Self::Config(_) => "CONFIG",
            Self::Timeout(_) => "TIMEOUT",
            Self::Backend(_) => "BACKEND",
        }
    }

    /// Whether this error aborts the whole pass rather than one table
    pub fn is_run_fatal(&self) -> bool {
        matches!(self, Self::CatalogUnavailable(_))
    }
}

/// Result type alias for governance operations
pub type Result<T> = std::result::Result<T, GovernanceError>;

/// Run `fut` with a deadline, mapping expiry to `GovernanceError::Timeout`
pub(crate) async fn with_timeout<T>(
    limit: std::time::Duration,
    what: impl std::fmt::Display,
    fut: impl std::future::Future<Output = Result<T>>,
) -> Result<T> {
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(GovernanceError::Timeout(format!(
            "{} timed out after {}ms",
            what,
            limit.as_millis()
        ))),
    }
}
