//! Governance pass configuration
//!
//! Every field has a default so partial JSON documents deserialize.
//! Call `validate()` after building a config by hand.

use crate::error::{GovernanceError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

/// Upper bound for per-column sample size
pub const MAX_SAMPLE_SIZE: usize = 100;

/// What the classifier adapter does when a column has no usable samples
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EmptySamplePolicy {
    /// Fail with `InsufficientSample`
    #[default]
    Fail,
    /// Label the column `PUBLIC`
    DefaultPublic,
}

/// Classifier adapter settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClassifierConfig {
    /// Total attempts per column, including the first call
    pub max_attempts: u32,

    /// Initial delay between attempts, doubled after each failure
    pub backoff_ms: u64,

    /// Cap for the doubled backoff delay
    pub max_backoff_ms: u64,

    pub empty_sample_policy: EmptySamplePolicy,

    /// Below this confidence, the highest-protection label among the primary
    /// answer and its alternatives wins. `None` disables escalation.
    pub escalation_threshold: Option<f32>,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_ms: 200,
            max_backoff_ms: 5_000,
            empty_sample_policy: EmptySamplePolicy::Fail,
            escalation_threshold: Some(0.6),
        }
    }
}

impl ClassifierConfig {
    /// Delay before retry number `attempt` (1-based: the delay after the first failure)
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let factor = 1u64 << attempt.saturating_sub(1).min(16);
        Duration::from_millis(self.backoff_ms.saturating_mul(factor).min(self.max_backoff_ms))
    }
}

/// Parallelism limits
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConcurrencyConfig {
    /// Table pipelines running at once
    pub table_workers: usize,

    /// Classification calls in flight across the whole pass
    pub classifier_concurrency: usize,
}

impl Default for ConcurrencyConfig {
    fn default() -> Self {
        Self {
            table_workers: 4,
            classifier_concurrency: 8,
        }
    }
}

/// Timeouts for external calls
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TimeoutConfig {
    pub catalog_timeout_ms: u64,
    /// Applies to each classification attempt
    pub classifier_timeout_ms: u64,
    /// Tag mutation and policy attachment
    pub mutation_timeout_ms: u64,
    pub audit_timeout_ms: u64,
    pub notify_timeout_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            catalog_timeout_ms: 30_000,
            classifier_timeout_ms: 30_000,
            mutation_timeout_ms: 30_000,
            audit_timeout_ms: 10_000,
            notify_timeout_ms: 5_000,
        }
    }
}

impl TimeoutConfig {
    pub fn catalog(&self) -> Duration {
        Duration::from_millis(self.catalog_timeout_ms)
    }

    pub fn classifier(&self) -> Duration {
        Duration::from_millis(self.classifier_timeout_ms)
    }

    pub fn mutation(&self) -> Duration {
        Duration::from_millis(self.mutation_timeout_ms)
    }

    pub fn audit(&self) -> Duration {
        Duration::from_millis(self.audit_timeout_ms)
    }

    pub fn notify(&self) -> Duration {
        Duration::from_millis(self.notify_timeout_ms)
    }
}

/// Tag and row access policy settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PolicyConfig {
    /// Column tag holding the sensitivity label
    pub tag_name: String,

    /// Row access policy attached to tables containing PII
    pub policy_name: String,

    /// Key columns used when a table has no entry in `table_key_columns`
    pub default_key_columns: Vec<String>,

    /// Per-table key columns, keyed by `SCHEMA.NAME`
    pub table_key_columns: HashMap<String, Vec<String>>,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            tag_name: "DATA_SENSITIVITY".to_string(),
            policy_name: "PII_ROW_POLICY".to_string(),
            default_key_columns: Vec::new(),
            table_key_columns: HashMap::new(),
        }
    }
}

/// Audit trail settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AuditConfig {
    /// Write a `NOOP` record for every unchanged column
    pub record_noops: bool,
}

/// Complete orchestrator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GovernanceConfig {
    /// Values sampled per column (1..=100)
    pub sample_size: usize,
    pub classifier: ClassifierConfig,
    pub concurrency: ConcurrencyConfig,
    pub timeouts: TimeoutConfig,
    pub policy: PolicyConfig,
    pub audit: AuditConfig,
}

impl Default for GovernanceConfig {
    fn default() -> Self {
        Self {
            sample_size: 10,
            classifier: ClassifierConfig::default(),
            concurrency: ConcurrencyConfig::default(),
            timeouts: TimeoutConfig::default(),
            policy: PolicyConfig::default(),
            audit: AuditConfig::default(),
        }
    }
}

impl GovernanceConfig {
    /// Parse and validate a JSON document
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a JSON config file
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            GovernanceError::Config(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::from_json_str(&json)
    }

    /// Check value ranges
    pub fn validate(&self) -> Result<()> {
        if self.sample_size == 0 || self.sample_size > MAX_SAMPLE_SIZE {
            return Err(GovernanceError::Config(format!(
                "sampleSize must be between 1 and {}, got {}",
                MAX_SAMPLE_SIZE, self.sample_size
            )));
        }
        if self.classifier.max_attempts == 0 {
            return Err(GovernanceError::Config(
                "classifier.maxAttempts must be >= 1".to_string(),
            ));
        }
        if let Some(threshold) = self.classifier.escalation_threshold {
            if !(0.0..=1.0).contains(&threshold) {
                return Err(GovernanceError::Config(format!(
                    "classifier.escalationThreshold must be within 0..=1, got {}",
                    threshold
                )));
            }
        }
        if self.concurrency.table_workers == 0 || self.concurrency.classifier_concurrency == 0 {
            return Err(GovernanceError::Config(
                "concurrency limits must be >= 1".to_string(),
            ));
        }
        if self.policy.tag_name.trim().is_empty() || self.policy.policy_name.trim().is_empty() {
            return Err(GovernanceError::Config(
                "policy.tagName and policy.policyName cannot be empty".to_string(),
            ));
        }
        for key in self.policy.table_key_columns.keys() {
            if key.parse::<crate::types::TableRef>().is_err() {
                return Err(GovernanceError::Config(format!(
                    "policy.tableKeyColumns key '{}' is not SCHEMA.NAME",
                    key
                )));
            }
        }
        Ok(())
    }
}
