//! # a3s-governance
//!
//! Sensitivity classification, tagging, and row-policy enforcement for data
//! catalogs, with an append-only audit trail.
//!
//! ## Overview
//!
//! `a3s-governance` runs governance passes over a catalog: it samples every
//! column, classifies its sensitivity, reconciles the `DATA_SENSITIVITY` tag,
//! attaches the PII row access policy where needed, alerts on untagged tables,
//! and records every decision. Catalog, classifier, audit storage and
//! notification are capabilities behind traits, so backends swap without
//! touching the pass logic.
//!
//! ## Quick Start
//!
//! ```rust
//! use a3s_governance::{GovernanceConfig, Orchestrator, RunScope, TableRef, Column};
//! use a3s_governance::{MemoryAuditSink, MemoryCatalog, MemoryNotifier, PatternClassifier};
//! use std::sync::Arc;
//!
//! # async fn example() -> a3s_governance::Result<()> {
//! let customers = TableRef::new("PUBLIC", "CUSTOMERS_DEMO");
//! let catalog = MemoryCatalog::new()
//!     .with_table(customers.clone(), vec![Column::new("EMAIL", "VARCHAR")])
//!     .with_values(&customers, "EMAIL", ["ann@example.com", "bo@example.org"]);
//!
//! let mut config = GovernanceConfig::default();
//! config.policy.default_key_columns = vec!["EMAIL".to_string()];
//!
//! let orchestrator = Orchestrator::new(
//!     Arc::new(catalog),
//!     Arc::new(PatternClassifier::with_defaults()?),
//!     Arc::new(MemoryAuditSink::new()),
//!     Arc::new(MemoryNotifier::new()),
//!     config,
//! )?;
//!
//! let summary = orchestrator.run_pass(RunScope::All).await?;
//! println!("tags applied: {}", summary.tags_applied);
//! # Ok(())
//! # }
//! ```
//!
//! ## Backends
//!
//! - **memory**: catalog, audit sink and notifier for testing and single-process use
//! - **jsonl**: JSON-lines audit file
//! - **sql**: Snowflake statements and an audit sink over any `SqlExecutor`
//! - **nats**: alert events published to NATS subjects
//! - **pattern**: regex classifier for offline classification
//!
//! ## Architecture
//!
//! - **MetadataRepository** trait: catalog reads and mutations
//! - **SensitivityClassifier** trait: label producer behind `ClassifierAdapter`
//! - **reconcile** / **PolicyEnforcer::decide**: pure decisions
//! - **AuditSink** trait: durable, append-only history
//! - **Notifier** trait: best-effort alerts
//! - **Orchestrator**: the `run_pass` entry point

pub mod alert;
pub mod audit;
pub mod catalog;
pub mod classifier;
pub mod config;
pub mod error;
pub mod orchestrator;
pub mod policy;
pub mod reconcile;
pub mod sql;
pub mod types;

// Re-export core types
pub use error::{GovernanceError, Result};
pub use orchestrator::{CancelHandle, Orchestrator};
pub use types::{
    ClassificationResult, Column, PolicyAction, PolicyAttachment, RunScope, RunSummary,
    SensitivityLabel, TableRef, TagAction, TagState,
};

pub use alert::{AlertEmitter, AlertEvent, MemoryNotifier, Notifier};
pub use audit::{AuditAction, AuditLogger, AuditRecord, AuditSink, JsonlAuditSink, MemoryAuditSink};
pub use catalog::{CatalogReader, MetadataRepository};
pub use classifier::{
    ClassificationRequest, ClassifierAdapter, ClassifierResponse, SensitivityClassifier,
    StaticClassifier,
};
pub use config::{
    AuditConfig, ClassifierConfig, ConcurrencyConfig, EmptySamplePolicy, GovernanceConfig,
    PolicyConfig, TimeoutConfig,
};
pub use policy::PolicyEnforcer;
pub use reconcile::reconcile;

// Re-export backends for convenience
pub use alert::nats::{NatsNotifier, NatsNotifierConfig};
pub use catalog::memory::MemoryCatalog;
pub use classifier::pattern::PatternClassifier;
pub use sql::{SqlAuditSink, SqlCatalogWriter, SqlExecutor};
