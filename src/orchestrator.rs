//! Orchestrator: one governance pass over the catalog
//!
//! `run_pass` discovers tables, runs an isolated pipeline per table with
//! bounded parallelism, and returns a `RunSummary`. Only `CatalogUnavailable`
//! escapes a table pipeline; every other failure becomes an `ERROR` audit
//! record and processing continues.
//!
//! Per table the pipeline moves through
//! `Discovered → Sampled → Classified → Reconciled → TagApplied/NoOp →
//! PolicyEvaluated → PolicyApplied/Skipped/Conflict → Logged → Done`.
//! An audit write failure stops the pipeline and marks the table for retry.

use crate::alert::{AlertEmitter, Notifier};
use crate::audit::{AuditAction, AuditLogger, AuditRecord, AuditSink};
use crate::catalog::{CatalogReader, MetadataRepository};
use crate::classifier::{ClassifierAdapter, SensitivityClassifier};
use crate::config::GovernanceConfig;
use crate::error::{with_timeout, GovernanceError, Result};
use crate::policy::PolicyEnforcer;
use crate::reconcile::reconcile;
use crate::types::{
    Column, PolicyAction, RunScope, RunSummary, SensitivityLabel, TableRef, TableStats,
    TableStatus, TagAction, TagState,
};
use chrono::Utc;
use futures::stream::{self, StreamExt};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Cooperative cancellation flag shared with callers
///
/// Once cancelled, no new table pipeline starts; running pipelines stop at
/// their next audit checkpoint. The flag stays set until `reset`.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle {
    cancelled: Arc<AtomicBool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    pub fn reset(&self) {
        self.cancelled.store(false, Ordering::SeqCst);
    }
}

/// Why a table pipeline stopped before `Done`
enum Halt {
    /// Abort the whole pass
    Fatal(GovernanceError),
    /// Audit trail incomplete
    Retry(GovernanceError),
    Cancelled,
}

type Step<T> = std::result::Result<T, Halt>;

/// Governance autopilot entry point
pub struct Orchestrator {
    catalog: CatalogReader,
    classifier: ClassifierAdapter,
    enforcer: PolicyEnforcer,
    audit: AuditLogger,
    alerts: AlertEmitter,
    config: GovernanceConfig,
    cancel: CancelHandle,
}

impl Orchestrator {
    /// Wire the capabilities together; fails on an invalid config
    pub fn new(
        repository: Arc<dyn MetadataRepository>,
        classifier: Arc<dyn SensitivityClassifier>,
        audit_sink: Arc<dyn AuditSink>,
        notifier: Arc<dyn Notifier>,
        config: GovernanceConfig,
    ) -> Result<Self> {
        config.validate()?;

        let timeouts = &config.timeouts;
        Ok(Self {
            catalog: CatalogReader::new(repository, config.sample_size, timeouts.catalog()),
            classifier: ClassifierAdapter::new(
                classifier,
                config.classifier.clone(),
                timeouts.classifier(),
                config.concurrency.classifier_concurrency,
            ),
            enforcer: PolicyEnforcer::new(config.policy.clone()),
            audit: AuditLogger::new(audit_sink, timeouts.audit()),
            alerts: AlertEmitter::new(notifier, timeouts.notify()),
            config,
            cancel: CancelHandle::default(),
        })
    }

    pub fn config(&self) -> &GovernanceConfig {
        &self.config
    }

    /// Handle for cancelling in-flight and future passes
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Run one governance pass over `scope`
    ///
    /// Returns `Err` only when the catalog is unavailable; all other failures
    /// are recorded and counted in the summary.
    pub async fn run_pass(&self, scope: RunScope) -> Result<RunSummary> {
        let mut summary = RunSummary::new();
        let run_id = summary.run_id.clone();

        tracing::info!(
            run_id = %run_id,
            catalog = self.catalog.repository().name(),
            classifier = self.classifier.classifier_name(),
            audit = self.audit.sink_name(),
            "Governance pass started"
        );
        if self.cancel.is_cancelled() {
            tracing::warn!(
                run_id = %run_id,
                "Pass started with cancellation set, no table will run until the handle is reset"
            );
        }

        let repository = self.catalog.repository().clone();
        with_timeout(self.config.timeouts.catalog(), "open catalog", repository.open())
            .await
            .map_err(|e| GovernanceError::CatalogUnavailable(e.to_string()))?;

        let outcome = self.run_tables(&run_id, &scope, &mut summary).await;

        if let Err(e) = with_timeout(self.config.timeouts.catalog(), "close catalog", repository.close()).await {
            tracing::warn!(run_id = %run_id, error = %e, "Failed to close catalog");
        }

        if let Err(e) = outcome {
            tracing::error!(run_id = %run_id, error = %e, "Governance pass aborted");
            let record = AuditRecord::run(&run_id, AuditAction::Error, format!("{}: {}", e.code(), e));
            if let Err(audit_err) = self.audit.record(record).await {
                tracing::error!(run_id = %run_id, error = %audit_err, "Failed to record pass abort");
            }
            return Err(e);
        }

        summary.finished_at = Some(Utc::now());
        self.record_summary(&summary).await;
        self.alerts.on_run_summary(&summary).await;

        tracing::info!(
            run_id = %run_id,
            tables = summary.tables_processed,
            tags_applied = summary.tags_applied,
            tags_updated = summary.tags_updated,
            policies_attached = summary.policies_attached,
            policies_skipped = summary.policies_skipped,
            conflicts = summary.conflicts,
            errors = summary.errors,
            retry = summary.retry_tables.len(),
            cancelled = summary.cancelled,
            "Governance pass finished"
        );
        Ok(summary)
    }

    async fn run_tables(
        &self,
        run_id: &str,
        scope: &RunScope,
        summary: &mut RunSummary,
    ) -> Result<()> {
        let discovered = self.catalog.list_tables().await?;
        let tables: Vec<TableRef> = discovered
            .iter()
            .filter(|t| scope.includes(t))
            .cloned()
            .collect();

        if let RunScope::Tables(requested) = scope {
            let known: BTreeSet<&TableRef> = discovered.iter().collect();
            for missing in requested.iter().filter(|t| !known.contains(t)) {
                summary.errors += 1;
                let error = GovernanceError::TableNotFound(missing.to_string());
                tracing::warn!(run_id, table = %missing, "Scoped table not in catalog");
                if let Err(e) = self.audit.record(AuditRecord::error(missing, None, &error)).await {
                    tracing::error!(run_id, table = %missing, error = %e, "Audit write failed");
                    summary.retry_tables.push(missing.clone());
                }
            }
        }

        tracing::debug!(run_id, discovered = discovered.len(), scheduled = tables.len(), "Tables discovered");

        let workers = self.config.concurrency.table_workers.max(1);
        let mut pipelines = stream::iter(tables)
            .map(|table| async move {
                if self.cancel.is_cancelled() {
                    return (table, Ok(None));
                }
                let result = self.run_table(run_id, &table).await.map(Some);
                (table, result)
            })
            .buffer_unordered(workers);

        while let Some((table, result)) = pipelines.next().await {
            match result {
                Ok(Some(stats)) => summary.absorb(&table, &stats),
                Ok(None) => summary.cancelled = true,
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// Run one table's pipeline; `Err` only for run-fatal errors
    async fn run_table(&self, run_id: &str, table: &TableRef) -> Result<TableStats> {
        let mut pipeline = TablePipeline {
            orchestrator: self,
            run_id,
            table,
            stats: TableStats::default(),
        };

        let outcome = pipeline.execute().await;
        let mut stats = pipeline.stats;
        match outcome {
            Ok(()) => {}
            Err(Halt::Fatal(e)) => return Err(e),
            Err(Halt::Retry(e)) => {
                tracing::error!(
                    run_id,
                    table = %table,
                    error = %e,
                    "Audit write failed, table will be retried next pass"
                );
                stats.status = TableStatus::RetryPending;
                stats.errors += 1;
            }
            Err(Halt::Cancelled) => {
                tracing::info!(run_id, table = %table, "Table pipeline cancelled at checkpoint");
                stats.status = TableStatus::Cancelled;
            }
        }
        Ok(stats)
    }

    async fn record_summary(&self, summary: &RunSummary) {
        let details = match serde_json::to_string(summary) {
            Ok(json) => json,
            Err(e) => {
                tracing::error!(run_id = %summary.run_id, error = %e, "Failed to serialize run summary");
                return;
            }
        };
        let record = AuditRecord::run(&summary.run_id, AuditAction::RunSummary, details);
        if let Err(e) = self.audit.record(record).await {
            tracing::error!(run_id = %summary.run_id, error = %e, "Failed to record run summary");
        }
    }
}

/// A column as observed at the start of the pass
struct ObservedColumn {
    column: Column,
    tag: TagState,
    samples: Vec<String>,
}

struct TablePipeline<'a> {
    orchestrator: &'a Orchestrator,
    run_id: &'a str,
    table: &'a TableRef,
    stats: TableStats,
}

impl TablePipeline<'_> {
    async fn execute(&mut self) -> Step<()> {
        let orch = self.orchestrator;
        let table = self.table;
        let tag_name = orch.config.policy.tag_name.as_str();

        // Discovered → Sampled
        let columns = match orch.catalog.list_columns(table).await {
            Ok(columns) => columns,
            Err(e) => return self.catalog_failure(e).await,
        };

        let mut observed = Vec::with_capacity(columns.len());
        for column in columns {
            let samples = match orch.catalog.sample_values(table, &column.name).await {
                Ok(samples) => samples,
                Err(e) => return self.catalog_failure(e).await,
            };
            let tag = match orch.catalog.tag_state(table, &column.name, tag_name).await {
                Ok(tag) => tag,
                Err(e) => return self.catalog_failure(e).await,
            };
            observed.push(ObservedColumn { column, tag, samples });
        }

        // Sampled → Classified
        let results = futures::future::join_all(observed.iter().map(|o| {
            orch.classifier
                .classify(table, &o.column, o.samples.clone())
        }))
        .await;

        // Classified → Reconciled → TagApplied/NoOp
        let mut labels: BTreeMap<String, SensitivityLabel> = BTreeMap::new();
        let mut pii_decided = false;

        for (entry, result) in observed.iter().zip(results) {
            let name = entry.column.name.as_str();
            let classified = match result {
                Ok(classified) => classified,
                Err(e) => {
                    // Keep existing protection for the policy decision
                    if let Some(existing) = entry.tag.label() {
                        labels.insert(name.to_string(), existing);
                    }
                    self.fail(Some(name), &e).await?;
                    continue;
                }
            };

            let label = classified.label;
            labels.insert(name.to_string(), label);
            pii_decided |= label.requires_row_policy();

            let action = reconcile(name, &entry.tag, label);
            self.apply_tag(entry, action).await?;
        }

        // PolicyEvaluated → PolicyApplied/Skipped/Conflict
        self.enforce_policy(&labels).await?;

        let untagged = !observed.is_empty() && observed.iter().all(|o| o.tag.is_absent());
        if untagged && !pii_decided {
            self.stats.alerts += 1;
            self.record(AuditRecord::table(
                table,
                None,
                AuditAction::AlertUntaggedTable,
                format!("No {} tag on any column", tag_name),
            ))
            .await?;
            orch.alerts.on_untagged_table(self.run_id, table).await;
            self.checkpoint()?;
        }

        if self.stats.records == 0 {
            self.record(AuditRecord::table(table, None, AuditAction::Noop, "No changes"))
                .await?;
        }

        tracing::debug!(
            run_id = self.run_id,
            table = %table,
            records = self.stats.records,
            errors = self.stats.errors,
            "Table pipeline done"
        );
        Ok(())
    }

    async fn apply_tag(&mut self, observed: &ObservedColumn, action: TagAction) -> Step<()> {
        let orch = self.orchestrator;
        let table = self.table;
        let tag_name = orch.config.policy.tag_name.as_str();
        let name = observed.column.name.as_str();

        let label = match action.target() {
            Some(label) => label,
            None => {
                self.stats.tags_unchanged += 1;
                if orch.config.audit.record_noops {
                    let details = format!("{}={}", tag_name, observed.tag);
                    self.record(AuditRecord::table(table, Some(name), AuditAction::Noop, details))
                        .await?;
                    self.checkpoint()?;
                }
                return Ok(());
            }
        };

        let write = with_timeout(
            orch.config.timeouts.mutation(),
            format!("set tag on {}.{}", table, name),
            orch.catalog
                .repository()
                .set_column_tag(table, name, tag_name, label.as_str()),
        )
        .await;

        if let Err(e) = write {
            let error = GovernanceError::TagWriteFailed {
                table: table.to_string(),
                column: name.to_string(),
                reason: e.to_string(),
            };
            return self.fail(Some(name), &error).await;
        }

        let (audit_action, details) = match action {
            TagAction::Update { .. } => {
                self.stats.tags_updated += 1;
                (
                    AuditAction::TagUpdated,
                    format!("{}={} (was {})", tag_name, label, observed.tag),
                )
            }
            _ => {
                self.stats.tags_applied += 1;
                (AuditAction::TagApplied, format!("{}={}", tag_name, label))
            }
        };

        tracing::info!(
            run_id = self.run_id,
            table = %table,
            column = name,
            label = %label,
            action = %audit_action,
            "Column tagged"
        );
        self.record(AuditRecord::table(table, Some(name), audit_action, details))
            .await?;
        self.checkpoint()
    }

    /// Decide and apply the row policy under the table's lock
    async fn enforce_policy(&mut self, labels: &BTreeMap<String, SensitivityLabel>) -> Step<()> {
        let orch = self.orchestrator;
        let table = self.table;
        let policy_name = orch.enforcer.policy_name().to_string();

        let _guard = orch.enforcer.lock(table).await;

        let current = match orch.catalog.row_policy(table).await {
            Ok(current) => current,
            Err(e) => return self.catalog_failure(e).await,
        };

        let action = match orch.enforcer.decide(table, labels, current.as_ref()) {
            Ok(action) => action,
            Err(e) => return self.fail(None, &e).await,
        };

        match action {
            PolicyAction::None => Ok(()),
            PolicyAction::Skip => {
                self.stats.policies_skipped += 1;
                tracing::debug!(run_id = self.run_id, table = %table, policy = %policy_name, "Policy already attached");
                self.record(AuditRecord::table(
                    table,
                    None,
                    AuditAction::PolicySkipped,
                    format!("{} already attached", policy_name),
                ))
                .await?;
                self.checkpoint()
            }
            PolicyAction::Conflict { existing } => {
                self.stats.conflicts += 1;
                let conflict = GovernanceError::PolicyConflict {
                    table: table.to_string(),
                    existing,
                    expected: policy_name,
                };
                tracing::warn!(run_id = self.run_id, table = %table, error = %conflict, "Row policy conflict");
                self.record(AuditRecord::table(
                    table,
                    None,
                    AuditAction::PolicyConflict,
                    conflict.to_string(),
                ))
                .await?;
                self.checkpoint()
            }
            PolicyAction::Attach { key_columns } => {
                let attach = with_timeout(
                    orch.config.timeouts.mutation(),
                    format!("attach {} to {}", policy_name, table),
                    orch.catalog
                        .repository()
                        .attach_row_policy(table, &policy_name, &key_columns),
                )
                .await;

                if let Err(e) = attach {
                    let error = GovernanceError::PolicyAttachFailed {
                        table: table.to_string(),
                        policy: policy_name,
                        reason: e.to_string(),
                    };
                    return self.fail(None, &error).await;
                }

                self.stats.policies_attached += 1;
                tracing::info!(
                    run_id = self.run_id,
                    table = %table,
                    policy = %policy_name,
                    keys = ?key_columns,
                    "Row policy attached"
                );
                self.record(AuditRecord::table(
                    table,
                    None,
                    AuditAction::PolicyAttached,
                    format!("{} ON ({})", policy_name, key_columns.join(", ")),
                ))
                .await?;
                self.checkpoint()
            }
        }
    }

    /// Record a non-fatal error and continue
    async fn fail(&mut self, column: Option<&str>, error: &GovernanceError) -> Step<()> {
        self.stats.errors += 1;
        tracing::warn!(
            run_id = self.run_id,
            table = %self.table,
            column = ?column,
            code = error.code(),
            error = %error,
            "Governance step failed"
        );
        self.record(AuditRecord::error(self.table, column, error))
            .await?;
        self.checkpoint()
    }

    /// A catalog read failed: abort the pass or end this table
    async fn catalog_failure(&mut self, error: GovernanceError) -> Step<()> {
        if error.is_run_fatal() {
            return Err(Halt::Fatal(error));
        }
        self.fail(None, &error).await
    }

    async fn record(&mut self, record: AuditRecord) -> Step<()> {
        self.orchestrator
            .audit
            .record(record)
            .await
            .map_err(Halt::Retry)?;
        self.stats.records += 1;
        Ok(())
    }

    fn checkpoint(&self) -> Step<()> {
        if self.orchestrator.cancel.is_cancelled() {
            return Err(Halt::Cancelled);
        }
        Ok(())
    }
}
