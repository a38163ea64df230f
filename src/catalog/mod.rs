//! Metadata repository trait: the core abstraction for catalog backends
//!
//! All catalog backends (warehouse, in-memory, etc.) implement
//! `MetadataRepository`. The `CatalogReader` wraps a repository with the
//! sampling bound, read timeouts, and the `CatalogUnavailable` error policy.

use crate::config::MAX_SAMPLE_SIZE;
use crate::error::{with_timeout, GovernanceError, Result};
use crate::types::{Column, PolicyAttachment, TableRef, TagState};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

pub mod memory;

/// Core trait for catalog backends
///
/// Implementations read tables, columns and sample values, and read or
/// mutate column tags and row access policies. Transport and schema are
/// the implementation's concern.
#[async_trait]
pub trait MetadataRepository: Send + Sync {
    /// Called once at the start of a pass
    async fn open(&self) -> Result<()> {
        Ok(())
    }

    /// Called once at the end of a pass, including failed passes
    async fn close(&self) -> Result<()> {
        Ok(())
    }

    /// List all tables in the catalog
    async fn list_tables(&self) -> Result<Vec<TableRef>>;

    /// List a table's columns in declaration order
    async fn list_columns(&self, table: &TableRef) -> Result<Vec<Column>>;

    /// Read at most `limit` values of a column, rendered as text
    ///
    /// Must not scan the full table.
    async fn sample_values(
        &self,
        table: &TableRef,
        column: &str,
        limit: usize,
    ) -> Result<Vec<String>>;

    /// Read a named tag on a column
    async fn get_column_tag(
        &self,
        table: &TableRef,
        column: &str,
        tag_name: &str,
    ) -> Result<Option<String>>;

    /// Set a named tag on a column; setting the same value twice is a no-op
    async fn set_column_tag(
        &self,
        table: &TableRef,
        column: &str,
        tag_name: &str,
        value: &str,
    ) -> Result<()>;

    /// Read the row access policy attached to a table, if any
    async fn get_row_policy(&self, table: &TableRef) -> Result<Option<PolicyAttachment>>;

    /// Attach a row access policy on the given key columns
    async fn attach_row_policy(
        &self,
        table: &TableRef,
        policy_name: &str,
        key_columns: &[String],
    ) -> Result<()>;

    /// Backend name (e.g., "memory", "snowflake")
    fn name(&self) -> &str;
}

/// Values treated as NULL when they come back from a sample
pub fn is_null_like(value: &str) -> bool {
    let v = value.trim();
    v.is_empty()
        || v.eq_ignore_ascii_case("null")
        || v.eq_ignore_ascii_case("none")
        || v.eq_ignore_ascii_case("nan")
}

/// Read-only view of the catalog used by the orchestrator
///
/// Every failure, including a timeout, surfaces as `CatalogUnavailable`,
/// except `TableNotFound` for a table dropped mid-pass.
#[derive(Clone)]
pub struct CatalogReader {
    repository: Arc<dyn MetadataRepository>,
    sample_size: usize,
    timeout: Duration,
}

impl CatalogReader {
    /// Create a reader; `sample_size` is clamped to `1..=MAX_SAMPLE_SIZE`
    pub fn new(repository: Arc<dyn MetadataRepository>, sample_size: usize, timeout: Duration) -> Self {
        Self {
            repository,
            sample_size: sample_size.clamp(1, MAX_SAMPLE_SIZE),
            timeout,
        }
    }

    pub fn sample_size(&self) -> usize {
        self.sample_size
    }

    pub async fn list_tables(&self) -> Result<Vec<TableRef>> {
        self.read("list tables", self.repository.list_tables()).await
    }

    pub async fn list_columns(&self, table: &TableRef) -> Result<Vec<Column>> {
        self.read(
            format!("list columns of {}", table),
            self.repository.list_columns(table),
        )
        .await
    }

    /// Sample a column, dropping NULL-like values
    pub async fn sample_values(&self, table: &TableRef, column: &str) -> Result<Vec<String>> {
        let mut values = self
            .read(
                format!("sample {}.{}", table, column),
                self.repository
                    .sample_values(table, column, self.sample_size),
            )
            .await?;

        values.truncate(self.sample_size);
        values.retain(|v| !is_null_like(v));

        tracing::debug!(
            table = %table,
            column = column,
            samples = values.len(),
            "Column sampled"
        );
        Ok(values)
    }

    pub async fn tag_state(&self, table: &TableRef, column: &str, tag_name: &str) -> Result<TagState> {
        let raw = self
            .read(
                format!("read tag {} on {}.{}", tag_name, table, column),
                self.repository.get_column_tag(table, column, tag_name),
            )
            .await?;
        Ok(TagState::from_raw(raw.as_deref()))
    }

    pub async fn row_policy(&self, table: &TableRef) -> Result<Option<PolicyAttachment>> {
        self.read(
            format!("read row policy of {}", table),
            self.repository.get_row_policy(table),
        )
        .await
    }

    pub fn repository(&self) -> &Arc<dyn MetadataRepository> {
        &self.repository
    }

    async fn read<T>(
        &self,
        what: impl std::fmt::Display,
        fut: impl std::future::Future<Output = Result<T>>,
    ) -> Result<T> {
        with_timeout(self.timeout, &what, fut)
            .await
            .map_err(|e| match e {
                GovernanceError::CatalogUnavailable(_) | GovernanceError::TableNotFound(_) => e,
                other => GovernanceError::CatalogUnavailable(format!("{}: {}", what, other)),
            })
    }
}
