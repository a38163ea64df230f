//! In-memory catalog for development and testing
//!
//! Tables, sample values, tags and policies live in a `BTreeMap` behind a
//! `RwLock`, so listing order is deterministic. Contents are lost on drop.

use super::MetadataRepository;
use crate::error::{GovernanceError, Result};
use crate::types::{Column, PolicyAttachment, TableRef};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

#[derive(Debug, Default, Clone)]
struct MemoryTable {
    columns: Vec<Column>,
    /// column → values in insertion order
    values: HashMap<String, Vec<String>>,
    /// (column, tag name) → value
    tags: HashMap<(String, String), String>,
    policy: Option<PolicyAttachment>,
}

/// In-memory `MetadataRepository`
#[derive(Default)]
pub struct MemoryCatalog {
    tables: RwLock<BTreeMap<TableRef, MemoryTable>>,
    tag_writes: AtomicU64,
    policy_writes: AtomicU64,
}

impl MemoryCatalog {
    /// Create an empty catalog
    pub fn new() -> Self {
        Self::default()
    }

    /// Add (or replace) a table with its columns
    pub fn with_table(self, table: TableRef, columns: Vec<Column>) -> Self {
        if let Ok(mut tables) = self.tables.write() {
            tables.insert(
                table,
                MemoryTable {
                    columns,
                    ..Default::default()
                },
            );
        }
        self
    }

    /// Append values to a column of an existing table
    pub fn with_values<I, S>(self, table: &TableRef, column: &str, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if let Ok(mut tables) = self.tables.write() {
            if let Some(t) = tables.get_mut(table) {
                t.values
                    .entry(column.to_string())
                    .or_default()
                    .extend(values.into_iter().map(Into::into));
            }
        }
        self
    }

    /// Pre-set a column tag without counting it as a write
    pub fn with_tag(self, table: &TableRef, column: &str, tag_name: &str, value: &str) -> Self {
        if let Ok(mut tables) = self.tables.write() {
            if let Some(t) = tables.get_mut(table) {
                t.tags
                    .insert((column.to_string(), tag_name.to_string()), value.to_string());
            }
        }
        self
    }

    /// Pre-attach a row access policy without counting it as a write
    pub fn with_policy(self, table: &TableRef, policy_name: &str, key_columns: &[&str]) -> Self {
        if let Ok(mut tables) = self.tables.write() {
            if let Some(t) = tables.get_mut(table) {
                t.policy = Some(PolicyAttachment {
                    table: table.clone(),
                    policy_name: policy_name.to_string(),
                    key_columns: key_columns.iter().map(|c| c.to_string()).collect(),
                });
            }
        }
        self
    }

    /// Current tag value, for assertions
    pub fn tag(&self, table: &TableRef, column: &str, tag_name: &str) -> Option<String> {
        let tables = self.tables.read().ok()?;
        tables
            .get(table)?
            .tags
            .get(&(column.to_string(), tag_name.to_string()))
            .cloned()
    }

    /// Current policy attachment, for assertions
    pub fn policy(&self, table: &TableRef) -> Option<PolicyAttachment> {
        let tables = self.tables.read().ok()?;
        tables.get(table)?.policy.clone()
    }

    /// Number of `set_column_tag` calls that reached the catalog
    pub fn tag_writes(&self) -> u64 {
        self.tag_writes.load(Ordering::SeqCst)
    }

    /// Number of successful `attach_row_policy` calls
    pub fn policy_writes(&self) -> u64 {
        self.policy_writes.load(Ordering::SeqCst)
    }

    fn read_table<T>(&self, table: &TableRef, f: impl FnOnce(&MemoryTable) -> T) -> Result<T> {
        let tables = self.tables.read().map_err(|e| {
            GovernanceError::CatalogUnavailable(format!("Catalog lock poisoned: {}", e))
        })?;
        let t = tables
            .get(table)
            .ok_or_else(|| GovernanceError::TableNotFound(table.to_string()))?;
        Ok(f(t))
    }

    fn write_table<T>(
        &self,
        table: &TableRef,
        f: impl FnOnce(&mut MemoryTable) -> Result<T>,
    ) -> Result<T> {
        let mut tables = self.tables.write().map_err(|e| {
            GovernanceError::CatalogUnavailable(format!("Catalog lock poisoned: {}", e))
        })?;
        let t = tables
            .get_mut(table)
            .ok_or_else(|| GovernanceError::TableNotFound(table.to_string()))?;
        f(t)
    }
}

#[async_trait]
impl MetadataRepository for MemoryCatalog {
    async fn list_tables(&self) -> Result<Vec<TableRef>> {
        let tables = self.tables.read().map_err(|e| {
            GovernanceError::CatalogUnavailable(format!("Catalog lock poisoned: {}", e))
        })?;
        Ok(tables.keys().cloned().collect())
    }

    async fn list_columns(&self, table: &TableRef) -> Result<Vec<Column>> {
        self.read_table(table, |t| t.columns.clone())
    }

    async fn sample_values(
        &self,
        table: &TableRef,
        column: &str,
        limit: usize,
    ) -> Result<Vec<String>> {
        self.read_table(table, |t| {
            t.values
                .get(column)
                .map(|values| values.iter().take(limit).cloned().collect())
                .unwrap_or_default()
        })
    }

    async fn get_column_tag(
        &self,
        table: &TableRef,
        column: &str,
        tag_name: &str,
    ) -> Result<Option<String>> {
        self.read_table(table, |t| {
            t.tags
                .get(&(column.to_string(), tag_name.to_string()))
                .cloned()
        })
    }

    async fn set_column_tag(
        &self,
        table: &TableRef,
        column: &str,
        tag_name: &str,
        value: &str,
    ) -> Result<()> {
        self.write_table(table, |t| {
            if !t.columns.iter().any(|c| c.name == column) {
                return Err(GovernanceError::Backend(format!(
                    "Column {}.{} does not exist",
                    table, column
                )));
            }
            t.tags
                .insert((column.to_string(), tag_name.to_string()), value.to_string());
            Ok(())
        })?;
        self.tag_writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn get_row_policy(&self, table: &TableRef) -> Result<Option<PolicyAttachment>> {
        self.read_table(table, |t| t.policy.clone())
    }

    async fn attach_row_policy(
        &self,
        table: &TableRef,
        policy_name: &str,
        key_columns: &[String],
    ) -> Result<()> {
        self.write_table(table, |t| {
            if let Some(existing) = &t.policy {
                return Err(GovernanceError::Backend(format!(
                    "Table {} already has row access policy '{}'",
                    table, existing.policy_name
                )));
            }
            if let Some(missing) = key_columns
                .iter()
                .find(|k| !t.columns.iter().any(|c| &c.name == *k))
            {
                return Err(GovernanceError::Backend(format!(
                    "Key column {}.{} does not exist",
                    table, missing
                )));
            }
            t.policy = Some(PolicyAttachment {
                table: table.clone(),
                policy_name: policy_name.to_string(),
                key_columns: key_columns.to_vec(),
            });
            Ok(())
        })?;
        self.policy_writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn name(&self) -> &str {
        "memory"
    }
}
