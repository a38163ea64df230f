//! Warehouse SQL rendering and a SQL-backed audit sink
//!
//! Renders the Snowflake statements behind the catalog mutations and the
//! governance log, with identifier quoting and literal escaping. Execution is
//! delegated to a `SqlExecutor` so the crate carries no driver.
//!
//! `SqlCatalogWriter` runs the tag and policy mutations for a
//! `MetadataRepository` implementation built on a warehouse driver. The read
//! renderers (`sample_values`) are building blocks for such implementations,
//! since `SqlExecutor` returns no rows.

use crate::audit::{AuditRecord, AuditSink};
use crate::error::{GovernanceError, Result};
use crate::types::TableRef;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::OnceCell;

/// Default governance log table
pub const AUDIT_LOG_TABLE: &str = "GOVERNANCE_AUTOPILOT_LOG";

/// Render an identifier, quoting it unless it is a plain unquoted name
///
/// Plain names (`[A-Za-z_][A-Za-z0-9_$]*`) are left bare so they keep the
/// warehouse's case folding; anything else is double-quoted with inner quotes
/// doubled.
pub fn ident(name: &str) -> String {
    let mut chars = name.chars();
    let plain = match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
        }
        _ => false,
    };

    if plain {
        name.to_string()
    } else {
        format!("\"{}\"", name.replace('"', "\"\""))
    }
}

/// Render a qualified table name
pub fn table_ident(table: &TableRef) -> String {
    format!("{}.{}", ident(&table.schema), ident(&table.name))
}

/// Render a string literal
pub fn literal(value: &str) -> String {
    format!("'{}'", value.replace('\\', "\\\\").replace('\'', "''"))
}

fn nullable_literal(value: Option<&str>) -> String {
    value.map(literal).unwrap_or_else(|| "NULL".to_string())
}

/// `CREATE TABLE IF NOT EXISTS` for the governance log
pub fn create_audit_table(log_table: &str) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {} (\n    \
         EVENT_TIME   TIMESTAMP_NTZ DEFAULT CURRENT_TIMESTAMP(),\n    \
         OBJECT_TYPE  STRING,\n    \
         OBJECT_NAME  STRING,\n    \
         COLUMN_NAME  STRING,\n    \
         ACTION       STRING,\n    \
         DETAILS      STRING\n)",
        ident(log_table)
    )
}

/// Append one audit record to the governance log
pub fn insert_audit(log_table: &str, record: &AuditRecord) -> String {
    format!(
        "INSERT INTO {} (EVENT_TIME, OBJECT_TYPE, OBJECT_NAME, COLUMN_NAME, ACTION, DETAILS) \
         VALUES ({}::TIMESTAMP_NTZ, {}, {}, {}, {}, {})",
        ident(log_table),
        literal(&record.event_time.format("%Y-%m-%d %H:%M:%S%.6f").to_string()),
        literal(&record.object_type),
        literal(&record.object_name),
        nullable_literal(record.column_name.as_deref()),
        literal(record.action.as_str()),
        literal(&record.details),
    )
}

/// Set a column tag
pub fn set_column_tag(table: &TableRef, column: &str, tag_name: &str, value: &str) -> String {
    format!(
        "ALTER TABLE {} MODIFY COLUMN {} SET TAG {} = {}",
        table_ident(table),
        ident(column),
        ident(tag_name),
        literal(value)
    )
}

/// Attach a row access policy keyed on `key_columns`
pub fn add_row_policy(table: &TableRef, policy_name: &str, key_columns: &[String]) -> Result<String> {
    if key_columns.is_empty() {
        return Err(GovernanceError::PolicyAttachFailed {
            table: table.to_string(),
            policy: policy_name.to_string(),
            reason: "no key columns configured".to_string(),
        });
    }

    let keys: Vec<String> = key_columns.iter().map(|c| ident(c)).collect();
    Ok(format!(
        "ALTER TABLE {} ADD ROW ACCESS POLICY {} ON ({})",
        table_ident(table),
        ident(policy_name),
        keys.join(", ")
    ))
}

/// Sample up to `limit` non-null values of a column
pub fn sample_values(table: &TableRef, column: &str, limit: usize) -> String {
    let column = ident(column);
    format!(
        "SELECT {col}::STRING FROM {} WHERE {col} IS NOT NULL LIMIT {}",
        table_ident(table),
        limit,
        col = column
    )
}

/// Capability that runs a rendered statement
#[async_trait]
pub trait SqlExecutor: Send + Sync {
    /// Execute a statement, discarding any result set
    async fn execute(&self, statement: &str) -> Result<()>;
}

/// Catalog mutations executed through a `SqlExecutor`
pub struct SqlCatalogWriter {
    executor: Arc<dyn SqlExecutor>,
}

impl SqlCatalogWriter {
    pub fn new(executor: Arc<dyn SqlExecutor>) -> Self {
        Self { executor }
    }

    /// Set `tag_name = value` on a column
    pub async fn set_column_tag(&self, table: &TableRef, column: &str, tag_name: &str, value: &str) -> Result<()> {
        self.executor
            .execute(&set_column_tag(table, column, tag_name, value))
            .await
            .map_err(|e| GovernanceError::TagWriteFailed {
                table: table.to_string(),
                column: column.to_string(),
                reason: e.to_string(),
            })?;
        tracing::debug!(table = %table, column, tag = tag_name, value, "Column tag set");
        Ok(())
    }

    /// Attach a row access policy
    pub async fn attach_row_policy(&self, table: &TableRef, policy_name: &str, key_columns: &[String]) -> Result<()> {
        let statement = add_row_policy(table, policy_name, key_columns)?;
        self.executor
            .execute(&statement)
            .await
            .map_err(|e| GovernanceError::PolicyAttachFailed {
                table: table.to_string(),
                policy: policy_name.to_string(),
                reason: e.to_string(),
            })?;
        tracing::debug!(table = %table, policy = policy_name, "Row policy attached");
        Ok(())
    }
}

/// Audit sink writing `INSERT` statements through a `SqlExecutor`
///
/// The log table is created on first append.
pub struct SqlAuditSink {
    executor: Arc<dyn SqlExecutor>,
    log_table: String,
    created: OnceCell<()>,
}

impl SqlAuditSink {
    pub fn new(executor: Arc<dyn SqlExecutor>) -> Self {
        Self::with_table(executor, AUDIT_LOG_TABLE)
    }

    pub fn with_table(executor: Arc<dyn SqlExecutor>, log_table: impl Into<String>) -> Self {
        Self {
            executor,
            log_table: log_table.into(),
            created: OnceCell::new(),
        }
    }

    pub fn log_table(&self) -> &str {
        &self.log_table
    }
}

#[async_trait]
impl AuditSink for SqlAuditSink {
    async fn append(&self, record: &AuditRecord) -> Result<()> {
        self.created
            .get_or_try_init(|| async {
                self.executor
                    .execute(&create_audit_table(&self.log_table))
                    .await
                    .map_err(|e| {
                        GovernanceError::AuditWriteFailed(format!(
                            "Failed to create {}: {}",
                            self.log_table, e
                        ))
                    })?;
                tracing::info!(table = %self.log_table, "Audit log table ready");
                Ok::<(), GovernanceError>(())
            })
            .await?;

        self.executor
            .execute(&insert_audit(&self.log_table, record))
            .await
            .map_err(|e| {
                GovernanceError::AuditWriteFailed(format!(
                    "Failed to insert into {}: {}",
                    self.log_table, e
                ))
            })
    }

    fn name(&self) -> &str {
        "sql"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::AuditAction;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingExecutor {
        statements: Mutex<Vec<String>>,
        fail_create: bool,
    }

    impl RecordingExecutor {
        fn statements(&self) -> Vec<String> {
            self.statements.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl SqlExecutor for RecordingExecutor {
        async fn execute(&self, statement: &str) -> Result<()> {
            if self.fail_create && statement.starts_with("CREATE") {
                return Err(GovernanceError::Backend("insufficient privileges".to_string()));
            }
            self.statements.lock().unwrap().push(statement.to_string());
            Ok(())
        }
    }

    fn customers() -> TableRef {
        TableRef::new("PUBLIC", "CUSTOMERS_DEMO")
    }

    #[test]
    fn test_ident_quoting() {
        assert_eq!(ident("EMAIL"), "EMAIL");
        assert_eq!(ident("first_name"), "first_name");
        assert_eq!(ident("order id"), "\"order id\"");
        assert_eq!(ident("1st"), "\"1st\"");
        assert_eq!(ident("a\"b"), "\"a\"\"b\"");
        assert_eq!(ident(""), "\"\"");
    }

    #[test]
    fn test_literal_escaping() {
        assert_eq!(literal("PII"), "'PII'");
        assert_eq!(literal("O'Brien"), "'O''Brien'");
        assert_eq!(literal("a\\'; DROP"), "'a\\\\''; DROP'");
    }

    #[test]
    fn test_set_column_tag() {
        assert_eq!(
            set_column_tag(&customers(), "EMAIL", "DATA_SENSITIVITY", "PII"),
            "ALTER TABLE PUBLIC.CUSTOMERS_DEMO MODIFY COLUMN EMAIL SET TAG DATA_SENSITIVITY = 'PII'"
        );
    }

    #[test]
    fn test_add_row_policy() {
        let sql = add_row_policy(
            &customers(),
            "PII_ROW_POLICY",
            &["REGION".to_string(), "owner id".to_string()],
        )
        .unwrap();
        assert_eq!(
            sql,
            "ALTER TABLE PUBLIC.CUSTOMERS_DEMO ADD ROW ACCESS POLICY PII_ROW_POLICY ON (REGION, \"owner id\")"
        );
        assert!(add_row_policy(&customers(), "PII_ROW_POLICY", &[]).is_err());
    }

    #[test]
    fn test_sample_values() {
        assert_eq!(
            sample_values(&customers(), "PHONE", 10),
            "SELECT PHONE::STRING FROM PUBLIC.CUSTOMERS_DEMO WHERE PHONE IS NOT NULL LIMIT 10"
        );
    }

    #[test]
    fn test_insert_audit() {
        let record = AuditRecord::table(
            &customers(),
            Some("EMAIL"),
            AuditAction::TagApplied,
            "DATA_SENSITIVITY=PII",
        );
        let sql = insert_audit(AUDIT_LOG_TABLE, &record);
        assert!(sql.starts_with("INSERT INTO GOVERNANCE_AUTOPILOT_LOG (EVENT_TIME, OBJECT_TYPE"));
        assert!(sql.contains("'TABLE', 'PUBLIC.CUSTOMERS_DEMO', 'EMAIL', 'TAG_APPLIED', 'DATA_SENSITIVITY=PII')"));

        let record = AuditRecord::table(&customers(), None, AuditAction::PolicyAttached, "PII_ROW_POLICY");
        assert!(insert_audit(AUDIT_LOG_TABLE, &record).contains(", NULL, 'POLICY_ATTACHED'"));
    }

    #[tokio::test]
    async fn test_sql_sink_creates_table_once() {
        let executor = Arc::new(RecordingExecutor::default());
        let sink = SqlAuditSink::new(executor.clone());

        for action in [AuditAction::TagApplied, AuditAction::PolicyAttached] {
            sink.append(&AuditRecord::table(&customers(), None, action, ""))
                .await
                .unwrap();
        }

        let statements = executor.statements();
        assert_eq!(statements.len(), 3);
        assert!(statements[0].starts_with("CREATE TABLE IF NOT EXISTS GOVERNANCE_AUTOPILOT_LOG"));
        assert!(statements[1].starts_with("INSERT INTO"));
        assert!(statements[2].contains("POLICY_ATTACHED"));
    }

    #[tokio::test]
    async fn test_catalog_writer_executes_mutations() {
        let executor = Arc::new(RecordingExecutor::default());
        let writer = SqlCatalogWriter::new(executor.clone());

        writer
            .set_column_tag(&customers(), "EMAIL", "DATA_SENSITIVITY", "PII")
            .await
            .unwrap();
        writer
            .attach_row_policy(&customers(), "PII_ROW_POLICY", &["REGION".to_string()])
            .await
            .unwrap();

        assert_eq!(
            executor.statements(),
            vec![
                set_column_tag(&customers(), "EMAIL", "DATA_SENSITIVITY", "PII"),
                "ALTER TABLE PUBLIC.CUSTOMERS_DEMO ADD ROW ACCESS POLICY PII_ROW_POLICY ON (REGION)".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn test_catalog_writer_maps_failures() {
        let executor = Arc::new(RecordingExecutor::default());
        let writer = SqlCatalogWriter::new(executor.clone());
        let err = writer
            .attach_row_policy(&customers(), "PII_ROW_POLICY", &[])
            .await
            .unwrap_err();
        assert_eq!(err.code(), "POLICY_ATTACH_FAILED");
        assert!(executor.statements().is_empty());
    }

    #[tokio::test]
    async fn test_sql_sink_create_failure() {
        let executor = Arc::new(RecordingExecutor {
            fail_create: true,
            ..Default::default()
        });
        let sink = SqlAuditSink::new(executor.clone());
        let err = sink
            .append(&AuditRecord::table(&customers(), None, AuditAction::Noop, ""))
            .await
            .unwrap_err();
        assert!(matches!(err, GovernanceError::AuditWriteFailed(_)));
        assert!(executor.statements().is_empty());
    }
}
