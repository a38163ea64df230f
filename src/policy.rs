//! Row access policy enforcement
//!
//! `PolicyEnforcer::decide` is a pure function of the column labels and the
//! table's current attachment. The enforcer also hands out per-table locks so
//! the read-decide-attach-record sequence never runs twice at once for one
//! table.

use crate::config::PolicyConfig;
use crate::error::{GovernanceError, Result};
use crate::types::{PolicyAction, PolicyAttachment, SensitivityLabel, TableRef};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use tokio::sync::OwnedMutexGuard;

/// Decides PII row policy attachment for tables
pub struct PolicyEnforcer {
    config: PolicyConfig,
    locks: Mutex<HashMap<TableRef, Arc<tokio::sync::Mutex<()>>>>,
}

impl PolicyEnforcer {
    pub fn new(config: PolicyConfig) -> Self {
        Self {
            config,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Name of the policy this enforcer attaches
    pub fn policy_name(&self) -> &str {
        &self.config.policy_name
    }

    /// Key columns for a table: per-table entry first, then the global default
    pub fn key_columns_for(&self, table: &TableRef) -> Option<Vec<String>> {
        let keys = self
            .config
            .table_key_columns
            .get(&table.to_string())
            .unwrap_or(&self.config.default_key_columns);
        (!keys.is_empty()).then(|| keys.clone())
    }

    /// Decide the policy step for a table
    ///
    /// Fails with `PolicyAttachFailed` when attachment is required but no key
    /// columns are configured for the table.
    pub fn decide(
        &self,
        table: &TableRef,
        column_labels: &BTreeMap<String, SensitivityLabel>,
        current: Option<&PolicyAttachment>,
    ) -> Result<PolicyAction> {
        let required = column_labels
            .values()
            .any(SensitivityLabel::requires_row_policy);
        if !required {
            return Ok(PolicyAction::None);
        }

        match current {
            Some(existing) if existing.policy_name == self.config.policy_name => {
                Ok(PolicyAction::Skip)
            }
            Some(existing) => Ok(PolicyAction::Conflict {
                existing: existing.policy_name.clone(),
            }),
            None => {
                let key_columns = self.key_columns_for(table).ok_or_else(|| {
                    GovernanceError::PolicyAttachFailed {
                        table: table.to_string(),
                        policy: self.config.policy_name.clone(),
                        reason: "no key columns configured".to_string(),
                    }
                })?;
                Ok(PolicyAction::Attach { key_columns })
            }
        }
    }

    /// Acquire the table's policy lock
    pub async fn lock(&self, table: &TableRef) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self
                .locks
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            locks.entry(table.clone()).or_default().clone()
        };
        lock.lock_owned().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn t1() -> TableRef {
        TableRef::new("PUBLIC", "T1")
    }

    fn enforcer() -> PolicyEnforcer {
        let mut config = PolicyConfig {
            default_key_columns: vec!["ID".to_string()],
            ..Default::default()
        };
        config
            .table_key_columns
            .insert("PUBLIC.ORDERS".to_string(), vec!["REGION".to_string(), "OWNER".to_string()]);
        PolicyEnforcer::new(config)
    }

    fn labels(pairs: &[(&str, SensitivityLabel)]) -> BTreeMap<String, SensitivityLabel> {
        pairs.iter().map(|(c, l)| (c.to_string(), *l)).collect()
    }

    fn attachment(policy: &str) -> PolicyAttachment {
        PolicyAttachment {
            table: t1(),
            policy_name: policy.to_string(),
            key_columns: vec!["ID".to_string()],
        }
    }

    #[test]
    fn test_no_pii_needs_no_policy() {
        let action = enforcer()
            .decide(
                &t1(),
                &labels(&[("tier", SensitivityLabel::Internal), ("salary", SensitivityLabel::Confidential)]),
                None,
            )
            .unwrap();
        assert_eq!(action, PolicyAction::None);
    }

    #[test]
    fn test_pii_without_policy_attaches() {
        let action = enforcer()
            .decide(&t1(), &labels(&[("email", SensitivityLabel::Pii)]), None)
            .unwrap();
        assert_eq!(
            action,
            PolicyAction::Attach {
                key_columns: vec!["ID".to_string()]
            }
        );
    }

    #[test]
    fn test_pii_with_same_policy_skips() {
        let existing = attachment("PII_ROW_POLICY");
        let action = enforcer()
            .decide(&t1(), &labels(&[("email", SensitivityLabel::Pii)]), Some(&existing))
            .unwrap();
        assert_eq!(action, PolicyAction::Skip);
    }

    #[test]
    fn test_pii_with_other_policy_conflicts() {
        let existing = attachment("REGION_POLICY");
        let action = enforcer()
            .decide(&t1(), &labels(&[("email", SensitivityLabel::Pii)]), Some(&existing))
            .unwrap();
        assert_eq!(
            action,
            PolicyAction::Conflict {
                existing: "REGION_POLICY".to_string()
            }
        );
    }

    #[test]
    fn test_per_table_key_columns() {
        let orders = TableRef::new("PUBLIC", "ORDERS");
        let action = enforcer()
            .decide(&orders, &labels(&[("buyer_email", SensitivityLabel::Pii)]), None)
            .unwrap();
        assert_eq!(
            action,
            PolicyAction::Attach {
                key_columns: vec!["REGION".to_string(), "OWNER".to_string()]
            }
        );
    }

    #[test]
    fn test_missing_key_columns_fail() {
        let enforcer = PolicyEnforcer::new(PolicyConfig::default());
        let err = enforcer
            .decide(&t1(), &labels(&[("email", SensitivityLabel::Pii)]), None)
            .unwrap_err();
        assert!(matches!(err, GovernanceError::PolicyAttachFailed { .. }));

        // Not required, so missing keys do not matter
        assert_eq!(
            enforcer
                .decide(&t1(), &labels(&[("tier", SensitivityLabel::Public)]), None)
                .unwrap(),
            PolicyAction::None
        );
    }

    #[tokio::test]
    async fn test_table_lock_serializes() {
        let enforcer = Arc::new(enforcer());
        let guard = enforcer.lock(&t1()).await;

        let other = enforcer.clone();
        let waiter = tokio::spawn(async move {
            let _guard = other.lock(&t1()).await;
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        // A different table is not blocked
        let _orders = enforcer.lock(&TableRef::new("PUBLIC", "ORDERS")).await;

        drop(guard);
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
    }
}
