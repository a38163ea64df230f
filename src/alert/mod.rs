//! Alert emitter: best-effort notifications for operators
//!
//! `Notifier` is the delivery capability. `AlertEmitter` applies the notify
//! timeout and swallows every failure after logging it; a notification
//! problem never fails a table pipeline or a pass.

use crate::error::{with_timeout, GovernanceError, Result};
use crate::types::{RunSummary, TableRef};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

pub mod nats;

/// Structured event handed to a `Notifier`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AlertEvent {
    /// A table with no sensitivity tags and no PII columns
    UntaggedTable {
        #[serde(rename = "runId")]
        run_id: String,
        table: TableRef,
    },
    /// End-of-pass counters
    RunSummary { summary: RunSummary },
}

impl AlertEvent {
    /// Short event kind, also used as the subject suffix
    pub fn kind(&self) -> &'static str {
        match self {
            Self::UntaggedTable { .. } => "untagged_table",
            Self::RunSummary { .. } => "run_summary",
        }
    }
}

/// Delivery capability for alert events
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver one event
    async fn notify(&self, event: &AlertEvent) -> Result<()>;

    /// Notifier name (e.g., "memory", "nats")
    fn name(&self) -> &str;
}

/// Forwards orchestrator outcomes to a `Notifier`
pub struct AlertEmitter {
    notifier: Arc<dyn Notifier>,
    timeout: Duration,
}

impl AlertEmitter {
    pub fn new(notifier: Arc<dyn Notifier>, timeout: Duration) -> Self {
        Self { notifier, timeout }
    }

    pub async fn on_untagged_table(&self, run_id: &str, table: &TableRef) {
        self.emit(AlertEvent::UntaggedTable {
            run_id: run_id.to_string(),
            table: table.clone(),
        })
        .await;
    }

    pub async fn on_run_summary(&self, summary: &RunSummary) {
        self.emit(AlertEvent::RunSummary {
            summary: summary.clone(),
        })
        .await;
    }

    /// Deliver an event, logging instead of returning failures
    pub async fn emit(&self, event: AlertEvent) {
        let kind = event.kind();
        match with_timeout(
            self.timeout,
            format!("notify {}", kind),
            self.notifier.notify(&event),
        )
        .await
        {
            Ok(()) => {
                tracing::debug!(kind, notifier = self.notifier.name(), "Alert delivered");
            }
            Err(e) => {
                tracing::warn!(
                    kind,
                    notifier = self.notifier.name(),
                    error = %e,
                    "Alert delivery failed"
                );
            }
        }
    }
}

/// In-memory notifier for development and testing
#[derive(Default)]
pub struct MemoryNotifier {
    events: RwLock<Vec<AlertEvent>>,
    fail: bool,
}

impl MemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// A notifier that records nothing and rejects every event
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    /// Delivered events in order
    pub async fn events(&self) -> Vec<AlertEvent> {
        self.events.read().await.clone()
    }

    /// Delivered untagged-table alerts
    pub async fn untagged_tables(&self) -> Vec<TableRef> {
        self.events
            .read()
            .await
            .iter()
            .filter_map(|e| match e {
                AlertEvent::UntaggedTable { table, .. } => Some(table.clone()),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl Notifier for MemoryNotifier {
    async fn notify(&self, event: &AlertEvent) -> Result<()> {
        if self.fail {
            return Err(GovernanceError::Notification(format!(
                "{} rejected",
                event.kind()
            )));
        }
        self.events.write().await.push(event.clone());
        Ok(())
    }

    fn name(&self) -> &str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct SlowNotifier;

    #[async_trait]
    impl Notifier for SlowNotifier {
        async fn notify(&self, _event: &AlertEvent) -> Result<()> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        }

        fn name(&self) -> &str {
            "slow"
        }
    }

    #[test]
    fn test_event_serialization() {
        let event = AlertEvent::UntaggedTable {
            run_id: "run-1".to_string(),
            table: TableRef::new("PUBLIC", "T3"),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["kind"], "untagged_table");
        assert_eq!(json["runId"], "run-1");
        assert_eq!(json["table"]["name"], "T3");

        let parsed: AlertEvent = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, event);
    }

    #[tokio::test]
    async fn test_emitter_delivers() {
        let notifier = Arc::new(MemoryNotifier::new());
        let emitter = AlertEmitter::new(notifier.clone(), Duration::from_secs(1));

        emitter.on_untagged_table("run-1", &TableRef::new("PUBLIC", "T3")).await;
        emitter.on_run_summary(&RunSummary::new()).await;

        let events = notifier.events().await;
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].kind(), "run_summary");
        assert_eq!(
            notifier.untagged_tables().await,
            vec![TableRef::new("PUBLIC", "T3")]
        );
    }

    #[tokio::test]
    async fn test_emitter_swallows_failures() {
        let emitter = AlertEmitter::new(Arc::new(MemoryNotifier::failing()), Duration::from_secs(1));
        emitter.on_untagged_table("run-1", &TableRef::new("PUBLIC", "T3")).await;
    }

    #[tokio::test]
    async fn test_emitter_times_out() {
        let emitter = AlertEmitter::new(Arc::new(SlowNotifier), Duration::from_millis(20));
        let started = std::time::Instant::now();
        emitter.on_run_summary(&RunSummary::new()).await;
        assert!(started.elapsed() < Duration::from_secs(2));
    }
}
