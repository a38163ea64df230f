//! NATS notifier integration tests
//!
//! These tests require a running NATS server:
//!   nats-server
//!
//! Tests are skipped automatically if NATS is not available.

use a3s_governance::{
    AlertEvent, Column, GovernanceConfig, MemoryAuditSink, MemoryCatalog, NatsNotifier,
    NatsNotifierConfig, Notifier, Orchestrator, RunScope, RunSummary, StaticClassifier, TableRef,
};
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;

/// Try to connect to NATS. Returns None if server is unavailable.
async fn try_nats_notifier(prefix_suffix: &str) -> Option<NatsNotifier> {
    let config = NatsNotifierConfig {
        url: "nats://127.0.0.1:4222".to_string(),
        subject_prefix: format!("test.governance.{}", prefix_suffix),
        connect_timeout_secs: 2,
        ..Default::default()
    };

    match NatsNotifier::connect(config).await {
        Ok(notifier) => Some(notifier),
        Err(_) => {
            eprintln!("NATS not available, skipping integration test");
            None
        }
    }
}

/// Helper to connect a notifier, or skip the test
macro_rules! nats_notifier {
    ($suffix:expr) => {
        match try_nats_notifier($suffix).await {
            Some(n) => n,
            None => return,
        }
    };
}

async fn next_event(sub: &mut async_nats::Subscriber) -> AlertEvent {
    let message = tokio::time::timeout(Duration::from_secs(2), sub.next())
        .await
        .expect("no message within 2s")
        .expect("subscription closed");
    serde_json::from_slice(&message.payload).unwrap()
}

#[tokio::test]
async fn test_nats_publishes_untagged_alert() {
    let notifier = nats_notifier!("untagged");
    let mut sub = notifier
        .client()
        .subscribe("test.governance.untagged.>")
        .await
        .unwrap();

    let event = AlertEvent::UntaggedTable {
        run_id: "run-test".to_string(),
        table: TableRef::new("PUBLIC", "PRODUCTS"),
    };
    notifier.notify(&event).await.unwrap();

    assert_eq!(next_event(&mut sub).await, event);
}

#[tokio::test]
async fn test_nats_subject_per_kind() {
    let notifier = nats_notifier!("kinds");
    let mut summaries = notifier
        .client()
        .subscribe("test.governance.kinds.run_summary")
        .await
        .unwrap();

    let summary = RunSummary::new();
    notifier
        .notify(&AlertEvent::RunSummary {
            summary: summary.clone(),
        })
        .await
        .unwrap();

    match next_event(&mut summaries).await {
        AlertEvent::RunSummary { summary: received } => assert_eq!(received.run_id, summary.run_id),
        other => panic!("unexpected event: {:?}", other),
    }
}

#[tokio::test]
async fn test_nats_receives_pass_alerts() {
    let notifier = Arc::new(nats_notifier!("pass"));
    let mut sub = notifier
        .client()
        .subscribe("test.governance.pass.>")
        .await
        .unwrap();

    let products = TableRef::new("PUBLIC", "PRODUCTS");
    let catalog = MemoryCatalog::new()
        .with_table(products.clone(), vec![Column::new("sku", "VARCHAR")])
        .with_values(&products, "sku", ["A-100"]);
    let orchestrator = Orchestrator::new(
        Arc::new(catalog),
        Arc::new(StaticClassifier::new().with("sku", "INTERNAL")),
        Arc::new(MemoryAuditSink::new()),
        notifier.clone(),
        GovernanceConfig::default(),
    )
    .unwrap();

    orchestrator.run_pass(RunScope::All).await.unwrap();

    let first = next_event(&mut sub).await;
    let second = next_event(&mut sub).await;
    assert_eq!(first.kind(), "untagged_table");
    assert_eq!(second.kind(), "run_summary");
}

#[tokio::test]
async fn test_nats_unreachable_server() {
    let config = NatsNotifierConfig {
        url: "nats://127.0.0.1:1".to_string(),
        connect_timeout_secs: 1,
        ..Default::default()
    };
    assert!(NatsNotifier::connect(config).await.is_err());
}
