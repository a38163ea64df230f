//! Performance benchmarks for a3s-governance
//!
//! Run with: cargo bench

use a3s_governance::{
    reconcile, ClassifierResponse, Column, GovernanceConfig, MemoryAuditSink, MemoryCatalog,
    MemoryNotifier, Orchestrator, PatternClassifier, PolicyConfig, PolicyEnforcer, RunScope,
    SensitivityLabel, TableRef, TagState,
};
use criterion::{criterion_group, criterion_main, Criterion};
use std::collections::BTreeMap;
use std::sync::Arc;

fn bench_reconcile(c: &mut Criterion) {
    let states = [
        TagState::Absent,
        TagState::Labeled(SensitivityLabel::Internal),
        TagState::Unrecognized("legacy".to_string()),
    ];

    c.bench_function("reconcile", |b| {
        b.iter(|| {
            for state in &states {
                for label in SensitivityLabel::ALL {
                    criterion::black_box(reconcile("email", state, label));
                }
            }
        });
    });
}

fn bench_policy_decide(c: &mut Criterion) {
    let enforcer = PolicyEnforcer::new(PolicyConfig {
        default_key_columns: vec!["id".to_string()],
        ..Default::default()
    });
    let table = TableRef::new("PUBLIC", "CUSTOMERS");

    let mut group = c.benchmark_group("decide");
    for width in [4, 64, 512] {
        let labels: BTreeMap<String, SensitivityLabel> = (0..width)
            .map(|i| {
                let label = if i == width - 1 {
                    SensitivityLabel::Pii
                } else {
                    SensitivityLabel::Internal
                };
                (format!("col_{}", i), label)
            })
            .collect();
        group.bench_function(format!("{} columns", width), |b| {
            b.iter(|| enforcer.decide(&table, &labels, None).unwrap());
        });
    }
    group.finish();
}

fn bench_response_resolve(c: &mut Criterion) {
    let response = ClassifierResponse::text(" internal.")
        .with_confidence(0.4)
        .with_alternative("PUBLIC")
        .with_alternative("PII");

    c.bench_function("ClassifierResponse::resolve", |b| {
        b.iter(|| response.resolve(Some(0.6)).unwrap());
    });
}

fn bench_pattern_evaluate(c: &mut Criterion) {
    let classifier = PatternClassifier::with_defaults().unwrap();
    let emails: Vec<String> = (0..100).map(|i| format!("user{}@example.com", i)).collect();
    let words: Vec<String> = (0..100).map(|i| format!("tier-{}", i % 4)).collect();

    c.bench_function("PatternClassifier emails x100", |b| {
        b.iter(|| classifier.evaluate("contact", &emails));
    });

    c.bench_function("PatternClassifier categories x100", |b| {
        b.iter(|| classifier.evaluate("tier", &words));
    });
}

fn bench_memory_pass(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();

    let mut group = c.benchmark_group("run_pass");
    for tables in [1, 16] {
        group.bench_function(format!("{} tables", tables), |b| {
            b.to_async(&rt).iter(|| async move {
                let mut catalog = MemoryCatalog::new();
                for i in 0..tables {
                    let table = TableRef::new("PUBLIC", format!("T{}", i));
                    catalog = catalog
                        .with_table(
                            table.clone(),
                            vec![Column::new("id", "NUMBER"), Column::new("email", "VARCHAR")],
                        )
                        .with_values(&table, "id", ["1", "2", "3"])
                        .with_values(&table, "email", ["a@x.io", "b@x.io", "c@x.io"]);
                }
                let mut config = GovernanceConfig::default();
                config.policy.default_key_columns = vec!["id".to_string()];

                let orchestrator = Orchestrator::new(
                    Arc::new(catalog),
                    Arc::new(PatternClassifier::with_defaults().unwrap()),
                    Arc::new(MemoryAuditSink::new()),
                    Arc::new(MemoryNotifier::new()),
                    config,
                )
                .unwrap();
                orchestrator.run_pass(RunScope::All).await.unwrap()
            });
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_reconcile,
    bench_policy_decide,
    bench_response_resolve,
    bench_pattern_evaluate,
    bench_memory_pass,
);
criterion_main!(benches);
