//! Sensitivity classifier trait and adapter
//!
//! `SensitivityClassifier` is the capability boundary to whatever produces a
//! label (an LLM endpoint, a rules engine). `ClassifierAdapter` wraps it with
//! the fixed vocabulary, retry/backoff, timeouts, the empty-sample policy and
//! the ambiguity escalation policy. The adapter never invents a label.

use crate::config::{ClassifierConfig, EmptySamplePolicy};
use crate::error::{with_timeout, GovernanceError, Result};
use crate::types::{ClassificationResult, Column, SensitivityLabel, TableRef};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

pub mod pattern;

/// Samples included in a rendered prompt
pub const PROMPT_SAMPLE_LIMIT: usize = 5;

/// Input handed to the classification capability
#[derive(Debug, Clone)]
pub struct ClassificationRequest {
    pub table: TableRef,
    pub column: Column,
    pub samples: Vec<String>,
    /// Allowed answers, highest protection first
    pub vocabulary: Vec<SensitivityLabel>,
}

impl ClassificationRequest {
    pub fn new(table: TableRef, column: Column, samples: Vec<String>) -> Self {
        Self {
            table,
            column,
            samples,
            vocabulary: SensitivityLabel::ALL.to_vec(),
        }
    }

    /// Render a single-answer prompt for text-completion classifiers
    pub fn prompt(&self) -> String {
        let values: Vec<&str> = self
            .samples
            .iter()
            .take(PROMPT_SAMPLE_LIMIT)
            .map(String::as_str)
            .collect();
        let values = serde_json::to_string(&values).unwrap_or_else(|_| "[]".to_string());
        let labels: Vec<&str> = self.vocabulary.iter().map(|l| l.as_str()).collect();

        format!(
            "Classify this column's sensitivity.\nColumn: {}\nValues: {}\nLabels: {}\nReturn only the label.",
            self.column.name,
            values,
            labels.join(", ")
        )
    }
}

/// Raw answer from the classification capability
///
/// Labels are unvalidated text; the adapter checks them against the vocabulary.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClassifierResponse {
    pub label: String,
    /// Confidence in `label`, if the capability reports one (0..=1)
    pub confidence: Option<f32>,
    /// Other plausible labels for an ambiguous column
    pub alternatives: Vec<String>,
}

impl ClassifierResponse {
    /// A bare text answer without confidence
    pub fn text(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            ..Default::default()
        }
    }

    pub fn with_confidence(mut self, confidence: f32) -> Self {
        self.confidence = Some(confidence);
        self
    }

    pub fn with_alternative(mut self, label: impl Into<String>) -> Self {
        self.alternatives.push(label.into());
        self
    }

    /// Validate against the vocabulary and apply the escalation threshold
    ///
    /// Returns the offending raw value on the first out-of-vocabulary label.
    pub fn resolve(
        &self,
        escalation_threshold: Option<f32>,
    ) -> std::result::Result<SensitivityLabel, String> {
        let primary = SensitivityLabel::parse(&self.label).ok_or_else(|| self.label.clone())?;
        let alternatives = self
            .alternatives
            .iter()
            .map(|raw| SensitivityLabel::parse(raw).ok_or_else(|| raw.clone()))
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let escalate = match (escalation_threshold, self.confidence) {
            (Some(threshold), Some(confidence)) => confidence < threshold,
            _ => false,
        };

        if escalate {
            Ok(alternatives.into_iter().fold(primary, std::cmp::max))
        } else {
            Ok(primary)
        }
    }
}

/// Core trait for classification backends
#[async_trait]
pub trait SensitivityClassifier: Send + Sync {
    /// Classify one column from its samples
    async fn classify(&self, request: &ClassificationRequest) -> Result<ClassifierResponse>;

    /// Classifier name (e.g., "pattern", "cortex")
    fn name(&self) -> &str;
}

/// Policy wrapper around a `SensitivityClassifier`
///
/// Holds a semaphore shared by every call made through this adapter, so the
/// backend never sees more than `concurrency` requests at once.
pub struct ClassifierAdapter {
    classifier: Arc<dyn SensitivityClassifier>,
    config: ClassifierConfig,
    timeout: Duration,
    permits: Arc<Semaphore>,
}

impl ClassifierAdapter {
    pub fn new(
        classifier: Arc<dyn SensitivityClassifier>,
        config: ClassifierConfig,
        timeout: Duration,
        concurrency: usize,
    ) -> Self {
        Self {
            classifier,
            config,
            timeout,
            permits: Arc::new(Semaphore::new(concurrency.max(1))),
        }
    }

    pub fn classifier_name(&self) -> &str {
        self.classifier.name()
    }

    /// Classify a column, retrying transient failures
    ///
    /// Fails with `InsufficientSample`, `ClassificationUnavailable` or
    /// `ClassificationInvalid`; never returns a guessed label.
    pub async fn classify(
        &self,
        table: &TableRef,
        column: &Column,
        samples: Vec<String>,
    ) -> Result<ClassificationResult> {
        let sample_size = samples.len();

        if samples.is_empty() {
            return match self.config.empty_sample_policy {
                EmptySamplePolicy::DefaultPublic => {
                    tracing::debug!(
                        table = %table,
                        column = %column.name,
                        "No samples, applying default PUBLIC label"
                    );
                    Ok(self.result(table, column, SensitivityLabel::Public, 0))
                }
                EmptySamplePolicy::Fail => Err(GovernanceError::InsufficientSample {
                    table: table.to_string(),
                    column: column.name.clone(),
                    reason: "no non-null sample values".to_string(),
                }),
            };
        }

        let request = ClassificationRequest::new(table.clone(), column.clone(), samples);
        let max_attempts = self.config.max_attempts.max(1);
        let mut last_error = String::new();

        for attempt in 1..=max_attempts {
            match self.call_once(&request).await {
                Ok(response) => {
                    let label = response
                        .resolve(self.config.escalation_threshold)
                        .map_err(|value| GovernanceError::ClassificationInvalid {
                            table: table.to_string(),
                            column: column.name.clone(),
                            value,
                        })?;

                    tracing::debug!(
                        table = %table,
                        column = %column.name,
                        label = %label,
                        raw = %response.label,
                        confidence = ?response.confidence,
                        attempt,
                        "Column classified"
                    );
                    return Ok(self.result(table, column, label, sample_size));
                }
                Err(e) => {
                    last_error = e.to_string();
                    if attempt < max_attempts {
                        let delay = self.config.backoff_for(attempt);
                        tracing::warn!(
                            table = %table,
                            column = %column.name,
                            attempt,
                            max_attempts,
                            delay_ms = delay.as_millis() as u64,
                            error = %e,
                            "Classification attempt failed, retrying"
                        );
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }

        Err(GovernanceError::ClassificationUnavailable {
            table: table.to_string(),
            column: column.name.clone(),
            attempts: max_attempts,
            reason: last_error,
        })
    }

    async fn call_once(&self, request: &ClassificationRequest) -> Result<ClassifierResponse> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|e| GovernanceError::Backend(format!("Classifier permits closed: {}", e)))?;

        with_timeout(
            self.timeout,
            format!("classify {}.{}", request.table, request.column.name),
            self.classifier.classify(request),
        )
        .await
    }

    fn result(
        &self,
        table: &TableRef,
        column: &Column,
        label: SensitivityLabel,
        sample_size: usize,
    ) -> ClassificationResult {
        ClassificationResult {
            table: table.clone(),
            column: column.name.clone(),
            label,
            sample_size,
            timestamp: Utc::now(),
        }
    }
}

/// Classifier returning scripted responses per column name, for tests
///
/// Columns without a script fail with a backend error.
#[derive(Default)]
pub struct StaticClassifier {
    responses: std::sync::RwLock<std::collections::HashMap<String, ClassifierResponse>>,
    calls: std::sync::atomic::AtomicU64,
}

impl StaticClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer `label` for every column named `column`
    pub fn with(self, column: &str, label: &str) -> Self {
        self.with_response(column, ClassifierResponse::text(label))
    }

    pub fn with_response(self, column: &str, response: ClassifierResponse) -> Self {
        if let Ok(mut responses) = self.responses.write() {
            responses.insert(column.to_string(), response);
        }
        self
    }

    /// Total calls received
    pub fn calls(&self) -> u64 {
        self.calls.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[async_trait]
impl SensitivityClassifier for StaticClassifier {
    async fn classify(&self, request: &ClassificationRequest) -> Result<ClassifierResponse> {
        self.calls
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        let responses = self
            .responses
            .read()
            .map_err(|e| GovernanceError::Backend(format!("Classifier lock poisoned: {}", e)))?;
        responses
            .get(&request.column.name)
            .cloned()
            .ok_or_else(|| {
                GovernanceError::Backend(format!("No scripted answer for {}", request.column.name))
            })
    }

    fn name(&self) -> &str {
        "static"
    }
}
