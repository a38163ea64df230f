//! Regex-based classifier
//!
//! Deterministic `SensitivityClassifier` for offline use: sample values are
//! matched against value patterns, then the column name against name hints.

use super::{ClassificationRequest, ClassifierResponse, SensitivityClassifier};
use crate::error::{GovernanceError, Result};
use crate::types::SensitivityLabel;
use async_trait::async_trait;
use regex::Regex;

/// A named value or column-name pattern
#[derive(Debug, Clone)]
pub struct PatternRule {
    pub name: String,
    pub pattern: String,
    pub label: SensitivityLabel,
}

impl PatternRule {
    pub fn new(name: &str, pattern: &str, label: SensitivityLabel) -> Self {
        Self {
            name: name.to_string(),
            pattern: pattern.to_string(),
            label,
        }
    }
}

/// Value patterns checked against every sample
pub fn default_value_rules() -> Vec<PatternRule> {
    vec![
        PatternRule::new(
            "email",
            r"^[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}$",
            SensitivityLabel::Pii,
        ),
        PatternRule::new("ssn", r"^\d{3}-\d{2}-\d{4}$", SensitivityLabel::Pii),
        PatternRule::new(
            "phone",
            r"^\+?\(?\d{1,4}\)?[\s.-]?\d{3}[\s.-]?\d{3,4}([\s.-]?\d{1,4})?$",
            SensitivityLabel::Pii,
        ),
        PatternRule::new(
            "credit_card",
            r"^(?:\d{4}[\s-]?){3}\d{4}$",
            SensitivityLabel::Pii,
        ),
        PatternRule::new(
            "ipv4",
            r"^(?:\d{1,3}\.){3}\d{1,3}$",
            SensitivityLabel::Confidential,
        ),
    ]
}

/// Column-name hints used when no value pattern dominates
pub fn default_name_rules() -> Vec<PatternRule> {
    vec![
        PatternRule::new(
            "personal_name",
            r"(?i)(email|phone|ssn|birth|dob|passport|address|first_?name|last_?name)",
            SensitivityLabel::Pii,
        ),
        PatternRule::new(
            "financial",
            r"(?i)(salary|revenue|income|balance|password|secret|token)",
            SensitivityLabel::Confidential,
        ),
    ]
}

/// Regex classifier with a match-ratio threshold
pub struct PatternClassifier {
    value_rules: Vec<(String, Regex, SensitivityLabel)>,
    name_rules: Vec<(String, Regex, SensitivityLabel)>,
    /// Fraction of samples a value rule must match to count
    min_match_ratio: f32,
    default_label: SensitivityLabel,
}

fn compile(rules: &[PatternRule]) -> Result<Vec<(String, Regex, SensitivityLabel)>> {
    rules
        .iter()
        .map(|rule| {
            let regex = Regex::new(&rule.pattern).map_err(|e| {
                GovernanceError::Config(format!("Invalid pattern '{}': {}", rule.name, e))
            })?;
            Ok((rule.name.clone(), regex, rule.label))
        })
        .collect()
}

impl PatternClassifier {
    pub fn new(
        value_rules: &[PatternRule],
        name_rules: &[PatternRule],
        min_match_ratio: f32,
        default_label: SensitivityLabel,
    ) -> Result<Self> {
        Ok(Self {
            value_rules: compile(value_rules)?,
            name_rules: compile(name_rules)?,
            min_match_ratio: min_match_ratio.clamp(0.0, 1.0),
            default_label,
        })
    }

    /// Built-in rules, half the samples must match, `INTERNAL` otherwise
    pub fn with_defaults() -> Result<Self> {
        Self::new(
            &default_value_rules(),
            &default_name_rules(),
            0.5,
            SensitivityLabel::Internal,
        )
    }

    /// Pure classification used by the trait implementation
    pub fn evaluate(&self, column_name: &str, samples: &[String]) -> ClassifierResponse {
        let total = samples.len().max(1) as f32;
        let mut hits: Vec<(SensitivityLabel, f32)> = self
            .value_rules
            .iter()
            .filter_map(|(_, regex, label)| {
                let matched = samples.iter().filter(|s| regex.is_match(s.trim())).count();
                let ratio = matched as f32 / total;
                (matched > 0 && ratio >= self.min_match_ratio).then_some((*label, ratio))
            })
            .collect();

        if hits.is_empty() {
            let by_name = self
                .name_rules
                .iter()
                .filter(|(_, regex, _)| regex.is_match(column_name))
                .map(|(_, _, label)| *label)
                .max();
            return match by_name {
                Some(label) => ClassifierResponse::text(label.as_str()).with_confidence(0.5),
                None => ClassifierResponse::text(self.default_label.as_str()),
            };
        }

        hits.sort_by(|a, b| b.0.cmp(&a.0).then(b.1.total_cmp(&a.1)));
        let (label, ratio) = hits[0];
        let mut response = ClassifierResponse::text(label.as_str()).with_confidence(ratio);
        for (other, _) in hits.iter().skip(1) {
            if *other != label {
                response = response.with_alternative(other.as_str());
            }
        }
        response
    }
}

#[async_trait]
impl SensitivityClassifier for PatternClassifier {
    async fn classify(&self, request: &ClassificationRequest) -> Result<ClassifierResponse> {
        Ok(self.evaluate(&request.column.name, &request.samples))
    }

    fn name(&self) -> &str {
        "pattern"
    }
}
