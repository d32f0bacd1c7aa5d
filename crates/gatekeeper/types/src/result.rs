//! Validator results.
//!
//! A `ValidatorResult` can only be built through its status constructors, so
//! `passed` always agrees with `status`: a FAILED result is never passing.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::ValidatorStatus;

/// Outcome of one validator run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "ValidatorResultRepr")]
pub struct ValidatorResult {
    passed: bool,
    status: ValidatorStatus,
    /// One-line summary
    pub message: String,
    /// Human-readable supporting evidence
    #[serde(skip_serializing_if = "Option::is_none")]
    pub evidence: Option<String>,
    /// Structured details for persistence and UIs
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
    /// Numeric measurements (token counts, durations, counts)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metrics: Option<BTreeMap<String, f64>>,
}

impl ValidatorResult {
    fn with_status(status: ValidatorStatus, message: impl Into<String>) -> Self {
        Self {
            passed: status.is_passing(),
            status,
            message: message.into(),
            evidence: None,
            details: None,
            metrics: None,
        }
    }

    pub fn passed(message: impl Into<String>) -> Self {
        Self::with_status(ValidatorStatus::Passed, message)
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self::with_status(ValidatorStatus::Failed, message)
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::with_status(ValidatorStatus::Warning, message)
    }

    pub fn skipped(message: impl Into<String>) -> Self {
        Self::with_status(ValidatorStatus::Skipped, message)
    }

    pub fn with_evidence(mut self, evidence: impl Into<String>) -> Self {
        self.evidence = Some(evidence.into());
        self
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn with_metric(mut self, name: impl Into<String>, value: f64) -> Self {
        self.metrics
            .get_or_insert_with(BTreeMap::new)
            .insert(name.into(), value);
        self
    }

    /// Append a line to the evidence, creating it if absent.
    pub fn push_evidence(&mut self, line: impl AsRef<str>) {
        match &mut self.evidence {
            Some(existing) => {
                existing.push('\n');
                existing.push_str(line.as_ref());
            }
            None => self.evidence = Some(line.as_ref().to_string()),
        }
    }

    /// Downgrade this result to FAILED, keeping message and evidence.
    pub fn into_failed(mut self) -> Self {
        self.status = ValidatorStatus::Failed;
        self.passed = false;
        self
    }

    pub fn status(&self) -> ValidatorStatus {
        self.status
    }

    pub fn is_passed(&self) -> bool {
        self.passed
    }

    pub fn is_failed(&self) -> bool {
        self.status == ValidatorStatus::Failed
    }

    pub fn details_field(&self, key: &str) -> Option<&serde_json::Value> {
        self.details.as_ref().and_then(|d| d.get(key))
    }
}

/// Wire form; `passed` is recomputed from `status` on the way in.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ValidatorResultRepr {
    #[serde(default)]
    #[allow(dead_code)]
    passed: bool,
    status: ValidatorStatus,
    message: String,
    #[serde(default)]
    evidence: Option<String>,
    #[serde(default)]
    details: Option<serde_json::Value>,
    #[serde(default)]
    metrics: Option<BTreeMap<String, f64>>,
}

impl From<ValidatorResultRepr> for ValidatorResult {
    fn from(repr: ValidatorResultRepr) -> Self {
        let mut result = ValidatorResult::with_status(repr.status, repr.message);
        result.evidence = repr.evidence;
        result.details = repr.details;
        result.metrics = repr.metrics;
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constructors_keep_passed_consistent() {
        assert!(ValidatorResult::passed("ok").is_passed());
        assert!(ValidatorResult::skipped("n/a").is_passed());
        assert!(!ValidatorResult::warning("hmm").is_passed());
        assert!(!ValidatorResult::failed("no").is_passed());
        assert!(!ValidatorResult::passed("ok").into_failed().is_passed());
    }

    #[test]
    fn deserialization_recomputes_passed() {
        let json = r#"{"passed": true, "status": "FAILED", "message": "lies"}"#;
        let result: ValidatorResult = serde_json::from_str(json).unwrap();
        assert!(result.is_failed());
        assert!(!result.is_passed());
    }

    #[test]
    fn evidence_lines_accumulate() {
        let mut result = ValidatorResult::passed("ok").with_metric("files", 2.0);
        result.push_evidence("first");
        result.push_evidence("second");
        assert_eq!(result.evidence.as_deref(), Some("first\nsecond"));
        assert_eq!(result.metrics.unwrap()["files"], 2.0);
    }
}
