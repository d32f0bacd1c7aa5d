//! Status vocabularies for validators, gates and whole pipeline runs.

use serde::{Deserialize, Serialize};

/// Outcome of a single validator.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValidatorStatus {
    Passed,
    Failed,
    Warning,
    Skipped,
}

impl ValidatorStatus {
    /// `passed` is true exactly for PASSED and SKIPPED.
    pub fn is_passing(&self) -> bool {
        matches!(self, ValidatorStatus::Passed | ValidatorStatus::Skipped)
    }
}

impl std::fmt::Display for ValidatorStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Passed => write!(f, "PASSED"),
            Self::Failed => write!(f, "FAILED"),
            Self::Warning => write!(f, "WARNING"),
            Self::Skipped => write!(f, "SKIPPED"),
        }
    }
}

/// Lifecycle of a gate: `PENDING -> RUNNING -> {PASSED, FAILED, WARNING}`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GateStatus {
    Pending,
    Running,
    Passed,
    Failed,
    Warning,
}

impl GateStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            GateStatus::Passed | GateStatus::Failed | GateStatus::Warning
        )
    }
}

impl std::fmt::Display for GateStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "PENDING"),
            Self::Running => write!(f, "RUNNING"),
            Self::Passed => write!(f, "PASSED"),
            Self::Failed => write!(f, "FAILED"),
            Self::Warning => write!(f, "WARNING"),
        }
    }
}

/// Lifecycle of a pipeline run: `PENDING -> RUNNING -> {PASSED, FAILED}`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PipelineStatus {
    Pending,
    Running,
    Passed,
    Failed,
}

impl std::fmt::Display for PipelineStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "PENDING"),
            Self::Running => write!(f, "RUNNING"),
            Self::Passed => write!(f, "PASSED"),
            Self::Failed => write!(f, "FAILED"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_passed_and_skipped_are_passing() {
        assert!(ValidatorStatus::Passed.is_passing());
        assert!(ValidatorStatus::Skipped.is_passing());
        assert!(!ValidatorStatus::Failed.is_passing());
        assert!(!ValidatorStatus::Warning.is_passing());
    }

    #[test]
    fn statuses_serialize_screaming() {
        let json = serde_json::to_string(&ValidatorStatus::Warning).unwrap();
        assert_eq!(json, "\"WARNING\"");
        let gate: GateStatus = serde_json::from_str("\"RUNNING\"").unwrap();
        assert_eq!(gate, GateStatus::Running);
        assert!(!gate.is_terminal());
    }
}
