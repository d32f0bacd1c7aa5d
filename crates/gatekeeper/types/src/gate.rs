//! Gate identities and per-gate aggregated results.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{GateStatus, ValidatorResult, ValidatorStatus};

/// The four gates, in execution order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GateId {
    Sanitization,
    Contract,
    Execution,
    Integrity,
}

impl GateId {
    pub const ALL: [GateId; 4] = [
        GateId::Sanitization,
        GateId::Contract,
        GateId::Execution,
        GateId::Integrity,
    ];

    pub fn number(&self) -> u8 {
        match self {
            GateId::Sanitization => 0,
            GateId::Contract => 1,
            GateId::Execution => 2,
            GateId::Integrity => 3,
        }
    }

    pub fn from_number(number: u8) -> Option<Self> {
        Self::ALL.get(number as usize).copied()
    }

    pub fn name(&self) -> &'static str {
        match self {
            GateId::Sanitization => "SANITIZATION",
            GateId::Contract => "CONTRACT",
            GateId::Execution => "EXECUTION",
            GateId::Integrity => "INTEGRITY",
        }
    }
}

impl std::fmt::Display for GateId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.number(), self.name())
    }
}

/// Aggregated result of one gate.
///
/// Created when the gate starts; `completed_at` and `duration_ms` are only
/// set by [`GateResult::complete`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GateResult {
    pub gate_number: u8,
    pub gate_name: String,
    pub status: GateStatus,
    pub passed: bool,
    pub passed_count: u32,
    pub failed_count: u32,
    pub warning_count: u32,
    pub skipped_count: u32,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<i64>,
    /// Set when a hard-block validator failed inside this gate
    #[serde(default)]
    pub hard_blocked: bool,
}

impl GateResult {
    /// A gate that has not started yet.
    pub fn pending(gate: GateId) -> Self {
        Self {
            gate_number: gate.number(),
            gate_name: gate.name().to_string(),
            status: GateStatus::Pending,
            passed: false,
            passed_count: 0,
            failed_count: 0,
            warning_count: 0,
            skipped_count: 0,
            started_at: Utc::now(),
            completed_at: None,
            duration_ms: None,
            hard_blocked: false,
        }
    }

    /// Transition `PENDING -> RUNNING` and stamp the start time.
    pub fn start(gate: GateId) -> Self {
        let mut result = Self::pending(gate);
        result.status = GateStatus::Running;
        result.started_at = Utc::now();
        result
    }

    /// Account for one validator outcome.
    pub fn record(&mut self, result: &ValidatorResult, is_hard_block: bool) {
        match result.status() {
            ValidatorStatus::Passed => self.passed_count += 1,
            ValidatorStatus::Failed => {
                self.failed_count += 1;
                if is_hard_block {
                    self.hard_blocked = true;
                }
            }
            ValidatorStatus::Warning => self.warning_count += 1,
            ValidatorStatus::Skipped => self.skipped_count += 1,
        }
    }

    /// Settle the terminal status and timing.
    ///
    /// FAILED if a hard-block validator failed, WARNING if any soft failure or
    /// warning was recorded, PASSED otherwise.
    pub fn complete(&mut self) {
        let completed_at = Utc::now();
        self.status = if self.hard_blocked {
            GateStatus::Failed
        } else if self.failed_count > 0 || self.warning_count > 0 {
            GateStatus::Warning
        } else {
            GateStatus::Passed
        };
        self.passed = self.status != GateStatus::Failed;
        self.duration_ms = Some((completed_at - self.started_at).num_milliseconds().max(0));
        self.completed_at = Some(completed_at);
    }

    pub fn gate(&self) -> Option<GateId> {
        GateId::from_number(self.gate_number)
    }

    pub fn total(&self) -> u32 {
        self.passed_count + self.failed_count + self.warning_count + self.skipped_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gate_numbers_round_trip() {
        for gate in GateId::ALL {
            assert_eq!(GateId::from_number(gate.number()), Some(gate));
        }
        assert_eq!(GateId::from_number(4), None);
        assert_eq!(GateId::Execution.name(), "EXECUTION");
    }

    #[test]
    fn running_gate_has_no_completion() {
        let gate = GateResult::start(GateId::Contract);
        assert_eq!(gate.status, GateStatus::Running);
        assert!(gate.completed_at.is_none());
        assert!(gate.duration_ms.is_none());
    }

    #[test]
    fn hard_block_failure_fails_gate() {
        let mut gate = GateResult::start(GateId::Sanitization);
        gate.record(&ValidatorResult::passed("ok"), false);
        gate.record(&ValidatorResult::failed("nope"), true);
        gate.complete();
        assert_eq!(gate.status, GateStatus::Failed);
        assert!(!gate.passed);
        assert!(gate.completed_at.is_some());
        assert!(gate.duration_ms.unwrap() >= 0);
    }

    #[test]
    fn soft_failure_and_warning_downgrade_to_warning() {
        let mut gate = GateResult::start(GateId::Execution);
        gate.record(&ValidatorResult::failed("lint"), false);
        gate.record(&ValidatorResult::skipped("n/a"), false);
        gate.complete();
        assert_eq!(gate.status, GateStatus::Warning);
        assert!(gate.passed);
        assert_eq!(gate.failed_count, 1);
        assert_eq!(gate.skipped_count, 1);

        let mut gate = GateResult::start(GateId::Execution);
        gate.record(&ValidatorResult::warning("hm"), false);
        gate.complete();
        assert_eq!(gate.status, GateStatus::Warning);
    }

    #[test]
    fn clean_gate_passes() {
        let mut gate = GateResult::start(GateId::Integrity);
        gate.record(&ValidatorResult::passed("ok"), true);
        gate.record(&ValidatorResult::skipped("n/a"), true);
        gate.complete();
        assert_eq!(gate.status, GateStatus::Passed);
        assert_eq!(gate.total(), 2);
    }
}
