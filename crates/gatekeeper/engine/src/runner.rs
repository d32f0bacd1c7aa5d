use std::sync::Arc;

use chrono::{DateTime, Utc};
use gatekeeper_types::{GateId, GateResult, PipelineStatus, ValidatorResult, ValidatorStatus};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, instrument, warn};

use crate::config::GateConfig;
use crate::context::ValidationContext;
use crate::traits::execute_guarded;

/// One validator execution, in run order.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidatorRecord {
    pub gate_number: u8,
    pub code: String,
    pub order: u32,
    pub is_hard_block: bool,
    pub result: ValidatorResult,
    pub started_at: DateTime<Utc>,
    pub duration_ms: i64,
}

/// The hard-block failure that stopped a run.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HardBlockAbort {
    pub gate_number: u8,
    pub code: String,
    pub message: String,
}

/// Everything a run produced. Gates that never started are absent.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineReport {
    pub run_id: String,
    pub status: PipelineStatus,
    pub gates: Vec<GateResult>,
    pub validators: Vec<ValidatorRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aborted_by: Option<HardBlockAbort>,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

impl PipelineReport {
    pub fn passed(&self) -> bool {
        self.status == PipelineStatus::Passed
    }

    pub fn gate(&self, gate: GateId) -> Option<&GateResult> {
        self.gates.iter().find(|g| g.gate_number == gate.number())
    }

    pub fn validator(&self, code: &str) -> Option<&ValidatorRecord> {
        self.validators.iter().find(|r| r.code == code)
    }

    pub fn duration_ms(&self) -> i64 {
        (self.completed_at - self.started_at).num_milliseconds().max(0)
    }
}

/// Outcome of a single gate.
#[derive(Clone, Debug)]
pub struct GateOutcome {
    pub result: GateResult,
    pub records: Vec<ValidatorRecord>,
    pub aborted_by: Option<HardBlockAbort>,
}

/// Progress notifications for streaming collaborators.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum PipelineEvent {
    #[serde(rename_all = "camelCase")]
    GateStarted { run_id: String, gate_number: u8 },
    #[serde(rename_all = "camelCase")]
    ValidatorCompleted { run_id: String, record: ValidatorRecord },
    #[serde(rename_all = "camelCase")]
    GateCompleted { run_id: String, result: GateResult },
    #[serde(rename_all = "camelCase")]
    PipelineAborted { run_id: String, abort: HardBlockAbort },
}

/// Runs the four gates in order against one context.
///
/// Validators run strictly one after another; a FAILED hard-block validator
/// stops the whole pipeline, everything else is recorded and the run goes on.
#[derive(Clone)]
pub struct GateRunner {
    config: Arc<GateConfig>,
    events: Option<UnboundedSender<PipelineEvent>>,
}

impl GateRunner {
    pub fn new(config: impl Into<Arc<GateConfig>>) -> Self {
        Self {
            config: config.into(),
            events: None,
        }
    }

    /// Stream progress events. A dropped receiver is ignored.
    pub fn with_events(mut self, events: UnboundedSender<PipelineEvent>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn config(&self) -> &GateConfig {
        &self.config
    }

    fn emit(&self, event: PipelineEvent) {
        if let Some(tx) = &self.events {
            let _ = tx.send(event);
        }
    }

    /// Run every gate, stopping at the first hard-block failure.
    #[instrument(skip_all, fields(run_id = %context.run_id))]
    pub async fn run(&self, context: &ValidationContext) -> PipelineReport {
        let started_at = Utc::now();
        info!(validators = self.config.len(), "Pipeline started");

        let mut gates = Vec::new();
        let mut validators = Vec::new();
        let mut aborted_by = None;

        for gate in GateId::ALL {
            let outcome = self.run_gate(gate, context).await;
            gates.push(outcome.result);
            validators.extend(outcome.records);

            if let Some(abort) = outcome.aborted_by {
                warn!(
                    gate = abort.gate_number,
                    code = %abort.code,
                    message = %abort.message,
                    "Hard block failed; pipeline aborted"
                );
                self.emit(PipelineEvent::PipelineAborted {
                    run_id: context.run_id.clone(),
                    abort: abort.clone(),
                });
                aborted_by = Some(abort);
                break;
            }
        }

        let status = if aborted_by.is_some() {
            PipelineStatus::Failed
        } else {
            PipelineStatus::Passed
        };
        let report = PipelineReport {
            run_id: context.run_id.clone(),
            status,
            gates,
            validators,
            aborted_by,
            started_at,
            completed_at: Utc::now(),
        };

        info!(
            status = %report.status,
            gates = report.gates.len(),
            duration_ms = report.duration_ms(),
            "Pipeline finished"
        );
        report
    }

    /// Run the validators of one gate in order.
    #[instrument(skip(self, context), fields(run_id = %context.run_id))]
    pub async fn run_gate(&self, gate: GateId, context: &ValidationContext) -> GateOutcome {
        let mut result = GateResult::start(gate);
        let mut records = Vec::new();
        let mut aborted_by = None;

        self.emit(PipelineEvent::GateStarted {
            run_id: context.run_id.clone(),
            gate_number: gate.number(),
        });
        debug!(%gate, "Gate started");

        for configured in self.config.gate(gate) {
            let started_at = Utc::now();
            let outcome = execute_guarded(configured.validator.as_ref(), context).await;
            let duration_ms = (Utc::now() - started_at).num_milliseconds().max(0);

            result.record(&outcome, configured.is_hard_block);
            debug!(
                code = configured.code(),
                status = %outcome.status(),
                duration_ms,
                "Validator finished"
            );

            let blocks = outcome.status() == ValidatorStatus::Failed && configured.is_hard_block;
            if blocks {
                aborted_by = Some(HardBlockAbort {
                    gate_number: gate.number(),
                    code: configured.code().to_string(),
                    message: outcome.message.clone(),
                });
            }

            let record = ValidatorRecord {
                gate_number: gate.number(),
                code: configured.code().to_string(),
                order: configured.order(),
                is_hard_block: configured.is_hard_block,
                result: outcome,
                started_at,
                duration_ms,
            };
            self.emit(PipelineEvent::ValidatorCompleted {
                run_id: context.run_id.clone(),
                record: record.clone(),
            });
            records.push(record);

            if blocks {
                break;
            }
        }

        result.complete();
        info!(
            %gate,
            status = %result.status,
            passed = result.passed_count,
            failed = result.failed_count,
            warnings = result.warning_count,
            skipped = result.skipped_count,
            "Gate completed"
        );
        self.emit(PipelineEvent::GateCompleted {
            run_id: context.run_id.clone(),
            result: result.clone(),
        });

        GateOutcome {
            result,
            records,
            aborted_by,
        }
    }
}

impl std::fmt::Debug for GateRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GateRunner")
            .field("validators", &self.config.len())
            .field("events", &self.events.is_some())
            .finish()
    }
}
