use std::collections::{BTreeMap, HashMap};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::future::join_all;
use futures::FutureExt;
use microplan_types::{MicroplanEvent, MicroplanStatus, MicroplansDocument, PlanResult};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, instrument, warn};

use crate::graph::PlanGraph;
use crate::runner::{MicroplanOutput, MicroplanRunner, RunnerError};

/// Reason attached to microplans skipped because a dependency did not complete.
pub const DEPENDENCY_FAILED: &str = "dependency failed";

/// Final state of one `execute` call.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionSummary {
    /// Batches that actually ran, in order
    pub batches: Vec<Vec<String>>,
    pub statuses: BTreeMap<String, MicroplanStatus>,
    pub outputs: BTreeMap<String, MicroplanOutput>,
    pub errors: BTreeMap<String, String>,
    pub completed: Vec<String>,
    pub failed: Vec<String>,
    pub skipped: Vec<String>,
}

impl ExecutionSummary {
    pub fn succeeded(&self) -> bool {
        self.failed.is_empty() && self.skipped.is_empty()
    }

    pub fn status(&self, id: &str) -> Option<MicroplanStatus> {
        self.statuses.get(id).copied()
    }
}

/// Runs a microplan document batch by batch.
///
/// Microplans in a batch run concurrently; batches run one after another.
/// When a microplan errors, everything that depends on it, directly or
/// transitively, is skipped without running.
#[derive(Clone)]
pub struct MicroplanExecutor {
    runner: Arc<dyn MicroplanRunner>,
    events: Option<UnboundedSender<MicroplanEvent>>,
}

impl MicroplanExecutor {
    pub fn new(runner: Arc<dyn MicroplanRunner>) -> Self {
        Self {
            runner,
            events: None,
        }
    }

    /// Stream lifecycle events. A dropped receiver is ignored.
    pub fn with_events(mut self, events: UnboundedSender<MicroplanEvent>) -> Self {
        self.events = Some(events);
        self
    }

    fn emit(&self, event: MicroplanEvent) {
        if let Some(tx) = &self.events {
            let _ = tx.send(event);
        }
    }

    /// Validate the document and run it to completion.
    ///
    /// Structural problems (missing dependency, duplicate id, cycle) are
    /// returned before any microplan starts. Microplan failures are not
    /// errors; they show up in the summary.
    #[instrument(skip_all, fields(task = %doc.task, microplans = doc.microplans.len()))]
    pub async fn execute(&self, doc: &MicroplansDocument) -> PlanResult<ExecutionSummary> {
        let graph = PlanGraph::build(doc)?;
        info!("Microplan execution started");

        let mut statuses: HashMap<&str, MicroplanStatus> = graph
            .order
            .iter()
            .map(|id| (*id, MicroplanStatus::Pending))
            .collect();
        let mut in_degree = graph.in_degrees();
        let mut summary = ExecutionSummary::default();

        let mut ready = graph.sorted(in_degree.iter().filter(|(_, d)| **d == 0).map(|(id, _)| *id));

        while !ready.is_empty() {
            let batch_index = summary.batches.len();
            let batch = ready;

            let plans: Vec<_> = batch.iter().filter_map(|id| doc.get(id)).collect();
            for plan in &plans {
                statuses.insert(plan.id.as_str(), MicroplanStatus::Running);
                self.emit(MicroplanEvent::Start {
                    id: plan.id.clone(),
                    batch: batch_index,
                });
            }
            debug!(batch = batch_index, ids = ?batch, "Batch started");

            let runs = plans.iter().map(|plan| {
                let runner = self.runner.clone();
                async move {
                    AssertUnwindSafe(runner.run(plan))
                        .catch_unwind()
                        .await
                        .unwrap_or_else(|_| Err(RunnerError::Failed("runner panicked".into())))
                }
            });
            let results = join_all(runs).await;

            for (plan, result) in plans.iter().zip(results) {
                let id = plan.id.as_str();
                match result {
                    Ok(output) => {
                        statuses.insert(id, MicroplanStatus::Complete);
                        self.emit(MicroplanEvent::Complete {
                            id: id.to_string(),
                            output: output.summary.clone(),
                        });
                        summary.outputs.insert(id.to_string(), output);
                    }
                    Err(err) => {
                        warn!(id, error = %err, "Microplan failed");
                        statuses.insert(id, MicroplanStatus::Error);
                        self.emit(MicroplanEvent::Error {
                            id: id.to_string(),
                            error: err.to_string(),
                        });
                        summary.errors.insert(id.to_string(), err.to_string());
                    }
                }
            }
            summary
                .batches
                .push(batch.iter().map(|s| s.to_string()).collect());

            // Resolve the finished batch. Dependents of a failure become
            // ready too, but are skipped on the spot and resolved in turn,
            // so the skip reaches the whole subtree before the next batch.
            let mut next = Vec::new();
            let mut resolved = batch;
            while !resolved.is_empty() {
                let mut newly_ready = Vec::new();
                for id in &resolved {
                    for dependent in graph.dependents_of(id) {
                        if let Some(degree) = in_degree.get_mut(dependent) {
                            *degree -= 1;
                            if *degree == 0 {
                                newly_ready.push(*dependent);
                            }
                        }
                    }
                }

                resolved = Vec::new();
                for id in graph.sorted(newly_ready) {
                    let blocked = graph
                        .deps
                        .get(id)
                        .into_iter()
                        .flatten()
                        .any(|dep| statuses.get(dep) != Some(&MicroplanStatus::Complete));
                    if blocked {
                        debug!(id, "Skipping microplan; dependency failed");
                        statuses.insert(id, MicroplanStatus::Skipped);
                        self.emit(MicroplanEvent::Skipped {
                            id: id.to_string(),
                            reason: DEPENDENCY_FAILED.to_string(),
                        });
                        resolved.push(id);
                    } else {
                        next.push(id);
                    }
                }
            }
            ready = graph.sorted(next);
        }

        for id in &graph.order {
            let status = statuses.get(id).copied().unwrap_or(MicroplanStatus::Pending);
            match status {
                MicroplanStatus::Complete => summary.completed.push(id.to_string()),
                MicroplanStatus::Error => summary.failed.push(id.to_string()),
                MicroplanStatus::Skipped => summary.skipped.push(id.to_string()),
                MicroplanStatus::Pending | MicroplanStatus::Running => {}
            }
            summary.statuses.insert(id.to_string(), status);
        }

        info!(
            batches = summary.batches.len(),
            completed = summary.completed.len(),
            failed = summary.failed.len(),
            skipped = summary.skipped.len(),
            "Microplan execution finished"
        );
        Ok(summary)
    }
}

impl std::fmt::Debug for MicroplanExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MicroplanExecutor")
            .field("events", &self.events.is_some())
            .finish_non_exhaustive()
    }
}
