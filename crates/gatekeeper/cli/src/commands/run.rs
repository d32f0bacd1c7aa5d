use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::Args;
use gatekeeper_engine::{keys, GateRunner, PipelineEvent, SandboxProvider, ValidationContext};
use gatekeeper_sandbox::SandboxService;
use gatekeeper_toolchain::toolchain_services;
use gatekeeper_types::{GateId, GateStatus, Manifest};
use serde_json::json;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::gates::gate_config;
use super::{exit_code, print_json, project_dir};
use crate::settings::GatekeeperConfig;

#[derive(Args)]
pub struct RunArgs {
    /// Project directory (git checkout of the change)
    #[arg(long, default_value = ".")]
    pub project: PathBuf,

    /// Ref the change is based on
    #[arg(long)]
    pub base_ref: String,

    /// Ref holding the change; empty compares against the working tree
    #[arg(long, default_value = "")]
    pub target_ref: String,

    /// Test file specifying the change (defaults to the manifest's)
    #[arg(long)]
    pub test_file: Option<String>,

    /// Manifest JSON file
    #[arg(long)]
    pub manifest: Option<PathBuf>,

    /// Contract JSON file
    #[arg(long)]
    pub contract: Option<PathBuf>,

    /// File holding the task prompt
    #[arg(long)]
    pub prompt: Option<PathBuf>,

    /// Allow touching sensitive files
    #[arg(long)]
    pub danger: bool,

    /// Run only this gate (0-3)
    #[arg(long)]
    pub gate: Option<u8>,
}

async fn read(path: &Path) -> anyhow::Result<String> {
    tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("reading {}", path.display()))
}

async fn build_context(args: &RunArgs, config: &GatekeeperConfig) -> anyhow::Result<ValidationContext> {
    let project = project_dir(&args.project)?;
    let sandbox: Arc<dyn SandboxProvider> =
        Arc::new(SandboxService::new(config.sandbox.service_config()));
    let services = toolchain_services(
        &project,
        &args.base_ref,
        &args.target_ref,
        config.commands.clone(),
        Some(sandbox),
    );

    let sandbox_base = config.sandbox.base_dir_for(&project);
    let mut builder = ValidationContext::builder(&project, services)
        .refs(&args.base_ref, &args.target_ref)
        .danger_mode(args.danger)
        .sensitive_patterns(config.context.sensitive_patterns.clone())
        .ambiguous_terms(config.context.ambiguous_terms.clone())
        .config(keys::MAX_TOKEN_BUDGET, config.limits.max_prompt_tokens.to_string())
        .config(keys::MAX_MANIFEST_FILES, config.limits.max_manifest_files.to_string())
        .config(keys::RED_PHASE_ISOLATION, config.red_phase.isolation.clone())
        .config(keys::SANDBOX_BASE_DIR, sandbox_base.to_string_lossy());

    if let Some(path) = &args.prompt {
        builder = builder.task_prompt(read(path).await?);
    }
    if let Some(path) = &args.manifest {
        let manifest: Manifest = serde_json::from_str(&read(path).await?)
            .with_context(|| format!("parsing manifest {}", path.display()))?;
        builder = builder.manifest(manifest);
    }
    // Contract parse errors are reported by the schema validator.
    if let Some(path) = &args.contract {
        builder = builder.contract_json(read(path).await?);
    }
    if let Some(test_file) = &args.test_file {
        builder = builder.test_file(test_file);
    }

    Ok(builder.build())
}

/// Log pipeline progress while the run is in flight.
fn spawn_progress_log() -> (mpsc::UnboundedSender<PipelineEvent>, tokio::task::JoinHandle<()>) {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let handle = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            match event {
                PipelineEvent::GateStarted { gate_number, .. } => {
                    debug!(gate = gate_number, "Gate started")
                }
                PipelineEvent::ValidatorCompleted { record, .. } => info!(
                    gate = record.gate_number,
                    code = %record.code,
                    status = %record.result.status(),
                    "{}",
                    record.result.message
                ),
                PipelineEvent::GateCompleted { result, .. } => {
                    info!(gate = result.gate_number, status = %result.status, "Gate completed")
                }
                PipelineEvent::PipelineAborted { abort, .. } => {
                    warn!(gate = abort.gate_number, code = %abort.code, "Pipeline aborted")
                }
            }
        }
    });
    (tx, handle)
}

pub async fn execute(args: RunArgs, config: &GatekeeperConfig) -> anyhow::Result<ExitCode> {
    let gate = match args.gate {
        Some(n) => match GateId::from_number(n) {
            Some(gate) => Some(gate),
            None => bail!("no gate {}; gates are 0-3", n),
        },
        None => None,
    };

    let context = build_context(&args, config).await?;
    let (events, progress) = spawn_progress_log();
    let runner = GateRunner::new(gate_config(config)?).with_events(events);

    let success = match gate {
        Some(gate) => {
            let outcome = runner.run_gate(gate, &context).await;
            print_json(&json!({
                "runId": context.run_id,
                "gate": outcome.result,
                "validators": outcome.records,
                "abortedBy": outcome.aborted_by,
            }))?;
            outcome.result.status != GateStatus::Failed
        }
        None => {
            let report = runner.run(&context).await;
            print_json(&report)?;
            report.passed()
        }
    };

    drop(runner);
    let _ = progress.await;
    Ok(exit_code(success))
}
