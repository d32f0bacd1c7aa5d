use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use clap::Args;
use gatekeeper_toolchain::shell::run_shell;
use microplan_executor::{
    topological_sort, MicroplanExecutor, MicroplanOutput, MicroplanRunner, RunnerError,
};
use microplan_types::{Microplan, MicroplanEvent, MicroplansDocument};
use serde_json::json;
use tokio::sync::mpsc;
use tracing::{info, warn};

use super::{exit_code, print_json};
use crate::settings::GatekeeperConfig;

#[derive(Args)]
pub struct PlanArgs {
    /// Microplans JSON document
    pub file: PathBuf,

    /// Run each microplan's `verify` command in dependency order
    #[arg(long)]
    pub run: bool,

    /// Directory the verify commands run in
    #[arg(long, default_value = ".")]
    pub project: PathBuf,
}

/// Runs a microplan's `verify` command through the shell.
struct VerifyCommandRunner {
    root: PathBuf,
    timeout: Duration,
}

#[async_trait]
impl MicroplanRunner for VerifyCommandRunner {
    async fn run(&self, microplan: &Microplan) -> Result<MicroplanOutput, RunnerError> {
        let command = microplan.verify.trim();
        if command.is_empty() {
            return Ok(MicroplanOutput::new("no verify command"));
        }
        let out = run_shell(command, &self.root, self.timeout)
            .await
            .map_err(|e| RunnerError::Unavailable(e.to_string()))?;
        if out.success() {
            Ok(MicroplanOutput::new(out.combined().trim().to_string()))
        } else {
            Err(RunnerError::Verification(format!(
                "`{}` exited with code {}: {}",
                command,
                out.exit_code,
                out.combined().trim()
            )))
        }
    }
}

pub async fn execute(args: PlanArgs, config: &GatekeeperConfig) -> anyhow::Result<ExitCode> {
    let text = tokio::fs::read_to_string(&args.file)
        .await
        .with_context(|| format!("reading {}", args.file.display()))?;
    let doc: MicroplansDocument = serde_json::from_str(&text)
        .with_context(|| format!("parsing {}", args.file.display()))?;

    let batches = topological_sort(&doc)?;
    if !args.run {
        print_json(&json!({ "task": doc.task, "batches": batches }))?;
        return Ok(ExitCode::SUCCESS);
    }

    let runner = Arc::new(VerifyCommandRunner {
        root: args.project.clone(),
        timeout: config.commands.timeout(),
    });
    let (tx, mut rx) = mpsc::unbounded_channel();
    let progress = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            match &event {
                MicroplanEvent::Error { id, error } => warn!(id = %id, error = %error, "Microplan failed"),
                MicroplanEvent::Skipped { id, reason } => warn!(id = %id, reason = %reason, "Microplan skipped"),
                other => info!(id = %other.id(), event = ?other, "Microplan event"),
            }
        }
    });

    let executor = MicroplanExecutor::new(runner).with_events(tx);
    let summary = executor.execute(&doc).await?;
    drop(executor);
    let _ = progress.await;

    print_json(&summary)?;
    Ok(exit_code(summary.succeeded()))
}

#[cfg(all(test, not(windows)))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn verify_commands_decide_the_outcome() {
        let dir = tempfile::tempdir().unwrap();
        let runner = VerifyCommandRunner {
            root: dir.path().to_path_buf(),
            timeout: Duration::from_secs(10),
        };

        let ok = runner
            .run(&Microplan::new("a").with_verify("echo fine"))
            .await
            .unwrap();
        assert_eq!(ok.summary, "fine");

        let err = runner
            .run(&Microplan::new("b").with_verify("exit 4"))
            .await
            .unwrap_err();
        assert!(matches!(err, RunnerError::Verification(ref m) if m.contains("code 4")));

        let none = runner.run(&Microplan::new("c")).await.unwrap();
        assert_eq!(none.summary, "no verify command");
    }
}
