use std::path::PathBuf;
use std::process::ExitCode;

use clap::Subcommand;
use gatekeeper_sandbox::SandboxService;

use super::{exit_code, print_json, project_dir};
use crate::settings::GatekeeperConfig;

#[derive(Subcommand)]
pub enum SandboxCommands {
    /// Check out a ref into a sandbox
    Create {
        /// Project (git repository) to sandbox
        #[arg(long, default_value = ".")]
        project: PathBuf,

        /// Ref to check out
        #[arg(long = "ref")]
        git_ref: String,

        /// Directory holding sandboxes
        #[arg(long)]
        base_dir: Option<PathBuf>,
    },

    /// Remove a sandbox
    Cleanup {
        /// Sandbox directory returned by `create`
        path: PathBuf,
    },
}

pub async fn execute(command: SandboxCommands, config: &GatekeeperConfig) -> anyhow::Result<ExitCode> {
    let service = SandboxService::new(config.sandbox.service_config());
    match command {
        SandboxCommands::Create {
            project,
            git_ref,
            base_dir,
        } => {
            let project = project_dir(&project)?;
            let base_dir = base_dir.unwrap_or_else(|| config.sandbox.base_dir_for(&project));
            let result = service.create(&project, &base_dir, &git_ref).await;
            print_json(&result)?;
            Ok(exit_code(result.success))
        }
        SandboxCommands::Cleanup { path } => {
            service.cleanup(&path).await;
            Ok(ExitCode::SUCCESS)
        }
    }
}
