//! Gatekeeper CLI
//!
//! - `run`: validate a change through the four gates and print the report
//! - `plan`: check a microplans document, print its batches, optionally run it
//! - `sandbox create|cleanup`: manage worktree sandboxes
//! - `gates`: list the configured validators
//! - `config`: print the effective configuration

use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;
mod settings;

use commands::{gates, plan, run, sandbox};
use settings::GatekeeperConfig;

#[derive(Parser)]
#[command(name = "gatekeeper")]
#[command(about = "Contract-gated validation of code changes", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "GATEKEEPER_CONFIG")]
    config: Option<String>,

    /// Log level (overrides configuration)
    #[arg(long)]
    log_level: Option<String>,

    /// Emit logs as JSON
    #[arg(long)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the validation gates against a change
    Run(run::RunArgs),

    /// Validate and batch a microplans document
    Plan(plan::PlanArgs),

    /// Manage sandboxes
    Sandbox {
        #[command(subcommand)]
        command: sandbox::SandboxCommands,
    },

    /// List validators per gate
    Gates,

    /// Show the effective configuration
    Config,
}

fn init_tracing(level: &str, json: bool) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| level.to_string().into());

    // stdout carries reports; logs go to stderr.
    if json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    let config = GatekeeperConfig::load(cli.config.as_deref()).context("loading configuration")?;

    let level = cli.log_level.as_deref().unwrap_or(&config.logging.level);
    init_tracing(level, cli.log_json || config.logging.json);

    match cli.command {
        Commands::Run(args) => run::execute(args, &config).await,
        Commands::Plan(args) => plan::execute(args, &config).await,
        Commands::Sandbox { command } => sandbox::execute(command, &config).await,
        Commands::Gates => gates::execute(&config),
        Commands::Config => {
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(ExitCode::SUCCESS)
        }
    }
}
