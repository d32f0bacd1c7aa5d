//! Subcommand implementations.

pub mod gates;
pub mod plan;
pub mod run;
pub mod sandbox;

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Context;

/// Pretty JSON on stdout.
pub(crate) fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub(crate) fn exit_code(success: bool) -> ExitCode {
    if success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

/// Absolute, symlink-free form of a project directory given on the command line.
pub(crate) fn project_dir(path: &Path) -> anyhow::Result<PathBuf> {
    std::fs::canonicalize(path).with_context(|| format!("project directory {}", path.display()))
}
