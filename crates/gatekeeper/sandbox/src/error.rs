use std::path::PathBuf;

use thiserror::Error;

/// Failures while building or tearing down a sandbox.
///
/// [`crate::SandboxService::create`] reports these through
/// [`gatekeeper_types::SandboxResult::error`] rather than returning them.
#[derive(Debug, Error)]
pub enum SandboxError {
    #[error("invalid target ref: {0:?}")]
    InvalidRef(String),

    #[error("git {command} failed: {stderr}")]
    Git { command: String, stderr: String },

    #[error("{0} exists but is not a worktree of this repository")]
    Occupied(PathBuf),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T, E = SandboxError> = std::result::Result<T, E>;
