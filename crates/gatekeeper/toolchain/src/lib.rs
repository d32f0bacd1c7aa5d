//! Process-backed implementations of the engine's capability traits.
//!
//! - [`GitCli`]: the `git` binary
//! - [`CommandToolchain`]: test runner, compiler, lint and build as shell
//!   command templates
//! - [`TagScanner`]: pattern-based test/import scanning
//! - [`ApproxTokenCounter`] and [`TracingLog`]
//!
//! [`toolchain_services`] wires them into one [`Services`] bundle.

#![deny(unsafe_code)]

mod commands;
mod git;
mod observe;
mod scanner;
pub mod shell;

use std::path::Path;
use std::sync::Arc;

use gatekeeper_engine::{SandboxProvider, Services};

pub use commands::{error_lines, lint_counts, CommandTemplates, CommandToolchain};
pub use git::GitCli;
pub use observe::{ApproxTokenCounter, TracingLog};
pub use scanner::{count_assertions, scan_imports, scan_test_blocks, TagScanner};

/// Services for a project checkout at `root`.
pub fn toolchain_services(
    root: &Path,
    base_ref: &str,
    target_ref: &str,
    templates: CommandTemplates,
    sandbox: Option<Arc<dyn SandboxProvider>>,
) -> Services {
    let toolchain = Arc::new(CommandToolchain::new(root, templates));
    Services {
        git: Arc::new(GitCli::new(root, base_ref, target_ref)),
        ast: Arc::new(TagScanner::new(root)),
        test_runner: toolchain.clone(),
        compiler: toolchain.clone(),
        lint: toolchain.clone(),
        build: toolchain,
        token_counter: Arc::new(ApproxTokenCounter),
        log: Arc::new(TracingLog),
        sandbox,
    }
}
