//! Capability interfaces consumed by validators.
//!
//! Each capability is a small trait so test doubles only need to model what a
//! given validator touches. Implementations are supplied by the caller; the
//! engine only borrows them for the duration of a run.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use gatekeeper_types::{
    BuildResult, CompileResult, LintResult, ParsedFile, SandboxResult, ServiceError, ServiceResult,
    TestBlock, TestRunResult,
};

/// Git operations against the project checkout.
#[async_trait]
pub trait GitService: Send + Sync {
    /// Unified diff between the base and target refs.
    async fn diff(&self) -> ServiceResult<String>;

    /// Contents of a file in the working tree.
    async fn read_file(&self, path: &str) -> ServiceResult<String>;

    async fn checkout(&self, git_ref: &str) -> ServiceResult<()>;

    /// Paths touched between the base and target refs.
    async fn diff_files(&self) -> ServiceResult<Vec<String>>;

    /// Branch name, or commit id when detached.
    async fn current_ref(&self) -> ServiceResult<String>;

    /// Stash uncommitted changes. Returns whether anything was stashed.
    async fn stash(&self) -> ServiceResult<bool>;

    async fn stash_pop(&self) -> ServiceResult<()>;
}

/// Static analysis of source files.
#[async_trait]
pub trait AstService: Send + Sync {
    async fn parse_file(&self, path: &str) -> ServiceResult<ParsedFile>;

    /// Module specifiers imported by a file.
    async fn imports(&self, path: &str) -> ServiceResult<Vec<String>>;

    /// Test declarations with the comment lines immediately above them.
    async fn test_blocks_with_comments(&self, path: &str) -> ServiceResult<Vec<TestBlock>>;
}

#[async_trait]
pub trait TestRunner: Send + Sync {
    async fn run_single_test(&self, path: &str) -> ServiceResult<TestRunResult>;

    /// Run one test file with `workdir` as the project root.
    ///
    /// Runners bound to a fixed directory report `Unsupported` rather than
    /// running somewhere else.
    async fn run_single_test_in(&self, workdir: &Path, path: &str) -> ServiceResult<TestRunResult> {
        Err(ServiceError::Unsupported(format!(
            "running {} in {}",
            path,
            workdir.display()
        )))
    }

    async fn run_all_tests(&self) -> ServiceResult<TestRunResult>;
}

#[async_trait]
pub trait CompilerService: Send + Sync {
    async fn compile(&self, path: &str) -> ServiceResult<CompileResult>;
}

#[async_trait]
pub trait LintService: Send + Sync {
    async fn lint(&self, files: &[String]) -> ServiceResult<LintResult>;
}

#[async_trait]
pub trait BuildService: Send + Sync {
    async fn build(&self) -> ServiceResult<BuildResult>;
}

pub trait TokenCounter: Send + Sync {
    fn count(&self, text: &str) -> usize;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

/// Run-scoped log sink handed to validators.
pub trait LogService: Send + Sync {
    fn log(&self, level: LogLevel, message: &str, metadata: Option<&serde_json::Value>);

    fn debug(&self, message: &str, metadata: Option<&serde_json::Value>) {
        self.log(LogLevel::Debug, message, metadata);
    }

    fn info(&self, message: &str, metadata: Option<&serde_json::Value>) {
        self.log(LogLevel::Info, message, metadata);
    }

    fn warn(&self, message: &str, metadata: Option<&serde_json::Value>) {
        self.log(LogLevel::Warn, message, metadata);
    }

    fn error(&self, message: &str, metadata: Option<&serde_json::Value>) {
        self.log(LogLevel::Error, message, metadata);
    }
}

/// Disposable isolated checkouts of a project at a ref.
#[async_trait]
pub trait SandboxProvider: Send + Sync {
    async fn create(&self, original_path: &Path, sandbox_base_path: &Path, target_ref: &str)
        -> SandboxResult;

    /// Best-effort removal. Never fails.
    async fn cleanup(&self, sandbox_path: &Path);
}

/// The capability bundle passed to every validator.
#[derive(Clone)]
pub struct Services {
    pub git: Arc<dyn GitService>,
    pub ast: Arc<dyn AstService>,
    pub test_runner: Arc<dyn TestRunner>,
    pub compiler: Arc<dyn CompilerService>,
    pub lint: Arc<dyn LintService>,
    pub build: Arc<dyn BuildService>,
    pub token_counter: Arc<dyn TokenCounter>,
    pub log: Arc<dyn LogService>,
    /// Optional isolation provider used by the red-phase check
    pub sandbox: Option<Arc<dyn SandboxProvider>>,
}

impl std::fmt::Debug for Services {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Services")
            .field("sandbox", &self.sandbox.is_some())
            .finish_non_exhaustive()
    }
}
