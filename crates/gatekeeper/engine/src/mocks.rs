//! In-memory capability providers for tests and dry runs.
//!
//! Each mock records the calls it receives so tests can assert on ordering
//! (e.g. that git state was restored after the red-phase check).

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use gatekeeper_types::{
    BuildResult, CompileResult, LintResult, ParsedFile, SandboxResult, ServiceError, ServiceResult,
    TestBlock, TestRunResult,
};

use crate::services::{
    AstService, BuildService, CompilerService, GitService, LintService, LogLevel, LogService,
    SandboxProvider, Services, TestRunner, TokenCounter,
};

fn guard<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A test block tagged with the given clause ids.
pub fn tagged_block(name: &str, clause_ids: &[&str]) -> TestBlock {
    TestBlock {
        name: name.to_string(),
        start_line: 1,
        preceding_comments: clause_ids
            .iter()
            .map(|id| format!("// @clause {}", id))
            .collect(),
    }
}

// ── Git ──────────────────────────────────────────────────────────────

#[derive(Default)]
struct MockGitState {
    current_ref: String,
    diff: String,
    diff_files: Vec<String>,
    files: HashMap<String, String>,
    dirty: bool,
    stash_depth: usize,
    failing_checkout: Option<String>,
    calls: Vec<String>,
}

/// Git double tracking the checked-out ref and a stash stack.
pub struct MockGit {
    state: Mutex<MockGitState>,
}

impl MockGit {
    pub fn new(current_ref: impl Into<String>) -> Self {
        Self {
            state: Mutex::new(MockGitState {
                current_ref: current_ref.into(),
                ..Default::default()
            }),
        }
    }

    pub fn with_diff_files(self, files: &[&str]) -> Self {
        guard(&self.state).diff_files = files.iter().map(|f| f.to_string()).collect();
        self
    }

    pub fn with_diff(self, diff: impl Into<String>) -> Self {
        guard(&self.state).diff = diff.into();
        self
    }

    pub fn with_file(self, path: impl Into<String>, content: impl Into<String>) -> Self {
        guard(&self.state).files.insert(path.into(), content.into());
        self
    }

    /// Pretend the working tree has uncommitted changes.
    pub fn dirty(self) -> Self {
        guard(&self.state).dirty = true;
        self
    }

    /// Make `checkout(git_ref)` fail.
    pub fn failing_checkout(self, git_ref: impl Into<String>) -> Self {
        guard(&self.state).failing_checkout = Some(git_ref.into());
        self
    }

    pub fn calls(&self) -> Vec<String> {
        guard(&self.state).calls.clone()
    }

    pub fn current(&self) -> String {
        guard(&self.state).current_ref.clone()
    }

    pub fn is_dirty(&self) -> bool {
        guard(&self.state).dirty
    }

    pub fn stash_depth(&self) -> usize {
        guard(&self.state).stash_depth
    }
}

#[async_trait]
impl GitService for MockGit {
    async fn diff(&self) -> ServiceResult<String> {
        let mut state = guard(&self.state);
        state.calls.push("diff".into());
        Ok(state.diff.clone())
    }

    async fn read_file(&self, path: &str) -> ServiceResult<String> {
        let mut state = guard(&self.state);
        state.calls.push(format!("read_file {}", path));
        state
            .files
            .get(path)
            .cloned()
            .ok_or_else(|| ServiceError::Git(format!("no such file: {}", path)))
    }

    async fn checkout(&self, git_ref: &str) -> ServiceResult<()> {
        let mut state = guard(&self.state);
        state.calls.push(format!("checkout {}", git_ref));
        if state.failing_checkout.as_deref() == Some(git_ref) {
            return Err(ServiceError::Git(format!("cannot checkout {}", git_ref)));
        }
        state.current_ref = git_ref.to_string();
        Ok(())
    }

    async fn diff_files(&self) -> ServiceResult<Vec<String>> {
        let mut state = guard(&self.state);
        state.calls.push("diff_files".into());
        Ok(state.diff_files.clone())
    }

    async fn current_ref(&self) -> ServiceResult<String> {
        let mut state = guard(&self.state);
        state.calls.push("current_ref".into());
        Ok(state.current_ref.clone())
    }

    async fn stash(&self) -> ServiceResult<bool> {
        let mut state = guard(&self.state);
        state.calls.push("stash".into());
        if state.dirty {
            state.dirty = false;
            state.stash_depth += 1;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    async fn stash_pop(&self) -> ServiceResult<()> {
        let mut state = guard(&self.state);
        state.calls.push("stash_pop".into());
        if state.stash_depth == 0 {
            return Err(ServiceError::Git("no stash entries".into()));
        }
        state.stash_depth -= 1;
        state.dirty = true;
        Ok(())
    }
}

// ── AST ──────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct MockAst {
    blocks: HashMap<String, Vec<TestBlock>>,
    parsed: HashMap<String, ParsedFile>,
    imports: HashMap<String, Vec<String>>,
}

impl MockAst {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_blocks(mut self, path: impl Into<String>, blocks: Vec<TestBlock>) -> Self {
        self.blocks.insert(path.into(), blocks);
        self
    }

    pub fn with_parsed(mut self, parsed: ParsedFile) -> Self {
        self.parsed.insert(parsed.path.clone(), parsed);
        self
    }

    pub fn with_imports(mut self, path: impl Into<String>, imports: &[&str]) -> Self {
        self.imports
            .insert(path.into(), imports.iter().map(|i| i.to_string()).collect());
        self
    }
}

#[async_trait]
impl AstService for MockAst {
    async fn parse_file(&self, path: &str) -> ServiceResult<ParsedFile> {
        Ok(self.parsed.get(path).cloned().unwrap_or_else(|| ParsedFile {
            path: path.to_string(),
            ..Default::default()
        }))
    }

    async fn imports(&self, path: &str) -> ServiceResult<Vec<String>> {
        Ok(self.imports.get(path).cloned().unwrap_or_default())
    }

    async fn test_blocks_with_comments(&self, path: &str) -> ServiceResult<Vec<TestBlock>> {
        Ok(self.blocks.get(path).cloned().unwrap_or_default())
    }
}

// ── Test runner ──────────────────────────────────────────────────────

/// Test runner returning canned results.
///
/// When attached to a [`MockGit`], each call records the ref that was checked
/// out at the time the test ran.
pub struct MockTestRunner {
    single: Mutex<TestRunResult>,
    all: Mutex<TestRunResult>,
    error: Option<String>,
    git: Option<Arc<MockGit>>,
    calls: Mutex<Vec<String>>,
}

impl MockTestRunner {
    pub fn new() -> Self {
        Self {
            single: Mutex::new(TestRunResult::passing()),
            all: Mutex::new(TestRunResult::passing()),
            error: None,
            git: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn single(self, result: TestRunResult) -> Self {
        *guard(&self.single) = result;
        self
    }

    pub fn all(self, result: TestRunResult) -> Self {
        *guard(&self.all) = result;
        self
    }

    /// Every run fails with an infrastructure error.
    pub fn erroring(mut self, message: impl Into<String>) -> Self {
        self.error = Some(message.into());
        self
    }

    pub fn observing(mut self, git: Arc<MockGit>) -> Self {
        self.git = Some(git);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        guard(&self.calls).clone()
    }

    fn record(&self, call: String) -> ServiceResult<()> {
        let call = match &self.git {
            Some(git) => format!("{} @ {}", call, git.current()),
            None => call,
        };
        guard(&self.calls).push(call);
        match &self.error {
            Some(message) => Err(ServiceError::Process {
                command: "test".into(),
                message: message.clone(),
            }),
            None => Ok(()),
        }
    }
}

impl Default for MockTestRunner {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TestRunner for MockTestRunner {
    async fn run_single_test(&self, path: &str) -> ServiceResult<TestRunResult> {
        self.record(format!("single {}", path))?;
        Ok(guard(&self.single).clone())
    }

    async fn run_single_test_in(&self, workdir: &Path, path: &str) -> ServiceResult<TestRunResult> {
        self.record(format!("single {} in {}", path, workdir.display()))?;
        Ok(guard(&self.single).clone())
    }

    async fn run_all_tests(&self) -> ServiceResult<TestRunResult> {
        self.record("all".into())?;
        Ok(guard(&self.all).clone())
    }
}

// ── Compiler, lint, build ────────────────────────────────────────────

#[derive(Default)]
pub struct MockCompiler {
    failures: HashMap<String, Vec<String>>,
    calls: Mutex<Vec<String>>,
}

impl MockCompiler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(mut self, path: impl Into<String>, errors: &[&str]) -> Self {
        self.failures
            .insert(path.into(), errors.iter().map(|e| e.to_string()).collect());
        self
    }

    pub fn calls(&self) -> Vec<String> {
        guard(&self.calls).clone()
    }
}

#[async_trait]
impl CompilerService for MockCompiler {
    async fn compile(&self, path: &str) -> ServiceResult<CompileResult> {
        guard(&self.calls).push(path.to_string());
        Ok(match self.failures.get(path) {
            Some(errors) => CompileResult {
                success: false,
                errors: errors.clone(),
                output: errors.join("\n"),
            },
            None => CompileResult {
                success: true,
                ..Default::default()
            },
        })
    }
}

pub struct MockLint {
    result: LintResult,
}

impl MockLint {
    pub fn clean() -> Self {
        Self {
            result: LintResult {
                success: true,
                ..Default::default()
            },
        }
    }

    pub fn with_counts(errors: u32, warnings: u32) -> Self {
        Self {
            result: LintResult {
                success: errors == 0,
                error_count: errors,
                warning_count: warnings,
                output: format!("{} errors, {} warnings", errors, warnings),
            },
        }
    }
}

#[async_trait]
impl LintService for MockLint {
    async fn lint(&self, _files: &[String]) -> ServiceResult<LintResult> {
        Ok(self.result.clone())
    }
}

pub struct MockBuild {
    result: BuildResult,
}

impl MockBuild {
    pub fn succeeding() -> Self {
        Self {
            result: BuildResult {
                success: true,
                ..Default::default()
            },
        }
    }

    pub fn failing(output: impl Into<String>) -> Self {
        Self {
            result: BuildResult {
                success: false,
                exit_code: 1,
                output: output.into(),
            },
        }
    }
}

#[async_trait]
impl BuildService for MockBuild {
    async fn build(&self) -> ServiceResult<BuildResult> {
        Ok(self.result.clone())
    }
}

/// Counts whitespace-separated words.
#[derive(Default)]
pub struct WordTokenCounter;

impl TokenCounter for WordTokenCounter {
    fn count(&self, text: &str) -> usize {
        text.split_whitespace().count()
    }
}

/// Log sink that keeps every entry in memory.
#[derive(Default)]
pub struct RecordingLog {
    entries: Mutex<Vec<(LogLevel, String)>>,
}

impl RecordingLog {
    pub fn entries(&self) -> Vec<(LogLevel, String)> {
        guard(&self.entries).clone()
    }
}

impl LogService for RecordingLog {
    fn log(&self, level: LogLevel, message: &str, _metadata: Option<&serde_json::Value>) {
        guard(&self.entries).push((level, message.to_string()));
    }
}

// ── Sandbox ──────────────────────────────────────────────────────────

/// Sandbox provider creating plain directories instead of git worktrees.
#[derive(Default)]
pub struct MockSandbox {
    fail_with: Option<String>,
    calls: Mutex<Vec<String>>,
}

impl MockSandbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            fail_with: Some(message.into()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<String> {
        guard(&self.calls).clone()
    }
}

#[async_trait]
impl SandboxProvider for MockSandbox {
    async fn create(&self, _original_path: &Path, sandbox_base_path: &Path, target_ref: &str) -> SandboxResult {
        guard(&self.calls).push(format!("create {}", target_ref));
        let sandbox_path: PathBuf = sandbox_base_path.join(format!("sandbox-{}", target_ref));
        if let Some(message) = &self.fail_with {
            return SandboxResult::failure(sandbox_path, message.clone());
        }
        match tokio::fs::create_dir_all(&sandbox_path).await {
            Ok(()) => SandboxResult {
                success: true,
                sandbox_path,
                junction_created: false,
                error: None,
            },
            Err(err) => SandboxResult::failure(sandbox_path, err.to_string()),
        }
    }

    async fn cleanup(&self, sandbox_path: &Path) {
        guard(&self.calls).push(format!("cleanup {}", sandbox_path.display()));
        let _ = tokio::fs::remove_dir_all(sandbox_path).await;
    }
}

// ── Bundle ───────────────────────────────────────────────────────────

/// Concrete handles to every mock, convertible into a [`Services`] bundle.
pub struct MockServices {
    pub git: Arc<MockGit>,
    pub ast: Arc<MockAst>,
    pub test_runner: Arc<MockTestRunner>,
    pub compiler: Arc<MockCompiler>,
    pub lint: Arc<MockLint>,
    pub build: Arc<MockBuild>,
    pub token_counter: Arc<WordTokenCounter>,
    pub log: Arc<RecordingLog>,
    pub sandbox: Option<Arc<MockSandbox>>,
}

impl MockServices {
    /// Everything succeeds; git is on `main` with a clean tree.
    pub fn new() -> Self {
        Self {
            git: Arc::new(MockGit::new("main")),
            ast: Arc::new(MockAst::new()),
            test_runner: Arc::new(MockTestRunner::new()),
            compiler: Arc::new(MockCompiler::new()),
            lint: Arc::new(MockLint::clean()),
            build: Arc::new(MockBuild::succeeding()),
            token_counter: Arc::new(WordTokenCounter),
            log: Arc::new(RecordingLog::default()),
            sandbox: None,
        }
    }

    pub fn git(mut self, git: MockGit) -> Self {
        self.git = Arc::new(git);
        self
    }

    pub fn ast(mut self, ast: MockAst) -> Self {
        self.ast = Arc::new(ast);
        self
    }

    pub fn test_runner(mut self, runner: MockTestRunner) -> Self {
        self.test_runner = Arc::new(runner);
        self
    }

    pub fn compiler(mut self, compiler: MockCompiler) -> Self {
        self.compiler = Arc::new(compiler);
        self
    }

    pub fn lint(mut self, lint: MockLint) -> Self {
        self.lint = Arc::new(lint);
        self
    }

    pub fn build(mut self, build: MockBuild) -> Self {
        self.build = Arc::new(build);
        self
    }

    pub fn sandbox(mut self, sandbox: MockSandbox) -> Self {
        self.sandbox = Some(Arc::new(sandbox));
        self
    }

    pub fn services(&self) -> Services {
        Services {
            git: self.git.clone(),
            ast: self.ast.clone(),
            test_runner: self.test_runner.clone(),
            compiler: self.compiler.clone(),
            lint: self.lint.clone(),
            build: self.build.clone(),
            token_counter: self.token_counter.clone(),
            log: self.log.clone(),
            sandbox: self
                .sandbox
                .clone()
                .map(|s| s as Arc<dyn SandboxProvider>),
        }
    }
}

impl Default for MockServices {
    fn default() -> Self {
        Self::new()
    }
}
