//! The red phase: a new test must fail against the pre-implementation code.
//!
//! Git checkout state is a single shared resource. Whatever happens while the
//! test runs (error, failure, panic) the original ref, the stash and the test
//! file are put back before the result is reported.

use std::panic::{resume_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use gatekeeper_types::{GateId, ServiceError, ServiceResult, TestRunResult, ValidatorResult};
use serde_json::json;

use super::{codes, keys, output_tail};
use crate::context::ValidationContext;
use crate::services::SandboxProvider;
use crate::traits::Validator;

const STONE_CLAUSE_VIOLATION: &str = "Stone clause violated: the test passes against the base ref. \
     A test must fail before its implementation exists (immutable TDD invariant)";

/// Where the test is run against the base ref.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RedPhaseIsolation {
    /// Stash, check out the base ref in the project itself, restore afterwards.
    #[default]
    InPlace,
    /// Run inside a disposable worktree from the sandbox provider.
    Sandbox,
}

impl RedPhaseIsolation {
    pub fn from_config(value: Option<&str>) -> Self {
        match value.map(|v| v.trim().to_ascii_lowercase()).as_deref() {
            Some("sandbox") => Self::Sandbox,
            _ => Self::InPlace,
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            Self::InPlace => "in_place",
            Self::Sandbox => "sandbox",
        }
    }
}

/// Outcome of running the test on the base ref, plus anything that went
/// wrong while putting the project back.
struct RedPhaseRun {
    run: ServiceResult<TestRunResult>,
    restore_problems: Vec<String>,
    isolation: RedPhaseIsolation,
}

/// Hard block that cannot be relaxed by configuration.
pub struct TestFailsBeforeImplementation;

impl TestFailsBeforeImplementation {
    async fn run_in_place(
        ctx: &ValidationContext,
        base_ref: &str,
        test_file: &str,
        content: &[u8],
    ) -> ServiceResult<RedPhaseRun> {
        let git = &ctx.services.git;
        let test_path = ctx.project_file(test_file);

        let original_ref = git.current_ref().await?;
        let stashed = git.stash().await?;

        let mut base_copy: Option<Vec<u8>> = None;
        let mut wrote = false;
        let attempt = AssertUnwindSafe(async {
            git.checkout(base_ref).await?;
            base_copy = tokio::fs::read(&test_path).await.ok();
            wrote = true;
            write_file(&test_path, content).await?;
            ctx.services.test_runner.run_single_test(test_file).await
        })
        .catch_unwind()
        .await;

        let mut restore_problems = Vec::new();
        if wrote {
            let restored = match &base_copy {
                Some(bytes) => write_file(&test_path, bytes).await,
                None => tokio::fs::remove_file(&test_path).await,
            };
            if let Err(err) = restored {
                restore_problems.push(format!("restore {}: {}", test_file, err));
            }
        }
        if let Err(err) = git.checkout(&original_ref).await {
            restore_problems.push(format!("checkout {}: {}", original_ref, err));
        }
        if stashed {
            if let Err(err) = git.stash_pop().await {
                restore_problems.push(format!("stash pop: {}", err));
            }
        }

        match attempt {
            Ok(run) => Ok(RedPhaseRun {
                run,
                restore_problems,
                isolation: RedPhaseIsolation::InPlace,
            }),
            Err(panic) => resume_unwind(panic),
        }
    }

    async fn run_in_sandbox(
        ctx: &ValidationContext,
        provider: &Arc<dyn SandboxProvider>,
        base_ref: &str,
        test_file: &str,
        content: &[u8],
    ) -> Result<RedPhaseRun, ValidatorResult> {
        let sandbox_base = sandbox_root(ctx);
        let sandbox = provider.create(ctx.project_path(), &sandbox_base, base_ref).await;
        if !sandbox.success {
            let error = sandbox.error.unwrap_or_else(|| "unknown error".to_string());
            return Err(ValidatorResult::failed(format!(
                "Sandbox for base ref {} could not be created; test not run",
                base_ref
            ))
            .with_evidence(error.clone())
            .with_details(json!({ "error": error, "isolation": "sandbox" })));
        }

        let workdir = sandbox.sandbox_path.clone();
        let attempt = AssertUnwindSafe(async {
            write_file(&workdir.join(test_file), content).await?;
            ctx.services
                .test_runner
                .run_single_test_in(&workdir, test_file)
                .await
        })
        .catch_unwind()
        .await;

        provider.cleanup(&workdir).await;

        match attempt {
            Ok(run) => Ok(RedPhaseRun {
                run,
                restore_problems: Vec::new(),
                isolation: RedPhaseIsolation::Sandbox,
            }),
            Err(panic) => resume_unwind(panic),
        }
    }

    fn judge(outcome: RedPhaseRun, base_ref: &str, test_file: &str) -> ValidatorResult {
        let mut result = match &outcome.run {
            Err(err) => ValidatorResult::failed(format!(
                "Could not run {} against base ref {}: {}",
                test_file, base_ref, err
            ))
            .with_details(json!({ "error": err.to_string(), "kind": "infrastructure" })),
            Ok(run) if run.passed => ValidatorResult::failed(STONE_CLAUSE_VIOLATION)
                .with_evidence(output_tail(&run.output))
                .with_details(json!({ "violation": "red_phase", "baseRef": base_ref })),
            Ok(run) => ValidatorResult::passed(format!(
                "{} fails against base ref {} as expected",
                test_file, base_ref
            ))
            .with_evidence(output_tail(&run.output)),
        };

        if let Ok(run) = &outcome.run {
            result = result
                .with_metric("exitCode", run.exit_code as f64)
                .with_metric("durationMs", run.duration_ms as f64);
        }

        if !outcome.restore_problems.is_empty() {
            for problem in &outcome.restore_problems {
                result.push_evidence(format!("restore failed: {}", problem));
            }
            result.message = format!(
                "{} (project state could not be fully restored)",
                result.message
            );
            result = result.into_failed();
        }

        let mut details = result.details.take().unwrap_or_else(|| json!({}));
        details["isolation"] = json!(outcome.isolation.as_str());
        result.with_details(details)
    }
}

#[async_trait]
impl Validator for TestFailsBeforeImplementation {
    fn code(&self) -> &'static str {
        codes::TEST_FAILS_BEFORE_IMPLEMENTATION
    }

    fn gate(&self) -> GateId {
        GateId::Contract
    }

    fn order(&self) -> u32 {
        8
    }

    fn is_hard_block(&self) -> bool {
        true
    }

    fn is_locked(&self) -> bool {
        true
    }

    fn description(&self) -> &'static str {
        "Test fails against the base ref"
    }

    async fn execute(&self, ctx: &ValidationContext) -> ServiceResult<ValidatorResult> {
        let Some(base_ref) = ctx.base_ref() else {
            return Ok(ValidatorResult::skipped("No base ref provided"));
        };
        let Some(test_file) = ctx.test_file() else {
            return Ok(ValidatorResult::skipped("No test file provided"));
        };

        let content = match tokio::fs::read(ctx.project_file(test_file)).await {
            Ok(content) => content,
            Err(err) => {
                return Ok(ValidatorResult::failed(format!(
                    "Test file {} could not be read: {}",
                    test_file, err
                )))
            }
        };

        let requested = RedPhaseIsolation::from_config(ctx.config_value(keys::RED_PHASE_ISOLATION));
        let outcome = match (requested, &ctx.services.sandbox) {
            (RedPhaseIsolation::Sandbox, Some(provider)) => {
                match Self::run_in_sandbox(ctx, provider, base_ref, test_file, &content).await {
                    Ok(outcome) if matches!(outcome.run, Err(ServiceError::Unsupported(_))) => {
                        ctx.services.log.warn(
                            "Test runner cannot run inside a sandbox; running in place",
                            None,
                        );
                        Self::run_in_place(ctx, base_ref, test_file, &content).await?
                    }
                    Ok(outcome) => outcome,
                    Err(failed) => return Ok(failed),
                }
            }
            (RedPhaseIsolation::Sandbox, None) => {
                ctx.services.log.warn(
                    "Sandbox isolation requested but no sandbox provider attached; running in place",
                    None,
                );
                Self::run_in_place(ctx, base_ref, test_file, &content).await?
            }
            (RedPhaseIsolation::InPlace, _) => {
                Self::run_in_place(ctx, base_ref, test_file, &content).await?
            }
        };

        ctx.services.log.info(
            "Red phase check finished",
            Some(&json!({
                "testFile": test_file,
                "baseRef": base_ref,
                "isolation": outcome.isolation.as_str(),
            })),
        );
        Ok(Self::judge(outcome, base_ref, test_file))
    }
}

async fn write_file(path: &Path, content: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, content).await
}

/// Where red-phase sandboxes are created: the configured base dir, or
/// `<project>/.gatekeeper/sandboxes`.
fn sandbox_root(ctx: &ValidationContext) -> PathBuf {
    match ctx.config_value(keys::SANDBOX_BASE_DIR).map(str::trim) {
        Some(dir) if !dir.is_empty() => ctx.project_path().join(dir),
        _ => ctx.project_path().join(".gatekeeper").join("sandboxes"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks::{MockGit, MockSandbox, MockServices, MockTestRunner};
    use crate::services::TestRunner;
    use crate::traits::execute_guarded;
    use gatekeeper_types::{Manifest, ValidatorStatus};

    const TEST_FILE: &str = "src/login.test.ts";
    const TEST_BODY: &str = "it('logs in', () => expect(login()).toBe(true));\n";

    fn project() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("src")).unwrap();
        std::fs::write(dir.path().join(TEST_FILE), TEST_BODY).unwrap();
        dir
    }

    fn mocks(git: MockGit, runner: impl FnOnce(Arc<MockGit>) -> MockTestRunner) -> MockServices {
        let git = Arc::new(git);
        let mut mocks = MockServices::new();
        mocks.test_runner = Arc::new(runner(git.clone()));
        mocks.git = git;
        mocks
    }

    fn context(dir: &Path, mocks: &MockServices) -> ValidationContext {
        ValidationContext::builder(dir, mocks.services())
            .refs("base", "feature")
            .manifest(Manifest::new(TEST_FILE))
            .build()
    }

    #[tokio::test]
    async fn passing_on_base_violates_the_tdd_invariant() {
        let dir = project();
        let mocks = mocks(MockGit::new("feature").dirty(), |git| {
            MockTestRunner::new()
                .observing(git)
                .single(TestRunResult::passing())
        });

        let result = TestFailsBeforeImplementation
            .execute(&context(dir.path(), &mocks))
            .await
            .unwrap();

        assert!(result.is_failed());
        assert!(result.message.contains("immutable TDD invariant"));
        assert_eq!(mocks.test_runner.calls(), vec![format!("single {} @ base", TEST_FILE)]);
        assert_eq!(
            mocks.git.calls(),
            vec!["current_ref", "stash", "checkout base", "checkout feature", "stash_pop"]
        );
        assert_eq!(mocks.git.current(), "feature");
        assert!(mocks.git.is_dirty());
    }

    #[tokio::test]
    async fn failing_on_base_passes() {
        let dir = project();
        let mocks = mocks(MockGit::new("feature"), |git| {
            MockTestRunner::new()
                .observing(git)
                .single(TestRunResult::failing("login is not defined"))
        });

        let result = TestFailsBeforeImplementation
            .execute(&context(dir.path(), &mocks))
            .await
            .unwrap();

        assert_eq!(result.status(), ValidatorStatus::Passed);
        assert!(result.evidence.unwrap().contains("login is not defined"));
        // Clean tree: nothing stashed, nothing popped.
        assert!(!mocks.git.calls().contains(&"stash_pop".to_string()));
        assert_eq!(mocks.git.current(), "feature");
        let on_disk = std::fs::read_to_string(dir.path().join(TEST_FILE)).unwrap();
        assert_eq!(on_disk, TEST_BODY);
    }

    #[tokio::test]
    async fn runner_errors_still_restore_state() {
        let dir = project();
        let mocks = mocks(MockGit::new("feature").dirty(), |_| {
            MockTestRunner::new().erroring("jest not installed")
        });

        let result = TestFailsBeforeImplementation
            .execute(&context(dir.path(), &mocks))
            .await
            .unwrap();

        assert!(result.is_failed());
        assert!(result.message.contains("jest not installed"));
        assert_eq!(mocks.git.current(), "feature");
        assert_eq!(mocks.git.stash_depth(), 0);
    }

    struct PanickingRunner;

    #[async_trait]
    impl TestRunner for PanickingRunner {
        async fn run_single_test(&self, _path: &str) -> ServiceResult<TestRunResult> {
            panic!("runner crashed");
        }
        async fn run_all_tests(&self) -> ServiceResult<TestRunResult> {
            Ok(TestRunResult::passing())
        }
    }

    #[tokio::test]
    async fn panics_still_restore_state() {
        let dir = project();
        let git = Arc::new(MockGit::new("feature").dirty());
        let mocks = MockServices {
            git: git.clone(),
            ..MockServices::new()
        };
        let mut services = mocks.services();
        services.test_runner = Arc::new(PanickingRunner);
        let ctx = ValidationContext::builder(dir.path(), services)
            .refs("base", "feature")
            .test_file(TEST_FILE)
            .build();

        let result = execute_guarded(&TestFailsBeforeImplementation, &ctx).await;

        assert!(result.is_failed());
        assert!(result.message.contains("runner crashed"));
        assert_eq!(git.current(), "feature");
        assert_eq!(git.stash_depth(), 0);
        assert!(git.calls().ends_with(&["checkout feature".to_string(), "stash_pop".to_string()]));
    }

    #[tokio::test]
    async fn restore_failures_force_failed() {
        let dir = project();
        let mocks = mocks(MockGit::new("feature").failing_checkout("feature"), |_| {
            MockTestRunner::new().single(TestRunResult::failing("red"))
        });

        let result = TestFailsBeforeImplementation
            .execute(&context(dir.path(), &mocks))
            .await
            .unwrap();

        assert!(result.is_failed());
        assert!(result.evidence.unwrap().contains("restore failed: checkout feature"));
    }

    #[tokio::test]
    async fn missing_inputs_skip() {
        let dir = project();
        let mocks = MockServices::new();
        let ctx = ValidationContext::builder(dir.path(), mocks.services())
            .test_file(TEST_FILE)
            .build();
        let result = TestFailsBeforeImplementation.execute(&ctx).await.unwrap();
        assert_eq!(result.status(), ValidatorStatus::Skipped);

        let ctx = ValidationContext::builder(dir.path(), mocks.services())
            .refs("base", "feature")
            .build();
        let result = TestFailsBeforeImplementation.execute(&ctx).await.unwrap();
        assert_eq!(result.status(), ValidatorStatus::Skipped);
        assert!(mocks.git.calls().is_empty());
    }

    #[tokio::test]
    async fn unreadable_test_file_fails_without_touching_git() {
        let dir = tempfile::tempdir().unwrap();
        let mocks = MockServices::new();
        let result = TestFailsBeforeImplementation
            .execute(&context(dir.path(), &mocks))
            .await
            .unwrap();
        assert!(result.is_failed());
        assert!(mocks.git.calls().is_empty());
    }

    #[tokio::test]
    async fn sandbox_isolation_leaves_the_checkout_alone() {
        let dir = project();
        let mocks = MockServices::new()
            .sandbox(MockSandbox::new())
            .test_runner(MockTestRunner::new().single(TestRunResult::failing("red")));
        let ctx = ValidationContext::builder(dir.path(), mocks.services())
            .refs("base", "feature")
            .test_file(TEST_FILE)
            .config(keys::RED_PHASE_ISOLATION, "sandbox")
            .build();

        let result = TestFailsBeforeImplementation.execute(&ctx).await.unwrap();

        assert!(result.is_passed());
        assert_eq!(result.details_field("isolation").unwrap(), "sandbox");
        assert!(mocks.git.calls().is_empty());
        let sandbox = mocks.sandbox.as_ref().unwrap();
        let calls = sandbox.calls();
        assert_eq!(calls[0], "create base");
        assert!(calls[1].starts_with("cleanup"));
        let workdir = sandbox_root(&ctx).join("sandbox-base");
        assert_eq!(
            mocks.test_runner.calls(),
            vec![format!("single {} in {}", TEST_FILE, workdir.display())]
        );
        assert!(!workdir.exists());
    }

    #[tokio::test]
    async fn failed_sandbox_does_not_run_the_test() {
        let dir = project();
        let mocks = MockServices::new().sandbox(MockSandbox::failing("worktree add failed"));
        let ctx = ValidationContext::builder(dir.path(), mocks.services())
            .refs("base", "feature")
            .test_file(TEST_FILE)
            .config(keys::RED_PHASE_ISOLATION, "sandbox")
            .build();

        let result = TestFailsBeforeImplementation.execute(&ctx).await.unwrap();

        assert!(result.is_failed());
        assert!(result.evidence.unwrap().contains("worktree add failed"));
        assert!(mocks.test_runner.calls().is_empty());
    }

    #[tokio::test]
    async fn configured_sandbox_base_dir_is_used() {
        let dir = project();
        let boxes = tempfile::tempdir().unwrap();
        let mocks = MockServices::new()
            .sandbox(MockSandbox::new())
            .test_runner(MockTestRunner::new().single(TestRunResult::failing("red")));
        let ctx = ValidationContext::builder(dir.path(), mocks.services())
            .refs("base", "feature")
            .test_file(TEST_FILE)
            .config(keys::RED_PHASE_ISOLATION, "sandbox")
            .config(keys::SANDBOX_BASE_DIR, boxes.path().to_string_lossy())
            .build();

        let result = TestFailsBeforeImplementation.execute(&ctx).await.unwrap();

        assert!(result.is_passed());
        let workdir = boxes.path().join("sandbox-base");
        assert_eq!(
            mocks.test_runner.calls(),
            vec![format!("single {} in {}", TEST_FILE, workdir.display())]
        );
        assert!(!dir.path().join(".gatekeeper").exists());
    }

    /// Only knows how to run tests in the project it was built for.
    struct FixedDirRunner {
        inner: MockTestRunner,
    }

    #[async_trait]
    impl TestRunner for FixedDirRunner {
        async fn run_single_test(&self, path: &str) -> ServiceResult<TestRunResult> {
            self.inner.run_single_test(path).await
        }
        async fn run_all_tests(&self) -> ServiceResult<TestRunResult> {
            self.inner.run_all_tests().await
        }
    }

    #[tokio::test]
    async fn runner_without_sandbox_support_falls_back_to_in_place() {
        let dir = project();
        let git = Arc::new(MockGit::new("feature"));
        let runner = Arc::new(FixedDirRunner {
            inner: MockTestRunner::new()
                .observing(git.clone())
                .single(TestRunResult::passing()),
        });
        let mocks = MockServices {
            git: git.clone(),
            ..MockServices::new()
        }
        .sandbox(MockSandbox::new());
        let mut services = mocks.services();
        services.test_runner = runner.clone() as Arc<dyn TestRunner>;
        let ctx = ValidationContext::builder(dir.path(), services)
            .refs("base", "feature")
            .test_file(TEST_FILE)
            .config(keys::RED_PHASE_ISOLATION, "sandbox")
            .build();

        let result = TestFailsBeforeImplementation.execute(&ctx).await.unwrap();

        // The test ran on the base ref in place, and passing there is a violation.
        assert!(result.is_failed());
        assert!(result.message.contains("immutable TDD invariant"));
        assert_eq!(result.details_field("isolation").unwrap(), "in_place");
        assert_eq!(runner.inner.calls(), vec![format!("single {} @ base", TEST_FILE)]);
        assert_eq!(git.current(), "feature");
    }

    #[tokio::test]
    async fn default_sandboxed_run_is_unsupported() {
        let runner = FixedDirRunner {
            inner: MockTestRunner::new(),
        };
        let err = runner
            .run_single_test_in(Path::new("/elsewhere"), TEST_FILE)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Unsupported(_)));
        assert!(runner.inner.calls().is_empty());
    }

    #[test]
    fn isolation_parsing() {
        assert_eq!(RedPhaseIsolation::from_config(Some(" Sandbox ")), RedPhaseIsolation::Sandbox);
        assert_eq!(RedPhaseIsolation::from_config(Some("in_place")), RedPhaseIsolation::InPlace);
        assert_eq!(RedPhaseIsolation::from_config(None), RedPhaseIsolation::InPlace);
    }
}
