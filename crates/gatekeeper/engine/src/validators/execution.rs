//! Gate 2: the implementation stays in scope, compiles and makes the test pass.

use async_trait::async_trait;
use gatekeeper_types::{is_test_file, normalize_path, GateId, ServiceResult, ValidatorResult};
use serde_json::json;

use super::{bullet_list, codes, output_tail};
use crate::context::ValidationContext;
use crate::traits::Validator;

/// Every changed file is declared in the manifest.
pub struct DiffScopeEnforcement;

#[async_trait]
impl Validator for DiffScopeEnforcement {
    fn code(&self) -> &'static str {
        codes::DIFF_SCOPE_ENFORCEMENT
    }

    fn gate(&self) -> GateId {
        GateId::Execution
    }

    fn order(&self) -> u32 {
        1
    }

    fn is_hard_block(&self) -> bool {
        true
    }

    fn description(&self) -> &'static str {
        "Diff stays within the manifest"
    }

    async fn execute(&self, ctx: &ValidationContext) -> ServiceResult<ValidatorResult> {
        let Some(manifest) = &ctx.manifest else {
            return Ok(ValidatorResult::skipped("No manifest provided"));
        };

        let changed = ctx.services.git.diff_files().await?;
        let out_of_scope: Vec<&String> = changed
            .iter()
            .filter(|path| {
                !manifest.declares(path)
                    && ctx
                        .test_file()
                        .map_or(true, |t| normalize_path(t) != normalize_path(path))
            })
            .collect();

        let result = if out_of_scope.is_empty() {
            ValidatorResult::passed(format!(
                "All {} changed file(s) are declared in the manifest",
                changed.len()
            ))
        } else {
            ValidatorResult::failed(format!(
                "{} changed file(s) are not declared in the manifest",
                out_of_scope.len()
            ))
            .with_evidence(bullet_list(&out_of_scope))
            .with_details(json!({ "outOfScope": out_of_scope }))
        };
        Ok(result.with_metric("changedFiles", changed.len() as f64))
    }
}

/// Only the task's own test file may change among test files.
pub struct TestReadOnlyEnforcement;

#[async_trait]
impl Validator for TestReadOnlyEnforcement {
    fn code(&self) -> &'static str {
        codes::TEST_READ_ONLY_ENFORCEMENT
    }

    fn gate(&self) -> GateId {
        GateId::Execution
    }

    fn order(&self) -> u32 {
        2
    }

    fn is_hard_block(&self) -> bool {
        true
    }

    fn description(&self) -> &'static str {
        "Existing tests are not modified"
    }

    async fn execute(&self, ctx: &ValidationContext) -> ServiceResult<ValidatorResult> {
        let Some(test_file) = ctx.test_file() else {
            return Ok(ValidatorResult::skipped("No test file provided"));
        };
        let own = normalize_path(test_file);

        let changed = ctx.services.git.diff_files().await?;
        let touched: Vec<&String> = changed
            .iter()
            .filter(|path| is_test_file(path) && normalize_path(path) != own)
            .collect();

        if touched.is_empty() {
            return Ok(ValidatorResult::passed("No other test files were modified"));
        }
        Ok(ValidatorResult::failed(format!(
            "{} existing test file(s) were modified",
            touched.len()
        ))
        .with_evidence(bullet_list(&touched))
        .with_details(json!({ "modifiedTests": touched })))
    }
}

/// The task's test passes against the implementation.
pub struct TaskTestPasses;

#[async_trait]
impl Validator for TaskTestPasses {
    fn code(&self) -> &'static str {
        codes::TASK_TEST_PASSES
    }

    fn gate(&self) -> GateId {
        GateId::Execution
    }

    fn order(&self) -> u32 {
        3
    }

    fn is_hard_block(&self) -> bool {
        true
    }

    fn description(&self) -> &'static str {
        "Task test passes"
    }

    async fn execute(&self, ctx: &ValidationContext) -> ServiceResult<ValidatorResult> {
        let Some(test_file) = ctx.test_file() else {
            return Ok(ValidatorResult::skipped("No test file provided"));
        };

        let run = ctx.services.test_runner.run_single_test(test_file).await?;
        let result = if run.passed {
            ValidatorResult::passed(format!("{} passes", test_file))
        } else {
            ValidatorResult::failed(format!(
                "{} fails (exit code {})",
                test_file, run.exit_code
            ))
        };
        Ok(result
            .with_evidence(output_tail(&run.output))
            .with_metric("durationMs", run.duration_ms as f64))
    }
}

/// Every created or modified file compiles.
pub struct StrictCompilation;

#[async_trait]
impl Validator for StrictCompilation {
    fn code(&self) -> &'static str {
        codes::STRICT_COMPILATION
    }

    fn gate(&self) -> GateId {
        GateId::Execution
    }

    fn order(&self) -> u32 {
        4
    }

    fn is_hard_block(&self) -> bool {
        true
    }

    fn description(&self) -> &'static str {
        "Changed files compile without errors"
    }

    async fn execute(&self, ctx: &ValidationContext) -> ServiceResult<ValidatorResult> {
        let Some(manifest) = &ctx.manifest else {
            return Ok(ValidatorResult::skipped("No manifest provided"));
        };
        let files: Vec<&str> = manifest.writable_paths().collect();
        if files.is_empty() {
            return Ok(ValidatorResult::skipped("Manifest has no files to compile"));
        }

        let mut failures = Vec::new();
        let mut error_count = 0usize;
        for file in &files {
            let compiled = ctx.services.compiler.compile(file).await?;
            if !compiled.success {
                error_count += compiled.errors.len().max(1);
                let errors = if compiled.errors.is_empty() {
                    output_tail(&compiled.output)
                } else {
                    compiled.errors.join("\n  ")
                };
                failures.push(format!("{}:\n  {}", file, errors));
            }
        }

        let result = if failures.is_empty() {
            ValidatorResult::passed(format!("{} file(s) compile cleanly", files.len()))
        } else {
            ValidatorResult::failed(format!(
                "{} of {} file(s) fail to compile",
                failures.len(),
                files.len()
            ))
            .with_evidence(failures.join("\n"))
        };
        Ok(result
            .with_metric("files", files.len() as f64)
            .with_metric("errors", error_count as f64))
    }
}

/// Lint the changed files. Errors fail, warnings only warn.
pub struct StyleConsistencyLint;

#[async_trait]
impl Validator for StyleConsistencyLint {
    fn code(&self) -> &'static str {
        codes::STYLE_CONSISTENCY_LINT
    }

    fn gate(&self) -> GateId {
        GateId::Execution
    }

    fn order(&self) -> u32 {
        5
    }

    fn is_hard_block(&self) -> bool {
        false
    }

    fn description(&self) -> &'static str {
        "Changed files follow the project's lint rules"
    }

    async fn execute(&self, ctx: &ValidationContext) -> ServiceResult<ValidatorResult> {
        let Some(manifest) = &ctx.manifest else {
            return Ok(ValidatorResult::skipped("No manifest provided"));
        };
        let mut files: Vec<String> = manifest.writable_paths().map(str::to_string).collect();
        if let Some(test_file) = ctx.test_file() {
            if !files.iter().any(|f| normalize_path(f) == normalize_path(test_file)) {
                files.push(test_file.to_string());
            }
        }

        let lint = ctx.services.lint.lint(&files).await?;
        let result = if lint.error_count > 0 {
            ValidatorResult::failed(format!(
                "Lint reported {} error(s) and {} warning(s)",
                lint.error_count, lint.warning_count
            ))
        } else if lint.warning_count > 0 {
            ValidatorResult::warning(format!("Lint reported {} warning(s)", lint.warning_count))
        } else {
            ValidatorResult::passed(format!("{} file(s) lint cleanly", files.len()))
        };
        let result = if lint.output.trim().is_empty() {
            result
        } else {
            result.with_evidence(output_tail(&lint.output))
        };
        Ok(result
            .with_metric("errors", lint.error_count as f64)
            .with_metric("warnings", lint.warning_count as f64))
    }
}
