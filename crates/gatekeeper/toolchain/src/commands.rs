//! Test runner, compiler, lint and build capabilities driven by shell
//! command templates.
//!
//! Templates may use `{file}` (one path) and `{files}` (space separated
//! paths); both are shell-quoted before substitution.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;

use async_trait::async_trait;
use gatekeeper_engine::{BuildService, CompilerService, LintService, TestRunner};
use gatekeeper_types::{BuildResult, CompileResult, LintResult, ServiceResult, TestRunResult};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::shell::{render, run_shell};

/// Command templates for the project's toolchain.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommandTemplates {
    pub test_single: String,
    pub test_all: String,
    pub compile: String,
    pub lint: String,
    pub build: String,
    pub timeout_secs: u64,
}

impl Default for CommandTemplates {
    fn default() -> Self {
        Self {
            test_single: "npx vitest run {file}".to_string(),
            test_all: "npx vitest run".to_string(),
            compile: "npx tsc --noEmit {file}".to_string(),
            lint: "npx eslint {files}".to_string(),
            build: "npm run build".to_string(),
            timeout_secs: 600,
        }
    }
}

impl CommandTemplates {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }
}

/// Runs the configured toolchain commands inside one project directory.
#[derive(Clone, Debug)]
pub struct CommandToolchain {
    root: PathBuf,
    templates: CommandTemplates,
}

impl CommandToolchain {
    pub fn new(root: impl Into<PathBuf>, templates: CommandTemplates) -> Self {
        Self {
            root: root.into(),
            templates,
        }
    }

    pub fn templates(&self) -> &CommandTemplates {
        &self.templates
    }

    async fn run_test(&self, workdir: &Path, command: String) -> ServiceResult<TestRunResult> {
        let out = run_shell(&command, workdir, self.templates.timeout()).await?;
        Ok(TestRunResult {
            passed: out.success(),
            exit_code: out.exit_code,
            output: out.combined(),
            duration_ms: out.duration_ms,
        })
    }
}

fn error_line_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(?im)^.*\berror\b.*$").expect("error line pattern is valid"))
}

fn count_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)\b(\d+)\s+(errors?|warnings?)\b").expect("count pattern is valid")
    })
}

/// Lines of compiler output that mention an error.
pub fn error_lines(output: &str) -> Vec<String> {
    error_line_pattern()
        .find_iter(output)
        .map(|m| m.as_str().trim().to_string())
        .filter(|l| !l.is_empty())
        .collect()
}

/// `(errors, warnings)` from a linter summary such as
/// `✖ 3 problems (1 error, 2 warnings)`. The last summary wins.
pub fn lint_counts(output: &str) -> (u32, u32) {
    let mut errors = None;
    let mut warnings = None;
    for caps in count_pattern().captures_iter(output) {
        let n: u32 = caps[1].parse().unwrap_or(0);
        if caps[2].to_ascii_lowercase().starts_with("error") {
            errors = Some(n);
        } else {
            warnings = Some(n);
        }
    }
    (errors.unwrap_or(0), warnings.unwrap_or(0))
}

#[async_trait]
impl TestRunner for CommandToolchain {
    async fn run_single_test(&self, path: &str) -> ServiceResult<TestRunResult> {
        self.run_single_test_in(&self.root, path).await
    }

    async fn run_single_test_in(&self, workdir: &Path, path: &str) -> ServiceResult<TestRunResult> {
        let command = render(&self.templates.test_single, Some(path), &[path.to_string()]);
        self.run_test(workdir, command).await
    }

    async fn run_all_tests(&self) -> ServiceResult<TestRunResult> {
        self.run_test(&self.root, render(&self.templates.test_all, None, &[]))
            .await
    }
}

#[async_trait]
impl CompilerService for CommandToolchain {
    async fn compile(&self, path: &str) -> ServiceResult<CompileResult> {
        let command = render(&self.templates.compile, Some(path), &[path.to_string()]);
        let out = run_shell(&command, &self.root, self.templates.timeout()).await?;
        let output = out.combined();
        let mut errors = Vec::new();
        if !out.success() {
            errors = error_lines(&output);
            if errors.is_empty() {
                errors.push(format!("`{}` exited with code {}", command, out.exit_code));
            }
        }
        Ok(CompileResult {
            success: out.success(),
            errors,
            output,
        })
    }
}

#[async_trait]
impl LintService for CommandToolchain {
    async fn lint(&self, files: &[String]) -> ServiceResult<LintResult> {
        if files.is_empty() {
            return Ok(LintResult {
                success: true,
                ..Default::default()
            });
        }
        let command = render(&self.templates.lint, files.first().map(String::as_str), files);
        let out = run_shell(&command, &self.root, self.templates.timeout()).await?;
        let output = out.combined();
        let (mut error_count, warning_count) = lint_counts(&output);
        if !out.success() && error_count == 0 {
            error_count = 1;
        }
        Ok(LintResult {
            success: out.success(),
            error_count,
            warning_count,
            output,
        })
    }
}

#[async_trait]
impl BuildService for CommandToolchain {
    async fn build(&self) -> ServiceResult<BuildResult> {
        let command = render(&self.templates.build, None, &[]);
        let out = run_shell(&command, &self.root, self.templates.timeout()).await?;
        Ok(BuildResult {
            success: out.success(),
            exit_code: out.exit_code,
            output: out.combined(),
        })
    }
}
