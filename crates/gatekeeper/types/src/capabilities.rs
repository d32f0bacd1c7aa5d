//! Result shapes returned by the external capabilities (test runner,
//! compiler, lint, build, AST scanner).

use serde::{Deserialize, Serialize};

/// Outcome of running one test file or the whole suite.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestRunResult {
    pub passed: bool,
    pub exit_code: i32,
    pub output: String,
    pub duration_ms: u64,
}

impl TestRunResult {
    pub fn passing() -> Self {
        Self {
            passed: true,
            ..Default::default()
        }
    }

    pub fn failing(output: impl Into<String>) -> Self {
        Self {
            passed: false,
            exit_code: 1,
            output: output.into(),
            duration_ms: 0,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompileResult {
    pub success: bool,
    pub errors: Vec<String>,
    pub output: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LintResult {
    pub success: bool,
    pub error_count: u32,
    pub warning_count: u32,
    pub output: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildResult {
    pub success: bool,
    pub exit_code: i32,
    pub output: String,
}

/// A test declaration together with the comment lines directly above it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestBlock {
    pub name: String,
    /// 1-based line of the declaration
    pub start_line: usize,
    pub preceding_comments: Vec<String>,
}

/// Static summary of a parsed source file.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedFile {
    pub path: String,
    pub line_count: usize,
    pub test_count: usize,
    pub assertion_count: usize,
}

/// Outcome of creating an isolated checkout of a project at a ref.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SandboxResult {
    pub success: bool,
    pub sandbox_path: std::path::PathBuf,
    /// Whether the dependency directory was linked into the sandbox
    pub junction_created: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SandboxResult {
    pub fn failure(sandbox_path: std::path::PathBuf, error: impl Into<String>) -> Self {
        Self {
            success: false,
            sandbox_path,
            junction_created: false,
            error: Some(error.into()),
        }
    }
}
