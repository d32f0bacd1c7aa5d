//! Built-in validators, grouped by gate.

use std::sync::Arc;

use regex::Regex;

use crate::traits::Validator;

mod clause_coverage;
mod contract;
mod execution;
mod integrity;
mod red_phase;
mod sanitization;

pub use clause_coverage::{ContractClauseCoverage, TestClauseMappingValid};
pub use contract::{
    ContractSchemaValid, ImportRealityCheck, ManifestFileLock, TestHasAssertions, TestSyntaxValid,
};
pub use execution::{
    DiffScopeEnforcement, StrictCompilation, StyleConsistencyLint, TaskTestPasses,
    TestReadOnlyEnforcement,
};
pub use integrity::{FullRegressionPass, ProductionBuildPass};
pub use red_phase::{RedPhaseIsolation, TestFailsBeforeImplementation};
pub use sanitization::{
    DangerModeExplicit, SensitiveFilesLock, TaskClarityCheck, TaskScopeSize, TokenBudgetFit,
};

/// Stable validator codes.
pub mod codes {
    pub const TOKEN_BUDGET_FIT: &str = "TOKEN_BUDGET_FIT";
    pub const TASK_SCOPE_SIZE: &str = "TASK_SCOPE_SIZE";
    pub const TASK_CLARITY_CHECK: &str = "TASK_CLARITY_CHECK";
    pub const SENSITIVE_FILES_LOCK: &str = "SENSITIVE_FILES_LOCK";
    pub const DANGER_MODE_EXPLICIT: &str = "DANGER_MODE_EXPLICIT";

    pub const MANIFEST_FILE_LOCK: &str = "MANIFEST_FILE_LOCK";
    pub const CONTRACT_SCHEMA_VALID: &str = "CONTRACT_SCHEMA_VALID";
    pub const TEST_SYNTAX_VALID: &str = "TEST_SYNTAX_VALID";
    pub const TEST_HAS_ASSERTIONS: &str = "TEST_HAS_ASSERTIONS";
    pub const IMPORT_REALITY_CHECK: &str = "IMPORT_REALITY_CHECK";
    pub const TEST_CLAUSE_MAPPING_VALID: &str = "TEST_CLAUSE_MAPPING_VALID";
    pub const CONTRACT_CLAUSE_COVERAGE: &str = "CONTRACT_CLAUSE_COVERAGE";
    pub const TEST_FAILS_BEFORE_IMPLEMENTATION: &str = "TEST_FAILS_BEFORE_IMPLEMENTATION";

    pub const DIFF_SCOPE_ENFORCEMENT: &str = "DIFF_SCOPE_ENFORCEMENT";
    pub const TEST_READ_ONLY_ENFORCEMENT: &str = "TEST_READ_ONLY_ENFORCEMENT";
    pub const TASK_TEST_PASSES: &str = "TASK_TEST_PASSES";
    pub const STRICT_COMPILATION: &str = "STRICT_COMPILATION";
    pub const STYLE_CONSISTENCY_LINT: &str = "STYLE_CONSISTENCY_LINT";

    pub const FULL_REGRESSION_PASS: &str = "FULL_REGRESSION_PASS";
    pub const PRODUCTION_BUILD_PASS: &str = "PRODUCTION_BUILD_PASS";
}

/// Config map keys read by the built-in validators.
pub mod keys {
    pub const MAX_TOKEN_BUDGET: &str = "MAX_TOKEN_BUDGET";
    pub const MAX_MANIFEST_FILES: &str = "MAX_MANIFEST_FILES";
    pub const RED_PHASE_ISOLATION: &str = "RED_PHASE_ISOLATION";
    /// Directory red-phase sandboxes are created under; relative paths are
    /// taken from the project root
    pub const SANDBOX_BASE_DIR: &str = "SANDBOX_BASE_DIR";
}

/// Every built-in validator, gate by gate.
pub fn standard_catalog() -> Vec<Arc<dyn Validator>> {
    vec![
        Arc::new(TokenBudgetFit),
        Arc::new(TaskScopeSize),
        Arc::new(TaskClarityCheck),
        Arc::new(SensitiveFilesLock),
        Arc::new(DangerModeExplicit),
        Arc::new(ManifestFileLock),
        Arc::new(ContractSchemaValid),
        Arc::new(TestSyntaxValid),
        Arc::new(TestHasAssertions),
        Arc::new(ImportRealityCheck),
        Arc::new(TestClauseMappingValid),
        Arc::new(ContractClauseCoverage),
        Arc::new(TestFailsBeforeImplementation),
        Arc::new(DiffScopeEnforcement),
        Arc::new(TestReadOnlyEnforcement),
        Arc::new(TaskTestPasses),
        Arc::new(StrictCompilation),
        Arc::new(StyleConsistencyLint),
        Arc::new(FullRegressionPass),
        Arc::new(ProductionBuildPass),
    ]
}

const OUTPUT_TAIL_CHARS: usize = 2000;

/// Last part of a command's output, for evidence.
pub(crate) fn output_tail(output: &str) -> String {
    let trimmed = output.trim_end();
    let count = trimmed.chars().count();
    if count <= OUTPUT_TAIL_CHARS {
        return trimmed.to_string();
    }
    let tail: String = trimmed.chars().skip(count - OUTPUT_TAIL_CHARS).collect();
    format!("...{}", tail)
}

/// One bullet per item.
pub(crate) fn bullet_list<I, S>(items: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    items
        .into_iter()
        .map(|item| format!("- {}", item.as_ref()))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Translate a path glob into an anchored regex.
///
/// `**` spans directories, `*` and `?` stay within one path segment.
fn glob_to_regex(pattern: &str) -> Option<Regex> {
    let mut out = String::from("^");
    let chars: Vec<char> = pattern.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            '*' if chars.get(i + 1) == Some(&'*') => {
                if chars.get(i + 2) == Some(&'/') {
                    out.push_str("(?:.*/)?");
                    i += 3;
                } else {
                    out.push_str(".*");
                    i += 2;
                }
                continue;
            }
            '*' => out.push_str("[^/]*"),
            '?' => out.push_str("[^/]"),
            c => out.push_str(&regex::escape(&c.to_string())),
        }
        i += 1;
    }
    out.push('$');
    Regex::new(&out).ok()
}

/// Whether `path` matches a sensitive-file glob. Patterns without a `/` are
/// matched against the file name only.
pub(crate) fn glob_match(pattern: &str, path: &str) -> bool {
    let pattern = pattern.trim();
    if pattern.is_empty() {
        return false;
    }
    let subject = if pattern.contains('/') {
        path
    } else {
        path.rsplit('/').next().unwrap_or(path)
    };
    glob_to_regex(pattern).is_some_and(|re| re.is_match(subject))
}

#[cfg(test)]
mod tests {
    use super::*;
    use gatekeeper_types::GateId;
    use std::collections::HashSet;

    #[test]
    fn glob_matching() {
        assert!(glob_match("*", "foo"));
        assert!(glob_match("*.pem", "certs/server.pem"));
        assert!(glob_match(".env*", "config/.env.local"));
        assert!(glob_match("**/.credentials", "foo/bar/.credentials"));
        assert!(glob_match("**/.credentials", ".credentials"));
        assert!(glob_match("src/**", "src/lib/auth.ts"));
        assert!(glob_match("migrations/*.sql", "migrations/001.sql"));
        assert!(!glob_match("migrations/*.sql", "migrations/old/001.sql"));
        assert!(!glob_match("*.pem", "server.pem.txt"));
        assert!(!glob_match("", "anything"));
    }

    #[test]
    fn output_tail_keeps_the_end() {
        let long = "x".repeat(OUTPUT_TAIL_CHARS) + "END";
        let tail = output_tail(&long);
        assert!(tail.starts_with("..."));
        assert!(tail.ends_with("END"));
        assert_eq!(output_tail("short\n"), "short");
    }

    #[test]
    fn catalog_codes_are_unique_and_gates_are_covered() {
        let catalog = standard_catalog();
        let seen: HashSet<_> = catalog.iter().map(|v| v.code()).collect();
        assert_eq!(seen.len(), catalog.len());
        for gate in GateId::ALL {
            assert!(catalog.iter().any(|v| v.gate() == gate));
        }
        let red = catalog
            .iter()
            .find(|v| v.code() == codes::TEST_FAILS_BEFORE_IMPLEMENTATION)
            .unwrap();
        assert!(red.is_hard_block());
        assert!(red.is_locked());
    }
}
