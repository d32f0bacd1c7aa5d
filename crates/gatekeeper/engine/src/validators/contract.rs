//! Gate 1: structural checks on the manifest, the contract and the test file.
//!
//! Clause traceability lives in `clause_coverage`, the red phase in `red_phase`.

use async_trait::async_trait;
use gatekeeper_types::{normalize_path, FileAction, GateId, ServiceResult, ValidatorResult};
use serde_json::json;

use super::{bullet_list, codes, output_tail};
use crate::context::ValidationContext;
use crate::traits::Validator;

/// The manifest exists and is well formed.
pub struct ManifestFileLock;

#[async_trait]
impl Validator for ManifestFileLock {
    fn code(&self) -> &'static str {
        codes::MANIFEST_FILE_LOCK
    }

    fn gate(&self) -> GateId {
        GateId::Contract
    }

    fn order(&self) -> u32 {
        1
    }

    fn is_hard_block(&self) -> bool {
        true
    }

    fn description(&self) -> &'static str {
        "Manifest declares concrete files and a test file"
    }

    async fn execute(&self, ctx: &ValidationContext) -> ServiceResult<ValidatorResult> {
        let Some(manifest) = &ctx.manifest else {
            return Ok(ValidatorResult::failed("No manifest provided"));
        };

        let mut problems: Vec<String> = match manifest.validate() {
            Ok(()) => Vec::new(),
            Err(errors) => errors.iter().map(ToString::to_string).collect(),
        };

        if let Some(requested) = ctx.test_file_path.as_deref() {
            if !requested.trim().is_empty()
                && normalize_path(requested) != normalize_path(&manifest.test_file)
            {
                problems.push(format!(
                    "test file {} does not match manifest test file {}",
                    requested, manifest.test_file
                ));
            }
        }

        if problems.is_empty() {
            return Ok(ValidatorResult::passed(format!(
                "Manifest declares {} file(s) and test file {}",
                manifest.files.len(),
                manifest.test_file
            )));
        }
        Ok(ValidatorResult::failed(format!(
            "Manifest is invalid ({} problem(s))",
            problems.len()
        ))
        .with_evidence(bullet_list(&problems))
        .with_details(json!({ "problems": problems })))
    }
}

/// The contract parses and satisfies its structural invariants.
pub struct ContractSchemaValid;

#[async_trait]
impl Validator for ContractSchemaValid {
    fn code(&self) -> &'static str {
        codes::CONTRACT_SCHEMA_VALID
    }

    fn gate(&self) -> GateId {
        GateId::Contract
    }

    fn order(&self) -> u32 {
        2
    }

    fn is_hard_block(&self) -> bool {
        true
    }

    fn description(&self) -> &'static str {
        "Contract is well formed"
    }

    async fn execute(&self, ctx: &ValidationContext) -> ServiceResult<ValidatorResult> {
        if let Some(error) = &ctx.contract_parse_error {
            return Ok(ValidatorResult::failed("Contract could not be parsed")
                .with_evidence(error.clone()));
        }
        let Some(contract) = &ctx.contract else {
            return Ok(ValidatorResult::skipped("No contract provided"));
        };

        match contract.validate() {
            Ok(()) => Ok(ValidatorResult::passed(format!(
                "Contract '{}' declares {} clause(s) in {} mode",
                contract.slug,
                contract.clauses.len(),
                contract.mode
            ))
            .with_metric("clauses", contract.clauses.len() as f64)),
            Err(errors) => Ok(ValidatorResult::failed(format!(
                "Contract '{}' is invalid ({} problem(s))",
                contract.slug,
                errors.len()
            ))
            .with_evidence(bullet_list(errors.iter().map(ToString::to_string)))),
        }
    }
}

/// The test file compiles.
pub struct TestSyntaxValid;

#[async_trait]
impl Validator for TestSyntaxValid {
    fn code(&self) -> &'static str {
        codes::TEST_SYNTAX_VALID
    }

    fn gate(&self) -> GateId {
        GateId::Contract
    }

    fn order(&self) -> u32 {
        3
    }

    fn is_hard_block(&self) -> bool {
        true
    }

    fn description(&self) -> &'static str {
        "Test file compiles"
    }

    async fn execute(&self, ctx: &ValidationContext) -> ServiceResult<ValidatorResult> {
        let Some(test_file) = ctx.test_file() else {
            return Ok(ValidatorResult::skipped("No test file provided"));
        };

        let compiled = ctx.services.compiler.compile(test_file).await?;
        if compiled.success {
            return Ok(ValidatorResult::passed(format!("{} compiles", test_file)));
        }
        let evidence = if compiled.errors.is_empty() {
            output_tail(&compiled.output)
        } else {
            bullet_list(&compiled.errors)
        };
        Ok(ValidatorResult::failed(format!(
            "{} has {} syntax/type error(s)",
            test_file,
            compiled.errors.len()
        ))
        .with_evidence(evidence)
        .with_metric("errors", compiled.errors.len() as f64))
    }
}

/// The test file declares tests and asserts something.
pub struct TestHasAssertions;

#[async_trait]
impl Validator for TestHasAssertions {
    fn code(&self) -> &'static str {
        codes::TEST_HAS_ASSERTIONS
    }

    fn gate(&self) -> GateId {
        GateId::Contract
    }

    fn order(&self) -> u32 {
        4
    }

    fn is_hard_block(&self) -> bool {
        false
    }

    fn description(&self) -> &'static str {
        "Test file contains assertions"
    }

    async fn execute(&self, ctx: &ValidationContext) -> ServiceResult<ValidatorResult> {
        let Some(test_file) = ctx.test_file() else {
            return Ok(ValidatorResult::skipped("No test file provided"));
        };

        let parsed = ctx.services.ast.parse_file(test_file).await?;
        let result = if parsed.test_count == 0 {
            ValidatorResult::failed(format!("{} declares no tests", test_file))
        } else if parsed.assertion_count == 0 {
            ValidatorResult::failed(format!(
                "{} declares {} test(s) but no assertions",
                test_file, parsed.test_count
            ))
        } else {
            ValidatorResult::passed(format!(
                "{} has {} assertion(s) across {} test(s)",
                test_file, parsed.assertion_count, parsed.test_count
            ))
        };
        Ok(result
            .with_metric("tests", parsed.test_count as f64)
            .with_metric("assertions", parsed.assertion_count as f64))
    }
}

const IMPORT_EXTENSIONS: [&str; 4] = [".ts", ".tsx", ".js", ".jsx"];

/// Relative imports of the test file point at real (or declared) files.
pub struct ImportRealityCheck;

impl ImportRealityCheck {
    /// Resolve `specifier` against the directory of `from`, without touching
    /// the filesystem. `None` when it climbs above the project root.
    fn join_relative(from: &str, specifier: &str) -> Option<String> {
        let from = normalize_path(from);
        let mut segments: Vec<&str> = from.split('/').collect();
        segments.pop();
        for part in specifier.split('/') {
            match part {
                "" | "." => {}
                ".." => {
                    segments.pop()?;
                }
                other => segments.push(other),
            }
        }
        Some(segments.join("/"))
    }

    fn candidates(base: &str) -> Vec<String> {
        let mut out = vec![base.to_string()];
        out.extend(IMPORT_EXTENSIONS.iter().map(|ext| format!("{}{}", base, ext)));
        out.extend(
            IMPORT_EXTENSIONS
                .iter()
                .map(|ext| format!("{}/index{}", base, ext)),
        );
        out
    }

    async fn resolves(ctx: &ValidationContext, base: &str) -> bool {
        for candidate in Self::candidates(base) {
            let declared = ctx
                .manifest
                .as_ref()
                .and_then(|m| m.action_for(&candidate))
                == Some(FileAction::Create);
            if declared {
                return true;
            }
            if tokio::fs::try_exists(ctx.project_file(&candidate))
                .await
                .unwrap_or(false)
            {
                return true;
            }
        }
        false
    }
}

#[async_trait]
impl Validator for ImportRealityCheck {
    fn code(&self) -> &'static str {
        codes::IMPORT_REALITY_CHECK
    }

    fn gate(&self) -> GateId {
        GateId::Contract
    }

    fn order(&self) -> u32 {
        5
    }

    fn is_hard_block(&self) -> bool {
        false
    }

    fn description(&self) -> &'static str {
        "Test imports resolve"
    }

    async fn execute(&self, ctx: &ValidationContext) -> ServiceResult<ValidatorResult> {
        let Some(test_file) = ctx.test_file() else {
            return Ok(ValidatorResult::skipped("No test file provided"));
        };

        let imports = ctx.services.ast.imports(test_file).await?;
        let relative: Vec<&String> = imports
            .iter()
            .filter(|i| i.starts_with("./") || i.starts_with("../"))
            .collect();

        let mut unresolved = Vec::new();
        for specifier in &relative {
            let resolved = match Self::join_relative(test_file, specifier) {
                Some(base) => Self::resolves(ctx, &base).await,
                None => false,
            };
            if !resolved {
                unresolved.push(specifier.to_string());
            }
        }

        let result = if unresolved.is_empty() {
            ValidatorResult::passed(format!(
                "All {} relative import(s) resolve",
                relative.len()
            ))
        } else {
            ValidatorResult::failed(format!(
                "{} import(s) in {} do not resolve",
                unresolved.len(),
                test_file
            ))
            .with_evidence(bullet_list(&unresolved))
            .with_details(json!({ "unresolved": unresolved }))
        };
        Ok(result
            .with_metric("imports", imports.len() as f64)
            .with_metric("relative", relative.len() as f64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks::{MockAst, MockCompiler, MockServices};
    use gatekeeper_types::{Clause, Contract, ContractMode, Manifest, ParsedFile, ValidatorStatus};

    fn manifest() -> Manifest {
        Manifest::new("src/login.test.ts").with_file("src/login.ts", FileAction::Create)
    }

    #[tokio::test]
    async fn missing_manifest_is_a_failure() {
        let ctx = ValidationContext::builder("/repo", MockServices::new().services()).build();
        assert!(ManifestFileLock.execute(&ctx).await.unwrap().is_failed());
    }

    #[tokio::test]
    async fn glob_manifest_paths_are_rejected() {
        let bad = Manifest::new("src/login.ts").with_file("src/**/*.ts", FileAction::Modify);
        let ctx = ValidationContext::builder("/repo", MockServices::new().services())
            .manifest(bad)
            .build();
        let result = ManifestFileLock.execute(&ctx).await.unwrap();
        assert!(result.is_failed());
        let evidence = result.evidence.unwrap();
        assert!(evidence.contains("glob"));
        assert!(evidence.contains("src/login.ts"));
    }

    #[tokio::test]
    async fn test_file_must_match_manifest() {
        let ctx = ValidationContext::builder("/repo", MockServices::new().services())
            .manifest(manifest())
            .test_file("./src/login.test.ts")
            .build();
        assert!(ManifestFileLock.execute(&ctx).await.unwrap().is_passed());

        let ctx = ValidationContext::builder("/repo", MockServices::new().services())
            .manifest(manifest())
            .test_file("src/other.test.ts")
            .build();
        assert!(ManifestFileLock.execute(&ctx).await.unwrap().is_failed());
    }

    #[tokio::test]
    async fn contract_schema_outcomes() {
        let services = MockServices::new().services();
        let ctx = ValidationContext::builder("/repo", services.clone()).build();
        let result = ContractSchemaValid.execute(&ctx).await.unwrap();
        assert_eq!(result.status(), ValidatorStatus::Skipped);

        let ctx = ValidationContext::builder("/repo", services.clone())
            .contract_json("{\"slug\": ")
            .build();
        assert!(ContractSchemaValid.execute(&ctx).await.unwrap().is_failed());

        let dup = Contract::new("login", ContractMode::Strict)
            .with_clause(Clause::must("CL-1", "a"))
            .with_clause(Clause::must("CL-1", "b"));
        let ctx = ValidationContext::builder("/repo", services.clone())
            .contract(dup)
            .build();
        let result = ContractSchemaValid.execute(&ctx).await.unwrap();
        assert!(result.is_failed());
        assert!(result.evidence.unwrap().contains("CL-1"));

        let ok = Contract::new("login", ContractMode::Creative).with_clause(Clause::must("CL-1", "a"));
        let ctx = ValidationContext::builder("/repo", services).contract(ok).build();
        assert!(ContractSchemaValid.execute(&ctx).await.unwrap().is_passed());
    }

    #[tokio::test]
    async fn syntax_errors_fail() {
        let mocks = MockServices::new()
            .compiler(MockCompiler::new().failing("src/login.test.ts", &["TS1005: ';' expected"]));
        let ctx = ValidationContext::builder("/repo", mocks.services())
            .manifest(manifest())
            .build();
        let result = TestSyntaxValid.execute(&ctx).await.unwrap();
        assert!(result.is_failed());
        assert!(result.evidence.unwrap().contains("TS1005"));
        assert_eq!(mocks.compiler.calls(), vec!["src/login.test.ts".to_string()]);
    }

    #[tokio::test]
    async fn assertions_are_required() {
        let parsed = |assertions| ParsedFile {
            path: "src/login.test.ts".into(),
            line_count: 20,
            test_count: 2,
            assertion_count: assertions,
        };
        let mocks = MockServices::new().ast(MockAst::new().with_parsed(parsed(0)));
        let ctx = ValidationContext::builder("/repo", mocks.services())
            .manifest(manifest())
            .build();
        assert!(TestHasAssertions.execute(&ctx).await.unwrap().is_failed());

        let mocks = MockServices::new().ast(MockAst::new().with_parsed(parsed(3)));
        let ctx = ValidationContext::builder("/repo", mocks.services())
            .manifest(manifest())
            .build();
        assert!(TestHasAssertions.execute(&ctx).await.unwrap().is_passed());
    }

    #[test]
    fn relative_specifiers_are_joined() {
        assert_eq!(
            ImportRealityCheck::join_relative("src/auth/login.test.ts", "./login").as_deref(),
            Some("src/auth/login")
        );
        assert_eq!(
            ImportRealityCheck::join_relative("src/auth/login.test.ts", "../util/x").as_deref(),
            Some("src/util/x")
        );
        assert_eq!(ImportRealityCheck::join_relative("a.test.ts", "../../x"), None);
    }

    #[tokio::test]
    async fn imports_resolve_on_disk_or_in_manifest() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("src/util")).unwrap();
        std::fs::write(dir.path().join("src/util/index.ts"), "export {}").unwrap();

        let ast = MockAst::new().with_imports(
            "src/login.test.ts",
            &["vitest", "./login", "./util", "./missing"],
        );
        let mocks = MockServices::new().ast(ast);
        let ctx = ValidationContext::builder(dir.path(), mocks.services())
            .manifest(manifest())
            .build();

        let result = ImportRealityCheck.execute(&ctx).await.unwrap();
        assert!(result.is_failed());
        assert_eq!(result.details_field("unresolved").unwrap(), &json!(["./missing"]));
        assert_eq!(result.metrics.unwrap()["relative"], 3.0);
    }
}
