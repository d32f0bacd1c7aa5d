//! Gate 0: checks on the task itself, before any contract or code is looked at.

use async_trait::async_trait;
use gatekeeper_types::{GateId, ServiceResult, ValidatorResult};
use regex::RegexBuilder;
use serde_json::json;

use super::{bullet_list, codes, glob_match, keys};
use crate::context::ValidationContext;
use crate::traits::Validator;

const DEFAULT_MAX_TOKEN_BUDGET: usize = 100_000;
const DEFAULT_MAX_MANIFEST_FILES: usize = 10;
const TOKEN_WARNING_RATIO: f64 = 0.8;

/// Prompt size against `MAX_TOKEN_BUDGET`.
pub struct TokenBudgetFit;

#[async_trait]
impl Validator for TokenBudgetFit {
    fn code(&self) -> &'static str {
        codes::TOKEN_BUDGET_FIT
    }

    fn gate(&self) -> GateId {
        GateId::Sanitization
    }

    fn order(&self) -> u32 {
        1
    }

    fn is_hard_block(&self) -> bool {
        false
    }

    fn description(&self) -> &'static str {
        "Task prompt fits the token budget"
    }

    async fn execute(&self, ctx: &ValidationContext) -> ServiceResult<ValidatorResult> {
        if ctx.task_prompt.trim().is_empty() {
            return Ok(ValidatorResult::skipped("No task prompt provided"));
        }

        let budget = ctx.config_number(keys::MAX_TOKEN_BUDGET, DEFAULT_MAX_TOKEN_BUDGET);
        let tokens = ctx.services.token_counter.count(&ctx.task_prompt);
        let usage = if budget == 0 {
            f64::INFINITY
        } else {
            tokens as f64 / budget as f64
        };

        let result = if tokens > budget {
            ValidatorResult::failed(format!(
                "Task prompt uses {} tokens, over the budget of {}",
                tokens, budget
            ))
        } else if usage > TOKEN_WARNING_RATIO {
            ValidatorResult::warning(format!(
                "Task prompt uses {} of {} tokens ({:.0}%)",
                tokens,
                budget,
                usage * 100.0
            ))
        } else {
            ValidatorResult::passed(format!("Task prompt uses {} of {} tokens", tokens, budget))
        };

        Ok(result
            .with_metric("tokens", tokens as f64)
            .with_metric("budget", budget as f64))
    }
}

/// Manifest file count against `MAX_MANIFEST_FILES`.
pub struct TaskScopeSize;

#[async_trait]
impl Validator for TaskScopeSize {
    fn code(&self) -> &'static str {
        codes::TASK_SCOPE_SIZE
    }

    fn gate(&self) -> GateId {
        GateId::Sanitization
    }

    fn order(&self) -> u32 {
        2
    }

    fn is_hard_block(&self) -> bool {
        false
    }

    fn description(&self) -> &'static str {
        "Task touches a reasonable number of files"
    }

    async fn execute(&self, ctx: &ValidationContext) -> ServiceResult<ValidatorResult> {
        let Some(manifest) = &ctx.manifest else {
            return Ok(ValidatorResult::skipped("No manifest provided"));
        };

        let max = ctx.config_number(keys::MAX_MANIFEST_FILES, DEFAULT_MAX_MANIFEST_FILES);
        let count = manifest.files.len();
        let result = if count > max {
            ValidatorResult::warning(format!(
                "Manifest declares {} files (limit {}); consider splitting the task",
                count, max
            ))
            .with_evidence(bullet_list(manifest.files.iter().map(|f| f.path.as_str())))
        } else {
            ValidatorResult::passed(format!("Manifest declares {} files", count))
        };
        Ok(result
            .with_metric("files", count as f64)
            .with_metric("limit", max as f64))
    }
}

/// Flags ambiguous wording in the task prompt.
pub struct TaskClarityCheck;

impl TaskClarityCheck {
    fn found_terms(prompt: &str, terms: &[String]) -> Vec<String> {
        terms
            .iter()
            .map(|t| t.trim())
            .filter(|t| !t.is_empty())
            .filter(|term| {
                RegexBuilder::new(&format!(r"\b{}\b", regex::escape(term)))
                    .case_insensitive(true)
                    .build()
                    .map(|re| re.is_match(prompt))
                    .unwrap_or(false)
            })
            .map(str::to_string)
            .collect()
    }
}

#[async_trait]
impl Validator for TaskClarityCheck {
    fn code(&self) -> &'static str {
        codes::TASK_CLARITY_CHECK
    }

    fn gate(&self) -> GateId {
        GateId::Sanitization
    }

    fn order(&self) -> u32 {
        3
    }

    fn is_hard_block(&self) -> bool {
        false
    }

    fn description(&self) -> &'static str {
        "Task prompt avoids ambiguous terms"
    }

    async fn execute(&self, ctx: &ValidationContext) -> ServiceResult<ValidatorResult> {
        if ctx.task_prompt.trim().is_empty() {
            return Ok(ValidatorResult::skipped("No task prompt provided"));
        }

        let found = Self::found_terms(&ctx.task_prompt, &ctx.ambiguous_terms);
        if found.is_empty() {
            return Ok(ValidatorResult::passed("No ambiguous terms found"));
        }
        Ok(ValidatorResult::warning(format!(
            "Task prompt contains {} ambiguous term(s)",
            found.len()
        ))
        .with_evidence(bullet_list(&found))
        .with_details(json!({ "terms": found })))
    }
}

/// `(path, pattern)` for every manifest path matching a sensitive pattern.
fn sensitive_matches(ctx: &ValidationContext) -> Vec<(String, String)> {
    let Some(manifest) = &ctx.manifest else {
        return Vec::new();
    };
    manifest
        .files
        .iter()
        .filter_map(|file| {
            ctx.sensitive_patterns
                .iter()
                .find(|pattern| glob_match(pattern, &file.path))
                .map(|pattern| (file.path.clone(), pattern.clone()))
        })
        .collect()
}

/// Blocks changes to sensitive files unless danger mode is on.
pub struct SensitiveFilesLock;

#[async_trait]
impl Validator for SensitiveFilesLock {
    fn code(&self) -> &'static str {
        codes::SENSITIVE_FILES_LOCK
    }

    fn gate(&self) -> GateId {
        GateId::Sanitization
    }

    fn order(&self) -> u32 {
        4
    }

    fn is_hard_block(&self) -> bool {
        true
    }

    fn description(&self) -> &'static str {
        "Sensitive files are only touched in danger mode"
    }

    async fn execute(&self, ctx: &ValidationContext) -> ServiceResult<ValidatorResult> {
        if ctx.manifest.is_none() {
            return Ok(ValidatorResult::skipped("No manifest provided"));
        }

        let matches = sensitive_matches(ctx);
        if matches.is_empty() {
            return Ok(ValidatorResult::passed("No sensitive files in manifest"));
        }

        let evidence = bullet_list(
            matches
                .iter()
                .map(|(path, pattern)| format!("{} (matches {})", path, pattern)),
        );
        let details = json!({
            "files": matches.iter().map(|(p, _)| p).collect::<Vec<_>>(),
            "dangerMode": ctx.danger_mode,
        });

        let result = if ctx.danger_mode {
            ValidatorResult::passed(format!(
                "{} sensitive file(s) allowed by danger mode",
                matches.len()
            ))
        } else {
            ValidatorResult::failed(format!(
                "Manifest touches {} sensitive file(s); enable danger mode to proceed",
                matches.len()
            ))
        };
        Ok(result.with_evidence(evidence).with_details(details))
    }
}

/// Makes danger mode visible in the report whenever it is on.
pub struct DangerModeExplicit;

#[async_trait]
impl Validator for DangerModeExplicit {
    fn code(&self) -> &'static str {
        codes::DANGER_MODE_EXPLICIT
    }

    fn gate(&self) -> GateId {
        GateId::Sanitization
    }

    fn order(&self) -> u32 {
        5
    }

    fn is_hard_block(&self) -> bool {
        false
    }

    fn description(&self) -> &'static str {
        "Danger mode use is reported"
    }

    async fn execute(&self, ctx: &ValidationContext) -> ServiceResult<ValidatorResult> {
        if !ctx.danger_mode {
            return Ok(ValidatorResult::skipped("Danger mode is off"));
        }

        let matches = sensitive_matches(ctx);
        if matches.is_empty() {
            return Ok(ValidatorResult::warning(
                "Danger mode is on but no sensitive files are touched",
            ));
        }
        Ok(ValidatorResult::warning(format!(
            "Danger mode is on; {} sensitive file(s) will be modified",
            matches.len()
        ))
        .with_evidence(bullet_list(matches.iter().map(|(p, _)| p.as_str()))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks::MockServices;
    use gatekeeper_types::{FileAction, Manifest, ValidatorStatus};

    fn builder() -> crate::context::ValidationContextBuilder {
        ValidationContext::builder("/repo", MockServices::new().services())
    }

    #[tokio::test]
    async fn token_budget_thresholds() {
        let prompt = "word ".repeat(9);
        let ctx = builder()
            .task_prompt(prompt.clone())
            .config(keys::MAX_TOKEN_BUDGET, "10")
            .build();
        let result = TokenBudgetFit.execute(&ctx).await.unwrap();
        assert_eq!(result.status(), ValidatorStatus::Warning);

        let ctx = builder()
            .task_prompt(prompt.clone())
            .config(keys::MAX_TOKEN_BUDGET, "8")
            .build();
        let result = TokenBudgetFit.execute(&ctx).await.unwrap();
        assert_eq!(result.status(), ValidatorStatus::Failed);
        assert_eq!(result.metrics.as_ref().unwrap()["tokens"], 9.0);

        let ctx = builder().task_prompt(prompt).build();
        assert!(TokenBudgetFit.execute(&ctx).await.unwrap().is_passed());
    }

    #[tokio::test]
    async fn scope_size_warns_over_limit() {
        let manifest = Manifest::new("a.test.ts")
            .with_file("a.ts", FileAction::Modify)
            .with_file("b.ts", FileAction::Modify)
            .with_file("c.ts", FileAction::Create);
        let ctx = builder()
            .manifest(manifest)
            .config(keys::MAX_MANIFEST_FILES, "2")
            .build();
        let result = TaskScopeSize.execute(&ctx).await.unwrap();
        assert_eq!(result.status(), ValidatorStatus::Warning);

        let result = TaskScopeSize.execute(&builder().build()).await.unwrap();
        assert_eq!(result.status(), ValidatorStatus::Skipped);
    }

    #[tokio::test]
    async fn clarity_matches_whole_words_case_insensitively() {
        let ctx = builder()
            .task_prompt("Make it FAST and maybe add caching somehow")
            .ambiguous_terms(vec!["fast".into(), "somehow".into(), "etc".into(), "may".into()])
            .build();
        let result = TaskClarityCheck.execute(&ctx).await.unwrap();
        assert_eq!(result.status(), ValidatorStatus::Warning);
        assert_eq!(result.details_field("terms").unwrap(), &json!(["fast", "somehow"]));
    }

    #[tokio::test]
    async fn sensitive_files_block_without_danger_mode() {
        let manifest = Manifest::new("a.test.ts")
            .with_file("src/a.ts", FileAction::Modify)
            .with_file("config/.env.production", FileAction::Modify);
        let ctx = builder()
            .manifest(manifest.clone())
            .sensitive_patterns(vec![".env*".into()])
            .build();
        let result = SensitiveFilesLock.execute(&ctx).await.unwrap();
        assert!(result.is_failed());
        assert!(result.evidence.unwrap().contains("config/.env.production"));

        let ctx = builder()
            .manifest(manifest)
            .sensitive_patterns(vec![".env*".into()])
            .danger_mode(true)
            .build();
        assert!(SensitiveFilesLock.execute(&ctx).await.unwrap().is_passed());
        let danger = DangerModeExplicit.execute(&ctx).await.unwrap();
        assert_eq!(danger.status(), ValidatorStatus::Warning);
    }

    #[tokio::test]
    async fn danger_mode_off_is_skipped() {
        let result = DangerModeExplicit.execute(&builder().build()).await.unwrap();
        assert_eq!(result.status(), ValidatorStatus::Skipped);
        assert!(result.is_passed());
    }
}
