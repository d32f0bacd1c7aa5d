use std::collections::BTreeSet;

use async_trait::async_trait;
use gatekeeper_types::{GateId, ServiceResult, ValidatorResult, ValidatorStatus};
use serde_json::json;

use super::{bullet_list, codes};
use crate::context::ValidationContext;
use crate::coverage::{block_clause_ids, compute_coverage};
use crate::traits::Validator;

/// Every `@clause` tag in the test file names a clause of the contract.
pub struct TestClauseMappingValid;

#[async_trait]
impl Validator for TestClauseMappingValid {
    fn code(&self) -> &'static str {
        codes::TEST_CLAUSE_MAPPING_VALID
    }

    fn gate(&self) -> GateId {
        GateId::Contract
    }

    fn order(&self) -> u32 {
        6
    }

    fn is_hard_block(&self) -> bool {
        false
    }

    fn description(&self) -> &'static str {
        "Clause tags reference existing clauses"
    }

    async fn execute(&self, ctx: &ValidationContext) -> ServiceResult<ValidatorResult> {
        let Some(contract) = &ctx.contract else {
            return Ok(ValidatorResult::skipped("No contract provided"));
        };
        let Some(test_file) = ctx.test_file() else {
            return Ok(ValidatorResult::skipped("No test file provided"));
        };

        let blocks = ctx.services.ast.test_blocks_with_comments(test_file).await?;
        let mut tagged = BTreeSet::new();
        let mut unknown = BTreeSet::new();
        for block in &blocks {
            for id in block_clause_ids(block) {
                if contract.clause(&id).is_none() {
                    unknown.insert(format!("{} (test \"{}\")", id, block.name));
                }
                tagged.insert(id);
            }
        }

        if tagged.is_empty() {
            return Ok(ValidatorResult::passed("No clause tags found"));
        }
        if unknown.is_empty() {
            return Ok(ValidatorResult::passed(format!(
                "{} clause tag(s) map to contract clauses",
                tagged.len()
            )));
        }
        Ok(ValidatorResult::failed(format!(
            "{} clause tag(s) reference clauses missing from contract '{}'",
            unknown.len(),
            contract.slug
        ))
        .with_evidence(bullet_list(&unknown)))
    }
}

/// Static clause coverage through `@clause` tags.
///
/// STRICT contracts fail when a MUST clause is under-covered; CREATIVE
/// contracts and SHOULD clauses only warn.
pub struct ContractClauseCoverage;

#[async_trait]
impl Validator for ContractClauseCoverage {
    fn code(&self) -> &'static str {
        codes::CONTRACT_CLAUSE_COVERAGE
    }

    fn gate(&self) -> GateId {
        GateId::Contract
    }

    fn order(&self) -> u32 {
        7
    }

    fn is_hard_block(&self) -> bool {
        false
    }

    fn description(&self) -> &'static str {
        "Every contract clause is exercised by a tagged test"
    }

    async fn execute(&self, ctx: &ValidationContext) -> ServiceResult<ValidatorResult> {
        let Some(contract) = &ctx.contract else {
            return Ok(ValidatorResult::skipped("No contract provided"));
        };
        let Some(test_file) = ctx.test_file() else {
            return Ok(ValidatorResult::skipped("No test file provided"));
        };

        let blocks = ctx.services.ast.test_blocks_with_comments(test_file).await?;
        let coverage = compute_coverage(contract, &blocks);
        let status = coverage.status(contract.mode);

        let result = match status {
            ValidatorStatus::Passed => ValidatorResult::passed(format!(
                "All {} clause(s) covered by at least {} test(s)",
                coverage.total_clauses, coverage.min_tests_per_clause
            )),
            _ => {
                let message = format!(
                    "{} of {} clause(s) lack required coverage ({} mode)",
                    coverage.clause_issues.len(),
                    coverage.total_clauses,
                    contract.mode
                );
                let evidence = bullet_list(coverage.clause_issues.iter().map(|issue| {
                    format!(
                        "{} [{}]: {} of {} test(s)",
                        issue.clause_id, issue.normativity, issue.found, issue.required
                    )
                }));
                let result = if status == ValidatorStatus::Failed {
                    ValidatorResult::failed(message)
                } else {
                    ValidatorResult::warning(message)
                };
                result.with_evidence(evidence)
            }
        };

        let details = serde_json::to_value(&coverage)
            .unwrap_or_else(|_| json!({ "uncoveredClauseIds": coverage.uncovered_clause_ids }));
        Ok(result
            .with_details(details)
            .with_metric("coveragePercent", coverage.coverage_percent())
            .with_metric("coveredClauses", coverage.covered_clauses() as f64)
            .with_metric("totalClauses", coverage.total_clauses as f64))
    }
}
