//! Contract clause coverage.
//!
//! Traceability between a contract and its tests is carried by comment tags
//! placed directly above a test declaration:
//!
//! ```text
//! // @clause CL-LOGIN-001
//! it("returns a token for valid credentials", ...)
//! ```
//!
//! The tag format is a stable wire format between contract authors and this
//! check. Coverage is computed statically from tags; no test is executed.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::OnceLock;

use gatekeeper_types::{Contract, ContractMode, Normativity, TestBlock, ValidatorStatus};
use regex::Regex;
use serde::{Deserialize, Serialize};

fn clause_tag_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"@clause\s+([A-Za-z0-9][A-Za-z0-9_.:\-]*)").expect("clause tag pattern is valid")
    })
}

/// Clause ids tagged in one comment line.
pub fn clause_tags(comment: &str) -> Vec<String> {
    clause_tag_pattern()
        .captures_iter(comment)
        .map(|c| c[1].to_string())
        .collect()
}

/// Distinct clause ids tagged on one test block.
pub fn block_clause_ids(block: &TestBlock) -> BTreeSet<String> {
    block
        .preceding_comments
        .iter()
        .flat_map(|line| clause_tags(line))
        .collect()
}

/// A clause with fewer tagged tests than required.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClauseIssue {
    pub clause_id: String,
    pub normativity: Normativity,
    pub found: u32,
    pub required: u32,
}

/// Outcome of mapping a contract onto tagged tests.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClauseCoverage {
    /// clause id -> number of tests tagged with it
    pub counts: BTreeMap<String, u32>,
    /// Clauses with no tagged test at all
    pub uncovered_clause_ids: Vec<String>,
    /// Clauses below `min_tests_per_clause` (includes uncovered ones)
    pub clause_issues: Vec<ClauseIssue>,
    /// Tags naming ids that are not in the contract
    pub unknown_tags: Vec<String>,
    pub min_tests_per_clause: u32,
    pub total_clauses: usize,
    pub tests_scanned: usize,
}

impl ClauseCoverage {
    pub fn covered_clauses(&self) -> usize {
        self.total_clauses - self.clause_issues.len()
    }

    pub fn coverage_percent(&self) -> f64 {
        if self.total_clauses == 0 {
            return 100.0;
        }
        (self.covered_clauses() as f64 / self.total_clauses as f64) * 100.0
    }

    fn has_must_gap(&self) -> bool {
        self.clause_issues
            .iter()
            .any(|issue| issue.normativity == Normativity::Must)
    }

    /// STRICT fails on MUST gaps; CREATIVE mode and SHOULD gaps only warn.
    pub fn status(&self, mode: ContractMode) -> ValidatorStatus {
        if self.clause_issues.is_empty() {
            ValidatorStatus::Passed
        } else if mode == ContractMode::Strict && self.has_must_gap() {
            ValidatorStatus::Failed
        } else {
            ValidatorStatus::Warning
        }
    }
}

/// Count tagged tests per clause and collect the gaps.
pub fn compute_coverage(contract: &Contract, blocks: &[TestBlock]) -> ClauseCoverage {
    let required = contract.min_tests_per_clause();
    let mut counts: BTreeMap<String, u32> = contract
        .clauses
        .iter()
        .map(|clause| (clause.id.clone(), 0))
        .collect();
    let mut unknown = BTreeSet::new();

    for block in blocks {
        for id in block_clause_ids(block) {
            match counts.get_mut(&id) {
                Some(count) => *count += 1,
                None => {
                    unknown.insert(id);
                }
            }
        }
    }

    let mut uncovered_clause_ids = Vec::new();
    let mut clause_issues = Vec::new();
    for clause in &contract.clauses {
        let found = counts.get(&clause.id).copied().unwrap_or(0);
        if found == 0 {
            uncovered_clause_ids.push(clause.id.clone());
        }
        if found < required {
            clause_issues.push(ClauseIssue {
                clause_id: clause.id.clone(),
                normativity: clause.normativity,
                found,
                required,
            });
        }
    }

    ClauseCoverage {
        counts,
        uncovered_clause_ids,
        clause_issues,
        unknown_tags: unknown.into_iter().collect(),
        min_tests_per_clause: required,
        total_clauses: contract.clauses.len(),
        tests_scanned: blocks.len(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks::tagged_block;
    use gatekeeper_types::Clause;
    use proptest::prelude::*;

    fn contract(mode: ContractMode) -> Contract {
        Contract::new("login", mode)
            .with_clause(Clause::must("CL-1", "valid login"))
            .with_clause(Clause::must("CL-2", "invalid login"))
    }

    #[test]
    fn tags_are_extracted_from_comments() {
        assert_eq!(clause_tags("// @clause CL-LOGIN-001"), vec!["CL-LOGIN-001"]);
        assert_eq!(clause_tags("/* @clause A.1 @clause B:2 */"), vec!["A.1", "B:2"]);
        assert!(clause_tags("// clause CL-1").is_empty());
        assert!(clause_tags("// @clause").is_empty());
    }

    #[test]
    fn fully_tagged_contract_passes() {
        let blocks = vec![tagged_block("a", &["CL-1"]), tagged_block("b", &["CL-2"])];
        let coverage = compute_coverage(&contract(ContractMode::Strict), &blocks);
        assert!(coverage.uncovered_clause_ids.is_empty());
        assert_eq!(coverage.status(ContractMode::Strict), ValidatorStatus::Passed);
        assert_eq!(coverage.coverage_percent(), 100.0);
    }

    #[test]
    fn strict_mode_fails_on_missing_must_clause() {
        let blocks = vec![tagged_block("a", &["CL-1"])];
        let coverage = compute_coverage(&contract(ContractMode::Strict), &blocks);
        assert_eq!(coverage.uncovered_clause_ids, vec!["CL-2".to_string()]);
        assert_eq!(coverage.status(ContractMode::Strict), ValidatorStatus::Failed);
    }

    #[test]
    fn creative_mode_only_warns() {
        let coverage = compute_coverage(&contract(ContractMode::Creative), &[]);
        assert_eq!(coverage.uncovered_clause_ids.len(), 2);
        assert_eq!(coverage.status(ContractMode::Creative), ValidatorStatus::Warning);
    }

    #[test]
    fn should_clause_gaps_never_fail() {
        let contract = Contract::new("x", ContractMode::Strict)
            .with_clause(Clause::must("M", "must"))
            .with_clause(Clause::should("S", "should"));
        let coverage = compute_coverage(&contract, &[tagged_block("a", &["M"])]);
        assert_eq!(coverage.uncovered_clause_ids, vec!["S".to_string()]);
        assert_eq!(coverage.status(ContractMode::Strict), ValidatorStatus::Warning);
    }

    #[test]
    fn duplicate_tags_on_one_test_count_once() {
        let block = tagged_block("a", &["CL-1", "CL-1"]);
        let coverage = compute_coverage(&contract(ContractMode::Strict), &[block]);
        assert_eq!(coverage.counts["CL-1"], 1);
    }

    #[test]
    fn unknown_tags_are_reported() {
        let coverage = compute_coverage(
            &contract(ContractMode::Strict),
            &[tagged_block("a", &["CL-1", "CL-9"]), tagged_block("b", &["CL-2"])],
        );
        assert_eq!(coverage.unknown_tags, vec!["CL-9".to_string()]);
        assert!(coverage.clause_issues.is_empty());
    }

    #[test]
    fn min_tests_per_clause_flags_under_covered() {
        let contract = contract(ContractMode::Strict).with_min_tests_per_clause(2);
        let blocks = vec![
            tagged_block("a", &["CL-1"]),
            tagged_block("b", &["CL-1"]),
            tagged_block("c", &["CL-2"]),
        ];
        let coverage = compute_coverage(&contract, &blocks);
        assert!(coverage.uncovered_clause_ids.is_empty());
        assert_eq!(coverage.clause_issues.len(), 1);
        assert_eq!(coverage.clause_issues[0].clause_id, "CL-2");
        assert_eq!(coverage.clause_issues[0].found, 1);
        assert_eq!(coverage.status(ContractMode::Strict), ValidatorStatus::Failed);
    }

    proptest! {
        /// With `min = N`, a clause appears in `clause_issues` exactly when it
        /// is tagged fewer than N times.
        #[test]
        fn clause_issues_match_min_tests(
            tag_counts in proptest::collection::vec(0u32..5, 1..6),
            min in 1u32..4,
        ) {
            let mut contract = Contract::new("p", ContractMode::Strict).with_min_tests_per_clause(min);
            let mut blocks = Vec::new();
            for (i, count) in tag_counts.iter().enumerate() {
                let id = format!("CL-{}", i);
                contract = contract.with_clause(Clause::must(id.clone(), "c"));
                for n in 0..*count {
                    blocks.push(tagged_block(&format!("t{}-{}", i, n), &[id.as_str()]));
                }
            }

            let coverage = compute_coverage(&contract, &blocks);
            for (i, count) in tag_counts.iter().enumerate() {
                let id = format!("CL-{}", i);
                let flagged = coverage.clause_issues.iter().any(|issue| issue.clause_id == id);
                prop_assert_eq!(flagged, *count < min);
                prop_assert_eq!(coverage.uncovered_clause_ids.contains(&id), *count == 0);
            }
            let expected = if tag_counts.iter().any(|c| *c < min) {
                ValidatorStatus::Failed
            } else {
                ValidatorStatus::Passed
            };
            prop_assert_eq!(coverage.status(ContractMode::Strict), expected);
        }
    }
}
