//! Contracts: normative clauses a change must satisfy.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::ContractError;

/// Whether coverage gaps are fatal (STRICT) or advisory (CREATIVE).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ContractMode {
    #[default]
    Strict,
    Creative,
}

impl std::fmt::Display for ContractMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Strict => write!(f, "STRICT"),
            Self::Creative => write!(f, "CREATIVE"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClauseKind {
    Behavior,
    Error,
    Invariant,
    Ui,
    Constraint,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Normativity {
    Must,
    Should,
}

impl std::fmt::Display for Normativity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Must => write!(f, "MUST"),
            Self::Should => write!(f, "SHOULD"),
        }
    }
}

/// A single normative requirement.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Clause {
    pub id: String,
    pub kind: ClauseKind,
    pub normativity: Normativity,
    pub title: String,
    #[serde(default)]
    pub spec: String,
    #[serde(default)]
    pub observables: Vec<String>,
}

impl Clause {
    pub fn must(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: ClauseKind::Behavior,
            normativity: Normativity::Must,
            title: title.into(),
            spec: String::new(),
            observables: Vec::new(),
        }
    }

    pub fn should(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            normativity: Normativity::Should,
            ..Self::must(id, title)
        }
    }

    pub fn with_kind(mut self, kind: ClauseKind) -> Self {
        self.kind = kind;
        self
    }
}

/// Coverage expectations declared by the contract author.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpectedCoverage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_tests_per_clause: Option<u32>,
}

/// The machine-readable contract a change is validated against.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Contract {
    #[serde(default)]
    pub schema_version: String,
    pub slug: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub mode: ContractMode,
    #[serde(default)]
    pub change_type: String,
    #[serde(default)]
    pub target_artifacts: Vec<String>,
    pub clauses: Vec<Clause>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_coverage: Option<ExpectedCoverage>,
}

impl Contract {
    pub fn new(slug: impl Into<String>, mode: ContractMode) -> Self {
        Self {
            schema_version: "1.0".to_string(),
            slug: slug.into(),
            title: String::new(),
            mode,
            change_type: "new".to_string(),
            target_artifacts: Vec::new(),
            clauses: Vec::new(),
            expected_coverage: None,
        }
    }

    pub fn with_clause(mut self, clause: Clause) -> Self {
        self.clauses.push(clause);
        self
    }

    pub fn with_min_tests_per_clause(mut self, min: u32) -> Self {
        self.expected_coverage = Some(ExpectedCoverage {
            min_tests_per_clause: Some(min),
        });
        self
    }

    /// Minimum number of tagged tests each clause needs (default 1).
    pub fn min_tests_per_clause(&self) -> u32 {
        self.expected_coverage
            .as_ref()
            .and_then(|c| c.min_tests_per_clause)
            .unwrap_or(1)
            .max(1)
    }

    pub fn clause(&self, id: &str) -> Option<&Clause> {
        self.clauses.iter().find(|c| c.id == id)
    }

    pub fn validate(&self) -> Result<(), Vec<ContractError>> {
        let mut errors = Vec::new();
        if self.slug.trim().is_empty() {
            errors.push(ContractError::MissingSlug);
        }
        if self.clauses.is_empty() {
            errors.push(ContractError::NoClauses);
        }
        let mut seen = HashSet::new();
        for clause in &self.clauses {
            if clause.id.trim().is_empty() {
                errors.push(ContractError::EmptyClauseId);
            } else if !seen.insert(clause.id.as_str()) {
                errors.push(ContractError::DuplicateClauseId(clause.id.clone()));
            }
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
