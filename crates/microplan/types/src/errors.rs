//! Structural errors in a microplan document, raised before anything runs.

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlanError {
    #[error("microplan {microplan} depends on unknown microplan {dependency}")]
    MissingDependency { microplan: String, dependency: String },

    /// `path` starts and ends with the same id, e.g. `a -> b -> a`.
    #[error("dependency cycle: {}", path.join(" -> "))]
    CycleDetected { path: Vec<String> },

    #[error("duplicate microplan id: {0}")]
    DuplicateId(String),

    #[error("microplan with empty id")]
    EmptyId,

    #[error("document contains no microplans")]
    EmptyDocument,
}

pub type PlanResult<T> = Result<T, PlanError>;
