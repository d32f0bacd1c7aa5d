//! Error types for the Gatekeeper data model.
//!
//! Expected validation failures are `ValidatorResult` values. The errors here
//! cover configuration mistakes, structural violations of manifests and
//! contracts, and infrastructure failures raised by external capabilities.

/// Malformed gate configuration, detected before any validator runs.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("duplicate validator code: {0}")]
    DuplicateCode(String),

    #[error("duplicate order {order} in gate {gate}: {first} and {second}")]
    DuplicateOrder {
        gate: u8,
        order: u32,
        first: String,
        second: String,
    },

    #[error("validator {0} declares order 0; orders start at 1")]
    InvalidOrder(String),

    #[error("override references unknown validator: {0}")]
    UnknownValidator(String),

    #[error("configuration could not be loaded: {0}")]
    Load(String),
}

/// Infrastructure failure inside an external capability.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("git error: {0}")]
    Git(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("command `{command}` failed: {message}")]
    Process { command: String, message: String },

    #[error("parse error: {0}")]
    Parse(String),

    #[error("capability not available: {0}")]
    Unsupported(String),
}

/// Result alias for capability calls.
pub type ServiceResult<T> = Result<T, ServiceError>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ManifestError {
    #[error("manifest declares no files")]
    Empty,

    #[error("manifest contains an empty path")]
    EmptyPath,

    #[error("manifest path is a glob, not a concrete file: {0}")]
    GlobPath(String),

    #[error("manifest declares the same path twice: {0}")]
    DuplicatePath(String),

    #[error("test file does not have a test/spec extension: {0}")]
    InvalidTestFile(String),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ContractError {
    #[error("contract has no slug")]
    MissingSlug,

    #[error("contract declares no clauses")]
    NoClauses,

    #[error("clause with empty id")]
    EmptyClauseId,

    #[error("duplicate clause id: {0}")]
    DuplicateClauseId(String),
}
