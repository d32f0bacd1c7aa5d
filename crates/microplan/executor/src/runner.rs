use async_trait::async_trait;
use microplan_types::Microplan;
use serde::{Deserialize, Serialize};

/// What a finished microplan reports back.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MicroplanOutput {
    pub summary: String,
}

impl MicroplanOutput {
    pub fn new(summary: impl Into<String>) -> Self {
        Self {
            summary: summary.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RunnerError {
    #[error("microplan failed: {0}")]
    Failed(String),

    #[error("verification failed: {0}")]
    Verification(String),

    #[error("runner unavailable: {0}")]
    Unavailable(String),
}

/// Performs the work of a single microplan.
///
/// Called concurrently for microplans in the same batch.
#[async_trait]
pub trait MicroplanRunner: Send + Sync {
    async fn run(&self, microplan: &Microplan) -> Result<MicroplanOutput, RunnerError>;
}
