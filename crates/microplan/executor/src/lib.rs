//! Dependency-aware microplan execution.
//!
//! [`topological_sort`] groups a [`MicroplansDocument`] into batches whose
//! members only depend on earlier batches. [`MicroplanExecutor`] runs those
//! batches in order, each one concurrently, and skips everything downstream
//! of a failure.
//!
//! ```text
//!   a ──► b ──► d        batch 0: [a]
//!    └──► c ──┘          batch 1: [b, c]   (concurrent)
//!                        batch 2: [d]
//! ```
//!
//! [`MicroplansDocument`]: microplan_types::MicroplansDocument

#![deny(unsafe_code)]

mod executor;
mod graph;
mod runner;

pub use executor::{ExecutionSummary, MicroplanExecutor, DEPENDENCY_FAILED};
pub use graph::topological_sort;
pub use runner::{MicroplanOutput, MicroplanRunner, RunnerError};
