//! Gatekeeper validation engine.
//!
//! A caller builds a [`ValidationContext`] (inputs plus capability handles) and
//! hands it to a [`GateRunner`]. The runner executes the four gates in order;
//! each gate runs its validators one by one in declared order.
//!
//! ```text
//! ValidationContext ──► GateRunner
//!                         ├─ Gate 0 SANITIZATION ─ validators (order 1..n)
//!                         ├─ Gate 1 CONTRACT ───── ... red phase (locked hard block)
//!                         ├─ Gate 2 EXECUTION
//!                         └─ Gate 3 INTEGRITY
//!                               │
//!                               ▼
//!                         PipelineReport
//! ```
//!
//! A FAILED result from a hard-block validator aborts the run: no further
//! validator or gate executes. Soft failures and warnings are recorded and
//! the run continues.
//!
//! Validators only reach the outside world through [`Services`]. Errors and
//! panics raised inside a validator become FAILED results at the
//! [`execute_guarded`] boundary.

#![deny(unsafe_code)]

pub mod config;
pub mod context;
pub mod coverage;
pub mod mocks;
pub mod runner;
pub mod services;
pub mod traits;
pub mod validators;

pub use config::{ConfiguredValidator, GateConfig, ValidatorOverride, ValidatorRegistry};
pub use context::{ValidationContext, ValidationContextBuilder};
pub use coverage::{compute_coverage, ClauseCoverage, ClauseIssue};
pub use runner::{
    GateOutcome, GateRunner, HardBlockAbort, PipelineEvent, PipelineReport, ValidatorRecord,
};
pub use services::{
    AstService, BuildService, CompilerService, GitService, LintService, LogLevel, LogService,
    SandboxProvider, Services, TestRunner, TokenCounter,
};
pub use traits::{execute_guarded, Validator};
pub use validators::{codes, keys, standard_catalog, RedPhaseIsolation};
