//! Gatekeeper Domain Types
//!
//! Gatekeeper validates AI-generated code changes against a machine-readable
//! contract before they are allowed to merge. Validation happens in four
//! ordered **gates**, each running an ordered list of validators.
//!
//! # Key Concepts
//!
//! - **Manifest**: the declared set of file changes a task is allowed to make,
//!   plus the test file that specifies it.
//! - **Contract**: a list of normative clauses (MUST/SHOULD) the change must
//!   satisfy, each traceable to tests via `// @clause <ID>` tags.
//! - **ValidatorResult**: the outcome of one validator. Expected failures are
//!   values, never errors.
//! - **GateResult**: aggregated counts and timing for one gate.
//!
//! # Gates
//!
//! | # | Name | Purpose |
//! |---|------|---------|
//! | 0 | SANITIZATION | prompt and scope hygiene |
//! | 1 | CONTRACT | manifest, contract, test quality, red phase |
//! | 2 | EXECUTION | diff scope, target test, compilation, lint |
//! | 3 | INTEGRITY | full regression and production build |

#![deny(unsafe_code)]

mod capabilities;
mod contract;
mod errors;
mod gate;
mod manifest;
mod result;
mod status;

pub use capabilities::*;
pub use contract::*;
pub use errors::*;
pub use gate::*;
pub use manifest::*;
pub use result::*;
pub use status::*;
