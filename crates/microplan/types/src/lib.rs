//! Microplan data model.
//!
//! A [`MicroplansDocument`] decomposes one task into [`Microplan`]s, each an
//! independently executable unit with explicit dependencies on others in the
//! same document. The dependency relation must reference existing ids and be
//! acyclic; [`PlanError`] names the ways it can be malformed.

#![deny(unsafe_code)]

mod errors;
mod event;
mod plan;

pub use errors::{PlanError, PlanResult};
pub use event::{MicroplanEvent, MicroplanStatus};
pub use plan::{FileChange, FileChangeAction, Microplan, MicroplansDocument};
