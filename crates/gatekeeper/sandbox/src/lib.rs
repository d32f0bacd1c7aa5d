//! Disposable project checkouts at a given git ref.
//!
//! A sandbox is a detached `git worktree` under a caller-chosen base
//! directory, named deterministically from the target ref
//! (`sandbox-<sanitized ref>`). Dependency directories such as
//! `node_modules` are symlinked from the original project instead of being
//! reinstalled.
//!
//! Creation for the same ref is serialised inside one [`SandboxService`];
//! different refs may be created concurrently.

#![deny(unsafe_code)]

mod error;
mod service;

pub use error::{Result, SandboxError};
pub use service::{sanitize_ref, SandboxConfig, SandboxService};
