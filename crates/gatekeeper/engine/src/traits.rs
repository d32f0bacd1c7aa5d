use std::panic::AssertUnwindSafe;

use async_trait::async_trait;
use futures::FutureExt;
use gatekeeper_types::{GateId, ServiceResult, ValidatorResult};
use serde_json::json;

use crate::context::ValidationContext;

/// One independent check inside a gate.
///
/// Validators run sequentially in ascending `order` within their gate.
/// Expected failures are reported as a FAILED result. An `Err` means a
/// capability broke underneath the validator; the runner converts it into a
/// FAILED result carrying the error message.
#[async_trait]
pub trait Validator: Send + Sync {
    /// Stable identifier, unique across all gates.
    fn code(&self) -> &'static str;

    fn gate(&self) -> GateId;

    /// Position within the gate, starting at 1.
    fn order(&self) -> u32;

    /// Whether a failure aborts the whole pipeline.
    fn is_hard_block(&self) -> bool;

    /// Validators whose hard-block flag cannot be overridden by configuration.
    fn is_locked(&self) -> bool {
        false
    }

    fn description(&self) -> &'static str {
        ""
    }

    async fn execute(&self, context: &ValidationContext) -> ServiceResult<ValidatorResult>;
}

/// Run a validator at the engine boundary: errors and panics become FAILED
/// results instead of escaping into the runner.
pub async fn execute_guarded(validator: &dyn Validator, context: &ValidationContext) -> ValidatorResult {
    match AssertUnwindSafe(validator.execute(context)).catch_unwind().await {
        Ok(Ok(result)) => result,
        Ok(Err(err)) => ValidatorResult::failed(format!(
            "{} could not complete: {}",
            validator.code(),
            err
        ))
        .with_details(json!({ "error": err.to_string(), "kind": "infrastructure" })),
        Err(panic) => {
            let reason = panic_message(panic.as_ref());
            ValidatorResult::failed(format!("{} panicked: {}", validator.code(), reason))
                .with_details(json!({ "error": reason, "kind": "panic" }))
        }
    }
}

pub(crate) fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
