//! Gate 3: nothing else broke.

use async_trait::async_trait;
use gatekeeper_types::{GateId, ServiceResult, ValidatorResult};

use super::{codes, output_tail};
use crate::context::ValidationContext;
use crate::traits::Validator;

pub struct FullRegressionPass;

#[async_trait]
impl Validator for FullRegressionPass {
    fn code(&self) -> &'static str {
        codes::FULL_REGRESSION_PASS
    }

    fn gate(&self) -> GateId {
        GateId::Integrity
    }

    fn order(&self) -> u32 {
        1
    }

    fn is_hard_block(&self) -> bool {
        true
    }

    fn description(&self) -> &'static str {
        "Full test suite passes"
    }

    async fn execute(&self, ctx: &ValidationContext) -> ServiceResult<ValidatorResult> {
        let run = ctx.services.test_runner.run_all_tests().await?;
        let result = if run.passed {
            ValidatorResult::passed("Full test suite passes")
        } else {
            ValidatorResult::failed(format!(
                "Full test suite fails (exit code {})",
                run.exit_code
            ))
        };
        Ok(result
            .with_evidence(output_tail(&run.output))
            .with_metric("durationMs", run.duration_ms as f64))
    }
}

pub struct ProductionBuildPass;

#[async_trait]
impl Validator for ProductionBuildPass {
    fn code(&self) -> &'static str {
        codes::PRODUCTION_BUILD_PASS
    }

    fn gate(&self) -> GateId {
        GateId::Integrity
    }

    fn order(&self) -> u32 {
        2
    }

    fn is_hard_block(&self) -> bool {
        true
    }

    fn description(&self) -> &'static str {
        "Production build succeeds"
    }

    async fn execute(&self, ctx: &ValidationContext) -> ServiceResult<ValidatorResult> {
        let build = ctx.services.build.build().await?;
        if build.success {
            return Ok(ValidatorResult::passed("Production build succeeds"));
        }
        Ok(ValidatorResult::failed(format!(
            "Production build fails (exit code {})",
            build.exit_code
        ))
        .with_evidence(output_tail(&build.output)))
    }
}
