use std::process::ExitCode;

use gatekeeper_engine::{GateConfig, ValidatorRegistry};
use gatekeeper_types::GateId;

use crate::settings::GatekeeperConfig;

/// Effective gate configuration: standard catalog plus configured overrides.
pub fn gate_config(config: &GatekeeperConfig) -> anyhow::Result<GateConfig> {
    let registry = ValidatorRegistry::standard()?;
    Ok(GateConfig::from_registry(&registry, &config.overrides())?)
}

pub fn execute(config: &GatekeeperConfig) -> anyhow::Result<ExitCode> {
    let gates = gate_config(config)?;
    for gate in GateId::ALL {
        println!("Gate {}", gate);
        for configured in gates.gate(gate) {
            let marker = if configured.is_hard_block { "hard" } else { "soft" };
            println!(
                "  {:>2}. {:<34} [{}] {}",
                configured.order(),
                configured.code(),
                marker,
                configured.validator.description()
            );
        }
    }
    Ok(ExitCode::SUCCESS)
}
