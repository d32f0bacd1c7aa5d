//! Gate configuration: which validators run in which gate, in which order.
//!
//! `GateConfig` is the single source of truth for `(gate, order, code)`
//! triples. Duplicate codes and duplicate orders within a gate are rejected
//! when the configuration is built, before anything executes.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use gatekeeper_types::{ConfigError, GateId};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::traits::Validator;
use crate::validators;

/// Per-validator settings supplied by configuration.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorOverride {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hard_block: Option<bool>,
}

/// A validator with its effective hard-block flag.
#[derive(Clone)]
pub struct ConfiguredValidator {
    pub validator: Arc<dyn Validator>,
    pub is_hard_block: bool,
}

impl ConfiguredValidator {
    pub fn code(&self) -> &'static str {
        self.validator.code()
    }

    pub fn order(&self) -> u32 {
        self.validator.order()
    }

    pub fn gate(&self) -> GateId {
        self.validator.gate()
    }
}

impl std::fmt::Debug for ConfiguredValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfiguredValidator")
            .field("code", &self.code())
            .field("gate", &self.gate())
            .field("order", &self.order())
            .field("is_hard_block", &self.is_hard_block)
            .finish()
    }
}

/// Ordered validator lists for the four gates.
#[derive(Clone, Debug, Default)]
pub struct GateConfig {
    gates: BTreeMap<GateId, Vec<ConfiguredValidator>>,
}

impl GateConfig {
    /// Build a configuration from validators using their declared flags.
    pub fn new(validators: Vec<Arc<dyn Validator>>) -> Result<Self, ConfigError> {
        Self::with_overrides(validators, &HashMap::new())
    }

    /// Build a configuration, applying per-code overrides.
    pub fn with_overrides(
        validators: Vec<Arc<dyn Validator>>,
        overrides: &HashMap<String, ValidatorOverride>,
    ) -> Result<Self, ConfigError> {
        let mut codes: HashSet<&'static str> = HashSet::new();
        for validator in &validators {
            if !codes.insert(validator.code()) {
                return Err(ConfigError::DuplicateCode(validator.code().to_string()));
            }
            if validator.order() == 0 {
                return Err(ConfigError::InvalidOrder(validator.code().to_string()));
            }
        }
        if let Some(unknown) = overrides.keys().find(|code| !codes.contains(code.as_str())) {
            return Err(ConfigError::UnknownValidator(unknown.clone()));
        }

        let mut gates: BTreeMap<GateId, Vec<ConfiguredValidator>> = BTreeMap::new();
        for validator in validators {
            let settings = overrides.get(validator.code()).cloned().unwrap_or_default();
            let mut is_hard_block = validator.is_hard_block();

            if validator.is_locked() {
                if settings != ValidatorOverride::default() {
                    warn!(
                        code = validator.code(),
                        "Ignoring override for locked validator"
                    );
                }
            } else {
                if settings.enabled == Some(false) {
                    continue;
                }
                if let Some(hard_block) = settings.hard_block {
                    is_hard_block = hard_block;
                }
            }

            gates
                .entry(validator.gate())
                .or_default()
                .push(ConfiguredValidator {
                    validator,
                    is_hard_block,
                });
        }

        for (gate, list) in gates.iter_mut() {
            list.sort_by_key(|v| v.order());
            for pair in list.windows(2) {
                if pair[0].order() == pair[1].order() {
                    return Err(ConfigError::DuplicateOrder {
                        gate: gate.number(),
                        order: pair[0].order(),
                        first: pair[0].code().to_string(),
                        second: pair[1].code().to_string(),
                    });
                }
            }
        }

        Ok(Self { gates })
    }

    /// The built-in validator catalog.
    pub fn standard() -> Result<Self, ConfigError> {
        Self::new(validators::standard_catalog())
    }

    pub fn from_registry(
        registry: &ValidatorRegistry,
        overrides: &HashMap<String, ValidatorOverride>,
    ) -> Result<Self, ConfigError> {
        Self::with_overrides(registry.validators(), overrides)
    }

    /// Validators of one gate in execution order.
    pub fn gate(&self, gate: GateId) -> &[ConfiguredValidator] {
        self.gates.get(&gate).map(Vec::as_slice).unwrap_or(&[])
    }

    /// All validators, gate by gate, in execution order.
    pub fn iter(&self) -> impl Iterator<Item = &ConfiguredValidator> {
        GateId::ALL.into_iter().flat_map(move |gate| self.gate(gate).iter())
    }

    pub fn find(&self, code: &str) -> Option<&ConfiguredValidator> {
        self.iter().find(|v| v.code() == code)
    }

    pub fn len(&self) -> usize {
        self.gates.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Lookup table of available validators, owned by the composition root.
///
/// Registration order is preserved so configurations built from the registry
/// are deterministic.
#[derive(Clone, Default)]
pub struct ValidatorRegistry {
    entries: Vec<Arc<dyn Validator>>,
}

impl ValidatorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry preloaded with the built-in catalog.
    pub fn standard() -> Result<Self, ConfigError> {
        let mut registry = Self::new();
        for validator in validators::standard_catalog() {
            registry.register(validator)?;
        }
        Ok(registry)
    }

    pub fn register(&mut self, validator: Arc<dyn Validator>) -> Result<(), ConfigError> {
        if self.get(validator.code()).is_some() {
            return Err(ConfigError::DuplicateCode(validator.code().to_string()));
        }
        self.entries.push(validator);
        Ok(())
    }

    /// Replace a registered validator (or add it when absent).
    pub fn replace(&mut self, validator: Arc<dyn Validator>) {
        self.invalidate(validator.code());
        self.entries.push(validator);
    }

    /// Drop a validator from the registry. Returns whether it was present.
    pub fn invalidate(&mut self, code: &str) -> bool {
        let before = self.entries.len();
        self.entries.retain(|v| v.code() != code);
        before != self.entries.len()
    }

    pub fn get(&self, code: &str) -> Option<Arc<dyn Validator>> {
        self.entries.iter().find(|v| v.code() == code).cloned()
    }

    pub fn codes(&self) -> Vec<&'static str> {
        self.entries.iter().map(|v| v.code()).collect()
    }

    pub fn validators(&self) -> Vec<Arc<dyn Validator>> {
        self.entries.clone()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ValidationContext;
    use crate::validators::codes;
    use async_trait::async_trait;
    use gatekeeper_types::{ServiceResult, ValidatorResult};
    use proptest::prelude::*;

    struct Fake {
        code: &'static str,
        gate: GateId,
        order: u32,
        hard: bool,
    }

    #[async_trait]
    impl Validator for Fake {
        fn code(&self) -> &'static str {
            self.code
        }
        fn gate(&self) -> GateId {
            self.gate
        }
        fn order(&self) -> u32 {
            self.order
        }
        fn is_hard_block(&self) -> bool {
            self.hard
        }
        async fn execute(&self, _context: &ValidationContext) -> ServiceResult<ValidatorResult> {
            Ok(ValidatorResult::passed("ok"))
        }
    }

    fn fake(code: &'static str, gate: GateId, order: u32) -> Arc<dyn Validator> {
        Arc::new(Fake {
            code,
            gate,
            order,
            hard: false,
        })
    }

    #[test]
    fn standard_catalog_is_valid() {
        let config = GateConfig::standard().unwrap();
        assert_eq!(config.gate(GateId::Sanitization).len(), 5);
        assert_eq!(config.gate(GateId::Contract).len(), 8);
        assert_eq!(config.gate(GateId::Execution).len(), 5);
        assert_eq!(config.gate(GateId::Integrity).len(), 2);
        assert_eq!(config.len(), 20);
    }

    #[test]
    fn duplicate_codes_are_rejected() {
        let err = GateConfig::new(vec![
            fake("A", GateId::Sanitization, 1),
            fake("A", GateId::Contract, 1),
        ])
        .unwrap_err();
        assert_eq!(err, ConfigError::DuplicateCode("A".into()));
    }

    #[test]
    fn duplicate_orders_in_one_gate_are_rejected() {
        let err = GateConfig::new(vec![
            fake("A", GateId::Contract, 2),
            fake("B", GateId::Contract, 2),
        ])
        .unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateOrder { gate: 1, order: 2, .. }));
    }

    #[test]
    fn zero_order_is_rejected() {
        let err = GateConfig::new(vec![fake("A", GateId::Contract, 0)]).unwrap_err();
        assert_eq!(err, ConfigError::InvalidOrder("A".into()));
    }

    #[test]
    fn validators_are_sorted_by_order() {
        let config = GateConfig::new(vec![
            fake("C", GateId::Execution, 9),
            fake("A", GateId::Execution, 1),
            fake("B", GateId::Execution, 4),
        ])
        .unwrap();
        let codes: Vec<_> = config.gate(GateId::Execution).iter().map(|v| v.code()).collect();
        assert_eq!(codes, vec!["A", "B", "C"]);
    }

    #[test]
    fn overrides_toggle_and_disable() {
        let mut overrides = HashMap::new();
        overrides.insert(
            codes::STYLE_CONSISTENCY_LINT.to_string(),
            ValidatorOverride {
                enabled: None,
                hard_block: Some(true),
            },
        );
        overrides.insert(
            codes::TASK_CLARITY_CHECK.to_string(),
            ValidatorOverride {
                enabled: Some(false),
                hard_block: None,
            },
        );
        let registry = ValidatorRegistry::standard().unwrap();
        let config = GateConfig::from_registry(&registry, &overrides).unwrap();
        assert!(config.find(codes::STYLE_CONSISTENCY_LINT).unwrap().is_hard_block);
        assert!(config.find(codes::TASK_CLARITY_CHECK).is_none());
    }

    #[test]
    fn red_phase_cannot_be_relaxed() {
        let mut overrides = HashMap::new();
        overrides.insert(
            codes::TEST_FAILS_BEFORE_IMPLEMENTATION.to_string(),
            ValidatorOverride {
                enabled: Some(false),
                hard_block: Some(false),
            },
        );
        let config = GateConfig::with_overrides(validators::standard_catalog(), &overrides).unwrap();
        let red = config.find(codes::TEST_FAILS_BEFORE_IMPLEMENTATION).unwrap();
        assert!(red.is_hard_block);
    }

    #[test]
    fn unknown_override_is_a_config_error() {
        let mut overrides = HashMap::new();
        overrides.insert("NOPE".to_string(), ValidatorOverride::default());
        let err = GateConfig::with_overrides(validators::standard_catalog(), &overrides).unwrap_err();
        assert_eq!(err, ConfigError::UnknownValidator("NOPE".into()));
    }

    #[test]
    fn registry_rejects_duplicates_and_invalidates() {
        let mut registry = ValidatorRegistry::standard().unwrap();
        let before = registry.len();
        let dup = registry.get(codes::TASK_TEST_PASSES).unwrap();
        assert!(registry.register(dup).is_err());
        assert!(registry.invalidate(codes::TASK_TEST_PASSES));
        assert!(!registry.invalidate(codes::TASK_TEST_PASSES));
        assert_eq!(registry.len(), before - 1);
    }

    fn arb_gate() -> impl Strategy<Value = GateId> {
        prop_oneof![
            Just(GateId::Sanitization),
            Just(GateId::Contract),
            Just(GateId::Execution),
            Just(GateId::Integrity),
        ]
    }

    const CODES: [&str; 8] = ["V0", "V1", "V2", "V3", "V4", "V5", "V6", "V7"];

    proptest! {
        /// Any accepted configuration has unique codes and strictly
        /// increasing orders inside every gate.
        #[test]
        fn accepted_configs_have_unique_codes_and_increasing_orders(
            specs in proptest::collection::vec((0usize..8, arb_gate(), 1u32..6), 1..12)
        ) {
            let validators: Vec<Arc<dyn Validator>> = specs
                .iter()
                .map(|(code, gate, order)| fake(CODES[*code], *gate, *order))
                .collect();

            if let Ok(config) = GateConfig::new(validators) {
                let mut seen = std::collections::HashSet::new();
                for v in config.iter() {
                    prop_assert!(seen.insert(v.code()));
                }
                for gate in GateId::ALL {
                    let orders: Vec<u32> = config.gate(gate).iter().map(|v| v.order()).collect();
                    prop_assert!(orders.windows(2).all(|w| w[0] < w[1]));
                }
            }
        }
    }
}
