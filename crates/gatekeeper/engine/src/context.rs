use std::collections::HashMap;
use std::path::{Path, PathBuf};

use gatekeeper_types::{Contract, Manifest};

use crate::services::Services;

/// Inputs and service handles for one validation run.
///
/// Built once by the caller and lent read-only to the engine; validators only
/// affect the outside world through `services`.
#[derive(Clone, Debug)]
pub struct ValidationContext {
    pub run_id: String,
    pub project_path: PathBuf,
    pub base_ref: String,
    pub target_ref: String,
    pub task_prompt: String,
    pub test_file_path: Option<String>,
    pub danger_mode: bool,
    pub manifest: Option<Manifest>,
    pub contract: Option<Contract>,
    /// Raw contract text as submitted
    pub contract_json: Option<String>,
    /// Why `contract_json` could not be parsed, if it could not
    pub contract_parse_error: Option<String>,
    pub services: Services,
    pub config: HashMap<String, String>,
    pub sensitive_patterns: Vec<String>,
    pub ambiguous_terms: Vec<String>,
}

impl ValidationContext {
    pub fn builder(project_path: impl Into<PathBuf>, services: Services) -> ValidationContextBuilder {
        ValidationContextBuilder::new(project_path.into(), services)
    }

    /// Base ref, if one was supplied.
    pub fn base_ref(&self) -> Option<&str> {
        non_empty(&self.base_ref)
    }

    pub fn target_ref(&self) -> Option<&str> {
        non_empty(&self.target_ref)
    }

    /// Test file under validation, falling back to the manifest's.
    pub fn test_file(&self) -> Option<&str> {
        self.test_file_path
            .as_deref()
            .and_then(non_empty)
            .or_else(|| self.manifest.as_ref().and_then(|m| non_empty(&m.test_file)))
    }

    pub fn config_value(&self, key: &str) -> Option<&str> {
        self.config.get(key).map(String::as_str)
    }

    /// A numeric config entry, or `default` when absent or malformed.
    pub fn config_number(&self, key: &str, default: usize) -> usize {
        self.config_value(key)
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(default)
    }

    pub fn project_file(&self, relative: &str) -> PathBuf {
        self.project_path.join(relative)
    }

    pub fn project_path(&self) -> &Path {
        &self.project_path
    }
}

fn non_empty(value: &str) -> Option<&str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed)
    }
}

pub struct ValidationContextBuilder {
    context: ValidationContext,
}

impl ValidationContextBuilder {
    fn new(project_path: PathBuf, services: Services) -> Self {
        Self {
            context: ValidationContext {
                run_id: uuid::Uuid::new_v4().to_string(),
                project_path,
                base_ref: String::new(),
                target_ref: String::new(),
                task_prompt: String::new(),
                test_file_path: None,
                danger_mode: false,
                manifest: None,
                contract: None,
                contract_json: None,
                contract_parse_error: None,
                services,
                config: HashMap::new(),
                sensitive_patterns: Vec::new(),
                ambiguous_terms: Vec::new(),
            },
        }
    }

    pub fn run_id(mut self, run_id: impl Into<String>) -> Self {
        self.context.run_id = run_id.into();
        self
    }

    pub fn refs(mut self, base_ref: impl Into<String>, target_ref: impl Into<String>) -> Self {
        self.context.base_ref = base_ref.into();
        self.context.target_ref = target_ref.into();
        self
    }

    pub fn task_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.context.task_prompt = prompt.into();
        self
    }

    pub fn test_file(mut self, path: impl Into<String>) -> Self {
        self.context.test_file_path = Some(path.into());
        self
    }

    pub fn danger_mode(mut self, enabled: bool) -> Self {
        self.context.danger_mode = enabled;
        self
    }

    pub fn manifest(mut self, manifest: Manifest) -> Self {
        self.context.manifest = Some(manifest);
        self
    }

    pub fn contract(mut self, contract: Contract) -> Self {
        self.context.contract_json = serde_json::to_string(&contract).ok();
        self.context.contract = Some(contract);
        self
    }

    /// Attach raw contract text, parsing it. Parse failures are kept in
    /// `contract_parse_error` for the schema validator to report.
    pub fn contract_json(mut self, json: impl Into<String>) -> Self {
        let json = json.into();
        match serde_json::from_str::<Contract>(&json) {
            Ok(contract) => {
                self.context.contract = Some(contract);
                self.context.contract_parse_error = None;
            }
            Err(err) => {
                self.context.contract = None;
                self.context.contract_parse_error = Some(err.to_string());
            }
        }
        self.context.contract_json = Some(json);
        self
    }

    pub fn config(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.config.insert(key.into(), value.into());
        self
    }

    pub fn sensitive_patterns(mut self, patterns: Vec<String>) -> Self {
        self.context.sensitive_patterns = patterns;
        self
    }

    pub fn ambiguous_terms(mut self, terms: Vec<String>) -> Self {
        self.context.ambiguous_terms = terms;
        self
    }

    pub fn build(self) -> ValidationContext {
        self.context
    }
}
