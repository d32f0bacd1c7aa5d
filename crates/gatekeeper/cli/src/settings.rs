//! Configuration for the gatekeeper binary.
//!
//! Sources, later ones winning: built-in defaults, an optional file
//! (`gatekeeper.toml`, `.yaml` or `.json`), then `GATEKEEPER_*` environment
//! variables with `__` between sections, e.g. `GATEKEEPER_LOGGING__LEVEL=debug`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use gatekeeper_engine::ValidatorOverride;
use gatekeeper_sandbox::SandboxConfig;
use gatekeeper_toolchain::CommandTemplates;
use serde::{Deserialize, Serialize};

pub const ENV_PREFIX: &str = "GATEKEEPER";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GatekeeperConfig {
    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub sandbox: SandboxSettings,

    /// Toolchain command templates
    #[serde(default)]
    pub commands: CommandTemplates,

    #[serde(default)]
    pub gates: GatesConfig,

    #[serde(default)]
    pub limits: LimitsConfig,

    /// Defaults for the matching validation context fields
    #[serde(default)]
    pub context: ContextDefaults,

    #[serde(default)]
    pub red_phase: RedPhaseConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxSettings {
    /// Where sandboxes are created; empty means
    /// `<project>/.gatekeeper/sandboxes`, relative paths start at the project
    #[serde(default)]
    pub base_dir: String,

    #[serde(default = "default_dependency_dirs")]
    pub dependency_dirs: Vec<String>,
}

impl Default for SandboxSettings {
    fn default() -> Self {
        Self {
            base_dir: String::new(),
            dependency_dirs: default_dependency_dirs(),
        }
    }
}

impl SandboxSettings {
    pub fn service_config(&self) -> SandboxConfig {
        SandboxConfig {
            dependency_dirs: self.dependency_dirs.clone(),
        }
    }

    pub fn base_dir_for(&self, project: &Path) -> PathBuf {
        if self.base_dir.trim().is_empty() {
            project.join(".gatekeeper").join("sandboxes")
        } else {
            project.join(&self.base_dir)
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GatesConfig {
    /// Per-validator overrides keyed by validator code
    #[serde(default)]
    pub validators: HashMap<String, ValidatorOverride>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    #[serde(default = "default_max_prompt_tokens")]
    pub max_prompt_tokens: usize,

    #[serde(default = "default_max_manifest_files")]
    pub max_manifest_files: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_prompt_tokens: default_max_prompt_tokens(),
            max_manifest_files: default_max_manifest_files(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextDefaults {
    #[serde(default = "default_sensitive_patterns")]
    pub sensitive_patterns: Vec<String>,

    #[serde(default = "default_ambiguous_terms")]
    pub ambiguous_terms: Vec<String>,
}

impl Default for ContextDefaults {
    fn default() -> Self {
        Self {
            sensitive_patterns: default_sensitive_patterns(),
            ambiguous_terms: default_ambiguous_terms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedPhaseConfig {
    /// `in_place` or `sandbox`
    #[serde(default = "default_isolation")]
    pub isolation: String,
}

impl Default for RedPhaseConfig {
    fn default() -> Self {
        Self {
            isolation: default_isolation(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_dependency_dirs() -> Vec<String> {
    SandboxConfig::default().dependency_dirs
}

fn default_max_prompt_tokens() -> usize {
    100_000
}

fn default_max_manifest_files() -> usize {
    10
}

fn default_sensitive_patterns() -> Vec<String> {
    [
        ".env*",
        "**/*.pem",
        "**/*.key",
        "**/secrets/**",
        ".github/workflows/**",
        "package-lock.json",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_ambiguous_terms() -> Vec<String> {
    [
        "maybe",
        "somehow",
        "etc",
        "and so on",
        "as needed",
        "appropriate",
        "various",
        "improve",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_isolation() -> String {
    "in_place".to_string()
}

impl GatekeeperConfig {
    /// Load configuration with the `GATEKEEPER_` environment prefix.
    pub fn load(path: Option<&str>) -> Result<Self, config::ConfigError> {
        Self::load_with_prefix(path, ENV_PREFIX)
    }

    pub fn load_with_prefix(path: Option<&str>, env_prefix: &str) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();

        builder = builder.add_source(config::Config::try_from(&GatekeeperConfig::default())?);

        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(true));
        } else {
            builder = builder.add_source(config::File::with_name("gatekeeper").required(false));
        }

        builder = builder.add_source(
            config::Environment::with_prefix(env_prefix)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        builder.build()?.try_deserialize()
    }

    /// Validator overrides keyed by upper-case code.
    pub fn overrides(&self) -> HashMap<String, ValidatorOverride> {
        self.gates
            .validators
            .iter()
            .map(|(code, o)| (code.to_ascii_uppercase(), o.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = GatekeeperConfig::default();
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.sandbox.dependency_dirs, ["node_modules"]);
        assert_eq!(config.limits.max_prompt_tokens, 100_000);
        assert_eq!(config.red_phase.isolation, "in_place");
        assert!(config.context.sensitive_patterns.contains(&".env*".to_string()));
        assert!(config.overrides().is_empty());
    }

    #[test]
    fn sandbox_base_dir_defaults_under_the_project() {
        let settings = SandboxSettings::default();
        assert_eq!(
            settings.base_dir_for(Path::new("/work/app")),
            PathBuf::from("/work/app/.gatekeeper/sandboxes")
        );
        let settings = SandboxSettings {
            base_dir: "/tmp/boxes".into(),
            ..Default::default()
        };
        assert_eq!(settings.base_dir_for(Path::new("/work/app")), PathBuf::from("/tmp/boxes"));
        let settings = SandboxSettings {
            base_dir: "../boxes".into(),
            ..Default::default()
        };
        assert_eq!(
            settings.base_dir_for(Path::new("/work/app")),
            PathBuf::from("/work/app/../boxes")
        );
    }

    #[test]
    fn file_values_override_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gatekeeper.toml");
        std::fs::write(
            &path,
            r#"
[logging]
level = "debug"

[commands]
test_single = "cargo test {file}"

[gates.validators.TASK_SCOPE_SIZE]
enabled = false

[red_phase]
isolation = "sandbox"
"#,
        )
        .unwrap();

        let config =
            GatekeeperConfig::load_with_prefix(path.to_str(), "GATEKEEPER_FILE_TEST").unwrap();

        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.commands.test_single, "cargo test {file}");
        assert_eq!(config.commands.build, CommandTemplates::default().build);
        assert_eq!(config.red_phase.isolation, "sandbox");
        assert_eq!(
            config.overrides().get("TASK_SCOPE_SIZE"),
            Some(&ValidatorOverride {
                enabled: Some(false),
                hard_block: None
            })
        );
        assert_eq!(config.limits.max_manifest_files, 10);
    }

    #[test]
    fn environment_overrides_file() {
        std::env::set_var("GKENVTEST_LIMITS__MAX_MANIFEST_FILES", "3");
        std::env::set_var("GKENVTEST_LOGGING__JSON", "true");

        let config = GatekeeperConfig::load_with_prefix(None, "GKENVTEST").unwrap();

        assert_eq!(config.limits.max_manifest_files, 3);
        assert!(config.logging.json);
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        assert!(GatekeeperConfig::load_with_prefix(Some("/nonexistent/gatekeeper.toml"), "GKMISSING").is_err());
    }
}
