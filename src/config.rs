//! Gateway configuration parsing and validation.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::models::policy::{
    default_denylist, ApprovalPolicy, DenyRule, DEFAULT_ALLOWLIST, DEFAULT_NEUTRAL_FLAGS,
};
use crate::policy::loader::AllowlistLoader;
use crate::{AppError, Result};

/// Directory under the project root holding all gateway state.
pub const STATE_DIR: &str = ".command-gate";

/// Process supervision settings.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct ProcessConfig {
    /// Grace window between the graceful signal and the forced kill.
    #[serde(default = "default_kill_grace_ms")]
    pub kill_grace_ms: u64,
    /// Timeout applied when a spawn does not set one; 0 means no timeout.
    #[serde(default)]
    pub default_timeout_ms: u64,
    /// Whether to write the JSONL audit log.
    #[serde(default = "default_true")]
    pub audit: bool,
}

fn default_kill_grace_ms() -> u64 {
    5000
}

fn default_true() -> bool {
    true
}

impl Default for ProcessConfig {
    fn default() -> Self {
        Self {
            kill_grace_ms: default_kill_grace_ms(),
            default_timeout_ms: 0,
            audit: true,
        }
    }
}

/// Gateway configuration parsed from `command-gate.toml`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct GatewayConfig {
    /// Project root; all gateway state lives under `{project_root}/.command-gate`.
    pub project_root: PathBuf,
    /// Fallback allowlist used when the project has no override file.
    #[serde(default)]
    pub allowlist: Option<Vec<String>>,
    /// Flags stripped before denylist matching.
    #[serde(default)]
    pub neutral_flags: Option<Vec<String>>,
    /// Interpreter denylist; replaces the built-in rules when set.
    #[serde(default)]
    pub denylist: Option<Vec<DenyRule>>,
    /// Process supervision settings.
    #[serde(default)]
    pub process: ProcessConfig,
}

impl GatewayConfig {
    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse configuration from a TOML string and normalize paths.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let mut config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Default configuration for `project_root` without a config file.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if `project_root` does not exist.
    pub fn for_project(project_root: impl Into<PathBuf>) -> Result<Self> {
        let mut config = Self {
            project_root: project_root.into(),
            allowlist: None,
            neutral_flags: None,
            denylist: None,
            process: ProcessConfig::default(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Directory holding all gateway state for the project.
    #[must_use]
    pub fn state_dir(&self) -> PathBuf {
        self.project_root.join(STATE_DIR)
    }

    /// Path of the live-process registry.
    #[must_use]
    pub fn registry_path(&self) -> PathBuf {
        self.state_dir().join("local").join("processes.json")
    }

    /// Path of the project-level allowlist override.
    #[must_use]
    pub fn allowlist_path(&self) -> PathBuf {
        self.state_dir().join("allowlist.json")
    }

    /// Directory of the JSONL audit log.
    #[must_use]
    pub fn audit_dir(&self) -> PathBuf {
        self.state_dir().join("logs")
    }

    /// Grace window between the graceful signal and the forced kill.
    #[must_use]
    pub fn kill_grace(&self) -> Duration {
        Duration::from_millis(self.process.kill_grace_ms)
    }

    /// Build the effective approval policy.
    ///
    /// The allowlist comes from the project override file when present and
    /// valid, else from `allowlist` in the config, else the built-in default.
    #[must_use]
    pub fn approval_policy(&self) -> ApprovalPolicy {
        let fallback: Vec<String> = self
            .allowlist
            .clone()
            .unwrap_or_else(|| DEFAULT_ALLOWLIST.iter().map(|&p| p.to_owned()).collect());

        ApprovalPolicy {
            allowlist: AllowlistLoader::load(&self.project_root, &fallback),
            denylist: self.denylist.clone().unwrap_or_else(default_denylist),
            neutral_flags: self.neutral_flags.clone().unwrap_or_else(|| {
                DEFAULT_NEUTRAL_FLAGS
                    .iter()
                    .map(|&f| f.to_owned())
                    .collect()
            }),
        }
    }

    fn validate(&mut self) -> Result<()> {
        let canonical_root = self
            .project_root
            .canonicalize()
            .map_err(|err| AppError::Config(format!("project_root invalid: {err}")))?;
        self.project_root = canonical_root;

        if let Some(rules) = &self.denylist {
            for rule in rules {
                if rule.command.trim().is_empty() {
                    return Err(AppError::Config(
                        "denylist rule command must not be empty".into(),
                    ));
                }
                if rule.arg_prefixes.is_empty() || rule.arg_prefixes.iter().any(Vec::is_empty) {
                    return Err(AppError::Config(format!(
                        "denylist rule for {} needs non-empty arg_prefixes",
                        rule.command
                    )));
                }
            }
        }

        Ok(())
    }
}
