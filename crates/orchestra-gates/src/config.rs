//! Enforcement configuration
//!
//! The retry budget has no built-in default: it must come from the
//! server configuration.

use crate::mode::EnforcementMode;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("CONFIG/YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("CONFIG/INVALID: {0}")]
    Invalid(String),
}

/// Gate enforcement settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnforcementConfig {
    /// Profile name (e.g., "strict@1.0")
    #[serde(default = "default_name")]
    pub name: String,

    /// Rejections tolerated per gate before the gate blocks
    pub retry_budget: u32,

    /// Mode used when neither the request nor gate severities decide
    #[serde(default = "default_mode")]
    pub default_mode: EnforcementMode,

    /// Attempts allowed for shell verification gates
    #[serde(default = "default_shell_verify_attempts")]
    pub shell_verify_max_attempts: u32,
}

fn default_name() -> String {
    "custom".to_string()
}

fn default_mode() -> EnforcementMode {
    EnforcementMode::Blocking
}

fn default_shell_verify_attempts() -> u32 {
    5
}

impl EnforcementConfig {
    /// Create a config with the given retry budget
    pub fn new(retry_budget: u32) -> Self {
        Self {
            name: default_name(),
            retry_budget,
            default_mode: default_mode(),
            shell_verify_max_attempts: default_shell_verify_attempts(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_default_mode(mut self, mode: EnforcementMode) -> Self {
        self.default_mode = mode;
        self
    }

    pub fn with_shell_verify_attempts(mut self, attempts: u32) -> Self {
        self.shell_verify_max_attempts = attempts;
        self
    }

    /// Load config from YAML
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Check value ranges
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.shell_verify_max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "shell_verify_max_attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
