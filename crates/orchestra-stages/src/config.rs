//! Orchestra configuration loaded from YAML
use orchestra_core::{CategoryGateConfig, OrchestraError, Result};
use orchestra_gates::EnforcementConfig;
use orchestra_planner::{FrameworkDefinition, GateDefinition};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestraConfig {
    /// Profile name (e.g., "default@1.0")
    #[serde(default = "default_name")]
    pub name: String,

    // === Frameworks ===
    #[serde(default)]
    pub frameworks: FrameworkSettings,

    // === Gates ===
    /// Retry budget and enforcement defaults
    pub enforcement: EnforcementConfig,

    #[serde(default)]
    pub gates: Vec<GateDefinition>,

    // === Categories ===
    #[serde(default)]
    pub categories: Vec<CategoryGateConfig>,

    /// Category for prompts that declare none
    #[serde(default)]
    pub default_category: Option<String>,

    // === Sessions ===
    #[serde(default)]
    pub sessions: SessionSettings,

    // === Shell verification ===
    /// Timeout for shell verification commands without their own
    #[serde(default = "default_shell_timeout")]
    pub shell_timeout_secs: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FrameworkSettings {
    /// Server-level framework support
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub active: Option<String>,
    #[serde(default)]
    pub definitions: Vec<FrameworkDefinition>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SessionSettings {
    #[default]
    Memory,
    File { dir: PathBuf },
}

fn default_name() -> String {
    "default@1.0".to_string()
}

fn default_shell_timeout() -> u64 {
    300
}

impl OrchestraConfig {
    /// Minimal config with the given retry budget
    pub fn new(retry_budget: u32) -> Self {
        Self {
            name: default_name(),
            frameworks: FrameworkSettings::default(),
            enforcement: EnforcementConfig::new(retry_budget),
            gates: Vec::new(),
            categories: Vec::new(),
            default_category: None,
            sessions: SessionSettings::default(),
            shell_timeout_secs: default_shell_timeout(),
        }
    }

    /// Load from YAML text
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml).map_err(|e| OrchestraError::Config(format!("YAML: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a YAML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path)
            .map_err(|e| OrchestraError::Config(format!("read {}: {}", path.display(), e)))?;
        Self::from_yaml(&yaml)
    }

    /// Check cross-references between sections
    pub fn validate(&self) -> Result<()> {
        self.enforcement
            .validate()
            .map_err(|e| OrchestraError::Config(e.to_string()))?;

        if let Some(active) = self.frameworks.active.as_deref() {
            let known = self
                .frameworks
                .definitions
                .iter()
                .any(|f| f.id.eq_ignore_ascii_case(active));
            if !known {
                return Err(OrchestraError::Config(format!("active framework '{}' is not defined", active)));
            }
        }

        let mut seen = std::collections::HashSet::new();
        for gate in &self.gates {
            if !seen.insert(gate.id.as_str()) {
                return Err(OrchestraError::Config(format!("duplicate gate '{}'", gate.id)));
            }
        }
        Ok(())
    }
}
