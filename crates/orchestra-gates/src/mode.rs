//! Enforcement modes and their resolution inputs

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// How strictly a failing gate is enforced
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnforcementMode {
    /// Gates are guidance only; no review is requested
    Informational = 0,
    /// Review is requested but a failure does not hold the chain
    Advisory = 1,
    /// A failure holds the chain until retried or blocked
    Blocking = 2,
}

impl EnforcementMode {
    /// Whether a failing verdict can hold the chain
    pub fn blocks(&self) -> bool {
        matches!(self, EnforcementMode::Blocking)
    }

    /// Whether a verdict must be collected at all
    pub fn requires_review(&self) -> bool {
        !matches!(self, EnforcementMode::Informational)
    }
}

impl fmt::Display for EnforcementMode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            EnforcementMode::Informational => write!(f, "informational"),
            EnforcementMode::Advisory => write!(f, "advisory"),
            EnforcementMode::Blocking => write!(f, "blocking"),
        }
    }
}

impl FromStr for EnforcementMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "informational" | "info" => Ok(EnforcementMode::Informational),
            "advisory" | "warn" => Ok(EnforcementMode::Advisory),
            "blocking" | "block" => Ok(EnforcementMode::Blocking),
            other => Err(format!("unknown enforcement mode '{}'", other)),
        }
    }
}

/// Severity declared on a gate definition
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GateSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl GateSeverity {
    /// Mode implied by this severity when nothing more explicit is set
    pub fn implied_mode(self) -> EnforcementMode {
        match self {
            GateSeverity::Critical | GateSeverity::High => EnforcementMode::Blocking,
            GateSeverity::Medium => EnforcementMode::Advisory,
            GateSeverity::Low => EnforcementMode::Informational,
        }
    }
}

/// Inputs for resolving the enforcement mode of one request
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnforcementInput {
    /// Mode explicitly requested by the caller
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requested_mode: Option<EnforcementMode>,
    /// Severities of the gates that apply
    #[serde(default)]
    pub gate_severities: Vec<GateSeverity>,
}

impl EnforcementInput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn requested(mut self, mode: EnforcementMode) -> Self {
        self.requested_mode = Some(mode);
        self
    }

    pub fn with_severity(mut self, severity: GateSeverity) -> Self {
        self.gate_severities.push(severity);
        self
    }
}
