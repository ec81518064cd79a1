//! Collaborator traits consumed by the planner and stages
//!
//! Implementations live outside the planner (prompt loaders, gate registries,
//! framework managers). Failures are reported as
//! [`OrchestraError::ExternalLookup`](orchestra_core::OrchestraError) and
//! degrade planning rather than abort it.
use async_trait::async_trait;
use orchestra_core::{CategoryGateConfig, ConvertedPrompt, FrameworkExecutionContext, Result, SemanticAnalysis};
use orchestra_gates::GateSeverity;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

// === Gates ===

/// Gate definition as loaded by the provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateDefinition {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub criteria: Vec<String>,
    #[serde(default = "default_severity")]
    pub severity: GateSeverity,
    /// Gate belongs to a methodology (framework) rather than to a category
    #[serde(default)]
    pub methodology: bool,
    /// Categories that activate the gate; empty means every category
    #[serde(default)]
    pub categories: Vec<String>,
    /// Frameworks that activate the gate; empty means every framework
    #[serde(default)]
    pub frameworks: Vec<String>,
}

fn default_severity() -> GateSeverity {
    GateSeverity::Medium
}

impl GateDefinition {
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            criteria: Vec::new(),
            severity: default_severity(),
            methodology: false,
            categories: Vec::new(),
            frameworks: Vec::new(),
        }
    }

    pub fn with_criteria(mut self, criterion: impl Into<String>) -> Self {
        self.criteria.push(criterion.into());
        self
    }

    pub fn with_severity(mut self, severity: GateSeverity) -> Self {
        self.severity = severity;
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.categories.push(category.into());
        self
    }

    pub fn methodology(mut self, framework: impl Into<String>) -> Self {
        self.methodology = true;
        self.frameworks.push(framework.into());
        self
    }

    /// Whether the gate applies under `criteria`
    pub fn activates_for(&self, criteria: &ActivationCriteria) -> bool {
        let category_ok = self.categories.is_empty()
            || criteria
                .category
                .as_deref()
                .map(|c| self.categories.iter().any(|g| g.eq_ignore_ascii_case(c)))
                .unwrap_or(false);
        let framework_ok = self.frameworks.is_empty()
            || criteria
                .framework
                .as_deref()
                .map(|f| self.frameworks.iter().any(|g| g.eq_ignore_ascii_case(f)))
                .unwrap_or(false);
        category_ok && framework_ok
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivationCriteria {
    pub category: Option<String>,
    pub framework: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GateActivation {
    pub active: Vec<GateDefinition>,
    /// Requested IDs that did not activate or are unknown
    pub skipped: Vec<String>,
}

/// Input for category-driven gate selection
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GateSelectionRequest {
    pub prompt_id: String,
    pub category: Option<String>,
    pub framework: Option<String>,
    /// Gates already chosen explicitly
    pub explicit_gates: BTreeSet<String>,
}

#[async_trait]
pub trait GateSelector: Send + Sync {
    /// Gate IDs suggested for the request's category
    async fn select_gates(&self, request: &GateSelectionRequest) -> Result<Vec<String>>;
}

#[async_trait]
pub trait GateDefinitionProvider: Send + Sync {
    async fn load_gates(&self, ids: &[String]) -> Result<Vec<GateDefinition>>;

    async fn active_gates(&self, ids: &[String], criteria: &ActivationCriteria) -> Result<GateActivation>;

    async fn methodology_gate_ids(&self) -> Result<BTreeSet<String>>;

    /// Version of the loaded definitions; bumped on reload
    fn source_version(&self) -> u64;
}

// === Prompts ===

#[async_trait]
pub trait SemanticAnalyzer: Send + Sync {
    async fn analyze(&self, prompt: &ConvertedPrompt) -> Result<SemanticAnalysis>;
}

#[async_trait]
pub trait CategoryResolver: Send + Sync {
    /// Category for a prompt that does not declare one
    async fn resolve_category(&self, prompt: &ConvertedPrompt) -> Result<Option<String>>;

    /// Category-level gate include/exclude lists
    async fn category_config(&self, category: &str) -> Result<Option<CategoryGateConfig>>;
}

// === Frameworks ===

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameworkDefinition {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub system_prompt_template: String,
    #[serde(default)]
    pub guidelines: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FrameworkSelectionCriteria {
    pub framework_id: Option<String>,
    pub prompt_id: Option<String>,
}

#[async_trait]
pub trait FrameworkManager: Send + Sync {
    /// Framework active on the server, if any
    fn active_framework(&self) -> Option<String>;

    async fn select_framework(&self, criteria: &FrameworkSelectionCriteria) -> Result<FrameworkDefinition>;

    async fn generate_execution_context(
        &self,
        prompt: &ConvertedPrompt,
        criteria: &FrameworkSelectionCriteria,
    ) -> Result<FrameworkExecutionContext>;
}
