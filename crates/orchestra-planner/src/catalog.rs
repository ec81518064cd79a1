//! In-memory collaborators backed by loaded definitions
//!
//! Used when gates, categories and frameworks come from configuration
//! rather than from a live registry.
use crate::collaborators::{
    ActivationCriteria, CategoryResolver, FrameworkDefinition, FrameworkManager, FrameworkSelectionCriteria,
    GateActivation, GateDefinition, GateDefinitionProvider, GateSelectionRequest, GateSelector, SemanticAnalyzer,
};
use async_trait::async_trait;
use orchestra_core::framework::normalize_framework_id;
use orchestra_core::{
    AnalyzedExecutionType, CategoryGateConfig, ConvertedPrompt, FrameworkExecutionContext, OrchestraError, Result,
    SemanticAnalysis,
};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;
use tracing::{debug, info};

// === Gates ===

/// Gate definitions keyed by ID. `reload` bumps the source version.
#[derive(Debug, Default)]
pub struct GateCatalog {
    definitions: RwLock<BTreeMap<String, GateDefinition>>,
    version: AtomicU64,
}

impl GateCatalog {
    pub fn new(definitions: impl IntoIterator<Item = GateDefinition>) -> Self {
        Self {
            definitions: RwLock::new(definitions.into_iter().map(|d| (d.id.clone(), d)).collect()),
            version: AtomicU64::new(1),
        }
    }

    pub async fn reload(&self, definitions: impl IntoIterator<Item = GateDefinition>) {
        let mut map = self.definitions.write().await;
        *map = definitions.into_iter().map(|d| (d.id.clone(), d)).collect();
        let version = self.version.fetch_add(1, Ordering::SeqCst) + 1;
        info!(gates = map.len(), version, "gate catalog reloaded");
    }

    pub async fn get(&self, id: &str) -> Option<GateDefinition> {
        self.definitions.read().await.get(id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.definitions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.definitions.read().await.is_empty()
    }
}

#[async_trait]
impl GateDefinitionProvider for GateCatalog {
    async fn load_gates(&self, ids: &[String]) -> Result<Vec<GateDefinition>> {
        let map = self.definitions.read().await;
        Ok(ids.iter().filter_map(|id| map.get(id).cloned()).collect())
    }

    async fn active_gates(&self, ids: &[String], criteria: &ActivationCriteria) -> Result<GateActivation> {
        let map = self.definitions.read().await;
        let mut activation = GateActivation::default();
        for id in ids {
            match map.get(id) {
                Some(def) if def.activates_for(criteria) => activation.active.push(def.clone()),
                _ => activation.skipped.push(id.clone()),
            }
        }
        Ok(activation)
    }

    async fn methodology_gate_ids(&self) -> Result<BTreeSet<String>> {
        let map = self.definitions.read().await;
        Ok(map.values().filter(|d| d.methodology).map(|d| d.id.clone()).collect())
    }

    fn source_version(&self) -> u64 {
        self.version.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GateSelector for GateCatalog {
    /// Non-methodology gates bound to the request's category
    async fn select_gates(&self, request: &GateSelectionRequest) -> Result<Vec<String>> {
        let Some(category) = request.category.as_deref() else {
            return Ok(Vec::new());
        };
        let map = self.definitions.read().await;
        let selected: Vec<String> = map
            .values()
            .filter(|d| !d.methodology && d.categories.iter().any(|c| c.eq_ignore_ascii_case(category)))
            .filter(|d| !request.explicit_gates.contains(&d.id))
            .map(|d| d.id.clone())
            .collect();
        debug!(category, selected = selected.len(), "category gates selected");
        Ok(selected)
    }
}

// === Categories ===

#[derive(Debug, Clone, Default)]
pub struct CategoryCatalog {
    configs: HashMap<String, CategoryGateConfig>,
    default_category: Option<String>,
}

impl CategoryCatalog {
    pub fn new(configs: impl IntoIterator<Item = CategoryGateConfig>) -> Self {
        Self {
            configs: configs.into_iter().map(|c| (c.category.to_ascii_lowercase(), c)).collect(),
            default_category: None,
        }
    }

    /// Category given to prompts that declare none
    pub fn with_default_category(mut self, category: impl Into<String>) -> Self {
        self.default_category = Some(category.into());
        self
    }
}

#[async_trait]
impl CategoryResolver for CategoryCatalog {
    async fn resolve_category(&self, _prompt: &ConvertedPrompt) -> Result<Option<String>> {
        Ok(self.default_category.clone())
    }

    async fn category_config(&self, category: &str) -> Result<Option<CategoryGateConfig>> {
        Ok(self.configs.get(&category.to_ascii_lowercase()).cloned())
    }
}

// === Frameworks ===

#[derive(Debug, Clone, Default)]
pub struct FrameworkCatalog {
    frameworks: BTreeMap<String, FrameworkDefinition>,
    active: Option<String>,
}

impl FrameworkCatalog {
    pub fn new(frameworks: impl IntoIterator<Item = FrameworkDefinition>) -> Self {
        Self {
            frameworks: frameworks
                .into_iter()
                .map(|f| (normalize_framework_id(&f.id), f))
                .collect(),
            active: None,
        }
    }

    pub fn with_active(mut self, framework_id: impl AsRef<str>) -> Self {
        self.active = Some(normalize_framework_id(framework_id.as_ref()));
        self
    }

    fn lookup(&self, criteria: &FrameworkSelectionCriteria) -> Result<&FrameworkDefinition> {
        let id = criteria
            .framework_id
            .as_deref()
            .map(normalize_framework_id)
            .or_else(|| self.active.clone())
            .ok_or_else(|| OrchestraError::ExternalLookup("no framework selected and none active".to_string()))?;
        self.frameworks
            .get(&id)
            .ok_or_else(|| OrchestraError::ExternalLookup(format!("unknown framework '{}'", id)))
    }
}

#[async_trait]
impl FrameworkManager for FrameworkCatalog {
    fn active_framework(&self) -> Option<String> {
        self.active.clone()
    }

    async fn select_framework(&self, criteria: &FrameworkSelectionCriteria) -> Result<FrameworkDefinition> {
        self.lookup(criteria).cloned()
    }

    async fn generate_execution_context(
        &self,
        prompt: &ConvertedPrompt,
        criteria: &FrameworkSelectionCriteria,
    ) -> Result<FrameworkExecutionContext> {
        let framework = self.lookup(criteria)?;
        let system_prompt = framework
            .system_prompt_template
            .replace("{{framework}}", &framework.name)
            .replace("{{prompt}}", &prompt.name);
        Ok(FrameworkExecutionContext {
            framework_id: normalize_framework_id(&framework.id),
            system_prompt,
            guidelines: framework.guidelines.clone(),
        })
    }
}

// === Analysis ===

/// Classifies prompts by their declared structure only
#[derive(Debug, Clone, Copy, Default)]
pub struct StructuralAnalyzer;

#[async_trait]
impl SemanticAnalyzer for StructuralAnalyzer {
    async fn analyze(&self, prompt: &ConvertedPrompt) -> Result<SemanticAnalysis> {
        let chain = prompt.declares_chain();
        Ok(SemanticAnalysis {
            execution_type: if chain {
                AnalyzedExecutionType::Chain
            } else {
                AnalyzedExecutionType::Single
            },
            requires_chain_execution: chain,
            has_chain_step_characteristics: chain,
            confidence: 1.0,
            reasoning: vec![if chain {
                format!("declares {} chain steps", prompt.chain_steps.len())
            } else {
                "no chain steps declared".to_string()
            }],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> GateCatalog {
        GateCatalog::new(vec![
            GateDefinition::new("code-quality").with_category("code"),
            GateDefinition::new("security").with_category("code"),
            GateDefinition::new("clarity").with_category("writing"),
            GateDefinition::new("framework-compliance").methodology("CAGEERF"),
        ])
    }

    #[tokio::test]
    async fn test_select_by_category() {
        let request = GateSelectionRequest {
            prompt_id: "review".to_string(),
            category: Some("Code".to_string()),
            ..Default::default()
        };
        let gates = catalog().select_gates(&request).await.unwrap();
        assert_eq!(gates, vec!["code-quality", "security"]);
    }

    #[tokio::test]
    async fn test_methodology_ids_and_reload() {
        let catalog = catalog();
        let v1 = catalog.source_version();
        assert_eq!(
            catalog.methodology_gate_ids().await.unwrap(),
            BTreeSet::from(["framework-compliance".to_string()])
        );

        catalog.reload(vec![GateDefinition::new("x").methodology("REACT")]).await;
        assert!(catalog.source_version() > v1);
        assert!(catalog.methodology_gate_ids().await.unwrap().contains("x"));
    }

    #[tokio::test]
    async fn test_active_gates_by_framework() {
        let criteria = ActivationCriteria {
            category: Some("code".to_string()),
            framework: Some("react".to_string()),
        };
        let ids = vec!["code-quality".to_string(), "framework-compliance".to_string(), "nope".to_string()];
        let activation = catalog().active_gates(&ids, &criteria).await.unwrap();
        assert_eq!(activation.active.len(), 1);
        assert_eq!(activation.skipped, vec!["framework-compliance", "nope"]);
    }

    #[tokio::test]
    async fn test_framework_context() {
        let frameworks = FrameworkCatalog::new(vec![FrameworkDefinition {
            id: "cageerf".to_string(),
            name: "C.A.G.E.E.R.F".to_string(),
            system_prompt_template: "Apply {{framework}} to {{prompt}}".to_string(),
            guidelines: vec!["context first".to_string()],
        }])
        .with_active("CAGEERF");

        let prompt = ConvertedPrompt::new("analyze");
        let ctx = frameworks
            .generate_execution_context(&prompt, &FrameworkSelectionCriteria::default())
            .await
            .unwrap();
        assert_eq!(ctx.framework_id, "CAGEERF");
        assert_eq!(ctx.system_prompt, "Apply C.A.G.E.E.R.F to analyze");

        let missing = FrameworkSelectionCriteria {
            framework_id: Some("react".to_string()),
            prompt_id: None,
        };
        assert!(matches!(
            frameworks.select_framework(&missing).await,
            Err(OrchestraError::ExternalLookup(_))
        ));
    }
}
