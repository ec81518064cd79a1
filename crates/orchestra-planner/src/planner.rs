//! Execution Planner
//!
//! Turns a parsed command and its resolved prompt into an immutable
//! [`ExecutionPlan`]: strategy, gate set, framework and session
//! requirements, and the authoritative modifier.
//!
//! Planning never fails on collaborator errors. A failed lookup is recorded
//! as a diagnostic and planning continues without that input. Only chain
//! planning rejects its input (no steps, unresolvable prompts).
use crate::cache::VersionedCache;
use crate::collaborators::{CategoryResolver, GateDefinitionProvider, GateSelectionRequest, GateSelector, SemanticAnalyzer};
use orchestra_core::{
    ChainPlan, ChainStep, CommandType, ConvertedPrompt, Diagnostic, DiagnosticAccumulator, ExecutionContext,
    ExecutionPlan, ExecutionStrategy, GateAccumulator, GateEntry, GateOverrides, GateSource, Modifier, Modifiers,
    OperatorKind, OrchestraError, ParsedCommand, PlanParts, Result, SemanticAnalysis, StepPlan, SymbolicOperator,
};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info};

/// Result of planning one command
#[derive(Debug, Clone)]
pub struct PlanOutcome {
    pub plan: ExecutionPlan,
    /// Surviving gate contributions, in registration order
    pub gates: Vec<GateEntry>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Result of planning a chain
#[derive(Debug, Clone)]
pub struct ChainPlanOutcome {
    pub chain: ChainPlan,
    /// Contributions to the chain-level plan
    pub gates: Vec<GateEntry>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Per-call planning input
struct PlanInput<'a> {
    parsed: Option<&'a ParsedCommand>,
    prompt: &'a ConvertedPrompt,
    framework_enabled: bool,
    overrides: Option<&'a GateOverrides>,
    /// Strategy fixed by the caller (chain-level and step plans)
    forced_strategy: Option<ExecutionStrategy>,
    /// Inline gate IDs of the step being planned
    step_gates: &'a [String],
    /// Modifier already resolved upstream
    resolved_modifiers: Option<Modifiers>,
    forced_session: bool,
}

#[derive(Default)]
pub struct ExecutionPlanner {
    gate_selector: Option<Arc<dyn GateSelector>>,
    gate_provider: Option<Arc<dyn GateDefinitionProvider>>,
    semantic_analyzer: Option<Arc<dyn SemanticAnalyzer>>,
    category_resolver: Option<Arc<dyn CategoryResolver>>,
    methodology_gates: VersionedCache<BTreeSet<String>>,
}

impl ExecutionPlanner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_gate_selector(mut self, selector: Arc<dyn GateSelector>) -> Self {
        self.gate_selector = Some(selector);
        self
    }

    pub fn with_gate_provider(mut self, provider: Arc<dyn GateDefinitionProvider>) -> Self {
        self.gate_provider = Some(provider);
        self
    }

    pub fn with_semantic_analyzer(mut self, analyzer: Arc<dyn SemanticAnalyzer>) -> Self {
        self.semantic_analyzer = Some(analyzer);
        self
    }

    pub fn with_category_resolver(mut self, resolver: Arc<dyn CategoryResolver>) -> Self {
        self.category_resolver = Some(resolver);
        self
    }

    /// Methodology gate cache, exposed for inspection
    pub fn methodology_cache(&self) -> &VersionedCache<BTreeSet<String>> {
        &self.methodology_gates
    }

    // === Public API ===

    /// Plan a single command
    pub async fn create_plan(
        &self,
        parsed: Option<&ParsedCommand>,
        prompt: &ConvertedPrompt,
        framework_enabled: bool,
        overrides: Option<&GateOverrides>,
    ) -> PlanOutcome {
        let input = PlanInput {
            parsed,
            prompt,
            framework_enabled,
            overrides,
            forced_strategy: None,
            step_gates: &[],
            resolved_modifiers: None,
            forced_session: false,
        };
        let mut gates = GateAccumulator::new();
        let mut diagnostics = DiagnosticAccumulator::new();
        let plan = self.plan(&input, &mut gates, &mut diagnostics).await;

        PlanOutcome {
            plan,
            gates: gates.entries().into_iter().cloned().collect(),
            diagnostics: diagnostics.all().to_vec(),
        }
    }

    /// Plan a chain: one chain-level plan plus one plan per step
    pub async fn create_chain_plan(
        &self,
        parsed: &ParsedCommand,
        steps: &[ChainStep],
        framework_enabled: bool,
        overrides: Option<&GateOverrides>,
    ) -> Result<ChainPlanOutcome> {
        if steps.is_empty() {
            return Err(OrchestraError::PlanningInput(
                "chain planning requires at least one step".to_string(),
            ));
        }

        if let Some(step) = steps.iter().find(|s| s.converted_prompt.is_none()) {
            return Err(OrchestraError::PlanningInput(format!(
                "chain step {} has no resolvable prompt: '{}'",
                step.step_number, step.prompt_id
            )));
        }

        let base_prompt = parsed
            .converted_prompt
            .as_ref()
            .or_else(|| steps[0].converted_prompt.as_ref())
            .ok_or_else(|| {
                OrchestraError::PlanningInput("no resolvable prompt for chain: command and first step are unresolved".to_string())
            })?;

        let mut gates = GateAccumulator::new();
        let mut diagnostics = DiagnosticAccumulator::new();

        let chain_input = PlanInput {
            parsed: Some(parsed),
            prompt: base_prompt,
            framework_enabled,
            overrides,
            forced_strategy: Some(ExecutionStrategy::Chain),
            step_gates: &[],
            resolved_modifiers: None,
            forced_session: true,
        };
        let chain_plan = self.plan(&chain_input, &mut gates, &mut diagnostics).await;

        let mut step_plans = Vec::with_capacity(steps.len());
        for step in steps {
            // Presence checked above
            let Some(prompt) = step.converted_prompt.as_ref() else {
                continue;
            };
            let step_input = PlanInput {
                parsed: None,
                prompt,
                framework_enabled: chain_plan.requires_framework(),
                overrides,
                forced_strategy: Some(ExecutionStrategy::Single),
                step_gates: &step.inline_gate_ids,
                resolved_modifiers: step.modifiers.or_else(|| chain_plan.modifiers().copied()),
                forced_session: true,
            };
            // Step contributions stay on the step plan
            let mut step_gates = GateAccumulator::new();
            let plan = self.plan(&step_input, &mut step_gates, &mut diagnostics).await;
            step_plans.push(StepPlan {
                step_number: step.step_number,
                prompt_id: step.prompt_id.clone(),
                plan,
            });
        }

        info!(
            steps = step_plans.len(),
            gates = chain_plan.gates().len(),
            requires_framework = chain_plan.requires_framework(),
            "chain plan created"
        );

        Ok(ChainPlanOutcome {
            chain: ChainPlan { chain_plan, step_plans },
            gates: gates.entries().into_iter().cloned().collect(),
            diagnostics: diagnostics.all().to_vec(),
        })
    }

    /// Plan the context's parsed command and store the result on the context
    pub async fn plan_into_context(&self, ctx: &mut ExecutionContext, framework_enabled: bool) -> Result<()> {
        let parsed = ctx
            .parsed_command()
            .cloned()
            .ok_or_else(|| OrchestraError::Precondition("parsed command not available; parsing has not completed".to_string()))?;
        let overrides = ctx.request().options().gate_overrides.clone();

        let is_chain = parsed.command_type == Some(CommandType::Chain) || !parsed.steps.is_empty();
        let (plan, gates, diagnostics) = if is_chain {
            let outcome = self
                .create_chain_plan(&parsed, &parsed.steps, framework_enabled, overrides.as_ref())
                .await?;
            let plan = outcome.chain.chain_plan.clone();
            ctx.set_chain_plan(outcome.chain)?;
            (plan, outcome.gates, outcome.diagnostics)
        } else {
            let prompt = parsed.converted_prompt.as_ref().ok_or_else(|| {
                OrchestraError::PlanningInput("command has no resolvable prompt".to_string())
            })?;
            let outcome = self
                .create_plan(Some(&parsed), prompt, framework_enabled, overrides.as_ref())
                .await;
            (outcome.plan, outcome.gates, outcome.diagnostics)
        };

        ctx.gate_accumulator_mut().merge(gates.iter());
        ctx.diagnostics_mut().extend(diagnostics);
        ctx.set_execution_plan(plan)
    }

    // === Planning ===

    async fn plan(
        &self,
        input: &PlanInput<'_>,
        gates: &mut GateAccumulator,
        diagnostics: &mut DiagnosticAccumulator,
    ) -> ExecutionPlan {
        let prompt = input.prompt;

        let semantic_analysis = match input.forced_strategy {
            Some(_) => None,
            None => self.analyze(prompt, diagnostics).await,
        };
        let strategy = input
            .forced_strategy
            .unwrap_or_else(|| resolve_strategy(input.parsed, prompt, semantic_analysis.as_ref()));

        let category = self.category(prompt, diagnostics).await;
        self.build_gate_set(input, category.as_deref(), gates, diagnostics).await;

        let framework_override = input.parsed.and_then(|p| p.effective_framework_override());
        let mut requires_framework = input.framework_enabled || framework_override.is_some();

        let requires_session = input.forced_session
            || strategy == ExecutionStrategy::Chain
            || prompt.declares_chain()
            || input
                .parsed
                .map(|p| p.operators.iter().any(SymbolicOperator::needs_session))
                .unwrap_or(false);

        let modifiers = self.resolve_modifiers(input, diagnostics);
        match modifiers.and_then(|m| m.normalize().authoritative) {
            Some(Modifier::Clean) => {
                gates.clear();
                requires_framework = false;
            }
            Some(Modifier::Framework) => {
                gates.clear();
                requires_framework = true;
            }
            Some(Modifier::Lean) => requires_framework = false,
            Some(Modifier::Judge) => requires_framework = true,
            None => {}
        }

        let plan = ExecutionPlan::from(PlanParts {
            strategy,
            gates: gates.snapshot(),
            requires_framework,
            requires_session,
            category,
            modifiers,
            semantic_analysis,
        });
        debug!(
            prompt = %prompt.id,
            strategy = %plan.strategy(),
            gates = plan.gates().len(),
            requires_framework,
            requires_session,
            "plan created"
        );
        plan
    }

    async fn analyze(&self, prompt: &ConvertedPrompt, diagnostics: &mut DiagnosticAccumulator) -> Option<SemanticAnalysis> {
        let analyzer = self.semantic_analyzer.as_ref()?;
        match analyzer.analyze(prompt).await {
            Ok(analysis) => Some(analysis),
            Err(err) => {
                diagnostics.warn("planner.semantic", format!("semantic analysis failed: {}", err));
                None
            }
        }
    }

    async fn category(&self, prompt: &ConvertedPrompt, diagnostics: &mut DiagnosticAccumulator) -> Option<String> {
        if prompt.category.is_some() {
            return prompt.category.clone();
        }
        let resolver = self.category_resolver.as_ref()?;
        match resolver.resolve_category(prompt).await {
            Ok(category) => category,
            Err(err) => {
                diagnostics.warn("planner.category", format!("category resolution failed: {}", err));
                None
            }
        }
    }

    /// Explicit gates, category auto-assignment, exclusions, caller
    /// overrides, then methodology filtering
    async fn build_gate_set(
        &self,
        input: &PlanInput<'_>,
        category: Option<&str>,
        gates: &mut GateAccumulator,
        diagnostics: &mut DiagnosticAccumulator,
    ) {
        let prompt = input.prompt;
        let prompt_config = prompt.gate_configuration.as_ref();

        let category_config = match (category, self.category_resolver.as_ref()) {
            (Some(category), Some(resolver)) => match resolver.category_config(category).await {
                Ok(config) => config,
                Err(err) => {
                    diagnostics.warn("planner.category", format!("category config lookup failed: {}", err));
                    None
                }
            },
            _ => None,
        };

        // explicit
        for id in prompt.gates.iter().chain(&prompt.auto_assigned_gates) {
            gates.add_default(id.clone(), GateSource::PromptConfig);
        }
        for id in prompt_config.map(|c| c.include.as_slice()).unwrap_or_default() {
            gates.add_default(id.clone(), GateSource::PromptConfig);
        }
        for id in category_config.as_ref().map(|c| c.include.as_slice()).unwrap_or_default() {
            gates.add_default(id.clone(), GateSource::CategoryConfig);
        }
        if let Some(parsed) = input.parsed {
            for gate in &parsed.named_inline_gates {
                gates.add_default(gate.id.clone(), GateSource::InlineOperator);
            }
            for op in &parsed.operators {
                if let SymbolicOperator::Gate { gate_id: Some(id), .. } = op {
                    gates.add_default(id.clone(), GateSource::InlineOperator);
                }
            }
        }
        for id in input.step_gates {
            gates.add_default(id.clone(), GateSource::InlineOperator);
        }

        // category auto-assignment
        if let Some(selector) = self.gate_selector.as_ref() {
            let request = GateSelectionRequest {
                prompt_id: prompt.id.clone(),
                category: category.map(str::to_string),
                framework: input.parsed.and_then(|p| p.effective_framework_override()).map(str::to_string),
                explicit_gates: gates.snapshot(),
            };
            match selector.select_gates(&request).await {
                Ok(selected) => {
                    for id in selected {
                        gates.add_default(id, GateSource::CategoryAutoAssign);
                    }
                }
                Err(err) => diagnostics.warn("planner.gates", format!("gate selection failed: {}", err)),
            }
        }

        let excluded: BTreeSet<&str> = category_config
            .as_ref()
            .map(|c| c.exclude.as_slice())
            .unwrap_or_default()
            .iter()
            .chain(prompt_config.map(|c| c.exclude.as_slice()).unwrap_or_default())
            .map(String::as_str)
            .collect();
        gates.retain(|entry| !excluded.contains(entry.gate_id.as_str()));

        if let Some(overrides) = input.overrides {
            for id in overrides.gate_ids() {
                gates.add_default(id, GateSource::ClientOverride);
            }
            // overrides never bring back an excluded gate
            gates.retain(|entry| !excluded.contains(entry.gate_id.as_str()));
        }

        if prompt_config.and_then(|c| c.framework_gates) == Some(false) {
            let methodology = self.methodology_gate_ids(diagnostics).await;
            if !methodology.is_empty() {
                gates.retain(|entry| !methodology.contains(&entry.gate_id));
            }
        }
    }

    /// Methodology gate IDs, cached against the provider's source version
    async fn methodology_gate_ids(&self, diagnostics: &mut DiagnosticAccumulator) -> BTreeSet<String> {
        let Some(provider) = self.gate_provider.as_ref() else {
            return BTreeSet::new();
        };
        let version = provider.source_version();
        if let Some(ids) = self.methodology_gates.get(version).await {
            return ids;
        }
        match provider.methodology_gate_ids().await {
            Ok(ids) => {
                debug!(version, count = ids.len(), "methodology gate IDs refreshed");
                self.methodology_gates.store(version, ids.clone()).await;
                ids
            }
            Err(err) => {
                diagnostics.warn("planner.methodology", format!("methodology gate lookup failed: {}", err));
                BTreeSet::new()
            }
        }
    }

    fn resolve_modifiers(&self, input: &PlanInput<'_>, diagnostics: &mut DiagnosticAccumulator) -> Option<Modifiers> {
        let explicit = input.parsed.and_then(ParsedCommand::explicit_modifiers);
        let supplied = explicit.or(input.resolved_modifiers.filter(|m| !m.is_empty()));

        if let Some(modifiers) = supplied {
            let normalized = modifiers.normalize();
            if normalized.is_ambiguous() {
                diagnostics.warn(
                    "planner.modifiers",
                    format!(
                        "conflicting modifiers; {} wins over {}",
                        normalized.authoritative.map(|m| m.to_string()).unwrap_or_default(),
                        normalized
                            .discarded
                            .iter()
                            .map(|m| m.to_string())
                            .collect::<Vec<_>>()
                            .join(", ")
                    ),
                );
            }
            return Some(normalized.modifiers);
        }

        let caller_gates = input.overrides.map(GateOverrides::has_caller_gates).unwrap_or(false);
        if !input.prompt.script_tools.is_empty() && !caller_gates {
            debug!(prompt = %input.prompt.id, "script tools present; defaulting to %clean");
            return Some(Modifiers::only(Modifier::Clean));
        }
        None
    }
}

/// First match wins: chain signals, then semantic single, then declared
/// structure
fn resolve_strategy(
    parsed: Option<&ParsedCommand>,
    prompt: &ConvertedPrompt,
    analysis: Option<&SemanticAnalysis>,
) -> ExecutionStrategy {
    let parsed_chain = parsed
        .map(|p| p.command_type == Some(CommandType::Chain) || p.has_operator(OperatorKind::Chain))
        .unwrap_or(false);
    if prompt.declares_chain() || parsed_chain || analysis.map(SemanticAnalysis::flags_chain).unwrap_or(false) {
        return ExecutionStrategy::Chain;
    }
    ExecutionStrategy::Single
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{CategoryCatalog, GateCatalog};
    use crate::collaborators::GateDefinition;
    use async_trait::async_trait;
    use orchestra_core::{
        AnalyzedExecutionType, CategoryGateConfig, DiagnosticLevel, ExecutionRequest, GateOverride, NamedInlineGate,
        PromptGateConfig,
    };

    struct FailingAnalyzer;

    #[async_trait]
    impl SemanticAnalyzer for FailingAnalyzer {
        async fn analyze(&self, _prompt: &ConvertedPrompt) -> Result<SemanticAnalysis> {
            Err(OrchestraError::ExternalLookup("analyzer offline".to_string()))
        }
    }

    struct FixedAnalyzer(SemanticAnalysis);

    #[async_trait]
    impl SemanticAnalyzer for FixedAnalyzer {
        async fn analyze(&self, _prompt: &ConvertedPrompt) -> Result<SemanticAnalysis> {
            Ok(self.0.clone())
        }
    }

    fn gate_catalog() -> Arc<GateCatalog> {
        Arc::new(GateCatalog::new(vec![
            GateDefinition::new("code-quality").with_category("code"),
            GateDefinition::new("security").with_category("code"),
            GateDefinition::new("framework-compliance").methodology("CAGEERF"),
        ]))
    }

    fn planner() -> ExecutionPlanner {
        let gates = gate_catalog();
        let categories = CategoryCatalog::new(vec![CategoryGateConfig {
            category: "code".to_string(),
            include: vec!["tests-pass".to_string()],
            exclude: vec!["security".to_string()],
        }]);
        ExecutionPlanner::new()
            .with_gate_selector(gates.clone())
            .with_gate_provider(gates)
            .with_category_resolver(Arc::new(categories))
    }

    fn code_prompt() -> ConvertedPrompt {
        ConvertedPrompt::new("review").with_category("code").with_gates(["clarity"])
    }

    fn ids(plan: &ExecutionPlan) -> Vec<&str> {
        plan.gates().iter().map(String::as_str).collect()
    }

    #[tokio::test]
    async fn test_single_plan_gates() {
        let outcome = planner().create_plan(None, &code_prompt(), false, None).await;
        assert_eq!(outcome.plan.strategy(), ExecutionStrategy::Single);
        assert_eq!(ids(&outcome.plan), vec!["clarity", "code-quality", "tests-pass"]);
        assert!(!outcome.plan.requires_framework());
        assert!(!outcome.plan.requires_session());
        assert!(outcome.diagnostics.is_empty());
    }

    #[tokio::test]
    async fn test_framework_requirement() {
        let planner = planner();
        let prompt = code_prompt();

        assert!(planner.create_plan(None, &prompt, true, None).await.plan.requires_framework());

        let parsed = ParsedCommand::single(prompt.clone()).with_framework_override("CAGEERF");
        let plan = planner.create_plan(Some(&parsed), &prompt, false, None).await.plan;
        assert!(plan.requires_framework());

        let parsed = ParsedCommand::single(prompt.clone()).with_operator(SymbolicOperator::Framework {
            framework_id: "react".to_string(),
        });
        let plan = planner.create_plan(Some(&parsed), &prompt, false, None).await.plan;
        assert!(plan.requires_framework());
    }

    #[tokio::test]
    async fn test_clean_clears_everything() {
        let prompt = code_prompt();
        let parsed = ParsedCommand::single(prompt.clone())
            .with_framework_override("CAGEERF")
            .with_named_gate(NamedInlineGate::new("inline", vec!["be brief".to_string()]))
            .with_modifiers(Modifiers::only(Modifier::Clean));
        let plan = planner().create_plan(Some(&parsed), &prompt, true, None).await.plan;
        assert!(plan.gates().is_empty());
        assert!(!plan.requires_framework());
        assert!(plan.modifiers().unwrap().clean);
    }

    #[tokio::test]
    async fn test_framework_modifier() {
        let prompt = code_prompt();
        let parsed = ParsedCommand::single(prompt.clone()).with_modifiers(Modifiers::only(Modifier::Framework));
        let plan = planner().create_plan(Some(&parsed), &prompt, false, None).await.plan;
        assert!(plan.gates().is_empty());
        assert!(plan.requires_framework());
    }

    #[tokio::test]
    async fn test_lean_and_judge() {
        let planner = planner();
        let prompt = code_prompt();

        let parsed = ParsedCommand::single(prompt.clone()).with_modifiers(Modifiers::only(Modifier::Lean));
        let plan = planner.create_plan(Some(&parsed), &prompt, true, None).await.plan;
        assert!(!plan.requires_framework());
        assert!(!plan.gates().is_empty());

        let parsed = ParsedCommand::single(prompt.clone()).with_modifiers(Modifiers::only(Modifier::Judge));
        let plan = planner.create_plan(Some(&parsed), &prompt, false, None).await.plan;
        assert!(plan.requires_framework());
    }

    #[tokio::test]
    async fn test_conflicting_modifiers_diagnosed() {
        let prompt = code_prompt();
        let modifiers = Modifiers {
            clean: false,
            judge: true,
            lean: true,
            framework: false,
        };
        let parsed = ParsedCommand::single(prompt.clone()).with_modifiers(modifiers);
        let outcome = planner().create_plan(Some(&parsed), &prompt, false, None).await;
        assert_eq!(outcome.plan.modifiers(), Some(&Modifiers::only(Modifier::Judge)));
        assert_eq!(outcome.diagnostics.len(), 1);
        assert_eq!(outcome.diagnostics[0].level, DiagnosticLevel::Warning);
    }

    #[tokio::test]
    async fn test_excluded_gate_never_returns() {
        let prompt = ConvertedPrompt::new("review")
            .with_category("code")
            .with_gates(["security", "docs"])
            .with_gate_configuration(PromptGateConfig {
                include: vec!["perf".to_string()],
                exclude: vec!["perf".to_string()],
                framework_gates: None,
            });
        let overrides = GateOverrides::ids(["security", "perf", "extra"]);
        let plan = planner().create_plan(None, &prompt, false, Some(&overrides)).await.plan;

        assert!(!plan.gates().contains("security"));
        assert!(!plan.gates().contains("perf"));
        assert!(plan.gates().contains("docs"));
        assert!(plan.gates().contains("extra"));
    }

    #[tokio::test]
    async fn test_methodology_gates_filtered_and_cached() {
        let planner = planner();
        let prompt = ConvertedPrompt::new("review")
            .with_gates(["framework-compliance", "clarity"])
            .with_gate_configuration(PromptGateConfig {
                framework_gates: Some(false),
                ..Default::default()
            });

        let first = planner.create_plan(None, &prompt, true, None).await.plan;
        assert_eq!(ids(&first), vec!["clarity"]);
        let second = planner.create_plan(None, &prompt, true, None).await.plan;
        assert_eq!(first, second);
        assert_eq!(planner.methodology_cache().hits(), 1);
    }

    #[tokio::test]
    async fn test_script_tool_default_clean() {
        let prompt = code_prompt().with_script_tool("toolA");
        let planner = planner();

        let plan = planner.create_plan(None, &prompt, false, None).await.plan;
        assert!(plan.modifiers().unwrap().clean);
        assert!(plan.gates().is_empty());

        let overrides = GateOverrides::ids(["g1"]);
        let plan = planner.create_plan(None, &prompt, false, Some(&overrides)).await.plan;
        assert!(plan.modifiers().is_none());
        assert!(plan.gates().contains("g1"));

        let overrides = GateOverrides {
            gates: vec![GateOverride::Custom {
                name: "custom".to_string(),
                criteria: vec!["cite sources".to_string()],
            }],
        };
        let plan = planner.create_plan(None, &prompt, false, Some(&overrides)).await.plan;
        assert!(plan.modifiers().is_none());

        let parsed = ParsedCommand::single(prompt.clone()).with_modifiers(Modifiers::only(Modifier::Judge));
        let plan = planner.create_plan(Some(&parsed), &prompt, false, None).await.plan;
        assert!(!plan.modifiers().unwrap().clean);
    }

    #[tokio::test]
    async fn test_idempotent() {
        let planner = planner();
        let prompt = code_prompt();
        let parsed = ParsedCommand::single(prompt.clone()).with_named_gate(NamedInlineGate::new("inline", vec![]));
        let a = planner.create_plan(Some(&parsed), &prompt, true, None).await.plan;
        let b = planner.create_plan(Some(&parsed), &prompt, true, None).await.plan;
        assert_eq!(a, b);
        assert_eq!(a.fingerprint(), b.fingerprint());
    }

    #[tokio::test]
    async fn test_semantic_failure_degrades() {
        let planner = planner().with_semantic_analyzer(Arc::new(FailingAnalyzer));
        let outcome = planner.create_plan(None, &code_prompt(), false, None).await;
        assert_eq!(outcome.plan.strategy(), ExecutionStrategy::Single);
        assert!(outcome.plan.semantic_analysis().is_none());
        assert_eq!(outcome.diagnostics[0].source, "planner.semantic");
    }

    #[tokio::test]
    async fn test_semantic_chain_signal() {
        let analysis = SemanticAnalysis {
            execution_type: AnalyzedExecutionType::Single,
            requires_chain_execution: false,
            has_chain_step_characteristics: true,
            confidence: 0.7,
            reasoning: vec![],
        };
        let planner = planner().with_semantic_analyzer(Arc::new(FixedAnalyzer(analysis)));
        let plan = planner.create_plan(None, &code_prompt(), false, None).await.plan;
        assert_eq!(plan.strategy(), ExecutionStrategy::Chain);
        assert!(plan.requires_session());
    }

    #[tokio::test]
    async fn test_gate_operator_requires_session() {
        let prompt = code_prompt();
        let parsed = ParsedCommand::single(prompt.clone()).with_operator(SymbolicOperator::Gate {
            criteria: "cite sources".to_string(),
            gate_id: None,
        });
        let plan = planner().create_plan(Some(&parsed), &prompt, false, None).await.plan;
        assert_eq!(plan.strategy(), ExecutionStrategy::Single);
        assert!(plan.requires_session());
    }

    #[tokio::test]
    async fn test_chain_plan_errors() {
        let planner = planner();
        let parsed = ParsedCommand::chain(vec![]);
        let err = planner.create_chain_plan(&parsed, &[], false, None).await.unwrap_err();
        assert!(err.to_string().contains("at least one step"));

        let steps = vec![
            ChainStep::new(1, ConvertedPrompt::new("analyze")),
            ChainStep::unresolved(2, "summarize_missing"),
        ];
        let parsed = ParsedCommand::chain(steps.clone());
        let err = planner.create_chain_plan(&parsed, &steps, false, None).await.unwrap_err();
        assert!(matches!(err, OrchestraError::PlanningInput(_)));
        assert!(err.to_string().contains("summarize_missing"));

        let steps = vec![ChainStep::unresolved(1, "only_step_missing")];
        let parsed = ParsedCommand::chain(steps.clone());
        let err = planner.create_chain_plan(&parsed, &steps, false, None).await.unwrap_err();
        assert!(matches!(err, OrchestraError::PlanningInput(_)));
        assert!(err.to_string().contains("only_step_missing"));
    }

    #[tokio::test]
    async fn test_chain_plan_steps() {
        let steps = vec![
            ChainStep::new(1, code_prompt()).with_inline_gate("step-one"),
            ChainStep::new(2, ConvertedPrompt::new("summarize")).with_modifiers(Modifiers::only(Modifier::Lean)),
        ];
        let parsed = ParsedCommand::chain(steps.clone());
        let outcome = planner().create_chain_plan(&parsed, &steps, true, None).await.unwrap();
        let chain = outcome.chain;

        assert_eq!(chain.chain_plan.strategy(), ExecutionStrategy::Chain);
        assert!(chain.chain_plan.requires_session());
        assert_eq!(chain.total_steps(), 2);

        let first = chain.step(1).unwrap();
        assert!(first.plan.gates().contains("step-one"));
        assert!(first.plan.requires_framework());
        assert!(!chain.chain_plan.gates().contains("step-one"));

        let second = chain.step(2).unwrap();
        assert!(!second.plan.requires_framework());
    }

    #[tokio::test]
    async fn test_plan_into_context() {
        let prompt = code_prompt();
        let mut ctx = ExecutionContext::new(ExecutionRequest::new(">>review"));
        ctx.set_parsed_command(ParsedCommand::single(prompt)).unwrap();

        planner().plan_into_context(&mut ctx, false).await.unwrap();
        let plan = ctx.require_execution_plan().unwrap();
        assert_eq!(&ctx.gate_accumulator().snapshot(), plan.gates());
        assert_eq!(
            ctx.gate_accumulator().entry("clarity").unwrap().source,
            GateSource::PromptConfig
        );
    }

    #[tokio::test]
    async fn test_plan_into_context_requires_command() {
        let mut ctx = ExecutionContext::new(ExecutionRequest::new(">>review"));
        let err = planner().plan_into_context(&mut ctx, false).await.unwrap_err();
        assert!(matches!(err, OrchestraError::Precondition(_)));
    }
}
