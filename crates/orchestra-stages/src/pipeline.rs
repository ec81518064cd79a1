//! Default pipeline assembly
use crate::config::{OrchestraConfig, SessionSettings};
use crate::framework::FrameworkStage;
use crate::gate_review::GateReviewStage;
use crate::planning::PlanningStage;
use crate::response::ResponseStage;
use crate::session::SessionStage;
use crate::verify::{CommandVerifier, ShellVerifier};
use orchestra_core::{
    ExecutionContext, ExecutionRequest, Modifiers, OrchestraError, ParsedCommand, PipelineResponse, PipelineRunner, Result,
    RunReport, Stage,
};
use orchestra_planner::{CategoryCatalog, ExecutionPlanner, FrameworkCatalog, GateCatalog, StructuralAnalyzer};
use orchestra_session::{FileSessionStore, InMemorySessionStore, SessionStore};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Collaborators shared by every request
#[derive(Clone)]
pub struct OrchestraServices {
    pub config: Arc<OrchestraConfig>,
    pub planner: Arc<ExecutionPlanner>,
    pub gates: Arc<GateCatalog>,
    pub frameworks: Arc<FrameworkCatalog>,
    pub store: Arc<dyn SessionStore>,
    pub verifier: Arc<dyn ShellVerifier>,
}

impl OrchestraServices {
    /// Build catalogs, planner and session store from configuration
    pub fn from_config(config: OrchestraConfig) -> Result<Self> {
        config.validate()?;

        let gates = Arc::new(GateCatalog::new(config.gates.clone()));
        let mut categories = CategoryCatalog::new(config.categories.clone());
        if let Some(default) = config.default_category.as_deref() {
            categories = categories.with_default_category(default);
        }
        let mut frameworks = FrameworkCatalog::new(config.frameworks.definitions.clone());
        if let Some(active) = config.frameworks.active.as_deref() {
            frameworks = frameworks.with_active(active);
        }

        let planner = ExecutionPlanner::new()
            .with_gate_selector(gates.clone())
            .with_gate_provider(gates.clone())
            .with_semantic_analyzer(Arc::new(StructuralAnalyzer))
            .with_category_resolver(Arc::new(categories));

        let store: Arc<dyn SessionStore> = match &config.sessions {
            SessionSettings::Memory => Arc::new(InMemorySessionStore::new()),
            SessionSettings::File { dir } => Arc::new(FileSessionStore::new(dir.clone())),
        };
        let verifier: Arc<dyn ShellVerifier> = Arc::new(CommandVerifier::new(Duration::from_secs(config.shell_timeout_secs)));

        Ok(Self {
            config: Arc::new(config),
            planner: Arc::new(planner),
            gates,
            frameworks: Arc::new(frameworks),
            store,
            verifier,
        })
    }

    pub fn with_store(mut self, store: Arc<dyn SessionStore>) -> Self {
        self.store = store;
        self
    }

    pub fn with_verifier(mut self, verifier: Arc<dyn ShellVerifier>) -> Self {
        self.verifier = verifier;
        self
    }
}

/// planning → framework → session → gate-review → response
pub fn default_pipeline(services: &OrchestraServices) -> Result<PipelineRunner> {
    let enforcement = services.config.enforcement.clone();
    let stages: Vec<Box<dyn Stage>> = vec![
        Box::new(PlanningStage::new(
            services.planner.clone(),
            services.frameworks.clone(),
            services.config.frameworks.enabled,
        )),
        Box::new(FrameworkStage::new(services.frameworks.clone())),
        Box::new(SessionStage::new(services.store.clone(), enforcement.clone())),
        Box::new(GateReviewStage::new(
            services.gates.clone(),
            services.verifier.clone(),
            enforcement,
        )),
        Box::new(ResponseStage::new(services.store.clone(), services.gates.clone())?),
    ];
    Ok(PipelineRunner::new(stages))
}

/// Runs parsed commands through the default pipeline
pub struct Orchestra {
    services: OrchestraServices,
    runner: PipelineRunner,
}

impl Orchestra {
    pub fn new(services: OrchestraServices) -> Result<Self> {
        let runner = default_pipeline(&services)?;
        info!(profile = %services.config.name, pipeline = %runner.pipeline_id(), "orchestra ready");
        Ok(Self { services, runner })
    }

    pub fn from_config(config: OrchestraConfig) -> Result<Self> {
        Self::new(OrchestraServices::from_config(config)?)
    }

    pub fn services(&self) -> &OrchestraServices {
        &self.services
    }

    pub fn runner(&self) -> &PipelineRunner {
        &self.runner
    }

    /// Execute one request. The response is always set: stage failures come
    /// back as failure responses. `%modifier` tokens in the command text
    /// apply when the parser supplied no modifiers.
    pub async fn execute(&self, request: ExecutionRequest, mut parsed: ParsedCommand) -> Result<(PipelineResponse, RunReport)> {
        if parsed.modifiers.is_none() {
            let tokens = Modifiers::parse_tokens(request.command());
            if !tokens.is_empty() {
                parsed.modifiers = Some(tokens);
            }
        }
        let mut ctx = ExecutionContext::new(request);
        ctx.set_parsed_command(parsed)?;
        let report = self.runner.run(&mut ctx).await?;
        let response = ctx.response().cloned().ok_or_else(|| {
            OrchestraError::Precondition(format!("pipeline {} finished without a response", self.runner.pipeline_id()))
        })?;
        Ok((response, report))
    }
}
