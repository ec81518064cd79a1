use async_trait::async_trait;
use orchestra_core::{ExecutionContext, OrchestraError, Result, Stage, StageOutcome};
use orchestra_planner::{FrameworkManager, FrameworkSelectionCriteria};
use std::sync::Arc;
use tracing::{debug, warn};

/// Loads methodology guidance for the framework chosen during planning.
/// A framework manager failure degrades to a diagnostic.
pub struct FrameworkStage {
    frameworks: Arc<dyn FrameworkManager>,
}

impl FrameworkStage {
    pub fn new(frameworks: Arc<dyn FrameworkManager>) -> Self {
        Self { frameworks }
    }
}

#[async_trait]
impl Stage for FrameworkStage {
    fn id(&self) -> &'static str {
        "framework.v1"
    }

    async fn run(&self, ctx: &mut ExecutionContext) -> Result<StageOutcome> {
        if !ctx.require_execution_plan()?.requires_framework() {
            return Ok(StageOutcome::Skipped("plan does not require a framework".to_string()));
        }

        let decision = ctx.framework_authority().decision().cloned().ok_or_else(|| {
            OrchestraError::Precondition("framework decision not made; planning has not completed".to_string())
        })?;
        let framework_id = match decision.framework_id {
            Some(id) if decision.should_apply => id,
            _ => return Ok(StageOutcome::Skipped(decision.reason)),
        };

        let prompt = ctx
            .parsed_command()
            .and_then(|p| {
                p.converted_prompt
                    .clone()
                    .or_else(|| p.steps.first().and_then(|s| s.converted_prompt.clone()))
            })
            .ok_or_else(|| OrchestraError::Precondition("framework guidance requires a resolved prompt".to_string()))?;

        let criteria = FrameworkSelectionCriteria {
            framework_id: Some(framework_id.clone()),
            prompt_id: Some(prompt.id.clone()),
        };
        match self.frameworks.generate_execution_context(&prompt, &criteria).await {
            Ok(framework) => {
                debug!(framework = %framework.framework_id, guidelines = framework.guidelines.len(), "framework guidance loaded");
                ctx.set_framework_context(framework)?;
                ctx.state_mut().framework.guidance_applied = true;
            }
            Err(e) => {
                warn!(framework = %framework_id, error = %e, "framework guidance unavailable");
                ctx.diagnostics_mut().warn(self.id(), e.to_string());
                ctx.state_mut().framework.degraded = true;
            }
        }
        Ok(StageOutcome::Continue)
    }
}
