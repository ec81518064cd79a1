use async_trait::async_trait;
use orchestra_core::{ExecutionContext, FrameworkDecisionInput, Result, Stage, StageOutcome};
use orchestra_planner::{ExecutionPlanner, FrameworkManager};
use std::sync::Arc;
use tracing::info;

/// Plans the parsed command and makes the request's framework decision
pub struct PlanningStage {
    planner: Arc<ExecutionPlanner>,
    frameworks: Arc<dyn FrameworkManager>,
    framework_enabled: bool,
}

impl PlanningStage {
    pub fn new(planner: Arc<ExecutionPlanner>, frameworks: Arc<dyn FrameworkManager>, framework_enabled: bool) -> Self {
        Self {
            planner,
            frameworks,
            framework_enabled,
        }
    }
}

#[async_trait]
impl Stage for PlanningStage {
    fn id(&self) -> &'static str {
        "planning.v1"
    }

    async fn run(&self, ctx: &mut ExecutionContext) -> Result<StageOutcome> {
        let client_override = ctx.request().options().framework.clone();
        self.planner
            .plan_into_context(ctx, self.framework_enabled || client_override.is_some())
            .await?;

        let plan = ctx.require_execution_plan()?;
        let parsed = ctx.parsed_command();
        let input = FrameworkDecisionInput {
            modifiers: plan.modifiers().copied(),
            operator_override: parsed
                .and_then(|p| p.effective_framework_override())
                .map(str::to_string),
            client_override,
            active_framework: self.frameworks.active_framework(),
            framework_enabled: self.framework_enabled,
        };
        let style = parsed.and_then(|p| p.style.clone());
        let (strategy, gates) = (plan.strategy(), plan.gates().len());

        let decision = ctx.framework_authority_mut().decide(&input).clone();
        ctx.state_mut().injection.style = style;

        info!(
            %strategy,
            gates,
            framework = ?decision.framework_id,
            framework_source = ?decision.source,
            "planning complete"
        );
        Ok(StageOutcome::Continue)
    }
}
