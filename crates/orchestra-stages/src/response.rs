use crate::render::{ResponseRenderer, ResponseView};
use async_trait::async_trait;
use orchestra_core::{
    ChainState, ExecutionContext, ExecutionResults, OrchestraError, PipelineResponse, Result, SessionContext, Stage,
    StageOutcome,
};
use orchestra_planner::GateDefinitionProvider;
use orchestra_session::{format_reminder, ReminderMode, SessionStore};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Renders the step, persists the session and sets the response
pub struct ResponseStage {
    store: Arc<dyn SessionStore>,
    provider: Arc<dyn GateDefinitionProvider>,
    renderer: ResponseRenderer,
}

impl ResponseStage {
    pub fn new(store: Arc<dyn SessionStore>, provider: Arc<dyn GateDefinitionProvider>) -> Result<Self> {
        Ok(Self {
            store,
            provider,
            renderer: ResponseRenderer::new()?,
        })
    }

    /// Prompt for the step the session is on, or the command's prompt
    async fn render_step(&self, ctx: &mut ExecutionContext, session: Option<&SessionContext>) -> Result<String> {
        let parsed = ctx
            .parsed_command()
            .ok_or_else(|| OrchestraError::Precondition("parsed command not available".to_string()))?;
        let step = session.map(|s| s.current_step);
        let (prompt, args) = step
            .and_then(|n| parsed.steps.iter().find(|s| s.step_number == n))
            .and_then(|s| s.converted_prompt.as_ref().map(|p| (p, &s.args)))
            .or_else(|| parsed.converted_prompt.as_ref().map(|p| (p, &parsed.prompt_args)))
            .ok_or_else(|| OrchestraError::Precondition("response requires a resolved prompt".to_string()))?;
        let (prompt, args) = (prompt.clone(), args.clone());

        let mut body = match self.renderer.render_prompt(&prompt.user_message_template, &args) {
            Ok(body) => body,
            Err(e) => {
                warn!(prompt = %prompt.id, error = %e, "prompt template failed, using raw text");
                ctx.diagnostics_mut().warn(self.id(), e.to_string());
                prompt.user_message_template.clone()
            }
        };
        if let Some(system) = prompt.system_message.as_deref().filter(|s| !s.trim().is_empty()) {
            body = format!("{}\n\n{}", system, body);
        }

        let mut view = ResponseView {
            body,
            style: ctx.state().injection.style.clone(),
            ..Default::default()
        };
        if let Some(framework) = ctx.framework_context() {
            view.system_prompt = Some(framework.system_prompt.clone());
            ctx.state_mut().injection.system_prompt_injected = true;
        }

        match session {
            Some(session) => {
                if let Some(review) = session.pending_review.as_ref().filter(|r| r.shell_verify.is_none()) {
                    view.gate_ids = review.gate_ids.clone();
                    view.criteria = review.criteria.clone();
                    view.review = true;
                    view.retry = review.last_rationale.clone();
                }
                view.reminder = Some(format_reminder(session, ReminderMode::Inline)).filter(|r| !r.is_empty());
            }
            None => self.gate_guidance(ctx, &mut view).await,
        }
        if !view.criteria.is_empty() {
            ctx.state_mut().injection.gate_guidance_injected = true;
        }

        self.renderer.render_response(&view)
    }

    /// Criteria of the planned gates, shown as guidance without review
    async fn gate_guidance(&self, ctx: &mut ExecutionContext, view: &mut ResponseView) {
        let ids: Vec<String> = match ctx.execution_plan() {
            Some(plan) if !plan.gates().is_empty() => plan.gates().iter().cloned().collect(),
            _ => return,
        };
        match self.provider.load_gates(&ids).await {
            Ok(definitions) => {
                for definition in definitions {
                    view.criteria
                        .extend(definition.criteria.iter().map(|c| format!("{}: {}", definition.id, c)));
                }
                view.gate_ids = ids;
            }
            Err(e) => {
                warn!(error = %e, "gate guidance unavailable");
                ctx.diagnostics_mut().warn(self.id(), e.to_string());
            }
        }
    }
}

#[async_trait]
impl Stage for ResponseStage {
    fn id(&self) -> &'static str {
        "response.v1"
    }

    async fn run(&self, ctx: &mut ExecutionContext) -> Result<StageOutcome> {
        let request_id = ctx.request().request_id();
        let session = ctx.session_context().cloned();

        let content = match session.as_ref().map(|s| &s.state) {
            Some(ChainState::ChainComplete) => {
                let total = session.as_ref().map(|s| s.total_steps).unwrap_or(0);
                format!("Chain complete: {}/{} steps finished.", total, total)
            }
            Some(ChainState::ChainFailed { step, reason }) => {
                let blocked = &ctx.state().gates.blocked_gates;
                if blocked.is_empty() {
                    format!("Chain failed at step {}: {}", step, reason)
                } else {
                    format!(
                        "Chain blocked at step {}: {}\nBlocked gates: {}\nResolve the gates and restart the chain.",
                        step,
                        reason,
                        blocked.join(", ")
                    )
                }
            }
            _ => self.render_step(ctx, session.as_ref()).await?,
        };

        if let Some(authority) = ctx.gate_enforcement() {
            let stats = authority.audit().stats();
            debug!(verdicts = stats.verdicts, passes = stats.passes, blocked = stats.blocked, "gate audit");
        }

        if let Some(session) = &session {
            let version = self.store.save(session).await?;
            debug!(session = %session.session_id, version, "session persisted");
            ctx.state_mut().session.persisted_version = Some(version);
        }

        ctx.set_execution_results(ExecutionResults {
            content: content.clone(),
            step_number: session.as_ref().map(|s| s.current_step),
        })?;

        let mut response = PipelineResponse::success(request_id, content)
            .with_gates(ctx.gate_accumulator().snapshot())
            .with_diagnostics(ctx.diagnostics().all());
        if let Some(outcome) = ctx.state().session.outcome {
            response = response.with_session_outcome(outcome);
        }
        if let Some(session) = &session {
            response = response.with_session_id(session.session_id.clone());
        }
        info!(
            %request_id,
            session = ?response.session_id,
            outcome = ?response.session_outcome,
            gates = response.gates.len(),
            "response ready"
        );
        ctx.set_response(response)?;
        Ok(StageOutcome::Continue)
    }
}
