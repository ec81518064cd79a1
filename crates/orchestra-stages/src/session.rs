use async_trait::async_trait;
use orchestra_core::{ChainState, ExecutionContext, Result, SessionContext, SessionOutcome, Stage, StageOutcome, StepResult};
use orchestra_gates::EnforcementConfig;
use orchestra_session::{ChainSession, SessionStore};
use std::sync::Arc;
use tracing::{debug, info};

/// Loads or creates the chain session and moves it to the step this
/// invocation renders
pub struct SessionStage {
    store: Arc<dyn SessionStore>,
    enforcement: EnforcementConfig,
}

impl SessionStage {
    pub fn new(store: Arc<dyn SessionStore>, enforcement: EnforcementConfig) -> Self {
        Self { store, enforcement }
    }
}

#[async_trait]
impl Stage for SessionStage {
    fn id(&self) -> &'static str {
        "session.v1"
    }

    async fn run(&self, ctx: &mut ExecutionContext) -> Result<StageOutcome> {
        if !ctx.require_execution_plan()?.requires_session() {
            return Ok(StageOutcome::Skipped("plan does not require a session".to_string()));
        }

        let request = ctx.request();
        let parsed_chain_id = ctx.parsed_command().and_then(|p| p.chain_id.clone());
        let session_id = request
            .session_key()
            .map(str::to_string)
            .or_else(|| parsed_chain_id.clone())
            .unwrap_or_else(|| format!("chain-{}", request.request_id()));
        let chain_id = request.chain_id().map(str::to_string).or(parsed_chain_id);
        let total_steps = ctx
            .chain_plan()
            .map(|c| c.total_steps() as u32)
            .unwrap_or(1)
            .max(1);

        if request.options().force_restart && self.store.remove(&session_id).await? {
            info!(session = %session_id, "session restarted");
        }

        let (session, created, outcome) = match self.store.load(&session_id).await? {
            None => {
                let mut session = ChainSession::new(&session_id, chain_id, total_steps, self.enforcement.clone())?;
                let started = session.start()?;
                (session, true, started.outcome)
            }
            Some(previous) if previous.is_terminal() => {
                debug!(session = %session_id, state = %previous.state, "previous chain finished, starting over");
                let mut fresh = SessionContext::new_chain(&session_id, chain_id, total_steps);
                fresh.version = previous.version;
                let mut session = ChainSession::restore(fresh, self.enforcement.clone());
                let started = session.start()?;
                (session, true, started.outcome)
            }
            Some(existing) => {
                let mut session = ChainSession::restore(existing, self.enforcement.clone());
                let outcome = resume(&mut session)?;
                (session, false, outcome)
            }
        };

        info!(
            session = %session.session_id(),
            state = %session.state(),
            step = session.current_step(),
            total = session.total_steps(),
            created,
            "session resolved"
        );

        let state = ctx.state_mut();
        state.session.resolved = true;
        state.session.created = created;
        state.session.outcome = Some(outcome);
        ctx.set_session_context(session.into_context())?;
        Ok(StageOutcome::Continue)
    }
}

/// Move a persisted session to the step this call works on
fn resume(session: &mut ChainSession) -> Result<SessionOutcome> {
    let has_pending = session.context().has_pending_review();
    let outcome = match session.state().clone() {
        ChainState::NotStarted => session.start()?.outcome,
        // Previous step ran without review; this call asks for the next one
        ChainState::StepInProgress { .. } if !has_pending => {
            session.complete_step(StepResult::Success, None)?;
            session.advance()?.outcome
        }
        ChainState::StepComplete { .. } => session.advance()?.outcome,
        ChainState::AwaitingGateReview { .. } => SessionOutcome::AwaitingReview,
        _ => SessionOutcome::Retry,
    };
    Ok(outcome)
}
