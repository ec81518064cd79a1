use crate::verify::ShellVerifier;
use async_trait::async_trait;
use orchestra_core::{
    ChainState, ExecutionContext, Modifier, Result, SessionOutcome, ShellVerifySpec, Stage, StageOutcome,
};
use orchestra_gates::{EnforcementConfig, EnforcementInput, EnforcementMode, GateSeverity, ParsedVerdict, VerdictSource};
use orchestra_planner::{ActivationCriteria, GateDefinitionProvider};
use orchestra_session::{ChainSession, SessionTransition};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Gate ID used for anonymous inline criteria
pub const INLINE_GATE_ID: &str = "inline";

/// Gates reviewed for one step
#[derive(Debug, Clone, Default)]
struct ReviewTarget {
    gate_ids: Vec<String>,
    criteria: Vec<String>,
    shell: Option<(String, ShellVerifySpec)>,
    severities: Vec<GateSeverity>,
}

/// Collects verdicts for the pending review and requests review for the
/// step about to run
pub struct GateReviewStage {
    provider: Arc<dyn GateDefinitionProvider>,
    verifier: Arc<dyn ShellVerifier>,
    enforcement: EnforcementConfig,
}

impl GateReviewStage {
    pub fn new(
        provider: Arc<dyn GateDefinitionProvider>,
        verifier: Arc<dyn ShellVerifier>,
        enforcement: EnforcementConfig,
    ) -> Self {
        Self {
            provider,
            verifier,
            enforcement,
        }
    }

    /// Gates for `step`: chain-level gates, the step plan's gates, and inline
    /// gates from the command. Catalog gates inactive for the plan's
    /// category or framework are dropped.
    async fn target(&self, ctx: &mut ExecutionContext, step: u32) -> Result<ReviewTarget> {
        let plan = ctx.require_execution_plan()?;
        let mut ids: BTreeSet<String> = plan.gates().clone();
        if let Some(step_plan) = ctx.chain_plan().and_then(|c| c.step(step)) {
            ids.extend(step_plan.plan.gates().iter().cloned());
        }
        let clean = plan.modifiers().and_then(|m| m.normalize().authoritative) == Some(Modifier::Clean);
        let activation = ActivationCriteria {
            category: plan.category().map(str::to_string),
            framework: ctx.framework_authority().framework_id().map(str::to_string),
        };

        let mut inline_criteria = Vec::new();
        let mut inline_ids = BTreeSet::new();
        let mut shell = None;
        if let Some(parsed) = ctx.parsed_command().filter(|_| !clean) {
            for gate in parsed.named_inline_gates.iter().filter(|g| ids.contains(&g.id)) {
                inline_ids.insert(gate.id.clone());
                inline_criteria.extend(gate.criteria.iter().map(|c| format!("{}: {}", gate.id, c)));
                if shell.is_none() {
                    shell = gate.shell_verify.clone().map(|spec| (gate.id.clone(), spec));
                }
            }
            if !parsed.inline_gate_criteria.is_empty() {
                inline_ids.insert(INLINE_GATE_ID.to_string());
                inline_criteria.extend(
                    parsed
                        .inline_gate_criteria
                        .iter()
                        .map(|c| format!("{}: {}", INLINE_GATE_ID, c)),
                );
            }
        }

        let catalog_ids: Vec<String> = ids.difference(&inline_ids).cloned().collect();
        let mut target = ReviewTarget::default();
        if !catalog_ids.is_empty() {
            match self.provider.active_gates(&catalog_ids, &activation).await {
                Ok(activation) => {
                    if !activation.skipped.is_empty() {
                        debug!(step, skipped = ?activation.skipped, "gates inactive or unknown");
                    }
                    for definition in activation.active {
                        target
                            .criteria
                            .extend(definition.criteria.iter().map(|c| format!("{}: {}", definition.id, c)));
                        target.severities.push(definition.severity);
                        target.gate_ids.push(definition.id);
                    }
                }
                Err(e) if !e.is_fatal() => {
                    warn!(step, error = %e, "gate definitions unavailable");
                    ctx.diagnostics_mut().warn(self.id(), e.to_string());
                    target.gate_ids.extend(catalog_ids);
                }
                Err(e) => return Err(e),
            }
        }
        target.gate_ids.extend(inline_ids);
        target.gate_ids.sort();
        target.criteria.extend(inline_criteria);
        target.shell = shell;
        Ok(target)
    }

    fn resolve_mode(&self, ctx: &mut ExecutionContext, session: &mut ChainSession, target: &ReviewTarget) -> EnforcementMode {
        let mut input = EnforcementInput::new();
        if let Some(mode) = ctx.request().options().enforcement_mode {
            input = input.requested(mode);
        }
        for severity in &target.severities {
            input = input.with_severity(*severity);
        }
        let mode = session.resolve_enforcement_mode(&input);
        ctx.state_mut().gates.enforcement_mode = Some(mode);
        mode
    }

    /// Submit the verdict, or the shell verification result, for the
    /// pending review. `None` when nothing could be collected.
    async fn collect_verdict(&self, ctx: &mut ExecutionContext, session: &mut ChainSession) -> Result<Option<SessionTransition>> {
        let shell_command = session
            .context()
            .pending_review
            .as_ref()
            .and_then(|r| r.shell_verify.clone());

        if let Some(command) = shell_command {
            let spec = ctx
                .parsed_command()
                .and_then(|p| {
                    p.named_inline_gates
                        .iter()
                        .filter_map(|g| g.shell_verify.as_ref())
                        .find(|s| s.command == command)
                        .cloned()
                })
                .unwrap_or(ShellVerifySpec {
                    command,
                    timeout_secs: None,
                    working_dir: None,
                });
            return match self.verifier.verify(&spec).await {
                Ok(result) => {
                    let transition = session.submit_shell_result(result.exit_code, &result.output)?;
                    ctx.state_mut().gates.last_verdict = Some(ParsedVerdict::from_exit_code(result.exit_code, &result.output));
                    Ok(Some(transition))
                }
                Err(e) if !e.is_fatal() => {
                    warn!(command = %spec.command, error = %e, "shell verification could not run");
                    ctx.diagnostics_mut().warn(self.id(), e.to_string());
                    Ok(None)
                }
                Err(e) => Err(e),
            };
        }

        let request = ctx.request();
        let supplied = request.gate_verdict().is_some() || request.user_response().is_some();
        let verdict = request
            .gate_verdict()
            .and_then(|raw| session.authority().parse_verdict(raw, VerdictSource::GateVerdictField))
            .or_else(|| {
                request
                    .user_response()
                    .and_then(|raw| session.authority().parse_verdict(raw, VerdictSource::UserResponse))
            });

        match verdict {
            Some(verdict) => {
                info!(session = %session.session_id(), verdict = %verdict, "gate verdict received");
                let transition = session.submit_verdict(&verdict)?;
                ctx.state_mut().gates.last_verdict = Some(verdict);
                Ok(Some(transition))
            }
            None => {
                if supplied {
                    ctx.diagnostics_mut().warn(
                        self.id(),
                        "gate verdict not recognized; expected 'GATE_REVIEW: PASS|FAIL - <reason>'",
                    );
                }
                Ok(None)
            }
        }
    }
}

#[async_trait]
impl Stage for GateReviewStage {
    fn id(&self) -> &'static str {
        "gate-review.v1"
    }

    async fn run(&self, ctx: &mut ExecutionContext) -> Result<StageOutcome> {
        let Some(current) = ctx.session_context().cloned() else {
            return Ok(StageOutcome::Skipped("no session".to_string()));
        };
        if current.is_terminal() {
            return Ok(StageOutcome::Skipped(format!("session is {}", current.state)));
        }

        let mut session = ChainSession::restore(current, self.enforcement.clone());
        let mut outcome = ctx.state().session.outcome;

        if let ChainState::AwaitingGateReview { step } = *session.state() {
            let target = self.target(ctx, step).await?;
            self.resolve_mode(ctx, &mut session, &target);
            if let Some(transition) = self.collect_verdict(ctx, &mut session).await? {
                outcome = Some(transition.outcome);
                if matches!(transition.to, ChainState::StepComplete { .. }) {
                    outcome = Some(session.advance()?.outcome);
                }
            } else {
                outcome = Some(SessionOutcome::AwaitingReview);
            }
        }

        if let ChainState::StepInProgress { step } = *session.state() {
            let target = self.target(ctx, step).await?;
            let mode = self.resolve_mode(ctx, &mut session, &target);
            if mode.requires_review() && !target.gate_ids.is_empty() {
                let transition = match target.shell {
                    Some((gate_id, spec)) => session.request_shell_verification(gate_id, spec.command)?,
                    None => session.request_gate_review(target.gate_ids, target.criteria)?,
                };
                if outcome != Some(SessionOutcome::Retry) {
                    outcome = Some(transition.outcome);
                }
                ctx.state_mut().gates.review_requested = true;
            } else {
                debug!(step, %mode, "no gate review for step");
            }
        }

        let blocked: Vec<String> = session.authority().blocked_gates().into_iter().map(str::to_string).collect();
        if !blocked.is_empty() {
            warn!(session = %session.session_id(), gates = ?blocked, "gates blocked");
        }
        let state = ctx.state_mut();
        state.session.outcome = outcome;
        state.gates.blocked_gates = blocked;

        ctx.attach_gate_enforcement(session.authority().clone())?;
        ctx.set_session_context(session.into_context())?;
        Ok(StageOutcome::Continue)
    }
}
