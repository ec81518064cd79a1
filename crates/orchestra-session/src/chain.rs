//! Chain Session: state machine for multi-step chain execution
//!
//! ```text
//! not-started ──start──▶ step-in-progress ──request_gate_review──▶ awaiting-gate-review
//!                          ▲      │                                   │
//!                          │      └─complete_step─┐      verdict:     │
//!                          │                      ▼      pass ────────┤──▶ step-complete
//!                          └──── retry ◀──────────────── fail ────────┘        │
//!                                                                              ├─advance─▶ step-in-progress
//!                                                                              └─advance─▶ chain-complete
//! any non-terminal state ──budget exhausted / fail──▶ chain-failed
//! ```
//!
//! Every mutating call returns a [`SessionTransition`]; nothing is
//! broadcast.
use crate::reminder::{format_reminder, ReminderMode};
use chrono::{DateTime, Utc};
use orchestra_core::{
    ChainState, OrchestraError, PendingGateReview, Result, SessionContext, SessionOutcome, StepResult,
};
use orchestra_gates::{
    EnforcementConfig, EnforcementInput, EnforcementMode, GateEnforcementAuthority, GateStatus, GateTransition,
    ParsedVerdict,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Record of one state change
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionTransition {
    pub session_id: String,
    pub from: ChainState,
    pub to: ChainState,
    pub outcome: SessionOutcome,
    /// Gate state changes caused by a verdict
    #[serde(default)]
    pub gate_transitions: Vec<GateTransition>,
    pub at: DateTime<Utc>,
}

impl SessionTransition {
    pub fn is_blocked(&self) -> bool {
        self.outcome.is_blocked()
    }
}

/// Chain session with its gate enforcement authority
#[derive(Debug, Clone)]
pub struct ChainSession {
    context: SessionContext,
    authority: GateEnforcementAuthority,
}

impl ChainSession {
    /// New session for a chain of `total_steps`
    pub fn new(
        session_id: impl Into<String>,
        chain_id: Option<String>,
        total_steps: u32,
        config: EnforcementConfig,
    ) -> Result<Self> {
        if total_steps == 0 {
            return Err(OrchestraError::Session("chain must have at least one step".to_string()));
        }
        let context = SessionContext::new_chain(session_id, chain_id, total_steps);
        Ok(Self::restore(context, config))
    }

    /// Rehydrate from a persisted context; gate retry counts carry over
    pub fn restore(context: SessionContext, config: EnforcementConfig) -> Self {
        let authority = GateEnforcementAuthority::for_session(context.session_id.clone(), config)
            .with_tracks(context.gate_tracks.clone());
        Self { context, authority }
    }

    pub fn context(&self) -> &SessionContext {
        &self.context
    }

    pub fn session_id(&self) -> &str {
        &self.context.session_id
    }

    pub fn state(&self) -> &ChainState {
        &self.context.state
    }

    pub fn current_step(&self) -> u32 {
        self.context.current_step
    }

    pub fn total_steps(&self) -> u32 {
        self.context.total_steps
    }

    pub fn is_terminal(&self) -> bool {
        self.context.is_terminal()
    }

    pub fn authority(&self) -> &GateEnforcementAuthority {
        &self.authority
    }

    pub fn resolve_enforcement_mode(&mut self, input: &EnforcementInput) -> EnforcementMode {
        self.authority.resolve_enforcement_mode(input)
    }

    /// Context with gate tracks written back, ready to persist
    pub fn into_context(self) -> SessionContext {
        let mut context = self.context;
        context.gate_tracks = self.authority.into_tracks();
        context.updated_at = Utc::now();
        context
    }

    /// Status reminder for the model
    pub fn reminder(&self, mode: ReminderMode) -> String {
        format_reminder(&self.context, mode)
    }

    /// Snapshot of the persistable context without consuming the session
    pub fn snapshot(&self) -> SessionContext {
        self.clone().into_context()
    }

    // === Transitions ===

    /// `not-started → step-in-progress(1)`
    pub fn start(&mut self) -> Result<SessionTransition> {
        self.ensure_active("start")?;
        match self.context.state {
            ChainState::NotStarted => {
                self.context.current_step = 1;
                Ok(self.transition(ChainState::StepInProgress { step: 1 }, SessionOutcome::Continue, Vec::new()))
            }
            _ => Err(self.invalid("start")),
        }
    }

    /// `step-in-progress → awaiting-gate-review`. A review carried over from
    /// a rejected attempt keeps its attempt count.
    pub fn request_gate_review(&mut self, gate_ids: Vec<String>, criteria: Vec<String>) -> Result<SessionTransition> {
        self.ensure_active("request_gate_review")?;
        let step = match self.context.state {
            ChainState::StepInProgress { step } => step,
            _ => return Err(self.invalid("request_gate_review")),
        };
        if gate_ids.is_empty() {
            return Err(OrchestraError::Session("gate review requires at least one gate".to_string()));
        }

        let max_attempts = self.authority.retry_budget().saturating_add(1);
        let review = match self.context.pending_review.take() {
            Some(mut carried) if carried.gate_ids == gate_ids => {
                carried.criteria = criteria;
                carried
            }
            _ => PendingGateReview::new(gate_ids, max_attempts).with_criteria(criteria),
        };
        self.authority.begin_review(review.gate_ids.iter().cloned());
        debug!(session = %self.context.session_id, step, gates = ?review.gate_ids, attempt = review.attempt, "gate review requested");
        self.context.pending_review = Some(review);

        Ok(self.transition(ChainState::AwaitingGateReview { step }, SessionOutcome::AwaitingReview, Vec::new()))
    }

    /// Review decided by a shell command's exit code instead of a verdict
    pub fn request_shell_verification(&mut self, gate_id: impl Into<String>, command: impl Into<String>) -> Result<SessionTransition> {
        self.ensure_active("request_shell_verification")?;
        let step = match self.context.state {
            ChainState::StepInProgress { step } => step,
            _ => return Err(self.invalid("request_shell_verification")),
        };
        let gate_id = gate_id.into();
        let command = command.into();
        let max_attempts = self.authority.config().shell_verify_max_attempts;

        let review = match self.context.pending_review.take() {
            Some(carried) if carried.shell_verify.as_deref() == Some(command.as_str()) => carried,
            _ => PendingGateReview::new(vec![gate_id], max_attempts).with_shell_verify(command),
        };
        self.authority.begin_review(review.gate_ids.iter().cloned());
        self.context.pending_review = Some(review);

        Ok(self.transition(ChainState::AwaitingGateReview { step }, SessionOutcome::AwaitingReview, Vec::new()))
    }

    /// Apply a verdict to every gate under review.
    ///
    /// All gates settled → `step-complete`; a gate out of retries →
    /// `chain-failed` (outcome `Blocked`); otherwise → `step-in-progress` on
    /// the same step for a retry.
    pub fn submit_verdict(&mut self, verdict: &ParsedVerdict) -> Result<SessionTransition> {
        self.ensure_active("submit_verdict")?;
        let step = match self.context.state {
            ChainState::AwaitingGateReview { step } => step,
            _ => return Err(self.invalid("submit_verdict")),
        };
        let gate_ids = self
            .context
            .pending_review
            .as_ref()
            .map(|r| r.gate_ids.clone())
            .ok_or_else(|| OrchestraError::Session("awaiting review without a pending review".to_string()))?;

        let gate_transitions: Vec<GateTransition> = gate_ids
            .iter()
            .map(|gate_id| self.authority.apply_verdict(gate_id, verdict))
            .collect();

        if let Some(blocked) = gate_transitions.iter().find(|t| t.is_blocked()) {
            let reason = format!(
                "gate '{}' exhausted its retry budget ({}): {}",
                blocked.gate_id, blocked.retry_budget, verdict.rationale
            );
            warn!(session = %self.context.session_id, step, gate = %blocked.gate_id, "chain blocked");
            self.context.pending_review = None;
            return Ok(self.transition(ChainState::ChainFailed { step, reason }, SessionOutcome::Blocked, gate_transitions));
        }

        let all_settled = gate_transitions.iter().all(|t| t.to.is_settled());
        if all_settled {
            let passed = gate_transitions.iter().all(|t| t.to == GateStatus::Satisfied);
            self.context.pending_review = None;
            self.record_step_result(
                if passed { StepResult::Success } else { StepResult::Failure },
                verdict.quality_score,
            );
            return Ok(self.transition(ChainState::StepComplete { step }, SessionOutcome::Continue, gate_transitions));
        }

        if let Some(review) = self.context.pending_review.as_mut() {
            review.attempt += 1;
            review.last_rationale = Some(verdict.rationale.clone());
        }
        Ok(self.transition(ChainState::StepInProgress { step }, SessionOutcome::Retry, gate_transitions))
    }

    /// Apply a shell verification result. Failing past the attempt limit
    /// fails the chain even when the retry budget is larger.
    pub fn submit_shell_result(&mut self, exit_code: i32, output: &str) -> Result<SessionTransition> {
        let verdict = ParsedVerdict::from_exit_code(exit_code, output);
        let (attempt, max_attempts) = self
            .context
            .pending_review
            .as_ref()
            .filter(|r| r.shell_verify.is_some())
            .map(|r| (r.attempt, r.max_attempts))
            .ok_or_else(|| OrchestraError::Session("no shell verification pending".to_string()))?;

        if !verdict.is_pass() && attempt >= max_attempts {
            let step = self.context.current_step;
            let reason = format!("shell verification failed after {} attempts", attempt);
            self.context.pending_review = None;
            return Ok(self.transition(ChainState::ChainFailed { step, reason }, SessionOutcome::Blocked, Vec::new()));
        }
        self.submit_verdict(&verdict)
    }

    /// `step-in-progress → step-complete` for steps without gate review
    pub fn complete_step(&mut self, result: StepResult, quality_score: Option<u8>) -> Result<SessionTransition> {
        self.ensure_active("complete_step")?;
        let step = match self.context.state {
            ChainState::StepInProgress { step } => step,
            _ => return Err(self.invalid("complete_step")),
        };
        self.context.pending_review = None;
        self.record_step_result(result, quality_score);
        Ok(self.transition(ChainState::StepComplete { step }, SessionOutcome::Continue, Vec::new()))
    }

    /// `step-complete → step-in-progress(n+1)` or `→ chain-complete` after
    /// the last step
    pub fn advance(&mut self) -> Result<SessionTransition> {
        self.ensure_active("advance")?;
        let step = match self.context.state {
            ChainState::StepComplete { step } => step,
            _ => return Err(self.invalid("advance")),
        };
        if step >= self.context.total_steps {
            info!(session = %self.context.session_id, steps = step, "chain complete");
            return Ok(self.transition(ChainState::ChainComplete, SessionOutcome::Complete, Vec::new()));
        }
        self.context.current_step = step + 1;
        Ok(self.transition(
            ChainState::StepInProgress { step: step + 1 },
            SessionOutcome::Continue,
            Vec::new(),
        ))
    }

    /// Fail the chain from any non-terminal state
    pub fn fail(&mut self, reason: impl Into<String>) -> Result<SessionTransition> {
        self.ensure_active("fail")?;
        let step = self.context.current_step;
        self.context.pending_review = None;
        Ok(self.transition(
            ChainState::ChainFailed {
                step,
                reason: reason.into(),
            },
            SessionOutcome::Blocked,
            Vec::new(),
        ))
    }

    // === Internals ===

    fn record_step_result(&mut self, result: StepResult, quality_score: Option<u8>) {
        self.context.previous_step_result = Some(result);
        self.context.previous_step_quality_score = quality_score.map(|s| s.min(100));
    }

    fn ensure_active(&self, operation: &str) -> Result<()> {
        if self.is_terminal() {
            return Err(OrchestraError::Session(format!(
                "{}: session {} is {}",
                operation, self.context.session_id, self.context.state
            )));
        }
        Ok(())
    }

    fn invalid(&self, operation: &str) -> OrchestraError {
        OrchestraError::Session(format!(
            "{} not allowed in state {} (session {})",
            operation, self.context.state, self.context.session_id
        ))
    }

    fn transition(&mut self, to: ChainState, outcome: SessionOutcome, gate_transitions: Vec<GateTransition>) -> SessionTransition {
        let from = std::mem::replace(&mut self.context.state, to.clone());
        self.context.updated_at = Utc::now();
        debug!(session = %self.context.session_id, from = %from, to = %to, ?outcome, "session transition");
        SessionTransition {
            session_id: self.context.session_id.clone(),
            from,
            to,
            outcome,
            gate_transitions,
            at: self.context.updated_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use orchestra_gates::VerdictSource;

    fn session(total: u32, budget: u32) -> ChainSession {
        ChainSession::new("s1", Some("chain-abc".into()), total, EnforcementConfig::new(budget)).unwrap()
    }

    fn fail() -> ParsedVerdict {
        ParsedVerdict::fail("missing citations", VerdictSource::GateVerdictField)
    }

    fn pass() -> ParsedVerdict {
        ParsedVerdict::pass("looks good", VerdictSource::GateVerdictField).with_quality_score(87)
    }

    #[test]
    fn test_three_steps_complete_in_sequence() {
        let mut s = session(3, 1);
        s.start().unwrap();
        let mut completes = 0;
        loop {
            let t = s.complete_step(StepResult::Success, None).unwrap();
            assert!(matches!(t.to, ChainState::StepComplete { .. }));
            completes += 1;
            let t = s.advance().unwrap();
            if t.to == ChainState::ChainComplete {
                assert_eq!(t.outcome, SessionOutcome::Complete);
                break;
            }
            assert_ne!(s.state(), &ChainState::ChainComplete);
        }
        assert_eq!(completes, 3);
        assert!(s.is_terminal());
    }

    #[test]
    fn test_rejection_budget_one_fails_on_second() {
        let mut s = session(3, 1);
        s.start().unwrap();
        s.complete_step(StepResult::Success, None).unwrap();
        s.advance().unwrap();
        assert_eq!(s.current_step(), 2);

        s.request_gate_review(vec!["citations".into()], vec![]).unwrap();
        let first = s.submit_verdict(&fail()).unwrap();
        assert_eq!(first.outcome, SessionOutcome::Retry);
        assert_eq!(first.to, ChainState::StepInProgress { step: 2 });
        assert!(!s.is_terminal());

        s.request_gate_review(vec!["citations".into()], vec![]).unwrap();
        assert_eq!(s.context().pending_review.as_ref().unwrap().attempt, 2);
        let second = s.submit_verdict(&fail()).unwrap();
        assert!(second.is_blocked());
        assert!(matches!(second.to, ChainState::ChainFailed { step: 2, .. }));
        assert!(s.is_terminal());
    }

    #[test]
    fn test_pass_writes_previous_step() {
        let mut s = session(2, 2);
        s.start().unwrap();
        s.request_gate_review(vec!["quality".into()], vec!["be thorough".into()]).unwrap();
        let t = s.submit_verdict(&pass()).unwrap();
        assert_eq!(t.to, ChainState::StepComplete { step: 1 });
        assert_eq!(s.context().previous_step_result, Some(StepResult::Success));
        assert_eq!(s.context().previous_step_quality_score, Some(87));
        assert!(!s.context().has_pending_review());
    }

    #[test]
    fn test_advisory_failure_completes_step() {
        let mut s = session(2, 1);
        s.resolve_enforcement_mode(&EnforcementInput::new().requested(EnforcementMode::Advisory));
        s.start().unwrap();
        s.request_gate_review(vec!["style".into()], vec![]).unwrap();
        let t = s.submit_verdict(&fail()).unwrap();
        assert_eq!(t.to, ChainState::StepComplete { step: 1 });
        assert_eq!(t.gate_transitions[0].to, GateStatus::Waived);
        assert_eq!(s.context().previous_step_result, Some(StepResult::Failure));
    }

    #[test]
    fn test_terminal_rejects_transitions() {
        let mut s = session(1, 1);
        s.start().unwrap();
        s.fail("aborted").unwrap();
        assert!(matches!(s.advance(), Err(OrchestraError::Session(_))));
        assert!(matches!(s.start(), Err(OrchestraError::Session(_))));
        assert!(matches!(s.fail("again"), Err(OrchestraError::Session(_))));
    }

    #[test]
    fn test_invalid_transition() {
        let mut s = session(2, 1);
        let err = s.advance().unwrap_err();
        assert!(err.to_string().contains("not-started"));
        assert!(s.submit_verdict(&pass()).is_err());
    }

    #[test]
    fn test_retry_counts_survive_restore() {
        let mut s = session(2, 1);
        s.start().unwrap();
        s.request_gate_review(vec!["citations".into()], vec![]).unwrap();
        s.submit_verdict(&fail()).unwrap();
        let persisted = s.into_context();
        assert_eq!(persisted.gate_tracks[0].rejections, 1);

        let mut restored = ChainSession::restore(persisted, EnforcementConfig::new(1));
        restored.request_gate_review(vec!["citations".into()], vec![]).unwrap();
        assert!(restored.submit_verdict(&fail()).unwrap().is_blocked());
    }

    #[test]
    fn test_shell_verification_attempt_limit() {
        let config = EnforcementConfig::new(10).with_shell_verify_attempts(2);
        let mut s = ChainSession::new("s2", None, 1, config).unwrap();
        s.start().unwrap();

        s.request_shell_verification("tests", "cargo test").unwrap();
        assert_eq!(s.submit_shell_result(1, "1 failed").unwrap().outcome, SessionOutcome::Retry);

        s.request_shell_verification("tests", "cargo test").unwrap();
        let t = s.submit_shell_result(1, "1 failed").unwrap();
        assert!(t.is_blocked());
        assert!(matches!(t.to, ChainState::ChainFailed { .. }));
    }

    #[test]
    fn test_shell_verification_pass() {
        let mut s = ChainSession::new("s3", None, 1, EnforcementConfig::new(1)).unwrap();
        s.start().unwrap();
        s.request_shell_verification("tests", "cargo test").unwrap();
        let t = s.submit_shell_result(0, "ok").unwrap();
        assert_eq!(t.to, ChainState::StepComplete { step: 1 });
        assert_eq!(s.advance().unwrap().to, ChainState::ChainComplete);
    }

    #[test]
    fn test_reminder_tracks_state() {
        let mut s = session(3, 1);
        s.start().unwrap();
        assert!(s.reminder(ReminderMode::Inline).contains("to continue"));
        s.request_gate_review(vec!["quality".into()], vec![]).unwrap();
        assert!(s.reminder(ReminderMode::Full).contains("[Gate] quality"));
    }

    #[test]
    fn test_zero_steps_rejected() {
        assert!(ChainSession::new("s", None, 0, EnforcementConfig::new(1)).is_err());
    }
}
