//! Execution Context: state shared by the stages of one request
//!
//! A context owns exactly one inbound request and is never shared between
//! requests. Once a response is set the context is terminal and further
//! mutation fails with [`OrchestraError::Terminal`].
use crate::data_model::{GateOverrides, ParsedCommand};
use crate::diagnostics::{Diagnostic, DiagnosticAccumulator};
use crate::error::{OrchestraError, Result};
use crate::framework::FrameworkDecisionAuthority;
use crate::gate_accumulator::GateAccumulator;
use crate::plan::{ChainPlan, ExecutionPlan};
use crate::session::{SessionContext, SessionOutcome};
use chrono::{DateTime, Utc};
use orchestra_gates::{EnforcementMode, GateEnforcementAuthority, ParsedVerdict};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// === Request ===

/// Caller options attached to a request
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestOptions {
    /// Framework requested by the client
    #[serde(default)]
    pub framework: Option<String>,
    #[serde(default)]
    pub gate_overrides: Option<GateOverrides>,
    #[serde(default)]
    pub enforcement_mode: Option<EnforcementMode>,
    /// Discard any stored session and start the chain over
    #[serde(default)]
    pub force_restart: bool,
}

/// Inbound request. Immutable after construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionRequest {
    request_id: Uuid,
    received_at: DateTime<Utc>,
    command: String,
    #[serde(default)]
    chain_id: Option<String>,
    #[serde(default)]
    session_id: Option<String>,
    #[serde(default)]
    gate_verdict: Option<String>,
    #[serde(default)]
    user_response: Option<String>,
    #[serde(default)]
    options: RequestOptions,
}

impl ExecutionRequest {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            received_at: Utc::now(),
            command: command.into(),
            chain_id: None,
            session_id: None,
            gate_verdict: None,
            user_response: None,
            options: RequestOptions::default(),
        }
    }

    pub fn with_chain_id(mut self, chain_id: impl Into<String>) -> Self {
        self.chain_id = Some(chain_id.into());
        self
    }

    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_gate_verdict(mut self, verdict: impl Into<String>) -> Self {
        self.gate_verdict = Some(verdict.into());
        self
    }

    pub fn with_user_response(mut self, response: impl Into<String>) -> Self {
        self.user_response = Some(response.into());
        self
    }

    pub fn with_options(mut self, options: RequestOptions) -> Self {
        self.options = options;
        self
    }

    pub fn request_id(&self) -> Uuid {
        self.request_id
    }

    pub fn received_at(&self) -> DateTime<Utc> {
        self.received_at
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn chain_id(&self) -> Option<&str> {
        self.chain_id.as_deref()
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    pub fn gate_verdict(&self) -> Option<&str> {
        self.gate_verdict.as_deref()
    }

    pub fn user_response(&self) -> Option<&str> {
        self.user_response.as_deref()
    }

    pub fn options(&self) -> &RequestOptions {
        &self.options
    }

    /// Session key: explicit session id, else chain id
    pub fn session_key(&self) -> Option<&str> {
        self.session_id().or_else(|| self.chain_id())
    }
}

// === Stage outputs ===

/// Guidance produced by the framework manager
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameworkExecutionContext {
    pub framework_id: String,
    pub system_prompt: String,
    #[serde(default)]
    pub guidelines: Vec<String>,
}

/// Rendered output of the execution stages
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionResults {
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_number: Option<u32>,
}

/// Final response for the caller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineResponse {
    pub request_id: Uuid,
    pub success: bool,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_outcome: Option<SessionOutcome>,
    /// Key of the chain session; pass it back to continue the chain
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default)]
    pub gates: Vec<String>,
    #[serde(default)]
    pub diagnostics: Vec<Diagnostic>,
}

impl PipelineResponse {
    pub fn success(request_id: Uuid, content: impl Into<String>) -> Self {
        Self {
            request_id,
            success: true,
            content: content.into(),
            error: None,
            session_outcome: None,
            session_id: None,
            gates: Vec::new(),
            diagnostics: Vec::new(),
        }
    }

    /// Failure response naming the error
    pub fn failure(request_id: Uuid, error: &OrchestraError) -> Self {
        Self {
            request_id,
            success: false,
            content: String::new(),
            error: Some(error.to_string()),
            session_outcome: None,
            session_id: None,
            gates: Vec::new(),
            diagnostics: Vec::new(),
        }
    }

    pub fn with_session_outcome(mut self, outcome: SessionOutcome) -> Self {
        self.session_outcome = Some(outcome);
        self
    }

    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_gates(mut self, gates: impl IntoIterator<Item = String>) -> Self {
        self.gates = gates.into_iter().collect();
        self
    }

    pub fn with_diagnostics(mut self, diagnostics: &[Diagnostic]) -> Self {
        self.diagnostics = diagnostics.to_vec();
        self
    }
}

// === Internal state ===

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LifecycleState {
    /// Stage IDs in completion order
    pub completed_stages: Vec<String>,
    pub terminal: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InjectionState {
    pub system_prompt_injected: bool,
    pub gate_guidance_injected: bool,
    #[serde(default)]
    pub style: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameworkState {
    pub guidance_applied: bool,
    /// Guidance lookup failed and was skipped
    pub degraded: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionState {
    pub resolved: bool,
    /// Session was created by this request
    pub created: bool,
    #[serde(default)]
    pub outcome: Option<SessionOutcome>,
    /// Store version after the last save
    #[serde(default)]
    pub persisted_version: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GateState {
    #[serde(default)]
    pub enforcement_mode: Option<EnforcementMode>,
    pub review_requested: bool,
    #[serde(default)]
    pub last_verdict: Option<ParsedVerdict>,
    #[serde(default)]
    pub blocked_gates: Vec<String>,
}

/// Typed internal state, partitioned by concern
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineState {
    pub lifecycle: LifecycleState,
    pub injection: InjectionState,
    pub framework: FrameworkState,
    pub session: SessionState,
    pub gates: GateState,
}

// === Context ===

#[derive(Debug)]
pub struct ExecutionContext {
    request: ExecutionRequest,
    parsed_command: Option<ParsedCommand>,
    execution_plan: Option<ExecutionPlan>,
    chain_plan: Option<ChainPlan>,
    framework_context: Option<FrameworkExecutionContext>,
    session_context: Option<SessionContext>,
    execution_results: Option<ExecutionResults>,
    gate_accumulator: GateAccumulator,
    diagnostics: DiagnosticAccumulator,
    framework_authority: FrameworkDecisionAuthority,
    gate_enforcement: Option<GateEnforcementAuthority>,
    state: PipelineState,
    response: Option<PipelineResponse>,
}

impl ExecutionContext {
    pub fn new(request: ExecutionRequest) -> Self {
        Self {
            request,
            parsed_command: None,
            execution_plan: None,
            chain_plan: None,
            framework_context: None,
            session_context: None,
            execution_results: None,
            gate_accumulator: GateAccumulator::new(),
            diagnostics: DiagnosticAccumulator::new(),
            framework_authority: FrameworkDecisionAuthority::new(),
            gate_enforcement: None,
            state: PipelineState::default(),
            response: None,
        }
    }

    fn ensure_open(&self, what: &str) -> Result<()> {
        if self.is_terminal() {
            return Err(OrchestraError::Terminal(format!(
                "cannot set {} after the response was set",
                what
            )));
        }
        Ok(())
    }

    pub fn request(&self) -> &ExecutionRequest {
        &self.request
    }

    pub fn is_terminal(&self) -> bool {
        self.response.is_some()
    }

    // --- command & plan ---

    pub fn parsed_command(&self) -> Option<&ParsedCommand> {
        self.parsed_command.as_ref()
    }

    pub fn set_parsed_command(&mut self, command: ParsedCommand) -> Result<()> {
        self.ensure_open("parsed command")?;
        self.parsed_command = Some(command);
        Ok(())
    }

    pub fn execution_plan(&self) -> Option<&ExecutionPlan> {
        self.execution_plan.as_ref()
    }

    pub fn set_execution_plan(&mut self, plan: ExecutionPlan) -> Result<()> {
        self.ensure_open("execution plan")?;
        self.execution_plan = Some(plan);
        Ok(())
    }

    /// Plan, or a precondition error when planning has not run
    pub fn require_execution_plan(&self) -> Result<&ExecutionPlan> {
        self.execution_plan.as_ref().ok_or_else(|| {
            OrchestraError::Precondition("execution plan not available; planning has not completed".to_string())
        })
    }

    pub fn chain_plan(&self) -> Option<&ChainPlan> {
        self.chain_plan.as_ref()
    }

    pub fn set_chain_plan(&mut self, plan: ChainPlan) -> Result<()> {
        self.ensure_open("chain plan")?;
        self.chain_plan = Some(plan);
        Ok(())
    }

    /// Chain execution per command type or plan strategy
    pub fn is_chain(&self) -> bool {
        self.chain_plan.is_some() || self.execution_plan.as_ref().map(|p| p.is_chain()).unwrap_or(false)
    }

    // --- framework ---

    pub fn framework_context(&self) -> Option<&FrameworkExecutionContext> {
        self.framework_context.as_ref()
    }

    pub fn set_framework_context(&mut self, framework: FrameworkExecutionContext) -> Result<()> {
        self.ensure_open("framework context")?;
        self.framework_context = Some(framework);
        Ok(())
    }

    pub fn framework_authority(&self) -> &FrameworkDecisionAuthority {
        &self.framework_authority
    }

    pub fn framework_authority_mut(&mut self) -> &mut FrameworkDecisionAuthority {
        &mut self.framework_authority
    }

    // --- session ---

    pub fn session_context(&self) -> Option<&SessionContext> {
        self.session_context.as_ref()
    }

    pub fn set_session_context(&mut self, session: SessionContext) -> Result<()> {
        self.ensure_open("session context")?;
        self.session_context = Some(session);
        Ok(())
    }

    /// Session, or a precondition error for non-chain execution or when
    /// session resolution has not run
    pub fn require_session_context(&self) -> Result<&SessionContext> {
        if !self.is_chain() && self.execution_plan.as_ref().map(|p| !p.requires_session()).unwrap_or(true) {
            return Err(OrchestraError::Precondition(
                "session context requested for non-chain execution".to_string(),
            ));
        }
        self.session_context.as_ref().ok_or_else(|| {
            OrchestraError::Precondition("session context not available; session resolution has not completed".to_string())
        })
    }

    pub fn take_session_context(&mut self) -> Result<Option<SessionContext>> {
        self.ensure_open("session context")?;
        Ok(self.session_context.take())
    }

    // --- results & response ---

    pub fn execution_results(&self) -> Option<&ExecutionResults> {
        self.execution_results.as_ref()
    }

    pub fn set_execution_results(&mut self, results: ExecutionResults) -> Result<()> {
        self.ensure_open("execution results")?;
        self.execution_results = Some(results);
        Ok(())
    }

    pub fn response(&self) -> Option<&PipelineResponse> {
        self.response.as_ref()
    }

    /// Set the response; the context is terminal afterwards
    pub fn set_response(&mut self, response: PipelineResponse) -> Result<()> {
        self.ensure_open("response")?;
        self.response = Some(response);
        self.state.lifecycle.terminal = true;
        Ok(())
    }

    // --- accumulators ---

    pub fn gate_accumulator(&self) -> &GateAccumulator {
        &self.gate_accumulator
    }

    pub fn gate_accumulator_mut(&mut self) -> &mut GateAccumulator {
        &mut self.gate_accumulator
    }

    pub fn diagnostics(&self) -> &DiagnosticAccumulator {
        &self.diagnostics
    }

    pub fn diagnostics_mut(&mut self) -> &mut DiagnosticAccumulator {
        &mut self.diagnostics
    }

    // --- gate enforcement ---

    pub fn gate_enforcement(&self) -> Option<&GateEnforcementAuthority> {
        self.gate_enforcement.as_ref()
    }

    pub fn gate_enforcement_mut(&mut self) -> Option<&mut GateEnforcementAuthority> {
        self.gate_enforcement.as_mut()
    }

    pub fn attach_gate_enforcement(&mut self, authority: GateEnforcementAuthority) -> Result<()> {
        self.ensure_open("gate enforcement")?;
        self.gate_enforcement = Some(authority);
        Ok(())
    }

    pub fn take_gate_enforcement(&mut self) -> Option<GateEnforcementAuthority> {
        self.gate_enforcement.take()
    }

    // --- internal state ---

    pub fn state(&self) -> &PipelineState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut PipelineState {
        &mut self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_model::ConvertedPrompt;
    use crate::plan::{ExecutionStrategy, PlanParts};
    use std::collections::BTreeSet;

    fn plan(strategy: ExecutionStrategy, requires_session: bool) -> ExecutionPlan {
        ExecutionPlan::from(PlanParts {
            strategy,
            gates: BTreeSet::new(),
            requires_framework: false,
            requires_session,
            category: None,
            modifiers: None,
            semantic_analysis: None,
        })
    }

    #[test]
    fn test_require_plan_before_planning() {
        let ctx = ExecutionContext::new(ExecutionRequest::new(">>analyze"));
        let err = ctx.require_execution_plan().unwrap_err();
        assert!(matches!(err, OrchestraError::Precondition(_)));
        assert!(err.to_string().starts_with("PRECONDITION/"));
    }

    #[test]
    fn test_require_session_for_single() {
        let mut ctx = ExecutionContext::new(ExecutionRequest::new(">>analyze"));
        ctx.set_execution_plan(plan(ExecutionStrategy::Single, false)).unwrap();
        let err = ctx.require_session_context().unwrap_err();
        assert!(err.to_string().contains("non-chain"));
    }

    #[test]
    fn test_require_session_before_resolution() {
        let mut ctx = ExecutionContext::new(ExecutionRequest::new(">>a --> >>b"));
        ctx.set_execution_plan(plan(ExecutionStrategy::Chain, true)).unwrap();
        let err = ctx.require_session_context().unwrap_err();
        assert!(err.to_string().contains("not available"));

        ctx.set_session_context(SessionContext::new_chain("s1", None, 2)).unwrap();
        assert_eq!(ctx.require_session_context().unwrap().session_id, "s1");
    }

    #[test]
    fn test_terminal_after_response() {
        let request = ExecutionRequest::new(">>analyze");
        let id = request.request_id();
        let mut ctx = ExecutionContext::new(request);
        ctx.set_parsed_command(ParsedCommand::single(ConvertedPrompt::new("analyze")))
            .unwrap();
        ctx.set_response(PipelineResponse::success(id, "done")).unwrap();

        assert!(ctx.is_terminal());
        assert!(ctx.state().lifecycle.terminal);
        assert!(matches!(
            ctx.set_execution_plan(plan(ExecutionStrategy::Single, false)),
            Err(OrchestraError::Terminal(_))
        ));
        assert!(matches!(
            ctx.set_response(PipelineResponse::success(id, "again")),
            Err(OrchestraError::Terminal(_))
        ));
        assert_eq!(ctx.response().unwrap().content, "done");
    }

    #[test]
    fn test_session_key_prefers_session_id() {
        let request = ExecutionRequest::new("x").with_chain_id("chain-1").with_session_id("sess-1");
        assert_eq!(request.session_key(), Some("sess-1"));
        assert_eq!(ExecutionRequest::new("x").with_chain_id("chain-1").session_key(), Some("chain-1"));
    }
}
