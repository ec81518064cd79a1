//! Session data carried between chain steps
use chrono::{DateTime, Utc};
use orchestra_gates::GateTrack;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Outcome of the previous chain step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepResult {
    Success,
    Failure,
    Skipped,
}

/// Chain session state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "kebab-case")]
pub enum ChainState {
    NotStarted,
    StepInProgress { step: u32 },
    AwaitingGateReview { step: u32 },
    StepComplete { step: u32 },
    ChainComplete,
    ChainFailed { step: u32, reason: String },
}

impl ChainState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ChainState::ChainComplete | ChainState::ChainFailed { .. })
    }

    pub fn name(&self) -> &'static str {
        match self {
            ChainState::NotStarted => "not-started",
            ChainState::StepInProgress { .. } => "step-in-progress",
            ChainState::AwaitingGateReview { .. } => "awaiting-gate-review",
            ChainState::StepComplete { .. } => "step-complete",
            ChainState::ChainComplete => "chain-complete",
            ChainState::ChainFailed { .. } => "chain-failed",
        }
    }
}

impl fmt::Display for ChainState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ChainState::StepInProgress { step }
            | ChainState::AwaitingGateReview { step }
            | ChainState::StepComplete { step } => write!(f, "{}({})", self.name(), step),
            ChainState::ChainFailed { step, reason } => write!(f, "{}({}): {}", self.name(), step, reason),
            _ => write!(f, "{}", self.name()),
        }
    }
}

/// What a pipeline invocation did to the chain, reported to the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionOutcome {
    /// Step is running or ready to run
    Continue,
    /// Waiting for a `GATE_REVIEW` verdict
    AwaitingReview,
    /// Verdict rejected; the same step runs again
    Retry,
    /// Retry budget exhausted; chain blocked pending resolution
    Blocked,
    Complete,
}

impl SessionOutcome {
    pub fn is_blocked(&self) -> bool {
        matches!(self, SessionOutcome::Blocked)
    }
}

/// Gate review the chain is waiting on
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingGateReview {
    pub gate_ids: Vec<String>,
    /// Criteria shown to the reviewer
    #[serde(default)]
    pub criteria: Vec<String>,
    /// Shell command that decides the review instead of a text verdict
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shell_verify: Option<String>,
    pub attempt: u32,
    pub max_attempts: u32,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_rationale: Option<String>,
}

impl PendingGateReview {
    pub fn new(gate_ids: Vec<String>, max_attempts: u32) -> Self {
        Self {
            gate_ids,
            criteria: Vec::new(),
            shell_verify: None,
            attempt: 1,
            max_attempts,
            created_at: Utc::now(),
            last_rationale: None,
        }
    }

    pub fn with_criteria(mut self, criteria: Vec<String>) -> Self {
        self.criteria = criteria;
        self
    }

    pub fn with_shell_verify(mut self, command: impl Into<String>) -> Self {
        self.shell_verify = Some(command.into());
        self
    }
}

/// Chain session state persisted between invocations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionContext {
    pub session_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chain_id: Option<String>,
    pub is_chain_execution: bool,
    pub current_step: u32,
    pub total_steps: u32,
    pub state: ChainState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending_review: Option<PendingGateReview>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_step_result: Option<StepResult>,
    /// 0..=100
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_step_quality_score: Option<u8>,
    /// Per-gate retry state
    #[serde(default)]
    pub gate_tracks: Vec<GateTrack>,
    /// Store version this value was loaded at
    #[serde(default)]
    pub version: u64,
    pub updated_at: DateTime<Utc>,
}

impl SessionContext {
    /// Fresh session for a chain of `total_steps`
    pub fn new_chain(session_id: impl Into<String>, chain_id: Option<String>, total_steps: u32) -> Self {
        Self {
            session_id: session_id.into(),
            chain_id,
            is_chain_execution: true,
            current_step: 0,
            total_steps,
            state: ChainState::NotStarted,
            pending_review: None,
            previous_step_result: None,
            previous_step_quality_score: None,
            gate_tracks: Vec::new(),
            version: 0,
            updated_at: Utc::now(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    pub fn has_pending_review(&self) -> bool {
        self.pending_review.is_some()
    }
}
