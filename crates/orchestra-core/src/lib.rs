//! Orchestra Core: execution context, data model, stage trait and runner
//!
//! Every request gets one [`ExecutionContext`]. Stages implementing
//! [`Stage`] are awaited in order by the [`PipelineRunner`], which records a
//! [`StageProof`] per stage with the plan fingerprint before and after.
//!
//! ```
//! use orchestra_core::{GateAccumulator, GateSource};
//!
//! let mut gates = GateAccumulator::new();
//! gates.add("code-quality", GateSource::CategoryAutoAssign, 1);
//! gates.add("code-quality", GateSource::InlineOperator, 5);
//! assert_eq!(gates.entry("code-quality").unwrap().source, GateSource::InlineOperator);
//! ```

pub mod context;
pub mod data_model;
pub mod diagnostics;
pub mod error;
pub mod framework;
pub mod gate_accumulator;
pub mod logging;
pub mod modifiers;
pub mod plan;
pub mod runner;
pub mod session;
pub mod stage;

pub use context::{
    ExecutionContext, ExecutionRequest, ExecutionResults, FrameworkExecutionContext, PipelineResponse,
    PipelineState, RequestOptions,
};
pub use data_model::{
    AnalyzedExecutionType, CategoryGateConfig, ChainStep, CommandType, ConvertedPrompt, DeclaredChainStep,
    GateOverride, GateOverrides, NamedInlineGate, OperatorKind, ParsedCommand, PromptGateConfig,
    SemanticAnalysis, ShellVerifySpec, SymbolicOperator,
};
pub use diagnostics::{Diagnostic, DiagnosticAccumulator, DiagnosticLevel};
pub use error::{OrchestraError, Result};
pub use framework::{DecisionSource, FrameworkDecision, FrameworkDecisionAuthority, FrameworkDecisionInput};
pub use gate_accumulator::{GateAccumulator, GateEntry, GateSource};
pub use modifiers::{Modifier, Modifiers, NormalizedModifiers};
pub use plan::{ChainPlan, ExecutionPlan, ExecutionStrategy, PlanParts, StepPlan};
pub use runner::{PipelineRunner, RunReport, StageProof};
pub use session::{ChainState, PendingGateReview, SessionContext, SessionOutcome, StepResult};
pub use stage::{Stage, StageOutcome};

/// Orchestra engine version
pub const ORCHESTRA_VERSION: &str = "1.0.0";
