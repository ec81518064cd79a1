//! Stage Trait: single contract for every pipeline stage
use crate::context::ExecutionContext;
use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// What a stage did
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "detail", rename_all = "snake_case")]
pub enum StageOutcome {
    Continue,
    /// Stage did not apply to this request
    Skipped(String),
    /// Stage failed with a fatal error; the response names it
    Failed(String),
}

#[async_trait]
pub trait Stage: Send + Sync {
    /// Unique stage ID (ex: "planning.v1")
    fn id(&self) -> &'static str;

    /// Run against the request context. Fatal errors abort the pipeline;
    /// lookup errors are recorded as diagnostics and the pipeline continues.
    async fn run(&self, ctx: &mut ExecutionContext) -> Result<StageOutcome>;
}
