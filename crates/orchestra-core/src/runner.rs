//! Pipeline Runner: awaits stages in order and records a proof per stage
use crate::context::{ExecutionContext, PipelineResponse};
use crate::error::{OrchestraError, Result};
use crate::stage::{Stage, StageOutcome};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Per-stage record: plan fingerprints before and after, latency and outcome
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageProof {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan_before: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan_after: Option<String>,
    pub latency_ms: u64,
    pub outcome: StageOutcome,
}

impl StageProof {
    pub fn plan_changed(&self) -> bool {
        self.plan_before != self.plan_after
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunReport {
    pub pipeline_id: String,
    pub proofs: Vec<StageProof>,
}

impl RunReport {
    /// First stage that failed, if any
    pub fn failure(&self) -> Option<&StageProof> {
        self.proofs
            .iter()
            .find(|p| matches!(p.outcome, StageOutcome::Failed(_)))
    }
}

pub struct PipelineRunner {
    stages: Vec<Box<dyn Stage>>,
    pipeline_id: String,
}

impl PipelineRunner {
    pub fn new(stages: Vec<Box<dyn Stage>>) -> Self {
        let pipeline_id = stages
            .iter()
            .map(|s| s.id().split('.').next().unwrap_or("?"))
            .collect::<Vec<_>>()
            .join("→");

        Self { stages, pipeline_id }
    }

    pub fn pipeline_id(&self) -> &str {
        &self.pipeline_id
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Run every stage until the context becomes terminal. A fatal stage
    /// error becomes a failure response on the context.
    pub async fn run(&self, ctx: &mut ExecutionContext) -> Result<RunReport> {
        let mut proofs = Vec::with_capacity(self.stages.len());
        info!(
            pipeline = %self.pipeline_id,
            request_id = %ctx.request().request_id(),
            "pipeline started"
        );

        for stage in &self.stages {
            if ctx.is_terminal() {
                debug!(stage = stage.id(), "context terminal; remaining stages skipped");
                break;
            }

            let start = Instant::now();
            let plan_before = ctx.execution_plan().map(|p| p.fingerprint());

            let outcome = match stage.run(ctx).await {
                Ok(outcome) => outcome,
                Err(err) if !err.is_fatal() => {
                    ctx.diagnostics_mut().warn(stage.id(), err.to_string());
                    StageOutcome::Continue
                }
                Err(err) => {
                    warn!(stage = stage.id(), error = %err, "stage failed");
                    self.fail(ctx, &err)?;
                    StageOutcome::Failed(err.to_string())
                }
            };

            let proof = StageProof {
                id: stage.id().to_string(),
                plan_before,
                plan_after: ctx.execution_plan().map(|p| p.fingerprint()),
                latency_ms: start.elapsed().as_millis() as u64,
                outcome,
            };
            debug!(stage = %proof.id, latency_ms = proof.latency_ms, outcome = ?proof.outcome, "stage finished");

            ctx.state_mut().lifecycle.completed_stages.push(proof.id.clone());
            proofs.push(proof);
        }

        Ok(RunReport {
            pipeline_id: self.pipeline_id.clone(),
            proofs,
        })
    }

    fn fail(&self, ctx: &mut ExecutionContext, err: &OrchestraError) -> Result<()> {
        if ctx.is_terminal() {
            return Ok(());
        }
        let response = PipelineResponse::failure(ctx.request().request_id(), err)
            .with_diagnostics(ctx.diagnostics().all());
        ctx.set_response(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ExecutionRequest;
    use crate::plan::{ExecutionPlan, ExecutionStrategy, PlanParts};
    use async_trait::async_trait;
    use std::collections::BTreeSet;

    struct SetPlan;

    #[async_trait]
    impl Stage for SetPlan {
        fn id(&self) -> &'static str {
            "plan.test"
        }

        async fn run(&self, ctx: &mut ExecutionContext) -> Result<StageOutcome> {
            ctx.set_execution_plan(ExecutionPlan::from(PlanParts {
                strategy: ExecutionStrategy::Single,
                gates: BTreeSet::new(),
                requires_framework: false,
                requires_session: false,
                category: None,
                modifiers: None,
                semantic_analysis: None,
            }))?;
            Ok(StageOutcome::Continue)
        }
    }

    struct NeedsSession;

    #[async_trait]
    impl Stage for NeedsSession {
        fn id(&self) -> &'static str {
            "session.test"
        }

        async fn run(&self, ctx: &mut ExecutionContext) -> Result<StageOutcome> {
            ctx.require_session_context()?;
            Ok(StageOutcome::Continue)
        }
    }

    struct FlakyLookup;

    #[async_trait]
    impl Stage for FlakyLookup {
        fn id(&self) -> &'static str {
            "lookup.test"
        }

        async fn run(&self, _ctx: &mut ExecutionContext) -> Result<StageOutcome> {
            Err(OrchestraError::ExternalLookup("provider offline".to_string()))
        }
    }

    struct Respond;

    #[async_trait]
    impl Stage for Respond {
        fn id(&self) -> &'static str {
            "respond.test"
        }

        async fn run(&self, ctx: &mut ExecutionContext) -> Result<StageOutcome> {
            let id = ctx.request().request_id();
            ctx.set_response(PipelineResponse::success(id, "ok"))?;
            Ok(StageOutcome::Continue)
        }
    }

    #[tokio::test]
    async fn test_pipeline_id() {
        let runner = PipelineRunner::new(vec![Box::new(SetPlan), Box::new(Respond)]);
        assert_eq!(runner.pipeline_id(), "plan→respond");
    }

    #[tokio::test]
    async fn test_records_plan_fingerprints() {
        let runner = PipelineRunner::new(vec![Box::new(SetPlan), Box::new(Respond)]);
        let mut ctx = ExecutionContext::new(ExecutionRequest::new(">>x"));
        let report = runner.run(&mut ctx).await.unwrap();

        assert_eq!(report.proofs.len(), 2);
        assert!(report.proofs[0].plan_before.is_none());
        assert!(report.proofs[0].plan_changed());
        assert!(!report.proofs[1].plan_changed());
        assert!(ctx.response().unwrap().success);
        assert_eq!(ctx.state().lifecycle.completed_stages, vec!["plan.test", "respond.test"]);
    }

    #[tokio::test]
    async fn test_fatal_error_becomes_failure_response() {
        let runner = PipelineRunner::new(vec![Box::new(SetPlan), Box::new(NeedsSession), Box::new(Respond)]);
        let mut ctx = ExecutionContext::new(ExecutionRequest::new(">>x"));
        let report = runner.run(&mut ctx).await.unwrap();

        assert_eq!(report.proofs.len(), 2);
        assert_eq!(report.failure().unwrap().id, "session.test");
        let response = ctx.response().unwrap();
        assert!(!response.success);
        assert!(response.error.as_deref().unwrap().starts_with("PRECONDITION/"));
    }

    #[tokio::test]
    async fn test_lookup_error_is_diagnosed() {
        let runner = PipelineRunner::new(vec![Box::new(FlakyLookup), Box::new(Respond)]);
        let mut ctx = ExecutionContext::new(ExecutionRequest::new(">>x"));
        let report = runner.run(&mut ctx).await.unwrap();

        assert!(report.failure().is_none());
        assert_eq!(ctx.diagnostics().len(), 1);
        assert!(ctx.response().unwrap().success);
    }
}
