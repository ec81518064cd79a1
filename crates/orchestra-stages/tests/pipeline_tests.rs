//! End-to-end pipeline tests against the fixture profile.

use async_trait::async_trait;
use orchestra_core::{
    ChainStep, ConvertedPrompt, DiagnosticLevel, ExecutionRequest, Modifier, Modifiers, NamedInlineGate,
    ParsedCommand, RequestOptions, Result, SessionOutcome, ShellVerifySpec, StageOutcome, SymbolicOperator,
};
use orchestra_gates::EnforcementMode;
use orchestra_stages::{Orchestra, OrchestraConfig, OrchestraServices, SessionSettings, ShellOutcome, ShellVerifier};
use serde_json::json;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Path to the fixture profile relative to the workspace root
const FIXTURE_PATH: &str = "testing/fixtures/orchestra.yaml";

fn fixture_path() -> std::path::PathBuf {
    let manifest_dir = std::env::var("CARGO_MANIFEST_DIR").unwrap();
    let workspace_root = std::path::Path::new(&manifest_dir).parent().unwrap().parent().unwrap();
    workspace_root.join(FIXTURE_PATH)
}

fn config() -> OrchestraConfig {
    OrchestraConfig::load(fixture_path()).unwrap()
}

fn orchestra() -> Orchestra {
    orchestra_core::logging::init();
    Orchestra::from_config(config()).unwrap()
}

fn code_prompt(id: &str) -> ConvertedPrompt {
    let mut prompt = ConvertedPrompt::new(id).with_category("code");
    prompt.user_message_template = "Review {{file}} for issues.".to_string();
    prompt
}

fn writing_prompt() -> ConvertedPrompt {
    let mut prompt = ConvertedPrompt::new("draft_docs").with_category("writing");
    prompt.user_message_template = "Write docs for {{topic}}.".to_string();
    prompt
}

fn two_step_chain() -> ParsedCommand {
    let mut first = ChainStep::new(1, code_prompt("analyze"));
    first.args.insert("file".to_string(), json!("src/lib.rs"));
    let mut second = ChainStep::new(2, code_prompt("refactor"));
    second.args.insert("file".to_string(), json!("src/main.rs"));
    ParsedCommand::chain(vec![first, second])
}

fn chain_request(chain_id: &str) -> ExecutionRequest {
    ExecutionRequest::new("analyze --> refactor").with_chain_id(chain_id)
}

/// Verifier returning queued exit codes
struct ScriptedVerifier {
    exit_codes: Mutex<VecDeque<i32>>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedVerifier {
    fn new(exit_codes: &[i32]) -> Self {
        Self {
            exit_codes: Mutex::new(exit_codes.iter().copied().collect()),
            calls: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl ShellVerifier for ScriptedVerifier {
    async fn verify(&self, spec: &ShellVerifySpec) -> Result<ShellOutcome> {
        self.calls.lock().await.push(spec.command.clone());
        let exit_code = self.exit_codes.lock().await.pop_front().unwrap_or(0);
        Ok(ShellOutcome {
            exit_code,
            output: format!("{} finished", spec.command),
            duration_ms: 1,
        })
    }
}

// =============================================================================
// Single prompts
// =============================================================================

#[test]
fn test_fixture_loads() {
    let config = config();
    assert_eq!(config.name, "fixture@1.0");
    assert_eq!(config.enforcement.retry_budget, 1);
    assert_eq!(config.gates.len(), 4);
    assert_eq!(config.sessions, SessionSettings::Memory);
}

#[tokio::test]
async fn test_single_prompt_gets_guidance_without_session() {
    let orchestra = orchestra();
    let mut parsed = ParsedCommand::single(writing_prompt());
    parsed.prompt_args.insert("topic".to_string(), json!("the planner"));

    let (response, report) = orchestra
        .execute(ExecutionRequest::new(">>draft_docs topic=\"the planner\""), parsed)
        .await
        .unwrap();

    assert!(response.success);
    assert_eq!(report.pipeline_id, "planning→framework→session→gate-review→response");
    assert!(response.content.starts_with("Apply the C.A.G.E.E.R.F methodology to draft_docs."));
    assert!(response.content.contains("Write docs for the planner."));
    assert!(response.content.contains("- clarity: Short sentences"));
    assert!(!response.content.contains("GATE_REVIEW"));
    assert_eq!(response.gates, vec!["clarity".to_string()]);
    assert_eq!(response.session_outcome, None);
    assert_eq!(response.session_id, None);

    let session_proof = report.proofs.iter().find(|p| p.id == "session.v1").unwrap();
    assert!(matches!(session_proof.outcome, StageOutcome::Skipped(_)));
    let planning_proof = report.proofs.iter().find(|p| p.id == "planning.v1").unwrap();
    assert!(planning_proof.plan_before.is_none());
    assert!(planning_proof.plan_changed());
}

#[tokio::test]
async fn test_clean_modifier_strips_framework_and_gates() {
    let orchestra = orchestra();
    let parsed = ParsedCommand::single(writing_prompt()).with_modifiers(Modifiers::only(Modifier::Clean));

    let (response, report) = orchestra.execute(ExecutionRequest::new("%clean >>draft_docs"), parsed).await.unwrap();

    assert!(response.success);
    assert!(response.gates.is_empty());
    assert!(!response.content.contains("C.A.G.E.E.R.F"));
    assert!(!response.content.contains("Quality Gates"));
    let framework_proof = report.proofs.iter().find(|p| p.id == "framework.v1").unwrap();
    assert!(matches!(framework_proof.outcome, StageOutcome::Skipped(_)));
}

#[tokio::test]
async fn test_modifier_token_in_command_text() {
    let orchestra = orchestra();

    let (response, _) = orchestra
        .execute(ExecutionRequest::new("%lean >>draft_docs"), ParsedCommand::single(writing_prompt()))
        .await
        .unwrap();

    assert!(!response.content.contains("C.A.G.E.E.R.F"));
    assert_eq!(response.gates, vec!["clarity".to_string()]);
}

#[tokio::test]
async fn test_framework_operator_overrides_active_framework() {
    let orchestra = orchestra();
    let parsed = ParsedCommand::single(writing_prompt()).with_operator(SymbolicOperator::Framework {
        framework_id: "react".to_string(),
    });

    let (response, _) = orchestra.execute(ExecutionRequest::new("@react >>draft_docs"), parsed).await.unwrap();

    assert!(response.content.starts_with("Reason and act with ReACT on draft_docs."));
}

#[tokio::test]
async fn test_unknown_client_framework_degrades() {
    let orchestra = orchestra();
    let request = ExecutionRequest::new(">>draft_docs").with_options(RequestOptions {
        framework: Some("unknown".to_string()),
        ..Default::default()
    });

    let (response, _) = orchestra
        .execute(request, ParsedCommand::single(writing_prompt()))
        .await
        .unwrap();

    assert!(response.success);
    assert!(!response.content.contains("Apply the"));
    assert!(response
        .diagnostics
        .iter()
        .any(|d| d.level == DiagnosticLevel::Warning && d.source == "framework.v1" && d.message.contains("UNKNOWN")));
}

// =============================================================================
// Chains
// =============================================================================

#[tokio::test]
async fn test_chain_advances_on_passing_verdicts() {
    let orchestra = orchestra();

    let (first, _) = orchestra.execute(chain_request("c1"), two_step_chain()).await.unwrap();
    assert_eq!(first.session_outcome, Some(SessionOutcome::AwaitingReview));
    assert!(first.content.contains("Review src/lib.rs for issues."));
    assert!(first.content.contains("## Quality Gates (code-quality, security)"));
    assert!(first.content.contains("- security: No secrets in output"));
    assert!(first.content.contains("[c1] 1/2 | Gate: code-quality, security"));
    assert_eq!(first.session_id.as_deref(), Some("c1"));

    let (second, _) = orchestra
        .execute(chain_request("c1").with_gate_verdict("GATE_REVIEW: PASS - clean diff"), two_step_chain())
        .await
        .unwrap();
    assert_eq!(second.session_outcome, Some(SessionOutcome::AwaitingReview));
    assert!(second.content.contains("Review src/main.rs for issues."));
    assert!(second.content.contains("[c1] 2/2"));

    let (third, _) = orchestra
        .execute(chain_request("c1").with_gate_verdict("GATE_REVIEW: PASS - done"), two_step_chain())
        .await
        .unwrap();
    assert_eq!(third.session_outcome, Some(SessionOutcome::Complete));
    assert_eq!(third.content, "Chain complete: 2/2 steps finished.");

    let stored = orchestra.services().store.load("c1").await.unwrap().unwrap();
    assert!(stored.is_terminal());
}

#[tokio::test]
async fn test_gate_operator_session_resumes_by_returned_id() {
    let orchestra = orchestra();
    let parsed = || {
        let mut prompt = code_prompt("analyze");
        prompt.user_message_template = "Review the module.".to_string();
        ParsedCommand::single(prompt).with_operator(SymbolicOperator::Gate {
            criteria: "cite sources".to_string(),
            gate_id: None,
        })
    };

    let (first, _) = orchestra
        .execute(ExecutionRequest::new(">>analyze :: cite sources"), parsed())
        .await
        .unwrap();
    assert_eq!(first.session_outcome, Some(SessionOutcome::AwaitingReview));
    let session_id = first.session_id.clone().unwrap();
    assert!(session_id.starts_with("chain-"));
    assert!(first.content.contains(&format!("[{}] 1/1 | Gate: ", session_id)));

    let (second, _) = orchestra
        .execute(
            ExecutionRequest::new(">>analyze :: cite sources")
                .with_session_id(session_id.as_str())
                .with_gate_verdict("GATE_REVIEW: PASS - cited"),
            parsed(),
        )
        .await
        .unwrap();
    assert_eq!(second.session_outcome, Some(SessionOutcome::Complete));
    assert_eq!(second.session_id.as_deref(), Some(session_id.as_str()));

    let stored = orchestra.services().store.load(&session_id).await.unwrap().unwrap();
    assert!(stored.is_terminal());
}

#[tokio::test]
async fn test_rejections_retry_then_block() {
    let orchestra = orchestra();
    orchestra.execute(chain_request("c2"), two_step_chain()).await.unwrap();

    let (retry, _) = orchestra
        .execute(chain_request("c2").with_gate_verdict("GATE_REVIEW: FAIL - missing tests"), two_step_chain())
        .await
        .unwrap();
    assert_eq!(retry.session_outcome, Some(SessionOutcome::Retry));
    assert!(retry.content.contains("Review src/lib.rs for issues."));
    assert!(retry.content.contains("[Retry] Previous attempt rejected: missing tests"));

    let (blocked, _) = orchestra
        .execute(chain_request("c2").with_gate_verdict("GATE_REVIEW: FAIL - still missing"), two_step_chain())
        .await
        .unwrap();
    assert!(blocked.success);
    assert_eq!(blocked.session_outcome, Some(SessionOutcome::Blocked));
    assert!(blocked.content.starts_with("Chain blocked at step 1"));
    assert!(blocked.content.contains("code-quality"));

    // A blocked chain starts over on the next call
    let (restarted, _) = orchestra.execute(chain_request("c2"), two_step_chain()).await.unwrap();
    assert_eq!(restarted.session_outcome, Some(SessionOutcome::AwaitingReview));
    assert!(restarted.content.contains("[c2] 1/2"));
}

#[tokio::test]
async fn test_advisory_failure_still_advances() {
    let orchestra = orchestra();
    let advisory = || {
        chain_request("c3").with_options(RequestOptions {
            enforcement_mode: Some(EnforcementMode::Advisory),
            ..Default::default()
        })
    };
    orchestra.execute(advisory(), two_step_chain()).await.unwrap();

    let (response, _) = orchestra
        .execute(advisory().with_gate_verdict("GATE_REVIEW: FAIL - style nits"), two_step_chain())
        .await
        .unwrap();
    assert_eq!(response.session_outcome, Some(SessionOutcome::AwaitingReview));
    assert!(response.content.contains("[c3] 2/2"));

    let stored = orchestra.services().store.load("c3").await.unwrap().unwrap();
    assert_eq!(stored.previous_step_result, Some(orchestra_core::StepResult::Failure));
}

#[tokio::test]
async fn test_unrecognized_verdict_keeps_waiting() {
    let orchestra = orchestra();
    orchestra.execute(chain_request("c4"), two_step_chain()).await.unwrap();

    let (response, _) = orchestra
        .execute(chain_request("c4").with_gate_verdict("looks fine to me"), two_step_chain())
        .await
        .unwrap();
    assert_eq!(response.session_outcome, Some(SessionOutcome::AwaitingReview));
    assert!(response.content.contains("[c4] 1/2"));
    assert!(response
        .diagnostics
        .iter()
        .any(|d| d.source == "gate-review.v1" && d.message.contains("not recognized")));
}

#[tokio::test]
async fn test_unresolved_step_fails_request() {
    let orchestra = orchestra();
    let parsed = ParsedCommand::chain(vec![
        ChainStep::new(1, code_prompt("analyze")),
        ChainStep::unresolved(2, "missing_prompt"),
    ]);

    let (response, report) = orchestra.execute(chain_request("c5"), parsed).await.unwrap();

    assert!(!response.success);
    let error = response.error.unwrap();
    assert!(error.starts_with("PLAN/"));
    assert!(error.contains("missing_prompt"));
    assert_eq!(report.failure().unwrap().id, "planning.v1");
    assert_eq!(report.proofs.len(), 1);
}

#[tokio::test]
async fn test_force_restart_discards_progress() {
    let orchestra = orchestra();
    orchestra.execute(chain_request("c6"), two_step_chain()).await.unwrap();
    orchestra
        .execute(chain_request("c6").with_gate_verdict("GATE_REVIEW: PASS - ok"), two_step_chain())
        .await
        .unwrap();

    let restart = chain_request("c6").with_options(RequestOptions {
        force_restart: true,
        ..Default::default()
    });
    let (response, _) = orchestra.execute(restart, two_step_chain()).await.unwrap();
    assert!(response.content.contains("[c6] 1/2"));
}

// =============================================================================
// Shell verification and persistence
// =============================================================================

#[tokio::test]
async fn test_shell_verification_retries_until_exit_zero() {
    let verifier = Arc::new(ScriptedVerifier::new(&[1, 0]));
    let services = OrchestraServices::from_config(config()).unwrap().with_verifier(verifier.clone());
    let orchestra = Orchestra::new(services).unwrap();

    let mut prompt = ConvertedPrompt::new("run_checks").with_category("ops");
    prompt.user_message_template = "Make the test suite pass.".to_string();
    let parsed = || {
        ParsedCommand::single(prompt.clone())
            .with_named_gate(NamedInlineGate::new("tests", vec!["suite is green".to_string()]).with_shell_verify(
                ShellVerifySpec {
                    command: "cargo test".to_string(),
                    timeout_secs: Some(60),
                    working_dir: None,
                },
            ))
            .with_operator(SymbolicOperator::Gate {
                criteria: "suite is green".to_string(),
                gate_id: Some("tests".to_string()),
            })
    };
    let request = || ExecutionRequest::new(">>run_checks :: tests").with_session_id("shell-1");

    let (first, _) = orchestra.execute(request(), parsed()).await.unwrap();
    assert_eq!(first.session_outcome, Some(SessionOutcome::AwaitingReview));
    assert!(first.content.contains("Verify: 1/5"));
    assert!(first.content.contains("Shell verify: `cargo test`"));

    let (second, _) = orchestra.execute(request(), parsed()).await.unwrap();
    assert_eq!(second.session_outcome, Some(SessionOutcome::Retry));
    assert!(second.content.contains("Verify: 2/5"));

    let (third, _) = orchestra.execute(request(), parsed()).await.unwrap();
    assert_eq!(third.session_outcome, Some(SessionOutcome::Complete));
    assert_eq!(verifier.calls.lock().await.as_slice(), ["cargo test", "cargo test"]);
}

#[tokio::test]
async fn test_file_sessions_survive_restart() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = config();
    config.sessions = SessionSettings::File {
        dir: dir.path().to_path_buf(),
    };

    let first = Orchestra::from_config(config.clone()).unwrap();
    first.execute(chain_request("persisted"), two_step_chain()).await.unwrap();
    drop(first);

    let second = Orchestra::from_config(config).unwrap();
    let (response, _) = second
        .execute(chain_request("persisted").with_gate_verdict("GATE_REVIEW: PASS - ok"), two_step_chain())
        .await
        .unwrap();
    assert!(response.content.contains("[persisted] 2/2"));
    assert!(dir.path().join("persisted.json").exists());
}
