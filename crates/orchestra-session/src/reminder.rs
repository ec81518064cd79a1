//! Chain status reminders shown to the model between calls
use orchestra_core::SessionContext;
use serde::{Deserialize, Serialize};

/// Name of the tool the model calls to continue a chain
pub const CONTINUE_TOOL: &str = "prompt_engine";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReminderMode {
    /// Status line plus next action
    Inline,
    /// One line per concern, kept across context compaction
    Full,
}

/// Format the chain reminder. Empty when there is nothing to remind.
pub fn format_reminder(session: &SessionContext, mode: ReminderMode) -> String {
    match mode {
        ReminderMode::Inline => inline(session),
        ReminderMode::Full => full(session),
    }
}

fn gate_label(session: &SessionContext) -> Option<String> {
    session
        .pending_review
        .as_ref()
        .filter(|r| r.shell_verify.is_none())
        .map(|r| r.gate_ids.join(", "))
}

fn inline(session: &SessionContext) -> String {
    let step = session.current_step;
    let total = session.total_steps;
    let chain_id = session.chain_id.as_deref().filter(|id| !id.is_empty());
    let verify = session
        .pending_review
        .as_ref()
        .and_then(|r| r.shell_verify.as_deref().map(|cmd| (cmd, r.attempt, r.max_attempts)));
    let gate = gate_label(session);

    let mut parts = Vec::new();
    if step > 0 {
        parts.push(format!("[{}] {}/{}", chain_id.unwrap_or(&session.session_id), step, total));
    }
    if let Some(gate) = &gate {
        parts.push(format!("Gate: {}", gate));
    }
    if let Some((_, attempt, max)) = verify {
        parts.push(format!("Verify: {}/{}", attempt, max));
    }
    if parts.is_empty() {
        return String::new();
    }

    let action = if let Some((cmd, _, _)) = verify {
        format!("→ Shell verify: `{}` will validate", cmd)
    } else if gate.is_some() {
        "→ GATE_REVIEW: PASS|FAIL - <reason>".to_string()
    } else if step > 0 && step < total {
        match chain_id {
            Some(id) => format!("→ {}(chain_id:\"{}\") to continue", CONTINUE_TOOL, id),
            None => format!("→ {}(session_id:\"{}\") to continue", CONTINUE_TOOL, session.session_id),
        }
    } else {
        String::new()
    };

    format!("{}\n{}", parts.join(" | "), action).trim().to_string()
}

fn full(session: &SessionContext) -> String {
    let mut lines = Vec::new();
    let step = session.current_step;
    if step > 0 {
        let id = session.chain_id.as_deref().filter(|id| !id.is_empty()).unwrap_or(&session.session_id);
        lines.push(format!("[Chain] {} - Step {}/{}", id, step, session.total_steps));
    }
    if let Some(gate) = gate_label(session) {
        lines.push(format!("[Gate] {} - Respond: GATE_REVIEW: PASS|FAIL - <reason>", gate));
    }
    if let Some(review) = session.pending_review.as_ref() {
        if let Some(cmd) = review.shell_verify.as_deref() {
            lines.push(format!("[Verify] `{}` - Attempt {}/{}", cmd, review.attempt, review.max_attempts));
            lines.push(format!("Run implementation, then {} validates with shell command", CONTINUE_TOOL));
        }
        if let Some(rationale) = review.last_rationale.as_deref() {
            lines.push(format!("[Retry] Previous attempt rejected: {}", rationale));
        }
    }
    lines.join("\n")
}
