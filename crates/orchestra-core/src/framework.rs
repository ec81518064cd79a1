//! Framework Decision Authority
//!
//! The framework (methodology) choice is made once per request and cached,
//! so guidance injection and gate filtering never disagree.
use crate::modifiers::{Modifier, Modifiers};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Criteria for the framework decision
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameworkDecisionInput {
    #[serde(default)]
    pub modifiers: Option<Modifiers>,
    /// `@FRAMEWORK` operator on the command
    #[serde(default)]
    pub operator_override: Option<String>,
    /// Framework requested through the request options
    #[serde(default)]
    pub client_override: Option<String>,
    /// Framework currently active on the server
    #[serde(default)]
    pub active_framework: Option<String>,
    /// Server-level framework support
    #[serde(default)]
    pub framework_enabled: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionSource {
    Modifier,
    OperatorOverride,
    ClientOverride,
    ActiveFramework,
    Disabled,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameworkDecision {
    pub should_apply: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub framework_id: Option<String>,
    pub source: DecisionSource,
    pub reason: String,
    pub decided_at: DateTime<Utc>,
}

impl FrameworkDecision {
    fn apply(framework_id: &str, source: DecisionSource, reason: &str) -> Self {
        Self {
            should_apply: true,
            framework_id: Some(normalize_framework_id(framework_id)),
            source,
            reason: reason.to_string(),
            decided_at: Utc::now(),
        }
    }

    fn skip(source: DecisionSource, reason: &str) -> Self {
        Self {
            should_apply: false,
            framework_id: None,
            source,
            reason: reason.to_string(),
            decided_at: Utc::now(),
        }
    }
}

/// Framework IDs compare case-insensitively (`@cageerf` == `CAGEERF`)
pub fn normalize_framework_id(id: &str) -> String {
    id.trim().to_ascii_uppercase()
}

#[derive(Debug, Clone, Default)]
pub struct FrameworkDecisionAuthority {
    decision: Option<FrameworkDecision>,
}

impl FrameworkDecisionAuthority {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decide on first call; later calls return the cached decision and
    /// ignore `input`.
    pub fn decide(&mut self, input: &FrameworkDecisionInput) -> &FrameworkDecision {
        if let Some(existing) = &self.decision {
            debug!(framework = ?existing.framework_id, "framework decision cached");
        }
        self.decision.get_or_insert_with(|| {
            let decision = evaluate(input);
            debug!(
                should_apply = decision.should_apply,
                framework = ?decision.framework_id,
                source = ?decision.source,
                "framework decision made"
            );
            decision
        })
    }

    pub fn decision(&self) -> Option<&FrameworkDecision> {
        self.decision.as_ref()
    }

    pub fn has_decided(&self) -> bool {
        self.decision.is_some()
    }

    /// Selected framework, if the decision applies one
    pub fn framework_id(&self) -> Option<&str> {
        self.decision
            .as_ref()
            .filter(|d| d.should_apply)
            .and_then(|d| d.framework_id.as_deref())
    }
}

fn evaluate(input: &FrameworkDecisionInput) -> FrameworkDecision {
    let modifier = input.modifiers.and_then(|m| m.normalize().authoritative);

    match modifier {
        Some(Modifier::Clean) => return FrameworkDecision::skip(DecisionSource::Modifier, "%clean disables frameworks"),
        Some(Modifier::Lean) => return FrameworkDecision::skip(DecisionSource::Modifier, "%lean disables frameworks"),
        _ => {}
    }

    if let Some(id) = input.operator_override.as_deref().filter(|id| !id.trim().is_empty()) {
        return FrameworkDecision::apply(id, DecisionSource::OperatorOverride, "framework operator");
    }
    if let Some(id) = input.client_override.as_deref().filter(|id| !id.trim().is_empty()) {
        return FrameworkDecision::apply(id, DecisionSource::ClientOverride, "client override");
    }

    let forced = matches!(modifier, Some(Modifier::Judge) | Some(Modifier::Framework));
    if input.framework_enabled || forced {
        return match input.active_framework.as_deref() {
            Some(id) => FrameworkDecision::apply(
                id,
                if forced { DecisionSource::Modifier } else { DecisionSource::ActiveFramework },
                "active framework",
            ),
            None => FrameworkDecision::skip(DecisionSource::Disabled, "no active framework"),
        };
    }

    FrameworkDecision::skip(DecisionSource::Disabled, "framework support disabled")
}
