//! Gate enforcement authority
//!
//! Tracks the per-gate review state of one chain session:
//!
//! ```text
//! pending ──PASS──▶ satisfied
//!    │
//!    └──FAIL──▶ retrying ──FAIL (budget exceeded)──▶ blocked
//! ```
//!
//! Under a non-blocking mode a failing verdict moves the gate to `waived`
//! instead of consuming the retry budget.

use crate::audit::{GateAuditEntry, GateAuditLog};
use crate::config::EnforcementConfig;
use crate::mode::{EnforcementInput, EnforcementMode};
use crate::verdict::{parse_verdict, ParsedVerdict, VerdictKind, VerdictSource};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tracing::{debug, info, warn};

/// Review state of a single gate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateStatus {
    /// Awaiting a verdict
    Pending,
    /// Accepted
    Satisfied,
    /// Rejected with retry budget remaining
    Retrying,
    /// Rejected after the retry budget was exhausted
    Blocked,
    /// Rejected under a non-blocking mode
    Waived,
}

impl GateStatus {
    /// Whether no further verdict is expected
    pub fn is_settled(&self) -> bool {
        matches!(self, GateStatus::Satisfied | GateStatus::Blocked | GateStatus::Waived)
    }
}

impl fmt::Display for GateStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            GateStatus::Pending => "pending",
            GateStatus::Satisfied => "satisfied",
            GateStatus::Retrying => "retrying",
            GateStatus::Blocked => "blocked",
            GateStatus::Waived => "waived",
        };
        write!(f, "{}", s)
    }
}

/// Persistent review state of one gate within a session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateTrack {
    pub gate_id: String,
    pub status: GateStatus,
    /// Number of rejected verdicts so far
    pub rejections: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_rationale: Option<String>,
}

impl GateTrack {
    pub fn pending(gate_id: impl Into<String>) -> Self {
        Self {
            gate_id: gate_id.into(),
            status: GateStatus::Pending,
            rejections: 0,
            last_rationale: None,
        }
    }
}

/// State change produced by a mutating call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateTransition {
    pub gate_id: String,
    pub from: GateStatus,
    pub to: GateStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verdict: Option<VerdictKind>,
    pub retry_count: u32,
    pub retry_budget: u32,
    pub at: DateTime<Utc>,
}

impl GateTransition {
    pub fn is_blocked(&self) -> bool {
        self.to == GateStatus::Blocked
    }

    /// Retries left before the gate blocks
    pub fn remaining_retries(&self) -> u32 {
        self.retry_budget.saturating_sub(self.retry_count)
    }
}

/// Decides enforcement mode and tracks verdicts and retries for one session
#[derive(Debug, Clone)]
pub struct GateEnforcementAuthority {
    session_id: Option<String>,
    config: EnforcementConfig,
    mode: Option<EnforcementMode>,
    tracks: BTreeMap<String, GateTrack>,
    audit: GateAuditLog,
}

impl GateEnforcementAuthority {
    /// Create an authority with no session binding
    pub fn new(config: EnforcementConfig) -> Self {
        Self {
            session_id: None,
            config,
            mode: None,
            tracks: BTreeMap::new(),
            audit: GateAuditLog::new(),
        }
    }

    /// Create an authority bound to a chain session
    pub fn for_session(session_id: impl Into<String>, config: EnforcementConfig) -> Self {
        let mut authority = Self::new(config);
        authority.session_id = Some(session_id.into());
        authority
    }

    /// Restore previously persisted gate tracks
    pub fn with_tracks(mut self, tracks: impl IntoIterator<Item = GateTrack>) -> Self {
        for track in tracks {
            self.tracks.insert(track.gate_id.clone(), track);
        }
        self
    }

    pub fn config(&self) -> &EnforcementConfig {
        &self.config
    }

    pub fn retry_budget(&self) -> u32 {
        self.config.retry_budget
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    /// Resolve the enforcement mode for this request.
    ///
    /// Precedence: explicit request mode, then the strictest mode implied by
    /// gate severities, then the configured default.
    pub fn resolve_enforcement_mode(&mut self, input: &EnforcementInput) -> EnforcementMode {
        let (mode, reason) = if let Some(requested) = input.requested_mode {
            (requested, "requested")
        } else if let Some(strictest) = input.gate_severities.iter().map(|s| s.implied_mode()).max() {
            (strictest, "gate severity")
        } else {
            (self.config.default_mode, "configured default")
        };

        debug!(%mode, reason, "resolve_enforcement_mode");
        self.mode = Some(mode);
        self.audit
            .log(GateAuditEntry::mode_resolved(mode, reason, self.session_id.as_deref()));
        mode
    }

    /// Resolved mode, or the configured default before resolution
    pub fn mode(&self) -> EnforcementMode {
        self.mode.unwrap_or(self.config.default_mode)
    }

    /// Parse verdict text
    pub fn parse_verdict(&self, raw: &str, source: VerdictSource) -> Option<ParsedVerdict> {
        let parsed = parse_verdict(raw, source);
        if parsed.is_none() {
            debug!(source = ?source, "parse_verdict: no verdict recognized");
        }
        parsed
    }

    /// Register gates awaiting review. Settled gates are reopened as pending
    /// while the rejection count carries over.
    pub fn begin_review<I, S>(&mut self, gate_ids: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for gate_id in gate_ids {
            let gate_id = gate_id.into();
            let track = self
                .tracks
                .entry(gate_id.clone())
                .or_insert_with(|| GateTrack::pending(gate_id));
            if matches!(track.status, GateStatus::Satisfied | GateStatus::Waived) {
                track.status = GateStatus::Pending;
            }
        }
    }

    pub fn status(&self, gate_id: &str) -> GateStatus {
        self.tracks.get(gate_id).map(|t| t.status).unwrap_or(GateStatus::Pending)
    }

    pub fn retry_count(&self, gate_id: &str) -> u32 {
        self.tracks.get(gate_id).map(|t| t.rejections).unwrap_or(0)
    }

    /// Count a rejection and return the new retry count.
    pub fn record_retry(&mut self, gate_id: &str) -> u32 {
        self.record_rejection(gate_id, None).retry_count
    }

    /// Whether applying `verdict` to `gate_id` would hold the chain
    pub fn should_block(&self, gate_id: &str, verdict: &ParsedVerdict) -> bool {
        if !self.mode().blocks() {
            return false;
        }
        if self.status(gate_id) == GateStatus::Blocked {
            return true;
        }
        match verdict.kind {
            VerdictKind::Pass => false,
            VerdictKind::Fail => self.retry_count(gate_id) + 1 > self.config.retry_budget,
        }
    }

    /// Apply a verdict to a gate and return the resulting transition
    pub fn apply_verdict(&mut self, gate_id: &str, verdict: &ParsedVerdict) -> GateTransition {
        let from = self.status(gate_id);
        if from == GateStatus::Blocked {
            warn!(gate_id, "apply_verdict: gate already blocked");
            return self.transition(gate_id, from, from, Some(verdict.kind));
        }

        let transition = match verdict.kind {
            VerdictKind::Pass => {
                let track = self.track_mut(gate_id);
                track.status = GateStatus::Satisfied;
                track.last_rationale = Some(verdict.rationale.clone());
                self.transition(gate_id, from, GateStatus::Satisfied, Some(VerdictKind::Pass))
            }
            VerdictKind::Fail if !self.mode().blocks() => {
                let track = self.track_mut(gate_id);
                track.status = GateStatus::Waived;
                track.last_rationale = Some(verdict.rationale.clone());
                self.transition(gate_id, from, GateStatus::Waived, Some(VerdictKind::Fail))
            }
            VerdictKind::Fail => self.record_rejection(gate_id, Some(verdict)),
        };

        info!(
            gate_id,
            from = %transition.from,
            to = %transition.to,
            retry_count = transition.retry_count,
            "gate verdict applied"
        );
        transition
    }

    /// Gates currently blocked
    pub fn blocked_gates(&self) -> Vec<&str> {
        self.tracks
            .values()
            .filter(|t| t.status == GateStatus::Blocked)
            .map(|t| t.gate_id.as_str())
            .collect()
    }

    pub fn tracks(&self) -> impl Iterator<Item = &GateTrack> {
        self.tracks.values()
    }

    /// Consume the authority, returning tracks for persistence
    pub fn into_tracks(self) -> Vec<GateTrack> {
        self.tracks.into_values().collect()
    }

    pub fn audit(&self) -> &GateAuditLog {
        &self.audit
    }

    fn record_rejection(&mut self, gate_id: &str, verdict: Option<&ParsedVerdict>) -> GateTransition {
        let budget = self.config.retry_budget;
        let track = self.track_mut(gate_id);
        let from = track.status;
        track.rejections += 1;
        track.status = if from == GateStatus::Blocked || track.rejections > budget {
            GateStatus::Blocked
        } else {
            GateStatus::Retrying
        };
        if let Some(v) = verdict {
            track.last_rationale = Some(v.rationale.clone());
        }
        let to = track.status;

        if to == GateStatus::Blocked {
            warn!(gate_id, budget, "retry budget exhausted");
        }
        self.transition(gate_id, from, to, verdict.map(|v| v.kind))
    }

    fn track_mut(&mut self, gate_id: &str) -> &mut GateTrack {
        self.tracks
            .entry(gate_id.to_string())
            .or_insert_with(|| GateTrack::pending(gate_id))
    }

    fn transition(
        &mut self,
        gate_id: &str,
        from: GateStatus,
        to: GateStatus,
        verdict: Option<VerdictKind>,
    ) -> GateTransition {
        let transition = GateTransition {
            gate_id: gate_id.to_string(),
            from,
            to,
            verdict,
            retry_count: self.retry_count(gate_id),
            retry_budget: self.config.retry_budget,
            at: Utc::now(),
        };
        self.audit
            .log(GateAuditEntry::from_transition(&transition, self.session_id.as_deref()));
        transition
    }
}
