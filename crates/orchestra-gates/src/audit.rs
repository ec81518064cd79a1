//! Gate audit trail
//!
//! Records every enforcement decision for debugging and post-hoc review.

use crate::authority::{GateStatus, GateTransition};
use crate::mode::EnforcementMode;
use crate::verdict::VerdictKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An audit log entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateAuditEntry {
    /// Unique entry ID
    pub id: String,

    pub timestamp: DateTime<Utc>,

    /// Type of audit event
    pub event_type: GateAuditEventType,

    /// Session the decision belongs to
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,

    /// Gate the decision concerns
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gate_id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub from: Option<GateStatus>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub to: Option<GateStatus>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub verdict: Option<VerdictKind>,

    /// Human-readable detail
    pub detail: String,
}

impl GateAuditEntry {
    /// Create an entry for a gate transition
    pub fn from_transition(transition: &GateTransition, session_id: Option<&str>) -> Self {
        let event_type = match transition.to {
            GateStatus::Blocked => GateAuditEventType::Blocked,
            _ if transition.verdict.is_some() => GateAuditEventType::VerdictApplied,
            _ => GateAuditEventType::RetryRecorded,
        };
        Self {
            id: generate_audit_id(),
            timestamp: transition.at,
            event_type,
            session_id: session_id.map(str::to_string),
            gate_id: Some(transition.gate_id.clone()),
            from: Some(transition.from),
            to: Some(transition.to),
            verdict: transition.verdict,
            detail: format!(
                "{} -> {} (retries {}/{})",
                transition.from, transition.to, transition.retry_count, transition.retry_budget
            ),
        }
    }

    /// Create an entry for a resolved enforcement mode
    pub fn mode_resolved(mode: EnforcementMode, reason: impl Into<String>, session_id: Option<&str>) -> Self {
        Self {
            id: generate_audit_id(),
            timestamp: Utc::now(),
            event_type: GateAuditEventType::ModeResolved,
            session_id: session_id.map(str::to_string),
            gate_id: None,
            from: None,
            to: None,
            verdict: None,
            detail: format!("{} ({})", mode, reason.into()),
        }
    }
}

/// Type of audit event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateAuditEventType {
    ModeResolved,
    VerdictApplied,
    RetryRecorded,
    Blocked,
}

/// Audit log collector
#[derive(Debug, Clone)]
pub struct GateAuditLog {
    entries: Vec<GateAuditEntry>,
    max_entries: usize,
}

impl GateAuditLog {
    /// Create a new audit log
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            max_entries: 1000,
        }
    }

    /// Create with a custom max size
    pub fn with_max_entries(max: usize) -> Self {
        Self {
            entries: Vec::new(),
            max_entries: max,
        }
    }

    /// Log an entry
    pub fn log(&mut self, entry: GateAuditEntry) {
        self.entries.push(entry);

        if self.entries.len() > self.max_entries {
            let drain_count = self.entries.len() - self.max_entries;
            self.entries.drain(0..drain_count);
        }
    }

    /// Get all entries
    pub fn entries(&self) -> &[GateAuditEntry] {
        &self.entries
    }

    /// Get entries for a specific gate
    pub fn entries_for_gate(&self, gate_id: &str) -> Vec<&GateAuditEntry> {
        self.entries
            .iter()
            .filter(|e| e.gate_id.as_deref() == Some(gate_id))
            .collect()
    }

    /// Get blocked entries
    pub fn blocked_entries(&self) -> Vec<&GateAuditEntry> {
        self.entries
            .iter()
            .filter(|e| e.event_type == GateAuditEventType::Blocked)
            .collect()
    }

    /// Clear all entries
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Export to JSON Lines
    pub fn to_jsonl(&self) -> String {
        self.entries
            .iter()
            .filter_map(|e| serde_json::to_string(e).ok())
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Get statistics
    pub fn stats(&self) -> GateAuditStats {
        let verdicts: Vec<&GateAuditEntry> = self.entries.iter().filter(|e| e.verdict.is_some()).collect();
        let passes = verdicts.iter().filter(|e| e.verdict == Some(VerdictKind::Pass)).count();
        let failures = verdicts.len() - passes;
        let blocked = self.blocked_entries().len();

        GateAuditStats {
            total: self.entries.len(),
            verdicts: verdicts.len(),
            passes,
            failures,
            blocked,
            block_rate: if verdicts.is_empty() {
                0.0
            } else {
                blocked as f64 / verdicts.len() as f64
            },
        }
    }
}

impl Default for GateAuditLog {
    fn default() -> Self {
        Self::new()
    }
}

/// Statistics about audit entries
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateAuditStats {
    pub total: usize,
    pub verdicts: usize,
    pub passes: usize,
    pub failures: usize,
    pub blocked: usize,
    pub block_rate: f64,
}

fn generate_audit_id() -> String {
    use std::sync::atomic::{AtomicU64, Ordering};
    static COUNTER: AtomicU64 = AtomicU64::new(0);

    let timestamp = Utc::now().timestamp_millis();
    let counter = COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("gaud_{:x}_{:04x}", timestamp, counter % 0xFFFF)
}
