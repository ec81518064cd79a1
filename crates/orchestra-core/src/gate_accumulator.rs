//! Gate Accumulator: priority-based deduplication of gate IDs
//!
//! Several stages may propose the same gate. Exactly one entry survives per
//! gate ID: the highest priority one, with ties going to the earliest
//! registration. The outcome does not depend on call order.
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use tracing::debug;

/// Stage that contributed a gate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateSource {
    /// Symbolic `::` operator or named inline gate
    InlineOperator,
    /// Caller-supplied gate overrides
    ClientOverride,
    /// Prompt's own gate configuration
    PromptConfig,
    /// Category-level include list
    CategoryConfig,
    /// Category-derived auto-assignment
    CategoryAutoAssign,
    /// Methodology guidance injection
    Methodology,
}

impl GateSource {
    pub fn default_priority(self) -> u32 {
        match self {
            GateSource::InlineOperator => 100,
            GateSource::ClientOverride => 90,
            GateSource::PromptConfig => 60,
            GateSource::CategoryConfig => 50,
            GateSource::CategoryAutoAssign => 40,
            GateSource::Methodology => 30,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            GateSource::InlineOperator => "inline-operator",
            GateSource::ClientOverride => "client-override",
            GateSource::PromptConfig => "prompt-config",
            GateSource::CategoryConfig => "category-config",
            GateSource::CategoryAutoAssign => "category-auto",
            GateSource::Methodology => "methodology",
        }
    }
}

impl fmt::Display for GateSource {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Surviving contribution for one gate ID
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateEntry {
    pub gate_id: String,
    pub source: GateSource,
    pub priority: u32,
    /// Registration order across the accumulator's lifetime
    pub sequence: u64,
}

#[derive(Debug, Clone, Default)]
pub struct GateAccumulator {
    entries: HashMap<String, GateEntry>,
    next_sequence: u64,
}

impl GateAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Propose a gate. Returns `true` when this contribution now owns the ID.
    pub fn add(&mut self, gate_id: impl Into<String>, source: GateSource, priority: u32) -> bool {
        let gate_id = gate_id.into();
        let sequence = self.next_sequence;
        self.next_sequence += 1;

        if let Some(existing) = self.entries.get(&gate_id) {
            if priority <= existing.priority {
                debug!(
                    gate_id = %gate_id,
                    kept = %existing.source,
                    rejected = %source,
                    "gate contribution ignored"
                );
                return false;
            }
        }

        self.entries.insert(
            gate_id.clone(),
            GateEntry {
                gate_id,
                source,
                priority,
                sequence,
            },
        );
        true
    }

    /// Propose a gate at its source's default priority
    pub fn add_default(&mut self, gate_id: impl Into<String>, source: GateSource) -> bool {
        self.add(gate_id, source, source.default_priority())
    }

    /// Re-apply entries from another accumulator, keeping their priorities
    pub fn merge<'a>(&mut self, entries: impl IntoIterator<Item = &'a GateEntry>) {
        for entry in entries {
            self.add(entry.gate_id.clone(), entry.source, entry.priority);
        }
    }

    /// Current set of gate IDs
    pub fn snapshot(&self) -> BTreeSet<String> {
        self.entries.keys().cloned().collect()
    }

    pub fn entry(&self, gate_id: &str) -> Option<&GateEntry> {
        self.entries.get(gate_id)
    }

    /// Surviving entries in registration order
    pub fn entries(&self) -> Vec<&GateEntry> {
        let mut entries: Vec<&GateEntry> = self.entries.values().collect();
        entries.sort_by_key(|e| e.sequence);
        entries
    }

    pub fn contains(&self, gate_id: &str) -> bool {
        self.entries.contains_key(gate_id)
    }

    pub fn remove(&mut self, gate_id: &str) -> Option<GateEntry> {
        self.entries.remove(gate_id)
    }

    pub fn retain(&mut self, mut keep: impl FnMut(&GateEntry) -> bool) {
        self.entries.retain(|_, entry| keep(entry));
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_higher_priority_wins() {
        let mut acc = GateAccumulator::new();
        assert!(acc.add("x", GateSource::CategoryAutoAssign, 1));
        assert!(acc.add("x", GateSource::InlineOperator, 5));

        assert_eq!(acc.entry("x").unwrap().source, GateSource::InlineOperator);
        assert_eq!(acc.len(), 1);
    }

    #[test]
    fn test_order_independent() {
        let mut acc = GateAccumulator::new();
        acc.add("x", GateSource::InlineOperator, 5);
        assert!(!acc.add("x", GateSource::CategoryAutoAssign, 1));

        assert_eq!(acc.entry("x").unwrap().source, GateSource::InlineOperator);
    }

    #[test]
    fn test_tie_goes_to_first_registration() {
        let mut acc = GateAccumulator::new();
        acc.add("x", GateSource::PromptConfig, 10);
        acc.add("x", GateSource::ClientOverride, 10);

        let entry = acc.entry("x").unwrap();
        assert_eq!(entry.source, GateSource::PromptConfig);
        assert_eq!(entry.sequence, 0);
    }

    #[test]
    fn test_snapshot_and_retain() {
        let mut acc = GateAccumulator::new();
        acc.add_default("b", GateSource::PromptConfig);
        acc.add_default("a", GateSource::Methodology);
        acc.add_default("c", GateSource::CategoryAutoAssign);

        acc.retain(|e| e.source != GateSource::Methodology);
        let snapshot: Vec<String> = acc.snapshot().into_iter().collect();
        assert_eq!(snapshot, vec!["b".to_string(), "c".to_string()]);
    }

    #[test]
    fn test_entries_in_registration_order() {
        let mut acc = GateAccumulator::new();
        acc.add_default("z", GateSource::PromptConfig);
        acc.add_default("a", GateSource::PromptConfig);
        let ids: Vec<&str> = acc.entries().iter().map(|e| e.gate_id.as_str()).collect();
        assert_eq!(ids, vec!["z", "a"]);
    }

    #[test]
    fn test_merge_keeps_priorities() {
        let mut local = GateAccumulator::new();
        local.add("x", GateSource::InlineOperator, 100);

        let mut shared = GateAccumulator::new();
        shared.add("x", GateSource::Methodology, 30);
        shared.merge(local.entries());

        assert_eq!(shared.entry("x").unwrap().source, GateSource::InlineOperator);
    }
}
