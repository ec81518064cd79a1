//! Execution plans produced by the planner
use crate::data_model::SemanticAnalysis;
use crate::modifiers::Modifiers;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStrategy {
    Single,
    Chain,
}

impl fmt::Display for ExecutionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ExecutionStrategy::Single => write!(f, "single"),
            ExecutionStrategy::Chain => write!(f, "chain"),
        }
    }
}

/// How a command will execute. Plans are never mutated after creation;
/// re-planning produces a new value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionPlan {
    strategy: ExecutionStrategy,
    gates: BTreeSet<String>,
    requires_framework: bool,
    requires_session: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    modifiers: Option<Modifiers>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    semantic_analysis: Option<SemanticAnalysis>,
}

/// Field values for building an [`ExecutionPlan`]
#[derive(Debug, Clone, PartialEq)]
pub struct PlanParts {
    pub strategy: ExecutionStrategy,
    pub gates: BTreeSet<String>,
    pub requires_framework: bool,
    pub requires_session: bool,
    pub category: Option<String>,
    pub modifiers: Option<Modifiers>,
    pub semantic_analysis: Option<SemanticAnalysis>,
}

impl From<PlanParts> for ExecutionPlan {
    fn from(parts: PlanParts) -> Self {
        Self {
            strategy: parts.strategy,
            gates: parts.gates,
            requires_framework: parts.requires_framework,
            requires_session: parts.requires_session,
            category: parts.category,
            modifiers: parts.modifiers,
            semantic_analysis: parts.semantic_analysis,
        }
    }
}

impl ExecutionPlan {
    pub fn strategy(&self) -> ExecutionStrategy {
        self.strategy
    }

    pub fn gates(&self) -> &BTreeSet<String> {
        &self.gates
    }

    pub fn requires_framework(&self) -> bool {
        self.requires_framework
    }

    pub fn requires_session(&self) -> bool {
        self.requires_session
    }

    pub fn category(&self) -> Option<&str> {
        self.category.as_deref()
    }

    pub fn modifiers(&self) -> Option<&Modifiers> {
        self.modifiers.as_ref()
    }

    pub fn semantic_analysis(&self) -> Option<&SemanticAnalysis> {
        self.semantic_analysis.as_ref()
    }

    pub fn is_chain(&self) -> bool {
        self.strategy == ExecutionStrategy::Chain
    }

    /// Copy the fields out, for building a derived plan
    pub fn to_parts(&self) -> PlanParts {
        PlanParts {
            strategy: self.strategy,
            gates: self.gates.clone(),
            requires_framework: self.requires_framework,
            requires_session: self.requires_session,
            category: self.category.clone(),
            modifiers: self.modifiers,
            semantic_analysis: self.semantic_analysis.clone(),
        }
    }

    /// BLAKE3 digest of the plan's canonical JSON form
    pub fn fingerprint(&self) -> String {
        let bytes = serde_json::to_vec(self).unwrap_or_default();
        format!("blake3:{}", blake3::hash(&bytes))
    }
}

/// Plan for one step of a chain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepPlan {
    pub step_number: u32,
    pub prompt_id: String,
    pub plan: ExecutionPlan,
}

/// Chain-level plan plus one linked plan per step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainPlan {
    pub chain_plan: ExecutionPlan,
    pub step_plans: Vec<StepPlan>,
}

impl ChainPlan {
    pub fn total_steps(&self) -> usize {
        self.step_plans.len()
    }

    pub fn step(&self, step_number: u32) -> Option<&StepPlan> {
        self.step_plans.iter().find(|s| s.step_number == step_number)
    }
}
