//! Data Model: ParsedCommand, ConvertedPrompt, symbolic operators
use crate::modifiers::Modifiers;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Command shape reported by the parser
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandType {
    Single,
    Chain,
}

/// Prompt-level gate configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptGateConfig {
    #[serde(default)]
    pub include: Vec<String>,
    #[serde(default)]
    pub exclude: Vec<String>,
    /// `Some(false)` removes every methodology-sourced gate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub framework_gates: Option<bool>,
}

/// Chain step declared by a prompt definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeclaredChainStep {
    pub prompt_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_name: Option<String>,
}

/// Prompt definition as supplied by the prompt resolver
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConvertedPrompt {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_message: Option<String>,
    #[serde(default)]
    pub user_message_template: String,
    /// Gates declared directly on the prompt
    #[serde(default)]
    pub gates: Vec<String>,
    /// Gates assigned to the prompt by tooling
    #[serde(default)]
    pub auto_assigned_gates: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gate_configuration: Option<PromptGateConfig>,
    #[serde(default)]
    pub chain_steps: Vec<DeclaredChainStep>,
    #[serde(default)]
    pub script_tools: Vec<String>,
}

impl ConvertedPrompt {
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            ..Self::default()
        }
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_gates<I, S>(mut self, gates: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.gates.extend(gates.into_iter().map(Into::into));
        self
    }

    pub fn with_gate_configuration(mut self, config: PromptGateConfig) -> Self {
        self.gate_configuration = Some(config);
        self
    }

    pub fn with_chain_step(mut self, prompt_id: impl Into<String>) -> Self {
        self.chain_steps.push(DeclaredChainStep {
            prompt_id: prompt_id.into(),
            step_name: None,
        });
        self
    }

    pub fn with_script_tool(mut self, tool_id: impl Into<String>) -> Self {
        self.script_tools.push(tool_id.into());
        self
    }

    pub fn declares_chain(&self) -> bool {
        !self.chain_steps.is_empty()
    }
}

/// Category-level gate lists from the category resolver
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryGateConfig {
    pub category: String,
    #[serde(default)]
    pub include: Vec<String>,
    #[serde(default)]
    pub exclude: Vec<String>,
}

/// Shell command whose exit code decides a gate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShellVerifySpec {
    pub command: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<String>,
}

/// Gate declared inline with an explicit ID (`:: security:"no secrets"`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedInlineGate {
    pub id: String,
    #[serde(default)]
    pub criteria: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shell_verify: Option<ShellVerifySpec>,
}

impl NamedInlineGate {
    pub fn new(id: impl Into<String>, criteria: Vec<String>) -> Self {
        Self {
            id: id.into(),
            criteria,
            shell_verify: None,
        }
    }

    pub fn with_shell_verify(mut self, spec: ShellVerifySpec) -> Self {
        self.shell_verify = Some(spec);
        self
    }
}

/// Symbolic operator found in the command text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SymbolicOperator {
    /// `-->` sequencing
    Chain { steps: usize },
    /// `::` quality gate
    Gate {
        criteria: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        gate_id: Option<String>,
    },
    /// `@FRAMEWORK`
    Framework { framework_id: String },
    /// `#style`
    Style { style_id: String },
    /// `* N`
    Repetition { count: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperatorKind {
    Chain,
    Gate,
    Framework,
    Style,
    Repetition,
}

impl SymbolicOperator {
    pub fn kind(&self) -> OperatorKind {
        match self {
            SymbolicOperator::Chain { .. } => OperatorKind::Chain,
            SymbolicOperator::Gate { .. } => OperatorKind::Gate,
            SymbolicOperator::Framework { .. } => OperatorKind::Framework,
            SymbolicOperator::Style { .. } => OperatorKind::Style,
            SymbolicOperator::Repetition { .. } => OperatorKind::Repetition,
        }
    }

    /// Operators whose effect spans more than one call
    pub fn needs_session(&self) -> bool {
        matches!(self.kind(), OperatorKind::Chain | OperatorKind::Gate)
    }
}

/// One step of a parsed chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainStep {
    pub step_number: u32,
    pub prompt_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub converted_prompt: Option<ConvertedPrompt>,
    #[serde(default)]
    pub args: Map<String, Value>,
    /// Gates added to this step by inline syntax
    #[serde(default)]
    pub inline_gate_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modifiers: Option<Modifiers>,
}

impl ChainStep {
    pub fn new(step_number: u32, prompt: ConvertedPrompt) -> Self {
        Self {
            step_number,
            prompt_id: prompt.id.clone(),
            converted_prompt: Some(prompt),
            args: Map::new(),
            inline_gate_ids: Vec::new(),
            modifiers: None,
        }
    }

    /// Step referencing a prompt the resolver could not supply
    pub fn unresolved(step_number: u32, prompt_id: impl Into<String>) -> Self {
        Self {
            step_number,
            prompt_id: prompt_id.into(),
            converted_prompt: None,
            args: Map::new(),
            inline_gate_ids: Vec::new(),
            modifiers: None,
        }
    }

    pub fn with_inline_gate(mut self, gate_id: impl Into<String>) -> Self {
        self.inline_gate_ids.push(gate_id.into());
        self
    }

    pub fn with_modifiers(mut self, modifiers: Modifiers) -> Self {
        self.modifiers = Some(modifiers);
        self
    }
}

/// Output of the external command parser
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedCommand {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command_type: Option<CommandType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub converted_prompt: Option<ConvertedPrompt>,
    #[serde(default)]
    pub prompt_args: Map<String, Value>,
    /// Anonymous inline criteria (`:: "cite sources"`)
    #[serde(default)]
    pub inline_gate_criteria: Vec<String>,
    #[serde(default)]
    pub named_inline_gates: Vec<NamedInlineGate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chain_id: Option<String>,
    #[serde(default)]
    pub steps: Vec<ChainStep>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modifiers: Option<Modifiers>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style: Option<String>,
    /// Framework requested through `@FRAMEWORK`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub framework_override: Option<String>,
    #[serde(default)]
    pub operators: Vec<SymbolicOperator>,
}

impl ParsedCommand {
    pub fn single(prompt: ConvertedPrompt) -> Self {
        Self {
            command_type: Some(CommandType::Single),
            converted_prompt: Some(prompt),
            ..Self::default()
        }
    }

    pub fn chain(steps: Vec<ChainStep>) -> Self {
        let operators = vec![SymbolicOperator::Chain { steps: steps.len() }];
        Self {
            command_type: Some(CommandType::Chain),
            steps,
            operators,
            ..Self::default()
        }
    }

    pub fn with_modifiers(mut self, modifiers: Modifiers) -> Self {
        self.modifiers = Some(modifiers);
        self
    }

    pub fn with_operator(mut self, operator: SymbolicOperator) -> Self {
        self.operators.push(operator);
        self
    }

    pub fn with_named_gate(mut self, gate: NamedInlineGate) -> Self {
        self.named_inline_gates.push(gate);
        self
    }

    pub fn with_framework_override(mut self, framework_id: impl Into<String>) -> Self {
        self.framework_override = Some(framework_id.into());
        self
    }

    pub fn with_chain_id(mut self, chain_id: impl Into<String>) -> Self {
        self.chain_id = Some(chain_id.into());
        self
    }

    pub fn has_operator(&self, kind: OperatorKind) -> bool {
        self.operators.iter().any(|op| op.kind() == kind)
    }

    /// Framework override from the field or a `@FRAMEWORK` operator
    pub fn effective_framework_override(&self) -> Option<&str> {
        self.framework_override.as_deref().or_else(|| {
            self.operators.iter().find_map(|op| match op {
                SymbolicOperator::Framework { framework_id } => Some(framework_id.as_str()),
                _ => None,
            })
        })
    }

    /// Explicit modifiers, if any flag is set
    pub fn explicit_modifiers(&self) -> Option<Modifiers> {
        self.modifiers.filter(|m| !m.is_empty())
    }
}

/// Gate override supplied by the caller alongside the command
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GateOverride {
    /// Reference to a registered gate
    Id(String),
    /// Ad-hoc gate defined by the caller
    Custom {
        name: String,
        #[serde(default)]
        criteria: Vec<String>,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateOverrides {
    #[serde(default)]
    pub gates: Vec<GateOverride>,
}

impl GateOverrides {
    pub fn ids<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            gates: ids.into_iter().map(|id| GateOverride::Id(id.into())).collect(),
        }
    }

    /// String IDs among the overrides
    pub fn gate_ids(&self) -> impl Iterator<Item = &str> {
        self.gates.iter().filter_map(|g| match g {
            GateOverride::Id(id) => Some(id.as_str()),
            GateOverride::Custom { .. } => None,
        })
    }

    /// True when the caller supplied any gate, string ids included
    pub fn has_caller_gates(&self) -> bool {
        !self.gates.is_empty()
    }
}

/// Execution type reported by semantic analysis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalyzedExecutionType {
    Single,
    Chain,
}

/// Result of the external semantic analyzer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SemanticAnalysis {
    pub execution_type: AnalyzedExecutionType,
    #[serde(default)]
    pub requires_chain_execution: bool,
    #[serde(default)]
    pub has_chain_step_characteristics: bool,
    #[serde(default)]
    pub confidence: f32,
    #[serde(default)]
    pub reasoning: Vec<String>,
}

impl SemanticAnalysis {
    pub fn flags_chain(&self) -> bool {
        self.execution_type == AnalyzedExecutionType::Chain
            || self.requires_chain_execution
            || self.has_chain_step_characteristics
    }
}
