//! Diagnostic Accumulator: non-fatal findings collected across stages
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiagnosticLevel {
    Info,
    Warning,
    Error,
}

/// One recorded finding
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub level: DiagnosticLevel,
    /// Stage or component that reported it (ex: "planner.semantic")
    pub source: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<serde_json::Value>,
    pub at: DateTime<Utc>,
}

impl Diagnostic {
    pub fn new(level: DiagnosticLevel, source: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            level,
            source: source.into(),
            message: message.into(),
            context: None,
            at: Utc::now(),
        }
    }

    pub fn with_context(mut self, context: serde_json::Value) -> Self {
        self.context = Some(context);
        self
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let level = match self.level {
            DiagnosticLevel::Info => "INFO",
            DiagnosticLevel::Warning => "WARN",
            DiagnosticLevel::Error => "ERROR",
        };
        write!(f, "[{}] {}: {}", level, self.source, self.message)
    }
}

#[derive(Debug, Clone, Default)]
pub struct DiagnosticAccumulator {
    entries: Vec<Diagnostic>,
}

impl DiagnosticAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a diagnostic and mirror it to the log
    pub fn push(&mut self, diagnostic: Diagnostic) {
        match diagnostic.level {
            DiagnosticLevel::Info => info!(source = %diagnostic.source, "{}", diagnostic.message),
            DiagnosticLevel::Warning | DiagnosticLevel::Error => {
                warn!(source = %diagnostic.source, level = ?diagnostic.level, "{}", diagnostic.message)
            }
        }
        self.entries.push(diagnostic);
    }

    pub fn info(&mut self, source: impl Into<String>, message: impl Into<String>) {
        self.push(Diagnostic::new(DiagnosticLevel::Info, source, message));
    }

    pub fn warn(&mut self, source: impl Into<String>, message: impl Into<String>) {
        self.push(Diagnostic::new(DiagnosticLevel::Warning, source, message));
    }

    pub fn error(&mut self, source: impl Into<String>, message: impl Into<String>) {
        self.push(Diagnostic::new(DiagnosticLevel::Error, source, message));
    }

    /// Append diagnostics gathered elsewhere (ex: returned by the planner)
    pub fn extend(&mut self, diagnostics: impl IntoIterator<Item = Diagnostic>) {
        for d in diagnostics {
            self.push(d);
        }
    }

    pub fn all(&self) -> &[Diagnostic] {
        &self.entries
    }

    pub fn at_level(&self, level: DiagnosticLevel) -> Vec<&Diagnostic> {
        self.entries.iter().filter(|d| d.level == level).collect()
    }

    pub fn has_errors(&self) -> bool {
        self.entries.iter().any(|d| d.level == DiagnosticLevel::Error)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
