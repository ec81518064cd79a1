//! Gate verdict types and parsing
//!
//! Verdicts arrive as free text (`GATE_REVIEW: PASS - all criteria met`)
//! or as the exit code of a shell verification command.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

static PRIMARY_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)^\s*gate_review\s*:\s*(pass|fail)\s*[-:]\s*(.+?)\s*$").expect("valid regex")
});
static SIMPLE_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)^\s*gate\s+(pass|fail)\s*[-:]\s*(.+?)\s*$").expect("valid regex")
});
static MINIMAL_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)^\s*(pass|fail)\s*[-:]\s*(.+?)\s*$").expect("valid regex")
});
static SCORE_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\bscore\s*[:=]\s*(\d{1,3})\b").expect("valid regex")
});

/// Outcome of a gate review
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VerdictKind {
    Pass,
    Fail,
}

impl VerdictKind {
    fn from_token(token: &str) -> Option<Self> {
        if token.eq_ignore_ascii_case("pass") {
            Some(VerdictKind::Pass)
        } else if token.eq_ignore_ascii_case("fail") {
            Some(VerdictKind::Fail)
        } else {
            None
        }
    }
}

/// Where the verdict text came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerdictSource {
    /// Dedicated verdict field of the request
    GateVerdictField,
    /// Free-form user response
    UserResponse,
    /// Exit code of a shell verification command
    ShellVerification,
}

/// Which textual form matched
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerdictPattern {
    /// `GATE_REVIEW: PASS - reason`
    Primary,
    /// `GATE PASS - reason`
    Simple,
    /// `PASS - reason`, only accepted from the verdict field
    Minimal,
    /// Derived from a process exit code
    ExitCode,
}

/// A verdict after parsing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedVerdict {
    pub kind: VerdictKind,
    pub rationale: String,
    pub source: VerdictSource,
    pub pattern: VerdictPattern,
    /// Optional `score: NN` found in the rationale, clamped to 0..=100
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quality_score: Option<u8>,
}

impl ParsedVerdict {
    /// Create a passing verdict
    pub fn pass(rationale: impl Into<String>, source: VerdictSource) -> Self {
        Self::new(VerdictKind::Pass, rationale.into(), source, VerdictPattern::Primary)
    }

    /// Create a failing verdict
    pub fn fail(rationale: impl Into<String>, source: VerdictSource) -> Self {
        Self::new(VerdictKind::Fail, rationale.into(), source, VerdictPattern::Primary)
    }

    fn new(kind: VerdictKind, rationale: String, source: VerdictSource, pattern: VerdictPattern) -> Self {
        let quality_score = extract_score(&rationale);
        Self {
            kind,
            rationale,
            source,
            pattern,
            quality_score,
        }
    }

    /// Build a verdict from a shell verification run
    pub fn from_exit_code(exit_code: i32, output: &str) -> Self {
        let kind = if exit_code == 0 { VerdictKind::Pass } else { VerdictKind::Fail };
        let summary = output.lines().rev().find(|l| !l.trim().is_empty()).unwrap_or("").trim();
        let rationale = if summary.is_empty() {
            format!("exit code {}", exit_code)
        } else {
            format!("exit code {}: {}", exit_code, summary)
        };
        Self {
            kind,
            rationale,
            source: VerdictSource::ShellVerification,
            pattern: VerdictPattern::ExitCode,
            quality_score: None,
        }
    }

    pub fn is_pass(&self) -> bool {
        self.kind == VerdictKind::Pass
    }

    /// Set an explicit quality score
    pub fn with_quality_score(mut self, score: u8) -> Self {
        self.quality_score = Some(score.min(100));
        self
    }
}

/// Parse verdict text.
///
/// Returns `None` when no known form matches or the rationale is empty.
/// The bare `PASS - reason` form is only trusted from the verdict field,
/// where there is no risk of matching ordinary prose.
pub fn parse_verdict(raw: &str, source: VerdictSource) -> Option<ParsedVerdict> {
    let mut candidates: Vec<(&Lazy<Regex>, VerdictPattern)> = vec![
        (&PRIMARY_PATTERN, VerdictPattern::Primary),
        (&SIMPLE_PATTERN, VerdictPattern::Simple),
    ];
    if source == VerdictSource::GateVerdictField {
        candidates.push((&MINIMAL_PATTERN, VerdictPattern::Minimal));
    }

    for (pattern, label) in candidates {
        let Some(caps) = pattern.captures(raw) else {
            continue;
        };
        let kind = caps.get(1).and_then(|m| VerdictKind::from_token(m.as_str()))?;
        let rationale = caps.get(2).map(|m| m.as_str().trim()).unwrap_or("");
        if rationale.is_empty() {
            return None;
        }
        return Some(ParsedVerdict::new(kind, rationale.to_string(), source, label));
    }

    None
}

fn extract_score(rationale: &str) -> Option<u8> {
    SCORE_PATTERN
        .captures(rationale)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse::<u32>().ok())
        .map(|n| n.min(100) as u8)
}

impl fmt::Display for VerdictKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            VerdictKind::Pass => write!(f, "PASS"),
            VerdictKind::Fail => write!(f, "FAIL"),
        }
    }
}

impl fmt::Display for ParsedVerdict {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.rationale)
    }
}
