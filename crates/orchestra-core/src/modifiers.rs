//! Execution modifiers (`%clean`, `%judge`, `%lean`, `%framework`)
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

static MODIFIER_TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(?:^|\s)%(clean|judge|lean|framework)\b").expect("valid regex"));

/// A single modifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Modifier {
    Clean,
    Judge,
    Lean,
    Framework,
}

impl Modifier {
    /// Precedence order used when several flags are set
    pub const PRECEDENCE: [Modifier; 4] = [Modifier::Clean, Modifier::Judge, Modifier::Lean, Modifier::Framework];

    pub fn as_str(&self) -> &'static str {
        match self {
            Modifier::Clean => "clean",
            Modifier::Judge => "judge",
            Modifier::Lean => "lean",
            Modifier::Framework => "framework",
        }
    }
}

impl fmt::Display for Modifier {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "%{}", self.as_str())
    }
}

impl FromStr for Modifier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().trim_start_matches('%').to_ascii_lowercase().as_str() {
            "clean" => Ok(Modifier::Clean),
            "judge" => Ok(Modifier::Judge),
            "lean" => Ok(Modifier::Lean),
            "framework" => Ok(Modifier::Framework),
            other => Err(format!("unknown modifier '{}'", other)),
        }
    }
}

/// Modifier flags as supplied by the caller
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Modifiers {
    #[serde(default)]
    pub clean: bool,
    #[serde(default)]
    pub judge: bool,
    #[serde(default)]
    pub lean: bool,
    #[serde(default)]
    pub framework: bool,
}

/// Result of normalizing a set of flags
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedModifiers {
    /// Flags with only the authoritative one set
    pub modifiers: Modifiers,
    pub authoritative: Option<Modifier>,
    /// Flags that were set but lost to precedence
    pub discarded: Vec<Modifier>,
}

impl NormalizedModifiers {
    pub fn is_ambiguous(&self) -> bool {
        !self.discarded.is_empty()
    }
}

impl Modifiers {
    /// Flags with exactly `modifier` set
    pub fn only(modifier: Modifier) -> Self {
        let mut m = Self::default();
        m.set(modifier);
        m
    }

    pub fn set(&mut self, modifier: Modifier) {
        match modifier {
            Modifier::Clean => self.clean = true,
            Modifier::Judge => self.judge = true,
            Modifier::Lean => self.lean = true,
            Modifier::Framework => self.framework = true,
        }
    }

    pub fn is_set(&self, modifier: Modifier) -> bool {
        match modifier {
            Modifier::Clean => self.clean,
            Modifier::Judge => self.judge,
            Modifier::Lean => self.lean,
            Modifier::Framework => self.framework,
        }
    }

    /// Set flags in precedence order
    pub fn active(&self) -> Vec<Modifier> {
        Modifier::PRECEDENCE.into_iter().filter(|m| self.is_set(*m)).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.active().is_empty()
    }

    /// Keep only the first flag in precedence order
    pub fn normalize(&self) -> NormalizedModifiers {
        let mut active = self.active().into_iter();
        let authoritative = active.next();
        NormalizedModifiers {
            modifiers: authoritative.map(Modifiers::only).unwrap_or_default(),
            authoritative,
            discarded: active.collect(),
        }
    }

    /// Collect `%modifier` tokens from command text
    pub fn parse_tokens(text: &str) -> Self {
        let mut modifiers = Self::default();
        for caps in MODIFIER_TOKEN.captures_iter(text) {
            if let Some(m) = caps.get(1).and_then(|m| m.as_str().parse::<Modifier>().ok()) {
                modifiers.set(m);
            }
        }
        modifiers
    }
}
