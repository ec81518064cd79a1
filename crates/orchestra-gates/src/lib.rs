//! Orchestra Gates: Verdicts, Enforcement Modes and Retry Budgets
//!
//! This crate decides how strictly gates are enforced for a request,
//! turns raw verdict text into structured verdicts, and tracks per-gate
//! retry state across the steps of a chain session.
//!
//! # Architecture
//!
//! ```text
//! raw text ──▶ parse_verdict ──▶ ParsedVerdict
//!                                     │
//! EnforcementInput ──▶ mode ──────────┤
//!                                     ▼
//!                      GateEnforcementAuthority ──▶ GateTransition
//!                                     │
//!                                     ▼
//!                               Audit Trail
//! ```
//!
//! # Example
//!
//! ```
//! use orchestra_gates::{
//!     EnforcementConfig, GateEnforcementAuthority, GateStatus, VerdictSource,
//! };
//!
//! let mut authority = GateEnforcementAuthority::for_session("chain-42", EnforcementConfig::new(1));
//! authority.begin_review(["code-quality"]);
//!
//! let verdict = authority
//!     .parse_verdict("GATE_REVIEW: FAIL - missing tests", VerdictSource::UserResponse)
//!     .expect("recognized verdict");
//!
//! let transition = authority.apply_verdict("code-quality", &verdict);
//! assert_eq!(transition.to, GateStatus::Retrying);
//! ```

pub mod audit;
pub mod authority;
pub mod config;
pub mod mode;
pub mod verdict;

pub use audit::{GateAuditEntry, GateAuditEventType, GateAuditLog, GateAuditStats};
pub use authority::{GateEnforcementAuthority, GateStatus, GateTrack, GateTransition};
pub use config::{ConfigError, EnforcementConfig};
pub use mode::{EnforcementInput, EnforcementMode, GateSeverity};
pub use verdict::{parse_verdict, ParsedVerdict, VerdictKind, VerdictPattern, VerdictSource};
