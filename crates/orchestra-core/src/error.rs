//! Unified Error Model
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OrchestraError {
    /// A stage read state that an earlier stage has not produced yet
    #[error("PRECONDITION/{0}")]
    Precondition(String),

    /// Planning input cannot produce a plan
    #[error("PLAN/{0}")]
    PlanningInput(String),

    /// An external collaborator failed
    #[error("LOOKUP/{0}")]
    ExternalLookup(String),

    /// Invalid chain session transition
    #[error("SESSION/{0}")]
    Session(String),

    /// Mutation attempted after the response was set
    #[error("TERMINAL/{0}")]
    Terminal(String),

    #[error("CONFIG/{0}")]
    Config(String),

    /// Session store failure
    #[error("STORE/{0}")]
    Store(String),

    /// A concurrent writer saved the session first
    #[error("STORE/CONFLICT: session {session_id} expected version {expected}, found {found}")]
    SessionConflict {
        session_id: String,
        expected: u64,
        found: u64,
    },
}

impl OrchestraError {
    /// Whether the error must abort the current request
    pub fn is_fatal(&self) -> bool {
        !matches!(self, OrchestraError::ExternalLookup(_))
    }
}

pub type Result<T> = std::result::Result<T, OrchestraError>;
