//! Orchestra Planner
//!
//! [`ExecutionPlanner`] decides how a command executes. Collaborators
//! (gate selection, gate definitions, semantic analysis, categories,
//! frameworks) are async traits; [`catalog`] has in-memory versions backed
//! by loaded definitions.

pub mod cache;
pub mod catalog;
pub mod collaborators;
pub mod planner;

pub use cache::VersionedCache;
pub use catalog::{CategoryCatalog, FrameworkCatalog, GateCatalog, StructuralAnalyzer};
pub use collaborators::{
    ActivationCriteria, CategoryResolver, FrameworkDefinition, FrameworkManager, FrameworkSelectionCriteria,
    GateActivation, GateDefinition, GateDefinitionProvider, GateSelectionRequest, GateSelector, SemanticAnalyzer,
};
pub use planner::{ChainPlanOutcome, ExecutionPlanner, PlanOutcome};
