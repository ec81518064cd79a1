//! Orchestra Stages: the default request pipeline
//!
//! ```text
//! planning → framework → session → gate-review → response
//! ```
//!
//! [`Orchestra`] wires the stages to the catalogs, planner and session store
//! described by an [`OrchestraConfig`].

pub mod config;
pub mod framework;
pub mod gate_review;
pub mod pipeline;
pub mod planning;
pub mod render;
pub mod response;
pub mod session;
pub mod verify;

pub use config::{FrameworkSettings, OrchestraConfig, SessionSettings};
pub use framework::FrameworkStage;
pub use gate_review::{GateReviewStage, INLINE_GATE_ID};
pub use pipeline::{default_pipeline, Orchestra, OrchestraServices};
pub use planning::PlanningStage;
pub use render::{ResponseRenderer, ResponseView};
pub use response::ResponseStage;
pub use session::SessionStage;
pub use verify::{CommandVerifier, ShellOutcome, ShellVerifier};
