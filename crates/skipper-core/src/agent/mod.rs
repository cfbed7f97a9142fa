//! Agent execution loop: event protocol and the goal-driven runner.

pub mod events;
pub mod runner;

pub use events::{AgentEvent, PlanStepInfo, RunStatus};
pub use runner::{AgentRunConfig, AgentRunner};
