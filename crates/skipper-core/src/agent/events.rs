//! Canonical event protocol for agent runs.
//!
//! `AgentEvent` is the single source of truth for everything the runner
//! emits. The HTTP layer maps events to SSE frames named after
//! [`AgentEvent::name`]; the same payloads are persisted as system-role
//! messages on the conversation.

use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Completed,
    Failed,
    Cancelled,
}

#[derive(Debug, Clone, Serialize)]
pub struct PlanStepInfo {
    pub step_id: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
}

/// Events emitted by an agent run. Every variant carries `run_id`.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum AgentEvent {
    #[serde(rename = "agent.run.start")]
    RunStart { run_id: String, goal: String },

    #[serde(rename = "agent.plan")]
    Plan {
        run_id: String,
        steps: Vec<PlanStepInfo>,
    },

    #[serde(rename = "agent.step.start")]
    StepStart {
        run_id: String,
        step_id: String,
        description: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        tool_name: Option<String>,
    },

    #[serde(rename = "agent.step.wait_approval")]
    WaitApproval {
        run_id: String,
        step_id: String,
        execution_id: String,
        tool_name: String,
        parameters_preview: Value,
    },

    #[serde(rename = "agent.step.result")]
    StepResult {
        run_id: String,
        step_id: String,
        success: bool,
        summary: String,
    },

    #[serde(rename = "agent.run.finish")]
    RunFinish { run_id: String, status: RunStatus },

    #[serde(rename = "agent.run.summary")]
    RunSummary { run_id: String, summary: String },
}

impl AgentEvent {
    /// SSE event name for this variant.
    pub fn name(&self) -> &'static str {
        match self {
            Self::RunStart { .. } => "agent.run.start",
            Self::Plan { .. } => "agent.plan",
            Self::StepStart { .. } => "agent.step.start",
            Self::WaitApproval { .. } => "agent.step.wait_approval",
            Self::StepResult { .. } => "agent.step.result",
            Self::RunFinish { .. } => "agent.run.finish",
            Self::RunSummary { .. } => "agent.run.summary",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serialized_tag_matches_event_name() {
        let event = AgentEvent::WaitApproval {
            run_id: "r-1".into(),
            step_id: "s1".into(),
            execution_id: "e-1".into(),
            tool_name: "postgres_create".into(),
            parameters_preview: serde_json::json!({"name": "db"}),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], event.name());
        assert_eq!(json["execution_id"], "e-1");
    }
}
