//! Goal-driven agent execution loop.
//!
//! plan → step → (approval pause) → execute → observe → iterate. The run
//! suspends on approval-gated steps by waiting on the execution row's
//! status (notification with a polling fallback) and holds no exclusive
//! resources across a suspension.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio::time::Instant;

use super::events::{AgentEvent, PlanStepInfo, RunStatus};
use crate::llm::{collect_text, ChatMessage, LanguageModel};
use crate::storage::{
    ConversationStore, ExecutionSignals, ExecutionStatus, ExecutionStore, ToolExecution,
};
use crate::tools::registry::{ToolContext, ToolRegistry, ToolResult};

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Inputs of one run.
pub struct AgentRunConfig {
    pub conversation_id: String,
    pub goal: String,
    pub run_timeout: Duration,
    pub poll_interval: Duration,
}

impl AgentRunConfig {
    pub fn new(conversation_id: impl Into<String>, goal: impl Into<String>) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            goal: goal.into(),
            run_timeout: Duration::from_secs(600),
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

#[derive(Debug, Clone)]
struct PlannedStep {
    step_id: String,
    description: String,
    tool_name: Option<String>,
    arguments: Value,
}

enum StepOutcome {
    Succeeded(String),
    Failed(String),
}

pub struct AgentRunner {
    registry: Arc<ToolRegistry>,
    model: Arc<dyn LanguageModel>,
    signals: Arc<ExecutionSignals>,
    ctx: ToolContext,
}

impl AgentRunner {
    pub fn new(
        registry: Arc<ToolRegistry>,
        model: Arc<dyn LanguageModel>,
        signals: Arc<ExecutionSignals>,
        ctx: ToolContext,
    ) -> Self {
        Self {
            registry,
            model,
            signals,
            ctx,
        }
    }

    /// Drive the run to completion, emitting events into `events`. A
    /// closed channel (client disconnect) cancels the run at the next
    /// step boundary.
    pub async fn run(&self, config: AgentRunConfig, events: mpsc::Sender<AgentEvent>) {
        let run_id = uuid::Uuid::new_v4().to_string();
        let deadline = Instant::now() + config.run_timeout;

        self.emit(
            &events,
            &config.conversation_id,
            AgentEvent::RunStart {
                run_id: run_id.clone(),
                goal: config.goal.clone(),
            },
        )
        .await;

        let mut steps = match self.plan(&config.goal, None).await {
            Ok(steps) => steps,
            Err(e) => {
                tracing::warn!(error = %e, "planning failed");
                self.emit(
                    &events,
                    &config.conversation_id,
                    AgentEvent::RunFinish {
                        run_id,
                        status: RunStatus::Failed,
                    },
                )
                .await;
                return;
            }
        };
        self.assign_step_ids(&mut steps, 1);
        self.emit_plan(&events, &config.conversation_id, &run_id, &steps)
            .await;

        let mut replanned = false;
        let mut completed = 0usize;
        let mut failed = 0usize;
        let mut index = 0usize;
        let mut status = RunStatus::Completed;

        while index < steps.len() {
            if events.is_closed() {
                status = RunStatus::Cancelled;
                break;
            }
            if Instant::now() >= deadline {
                tracing::warn!(%run_id, "agent run timed out");
                status = RunStatus::Failed;
                break;
            }

            let step = steps[index].clone();
            self.emit(
                &events,
                &config.conversation_id,
                AgentEvent::StepStart {
                    run_id: run_id.clone(),
                    step_id: step.step_id.clone(),
                    description: step.description.clone(),
                    tool_name: step.tool_name.clone(),
                },
            )
            .await;

            let outcome = self
                .run_step(&events, &config, &run_id, &step, deadline)
                .await;

            match outcome {
                StepOutcome::Succeeded(summary) => {
                    completed += 1;
                    self.emit(
                        &events,
                        &config.conversation_id,
                        AgentEvent::StepResult {
                            run_id: run_id.clone(),
                            step_id: step.step_id.clone(),
                            success: true,
                            summary,
                        },
                    )
                    .await;
                    index += 1;
                }
                StepOutcome::Failed(summary) => {
                    failed += 1;
                    self.emit(
                        &events,
                        &config.conversation_id,
                        AgentEvent::StepResult {
                            run_id: run_id.clone(),
                            step_id: step.step_id.clone(),
                            success: false,
                            summary: summary.clone(),
                        },
                    )
                    .await;

                    // One re-plan per run, then terminal failure.
                    if replanned {
                        status = RunStatus::Failed;
                        break;
                    }
                    replanned = true;

                    let remaining: Vec<String> = steps[index + 1..]
                        .iter()
                        .map(|s| s.description.clone())
                        .collect();
                    match self
                        .plan(
                            &config.goal,
                            Some((step.description.as_str(), summary.as_str(), remaining.as_slice())),
                        )
                        .await
                    {
                        Ok(mut new_steps) if !new_steps.is_empty() => {
                            let next_id = steps.len() + 1;
                            self.assign_step_ids(&mut new_steps, next_id);
                            self.emit_plan(&events, &config.conversation_id, &run_id, &new_steps)
                                .await;
                            steps = new_steps;
                            index = 0;
                        }
                        _ => {
                            status = RunStatus::Failed;
                            break;
                        }
                    }
                }
            }
        }

        if status == RunStatus::Completed && failed > 0 && completed == 0 {
            status = RunStatus::Failed;
        }

        self.emit(
            &events,
            &config.conversation_id,
            AgentEvent::RunFinish {
                run_id: run_id.clone(),
                status,
            },
        )
        .await;

        if status != RunStatus::Cancelled {
            self.emit(
                &events,
                &config.conversation_id,
                AgentEvent::RunSummary {
                    run_id,
                    summary: format!(
                        "{} step(s) succeeded, {} failed",
                        completed, failed
                    ),
                },
            )
            .await;
        }
    }

    async fn run_step(
        &self,
        events: &mpsc::Sender<AgentEvent>,
        config: &AgentRunConfig,
        run_id: &str,
        step: &PlannedStep,
        deadline: Instant,
    ) -> StepOutcome {
        let Some(tool_name) = step.tool_name.as_deref() else {
            // Informational step with no tool binding.
            return StepOutcome::Succeeded(step.description.clone());
        };

        let Some(tool) = self.registry.get(tool_name) else {
            return StepOutcome::Failed(format!("unknown tool: {}", tool_name));
        };

        // Validate locally before proposing anything.
        let validated = match tool.schema().validate(&step.arguments) {
            Ok(params) => params,
            Err(detail) => {
                return StepOutcome::Failed(format!("invalid parameters: {}", detail));
            }
        };

        if !self.registry.requires_approval(tool_name) {
            let result = self
                .registry
                .execute(tool_name, validated, &self.ctx)
                .await;
            return outcome_from_result(&result);
        }

        // Approval-gated: persist a pending execution and suspend.
        let db = match self.ctx.db() {
            Ok(db) => db,
            Err(e) => return StepOutcome::Failed(format!("storage error: {}", e)),
        };
        let store = ExecutionStore::new(&db);
        let execution_id = match store.create_pending(
            &config.conversation_id,
            &step.step_id,
            tool_name,
            &validated,
        ) {
            Ok(id) => id,
            Err(e) => return StepOutcome::Failed(format!("storage error: {}", e)),
        };

        self.emit(
            events,
            &config.conversation_id,
            AgentEvent::WaitApproval {
                run_id: run_id.to_string(),
                step_id: step.step_id.clone(),
                execution_id: execution_id.clone(),
                tool_name: tool_name.to_string(),
                parameters_preview: validated.clone(),
            },
        )
        .await;

        let decision = self
            .await_decision(&execution_id, config.poll_interval, deadline)
            .await;
        self.signals.forget(&execution_id);

        let row = match decision {
            Ok(row) => row,
            Err(e) => return StepOutcome::Failed(e.to_string()),
        };

        match row.status {
            ExecutionStatus::Rejected => StepOutcome::Failed("rejected by user".to_string()),
            ExecutionStatus::Completed | ExecutionStatus::Failed => {
                // Executed out-of-band; adopt the recorded result.
                let result: Option<ToolResult> = row
                    .result
                    .as_ref()
                    .and_then(|v| serde_json::from_value(v.clone()).ok());
                match result {
                    Some(result) => outcome_from_result(&result),
                    None => StepOutcome::Failed("execution finished without a result".to_string()),
                }
            }
            ExecutionStatus::Approved => {
                let db = match self.ctx.db() {
                    Ok(db) => db,
                    Err(e) => return StepOutcome::Failed(format!("storage error: {}", e)),
                };
                let store = ExecutionStore::new(&db);
                if !store.mark_executing(&execution_id).unwrap_or(false) {
                    return StepOutcome::Failed("execution already claimed".to_string());
                }
                let result = self
                    .registry
                    .execute(tool_name, row.arguments.clone(), &self.ctx)
                    .await;
                let payload = serde_json::to_value(&result).unwrap_or(Value::Null);
                if let Err(e) = store.finish(&execution_id, result.success, &payload) {
                    tracing::warn!(error = %e, "failed to persist execution result");
                }
                outcome_from_result(&result)
            }
            other => StepOutcome::Failed(format!(
                "unexpected execution status: {}",
                other.as_str()
            )),
        }
    }

    /// Wait until the execution leaves `pending_approval` (or the run
    /// deadline passes). Wakes on notification, re-checks on a short poll.
    async fn await_decision(
        &self,
        execution_id: &str,
        poll_interval: Duration,
        deadline: Instant,
    ) -> Result<ToolExecution> {
        let notify = self.signals.subscribe(execution_id);
        loop {
            let db = self.ctx.db()?;
            let row = ExecutionStore::new(&db)
                .get(execution_id)?
                .context("execution row disappeared")?;
            // An out-of-band `execute` may hold the row in `executing`;
            // keep waiting for its terminal state in that case too.
            if !matches!(
                row.status,
                ExecutionStatus::PendingApproval | ExecutionStatus::Executing
            ) {
                return Ok(row);
            }
            drop(db);

            if Instant::now() >= deadline {
                anyhow::bail!("approval wait timed out");
            }
            tokio::select! {
                _ = notify.notified() => {}
                _ = tokio::time::sleep(poll_interval) => {}
            }
        }
    }

    /// Ask the LM for a plan; `failure` carries the failed step, its
    /// summary and the remaining work for the single re-plan cycle.
    async fn plan(
        &self,
        goal: &str,
        failure: Option<(&str, &str, &[String])>,
    ) -> Result<Vec<PlannedStep>> {
        let catalog: Vec<String> = self
            .registry
            .get_all()
            .iter()
            .map(|t| format!("- {}: {}", t.name(), t.description()))
            .collect();

        let mut prompt = format!(
            "You plan infrastructure operations. Respond with JSON only: \
             {{\"steps\": [{{\"description\": \"...\", \"tool\": \"tool_name or null\", \
             \"arguments\": {{}}}}]}}.\n\nAvailable tools:\n{}",
            catalog.join("\n")
        );
        if let Some((failed_step, summary, remaining)) = failure {
            prompt.push_str(&format!(
                "\n\nThe step \"{}\" failed: {}. Produce a new plan covering the remaining work:\n{}",
                failed_step,
                summary,
                remaining.join("\n")
            ));
        }

        let messages = vec![ChatMessage::system(prompt), ChatMessage::user(goal)];
        let rx = self.model.stream_chat(messages, Vec::new()).await?;
        let text = collect_text(rx).await?;
        parse_plan(&text)
    }

    fn assign_step_ids(&self, steps: &mut [PlannedStep], start: usize) {
        for (offset, step) in steps.iter_mut().enumerate() {
            step.step_id = format!("s{}", start + offset);
        }
    }

    async fn emit_plan(
        &self,
        events: &mpsc::Sender<AgentEvent>,
        conversation_id: &str,
        run_id: &str,
        steps: &[PlannedStep],
    ) {
        let infos: Vec<PlanStepInfo> = steps
            .iter()
            .map(|s| PlanStepInfo {
                step_id: s.step_id.clone(),
                description: s.description.clone(),
                tool_name: s.tool_name.clone(),
            })
            .collect();
        self.emit(
            events,
            conversation_id,
            AgentEvent::Plan {
                run_id: run_id.to_string(),
                steps: infos,
            },
        )
        .await;
    }

    /// Persist the event as a system-role message, then stream it. The
    /// send result is intentionally ignored; disconnects surface as a
    /// closed channel at the next step boundary.
    async fn emit(
        &self,
        events: &mpsc::Sender<AgentEvent>,
        conversation_id: &str,
        event: AgentEvent,
    ) {
        if let Ok(db) = self.ctx.db() {
            let payload = serde_json::to_string(&event).unwrap_or_default();
            if let Err(e) = ConversationStore::new(&db).append_message(
                conversation_id,
                "system",
                Some(&payload),
                None,
                "sent",
            ) {
                tracing::warn!(error = %e, "failed to persist agent event");
            }
        }
        let _ = events.send(event).await;
    }
}

fn outcome_from_result(result: &ToolResult) -> StepOutcome {
    let summary = result
        .message
        .clone()
        .or_else(|| result.error.clone())
        .unwrap_or_else(|| if result.success { "done".into() } else { "failed".into() });
    if result.success {
        StepOutcome::Succeeded(summary)
    } else {
        StepOutcome::Failed(summary)
    }
}

/// Parse the LM's plan JSON; tolerates fenced code blocks and leading
/// prose.
fn parse_plan(text: &str) -> Result<Vec<PlannedStep>> {
    let json_slice = extract_json_object(text).context("no JSON object in plan response")?;
    let value: Value = serde_json::from_str(json_slice).context("plan is not valid JSON")?;
    let steps = value
        .get("steps")
        .and_then(|s| s.as_array())
        .context("plan has no steps array")?;

    let mut planned = Vec::with_capacity(steps.len());
    for step in steps {
        let description = step
            .get("description")
            .and_then(|d| d.as_str())
            .unwrap_or("unnamed step")
            .to_string();
        let tool_name = step
            .get("tool")
            .and_then(|t| t.as_str())
            .filter(|t| !t.is_empty() && *t != "null")
            .map(|t| t.to_string());
        let arguments = step.get("arguments").cloned().unwrap_or_else(|| json!({}));
        planned.push(PlannedStep {
            step_id: String::new(),
            description,
            tool_name,
            arguments,
        });
    }
    Ok(planned)
}

fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end >= start).then(|| &text[start..=end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plan_parsing_handles_fences_and_nulls() {
        let text = "Here is the plan:\n```json\n{\"steps\": [\
                    {\"description\": \"Create database\", \"tool\": \"postgres_create\", \"arguments\": {\"name\": \"db\"}},\
                    {\"description\": \"Summarize\", \"tool\": null}\
                    ]}\n```";
        let steps = parse_plan(text).unwrap();
        assert_eq!(steps.len(), 2);
        assert_eq!(steps[0].tool_name.as_deref(), Some("postgres_create"));
        assert_eq!(steps[0].arguments["name"], "db");
        assert!(steps[1].tool_name.is_none());
    }

    #[test]
    fn plan_without_steps_is_an_error() {
        assert!(parse_plan("{\"notes\": []}").is_err());
        assert!(parse_plan("no json here").is_err());
    }
}
