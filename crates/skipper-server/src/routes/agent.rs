//! Agent streaming endpoint plus the approval mutations.

use std::convert::Infallible;

use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
    routing::post,
    Json, Router,
};
use futures::stream::Stream;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use skipper_core::agent::{AgentRunConfig, AgentRunner};
use skipper_core::storage::Database;

use crate::auth::CurrentPrincipal;
use crate::error::AppError;
use crate::routes::executions;
use crate::types::AgentStreamRequest;
use crate::AppState;

const SSE_CHANNEL_BUFFER: usize = 256;
const EVENT_CHANNEL_BUFFER: usize = 64;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/stream", post(agent_stream))
        .route("/approve", post(executions::approve))
        .route("/execute", post(executions::execute))
        .route("/executions", post(executions::get_executions))
}

async fn agent_stream(
    State(state): State<AppState>,
    CurrentPrincipal(principal): CurrentPrincipal,
    Json(req): Json<AgentStreamRequest>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    let db = Database::new(&state.db_path)?;
    let binding = super::resolve_binding(&db, &principal, &req.ai_id)?;
    let conversation = super::ensure_conversation(
        &db,
        &principal,
        req.conversation_id.as_deref(),
        &binding.id,
        &req.goal,
    )?;
    drop(db);

    let runner = AgentRunner::new(
        state.registry.clone(),
        state.models.model_for(&binding),
        state.signals.clone(),
        principal.tool_context(&state),
    );
    let mut config = AgentRunConfig::new(conversation.id, req.goal);
    config.run_timeout = state.config.agent_run_timeout;

    let (event_tx, mut event_rx) = mpsc::channel(EVENT_CHANNEL_BUFFER);
    let (sse_tx, sse_rx) = mpsc::channel::<Result<Event, Infallible>>(SSE_CHANNEL_BUFFER);

    tokio::spawn(async move { runner.run(config, event_tx).await });
    tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            let frame = match Event::default().event(event.name()).json_data(&event) {
                Ok(frame) => frame,
                Err(e) => {
                    tracing::error!(error = %e, "failed to serialize agent event");
                    continue;
                }
            };
            if sse_tx.send(Ok(frame)).await.is_err() {
                // Client gone; dropping event_rx cancels the run at the
                // next step boundary.
                break;
            }
        }
        let _ = sse_tx
            .send(Ok(Event::default().event("done").data("{}")))
            .await;
    });

    Ok(Sse::new(ReceiverStream::new(sse_rx)).keep_alive(KeepAlive::default()))
}

#[cfg(test)]
mod tests {
    use crate::test_support::TestWorld;
    use serde_json::json;
    use skipper_core::agent::{AgentEvent, AgentRunConfig, AgentRunner, RunStatus};
    use skipper_core::llm::StreamPart;
    use skipper_core::storage::{Database, ExecutionStore};
    use tokio::sync::mpsc;

    fn plan_text(steps: serde_json::Value) -> String {
        json!({"steps": steps}).to_string()
    }

    /// S6: plan → step → wait_approval → (out-of-band approval) → result
    /// → next step → finish completed.
    #[tokio::test]
    async fn agent_run_pauses_for_approval_and_completes() {
        let world = TestWorld::new();
        world.script(vec![StreamPart::TextDelta {
            delta: plan_text(json!([
                {
                    "description": "Create a Postgres service",
                    "tool": "postgres_create",
                    "arguments": {
                        "environment_id": world.environment_id.clone(),
                        "name": "pg",
                        "database_name": "app",
                        "database_user": "app",
                        "database_password": "s3cret",
                    },
                },
                {
                    "description": "Deploy app X",
                    "tool": "application_deploy",
                    "arguments": {"application_id": world.application_id.clone()},
                },
            ])),
        }]);

        let conversation_id = world.create_conversation();
        let runner = AgentRunner::new(
            world.state.registry.clone(),
            world.model.clone(),
            world.state.signals.clone(),
            world.tool_context(),
        );
        let mut config = AgentRunConfig::new(conversation_id, "Add a Postgres and deploy app X");
        config.poll_interval = std::time::Duration::from_millis(20);

        let (tx, mut rx) = mpsc::channel(64);
        let db_path = world.state.db_path.clone();
        let signals = world.state.signals.clone();

        // Approve every execution as soon as it appears.
        let approver = tokio::spawn(async move {
            let mut approved = 0;
            while approved < 2 {
                tokio::time::sleep(std::time::Duration::from_millis(10)).await;
                let db = Database::new(&db_path).unwrap();
                let pending: Vec<String> = {
                    let mut stmt = db
                        .conn()
                        .prepare("SELECT id FROM tool_executions WHERE status = 'pending_approval'")
                        .unwrap();
                    let rows = stmt
                        .query_map([], |row| row.get::<_, String>(0))
                        .unwrap()
                        .collect::<Result<Vec<_>, _>>()
                        .unwrap();
                    rows
                };
                for id in pending {
                    ExecutionStore::new(&db).set_decision(&id, true).unwrap();
                    signals.notify(&id);
                    approved += 1;
                }
            }
        });

        runner.run(config, tx).await;
        approver.abort();

        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        let names: Vec<&str> = events.iter().map(|e| e.name()).collect();
        assert_eq!(
            names,
            vec![
                "agent.run.start",
                "agent.plan",
                "agent.step.start",
                "agent.step.wait_approval",
                "agent.step.result",
                "agent.step.start",
                "agent.step.wait_approval",
                "agent.step.result",
                "agent.run.finish",
                "agent.run.summary",
            ]
        );

        match &events[8] {
            AgentEvent::RunFinish { status, .. } => assert_eq!(*status, RunStatus::Completed),
            other => panic!("expected finish, got {:?}", other),
        }
        for event in &events {
            match event {
                AgentEvent::StepResult { success, .. } => assert!(*success),
                AgentEvent::WaitApproval { tool_name, .. } => {
                    assert!(tool_name == "postgres_create" || tool_name == "application_deploy");
                }
                _ => {}
            }
        }
        assert_eq!(world.deployer.trigger_count(), 1);
    }

    /// A rejected approval fails the step with "rejected by user"; the
    /// single re-plan cannot produce progress, so the run fails.
    #[tokio::test]
    async fn rejection_fails_the_step() {
        let world = TestWorld::new();
        let deploy_step = json!([{
            "description": "Deploy app X",
            "tool": "application_deploy",
            "arguments": {"application_id": world.application_id.clone()},
        }]);
        // Initial plan and one re-plan return the same doomed step.
        world.script(vec![StreamPart::TextDelta {
            delta: plan_text(deploy_step.clone()),
        }]);
        world.script(vec![StreamPart::TextDelta {
            delta: plan_text(deploy_step),
        }]);

        let conversation_id = world.create_conversation();
        let runner = AgentRunner::new(
            world.state.registry.clone(),
            world.model.clone(),
            world.state.signals.clone(),
            world.tool_context(),
        );
        let mut config = AgentRunConfig::new(conversation_id, "Deploy app X");
        config.poll_interval = std::time::Duration::from_millis(20);

        let (tx, mut rx) = mpsc::channel(64);
        let db_path = world.state.db_path.clone();
        let signals = world.state.signals.clone();
        let rejecter = tokio::spawn(async move {
            loop {
                tokio::time::sleep(std::time::Duration::from_millis(10)).await;
                let db = Database::new(&db_path).unwrap();
                let pending: Vec<String> = {
                    let mut stmt = db
                        .conn()
                        .prepare("SELECT id FROM tool_executions WHERE status = 'pending_approval'")
                        .unwrap();
                    let rows = stmt
                        .query_map([], |row| row.get::<_, String>(0))
                        .unwrap()
                        .collect::<Result<Vec<_>, _>>()
                        .unwrap();
                    rows
                };
                for id in pending {
                    ExecutionStore::new(&db).set_decision(&id, false).unwrap();
                    signals.notify(&id);
                }
            }
        });

        runner.run(config, tx).await;
        rejecter.abort();

        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }

        let rejected = events.iter().any(|e| matches!(
            e,
            AgentEvent::StepResult { success: false, summary, .. } if summary == "rejected by user"
        ));
        assert!(rejected);
        assert!(events.iter().any(|e| matches!(
            e,
            AgentEvent::RunFinish { status: RunStatus::Failed, .. }
        )));
        // No deployment was ever triggered.
        assert_eq!(world.deployer.trigger_count(), 0);
    }

    /// Steps bound to auto-approve tools run without any pause.
    #[tokio::test]
    async fn auto_approve_steps_run_directly() {
        let world = TestWorld::new();
        world.script(vec![StreamPart::TextDelta {
            delta: plan_text(json!([{
                "description": "List projects",
                "tool": "project_list",
                "arguments": {},
            }])),
        }]);

        let conversation_id = world.create_conversation();
        let runner = AgentRunner::new(
            world.state.registry.clone(),
            world.model.clone(),
            world.state.signals.clone(),
            world.tool_context(),
        );
        let config = AgentRunConfig::new(conversation_id.clone(), "List projects");

        let (tx, mut rx) = mpsc::channel(64);
        runner.run(config, tx).await;

        let mut names = Vec::new();
        while let Ok(event) = rx.try_recv() {
            names.push(event.name());
        }
        assert_eq!(
            names,
            vec![
                "agent.run.start",
                "agent.plan",
                "agent.step.start",
                "agent.step.result",
                "agent.run.finish",
                "agent.run.summary",
            ]
        );

        // Events were also persisted as system messages.
        let messages = world.messages_for(&conversation_id);
        let system_count = messages.iter().filter(|m| m.role == "system").count();
        assert_eq!(system_count, names.len());
    }
}
