//! Chat endpoint with SSE streaming and tool interception.
//!
//! One request drives one LM completion. Text deltas are persisted
//! cumulatively on the assistant message; tool calls are validated through
//! the registry, executed inline when auto-approved and parked as pending
//! executions otherwise.

use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
    routing::post,
    Json, Router,
};
use futures::stream::Stream;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use skipper_core::llm::{ChatMessage, LanguageModel, LmToolCall, StreamPart};
use skipper_core::storage::{ConversationStore, Database, ExecutionStore, StoredMessage};
use skipper_core::tools::{ToolContext, ToolRegistry};

use crate::auth::CurrentPrincipal;
use crate::error::AppError;
use crate::types::{ChatEvent, ChatStreamRequest};
use crate::AppState;

const SSE_CHANNEL_BUFFER: usize = 256;

pub fn router() -> Router<AppState> {
    Router::new().route("/stream", post(chat_stream))
}

async fn chat_stream(
    State(state): State<AppState>,
    CurrentPrincipal(principal): CurrentPrincipal,
    Json(req): Json<ChatStreamRequest>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    let db = Database::new(&state.db_path)?;
    let binding = super::resolve_binding(&db, &principal, &req.ai_id)?;
    let conversation = super::ensure_conversation(
        &db,
        &principal,
        req.conversation_id.as_deref(),
        &binding.id,
        &req.message,
    )?;

    let store = ConversationStore::new(&db);
    store.append_message(&conversation.id, "user", Some(&req.message), None, "sent")?;
    let assistant_message_id =
        store.append_message(&conversation.id, "assistant", Some(""), None, "sending")?;
    let transcript = build_transcript(&store.list_messages(&conversation.id)?);
    drop(db);

    let pipeline = ChatPipeline {
        registry: state.registry.clone(),
        model: state.models.model_for(&binding),
        ctx: principal.tool_context(&state),
        conversation_id: conversation.id.clone(),
        assistant_message_id,
    };

    let (event_tx, mut event_rx) = mpsc::channel::<ChatEvent>(SSE_CHANNEL_BUFFER);
    let (sse_tx, sse_rx) = mpsc::channel::<Result<Event, Infallible>>(SSE_CHANNEL_BUFFER);

    tokio::spawn(run_chat_pipeline(pipeline, transcript, event_tx));
    tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            let frame = Event::default()
                .event(event.name())
                .data(event.payload().to_string());
            if sse_tx.send(Ok(frame)).await.is_err() {
                // Client gone; dropping event_rx tells the pipeline.
                break;
            }
        }
    });

    Ok(Sse::new(ReceiverStream::new(sse_rx)).keep_alive(KeepAlive::default()))
}

pub(crate) struct ChatPipeline {
    pub registry: Arc<ToolRegistry>,
    pub model: Arc<dyn LanguageModel>,
    pub ctx: ToolContext,
    pub conversation_id: String,
    pub assistant_message_id: String,
}

/// Rebuild the provider transcript from the stored message log.
pub(crate) fn build_transcript(messages: &[StoredMessage]) -> Vec<ChatMessage> {
    let mut transcript = Vec::with_capacity(messages.len());
    for message in messages {
        let content = message.content.clone().unwrap_or_default();
        match message.role.as_str() {
            "user" => transcript.push(ChatMessage::user(content)),
            "system" => transcript.push(ChatMessage::system(content)),
            "assistant" => {
                // Skip the in-flight placeholder.
                if message.status == "sending" && content.is_empty() {
                    continue;
                }
                let tool_calls = message
                    .tool_calls
                    .as_ref()
                    .and_then(|v| v.as_array())
                    .map(|calls| calls.iter().filter_map(parse_stored_tool_call).collect())
                    .unwrap_or_default();
                transcript.push(ChatMessage::assistant(content, tool_calls));
            }
            "tool" => {
                let tool_call_id = message
                    .tool_calls
                    .as_ref()
                    .and_then(|v| v.get("tool_call_id"))
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_string();
                transcript.push(ChatMessage::tool(tool_call_id, content));
            }
            _ => {}
        }
    }
    transcript
}

fn parse_stored_tool_call(value: &Value) -> Option<LmToolCall> {
    let id = value.get("id")?.as_str()?.to_string();
    let function = value.get("function")?;
    let name = function.get("name")?.as_str()?.to_string();
    let arguments = match function.get("arguments") {
        Some(Value::String(s)) => serde_json::from_str(s).unwrap_or(Value::Null),
        Some(other) => other.clone(),
        None => Value::Null,
    };
    Some(LmToolCall { id, name, arguments })
}

fn stored_tool_call(call: &LmToolCall) -> Value {
    json!({
        "id": call.id,
        "function": {
            "name": call.name,
            "arguments": call.arguments.to_string(),
        },
    })
}

/// Drive one LM completion, intercepting tool calls.
///
/// A failed `events.send` means the client disconnected: the LM stream is
/// abandoned and the assistant message flushed as `sent` with its partial
/// content, never left `sending`.
pub(crate) async fn run_chat_pipeline(
    pipeline: ChatPipeline,
    transcript: Vec<ChatMessage>,
    events: mpsc::Sender<ChatEvent>,
) {
    let ChatPipeline {
        registry,
        model,
        ctx,
        conversation_id,
        assistant_message_id,
    } = pipeline;

    let finalize = |status: &str, content: &str, tool_calls: &[LmToolCall]| {
        let db = ctx.db()?;
        let store = ConversationStore::new(&db);
        store.update_message_content(&assistant_message_id, content)?;
        if !tool_calls.is_empty() {
            let calls: Vec<Value> = tool_calls.iter().map(stored_tool_call).collect();
            store.update_message_tool_calls(&assistant_message_id, &Value::Array(calls))?;
        }
        store.set_message_status(&assistant_message_id, status)?;
        anyhow::Ok(())
    };

    let mut stream = match model
        .stream_chat(transcript, registry.advertised())
        .await
    {
        Ok(stream) => stream,
        Err(e) => {
            tracing::error!(error = %e, "model call failed");
            let _ = finalize("error", "", &[]);
            let _ = events
                .send(ChatEvent::Error {
                    message: e.to_string(),
                })
                .await;
            return;
        }
    };

    let mut content = String::new();
    let mut tool_calls: Vec<LmToolCall> = Vec::new();

    while let Some(part) = stream.recv().await {
        match part {
            StreamPart::TextDelta { delta } => {
                content.push_str(&delta);
                if let Ok(db) = ctx.db() {
                    let _ = ConversationStore::new(&db)
                        .update_message_content(&assistant_message_id, &content);
                }
                if events
                    .send(ChatEvent::Delta { delta })
                    .await
                    .is_err()
                {
                    // Client cancelled: stop reading, keep the partial.
                    let _ = finalize("sent", &content, &tool_calls);
                    return;
                }
            }
            StreamPart::ToolCall(call) => {
                tool_calls.push(call.clone());
                let sent = events
                    .send(ChatEvent::ToolCall {
                        id: call.id.clone(),
                        name: call.name.clone(),
                        arguments: call.arguments.clone(),
                    })
                    .await;
                if sent.is_err() {
                    let _ = finalize("sent", &content, &tool_calls);
                    return;
                }

                let follow_up = handle_tool_call(&registry, &ctx, &conversation_id, &call).await;
                if events.send(follow_up).await.is_err() {
                    let _ = finalize("sent", &content, &tool_calls);
                    return;
                }
            }
            StreamPart::Done => break,
            StreamPart::Error { error } => {
                tracing::warn!(%error, "model stream error");
                let _ = finalize("error", &content, &tool_calls);
                let _ = events
                    .send(ChatEvent::StreamError { message: error })
                    .await;
                return;
            }
        }
    }

    if let Err(e) = finalize("sent", &content, &tool_calls) {
        tracing::error!(error = %e, "failed to finalize assistant message");
    }
    let _ = events.send(ChatEvent::Done).await;
}

/// Execute an auto-approve tool inline or park the call for approval.
/// Arguments are validated before a pending execution is ever created, so
/// approval dialogs only show parameter sets that would actually run.
async fn handle_tool_call(
    registry: &ToolRegistry,
    ctx: &ToolContext,
    conversation_id: &str,
    call: &LmToolCall,
) -> ChatEvent {
    if registry.requires_approval(&call.name) {
        let validated = match registry.get(&call.name) {
            Some(tool) => match tool.schema().validate(&call.arguments) {
                Ok(validated) => validated,
                Err(detail) => {
                    return ChatEvent::tool_result(
                        &call.id,
                        &skipper_core::tools::ToolResult::invalid_parameters(detail),
                    )
                }
            },
            None => {
                return ChatEvent::tool_result(
                    &call.id,
                    &skipper_core::tools::ToolResult::failure(
                        format!("Unknown tool: {}", call.name),
                        format!("Unknown tool: {}", call.name),
                    ),
                )
            }
        };

        let db = match ctx.db() {
            Ok(db) => db,
            Err(e) => {
                return ChatEvent::tool_result(
                    &call.id,
                    &skipper_core::tools::ToolResult::failure(
                        "Storage unavailable",
                        e.to_string(),
                    ),
                )
            }
        };
        match ExecutionStore::new(&db).create_pending(
            conversation_id,
            &call.id,
            &call.name,
            &validated,
        ) {
            Ok(execution_id) => ChatEvent::pending_approval(&call.id, &execution_id),
            Err(e) => ChatEvent::tool_result(
                &call.id,
                &skipper_core::tools::ToolResult::failure(
                    "Failed to create pending execution",
                    e.to_string(),
                ),
            ),
        }
    } else {
        let result = registry
            .execute(&call.name, call.arguments.clone(), ctx)
            .await;
        if let Ok(db) = ctx.db() {
            let payload = serde_json::to_string(&result).unwrap_or_default();
            let _ = ConversationStore::new(&db).append_message(
                conversation_id,
                "tool",
                Some(&payload),
                Some(&json!({"tool_call_id": call.id})),
                "sent",
            );
        }
        ChatEvent::tool_result(&call.id, &result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{collect_events, TestWorld};
    use skipper_core::storage::ExecutionStatus;

    /// S1: an auto-approve listing flows tool-call → tool-result → done
    /// and creates no execution row.
    #[tokio::test]
    async fn auto_approve_tool_runs_inline() {
        let world = TestWorld::new();
        world.script(vec![
            StreamPart::ToolCall(LmToolCall {
                id: "tc-1".into(),
                name: "project_list".into(),
                arguments: json!({}),
            }),
            StreamPart::Done,
        ]);

        let events = world.run_chat("list my projects").await;
        let names: Vec<&str> = events.iter().map(|e| e.name()).collect();
        assert_eq!(names, vec!["tool-call", "tool-result", "done"]);

        let result_payload = events[1].payload();
        assert_eq!(result_payload["success"], true);
        assert!(result_payload["data"].is_array());

        // No ToolExecution row was created.
        let db = world.db();
        let count: i64 = db
            .conn()
            .query_row("SELECT COUNT(*) FROM tool_executions", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }

    /// S5 (first half): an approval-gated call emits pending_approval and
    /// triggers nothing.
    #[tokio::test]
    async fn approval_gated_tool_is_parked() {
        let world = TestWorld::new();
        world.script(vec![
            StreamPart::ToolCall(LmToolCall {
                id: "tc-1".into(),
                name: "application_deploy".into(),
                arguments: json!({"application_id": world.application_id.clone()}),
            }),
            StreamPart::Done,
        ]);

        let events = world.run_chat("deploy my app").await;
        let names: Vec<&str> = events.iter().map(|e| e.name()).collect();
        assert_eq!(names, vec!["tool-call", "tool-result", "done"]);

        let payload = events[1].payload();
        assert_eq!(payload["status"], "pending_approval");
        let execution_id = payload["execution_id"].as_str().unwrap().to_string();

        let db = world.db();
        let execution = ExecutionStore::new(&db).get(&execution_id).unwrap().unwrap();
        assert_eq!(execution.status, ExecutionStatus::PendingApproval);
        assert_eq!(world.deployer.trigger_count(), 0);
    }

    /// S9: concatenated deltas equal the persisted assistant content.
    #[tokio::test]
    async fn deltas_reconstruct_persisted_content() {
        let world = TestWorld::new();
        world.script(vec![
            StreamPart::TextDelta { delta: "Hello ".into() },
            StreamPart::TextDelta { delta: "world".into() },
            StreamPart::Done,
        ]);

        let events = world.run_chat("say hello").await;
        let streamed: String = events
            .iter()
            .filter_map(|e| match e {
                ChatEvent::Delta { delta } => Some(delta.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(streamed, "Hello world");
        assert_eq!(events.last().unwrap().name(), "done");

        let messages = world.conversation_messages();
        let assistant = messages
            .iter()
            .rev()
            .find(|m| m.role == "assistant")
            .unwrap();
        assert_eq!(assistant.content.as_deref(), Some("Hello world"));
        assert_eq!(assistant.status, "sent");
    }

    /// S10: dropping the receiver mid-stream flushes the partial as sent.
    #[tokio::test]
    async fn cancellation_never_leaves_sending() {
        let world = TestWorld::new();
        world.script(vec![
            StreamPart::TextDelta { delta: "partial".into() },
            StreamPart::TextDelta { delta: " tail".into() },
            StreamPart::Done,
        ]);

        let (pipeline, transcript) = world.chat_pipeline("long answer");
        let (tx, mut rx) = mpsc::channel::<ChatEvent>(1);
        let handle = tokio::spawn(run_chat_pipeline(pipeline, transcript, tx));
        // Read one delta, then hang up.
        let first = rx.recv().await.unwrap();
        assert_eq!(first.name(), "delta");
        drop(rx);
        handle.await.unwrap();

        let messages = world.conversation_messages();
        let assistant = messages
            .iter()
            .rev()
            .find(|m| m.role == "assistant")
            .unwrap();
        assert_ne!(assistant.status, "sending");
        assert!(assistant.content.as_deref().unwrap().starts_with("partial"));
    }

    /// Invalid parameters never reach the tool: the result envelope is a
    /// VALIDATION failure and the stream continues to done.
    #[tokio::test]
    async fn invalid_arguments_yield_validation_failure() {
        let world = TestWorld::new();
        world.script(vec![
            StreamPart::ToolCall(LmToolCall {
                id: "tc-1".into(),
                name: "environment_create".into(),
                arguments: json!({"project_id": world.project_id.clone()}),
            }),
            StreamPart::Done,
        ]);

        let events = world.run_chat("make an env").await;
        let payload = events[1].payload();
        assert_eq!(payload["success"], false);
        assert_eq!(payload["message"], "Invalid parameters");
        assert!(payload["error"].as_str().unwrap().contains("name"));
        assert_eq!(events.last().unwrap().name(), "done");
    }

    #[tokio::test]
    async fn model_error_emits_stream_error_and_marks_message() {
        let world = TestWorld::new();
        world.script(vec![StreamPart::Error {
            error: "upstream 500".into(),
        }]);

        let events = world.run_chat("hi").await;
        assert_eq!(events.last().unwrap().name(), "stream-error");

        let messages = world.conversation_messages();
        let assistant = messages.iter().rev().find(|m| m.role == "assistant").unwrap();
        assert_eq!(assistant.status, "error");
    }

    /// The transcript round-trips assistant tool calls and tool results.
    #[tokio::test]
    async fn transcript_roundtrip_includes_tool_messages() {
        let world = TestWorld::new();
        world.script(vec![
            StreamPart::ToolCall(LmToolCall {
                id: "tc-1".into(),
                name: "project_list".into(),
                arguments: json!({}),
            }),
            StreamPart::Done,
        ]);
        let events = world.run_chat("list projects").await;
        assert_eq!(collect_events(&events), vec!["tool-call", "tool-result", "done"]);

        let messages = world.conversation_messages();
        let transcript = build_transcript(&messages);
        let tool_msg = transcript.iter().find(|m| m.role == "tool").unwrap();
        assert_eq!(tool_msg.tool_call_id.as_deref(), Some("tc-1"));
        let assistant = transcript
            .iter()
            .find(|m| !m.tool_calls.is_empty())
            .unwrap();
        assert_eq!(assistant.tool_calls[0].name, "project_list");
    }
}
