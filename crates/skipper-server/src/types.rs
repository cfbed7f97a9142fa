//! Request, response and SSE event types for the API.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use skipper_core::tools::ToolResult;

// ============================================================================
// Chat / agent requests
// ============================================================================

#[derive(Deserialize)]
pub struct ChatStreamRequest {
    /// Existing conversation; a new one is created when absent.
    pub conversation_id: Option<String>,
    pub message: String,
    pub ai_id: String,
}

#[derive(Deserialize)]
pub struct AgentStreamRequest {
    pub conversation_id: Option<String>,
    pub ai_id: String,
    pub goal: String,
}

// ============================================================================
// Approval mutations
// ============================================================================

#[derive(Deserialize)]
pub struct ApproveRequest {
    pub execution_id: String,
    pub approved: bool,
}

#[derive(Deserialize)]
pub struct ExecuteRequest {
    pub execution_id: String,
    #[allow(dead_code)]
    pub conversation_id: Option<String>,
}

#[derive(Deserialize)]
pub struct ExecutionsRequest {
    pub execution_ids: Vec<String>,
}

#[derive(Serialize)]
pub struct ExecutionStatusResponse {
    pub execution_id: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
}

// ============================================================================
// Conversations
// ============================================================================

#[derive(Deserialize)]
pub struct CreateConversationRequest {
    pub ai_id: String,
    pub project_id: Option<String>,
    pub server_id: Option<String>,
}

#[derive(Serialize)]
pub struct CreateConversationResponse {
    pub conversation_id: String,
}

#[derive(Serialize)]
pub struct MessageResponse {
    pub message_id: String,
    pub role: String,
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Value>,
    pub status: String,
    pub created_at: String,
}

// ============================================================================
// Chat SSE events
// ============================================================================

/// Events emitted on the chat stream. The variant name maps to the SSE
/// `event:` field; the payload is the `data:` JSON.
#[derive(Debug, Clone)]
pub enum ChatEvent {
    Delta { delta: String },
    ToolCall { id: String, name: String, arguments: Value },
    ToolResult { id: String, payload: Value },
    Done,
    Error { message: String },
    StreamError { message: String },
}

impl ChatEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Delta { .. } => "delta",
            Self::ToolCall { .. } => "tool-call",
            Self::ToolResult { .. } => "tool-result",
            Self::Done => "done",
            Self::Error { .. } => "error",
            Self::StreamError { .. } => "stream-error",
        }
    }

    pub fn payload(&self) -> Value {
        match self {
            Self::Delta { delta } => json!({"delta": delta}),
            Self::ToolCall { id, name, arguments } => json!({
                "id": id,
                "name": name,
                "arguments": arguments.to_string(),
            }),
            Self::ToolResult { id, payload } => {
                let mut payload = payload.clone();
                if let Value::Object(map) = &mut payload {
                    map.insert("id".to_string(), json!(id));
                }
                payload
            }
            Self::Done => json!({}),
            Self::Error { message } | Self::StreamError { message } => {
                json!({"message": message})
            }
        }
    }

    /// A completed tool invocation; the envelope is forwarded untouched.
    pub fn tool_result(id: &str, result: &ToolResult) -> Self {
        Self::ToolResult {
            id: id.to_string(),
            payload: serde_json::to_value(result).unwrap_or(Value::Null),
        }
    }

    /// A pending-approval marker for an approval-gated tool call.
    pub fn pending_approval(id: &str, execution_id: &str) -> Self {
        Self::ToolResult {
            id: id.to_string(),
            payload: json!({
                "status": "pending_approval",
                "execution_id": execution_id,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_result_payload_carries_id_and_envelope() {
        let result = ToolResult::success_data(json!([1, 2, 3]));
        let event = ChatEvent::tool_result("tc-1", &result);
        let payload = event.payload();
        assert_eq!(payload["id"], "tc-1");
        assert_eq!(payload["success"], true);
        assert_eq!(payload["data"], json!([1, 2, 3]));
    }

    #[test]
    fn pending_approval_payload_shape() {
        let event = ChatEvent::pending_approval("tc-1", "e-1");
        assert_eq!(event.name(), "tool-result");
        let payload = event.payload();
        assert_eq!(payload["status"], "pending_approval");
        assert_eq!(payload["execution_id"], "e-1");
    }
}
