//! OpenAI-compatible streaming client.

use std::collections::BTreeMap;

use anyhow::Result;
use async_trait::async_trait;
use futures::StreamExt;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tracing::{debug, error, warn};

use super::{ChatMessage, LanguageModel, LmToolCall, StreamPart};
use crate::sse::SseParser;
use crate::tools::registry::AdvertisedTool;

/// Provider-level failures surfaced before any stream part is produced.
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("model API error: {status} - {detail}")]
    Api {
        status: reqwest::StatusCode,
        detail: String,
    },
}

pub struct HttpLanguageModel {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
    model: String,
}

impl HttpLanguageModel {
    pub fn new(api_url: String, api_key: String, model: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_url,
            api_key,
            model,
        }
    }

    fn request_body(&self, messages: &[ChatMessage], tools: &[AdvertisedTool]) -> Value {
        let wire_messages: Vec<Value> = messages.iter().map(wire_message).collect();

        let mut body = json!({
            "model": self.model,
            "stream": true,
            "messages": wire_messages,
        });

        if !tools.is_empty() {
            let wire_tools: Vec<Value> = tools
                .iter()
                .map(|t| {
                    json!({
                        "type": "function",
                        "function": {
                            "name": t.name,
                            "description": t.description,
                            "parameters": t.parameters,
                        },
                    })
                })
                .collect();
            body["tools"] = Value::Array(wire_tools);
            body["tool_choice"] = json!("auto");
        }

        body
    }
}

fn wire_message(message: &ChatMessage) -> Value {
    let mut wire = json!({
        "role": message.role,
        "content": message.content,
    });
    if !message.tool_calls.is_empty() {
        let calls: Vec<Value> = message
            .tool_calls
            .iter()
            .map(|call| {
                json!({
                    "id": call.id,
                    "type": "function",
                    "function": {
                        "name": call.name,
                        "arguments": call.arguments.to_string(),
                    },
                })
            })
            .collect();
        wire["tool_calls"] = Value::Array(calls);
    }
    if let Some(tool_call_id) = &message.tool_call_id {
        wire["tool_call_id"] = json!(tool_call_id);
    }
    wire
}

#[derive(Default)]
struct ToolCallAccumulator {
    id: String,
    name: String,
    arguments: String,
}

impl ToolCallAccumulator {
    fn finish(self) -> LmToolCall {
        let arguments = serde_json::from_str(&self.arguments)
            .unwrap_or_else(|_| Value::String(self.arguments.clone()));
        LmToolCall {
            id: self.id,
            name: self.name,
            arguments,
        }
    }
}

/// Apply one `choices[0].delta` payload to the running state.
fn process_delta(
    delta: &Value,
    pending_calls: &mut BTreeMap<u64, ToolCallAccumulator>,
    tx: &mpsc::UnboundedSender<StreamPart>,
) {
    if let Some(text) = delta.get("content").and_then(|c| c.as_str()) {
        if !text.is_empty() {
            let _ = tx.send(StreamPart::TextDelta {
                delta: text.to_string(),
            });
        }
    }

    let Some(calls) = delta.get("tool_calls").and_then(|t| t.as_array()) else {
        return;
    };
    for call in calls {
        let index = call.get("index").and_then(|i| i.as_u64()).unwrap_or(0);
        let entry = pending_calls.entry(index).or_default();
        if let Some(id) = call.get("id").and_then(|i| i.as_str()) {
            entry.id = id.to_string();
        }
        if let Some(function) = call.get("function") {
            if let Some(name) = function.get("name").and_then(|n| n.as_str()) {
                entry.name.push_str(name);
            }
            if let Some(fragment) = function.get("arguments").and_then(|a| a.as_str()) {
                entry.arguments.push_str(fragment);
            }
        }
    }
}

fn flush_tool_calls(
    pending_calls: &mut BTreeMap<u64, ToolCallAccumulator>,
    tx: &mpsc::UnboundedSender<StreamPart>,
) {
    for (_, accumulator) in std::mem::take(pending_calls) {
        let call = accumulator.finish();
        if call.name.is_empty() {
            warn!("dropping tool call without a name");
            continue;
        }
        let _ = tx.send(StreamPart::ToolCall(call));
    }
}

#[async_trait]
impl LanguageModel for HttpLanguageModel {
    async fn stream_chat(
        &self,
        messages: Vec<ChatMessage>,
        tools: Vec<AdvertisedTool>,
    ) -> Result<mpsc::UnboundedReceiver<StreamPart>> {
        let body = self.request_body(&messages, &tools);
        debug!(model = %self.model, messages = messages.len(), tools = tools.len(), "model request");

        let response = self
            .client
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let detail = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            error!(%status, %detail, "model API error");
            return Err(ModelError::Api { status, detail }.into());
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let mut stream = response.bytes_stream();

        tokio::spawn(async move {
            let mut parser = SseParser::new();
            let mut pending_calls: BTreeMap<u64, ToolCallAccumulator> = BTreeMap::new();

            while let Some(chunk) = stream.next().await {
                let chunk = match chunk {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        let _ = tx.send(StreamPart::Error {
                            error: format!("stream read error: {}", e),
                        });
                        return;
                    }
                };

                for frame in parser.push(&chunk) {
                    if frame.data == "[DONE]" {
                        flush_tool_calls(&mut pending_calls, &tx);
                        let _ = tx.send(StreamPart::Done);
                        return;
                    }
                    let Ok(payload) = serde_json::from_str::<Value>(&frame.data) else {
                        warn!("unparseable stream frame skipped");
                        continue;
                    };
                    if let Some(delta) = payload.pointer("/choices/0/delta") {
                        process_delta(delta, &mut pending_calls, &tx);
                    }
                    if payload
                        .pointer("/choices/0/finish_reason")
                        .and_then(|r| r.as_str())
                        .is_some()
                    {
                        flush_tool_calls(&mut pending_calls, &tx);
                    }
                }
            }

            flush_tool_calls(&mut pending_calls, &tx);
            let _ = tx.send(StreamPart::Done);
        });

        Ok(rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delta_fragments_accumulate_into_one_call() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut pending = BTreeMap::new();

        process_delta(
            &json!({"tool_calls": [{"index": 0, "id": "tc-1", "function": {"name": "project_list"}}]}),
            &mut pending,
            &tx,
        );
        process_delta(
            &json!({"tool_calls": [{"index": 0, "function": {"arguments": "{\"organ"}}]}),
            &mut pending,
            &tx,
        );
        process_delta(
            &json!({"tool_calls": [{"index": 0, "function": {"arguments": "ization\": 1}"}}]}),
            &mut pending,
            &tx,
        );
        flush_tool_calls(&mut pending, &tx);

        match rx.try_recv().unwrap() {
            StreamPart::ToolCall(call) => {
                assert_eq!(call.id, "tc-1");
                assert_eq!(call.name, "project_list");
                assert_eq!(call.arguments["organization"], 1);
            }
            other => panic!("expected tool call, got {:?}", other),
        }
    }

    #[test]
    fn text_deltas_pass_through() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut pending = BTreeMap::new();
        process_delta(&json!({"content": "hel"}), &mut pending, &tx);
        process_delta(&json!({"content": "lo"}), &mut pending, &tx);

        let mut text = String::new();
        while let Ok(StreamPart::TextDelta { delta }) = rx.try_recv() {
            text.push_str(&delta);
        }
        assert_eq!(text, "hello");
    }

    #[test]
    fn unnamed_calls_are_dropped() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut pending = BTreeMap::new();
        process_delta(
            &json!({"tool_calls": [{"index": 0, "id": "tc-1", "function": {"arguments": "{}"}}]}),
            &mut pending,
            &tx,
        );
        flush_tool_calls(&mut pending, &tx);
        assert!(rx.try_recv().is_err());
    }
}
