//! LM provider interface.
//!
//! The provider is an external collaborator; the core only depends on
//! this trait. `HttpLanguageModel` speaks the OpenAI-compatible streaming
//! wire format that every configured binding exposes.

pub mod http;

pub use http::{HttpLanguageModel, ModelError};

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;

use crate::storage::AiBinding;
use crate::tools::registry::AdvertisedTool;

/// One proposed tool invocation emitted by the LM.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LmToolCall {
    pub id: String,
    pub name: String,
    pub arguments: Value,
}

/// Stream elements produced by a completion.
#[derive(Debug, Clone)]
pub enum StreamPart {
    TextDelta { delta: String },
    ToolCall(LmToolCall),
    Done,
    Error { error: String },
}

/// Transcript message handed to the provider.
#[derive(Debug, Clone)]
pub struct ChatMessage {
    pub role: String,
    pub content: Option<String>,
    pub tool_calls: Vec<LmToolCall>,
    pub tool_call_id: Option<String>,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: Some(content.into()),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: Some(content.into()),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    pub fn assistant(content: impl Into<String>, tool_calls: Vec<LmToolCall>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: Some(content.into()),
            tool_calls,
            tool_call_id: None,
        }
    }

    pub fn tool(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: "tool".to_string(),
            content: Some(content.into()),
            tool_calls: Vec::new(),
            tool_call_id: Some(tool_call_id.into()),
        }
    }
}

/// Text generation + tool-call emission.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn stream_chat(
        &self,
        messages: Vec<ChatMessage>,
        tools: Vec<AdvertisedTool>,
    ) -> Result<mpsc::UnboundedReceiver<StreamPart>>;
}

/// Builds a model client for a configured binding.
pub trait ModelProvider: Send + Sync {
    fn model_for(&self, binding: &AiBinding) -> Arc<dyn LanguageModel>;
}

/// Default provider: one HTTP client per binding.
pub struct HttpModelProvider;

impl ModelProvider for HttpModelProvider {
    fn model_for(&self, binding: &AiBinding) -> Arc<dyn LanguageModel> {
        Arc::new(HttpLanguageModel::new(
            binding.api_url.clone(),
            binding.api_key.clone(),
            binding.model.clone(),
        ))
    }
}

/// Drain a stream into its concatenated text, failing on a stream error.
/// Used by the agent loop's planning call.
pub async fn collect_text(mut rx: mpsc::UnboundedReceiver<StreamPart>) -> Result<String> {
    let mut text = String::new();
    while let Some(part) = rx.recv().await {
        match part {
            StreamPart::TextDelta { delta } => text.push_str(&delta),
            StreamPart::ToolCall(_) => {}
            StreamPart::Done => break,
            StreamPart::Error { error } => anyhow::bail!("model stream error: {}", error),
        }
    }
    Ok(text)
}
