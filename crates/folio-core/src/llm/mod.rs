//! LLM capability interfaces and provider clients
//!
//! The agent loop talks to a [`ChatModel`]: one streaming-invocation
//! operation per provider, each owning its own wire-format translation, so
//! no provider branching exists anywhere else. Embedding inference sits
//! behind the [`Embedder`] trait the same way.

mod anthropic;
mod embedder;
mod openai;

pub use anthropic::AnthropicModel;
pub use embedder::{Embedder, HttpEmbedder};
pub use openai::OpenAiModel;

use crate::config::LlmConfig;
use crate::error::{FolioError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Conversation role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    Tool,
}

/// A tool invocation requested by the model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    /// Argument mapping, JSON object
    pub arguments: Value,
}

/// The outcome of one tool invocation, fed back to the model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    pub tool_call_id: String,
    pub content: String,
}

/// One transcript entry; constructed per turn, never mutated afterwards
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_results: Vec<ToolResult>,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: Some(content.into()),
            tool_calls: Vec::new(),
            tool_results: Vec::new(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: Some(content.into()),
            tool_calls: Vec::new(),
            tool_results: Vec::new(),
        }
    }

    pub fn tool(results: Vec<ToolResult>) -> Self {
        Self {
            role: Role::Tool,
            content: None,
            tool_calls: Vec::new(),
            tool_results: results,
        }
    }
}

/// Schema handed to the model's function-calling interface
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDef {
    pub name: String,
    pub description: String,
    /// JSON-Schema-shaped object describing accepted arguments
    pub parameters: Value,
}

/// Streamed model output, delivered in emission order
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StreamEvent {
    /// Incremental assistant text
    TextDelta { text: String },
    /// A tool call was announced by name
    ToolCallStart { name: String },
    /// Partial argument JSON for the tool call in progress
    ToolCallDelta { partial_json: String },
    /// A tool call is fully assembled
    ToolCallDone { tool_call: ToolCall },
    /// The completed assistant message for this model turn
    MessageDone { message: Message },
}

/// Synchronous event callback; a pure side-channel that must not
/// influence control flow.
pub type StreamSink<'a> = &'a mut (dyn FnMut(&StreamEvent) + Send);

/// A generative chat backend with tool calling.
///
/// One invocation streams events through the sink and yields exactly one
/// completed assistant message.
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn stream(
        &self,
        messages: &[Message],
        tools: &[ToolDef],
        system: &str,
        on_event: StreamSink<'_>,
    ) -> Result<Message>;

    fn model_name(&self) -> &str;
}

/// Build a chat model from configuration.
///
/// Fails fast with `UnsupportedProvider` / `MissingCredential` before any
/// agent turn executes. The API key falls back to the provider's standard
/// environment variable when not configured explicitly.
pub fn build_model(config: &LlmConfig) -> Result<Box<dyn ChatModel>> {
    let resolve_key = |env_var: &str| -> Result<String> {
        config
            .api_key
            .clone()
            .or_else(|| std::env::var(env_var).ok())
            .ok_or_else(|| {
                FolioError::MissingCredential(format!("set FOLIO_LLM_API_KEY or {env_var}"))
            })
    };
    match config.provider.as_str() {
        "anthropic" => {
            let key = resolve_key("ANTHROPIC_API_KEY")?;
            Ok(Box::new(AnthropicModel::new(key, config)?))
        }
        "openai" => {
            let key = resolve_key("OPENAI_API_KEY")?;
            Ok(Box::new(OpenAiModel::new(key, config)?))
        }
        other => Err(FolioError::UnsupportedProvider(other.to_string())),
    }
}

/// Incremental server-sent-events framing.
///
/// Feed raw chunks in; complete `data:` payloads come out once their event
/// is terminated by a blank line. Carries partial events across chunk
/// boundaries.
#[derive(Debug, Default)]
pub(crate) struct SseBuffer {
    buf: String,
}

impl SseBuffer {
    pub fn push(&mut self, chunk: &str) -> Vec<String> {
        self.buf.push_str(chunk);
        let mut out = Vec::new();
        while let Some(end) = self.buf.find("\n\n") {
            let event: String = self.buf.drain(..end + 2).collect();
            for line in event.lines() {
                if let Some(data) = line.strip_prefix("data:") {
                    out.push(data.trim_start().to_string());
                }
            }
        }
        out
    }
}
