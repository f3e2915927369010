//! Anthropic Messages API client
//!
//! Owns the full wire translation for Anthropic: transcript/tool-schema
//! encoding on the way in, SSE event decoding on the way out. Tool results
//! travel as `tool_result` blocks inside a user-role message.

use super::{
    ChatModel, Message, Role, SseBuffer, StreamEvent, StreamSink, ToolCall, ToolDef, ToolResult,
};
use crate::config::LlmConfig;
use crate::error::{FolioError, Result};
use async_trait::async_trait;
use futures::StreamExt;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::time::Duration;

const API_URL: &str = "https://api.anthropic.com/v1/messages";
const API_VERSION: &str = "2023-06-01";

/// Chat model backed by the Anthropic Messages API
pub struct AnthropicModel {
    http_client: reqwest::Client,
    api_key: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
}

impl AnthropicModel {
    pub fn new(api_key: String, config: &LlmConfig) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            http_client,
            api_key,
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        })
    }

    fn request_body(&self, messages: &[Message], tools: &[ToolDef], system: &str) -> Value {
        let mut body = json!({
            "model": self.model,
            "max_tokens": self.max_tokens,
            "temperature": self.temperature,
            "system": system,
            "messages": convert_messages(messages),
            "stream": true,
        });
        if !tools.is_empty() {
            body["tools"] = Value::Array(tools.iter().map(convert_tool).collect());
        }
        body
    }
}

#[async_trait]
impl ChatModel for AnthropicModel {
    async fn stream(
        &self,
        messages: &[Message],
        tools: &[ToolDef],
        system: &str,
        on_event: StreamSink<'_>,
    ) -> Result<Message> {
        let response = self
            .http_client
            .post(API_URL)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .json(&self.request_body(messages, tools, system))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(FolioError::Llm(format!(
                "Anthropic API error (HTTP {status}): {body}"
            )));
        }

        let mut sse = SseBuffer::default();
        let mut state = StreamState::default();
        let mut byte_stream = response.bytes_stream();
        while let Some(chunk) = byte_stream.next().await {
            let chunk = chunk?;
            for data in sse.push(&String::from_utf8_lossy(&chunk)) {
                let Ok(value) = serde_json::from_str::<Value>(&data) else {
                    continue;
                };
                state.apply(&value, on_event)?;
            }
        }

        state
            .done
            .ok_or_else(|| FolioError::Llm("stream ended without a completed message".to_string()))
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

fn convert_tool(tool: &ToolDef) -> Value {
    json!({
        "name": tool.name,
        "description": tool.description,
        "input_schema": tool.parameters,
    })
}

fn convert_messages(messages: &[Message]) -> Vec<Value> {
    messages.iter().map(convert_message).collect()
}

fn convert_message(message: &Message) -> Value {
    match message.role {
        Role::User => json!({
            "role": "user",
            "content": message.content.as_deref().unwrap_or(""),
        }),
        Role::Assistant => {
            if message.tool_calls.is_empty() {
                json!({
                    "role": "assistant",
                    "content": message.content.as_deref().unwrap_or(""),
                })
            } else {
                let mut blocks: Vec<Value> = Vec::new();
                if let Some(text) = message.content.as_deref() {
                    if !text.is_empty() {
                        blocks.push(json!({"type": "text", "text": text}));
                    }
                }
                for call in &message.tool_calls {
                    blocks.push(json!({
                        "type": "tool_use",
                        "id": call.id,
                        "name": call.name,
                        "input": call.arguments,
                    }));
                }
                json!({"role": "assistant", "content": blocks})
            }
        }
        Role::Tool => {
            let blocks: Vec<Value> = message
                .tool_results
                .iter()
                .map(|r: &ToolResult| {
                    json!({
                        "type": "tool_result",
                        "tool_use_id": r.tool_call_id,
                        "content": r.content,
                    })
                })
                .collect();
            json!({"role": "user", "content": blocks})
        }
    }
}

#[derive(Debug)]
struct PendingTool {
    id: String,
    name: String,
    partial_json: String,
}

/// Assembles the streamed event sequence into one completed message
#[derive(Debug, Default)]
struct StreamState {
    text: String,
    pending: HashMap<u64, PendingTool>,
    calls: Vec<ToolCall>,
    done: Option<Message>,
}

impl StreamState {
    fn apply(&mut self, data: &Value, on_event: StreamSink<'_>) -> Result<()> {
        match data.get("type").and_then(Value::as_str) {
            Some("content_block_start") => {
                let index = data["index"].as_u64().unwrap_or(0);
                let block = &data["content_block"];
                if block["type"] == "tool_use" {
                    let name = block["name"].as_str().unwrap_or_default().to_string();
                    on_event(&StreamEvent::ToolCallStart { name: name.clone() });
                    self.pending.insert(
                        index,
                        PendingTool {
                            id: block["id"].as_str().unwrap_or_default().to_string(),
                            name,
                            partial_json: String::new(),
                        },
                    );
                }
            }
            Some("content_block_delta") => {
                let index = data["index"].as_u64().unwrap_or(0);
                let delta = &data["delta"];
                match delta["type"].as_str() {
                    Some("text_delta") => {
                        if let Some(text) = delta["text"].as_str() {
                            self.text.push_str(text);
                            on_event(&StreamEvent::TextDelta {
                                text: text.to_string(),
                            });
                        }
                    }
                    Some("input_json_delta") => {
                        if let Some(partial) = delta["partial_json"].as_str() {
                            if let Some(pending) = self.pending.get_mut(&index) {
                                pending.partial_json.push_str(partial);
                            }
                            on_event(&StreamEvent::ToolCallDelta {
                                partial_json: partial.to_string(),
                            });
                        }
                    }
                    _ => {}
                }
            }
            Some("content_block_stop") => {
                let index = data["index"].as_u64().unwrap_or(0);
                if let Some(pending) = self.pending.remove(&index) {
                    let arguments = if pending.partial_json.trim().is_empty() {
                        json!({})
                    } else {
                        serde_json::from_str(&pending.partial_json).unwrap_or_else(|_| json!({}))
                    };
                    let call = ToolCall {
                        id: pending.id,
                        name: pending.name,
                        arguments,
                    };
                    on_event(&StreamEvent::ToolCallDone {
                        tool_call: call.clone(),
                    });
                    self.calls.push(call);
                }
            }
            Some("message_stop") => {
                let message = Message {
                    role: Role::Assistant,
                    content: (!self.text.is_empty()).then(|| self.text.clone()),
                    tool_calls: self.calls.clone(),
                    tool_results: Vec::new(),
                };
                on_event(&StreamEvent::MessageDone {
                    message: message.clone(),
                });
                self.done = Some(message);
            }
            Some("error") => {
                let detail = data["error"]["message"].as_str().unwrap_or("unknown");
                return Err(FolioError::Llm(format!("Anthropic stream error: {detail}")));
            }
            _ => {}
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn apply_all(state: &mut StreamState, events: &[Value]) -> Vec<String> {
        let mut kinds = Vec::new();
        let mut sink = |ev: &StreamEvent| {
            kinds.push(match ev {
                StreamEvent::TextDelta { .. } => "text_delta",
                StreamEvent::ToolCallStart { .. } => "tool_call_start",
                StreamEvent::ToolCallDelta { .. } => "tool_call_delta",
                StreamEvent::ToolCallDone { .. } => "tool_call_done",
                StreamEvent::MessageDone { .. } => "message_done",
            }
            .to_string());
        };
        for ev in events {
            state.apply(ev, &mut sink).unwrap();
        }
        kinds
    }

    #[test]
    fn test_assembles_text_and_tool_call() {
        let mut state = StreamState::default();
        let kinds = apply_all(
            &mut state,
            &[
                json!({"type":"message_start"}),
                json!({"type":"content_block_start","index":0,
                       "content_block":{"type":"text"}}),
                json!({"type":"content_block_delta","index":0,
                       "delta":{"type":"text_delta","text":"Let me check."}}),
                json!({"type":"content_block_stop","index":0}),
                json!({"type":"content_block_start","index":1,
                       "content_block":{"type":"tool_use","id":"tu_1","name":"rag_retrieve"}}),
                json!({"type":"content_block_delta","index":1,
                       "delta":{"type":"input_json_delta","partial_json":"{\"query\":"}}),
                json!({"type":"content_block_delta","index":1,
                       "delta":{"type":"input_json_delta","partial_json":"\"ablation\"}"}}),
                json!({"type":"content_block_stop","index":1}),
                json!({"type":"message_stop"}),
            ],
        );
        assert_eq!(
            kinds,
            vec![
                "text_delta",
                "tool_call_start",
                "tool_call_delta",
                "tool_call_delta",
                "tool_call_done",
                "message_done"
            ]
        );
        let message = state.done.unwrap();
        assert_eq!(message.content.as_deref(), Some("Let me check."));
        assert_eq!(message.tool_calls.len(), 1);
        assert_eq!(message.tool_calls[0].name, "rag_retrieve");
        assert_eq!(message.tool_calls[0].arguments["query"], "ablation");
    }

    #[test]
    fn test_empty_tool_arguments_become_empty_object() {
        let mut state = StreamState::default();
        apply_all(
            &mut state,
            &[
                json!({"type":"content_block_start","index":0,
                       "content_block":{"type":"tool_use","id":"tu_1","name":"web_search"}}),
                json!({"type":"content_block_stop","index":0}),
                json!({"type":"message_stop"}),
            ],
        );
        let message = state.done.unwrap();
        assert_eq!(message.content, None);
        assert_eq!(message.tool_calls[0].arguments, json!({}));
    }

    #[test]
    fn test_tool_results_travel_as_user_blocks() {
        let transcript = vec![
            Message::user("What does the paper say?"),
            Message {
                role: Role::Assistant,
                content: None,
                tool_calls: vec![ToolCall {
                    id: "tu_1".to_string(),
                    name: "rag_retrieve".to_string(),
                    arguments: json!({"query": "method"}),
                }],
                tool_results: Vec::new(),
            },
            Message::tool(vec![ToolResult {
                tool_call_id: "tu_1".to_string(),
                content: "[]".to_string(),
            }]),
        ];
        let converted = convert_messages(&transcript);
        assert_eq!(converted[1]["content"][0]["type"], "tool_use");
        assert_eq!(converted[2]["role"], "user");
        assert_eq!(converted[2]["content"][0]["type"], "tool_result");
        assert_eq!(converted[2]["content"][0]["tool_use_id"], "tu_1");
    }
}
