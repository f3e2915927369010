//! OpenAI Chat Completions API client
//!
//! Owns the full wire translation for OpenAI-compatible services: tool
//! deltas arrive indexed and fragmented, so calls are accumulated per index
//! and finalized when the stream signals completion.

use super::{
    ChatModel, Message, Role, SseBuffer, StreamEvent, StreamSink, ToolCall, ToolDef, ToolResult,
};
use crate::config::LlmConfig;
use crate::error::{FolioError, Result};
use async_trait::async_trait;
use futures::StreamExt;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::time::Duration;

const API_URL: &str = "https://api.openai.com/v1/chat/completions";

/// Chat model backed by the OpenAI Chat Completions API
pub struct OpenAiModel {
    http_client: reqwest::Client,
    api_key: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
}

impl OpenAiModel {
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
        let mut wire_messages = vec![json!({"role": "system", "content": system})];
        wire_messages.extend(convert_messages(messages));
        let mut body = json!({
            "model": self.model,
            "temperature": self.temperature,
            "max_tokens": self.max_tokens,
            "messages": wire_messages,
            "stream": true,
        });
        if !tools.is_empty() {
            body["tools"] = Value::Array(tools.iter().map(convert_tool).collect());
        }
        body
    }
}

#[async_trait]
impl ChatModel for OpenAiModel {
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
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&self.request_body(messages, tools, system))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(FolioError::Llm(format!(
                "OpenAI API error (HTTP {status}): {body}"
            )));
        }

        let mut sse = SseBuffer::default();
        let mut state = StreamState::default();
        let mut byte_stream = response.bytes_stream();
        'outer: while let Some(chunk) = byte_stream.next().await {
            let chunk = chunk?;
            for data in sse.push(&String::from_utf8_lossy(&chunk)) {
                if data == "[DONE]" {
                    state.finish(on_event);
                    break 'outer;
                }
                let Ok(value) = serde_json::from_str::<Value>(&data) else {
                    continue;
                };
                state.apply(&value, on_event);
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
        "type": "function",
        "function": {
            "name": tool.name,
            "description": tool.description,
            "parameters": tool.parameters,
        },
    })
}

fn convert_messages(messages: &[Message]) -> Vec<Value> {
    let mut out = Vec::new();
    for message in messages {
        match message.role {
            Role::User => out.push(json!({
                "role": "user",
                "content": message.content.as_deref().unwrap_or(""),
            })),
            Role::Assistant => {
                let mut entry = json!({
                    "role": "assistant",
                    "content": message.content.clone(),
                });
                if !message.tool_calls.is_empty() {
                    entry["tool_calls"] = Value::Array(
                        message
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
                            .collect(),
                    );
                }
                out.push(entry);
            }
            // One tool-role message per result on this wire format
            Role::Tool => {
                for result in &message.tool_results {
                    out.push(tool_result_entry(result));
                }
            }
        }
    }
    out
}

fn tool_result_entry(result: &ToolResult) -> Value {
    json!({
        "role": "tool",
        "tool_call_id": result.tool_call_id,
        "content": result.content,
    })
}

#[derive(Debug, Default)]
struct PendingCall {
    id: String,
    name: String,
    arguments: String,
}

/// Accumulates indexed tool-call fragments and text deltas
#[derive(Debug, Default)]
struct StreamState {
    text: String,
    calls: BTreeMap<u64, PendingCall>,
    done: Option<Message>,
}

impl StreamState {
    fn apply(&mut self, data: &Value, on_event: StreamSink<'_>) {
        let Some(choice) = data["choices"].get(0) else {
            return;
        };
        let delta = &choice["delta"];

        if let Some(text) = delta["content"].as_str() {
            if !text.is_empty() {
                self.text.push_str(text);
                on_event(&StreamEvent::TextDelta {
                    text: text.to_string(),
                });
            }
        }

        if let Some(tool_calls) = delta["tool_calls"].as_array() {
            for fragment in tool_calls {
                let index = fragment["index"].as_u64().unwrap_or(0);
                let pending = self.calls.entry(index).or_default();
                if let Some(id) = fragment["id"].as_str() {
                    pending.id = id.to_string();
                }
                if let Some(name) = fragment["function"]["name"].as_str() {
                    pending.name.push_str(name);
                    on_event(&StreamEvent::ToolCallStart {
                        name: pending.name.clone(),
                    });
                }
                if let Some(fragment_args) = fragment["function"]["arguments"].as_str() {
                    if !fragment_args.is_empty() {
                        pending.arguments.push_str(fragment_args);
                        on_event(&StreamEvent::ToolCallDelta {
                            partial_json: fragment_args.to_string(),
                        });
                    }
                }
            }
        }
    }

    fn finish(&mut self, on_event: StreamSink<'_>) {
        let mut calls = Vec::new();
        for (_, pending) in std::mem::take(&mut self.calls) {
            let arguments = if pending.arguments.trim().is_empty() {
                json!({})
            } else {
                serde_json::from_str(&pending.arguments).unwrap_or_else(|_| json!({}))
            };
            let call = ToolCall {
                id: pending.id,
                name: pending.name,
                arguments,
            };
            on_event(&StreamEvent::ToolCallDone {
                tool_call: call.clone(),
            });
            calls.push(call);
        }
        let message = Message {
            role: Role::Assistant,
            content: (!self.text.is_empty()).then(|| self.text.clone()),
            tool_calls: calls,
            tool_results: Vec::new(),
        };
        on_event(&StreamEvent::MessageDone {
            message: message.clone(),
        });
        self.done = Some(message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assembles_fragmented_tool_call() {
        let mut state = StreamState::default();
        let mut sink = |_: &StreamEvent| {};
        state.apply(
            &json!({"choices":[{"delta":{"tool_calls":[
                {"index":0,"id":"call_1","function":{"name":"web_search","arguments":""}}
            ]}}]}),
            &mut sink,
        );
        state.apply(
            &json!({"choices":[{"delta":{"tool_calls":[
                {"index":0,"function":{"arguments":"{\"query\":\"tr"}}
            ]}}]}),
            &mut sink,
        );
        state.apply(
            &json!({"choices":[{"delta":{"tool_calls":[
                {"index":0,"function":{"arguments":"ansformers\"}"}}
            ]}}]}),
            &mut sink,
        );
        state.finish(&mut sink);

        let message = state.done.unwrap();
        assert_eq!(message.tool_calls.len(), 1);
        assert_eq!(message.tool_calls[0].id, "call_1");
        assert_eq!(message.tool_calls[0].arguments["query"], "transformers");
    }

    #[test]
    fn test_text_only_stream() {
        let mut state = StreamState::default();
        let mut texts = Vec::new();
        let mut sink = |ev: &StreamEvent| {
            if let StreamEvent::TextDelta { text } = ev {
                texts.push(text.clone());
            }
        };
        state.apply(&json!({"choices":[{"delta":{"content":"Hello "}}]}), &mut sink);
        state.apply(&json!({"choices":[{"delta":{"content":"world"}}]}), &mut sink);
        state.finish(&mut sink);
        assert_eq!(texts, vec!["Hello ", "world"]);
        let message = state.done.unwrap();
        assert_eq!(message.content.as_deref(), Some("Hello world"));
        assert!(message.tool_calls.is_empty());
    }

    #[test]
    fn test_tool_message_expands_per_result() {
        let transcript = vec![Message::tool(vec![
            ToolResult {
                tool_call_id: "call_1".to_string(),
                content: "[]".to_string(),
            },
            ToolResult {
                tool_call_id: "call_2".to_string(),
                content: "{}".to_string(),
            },
        ])];
        let converted = convert_messages(&transcript);
        assert_eq!(converted.len(), 2);
        assert_eq!(converted[0]["role"], "tool");
        assert_eq!(converted[1]["tool_call_id"], "call_2");
    }
}
