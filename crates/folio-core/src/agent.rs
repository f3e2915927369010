//! Agent orchestration loop
//!
//! The plan-act-observe cycle: invoke the model over the full transcript,
//! execute whatever tool calls the assistant message carries (in emission
//! order), feed the results back as one tool-role message, and repeat until
//! the model answers without tools or the iteration budget runs out.
//!
//! Streaming callbacks are a pure side-channel: they observe events in
//! emission order and never influence control flow. Tool failures are
//! contained by the registry and come back as model-visible error payloads.

use crate::error::Result;
use crate::llm::{ChatModel, Message, StreamEvent, ToolResult};
use crate::tools::ToolRegistry;
use serde_json::Value;
use tracing::debug;

/// Returned when the iteration budget runs out before any assistant message
const EXHAUSTED_FALLBACK: &str =
    "I was unable to complete the request within the iteration limit.";

/// Observation hooks threaded through one agent run
#[derive(Default)]
pub struct AgentHooks<'a> {
    /// Receives every model stream event in emission order
    pub on_stream: Option<&'a mut (dyn FnMut(&StreamEvent) + Send)>,
    /// Receives (tool name, arguments, result payload) after each tool call
    pub on_tool_result: Option<&'a mut (dyn FnMut(&str, &Value, &str) + Send)>,
}

/// Drive the agent until it produces a final answer.
///
/// Makes at most `max_iterations` model invocations. When the budget is
/// exhausted while the model still wants tools, the last assistant message
/// is returned as best-effort output (or a synthesized fallback if no model
/// turn completed at all).
pub async fn run_agent(
    model: &dyn ChatModel,
    user_query: &str,
    tools: &ToolRegistry,
    system_prompt: &str,
    max_iterations: usize,
    mut hooks: AgentHooks<'_>,
) -> Result<Message> {
    let mut messages: Vec<Message> = vec![Message::user(user_query)];
    let tool_defs = tools.tool_defs();
    let mut last_assistant: Option<Message> = None;

    for iteration in 0..max_iterations {
        let mut forward = |event: &StreamEvent| {
            if let Some(on_stream) = hooks.on_stream.as_deref_mut() {
                on_stream(event);
            }
        };
        let assistant = model
            .stream(&messages, &tool_defs, system_prompt, &mut forward)
            .await?;
        messages.push(assistant.clone());

        if assistant.tool_calls.is_empty() {
            return Ok(assistant);
        }
        debug!(
            "iteration {iteration}: executing {} tool call(s)",
            assistant.tool_calls.len()
        );

        let mut results = Vec::with_capacity(assistant.tool_calls.len());
        for call in &assistant.tool_calls {
            let payload = tools.call(&call.name, &call.arguments).await;
            if let Some(on_tool_result) = hooks.on_tool_result.as_deref_mut() {
                on_tool_result(&call.name, &call.arguments, &payload);
            }
            results.push(ToolResult {
                tool_call_id: call.id.clone(),
                content: payload,
            });
        }
        messages.push(Message::tool(results));
        last_assistant = Some(assistant);
    }

    // Iteration budget exhausted; return whatever we have
    Ok(last_assistant.unwrap_or_else(|| Message::assistant(EXHAUSTED_FALLBACK)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use crate::llm::{ChatModel, Role, StreamSink, ToolCall, ToolDef};
    use async_trait::async_trait;
    use futures::FutureExt;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn echo_registry() -> ToolRegistry {
        let mut registry = ToolRegistry::new();
        let def = ToolDef {
            name: "echo".to_string(),
            description: "Echo".to_string(),
            parameters: json!({"type": "object", "properties": {"text": {"type": "string"}}}),
        };
        registry.register(
            def,
            Box::new(|arguments| {
                async move {
                    Ok(arguments
                        .get("text")
                        .and_then(serde_json::Value::as_str)
                        .unwrap_or_default()
                        .to_string())
                }
                .boxed()
            }),
        );
        registry
    }

    /// Issues one tool call on the first turn, then a text answer.
    struct ToolThenAnswerModel {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ChatModel for ToolThenAnswerModel {
        async fn stream(
            &self,
            _messages: &[Message],
            _tools: &[ToolDef],
            _system: &str,
            on_event: StreamSink<'_>,
        ) -> Result<Message> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            let message = if n == 0 {
                let call = ToolCall {
                    id: "tc_1".to_string(),
                    name: "echo".to_string(),
                    arguments: json!({"text": "hello"}),
                };
                on_event(&StreamEvent::ToolCallStart {
                    name: "echo".to_string(),
                });
                on_event(&StreamEvent::ToolCallDone {
                    tool_call: call.clone(),
                });
                Message {
                    role: Role::Assistant,
                    content: None,
                    tool_calls: vec![call],
                    tool_results: Vec::new(),
                }
            } else {
                on_event(&StreamEvent::TextDelta {
                    text: "The answer is hello".to_string(),
                });
                Message::assistant("The answer is hello")
            };
            on_event(&StreamEvent::MessageDone {
                message: message.clone(),
            });
            Ok(message)
        }

        fn model_name(&self) -> &str {
            "stub"
        }
    }

    /// Never stops asking for tools.
    struct AlwaysToolCallModel;

    #[async_trait]
    impl ChatModel for AlwaysToolCallModel {
        async fn stream(
            &self,
            _messages: &[Message],
            _tools: &[ToolDef],
            _system: &str,
            on_event: StreamSink<'_>,
        ) -> Result<Message> {
            let call = ToolCall {
                id: "tc_loop".to_string(),
                name: "echo".to_string(),
                arguments: json!({"text": "loop"}),
            };
            let message = Message {
                role: Role::Assistant,
                content: None,
                tool_calls: vec![call.clone()],
                tool_results: Vec::new(),
            };
            on_event(&StreamEvent::ToolCallDone { tool_call: call });
            on_event(&StreamEvent::MessageDone {
                message: message.clone(),
            });
            Ok(message)
        }

        fn model_name(&self) -> &str {
            "stub"
        }
    }

    #[tokio::test]
    async fn test_executes_tool_then_returns_answer() {
        let model = ToolThenAnswerModel {
            calls: AtomicUsize::new(0),
        };
        let registry = echo_registry();
        let mut observed: Vec<(String, String)> = Vec::new();
        let mut on_tool_result = |name: &str, _args: &Value, payload: &str| {
            observed.push((name.to_string(), payload.to_string()));
        };
        let result = run_agent(
            &model,
            "Say hello",
            &registry,
            "You are a test assistant",
            5,
            AgentHooks {
                on_stream: None,
                on_tool_result: Some(&mut on_tool_result),
            },
        )
        .await
        .unwrap();
        assert_eq!(result.content.as_deref(), Some("The answer is hello"));
        assert_eq!(model.calls.load(Ordering::SeqCst), 2);
        assert_eq!(observed, vec![("echo".to_string(), "hello".to_string())]);
    }

    #[tokio::test]
    async fn test_respects_max_iterations() {
        let registry = echo_registry();
        let result = run_agent(
            &AlwaysToolCallModel,
            "Loop forever",
            &registry,
            "test",
            3,
            AgentHooks::default(),
        )
        .await
        .unwrap();
        // terminates with the last assistant message even though the model
        // keeps issuing tool calls
        assert_eq!(result.tool_calls.len(), 1);
    }

    #[tokio::test]
    async fn test_stream_events_forwarded_in_order() {
        let model = ToolThenAnswerModel {
            calls: AtomicUsize::new(0),
        };
        let registry = echo_registry();
        let mut kinds: Vec<&'static str> = Vec::new();
        let mut on_stream = |event: &StreamEvent| {
            kinds.push(match event {
                StreamEvent::TextDelta { .. } => "text_delta",
                StreamEvent::ToolCallStart { .. } => "tool_call_start",
                StreamEvent::ToolCallDelta { .. } => "tool_call_delta",
                StreamEvent::ToolCallDone { .. } => "tool_call_done",
                StreamEvent::MessageDone { .. } => "message_done",
            });
        };
        run_agent(
            &model,
            "Say hello",
            &registry,
            "test",
            5,
            AgentHooks {
                on_stream: Some(&mut on_stream),
                on_tool_result: None,
            },
        )
        .await
        .unwrap();
        assert_eq!(
            kinds,
            vec![
                "tool_call_start",
                "tool_call_done",
                "message_done",
                "text_delta",
                "message_done"
            ]
        );
    }

    #[tokio::test]
    async fn test_unknown_tool_feeds_error_back_instead_of_failing() {
        struct WrongToolModel {
            calls: AtomicUsize,
        }

        #[async_trait]
        impl ChatModel for WrongToolModel {
            async fn stream(
                &self,
                messages: &[Message],
                _tools: &[ToolDef],
                _system: &str,
                _on_event: StreamSink<'_>,
            ) -> Result<Message> {
                if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                    Ok(Message {
                        role: Role::Assistant,
                        content: None,
                        tool_calls: vec![ToolCall {
                            id: "tc_1".to_string(),
                            name: "no_such_tool".to_string(),
                            arguments: json!({}),
                        }],
                        tool_results: Vec::new(),
                    })
                } else {
                    // the error payload reached the model as an observation
                    let last = messages.last().unwrap();
                    assert_eq!(last.role, Role::Tool);
                    assert!(last.tool_results[0].content.contains("Unknown tool"));
                    Ok(Message::assistant("recovered"))
                }
            }

            fn model_name(&self) -> &str {
                "stub"
            }
        }

        let result = run_agent(
            &WrongToolModel {
                calls: AtomicUsize::new(0),
            },
            "go",
            &echo_registry(),
            "test",
            5,
            AgentHooks::default(),
        )
        .await
        .unwrap();
        assert_eq!(result.content.as_deref(), Some("recovered"));
    }
}
