//! The blocking tool-use loop.
//!
//! One turn-cycle: send the accumulated messages plus the full tool schema
//! list to the model; when the reply requests tools, execute them in the
//! order the model emitted them, feed the results back as the next turn,
//! and loop. A plain text reply terminates the cycle. Exhausting the
//! iteration cap is the single fatal path — it means a misbehaving
//! model/tool combination, not a user-facing business error.

use agrocert_core::chat::ChatMessage;
use agrocert_core::error::AgentError;
use agrocert_core::provider::{Provider, ProviderRequest};
use agrocert_core::tool::{SessionContext, ToolRegistry};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// One tool call the model made during a turn, for reporting to the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInvocation {
    pub id: String,
    pub name: String,
    pub input: serde_json::Value,
}

/// Final result of one blocking turn.
#[derive(Debug, Clone)]
pub struct EngineOutcome {
    /// Concatenated text of the model's terminal reply.
    pub reply: String,
    /// Every tool call made along the way, in execution order.
    pub tool_invocations: Vec<ToolInvocation>,
}

pub struct ConversationEngine {
    provider: Arc<dyn Provider>,
    registry: Arc<ToolRegistry>,
    model: String,
    max_tokens: u32,
    temperature: f32,
    max_iterations: u32,
}

impl ConversationEngine {
    pub fn new(
        provider: Arc<dyn Provider>,
        registry: Arc<ToolRegistry>,
        model: impl Into<String>,
        max_tokens: u32,
        temperature: f32,
    ) -> Self {
        Self {
            provider,
            registry,
            model: model.into(),
            max_tokens,
            temperature,
            max_iterations: 5,
        }
    }

    /// Set the maximum number of tool-use iterations per turn.
    pub fn with_max_iterations(mut self, max: u32) -> Self {
        self.max_iterations = max;
        self
    }

    /// Run the loop to completion and return the final text reply.
    pub async fn run(
        &self,
        mut messages: Vec<ChatMessage>,
        system: Option<String>,
        ctx: &SessionContext,
    ) -> Result<EngineOutcome, AgentError> {
        let tools = self.registry.definitions();
        let mut invocations: Vec<ToolInvocation> = Vec::new();

        for iteration in 1..=self.max_iterations {
            debug!(iteration, messages = messages.len(), "Engine iteration");

            let request = ProviderRequest {
                model: self.model.clone(),
                system: system.clone(),
                messages: messages.clone(),
                max_tokens: self.max_tokens,
                temperature: self.temperature,
                tools: tools.clone(),
            };

            let reply = self.provider.complete(request).await?;

            if !reply.wants_tools() {
                info!(
                    iterations = iteration,
                    tool_calls = invocations.len(),
                    "Turn complete"
                );
                return Ok(EngineOutcome {
                    reply: reply.message.content,
                    tool_invocations: invocations,
                });
            }

            debug!(
                tool_count = reply.message.tool_calls.len(),
                "Model requested tool execution"
            );

            let calls = reply.message.tool_calls.clone();
            messages.push(reply.message);

            // Sequential, in the order the model emitted them: later calls
            // may depend on side effects of earlier ones.
            for call in calls {
                let execution = self
                    .registry
                    .execute(&call.name, call.input.clone(), ctx)
                    .await;
                invocations.push(ToolInvocation {
                    id: call.id.clone(),
                    name: call.name.clone(),
                    input: call.input,
                });
                messages.push(ChatMessage::tool_result(&call.id, execution.result_content()));
            }
        }

        warn!(
            max_iterations = self.max_iterations,
            "Tool loop exhausted without a text reply"
        );
        Err(AgentError::ToolLoopExceeded {
            max_iterations: self.max_iterations,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agrocert_core::chat::{ChatRole, ToolCallRequest};
    use agrocert_core::error::{ProviderError, ToolError};
    use agrocert_core::provider::{ProviderReply, StopReason};
    use agrocert_core::tool::{Tool, ToolOutcome};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Scripted provider: pops replies front-to-back.
    struct ScriptedProvider {
        replies: std::sync::Mutex<Vec<ProviderReply>>,
        calls: AtomicUsize,
    }

    impl ScriptedProvider {
        fn new(replies: Vec<ProviderReply>) -> Self {
            Self {
                replies: std::sync::Mutex::new(replies),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl Provider for ScriptedProvider {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn complete(
            &self,
            _request: ProviderRequest,
        ) -> Result<ProviderReply, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut replies = self.replies.lock().unwrap();
            if replies.is_empty() {
                // Keep requesting a tool forever
                return Ok(tool_reply("loop_tool"));
            }
            Ok(replies.remove(0))
        }
    }

    fn text_reply(content: &str) -> ProviderReply {
        ProviderReply {
            message: ChatMessage::assistant(content),
            stop_reason: Some(StopReason::EndTurn),
            usage: None,
            model: "scripted".into(),
        }
    }

    fn tool_reply(name: &str) -> ProviderReply {
        ProviderReply {
            message: ChatMessage::assistant_with_tools(
                "",
                vec![ToolCallRequest {
                    id: format!("toolu_{name}"),
                    name: name.into(),
                    input: serde_json::json!({}),
                }],
            ),
            stop_reason: Some(StopReason::ToolUse),
            usage: None,
            model: "scripted".into(),
        }
    }

    struct CountingTool {
        name: &'static str,
        executions: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Tool for CountingTool {
        fn name(&self) -> &str {
            self.name
        }
        fn description(&self) -> &str {
            "Counts executions"
        }
        fn parameters_schema(&self) -> serde_json::Value {
            serde_json::json!({"type": "object", "properties": {}})
        }
        async fn execute(
            &self,
            _input: serde_json::Value,
            _ctx: &SessionContext,
        ) -> Result<ToolOutcome, ToolError> {
            self.executions.fetch_add(1, Ordering::SeqCst);
            Ok(ToolOutcome::success(serde_json::json!({"counted": true})))
        }
    }

    fn registry_with_tool(name: &'static str, counter: Arc<AtomicUsize>) -> Arc<ToolRegistry> {
        let mut registry = ToolRegistry::new();
        registry
            .register(Box::new(CountingTool {
                name,
                executions: counter,
            }))
            .unwrap();
        Arc::new(registry)
    }

    #[tokio::test]
    async fn plain_text_terminates_immediately() {
        let provider = Arc::new(ScriptedProvider::new(vec![text_reply("Hello there")]));
        let registry = Arc::new(ToolRegistry::new());
        let engine = ConversationEngine::new(provider.clone(), registry, "m", 1024, 1.0);

        let outcome = engine
            .run(
                vec![ChatMessage::user("hi")],
                None,
                &SessionContext::default(),
            )
            .await
            .unwrap();

        assert_eq!(outcome.reply, "Hello there");
        assert!(outcome.tool_invocations.is_empty());
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn tool_turn_then_text() {
        let counter = Arc::new(AtomicUsize::new(0));
        let provider = Arc::new(ScriptedProvider::new(vec![
            tool_reply("counting"),
            text_reply("Done, the field is updated."),
        ]));
        let registry = registry_with_tool("counting", counter.clone());
        let engine = ConversationEngine::new(provider, registry, "m", 1024, 1.0);

        let outcome = engine
            .run(
                vec![ChatMessage::user("update it")],
                Some("system".into()),
                &SessionContext::default(),
            )
            .await
            .unwrap();

        assert_eq!(outcome.reply, "Done, the field is updated.");
        assert_eq!(outcome.tool_invocations.len(), 1);
        assert_eq!(outcome.tool_invocations[0].name, "counting");
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn multiple_calls_execute_in_emission_order() {
        let counter = Arc::new(AtomicUsize::new(0));
        let reply = ProviderReply {
            message: ChatMessage::assistant_with_tools(
                "",
                vec![
                    ToolCallRequest {
                        id: "toolu_1".into(),
                        name: "counting".into(),
                        input: serde_json::json!({"n": 1}),
                    },
                    ToolCallRequest {
                        id: "toolu_2".into(),
                        name: "counting".into(),
                        input: serde_json::json!({"n": 2}),
                    },
                ],
            ),
            stop_reason: Some(StopReason::ToolUse),
            usage: None,
            model: "scripted".into(),
        };
        let provider = Arc::new(ScriptedProvider::new(vec![reply, text_reply("done")]));
        let registry = registry_with_tool("counting", counter.clone());
        let engine = ConversationEngine::new(provider, registry, "m", 1024, 1.0);

        let outcome = engine
            .run(
                vec![ChatMessage::user("go")],
                None,
                &SessionContext::default(),
            )
            .await
            .unwrap();

        assert_eq!(counter.load(Ordering::SeqCst), 2);
        assert_eq!(outcome.tool_invocations[0].input["n"], 1);
        assert_eq!(outcome.tool_invocations[1].input["n"], 2);
    }

    #[tokio::test]
    async fn unknown_tool_does_not_abort_turn() {
        // Model asks for a tool that isn't registered; the structured
        // tool_not_found result feeds back and the turn still completes.
        let provider = Arc::new(ScriptedProvider::new(vec![
            tool_reply("nonexistent"),
            text_reply("I could not use that tool."),
        ]));
        let registry = Arc::new(ToolRegistry::new());
        let engine = ConversationEngine::new(provider, registry, "m", 1024, 1.0);

        let outcome = engine
            .run(
                vec![ChatMessage::user("try")],
                None,
                &SessionContext::default(),
            )
            .await
            .unwrap();

        assert_eq!(outcome.reply, "I could not use that tool.");
        assert_eq!(outcome.tool_invocations.len(), 1);
    }

    #[tokio::test]
    async fn iteration_cap_is_fatal() {
        let counter = Arc::new(AtomicUsize::new(0));
        // Provider never stops requesting tools
        let provider = Arc::new(ScriptedProvider::new(vec![]));
        let registry = registry_with_tool("loop_tool", counter.clone());
        let engine =
            ConversationEngine::new(provider, registry, "m", 1024, 1.0).with_max_iterations(3);

        let err = engine
            .run(
                vec![ChatMessage::user("loop")],
                None,
                &SessionContext::default(),
            )
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            AgentError::ToolLoopExceeded { max_iterations: 3 }
        ));
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn tool_results_are_fed_back_as_tool_turns() {
        // Verify the transcript shape handed to the provider on the second
        // call: user, assistant-with-tools, tool-result.
        struct InspectingProvider {
            second_call_roles: std::sync::Mutex<Vec<ChatRole>>,
            calls: AtomicUsize,
        }

        #[async_trait]
        impl Provider for InspectingProvider {
            fn name(&self) -> &str {
                "inspecting"
            }
            async fn complete(
                &self,
                request: ProviderRequest,
            ) -> Result<ProviderReply, ProviderError> {
                let call = self.calls.fetch_add(1, Ordering::SeqCst);
                if call == 0 {
                    Ok(tool_reply("counting"))
                } else {
                    *self.second_call_roles.lock().unwrap() =
                        request.messages.iter().map(|m| m.role).collect();
                    Ok(text_reply("finished"))
                }
            }
        }

        let provider = Arc::new(InspectingProvider {
            second_call_roles: std::sync::Mutex::new(vec![]),
            calls: AtomicUsize::new(0),
        });
        let registry = registry_with_tool("counting", Arc::new(AtomicUsize::new(0)));
        let engine = ConversationEngine::new(provider.clone(), registry, "m", 1024, 1.0);

        engine
            .run(
                vec![ChatMessage::user("go")],
                None,
                &SessionContext::default(),
            )
            .await
            .unwrap();

        let roles = provider.second_call_roles.lock().unwrap().clone();
        assert_eq!(
            roles,
            vec![ChatRole::User, ChatRole::Assistant, ChatRole::Tool]
        );
    }
}
