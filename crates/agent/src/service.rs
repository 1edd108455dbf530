//! The conversation surface the gateway calls.
//!
//! `ChatService` ties the store, provider, tool registry, history manager,
//! and memory capability together: it loads session context, composes the
//! system prompt, drives the engine, and persists the final exchange.
//!
//! Persistence happens exactly once per turn, after the model interaction
//! concludes — never mid-loop, so a failing later iteration can't leave
//! partial or duplicate writes behind.

use crate::engine::{ConversationEngine, ToolInvocation};
use crate::history::HistoryManager;
use crate::prompt::{build_system_prompt, PromptContext};
use crate::stream::ChatStreamEvent;
use crate::title;
use agrocert_core::chat::ChatMessage;
use agrocert_core::error::AgentError;
use agrocert_core::memory::MemoryClient;
use agrocert_core::provider::{Provider, ProviderRequest};
use agrocert_core::session::{Session, StoredMessage, WorkflowMode, DEFAULT_SESSION_TITLE};
use agrocert_core::store::{SessionPage, Store};
use agrocert_core::tool::{SessionContext, ToolRegistry};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Tunables for the conversation surface.
#[derive(Debug, Clone)]
pub struct ChatSettings {
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub max_iterations: u32,
    pub history_limit: i64,
    pub history_budget: usize,
    pub keep_most_recent: usize,
    pub summary_threshold: usize,
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self {
            model: "claude-sonnet-4-5".into(),
            max_tokens: 4096,
            temperature: 1.0,
            max_iterations: 5,
            history_limit: 50,
            history_budget: 150_000,
            keep_most_recent: 10,
            summary_threshold: 50,
        }
    }
}

/// Result of one blocking chat turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatOutcome {
    pub reply: String,
    pub session_id: Uuid,
    pub user_message_id: Uuid,
    pub assistant_message_id: Uuid,
    pub tool_calls: Vec<ToolInvocation>,
}

/// Result of title generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TitleOutcome {
    pub session_id: Uuid,
    pub title: String,
    /// True when the model produced the title, false for the fallback.
    pub generated: bool,
}

pub struct ChatService {
    store: Arc<dyn Store>,
    provider: Arc<dyn Provider>,
    registry: Arc<ToolRegistry>,
    memory: Arc<dyn MemoryClient>,
    engine: ConversationEngine,
    history: HistoryManager,
    settings: ChatSettings,
}

impl ChatService {
    pub fn new(
        store: Arc<dyn Store>,
        provider: Arc<dyn Provider>,
        registry: Arc<ToolRegistry>,
        memory: Arc<dyn MemoryClient>,
        settings: ChatSettings,
    ) -> Self {
        let engine = ConversationEngine::new(
            provider.clone(),
            registry.clone(),
            settings.model.clone(),
            settings.max_tokens,
            settings.temperature,
        )
        .with_max_iterations(settings.max_iterations);

        let history = HistoryManager::new(
            settings.history_budget,
            settings.keep_most_recent,
            settings.summary_threshold,
        );

        Self {
            store,
            provider,
            registry,
            memory,
            engine,
            history,
            settings,
        }
    }

    /// Load session, history, and context for one turn.
    async fn prepare_turn(
        &self,
        session_id: Uuid,
        message: &str,
    ) -> Result<(Session, Vec<ChatMessage>, String, SessionContext), AgentError> {
        let session = self
            .store
            .get_session(session_id)
            .await?
            .ok_or(AgentError::SessionNotFound(session_id))?;

        let stored = self
            .store
            .list_messages(session_id, self.settings.history_limit)
            .await?;
        info!(
            session_id = %session_id,
            history = stored.len(),
            "Prepared conversation history"
        );

        let memories = match self.memory.recall(session.user_id, message, 5).await {
            Ok(memories) => memories,
            Err(e) => {
                warn!(error = %e, "Memory recall failed, continuing without");
                Vec::new()
            }
        };

        let application = match session.application_id {
            Some(app_id) => self.store.get_application(app_id).await?,
            None => None,
        };

        let definitions = self.registry.definitions();
        let system = build_system_prompt(&PromptContext {
            workflow_mode: session.workflow_mode,
            application: application.as_ref(),
            memories: &memories,
            tools: &definitions,
        });

        let prepared = self.history.prepare(&stored, Some(message))?;

        let ctx = SessionContext {
            user_id: Some(session.user_id),
            application_id: session.application_id,
        };

        Ok((session, prepared, system, ctx))
    }

    /// Blocking chat: run the full tool loop, persist the exchange once,
    /// return the final reply.
    pub async fn chat(&self, session_id: Uuid, message: &str) -> Result<ChatOutcome, AgentError> {
        let (_session, prepared, system, ctx) = self.prepare_turn(session_id, message).await?;

        let outcome = self.engine.run(prepared, Some(system), &ctx).await?;

        let reply = if outcome.reply.is_empty() {
            "I processed your request with the available tools.".to_string()
        } else {
            outcome.reply
        };

        let user_message_id = self
            .store
            .append_message(session_id, "user", message)
            .await?;
        let assistant_message_id = self
            .store
            .append_message(session_id, "assistant", &reply)
            .await?;

        Ok(ChatOutcome {
            reply,
            session_id,
            user_message_id,
            assistant_message_id,
            tool_calls: outcome.tool_invocations,
        })
    }

    /// Streaming chat: one streamed model call, incremental events, one
    /// persistence point at completion.
    ///
    /// Errors before the stream opens are returned directly (the gateway
    /// turns them into HTTP errors); anything after that becomes a single
    /// `error` event so the consumer's connection always ends cleanly.
    pub async fn stream_chat(
        self: Arc<Self>,
        session_id: Uuid,
        message: String,
    ) -> Result<mpsc::Receiver<ChatStreamEvent>, AgentError> {
        let (_session, prepared, system, _ctx) = self.prepare_turn(session_id, &message).await?;

        let (tx, rx) = mpsc::channel(64);
        let service = self.clone();

        tokio::spawn(async move {
            if let Err(e) = service
                .drive_stream(session_id, &message, prepared, system, &tx)
                .await
            {
                error!(session_id = %session_id, error = %e, "Stream failed");
                let _ = tx
                    .send(ChatStreamEvent::Error {
                        message: e.to_string(),
                    })
                    .await;
            }
        });

        Ok(rx)
    }

    async fn drive_stream(
        &self,
        session_id: Uuid,
        message: &str,
        prepared: Vec<ChatMessage>,
        system: String,
        tx: &mpsc::Sender<ChatStreamEvent>,
    ) -> Result<(), AgentError> {
        let request = ProviderRequest {
            model: self.settings.model.clone(),
            system: Some(system),
            messages: prepared,
            max_tokens: self.settings.max_tokens,
            temperature: self.settings.temperature,
            tools: self.registry.definitions(),
        };

        let mut chunks = self.provider.stream(request).await?;
        let _ = tx.send(ChatStreamEvent::MessageStart).await;

        let mut full_text = String::new();
        let mut tool_calls = 0usize;

        while let Some(chunk) = chunks.recv().await {
            let chunk = chunk?;

            if let Some(text) = chunk.text {
                full_text.push_str(&text);
                let _ = tx.send(ChatStreamEvent::Token { text }).await;
            }

            for call in chunk.tool_calls {
                tool_calls += 1;
                let _ = tx
                    .send(ChatStreamEvent::ToolUse {
                        id: call.id,
                        name: call.name,
                        input: call.input,
                    })
                    .await;
            }

            if chunk.done {
                break;
            }
        }

        // Single persistence point, after the stream concluded
        let user_message_id = self
            .store
            .append_message(session_id, "user", message)
            .await?;
        let assistant_content = if full_text.is_empty() {
            "(no text response)"
        } else {
            full_text.as_str()
        };
        let assistant_message_id = self
            .store
            .append_message(session_id, "assistant", assistant_content)
            .await?;

        let _ = tx
            .send(ChatStreamEvent::Complete {
                user_message_id,
                assistant_message_id,
                tool_calls,
            })
            .await;

        Ok(())
    }

    // ── Session lifecycle ─────────────────────────────────────────────────

    pub async fn create_session(
        &self,
        user_id: Uuid,
        title: &str,
        application_id: Option<Uuid>,
        workflow_mode: Option<WorkflowMode>,
    ) -> Result<Session, AgentError> {
        Ok(self
            .store
            .create_session(user_id, title, application_id, workflow_mode)
            .await?)
    }

    pub async fn get_session(&self, session_id: Uuid) -> Result<Session, AgentError> {
        self.store
            .get_session(session_id)
            .await?
            .ok_or(AgentError::SessionNotFound(session_id))
    }

    pub async fn list_sessions(
        &self,
        user_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<SessionPage, AgentError> {
        Ok(self.store.list_sessions(user_id, limit, offset).await?)
    }

    pub async fn session_messages(
        &self,
        session_id: Uuid,
        limit: i64,
    ) -> Result<Vec<StoredMessage>, AgentError> {
        // Existence check first so a missing session is a 404, not an
        // empty list
        self.get_session(session_id).await?;
        Ok(self.store.list_messages(session_id, limit).await?)
    }

    pub async fn update_session(
        &self,
        session_id: Uuid,
        title: Option<&str>,
        workflow_mode: Option<WorkflowMode>,
    ) -> Result<Session, AgentError> {
        self.store
            .update_session(session_id, title, workflow_mode)
            .await?
            .ok_or(AgentError::SessionNotFound(session_id))
    }

    pub async fn delete_session(&self, session_id: Uuid) -> Result<(), AgentError> {
        if !self.store.delete_session(session_id).await? {
            return Err(AgentError::SessionNotFound(session_id));
        }
        info!(session_id = %session_id, "Deleted session");
        Ok(())
    }

    /// Generate and apply a title from the first exchange. Sessions that
    /// already carry a custom title are left alone; model failure falls
    /// back to a deterministic truncation of the user message.
    pub async fn generate_session_title(
        &self,
        session_id: Uuid,
        user_message: &str,
        assistant_response: &str,
    ) -> Result<TitleOutcome, AgentError> {
        let session = self.get_session(session_id).await?;

        if session.title != DEFAULT_SESSION_TITLE {
            return Ok(TitleOutcome {
                session_id,
                title: session.title,
                generated: false,
            });
        }

        let (new_title, generated) = match title::generate_session_title(
            self.provider.as_ref(),
            &self.settings.model,
            user_message,
            assistant_response,
        )
        .await
        {
            Ok(t) => (t, true),
            Err(e) => {
                warn!(error = %e, "AI title generation failed, using fallback");
                (title::fallback_title(user_message), false)
            }
        };

        self.store
            .update_session(session_id, Some(&new_title), None)
            .await?;
        info!(session_id = %session_id, title = %new_title, "Session title updated");

        Ok(TitleOutcome {
            session_id,
            title: new_title,
            generated,
        })
    }
}
