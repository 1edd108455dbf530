//! Conversation engine for AgroCert.
//!
//! The agent loop: prepare history, compose the system prompt, drive the
//! LLM through tool-use turns, and persist the final exchange. Two delivery
//! modes share one contract — blocking (accumulate, return once) and
//! streaming (emit incremental events, accumulate for persistence).

pub mod engine;
pub mod history;
pub mod prompt;
pub mod service;
pub mod stream;
pub mod title;

pub use engine::{ConversationEngine, EngineOutcome, ToolInvocation};
pub use history::HistoryManager;
pub use prompt::{build_system_prompt, PromptContext};
pub use service::{ChatOutcome, ChatService, ChatSettings, TitleOutcome};
pub use stream::ChatStreamEvent;
