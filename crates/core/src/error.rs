//! Error types for the AgroCert domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error variant.

use thiserror::Error;

/// The top-level error type for all AgroCert operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Store errors ---
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    // --- Provider errors ---
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    // --- Tool errors ---
    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    // --- Agent errors ---
    #[error("Agent error: {0}")]
    Agent(#[from] AgentError),

    // --- History errors ---
    #[error("History error: {0}")]
    History(#[from] HistoryError),

    // --- Memory errors ---
    #[error("Memory error: {0}")]
    Memory(#[from] MemoryError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Corrupt row: {0}")]
    CorruptRow(String),
}

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Stream interrupted: {0}")]
    StreamInterrupted(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),
}

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Invalid tool arguments: {0}")]
    InvalidArguments(String),

    #[error("Store error during tool execution: {0}")]
    Store(#[from] StoreError),

    #[error("Tool execution failed: {0}")]
    Internal(String),
}

#[derive(Debug, Error)]
pub enum AgentError {
    /// The one fatal conversation error: the model kept requesting tools
    /// past the iteration cap without producing a final text reply.
    #[error("Tool loop exceeded {max_iterations} iterations without a text reply")]
    ToolLoopExceeded { max_iterations: u32 },

    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("History error: {0}")]
    History(#[from] HistoryError),

    #[error("Session not found: {0}")]
    SessionNotFound(uuid::Uuid),
}

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("Invalid role '{role}' at index {index}")]
    InvalidRole { index: usize, role: String },

    #[error("Non-alternating roles at index {index}: {prev} -> {next}")]
    NonAlternating {
        index: usize,
        prev: String,
        next: String,
    },

    #[error("Conversation must start with a user message")]
    LeadingAssistant,
}

#[derive(Debug, Error)]
pub enum MemoryError {
    #[error("Memory backend error: {0}")]
    Backend(String),
}
