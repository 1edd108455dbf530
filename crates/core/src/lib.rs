//! # AgroCert Core
//!
//! Domain types, traits, and error definitions for the AgroCert certification
//! assistant. This crate has **zero framework dependencies** — it defines the
//! domain model that all other crates implement against.
//!
//! ## Design Philosophy
//!
//! Every external capability (LLM provider, relational store, vector memory)
//! is defined as a trait here. Implementations live in their respective
//! crates. This enables:
//! - Swapping implementations via configuration
//! - Easy testing with mock/stub implementations
//! - Clean dependency graph (all crates depend inward on core)

pub mod application;
pub mod chat;
pub mod error;
pub mod memory;
pub mod provider;
pub mod session;
pub mod store;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use application::{
    Application, ApplicationStatus, AuditFlag, AuditTrailEntry, CertModule, CertificationType,
    DataSource, Document, DocumentType, ModuleField, OcrStatus, UserAccount,
};
pub use chat::{ChatMessage, ChatRole, ToolCallRequest};
pub use error::{Error, Result};
pub use memory::{MemoryClient, NoopMemory};
pub use provider::{Provider, ProviderReply, ProviderRequest, StopReason, StreamChunk, Usage};
pub use session::{Session, StoredMessage, WorkflowMode};
pub use store::Store;
pub use tool::{SessionContext, Tool, ToolExecution, ToolOutcome, ToolRegistry};
