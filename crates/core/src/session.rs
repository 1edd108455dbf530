//! Conversation sessions and their persisted messages.
//!
//! A session is one conversation thread, optionally bound to one application
//! and one workflow mode. Messages within a session strictly alternate
//! user/assistant, starting with user — the history manager enforces this
//! before anything reaches the LLM boundary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Workflow context that shapes the assistant's guidance for a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowMode {
    GeneralHelp,
    DocumentReview,
    FieldCompletion,
    AuditPreparation,
}

impl WorkflowMode {
    pub const ALL: [WorkflowMode; 4] = [
        Self::GeneralHelp,
        Self::DocumentReview,
        Self::FieldCompletion,
        Self::AuditPreparation,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::GeneralHelp => "general_help",
            Self::DocumentReview => "document_review",
            Self::FieldCompletion => "field_completion",
            Self::AuditPreparation => "audit_preparation",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|m| m.as_str() == s)
    }
}

impl std::fmt::Display for WorkflowMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Default title for a freshly created session, replaced by the title
/// generator after the first exchange.
pub const DEFAULT_SESSION_TITLE: &str = "New Conversation";

/// One conversation thread.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: Uuid,
    pub user_id: Uuid,
    pub application_id: Option<Uuid>,
    pub workflow_mode: Option<WorkflowMode>,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One persisted turn in a session.
///
/// The role is kept as raw text: the store does not reject unknown roles,
/// the history manager filters them out when preparing LLM context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredMessage {
    pub id: Uuid,
    pub session_id: Uuid,
    pub role: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}
