//! Store trait — the relational storage capability this service consumes.
//!
//! Implementations live in `agrocert-store` (PostgreSQL for production, an
//! in-memory store for tests). Every read-by-id can return "not found";
//! ownership checks are the caller's job, re-derived from the parent row's
//! user id on every call, never cached.

use crate::application::{
    Application, CertModule, CertificationType, DataSource, Document, ModuleField, OcrStatus,
    UserAccount,
};
use crate::error::StoreError;
use crate::session::{Session, StoredMessage, WorkflowMode};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// One page of sessions plus the total count for the user.
#[derive(Debug, Clone)]
pub struct SessionPage {
    pub sessions: Vec<Session>,
    pub total: i64,
}

#[async_trait]
pub trait Store: Send + Sync {
    // ── Sessions ──────────────────────────────────────────────────────────

    async fn create_session(
        &self,
        user_id: Uuid,
        title: &str,
        application_id: Option<Uuid>,
        workflow_mode: Option<WorkflowMode>,
    ) -> Result<Session, StoreError>;

    async fn get_session(&self, id: Uuid) -> Result<Option<Session>, StoreError>;

    /// Sessions for a user, most recently updated first.
    async fn list_sessions(
        &self,
        user_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<SessionPage, StoreError>;

    /// Update title and/or workflow mode; bumps `updated_at`. Returns the
    /// updated session, or `None` if it does not exist.
    async fn update_session(
        &self,
        id: Uuid,
        title: Option<&str>,
        workflow_mode: Option<WorkflowMode>,
    ) -> Result<Option<Session>, StoreError>;

    /// Delete a session and all its messages. Returns whether it existed.
    async fn delete_session(&self, id: Uuid) -> Result<bool, StoreError>;

    // ── Messages ──────────────────────────────────────────────────────────

    async fn append_message(
        &self,
        session_id: Uuid,
        role: &str,
        content: &str,
    ) -> Result<Uuid, StoreError>;

    /// Messages in chronological order, up to `limit`.
    async fn list_messages(
        &self,
        session_id: Uuid,
        limit: i64,
    ) -> Result<Vec<StoredMessage>, StoreError>;

    /// Replace a message's content (conversation correction path).
    async fn update_message(&self, message_id: Uuid, content: &str) -> Result<bool, StoreError>;

    /// Delete every message in the session created after the given message
    /// (conversation regeneration path). Returns the number deleted.
    async fn delete_messages_after(
        &self,
        session_id: Uuid,
        message_id: Uuid,
    ) -> Result<u64, StoreError>;

    // ── Applications ──────────────────────────────────────────────────────

    async fn create_application(
        &self,
        user_id: Uuid,
        certification_type: CertificationType,
        notes: Option<&str>,
    ) -> Result<Application, StoreError>;

    async fn get_application(&self, id: Uuid) -> Result<Option<Application>, StoreError>;

    /// Bump the application's `updated_at`.
    async fn touch_application(&self, id: Uuid) -> Result<(), StoreError>;

    /// Append a line to the application's free-text notes.
    async fn append_application_note(&self, id: Uuid, note: &str) -> Result<(), StoreError>;

    /// Guarded terminal transition to `approved`: succeeds only while the
    /// current status is non-terminal, so a concurrent second certification
    /// loses the race instead of silently re-approving.
    async fn approve_application(&self, id: Uuid) -> Result<bool, StoreError>;

    // ── Documents ─────────────────────────────────────────────────────────

    /// Documents for an application, newest first.
    async fn list_documents(&self, application_id: Uuid) -> Result<Vec<Document>, StoreError>;

    async fn get_document(&self, id: Uuid) -> Result<Option<Document>, StoreError>;

    async fn set_document_status(&self, id: Uuid, status: OcrStatus) -> Result<(), StoreError>;

    /// Mark a document as needing human audit. Escalates `completed` to
    /// `audited`; any other status is left untouched. Returns the resulting
    /// status.
    async fn flag_document_for_audit(
        &self,
        id: Uuid,
        reason: &str,
        at: DateTime<Utc>,
    ) -> Result<OcrStatus, StoreError>;

    // ── Module fields ─────────────────────────────────────────────────────

    /// All module fields for an application, ordered by module then field id.
    async fn list_module_fields(
        &self,
        application_id: Uuid,
    ) -> Result<Vec<ModuleField>, StoreError>;

    async fn get_module_field(
        &self,
        application_id: Uuid,
        module: CertModule,
        field_id: &str,
    ) -> Result<Option<ModuleField>, StoreError>;

    /// Insert or overwrite one field, keyed by (application, module,
    /// field_id). An overwrite replaces value, source, and confidence in
    /// place and bumps `updated_at`.
    async fn upsert_module_field(
        &self,
        application_id: Uuid,
        module: CertModule,
        field_id: &str,
        value: &str,
        data_source: DataSource,
        confidence: f64,
    ) -> Result<(), StoreError>;

    /// Attach an audit flag to a field without touching its value. Returns
    /// the module of the flagged field, or `None` if no such field exists.
    async fn flag_field_for_audit(
        &self,
        application_id: Uuid,
        field_id: &str,
        reason: &str,
        at: DateTime<Utc>,
    ) -> Result<Option<CertModule>, StoreError>;

    /// Number of fields currently carrying an audit flag.
    async fn count_flagged_fields(&self, application_id: Uuid) -> Result<i64, StoreError>;

    /// The distinct modules that have at least one field present.
    async fn modules_with_data(&self, application_id: Uuid)
    -> Result<Vec<CertModule>, StoreError>;

    // ── Audit trail ───────────────────────────────────────────────────────

    async fn append_audit_entry(
        &self,
        application_id: Uuid,
        user_id: Uuid,
        action: &str,
        field_ref: Option<&str>,
        new_value: Option<&str>,
    ) -> Result<(), StoreError>;

    // ── Users ─────────────────────────────────────────────────────────────

    async fn find_user_by_email(&self, email: &str) -> Result<Option<UserAccount>, StoreError>;
}
