//! In-memory store — used for tests across the workspace.
//!
//! Keeps insertion order for messages so the correction paths behave like
//! the timestamp-ordered SQL queries do.

use agrocert_core::application::{
    Application, ApplicationStatus, AuditFlag, AuditTrailEntry, CertModule, CertificationType,
    DataSource, Document, ModuleField, OcrStatus, UserAccount,
};
use agrocert_core::error::StoreError;
use agrocert_core::session::{Session, StoredMessage, WorkflowMode, DEFAULT_SESSION_TITLE};
use agrocert_core::store::{SessionPage, Store};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Default)]
struct Inner {
    sessions: HashMap<Uuid, Session>,
    messages: Vec<StoredMessage>,
    applications: HashMap<Uuid, Application>,
    documents: HashMap<Uuid, Document>,
    fields: Vec<ModuleField>,
    audit_trail: Vec<AuditTrailEntry>,
    users: HashMap<String, UserAccount>,
}

/// An in-memory store backed by maps behind an RwLock.
pub struct MemStore {
    inner: RwLock<Inner>,
}

impl MemStore {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
        }
    }

    // ── Test seeding helpers (not part of the Store trait) ────────────────

    /// Insert a user account, returning its id.
    pub async fn insert_user(&self, email: &str, name: Option<&str>) -> Uuid {
        let id = Uuid::new_v4();
        self.inner.write().await.users.insert(
            email.to_string(),
            UserAccount {
                id,
                email: email.to_string(),
                name: name.map(String::from),
            },
        );
        id
    }

    /// Insert a document directly, bypassing the upload flow.
    pub async fn insert_document(&self, doc: Document) -> Uuid {
        let id = doc.id;
        self.inner.write().await.documents.insert(id, doc);
        id
    }

    /// Force an application into a specific status.
    pub async fn set_application_status(&self, id: Uuid, status: ApplicationStatus) {
        if let Some(app) = self.inner.write().await.applications.get_mut(&id) {
            app.status = status;
        }
    }

    /// All audit trail rows, in append order.
    pub async fn audit_entries(&self) -> Vec<AuditTrailEntry> {
        self.inner.read().await.audit_trail.clone()
    }
}

impl Default for MemStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Store for MemStore {
    // ── Sessions ──────────────────────────────────────────────────────────

    async fn create_session(
        &self,
        user_id: Uuid,
        title: &str,
        application_id: Option<Uuid>,
        workflow_mode: Option<WorkflowMode>,
    ) -> Result<Session, StoreError> {
        let now = Utc::now();
        let session = Session {
            id: Uuid::new_v4(),
            user_id,
            application_id,
            workflow_mode,
            title: if title.is_empty() {
                DEFAULT_SESSION_TITLE.to_string()
            } else {
                title.to_string()
            },
            created_at: now,
            updated_at: now,
        };
        self.inner
            .write()
            .await
            .sessions
            .insert(session.id, session.clone());
        Ok(session)
    }

    async fn get_session(&self, id: Uuid) -> Result<Option<Session>, StoreError> {
        Ok(self.inner.read().await.sessions.get(&id).cloned())
    }

    async fn list_sessions(
        &self,
        user_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<SessionPage, StoreError> {
        let inner = self.inner.read().await;
        let mut sessions: Vec<Session> = inner
            .sessions
            .values()
            .filter(|s| s.user_id == user_id)
            .cloned()
            .collect();
        sessions.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        let total = sessions.len() as i64;
        let sessions = sessions
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect();
        Ok(SessionPage { sessions, total })
    }

    async fn update_session(
        &self,
        id: Uuid,
        title: Option<&str>,
        workflow_mode: Option<WorkflowMode>,
    ) -> Result<Option<Session>, StoreError> {
        let mut inner = self.inner.write().await;
        let Some(session) = inner.sessions.get_mut(&id) else {
            return Ok(None);
        };
        if let Some(title) = title {
            session.title = title.to_string();
        }
        if let Some(mode) = workflow_mode {
            session.workflow_mode = Some(mode);
        }
        session.updated_at = Utc::now();
        Ok(Some(session.clone()))
    }

    async fn delete_session(&self, id: Uuid) -> Result<bool, StoreError> {
        let mut inner = self.inner.write().await;
        let existed = inner.sessions.remove(&id).is_some();
        if existed {
            // Cascade to messages
            inner.messages.retain(|m| m.session_id != id);
        }
        Ok(existed)
    }

    // ── Messages ──────────────────────────────────────────────────────────

    async fn append_message(
        &self,
        session_id: Uuid,
        role: &str,
        content: &str,
    ) -> Result<Uuid, StoreError> {
        let mut inner = self.inner.write().await;
        let id = Uuid::new_v4();
        inner.messages.push(StoredMessage {
            id,
            session_id,
            role: role.to_string(),
            content: content.to_string(),
            created_at: Utc::now(),
        });
        if let Some(session) = inner.sessions.get_mut(&session_id) {
            session.updated_at = Utc::now();
        }
        Ok(id)
    }

    async fn list_messages(
        &self,
        session_id: Uuid,
        limit: i64,
    ) -> Result<Vec<StoredMessage>, StoreError> {
        Ok(self
            .inner
            .read()
            .await
            .messages
            .iter()
            .filter(|m| m.session_id == session_id)
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn update_message(&self, message_id: Uuid, content: &str) -> Result<bool, StoreError> {
        let mut inner = self.inner.write().await;
        match inner.messages.iter_mut().find(|m| m.id == message_id) {
            Some(msg) => {
                msg.content = content.to_string();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete_messages_after(
        &self,
        session_id: Uuid,
        message_id: Uuid,
    ) -> Result<u64, StoreError> {
        let mut inner = self.inner.write().await;
        let Some(anchor_pos) = inner
            .messages
            .iter()
            .position(|m| m.id == message_id && m.session_id == session_id)
        else {
            return Ok(0);
        };

        let before = inner.messages.len();
        let mut pos = 0;
        inner.messages.retain(|m| {
            let keep = m.session_id != session_id || pos <= anchor_pos;
            pos += 1;
            keep
        });
        Ok((before - inner.messages.len()) as u64)
    }

    // ── Applications ──────────────────────────────────────────────────────

    async fn create_application(
        &self,
        user_id: Uuid,
        certification_type: CertificationType,
        notes: Option<&str>,
    ) -> Result<Application, StoreError> {
        let now = Utc::now();
        let app = Application {
            id: Uuid::new_v4(),
            user_id,
            status: ApplicationStatus::Draft,
            certification_type,
            notes: notes.map(String::from),
            created_at: now,
            updated_at: now,
        };
        self.inner
            .write()
            .await
            .applications
            .insert(app.id, app.clone());
        Ok(app)
    }

    async fn get_application(&self, id: Uuid) -> Result<Option<Application>, StoreError> {
        Ok(self.inner.read().await.applications.get(&id).cloned())
    }

    async fn touch_application(&self, id: Uuid) -> Result<(), StoreError> {
        if let Some(app) = self.inner.write().await.applications.get_mut(&id) {
            app.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn append_application_note(&self, id: Uuid, note: &str) -> Result<(), StoreError> {
        if let Some(app) = self.inner.write().await.applications.get_mut(&id) {
            let mut notes = app.notes.take().unwrap_or_default();
            notes.push_str(note);
            app.notes = Some(notes);
            app.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn approve_application(&self, id: Uuid) -> Result<bool, StoreError> {
        let mut inner = self.inner.write().await;
        match inner.applications.get_mut(&id) {
            Some(app) if !app.status.is_terminal() => {
                app.status = ApplicationStatus::Approved;
                app.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    // ── Documents ─────────────────────────────────────────────────────────

    async fn list_documents(&self, application_id: Uuid) -> Result<Vec<Document>, StoreError> {
        let mut docs: Vec<Document> = self
            .inner
            .read()
            .await
            .documents
            .values()
            .filter(|d| d.application_id == application_id)
            .cloned()
            .collect();
        docs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(docs)
    }

    async fn get_document(&self, id: Uuid) -> Result<Option<Document>, StoreError> {
        Ok(self.inner.read().await.documents.get(&id).cloned())
    }

    async fn set_document_status(&self, id: Uuid, status: OcrStatus) -> Result<(), StoreError> {
        if let Some(doc) = self.inner.write().await.documents.get_mut(&id) {
            doc.ocr_status = status;
        }
        Ok(())
    }

    async fn flag_document_for_audit(
        &self,
        id: Uuid,
        reason: &str,
        at: DateTime<Utc>,
    ) -> Result<OcrStatus, StoreError> {
        let mut inner = self.inner.write().await;
        let doc = inner
            .documents
            .get_mut(&id)
            .ok_or_else(|| StoreError::Query(format!("document {id} not found")))?;
        doc.needs_audit = true;
        doc.audit_reason = Some(reason.to_string());
        doc.audit_requested_at = Some(at);
        if doc.ocr_status == OcrStatus::Completed {
            doc.ocr_status = OcrStatus::Audited;
        }
        Ok(doc.ocr_status)
    }

    // ── Module fields ─────────────────────────────────────────────────────

    async fn list_module_fields(
        &self,
        application_id: Uuid,
    ) -> Result<Vec<ModuleField>, StoreError> {
        let mut fields: Vec<ModuleField> = self
            .inner
            .read()
            .await
            .fields
            .iter()
            .filter(|f| f.application_id == application_id)
            .cloned()
            .collect();
        fields.sort_by(|a, b| {
            a.module
                .number()
                .cmp(&b.module.number())
                .then_with(|| a.field_id.cmp(&b.field_id))
        });
        Ok(fields)
    }

    async fn get_module_field(
        &self,
        application_id: Uuid,
        module: CertModule,
        field_id: &str,
    ) -> Result<Option<ModuleField>, StoreError> {
        Ok(self
            .inner
            .read()
            .await
            .fields
            .iter()
            .find(|f| {
                f.application_id == application_id
                    && f.module == module
                    && f.field_id == field_id
            })
            .cloned())
    }

    async fn upsert_module_field(
        &self,
        application_id: Uuid,
        module: CertModule,
        field_id: &str,
        value: &str,
        data_source: DataSource,
        confidence: f64,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        match inner.fields.iter_mut().find(|f| {
            f.application_id == application_id && f.module == module && f.field_id == field_id
        }) {
            Some(field) => {
                field.value = value.to_string();
                field.data_source = data_source;
                field.confidence = confidence;
                field.updated_at = Utc::now();
            }
            None => {
                inner.fields.push(ModuleField {
                    id: Uuid::new_v4(),
                    application_id,
                    module,
                    field_id: field_id.to_string(),
                    value: value.to_string(),
                    data_source,
                    confidence,
                    audit_flag: None,
                    updated_at: Utc::now(),
                });
            }
        }
        Ok(())
    }

    async fn flag_field_for_audit(
        &self,
        application_id: Uuid,
        field_id: &str,
        reason: &str,
        at: DateTime<Utc>,
    ) -> Result<Option<CertModule>, StoreError> {
        let mut inner = self.inner.write().await;
        match inner
            .fields
            .iter_mut()
            .find(|f| f.application_id == application_id && f.field_id == field_id)
        {
            Some(field) => {
                field.audit_flag = Some(AuditFlag {
                    reason: reason.to_string(),
                    requested_at: at,
                });
                field.updated_at = Utc::now();
                Ok(Some(field.module))
            }
            None => Ok(None),
        }
    }

    async fn count_flagged_fields(&self, application_id: Uuid) -> Result<i64, StoreError> {
        Ok(self
            .inner
            .read()
            .await
            .fields
            .iter()
            .filter(|f| f.application_id == application_id && f.audit_flag.is_some())
            .count() as i64)
    }

    async fn modules_with_data(
        &self,
        application_id: Uuid,
    ) -> Result<Vec<CertModule>, StoreError> {
        let inner = self.inner.read().await;
        let mut modules: Vec<CertModule> = inner
            .fields
            .iter()
            .filter(|f| f.application_id == application_id)
            .map(|f| f.module)
            .collect();
        modules.sort();
        modules.dedup();
        Ok(modules)
    }

    // ── Audit trail ───────────────────────────────────────────────────────

    async fn append_audit_entry(
        &self,
        application_id: Uuid,
        user_id: Uuid,
        action: &str,
        field_ref: Option<&str>,
        new_value: Option<&str>,
    ) -> Result<(), StoreError> {
        self.inner.write().await.audit_trail.push(AuditTrailEntry {
            id: Uuid::new_v4(),
            application_id,
            user_id,
            action: action.to_string(),
            field_ref: field_ref.map(String::from),
            new_value: new_value.map(String::from),
            created_at: Utc::now(),
        });
        Ok(())
    }

    // ── Users ─────────────────────────────────────────────────────────────

    async fn find_user_by_email(&self, email: &str) -> Result<Option<UserAccount>, StoreError> {
        Ok(self.inner.read().await.users.get(email).cloned())
    }
}
