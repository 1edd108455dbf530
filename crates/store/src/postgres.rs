//! PostgreSQL store backend.
//!
//! One statement per logical step; no explicit multi-statement transactions.
//! Cross-request consistency is delegated to PostgreSQL's row-level
//! transactional semantics. Schema is created at startup with
//! `CREATE TABLE IF NOT EXISTS` migrations.

use agrocert_core::application::{
    Application, ApplicationStatus, AuditFlag, CertModule, CertificationType, DataSource,
    Document, DocumentType, ExtractionMetadata, ModuleField, OcrStatus, UserAccount,
};
use agrocert_core::error::StoreError;
use agrocert_core::session::{Session, StoredMessage, WorkflowMode};
use agrocert_core::store::{SessionPage, Store};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use tracing::{debug, info};
use uuid::Uuid;

/// Production PostgreSQL store.
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Connect and run schema migrations.
    pub async fn connect(
        url: &str,
        min_connections: u32,
        max_connections: u32,
        acquire_timeout_secs: u64,
    ) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .min_connections(min_connections)
            .max_connections(max_connections)
            .acquire_timeout(std::time::Duration::from_secs(acquire_timeout_secs))
            .connect(url)
            .await
            .map_err(|e| StoreError::Connection(format!("Failed to connect to Postgres: {e}")))?;

        let store = Self { pool };
        store.run_migrations().await?;
        info!("PostgreSQL store initialized");
        Ok(store)
    }

    /// Create from an existing pool (useful for testing).
    pub async fn from_pool(pool: PgPool) -> Result<Self, StoreError> {
        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    async fn run_migrations(&self) -> Result<(), StoreError> {
        let statements = [
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id          UUID PRIMARY KEY DEFAULT gen_random_uuid(),
                email       TEXT UNIQUE NOT NULL,
                name        TEXT
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS sessions (
                id              UUID PRIMARY KEY DEFAULT gen_random_uuid(),
                user_id         UUID NOT NULL,
                application_id  UUID,
                workflow_mode   TEXT,
                title           TEXT NOT NULL DEFAULT 'New Conversation',
                created_at      TIMESTAMPTZ NOT NULL DEFAULT now(),
                updated_at      TIMESTAMPTZ NOT NULL DEFAULT now()
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS messages (
                id          UUID PRIMARY KEY DEFAULT gen_random_uuid(),
                session_id  UUID NOT NULL REFERENCES sessions(id) ON DELETE CASCADE,
                role        TEXT NOT NULL,
                content     TEXT NOT NULL,
                created_at  TIMESTAMPTZ NOT NULL DEFAULT now()
            )
            "#,
            r#"
            CREATE INDEX IF NOT EXISTS idx_messages_session_created
                ON messages(session_id, created_at)
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS applications (
                id                  UUID PRIMARY KEY DEFAULT gen_random_uuid(),
                user_id             UUID NOT NULL,
                status              TEXT NOT NULL DEFAULT 'draft',
                certification_type  TEXT NOT NULL DEFAULT 'standard',
                notes               TEXT,
                created_at          TIMESTAMPTZ NOT NULL DEFAULT now(),
                updated_at          TIMESTAMPTZ NOT NULL DEFAULT now()
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS documents (
                id                  UUID PRIMARY KEY DEFAULT gen_random_uuid(),
                application_id      UUID NOT NULL REFERENCES applications(id) ON DELETE CASCADE,
                document_type       TEXT NOT NULL,
                file_name           TEXT NOT NULL,
                file_size           BIGINT NOT NULL DEFAULT 0,
                mime_type           TEXT NOT NULL DEFAULT 'application/octet-stream',
                storage_path        TEXT NOT NULL,
                ocr_status          TEXT NOT NULL DEFAULT 'pending',
                extraction          JSONB,
                needs_audit         BOOLEAN NOT NULL DEFAULT FALSE,
                audit_reason        TEXT,
                audit_requested_at  TIMESTAMPTZ,
                created_at          TIMESTAMPTZ NOT NULL DEFAULT now()
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS module_fields (
                id                  UUID PRIMARY KEY DEFAULT gen_random_uuid(),
                application_id      UUID NOT NULL REFERENCES applications(id) ON DELETE CASCADE,
                module              TEXT NOT NULL,
                field_id            TEXT NOT NULL,
                value               TEXT NOT NULL,
                data_source         TEXT NOT NULL,
                confidence          DOUBLE PRECISION NOT NULL DEFAULT 1.0,
                audit_reason        TEXT,
                audit_requested_at  TIMESTAMPTZ,
                updated_at          TIMESTAMPTZ NOT NULL DEFAULT now(),
                UNIQUE (application_id, module, field_id)
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS audit_trail (
                id              UUID PRIMARY KEY DEFAULT gen_random_uuid(),
                application_id  UUID NOT NULL,
                user_id         UUID NOT NULL,
                action          TEXT NOT NULL,
                field_ref       TEXT,
                new_value       TEXT,
                created_at      TIMESTAMPTZ NOT NULL DEFAULT now()
            )
            "#,
        ];

        for stmt in statements {
            sqlx::query(stmt)
                .execute(&self.pool)
                .await
                .map_err(|e| StoreError::Migration(e.to_string()))?;
        }

        debug!("PostgreSQL migrations complete");
        Ok(())
    }

    fn q(e: sqlx::Error) -> StoreError {
        StoreError::Query(e.to_string())
    }

    fn row_to_session(row: &PgRow) -> Result<Session, StoreError> {
        let workflow_mode: Option<String> = row.try_get("workflow_mode").map_err(Self::q)?;
        let workflow_mode = match workflow_mode {
            Some(s) => Some(WorkflowMode::parse(&s).ok_or_else(|| {
                StoreError::CorruptRow(format!("unknown workflow_mode '{s}'"))
            })?),
            None => None,
        };

        Ok(Session {
            id: row.try_get("id").map_err(Self::q)?,
            user_id: row.try_get("user_id").map_err(Self::q)?,
            application_id: row.try_get("application_id").map_err(Self::q)?,
            workflow_mode,
            title: row.try_get("title").map_err(Self::q)?,
            created_at: row.try_get("created_at").map_err(Self::q)?,
            updated_at: row.try_get("updated_at").map_err(Self::q)?,
        })
    }

    fn row_to_message(row: &PgRow) -> Result<StoredMessage, StoreError> {
        Ok(StoredMessage {
            id: row.try_get("id").map_err(Self::q)?,
            session_id: row.try_get("session_id").map_err(Self::q)?,
            role: row.try_get("role").map_err(Self::q)?,
            content: row.try_get("content").map_err(Self::q)?,
            created_at: row.try_get("created_at").map_err(Self::q)?,
        })
    }

    fn row_to_application(row: &PgRow) -> Result<Application, StoreError> {
        let status: String = row.try_get("status").map_err(Self::q)?;
        let cert_type: String = row.try_get("certification_type").map_err(Self::q)?;

        Ok(Application {
            id: row.try_get("id").map_err(Self::q)?,
            user_id: row.try_get("user_id").map_err(Self::q)?,
            status: ApplicationStatus::parse(&status)
                .ok_or_else(|| StoreError::CorruptRow(format!("unknown status '{status}'")))?,
            certification_type: CertificationType::parse(&cert_type).ok_or_else(|| {
                StoreError::CorruptRow(format!("unknown certification_type '{cert_type}'"))
            })?,
            notes: row.try_get("notes").map_err(Self::q)?,
            created_at: row.try_get("created_at").map_err(Self::q)?,
            updated_at: row.try_get("updated_at").map_err(Self::q)?,
        })
    }

    fn row_to_document(row: &PgRow) -> Result<Document, StoreError> {
        let doc_type: String = row.try_get("document_type").map_err(Self::q)?;
        let ocr_status: String = row.try_get("ocr_status").map_err(Self::q)?;
        let extraction: Option<serde_json::Value> = row.try_get("extraction").map_err(Self::q)?;
        let extraction: Option<ExtractionMetadata> = match extraction {
            Some(v) => Some(
                serde_json::from_value(v)
                    .map_err(|e| StoreError::CorruptRow(format!("extraction column: {e}")))?,
            ),
            None => None,
        };

        Ok(Document {
            id: row.try_get("id").map_err(Self::q)?,
            application_id: row.try_get("application_id").map_err(Self::q)?,
            document_type: DocumentType::parse(&doc_type).ok_or_else(|| {
                StoreError::CorruptRow(format!("unknown document_type '{doc_type}'"))
            })?,
            file_name: row.try_get("file_name").map_err(Self::q)?,
            file_size: row.try_get("file_size").map_err(Self::q)?,
            mime_type: row.try_get("mime_type").map_err(Self::q)?,
            storage_path: row.try_get("storage_path").map_err(Self::q)?,
            ocr_status: OcrStatus::parse(&ocr_status).ok_or_else(|| {
                StoreError::CorruptRow(format!("unknown ocr_status '{ocr_status}'"))
            })?,
            extraction,
            needs_audit: row.try_get("needs_audit").map_err(Self::q)?,
            audit_reason: row.try_get("audit_reason").map_err(Self::q)?,
            audit_requested_at: row.try_get("audit_requested_at").map_err(Self::q)?,
            created_at: row.try_get("created_at").map_err(Self::q)?,
        })
    }

    fn row_to_field(row: &PgRow) -> Result<ModuleField, StoreError> {
        let module: String = row.try_get("module").map_err(Self::q)?;
        let data_source: String = row.try_get("data_source").map_err(Self::q)?;
        let audit_reason: Option<String> = row.try_get("audit_reason").map_err(Self::q)?;
        let audit_requested_at: Option<DateTime<Utc>> =
            row.try_get("audit_requested_at").map_err(Self::q)?;

        let audit_flag = match (audit_reason, audit_requested_at) {
            (Some(reason), Some(requested_at)) => Some(AuditFlag {
                reason,
                requested_at,
            }),
            _ => None,
        };

        Ok(ModuleField {
            id: row.try_get("id").map_err(Self::q)?,
            application_id: row.try_get("application_id").map_err(Self::q)?,
            module: CertModule::parse(&module)
                .ok_or_else(|| StoreError::CorruptRow(format!("unknown module '{module}'")))?,
            field_id: row.try_get("field_id").map_err(Self::q)?,
            value: row.try_get("value").map_err(Self::q)?,
            data_source: DataSource::parse(&data_source).ok_or_else(|| {
                StoreError::CorruptRow(format!("unknown data_source '{data_source}'"))
            })?,
            confidence: row.try_get("confidence").map_err(Self::q)?,
            audit_flag,
            updated_at: row.try_get("updated_at").map_err(Self::q)?,
        })
    }
}

#[async_trait]
impl Store for PgStore {
    // ── Sessions ──────────────────────────────────────────────────────────

    async fn create_session(
        &self,
        user_id: Uuid,
        title: &str,
        application_id: Option<Uuid>,
        workflow_mode: Option<WorkflowMode>,
    ) -> Result<Session, StoreError> {
        let row = sqlx::query(
            r#"
            INSERT INTO sessions (user_id, title, application_id, workflow_mode)
            VALUES ($1, $2, $3, $4)
            RETURNING id, user_id, application_id, workflow_mode, title, created_at, updated_at
            "#,
        )
        .bind(user_id)
        .bind(title)
        .bind(application_id)
        .bind(workflow_mode.map(|m| m.as_str()))
        .fetch_one(&self.pool)
        .await
        .map_err(Self::q)?;

        Self::row_to_session(&row)
    }

    async fn get_session(&self, id: Uuid) -> Result<Option<Session>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT id, user_id, application_id, workflow_mode, title, created_at, updated_at
            FROM sessions
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Self::q)?;

        row.as_ref().map(Self::row_to_session).transpose()
    }

    async fn list_sessions(
        &self,
        user_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<SessionPage, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, user_id, application_id, workflow_mode, title, created_at, updated_at
            FROM sessions
            WHERE user_id = $1
            ORDER BY updated_at DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(user_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(Self::q)?;

        let sessions = rows
            .iter()
            .map(Self::row_to_session)
            .collect::<Result<Vec<_>, _>>()?;

        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sessions WHERE user_id = $1")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await
            .map_err(Self::q)?;

        Ok(SessionPage { sessions, total })
    }

    async fn update_session(
        &self,
        id: Uuid,
        title: Option<&str>,
        workflow_mode: Option<WorkflowMode>,
    ) -> Result<Option<Session>, StoreError> {
        let row = sqlx::query(
            r#"
            UPDATE sessions
            SET title = COALESCE($2, title),
                workflow_mode = COALESCE($3, workflow_mode),
                updated_at = now()
            WHERE id = $1
            RETURNING id, user_id, application_id, workflow_mode, title, created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(title)
        .bind(workflow_mode.map(|m| m.as_str()))
        .fetch_optional(&self.pool)
        .await
        .map_err(Self::q)?;

        row.as_ref().map(Self::row_to_session).transpose()
    }

    async fn delete_session(&self, id: Uuid) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM sessions WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(Self::q)?;
        Ok(result.rows_affected() > 0)
    }

    // ── Messages ──────────────────────────────────────────────────────────

    async fn append_message(
        &self,
        session_id: Uuid,
        role: &str,
        content: &str,
    ) -> Result<Uuid, StoreError> {
        let id: Uuid = sqlx::query_scalar(
            r#"
            INSERT INTO messages (session_id, role, content)
            VALUES ($1, $2, $3)
            RETURNING id
            "#,
        )
        .bind(session_id)
        .bind(role)
        .bind(content)
        .fetch_one(&self.pool)
        .await
        .map_err(Self::q)?;

        // Session activity bumps its updated_at
        sqlx::query("UPDATE sessions SET updated_at = now() WHERE id = $1")
            .bind(session_id)
            .execute(&self.pool)
            .await
            .map_err(Self::q)?;

        Ok(id)
    }

    async fn list_messages(
        &self,
        session_id: Uuid,
        limit: i64,
    ) -> Result<Vec<StoredMessage>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, session_id, role, content, created_at
            FROM messages
            WHERE session_id = $1
            ORDER BY created_at ASC
            LIMIT $2
            "#,
        )
        .bind(session_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(Self::q)?;

        rows.iter().map(Self::row_to_message).collect()
    }

    async fn update_message(&self, message_id: Uuid, content: &str) -> Result<bool, StoreError> {
        let result = sqlx::query("UPDATE messages SET content = $2 WHERE id = $1")
            .bind(message_id)
            .bind(content)
            .execute(&self.pool)
            .await
            .map_err(Self::q)?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_messages_after(
        &self,
        session_id: Uuid,
        message_id: Uuid,
    ) -> Result<u64, StoreError> {
        let anchor: Option<DateTime<Utc>> = sqlx::query_scalar(
            "SELECT created_at FROM messages WHERE id = $1 AND session_id = $2",
        )
        .bind(message_id)
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Self::q)?;

        let Some(anchor) = anchor else {
            return Ok(0);
        };

        let result =
            sqlx::query("DELETE FROM messages WHERE session_id = $1 AND created_at > $2")
                .bind(session_id)
                .bind(anchor)
                .execute(&self.pool)
                .await
                .map_err(Self::q)?;

        Ok(result.rows_affected())
    }

    // ── Applications ──────────────────────────────────────────────────────

    async fn create_application(
        &self,
        user_id: Uuid,
        certification_type: CertificationType,
        notes: Option<&str>,
    ) -> Result<Application, StoreError> {
        let row = sqlx::query(
            r#"
            INSERT INTO applications (user_id, status, certification_type, notes)
            VALUES ($1, 'draft', $2, $3)
            RETURNING id, user_id, status, certification_type, notes, created_at, updated_at
            "#,
        )
        .bind(user_id)
        .bind(certification_type.as_str())
        .bind(notes)
        .fetch_one(&self.pool)
        .await
        .map_err(Self::q)?;

        Self::row_to_application(&row)
    }

    async fn get_application(&self, id: Uuid) -> Result<Option<Application>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT id, user_id, status, certification_type, notes, created_at, updated_at
            FROM applications
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Self::q)?;

        row.as_ref().map(Self::row_to_application).transpose()
    }

    async fn touch_application(&self, id: Uuid) -> Result<(), StoreError> {
        sqlx::query("UPDATE applications SET updated_at = now() WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(Self::q)?;
        Ok(())
    }

    async fn append_application_note(&self, id: Uuid, note: &str) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE applications
            SET notes = COALESCE(notes, '') || $2, updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(note)
        .execute(&self.pool)
        .await
        .map_err(Self::q)?;
        Ok(())
    }

    async fn approve_application(&self, id: Uuid) -> Result<bool, StoreError> {
        // Guarded transition: a concurrent second certify loses the race
        let result = sqlx::query(
            r#"
            UPDATE applications
            SET status = 'approved', updated_at = now()
            WHERE id = $1 AND status NOT IN ('approved', 'rejected')
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(Self::q)?;

        Ok(result.rows_affected() > 0)
    }

    // ── Documents ─────────────────────────────────────────────────────────

    async fn list_documents(&self, application_id: Uuid) -> Result<Vec<Document>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, application_id, document_type, file_name, file_size, mime_type,
                   storage_path, ocr_status, extraction, needs_audit, audit_reason,
                   audit_requested_at, created_at
            FROM documents
            WHERE application_id = $1
            ORDER BY created_at DESC
            "#,
        )
        .bind(application_id)
        .fetch_all(&self.pool)
        .await
        .map_err(Self::q)?;

        rows.iter().map(Self::row_to_document).collect()
    }

    async fn get_document(&self, id: Uuid) -> Result<Option<Document>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT id, application_id, document_type, file_name, file_size, mime_type,
                   storage_path, ocr_status, extraction, needs_audit, audit_reason,
                   audit_requested_at, created_at
            FROM documents
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Self::q)?;

        row.as_ref().map(Self::row_to_document).transpose()
    }

    async fn set_document_status(&self, id: Uuid, status: OcrStatus) -> Result<(), StoreError> {
        sqlx::query("UPDATE documents SET ocr_status = $2 WHERE id = $1")
            .bind(id)
            .bind(status.as_str())
            .execute(&self.pool)
            .await
            .map_err(Self::q)?;
        Ok(())
    }

    async fn flag_document_for_audit(
        &self,
        id: Uuid,
        reason: &str,
        at: DateTime<Utc>,
    ) -> Result<OcrStatus, StoreError> {
        let status: String = sqlx::query_scalar(
            r#"
            UPDATE documents
            SET needs_audit = TRUE,
                audit_reason = $2,
                audit_requested_at = $3,
                ocr_status = CASE
                    WHEN ocr_status = 'completed' THEN 'audited'
                    ELSE ocr_status
                END
            WHERE id = $1
            RETURNING ocr_status
            "#,
        )
        .bind(id)
        .bind(reason)
        .bind(at)
        .fetch_one(&self.pool)
        .await
        .map_err(Self::q)?;

        OcrStatus::parse(&status)
            .ok_or_else(|| StoreError::CorruptRow(format!("unknown ocr_status '{status}'")))
    }

    // ── Module fields ─────────────────────────────────────────────────────

    async fn list_module_fields(
        &self,
        application_id: Uuid,
    ) -> Result<Vec<ModuleField>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, application_id, module, field_id, value, data_source, confidence,
                   audit_reason, audit_requested_at, updated_at
            FROM module_fields
            WHERE application_id = $1
            ORDER BY module, field_id
            "#,
        )
        .bind(application_id)
        .fetch_all(&self.pool)
        .await
        .map_err(Self::q)?;

        rows.iter().map(Self::row_to_field).collect()
    }

    async fn get_module_field(
        &self,
        application_id: Uuid,
        module: CertModule,
        field_id: &str,
    ) -> Result<Option<ModuleField>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT id, application_id, module, field_id, value, data_source, confidence,
                   audit_reason, audit_requested_at, updated_at
            FROM module_fields
            WHERE application_id = $1 AND module = $2 AND field_id = $3
            "#,
        )
        .bind(application_id)
        .bind(module.name())
        .bind(field_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Self::q)?;

        row.as_ref().map(Self::row_to_field).transpose()
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
        sqlx::query(
            r#"
            INSERT INTO module_fields (application_id, module, field_id, value, data_source, confidence)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (application_id, module, field_id)
            DO UPDATE SET value = EXCLUDED.value,
                          data_source = EXCLUDED.data_source,
                          confidence = EXCLUDED.confidence,
                          updated_at = now()
            "#,
        )
        .bind(application_id)
        .bind(module.name())
        .bind(field_id)
        .bind(value)
        .bind(data_source.as_str())
        .bind(confidence)
        .execute(&self.pool)
        .await
        .map_err(Self::q)?;
        Ok(())
    }

    async fn flag_field_for_audit(
        &self,
        application_id: Uuid,
        field_id: &str,
        reason: &str,
        at: DateTime<Utc>,
    ) -> Result<Option<CertModule>, StoreError> {
        let module: Option<String> = sqlx::query_scalar(
            r#"
            UPDATE module_fields
            SET audit_reason = $3, audit_requested_at = $4, updated_at = now()
            WHERE application_id = $1 AND field_id = $2
            RETURNING module
            "#,
        )
        .bind(application_id)
        .bind(field_id)
        .bind(reason)
        .bind(at)
        .fetch_optional(&self.pool)
        .await
        .map_err(Self::q)?;

        match module {
            Some(m) => CertModule::parse(&m)
                .map(Some)
                .ok_or_else(|| StoreError::CorruptRow(format!("unknown module '{m}'"))),
            None => Ok(None),
        }
    }

    async fn count_flagged_fields(&self, application_id: Uuid) -> Result<i64, StoreError> {
        sqlx::query_scalar(
            "SELECT COUNT(*) FROM module_fields WHERE application_id = $1 AND audit_reason IS NOT NULL",
        )
        .bind(application_id)
        .fetch_one(&self.pool)
        .await
        .map_err(Self::q)
    }

    async fn modules_with_data(
        &self,
        application_id: Uuid,
    ) -> Result<Vec<CertModule>, StoreError> {
        let rows: Vec<String> = sqlx::query_scalar(
            "SELECT DISTINCT module FROM module_fields WHERE application_id = $1 ORDER BY module",
        )
        .bind(application_id)
        .fetch_all(&self.pool)
        .await
        .map_err(Self::q)?;

        rows.iter()
            .map(|m| {
                CertModule::parse(m)
                    .ok_or_else(|| StoreError::CorruptRow(format!("unknown module '{m}'")))
            })
            .collect()
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
        sqlx::query(
            r#"
            INSERT INTO audit_trail (application_id, user_id, action, field_ref, new_value)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(application_id)
        .bind(user_id)
        .bind(action)
        .bind(field_ref)
        .bind(new_value)
        .execute(&self.pool)
        .await
        .map_err(Self::q)?;
        Ok(())
    }

    // ── Users ─────────────────────────────────────────────────────────────

    async fn find_user_by_email(&self, email: &str) -> Result<Option<UserAccount>, StoreError> {
        let row = sqlx::query("SELECT id, email, name FROM users WHERE email = $1")
            .bind(email)
            .fetch_optional(&self.pool)
            .await
            .map_err(Self::q)?;

        row.map(|r| {
            Ok(UserAccount {
                id: r.try_get("id").map_err(Self::q)?,
                email: r.try_get("email").map_err(Self::q)?,
                name: r.try_get("name").map_err(Self::q)?,
            })
        })
        .transpose()
    }
}
