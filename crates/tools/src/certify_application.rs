//! `certify_application` — the irreversible terminal transition.
//!
//! Requires explicit confirmation, then runs four independent validation
//! checks and reports every failure together, so the caller gets the
//! complete remediation list in one response. Only a fully clean
//! application is approved; the final status write is a guarded transition
//! so a concurrent second certification loses the race.

use crate::access::{resolve_application, AppAccess};
use agrocert_core::application::{CertModule, OcrStatus};
use agrocert_core::error::ToolError;
use agrocert_core::store::Store;
use agrocert_core::tool::{SessionContext, Tool, ToolOutcome};
use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

pub struct CertifyApplicationTool {
    store: Arc<dyn Store>,
}

impl CertifyApplicationTool {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }
}

#[derive(Debug, Deserialize)]
struct Input {
    certification_confirmed: bool,
    #[serde(default)]
    application_id: Option<Uuid>,
}

#[async_trait]
impl Tool for CertifyApplicationTool {
    fn name(&self) -> &str {
        "certify_application"
    }

    fn description(&self) -> &str {
        "Complete and lock a certification application for final approval. This is the \
         final, irreversible step: the application status becomes 'approved' and no \
         further edits are allowed. Before certifying, every document must be fully \
         processed, all five modules must have data, no field may carry an audit flag, \
         and at least one document must exist — all failing checks are reported \
         together. Only use this when the user explicitly confirms they are ready; \
         certification_confirmed must be true."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "certification_confirmed": {
                    "type": "boolean",
                    "description": "Required explicit confirmation that the user wants to certify and lock the application. Must be true to proceed."
                },
                "application_id": {
                    "type": "string",
                    "description": "UUID of the application to certify. If not provided, uses the application linked to the current session."
                }
            },
            "required": ["certification_confirmed"]
        })
    }

    async fn execute(
        &self,
        input: serde_json::Value,
        ctx: &SessionContext,
    ) -> Result<ToolOutcome, ToolError> {
        let input: Input = serde_json::from_value(input)
            .map_err(|e| ToolError::InvalidArguments(e.to_string()))?;

        // Confirmation gate fires before touching the database
        if !input.certification_confirmed {
            return Ok(ToolOutcome::rejected(
                "confirmation_required",
                "Certification requires explicit confirmation. Set \
                 certification_confirmed=true to proceed. This action is irreversible \
                 and will lock the application.",
            ));
        }

        let application =
            match resolve_application(self.store.as_ref(), ctx, input.application_id).await? {
                AppAccess::Granted(app) => app,
                AppAccess::Refused(outcome) => return Ok(outcome),
            };

        if application.status.is_terminal() {
            return Ok(ToolOutcome::rejected(
                "already_certified",
                format!(
                    "Application is already {} and cannot be re-certified.",
                    application.status
                ),
            ));
        }

        // Run every check and collect all failures — the caller needs the
        // complete remediation list, not just the first problem.
        let mut failures: Vec<String> = Vec::new();

        let documents = self.store.list_documents(application.id).await?;

        let count_status = |status: OcrStatus| -> usize {
            documents.iter().filter(|d| d.ocr_status == status).count()
        };
        let pending = count_status(OcrStatus::Pending);
        let processing = count_status(OcrStatus::Processing);
        let failed = count_status(OcrStatus::Failed);

        if pending > 0 {
            failures.push(format!("{pending} document(s) still pending processing"));
        }
        if processing > 0 {
            failures.push(format!("{processing} document(s) currently being processed"));
        }
        if failed > 0 {
            failures.push(format!("{failed} document(s) failed processing"));
        }

        let present = self.store.modules_with_data(application.id).await?;
        let missing: Vec<String> = CertModule::ALL
            .iter()
            .filter(|m| !present.contains(m))
            .map(|m| format!("Module {} ({})", m.number(), m.display_name()))
            .collect();
        if !missing.is_empty() {
            failures.push(format!("Missing required modules: {}", missing.join(", ")));
        }

        let flagged = self.store.count_flagged_fields(application.id).await?;
        if flagged > 0 {
            failures.push(format!(
                "{flagged} field(s) flagged for audit - must be reviewed before certification"
            ));
        }

        if documents.is_empty() {
            failures.push("No documents uploaded - at least one document is required".into());
        }

        if !failures.is_empty() {
            return Ok(ToolOutcome::ValidationFailed {
                message: "Application does not meet certification requirements. Please \
                          resolve the following issues:"
                    .into(),
                failures,
                application_id: application.id,
                current_status: application.status,
            });
        }

        // All checks passed — take the guarded terminal transition
        let certified_at = Utc::now();
        if !self.store.approve_application(application.id).await? {
            // A concurrent certification won the race
            return Ok(ToolOutcome::rejected(
                "already_certified",
                "Application was certified by a concurrent request and cannot be \
                 re-certified.",
            ));
        }

        self.store
            .append_application_note(
                application.id,
                &format!("\n\nCertified at: {}", certified_at.to_rfc3339()),
            )
            .await?;

        if let Some(user_id) = ctx.user_id {
            self.store
                .append_audit_entry(
                    application.id,
                    user_id,
                    "application_certified",
                    None,
                    Some(&format!(
                        "Application certified for {}",
                        application.certification_type
                    )),
                )
                .await?;
        }

        info!(application_id = %application.id, "Application certified and locked");

        let pdf_url = format!("/api/applications/{}/certificate.pdf", application.id);
        Ok(ToolOutcome::success(serde_json::json!({
            "application_id": application.id,
            "status": "approved",
            "certification_type": application.certification_type,
            "certified_at": certified_at,
            "pdf_url": pdf_url,
            "message": format!(
                "Application successfully certified and locked. Status: approved. \
                 Certificate PDF will be generated and available at {pdf_url}"
            ),
            "note": "This application is now locked and cannot be edited. It has entered the final review queue.",
        })))
    }
}
