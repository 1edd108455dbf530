//! `request_audit` — flag fields or documents for manual human review.
//!
//! Flagging is additive: a field keeps its value and gains an audit-flag
//! attribute; a document gains audit metadata and is escalated to `audited`
//! only from `completed`. One audit-trail row is appended per call,
//! recording all flagged field ids together.

use crate::access::{refuse_if_locked, resolve_application, AppAccess};
use agrocert_core::error::ToolError;
use agrocert_core::store::Store;
use agrocert_core::tool::{SessionContext, Tool, ToolOutcome};
use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

pub struct RequestAuditTool {
    store: Arc<dyn Store>,
}

impl RequestAuditTool {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }
}

#[derive(Debug, Deserialize)]
struct Input {
    reason: String,
    #[serde(default)]
    application_id: Option<Uuid>,
    #[serde(default)]
    document_id: Option<Uuid>,
    #[serde(default)]
    field_ids: Vec<String>,
}

#[async_trait]
impl Tool for RequestAuditTool {
    fn name(&self) -> &str {
        "request_audit"
    }

    fn description(&self) -> &str {
        "Flag fields or documents that require manual human audit review. Use this when \
         extraction confidence is low, data looks inconsistent or suspicious, or the \
         user explicitly asks for review. Specify a document_id, a list of field_ids, \
         or both, plus a specific reason. Flagged items appear in the auditor's queue \
         and block final certification until resolved."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "reason": {
                    "type": "string",
                    "description": "Required explanation of why manual review is needed. Be specific, e.g. 'Low OCR confidence (0.62) on critical financial field'."
                },
                "application_id": {
                    "type": "string",
                    "description": "UUID of the application containing the items. If not provided, uses the application linked to the current session."
                },
                "document_id": {
                    "type": "string",
                    "description": "Optional UUID of a document to flag for review."
                },
                "field_ids": {
                    "type": "array",
                    "description": "Field identifiers to flag, matching fields in module data.",
                    "items": { "type": "string" }
                }
            },
            "required": ["reason"]
        })
    }

    async fn execute(
        &self,
        input: serde_json::Value,
        ctx: &SessionContext,
    ) -> Result<ToolOutcome, ToolError> {
        let input: Input = serde_json::from_value(input)
            .map_err(|e| ToolError::InvalidArguments(e.to_string()))?;

        if input.reason.trim().is_empty() {
            return Ok(ToolOutcome::rejected(
                "reason_required",
                "A non-empty reason explaining why review is needed is required.",
            ));
        }

        if input.document_id.is_none() && input.field_ids.is_empty() {
            return Ok(ToolOutcome::rejected(
                "no_targets_specified",
                "Must specify either document_id or field_ids (or both) to flag for audit.",
            ));
        }

        let application =
            match resolve_application(self.store.as_ref(), ctx, input.application_id).await? {
                AppAccess::Granted(app) => app,
                AppAccess::Refused(outcome) => return Ok(outcome),
            };

        if let Some(locked) = refuse_if_locked(&application) {
            return Ok(locked);
        }

        let requested_at = Utc::now();
        let mut flagged_fields: Vec<String> = Vec::new();
        let mut flagged_document = false;
        let mut details: Vec<String> = Vec::new();

        if let Some(document_id) = input.document_id {
            // The document must belong to this application
            let doc = self.store.get_document(document_id).await?;
            match doc {
                Some(doc) if doc.application_id == application.id => {
                    let status = self
                        .store
                        .flag_document_for_audit(document_id, &input.reason, requested_at)
                        .await?;
                    flagged_document = true;
                    details.push(format!(
                        "Document {} flagged (status now {status})",
                        doc.document_type
                    ));
                }
                _ => {
                    return Ok(ToolOutcome::not_found(
                        "document",
                        format!(
                            "Document {document_id} not found in application {}.",
                            application.id
                        ),
                    ));
                }
            }
        }

        for field_id in &input.field_ids {
            match self
                .store
                .flag_field_for_audit(application.id, field_id, &input.reason, requested_at)
                .await?
            {
                Some(module) => {
                    flagged_fields.push(field_id.clone());
                    details.push(format!("Field '{field_id}' in {} module flagged", module));
                }
                // Unknown field ids are skipped, not fatal
                None => {}
            }
        }

        // One audit-trail row per call, all field ids together
        if let Some(user_id) = ctx.user_id {
            let field_list = if flagged_fields.is_empty() {
                None
            } else {
                Some(flagged_fields.join(", "))
            };
            self.store
                .append_audit_entry(
                    application.id,
                    user_id,
                    "audit_requested",
                    field_list.as_deref(),
                    Some(&input.reason),
                )
                .await?;
        }

        self.store.touch_application(application.id).await?;

        Ok(ToolOutcome::success(serde_json::json!({
            "flagged_fields_count": flagged_fields.len(),
            "flagged_document": flagged_document,
            "reason": input.reason,
            "details": details,
            "message": format!(
                "Successfully flagged {} field(s) and {} document(s) for manual audit review. Reason: {}",
                flagged_fields.len(),
                if flagged_document { 1 } else { 0 },
                input.reason
            ),
        })))
    }
}
