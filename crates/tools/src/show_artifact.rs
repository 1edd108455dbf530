//! `show_artifact` — open a UI artifact panel for the user.
//!
//! Read-only: validates the artifact kind, checks existence and ownership,
//! and returns a frontend directive with panel metadata. Never mutates
//! anything.

use crate::access::{resolve_application, AppAccess};
use agrocert_core::application::CertModule;
use agrocert_core::error::ToolError;
use agrocert_core::store::Store;
use agrocert_core::tool::{SessionContext, Tool, ToolOutcome};
use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

pub struct ShowArtifactTool {
    store: Arc<dyn Store>,
}

impl ShowArtifactTool {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }
}

const ARTIFACT_TYPES: [&str; 5] = [
    "document",
    "module_form",
    "extraction_preview",
    "application_summary",
    "audit_review",
];

#[derive(Debug, Deserialize)]
struct Input {
    artifact_type: String,
    artifact_id: String,
    #[serde(default)]
    application_id: Option<Uuid>,
}

impl ShowArtifactTool {
    /// Load a document and authorize through its parent application.
    async fn document_metadata(
        &self,
        artifact_id: &str,
        ctx: &SessionContext,
        preview: bool,
    ) -> Result<Result<serde_json::Value, ToolOutcome>, ToolError> {
        let Ok(document_id) = Uuid::parse_str(artifact_id) else {
            return Ok(Err(ToolOutcome::not_found(
                "document",
                format!("Document {artifact_id} not found."),
            )));
        };

        let Some(doc) = self.store.get_document(document_id).await? else {
            return Ok(Err(ToolOutcome::not_found(
                "document",
                format!("Document {document_id} not found."),
            )));
        };

        if let Some(user_id) = ctx.user_id {
            let owner = self
                .store
                .get_application(doc.application_id)
                .await?
                .map(|a| a.user_id);
            if owner != Some(user_id) {
                return Ok(Err(ToolOutcome::Unauthorized));
            }
        }

        let mut metadata = serde_json::json!({
            "document_id": doc.id,
            "application_id": doc.application_id,
            "document_type": doc.document_type,
            "extraction_status": doc.ocr_status,
            "storage_path": doc.storage_path,
        });

        if preview {
            let extracted = doc
                .extraction
                .as_ref()
                .map(|e| e.fields.len())
                .unwrap_or(0);
            metadata["extracted_fields_count"] = serde_json::json!(extracted);
            metadata["title"] = serde_json::json!(format!(
                "Extraction Preview: {}",
                doc.document_type.display_name()
            ));
        } else {
            metadata["title"] =
                serde_json::json!(format!("{} Document", doc.document_type.display_name()));
        }

        Ok(Ok(metadata))
    }
}

#[async_trait]
impl Tool for ShowArtifactTool {
    fn name(&self) -> &str {
        "show_artifact"
    }

    fn description(&self) -> &str {
        "Open an artifact panel in the UI to display content the user should see or \
         interact with: 'document' shows an uploaded file with OCR results, \
         'module_form' opens the interactive form for a module (artifact_id 1-5), \
         'extraction_preview' shows a document next to its extracted fields, \
         'application_summary' shows the complete application overview, and \
         'audit_review' lists the fields flagged for audit. Use this instead of \
         describing complex data in text."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "artifact_type": {
                    "type": "string",
                    "description": "Type of artifact to display.",
                    "enum": ARTIFACT_TYPES,
                },
                "artifact_id": {
                    "type": "string",
                    "description": "ID of the artifact. For 'document'/'extraction_preview': document UUID. For 'module_form': module number (1-5). For 'application_summary'/'audit_review': application UUID or 'current'."
                },
                "application_id": {
                    "type": "string",
                    "description": "Optional application UUID. Required for 'module_form' when no application is linked to the session."
                }
            },
            "required": ["artifact_type", "artifact_id"]
        })
    }

    async fn execute(
        &self,
        input: serde_json::Value,
        ctx: &SessionContext,
    ) -> Result<ToolOutcome, ToolError> {
        let input: Input = serde_json::from_value(input)
            .map_err(|e| ToolError::InvalidArguments(e.to_string()))?;

        if !ARTIFACT_TYPES.contains(&input.artifact_type.as_str()) {
            return Ok(ToolOutcome::rejected(
                "invalid_artifact_type",
                format!(
                    "Invalid artifact_type '{}'. Must be one of: {}",
                    input.artifact_type,
                    ARTIFACT_TYPES.join(", ")
                ),
            ));
        }

        let metadata = match input.artifact_type.as_str() {
            "document" | "extraction_preview" => {
                let preview = input.artifact_type == "extraction_preview";
                match self
                    .document_metadata(&input.artifact_id, ctx, preview)
                    .await?
                {
                    Ok(metadata) => metadata,
                    Err(outcome) => return Ok(outcome),
                }
            }

            "module_form" => {
                let module = input
                    .artifact_id
                    .trim()
                    .parse::<i64>()
                    .ok()
                    .and_then(CertModule::from_number);
                let Some(module) = module else {
                    return Ok(ToolOutcome::rejected(
                        "invalid_module_number",
                        format!(
                            "artifact_id for 'module_form' must be a module number 1-5. Got: {}",
                            input.artifact_id
                        ),
                    ));
                };

                let application =
                    match resolve_application(self.store.as_ref(), ctx, input.application_id)
                        .await?
                    {
                        AppAccess::Granted(app) => app,
                        AppAccess::Refused(outcome) => return Ok(outcome),
                    };

                serde_json::json!({
                    "module_number": module.number(),
                    "module_name": module.display_name(),
                    "application_id": application.id,
                    "application_status": application.status,
                    "title": format!("Module {}: {}", module.number(), module.display_name()),
                })
            }

            "application_summary" | "audit_review" => {
                let explicit = if input.artifact_id == "current" {
                    None
                } else {
                    match Uuid::parse_str(&input.artifact_id) {
                        Ok(id) => Some(id),
                        Err(_) => {
                            return Ok(ToolOutcome::not_found(
                                "application",
                                format!("Application {} not found.", input.artifact_id),
                            ));
                        }
                    }
                };

                let application =
                    match resolve_application(self.store.as_ref(), ctx, explicit).await? {
                        AppAccess::Granted(app) => app,
                        AppAccess::Refused(outcome) => return Ok(outcome),
                    };

                if input.artifact_type == "audit_review" {
                    let flagged = self.store.count_flagged_fields(application.id).await?;
                    serde_json::json!({
                        "application_id": application.id,
                        "flagged_fields_count": flagged,
                        "title": format!("Audit Review: {flagged} Field(s) Flagged"),
                    })
                } else {
                    serde_json::json!({
                        "application_id": application.id,
                        "status": application.status,
                        "certification_type": application.certification_type,
                        "created_at": application.created_at,
                        "title": format!(
                            "{} Certification Application",
                            application.certification_type.as_str()
                        ),
                    })
                }
            }

            _ => unreachable!("artifact_type validated above"),
        };

        Ok(ToolOutcome::success(serde_json::json!({
            "artifact_type": input.artifact_type,
            "artifact_id": input.artifact_id,
            "ui_action": "open_artifact_panel",
            "metadata": metadata,
            "message": format!(
                "Opening {} panel for user.",
                input.artifact_type.replace('_', " ")
            ),
            "timestamp": Utc::now(),
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{seeded_application, seeded_document};
    use agrocert_core::application::{DataSource, OcrStatus};
    use agrocert_store::MemStore;

    fn ctx(user_id: Uuid, app_id: Uuid) -> SessionContext {
        SessionContext {
            user_id: Some(user_id),
            application_id: Some(app_id),
        }
    }

    #[tokio::test]
    async fn document_panel() {
        let store = Arc::new(MemStore::new());
        let (user_id, app_id) = seeded_application(&store).await;
        let doc_id = seeded_document(&store, app_id, OcrStatus::Completed).await;

        let tool = ShowArtifactTool::new(store);
        let outcome = tool
            .execute(
                serde_json::json!({
                    "artifact_type": "document",
                    "artifact_id": doc_id.to_string()
                }),
                &ctx(user_id, app_id),
            )
            .await
            .unwrap();

        assert!(outcome.is_success());
        let payload = outcome.into_payload();
        assert_eq!(payload["ui_action"], "open_artifact_panel");
        assert_eq!(payload["metadata"]["extraction_status"], "completed");
        assert!(payload["metadata"]["title"]
            .as_str()
            .unwrap()
            .contains("Tax Return"));
    }

    #[tokio::test]
    async fn module_form_validates_number() {
        let store = Arc::new(MemStore::new());
        let (user_id, app_id) = seeded_application(&store).await;

        let tool = ShowArtifactTool::new(store);
        let session = ctx(user_id, app_id);

        let outcome = tool
            .execute(
                serde_json::json!({
                    "artifact_type": "module_form",
                    "artifact_id": "3"
                }),
                &session,
            )
            .await
            .unwrap();
        let payload = outcome.into_payload();
        assert_eq!(payload["metadata"]["module_name"], "Operations Data");

        let outcome = tool
            .execute(
                serde_json::json!({
                    "artifact_type": "module_form",
                    "artifact_id": "7"
                }),
                &session,
            )
            .await
            .unwrap();
        assert_eq!(outcome.into_payload()["error"], "invalid_module_number");
    }

    #[tokio::test]
    async fn audit_review_counts_flags() {
        let store = Arc::new(MemStore::new());
        let (user_id, app_id) = seeded_application(&store).await;
        store
            .upsert_module_field(
                app_id,
                CertModule::Financial,
                "total_revenue",
                "1",
                DataSource::OcrExtracted,
                0.5,
            )
            .await
            .unwrap();
        store
            .flag_field_for_audit(app_id, "total_revenue", "check", Utc::now())
            .await
            .unwrap();

        let tool = ShowArtifactTool::new(store);
        let outcome = tool
            .execute(
                serde_json::json!({
                    "artifact_type": "audit_review",
                    "artifact_id": "current"
                }),
                &ctx(user_id, app_id),
            )
            .await
            .unwrap();

        let payload = outcome.into_payload();
        assert_eq!(payload["metadata"]["flagged_fields_count"], 1);
    }

    #[tokio::test]
    async fn invalid_type_rejected() {
        let store = Arc::new(MemStore::new());
        let tool = ShowArtifactTool::new(store);

        let outcome = tool
            .execute(
                serde_json::json!({
                    "artifact_type": "hologram",
                    "artifact_id": "1"
                }),
                &SessionContext::default(),
            )
            .await
            .unwrap();

        assert_eq!(outcome.into_payload()["error"], "invalid_artifact_type");
    }

    #[tokio::test]
    async fn foreign_document_unauthorized() {
        let store = Arc::new(MemStore::new());
        let (_owner, app_id) = seeded_application(&store).await;
        let doc_id = seeded_document(&store, app_id, OcrStatus::Completed).await;

        let tool = ShowArtifactTool::new(store);
        let outcome = tool
            .execute(
                serde_json::json!({
                    "artifact_type": "document",
                    "artifact_id": doc_id.to_string()
                }),
                &SessionContext {
                    user_id: Some(Uuid::new_v4()),
                    application_id: None,
                },
            )
            .await
            .unwrap();

        assert_eq!(outcome.into_payload()["error"], "unauthorized");
    }

    #[tokio::test]
    async fn application_summary_by_explicit_id() {
        let store = Arc::new(MemStore::new());
        let (user_id, app_id) = seeded_application(&store).await;

        let tool = ShowArtifactTool::new(store);
        let outcome = tool
            .execute(
                serde_json::json!({
                    "artifact_type": "application_summary",
                    "artifact_id": app_id.to_string()
                }),
                &SessionContext {
                    user_id: Some(user_id),
                    application_id: None,
                },
            )
            .await
            .unwrap();

        let payload = outcome.into_payload();
        assert_eq!(payload["metadata"]["status"], "draft");
        assert!(payload["metadata"]["title"]
            .as_str()
            .unwrap()
            .contains("Certification Application"));
    }
}
