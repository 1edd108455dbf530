//! `query_application` — read-only aggregate view of an application:
//! header, documents with OCR status, module fields grouped by module, and
//! a completion percentage over the five required modules.

use crate::access::{resolve_application, AppAccess};
use agrocert_core::application::CertModule;
use agrocert_core::error::ToolError;
use agrocert_core::store::Store;
use agrocert_core::tool::{SessionContext, Tool, ToolOutcome};
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

pub struct QueryApplicationTool {
    store: Arc<dyn Store>,
}

impl QueryApplicationTool {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }
}

#[derive(Debug, Deserialize)]
struct Input {
    #[serde(default)]
    application_id: Option<Uuid>,
}

#[async_trait]
impl Tool for QueryApplicationTool {
    fn name(&self) -> &str {
        "query_application"
    }

    fn description(&self) -> &str {
        "Get detailed information about a certification application: current status, \
         uploaded documents with their processing state, module data entries, and the \
         overall completion percentage across the five required modules. Use this when \
         the user asks about application status, uploaded documents, or which modules \
         still need data. Falls back to the application linked to the current session \
         when no application_id is given."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "application_id": {
                    "type": "string",
                    "description": "UUID of the application to query. If not provided, uses the application linked to the current session."
                }
            },
            "required": []
        })
    }

    async fn execute(
        &self,
        input: serde_json::Value,
        ctx: &SessionContext,
    ) -> Result<ToolOutcome, ToolError> {
        let input: Input = serde_json::from_value(input)
            .map_err(|e| ToolError::InvalidArguments(e.to_string()))?;

        let application =
            match resolve_application(self.store.as_ref(), ctx, input.application_id).await? {
                AppAccess::Granted(app) => app,
                AppAccess::Refused(outcome) => return Ok(outcome),
            };

        let documents = self.store.list_documents(application.id).await?;
        let fields = self.store.list_module_fields(application.id).await?;

        let document_views: Vec<serde_json::Value> = documents
            .iter()
            .map(|d| {
                serde_json::json!({
                    "id": d.id,
                    "file_name": d.file_name,
                    "file_size": d.file_size,
                    "mime_type": d.mime_type,
                    "document_type": d.document_type,
                    "ocr_status": d.ocr_status,
                    "has_extracted_data": d.extraction.is_some(),
                    "uploaded_at": d.created_at,
                })
            })
            .collect();

        // Group fields by module, preserving module order
        let mut modules: Vec<serde_json::Value> = Vec::new();
        let mut present: Vec<CertModule> = Vec::new();
        for module in CertModule::ALL {
            let module_fields: Vec<serde_json::Value> = fields
                .iter()
                .filter(|f| f.module == module)
                .map(|f| {
                    serde_json::json!({
                        "field_id": f.field_id,
                        "value": f.value,
                        "data_source": f.data_source,
                        "confidence_score": f.confidence,
                        "audit_flagged": f.audit_flag.is_some(),
                        "updated_at": f.updated_at,
                    })
                })
                .collect();

            if !module_fields.is_empty() {
                present.push(module);
                modules.push(serde_json::json!({
                    "module_name": module.name(),
                    "module_number": module.number(),
                    "field_count": module_fields.len(),
                    "fields": module_fields,
                }));
            }
        }

        let missing: Vec<&str> = CertModule::ALL
            .iter()
            .filter(|m| !present.contains(m))
            .map(|m| m.name())
            .collect();
        let completion_pct = (present.len() * 100) / CertModule::ALL.len();

        Ok(ToolOutcome::success(serde_json::json!({
            "application": {
                "id": application.id,
                "status": application.status,
                "certification_type": application.certification_type,
                "notes": application.notes,
                "created_at": application.created_at,
                "updated_at": application.updated_at,
            },
            "applicant": {
                "user_id": application.user_id,
            },
            "documents": document_views,
            "modules": modules,
            "completion": {
                "percentage": completion_pct,
                "required_modules": CertModule::ALL.iter().map(|m| m.name()).collect::<Vec<_>>(),
                "completed_modules": present.iter().map(|m| m.name()).collect::<Vec<_>>(),
                "missing_modules": missing,
            },
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
    async fn aggregates_documents_and_modules() {
        let store = Arc::new(MemStore::new());
        let (user_id, app_id) = seeded_application(&store).await;
        seeded_document(&store, app_id, OcrStatus::Completed).await;

        for (module, field) in [
            (CertModule::Financial, "total_revenue"),
            (CertModule::Compliance, "license_number"),
        ] {
            store
                .upsert_module_field(app_id, module, field, "x", DataSource::ProxyEntered, 1.0)
                .await
                .unwrap();
        }

        let tool = QueryApplicationTool::new(store);
        let outcome = tool
            .execute(serde_json::json!({}), &ctx(user_id, app_id))
            .await
            .unwrap();

        let payload = outcome.into_payload();
        assert_eq!(payload["documents"].as_array().unwrap().len(), 1);
        assert_eq!(payload["completion"]["percentage"], 40);
        assert_eq!(
            payload["completion"]["missing_modules"],
            serde_json::json!(["operations", "sustainability", "risk"])
        );
        assert_eq!(payload["modules"][0]["module_name"], "financial");
    }

    #[tokio::test]
    async fn zero_modules_is_zero_percent() {
        let store = Arc::new(MemStore::new());
        let (user_id, app_id) = seeded_application(&store).await;

        let tool = QueryApplicationTool::new(store);
        let outcome = tool
            .execute(serde_json::json!({}), &ctx(user_id, app_id))
            .await
            .unwrap();

        let payload = outcome.into_payload();
        assert_eq!(payload["completion"]["percentage"], 0);
        assert_eq!(
            payload["completion"]["missing_modules"]
                .as_array()
                .unwrap()
                .len(),
            5
        );
    }

    #[tokio::test]
    async fn unknown_application_not_found() {
        let store = Arc::new(MemStore::new());
        let tool = QueryApplicationTool::new(store);

        let outcome = tool
            .execute(
                serde_json::json!({"application_id": Uuid::new_v4()}),
                &SessionContext::default(),
            )
            .await
            .unwrap();

        assert_eq!(outcome.into_payload()["error"], "application_not_found");
    }

    #[tokio::test]
    async fn reads_allowed_on_locked_application() {
        let store = Arc::new(MemStore::new());
        let (user_id, app_id) = seeded_application(&store).await;
        store
            .set_application_status(app_id, agrocert_core::application::ApplicationStatus::Approved)
            .await;

        let tool = QueryApplicationTool::new(store);
        let outcome = tool
            .execute(serde_json::json!({}), &ctx(user_id, app_id))
            .await
            .unwrap();
        assert!(outcome.is_success());
    }
}
