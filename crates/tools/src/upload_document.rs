//! `upload_document` — negotiate a document upload with the user.
//!
//! No file transfer happens here: the tool validates the document type and
//! application access, then returns a UI directive that opens the upload
//! zone with type-specific guidance. The actual upload and OCR run through
//! the frontend and the external document pipeline.

use crate::access::{refuse_if_locked, resolve_application, AppAccess};
use agrocert_core::application::DocumentType;
use agrocert_core::error::ToolError;
use agrocert_core::store::Store;
use agrocert_core::tool::{SessionContext, Tool, ToolOutcome};
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

pub struct UploadDocumentTool {
    store: Arc<dyn Store>,
}

impl UploadDocumentTool {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }
}

/// Default user guidance per document type.
fn default_instructions(document_type: DocumentType) -> &'static str {
    match document_type {
        DocumentType::FinancialStatement => {
            "Please upload your most recent annual or quarterly financial statement. \
             Include all pages showing assets, liabilities, income, and expenses."
        }
        DocumentType::TaxReturn => {
            "Please upload your complete federal tax return from the most recent year. \
             Include all schedules and supporting documents."
        }
        DocumentType::BankStatement => {
            "Please upload bank statements from the last 3-6 months. Include all pages \
             showing transactions and account balances."
        }
        DocumentType::LandDeed => {
            "Please upload property deeds or ownership documents for all land included \
             in this application."
        }
        DocumentType::InsuranceCertificate => {
            "Please upload current insurance certificates showing adequate coverage for \
             your operations."
        }
        DocumentType::BusinessLicense => {
            "Please upload your current business registration, license, or incorporation \
             documents."
        }
        DocumentType::EnvironmentalPermit => {
            "Please upload any required environmental permits, compliance certificates, \
             or inspection reports."
        }
        DocumentType::ComplianceCertificate => {
            "Please upload relevant compliance certificates, audit reports, or \
             certification documents."
        }
        DocumentType::Other => {
            "Please upload the requested document. Ensure all pages are clear and readable."
        }
    }
}

#[derive(Debug, Deserialize)]
struct Input {
    document_type: String,
    #[serde(default)]
    application_id: Option<Uuid>,
    #[serde(default)]
    instructions: Option<String>,
}

#[async_trait]
impl Tool for UploadDocumentTool {
    fn name(&self) -> &str {
        "upload_document"
    }

    fn description(&self) -> &str {
        "Request a document upload from the user for their certification application. \
         This does not transfer any file itself — it opens the upload interface in the \
         UI with instructions specific to the requested document type. Use it when a \
         document is needed to proceed, or when the user says they have one ready. The \
         uploaded file is processed with OCR afterwards and its extracted data becomes \
         available to other tools."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        let types: Vec<&str> = DocumentType::ALL.iter().map(|t| t.as_str()).collect();
        serde_json::json!({
            "type": "object",
            "properties": {
                "document_type": {
                    "type": "string",
                    "description": format!(
                        "Type of document being requested. Must be one of: {}.",
                        types.join(", ")
                    ),
                    "enum": types,
                },
                "application_id": {
                    "type": "string",
                    "description": "UUID of the application to attach the document to. If not provided, uses the application linked to the current session."
                },
                "instructions": {
                    "type": "string",
                    "description": "Optional specific instructions for the user about what the document should contain."
                }
            },
            "required": ["document_type"]
        })
    }

    async fn execute(
        &self,
        input: serde_json::Value,
        ctx: &SessionContext,
    ) -> Result<ToolOutcome, ToolError> {
        let input: Input = serde_json::from_value(input)
            .map_err(|e| ToolError::InvalidArguments(e.to_string()))?;

        let Some(document_type) = DocumentType::parse(&input.document_type) else {
            let valid: Vec<&str> = DocumentType::ALL.iter().map(|t| t.as_str()).collect();
            return Ok(ToolOutcome::rejected(
                "invalid_document_type",
                format!(
                    "Document type must be one of: {}. Got: {}",
                    valid.join(", "),
                    input.document_type
                ),
            ));
        };

        let application =
            match resolve_application(self.store.as_ref(), ctx, input.application_id).await? {
                AppAccess::Granted(app) => app,
                AppAccess::Refused(outcome) => return Ok(outcome),
            };

        if let Some(locked) = refuse_if_locked(&application) {
            return Ok(locked);
        }

        let instructions = input
            .instructions
            .unwrap_or_else(|| default_instructions(document_type).to_string());
        let display_type = document_type.display_name();

        Ok(ToolOutcome::success(serde_json::json!({
            "upload_requested": true,
            "document_type": document_type,
            "application_id": application.id,
            "instructions": instructions,
            "ui_action": "trigger_upload_zone",
            "ui_params": {
                "document_type": document_type,
                "application_id": application.id,
                "accept": ".pdf,.jpg,.jpeg,.png,.doc,.docx",
            },
            "message": format!("Please upload your {display_type}. {instructions}"),
        })))
    }
}
