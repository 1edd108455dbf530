//! Shared fixtures for tool tests.

use agrocert_core::application::{CertificationType, Document, DocumentType, OcrStatus};
use agrocert_core::store::Store;
use agrocert_store::MemStore;
use chrono::Utc;
use uuid::Uuid;

/// Create a user with a draft application; returns (user_id, application_id).
pub(crate) async fn seeded_application(store: &MemStore) -> (Uuid, Uuid) {
    let user_id = store.insert_user("farmer@example.com", Some("Jane Roe")).await;
    let app = store
        .create_application(user_id, CertificationType::Standard, None)
        .await
        .unwrap();
    (user_id, app.id)
}

/// Insert a document with the given OCR status; returns its id.
pub(crate) async fn seeded_document(
    store: &MemStore,
    application_id: Uuid,
    status: OcrStatus,
) -> Uuid {
    store
        .insert_document(Document {
            id: Uuid::new_v4(),
            application_id,
            document_type: DocumentType::TaxReturn,
            file_name: "tax_return_2024.pdf".into(),
            file_size: 204_800,
            mime_type: "application/pdf".into(),
            storage_path: "/storage/tax_return_2024.pdf".into(),
            ocr_status: status,
            extraction: None,
            needs_audit: false,
            audit_reason: None,
            audit_requested_at: None,
            created_at: Utc::now(),
        })
        .await
}
