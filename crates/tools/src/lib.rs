//! Certification workflow tools for the AgroCert agent.
//!
//! Each tool is one schema-described function the model can request
//! mid-conversation: read an application, create one, negotiate a document
//! upload, trigger field extraction, edit module data, flag items for human
//! audit, certify, or open a UI artifact panel.
//!
//! Tools hold their store dependency explicitly — there is no global client
//! state anywhere in the workspace.

pub mod access;
pub mod certify_application;
pub mod create_application;
pub mod extract_fields;
pub mod query_application;
pub mod request_audit;
pub mod show_artifact;
pub mod update_module;
pub mod upload_document;

#[cfg(test)]
pub(crate) mod testutil;

use agrocert_core::error::Result;
use agrocert_core::store::Store;
use agrocert_core::tool::ToolRegistry;
use std::sync::Arc;

/// Build the registry with all eight certification tools.
pub fn certification_registry(store: Arc<dyn Store>) -> Result<ToolRegistry> {
    let mut registry = ToolRegistry::new();
    registry.register(Box::new(query_application::QueryApplicationTool::new(
        store.clone(),
    )))?;
    registry.register(Box::new(create_application::CreateApplicationTool::new(
        store.clone(),
    )))?;
    registry.register(Box::new(upload_document::UploadDocumentTool::new(
        store.clone(),
    )))?;
    registry.register(Box::new(extract_fields::ExtractFieldsTool::new(
        store.clone(),
    )))?;
    registry.register(Box::new(update_module::UpdateModuleTool::new(
        store.clone(),
    )))?;
    registry.register(Box::new(request_audit::RequestAuditTool::new(
        store.clone(),
    )))?;
    registry.register(Box::new(certify_application::CertifyApplicationTool::new(
        store.clone(),
    )))?;
    registry.register(Box::new(show_artifact::ShowArtifactTool::new(store)))?;
    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use agrocert_store::MemStore;

    #[test]
    fn registry_contains_all_tools() {
        let store = Arc::new(MemStore::new());
        let registry = certification_registry(store).unwrap();
        assert_eq!(registry.len(), 8);

        let names = registry.names();
        for expected in [
            "certify_application",
            "create_application",
            "extract_fields",
            "query_application",
            "request_audit",
            "show_artifact",
            "update_module",
            "upload_document",
        ] {
            assert!(names.contains(&expected), "missing tool: {expected}");
        }
    }

    #[test]
    fn definitions_are_object_schemas() {
        let store = Arc::new(MemStore::new());
        let registry = certification_registry(store).unwrap();
        for def in registry.definitions() {
            assert_eq!(
                def.input_schema["type"], "object",
                "tool {} schema must be an object",
                def.name
            );
            assert!(!def.description.is_empty());
        }
    }
}
