//! `update_module` — upsert one field in one of the five certification
//! modules.
//!
//! Handler-driven writes represent a human/agent assertion, so confidence
//! is pinned to 1.0 and provenance is `proxy_entered` for a first write or
//! `proxy_edited` for an overwrite.

use crate::access::{refuse_if_locked, resolve_application, AppAccess};
use agrocert_core::application::{CertModule, DataSource};
use agrocert_core::error::ToolError;
use agrocert_core::store::Store;
use agrocert_core::tool::{SessionContext, Tool, ToolOutcome};
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

pub struct UpdateModuleTool {
    store: Arc<dyn Store>,
}

impl UpdateModuleTool {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }
}

#[derive(Debug, Deserialize)]
struct Input {
    module_number: i64,
    field_id: String,
    value: String,
    #[serde(default)]
    application_id: Option<Uuid>,
}

#[async_trait]
impl Tool for UpdateModuleTool {
    fn name(&self) -> &str {
        "update_module"
    }

    fn description(&self) -> &str {
        "Update a single field value in one of the five certification modules: \
         1=Financial, 2=Compliance, 3=Operations, 4=Sustainability, 5=Risk. Use this \
         when the user provides or corrects a value for a specific field. The write is \
         recorded with full confidence and provenance (proxy_entered for new fields, \
         proxy_edited for overwrites). This does not validate module completeness — \
         use query_application for that."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "module_number": {
                    "type": "integer",
                    "description": "Module number to update (1-5). 1=Financial, 2=Compliance, 3=Operations, 4=Sustainability, 5=Risk",
                    "minimum": 1,
                    "maximum": 5
                },
                "field_id": {
                    "type": "string",
                    "description": "Field identifier to update, e.g. 'total_revenue' or 'tax_year'."
                },
                "value": {
                    "type": "string",
                    "description": "The new value. All values are stored as strings."
                },
                "application_id": {
                    "type": "string",
                    "description": "UUID of the application. If not provided, uses the application linked to the current session."
                }
            },
            "required": ["module_number", "field_id", "value"]
        })
    }

    async fn execute(
        &self,
        input: serde_json::Value,
        ctx: &SessionContext,
    ) -> Result<ToolOutcome, ToolError> {
        let input: Input = serde_json::from_value(input)
            .map_err(|e| ToolError::InvalidArguments(e.to_string()))?;

        // Module range is validated before any lookup
        let Some(module) = CertModule::from_number(input.module_number) else {
            return Ok(ToolOutcome::rejected(
                "invalid_module",
                format!(
                    "Module number must be between 1 and 5. Got: {}",
                    input.module_number
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

        let existing = self
            .store
            .get_module_field(application.id, module, &input.field_id)
            .await?;

        let (data_source, old_value) = match &existing {
            Some(field) => (DataSource::ProxyEdited, Some(field.value.clone())),
            None => (DataSource::ProxyEntered, None),
        };

        self.store
            .upsert_module_field(
                application.id,
                module,
                &input.field_id,
                &input.value,
                data_source,
                1.0,
            )
            .await?;
        self.store.touch_application(application.id).await?;

        let verb = if old_value.is_some() { "updated" } else { "created" };
        Ok(ToolOutcome::success(serde_json::json!({
            "field_id": input.field_id,
            "module_name": module.name(),
            "module_number": module.number(),
            "old_value": old_value,
            "new_value": input.value,
            "data_source": data_source,
            "message": format!(
                "Successfully {verb} field '{}' in {} module (Module {}).",
                input.field_id,
                module.name(),
                module.number()
            ),
        })))
    }
}
