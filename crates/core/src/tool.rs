//! Tool trait, tagged outcomes, and the execution registry.
//!
//! Tools are the schema-described functions the model can request
//! mid-conversation. The model sends arbitrary, occasionally malformed
//! arguments — the registry's job is to make sure no single bad tool call
//! can crash a conversation turn. Every failure mode is converted into a
//! uniform envelope the model can read and react to on its next turn.

use crate::application::ApplicationStatus;
use crate::error::{Error, ToolError};
use crate::provider::ToolDefinition;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Per-conversation context merged into every tool invocation.
///
/// Handlers fall back to these ids when explicit parameters are omitted.
/// An absent `user_id` means an unauthenticated / service-to-service call:
/// ownership checks are skipped entirely rather than failing closed.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct SessionContext {
    pub user_id: Option<Uuid>,
    pub application_id: Option<Uuid>,
}

impl SessionContext {
    /// Explicit argument wins; otherwise the session's linked application.
    pub fn resolve_application_id(&self, explicit: Option<Uuid>) -> Option<Uuid> {
        explicit.or(self.application_id)
    }
}

/// The closed set of results a tool handler can produce.
///
/// Handlers never raise for expected business conditions — those are
/// variants here. `Err(ToolError)` is reserved for the handler not being
/// executable at all (malformed arguments, store failure), which the
/// registry reclassifies.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolOutcome {
    /// The tool did its job; payload goes back to the model verbatim.
    Success(serde_json::Value),

    /// A business-rule rejection with a stable error code the model can
    /// explain or react to (e.g. `application_id_required`,
    /// `confirmation_required`, `user_not_found`).
    Rejected {
        code: &'static str,
        message: String,
    },

    /// The certification gate: every failing check collected together so
    /// the caller gets the complete remediation list in one response.
    ValidationFailed {
        message: String,
        failures: Vec<String>,
        application_id: Uuid,
        current_status: ApplicationStatus,
    },

    /// A referenced entity does not exist. Reported as `{entity}_not_found`.
    NotFound {
        entity: &'static str,
        message: String,
    },

    /// The caller is not the owner of the target application.
    Unauthorized,

    /// The application is in a terminal status and locked against mutation.
    Locked { status: ApplicationStatus },
}

impl ToolOutcome {
    pub fn success(payload: serde_json::Value) -> Self {
        Self::Success(payload)
    }

    pub fn rejected(code: &'static str, message: impl Into<String>) -> Self {
        Self::Rejected {
            code,
            message: message.into(),
        }
    }

    pub fn not_found(entity: &'static str, message: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            message: message.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// The payload the model sees. Non-success variants all carry an
    /// `error` code plus a human-readable message.
    pub fn into_payload(self) -> serde_json::Value {
        match self {
            Self::Success(payload) => payload,
            Self::Rejected { code, message } => serde_json::json!({
                "error": code,
                "message": message,
            }),
            Self::ValidationFailed {
                message,
                failures,
                application_id,
                current_status,
            } => serde_json::json!({
                "error": "validation_failed",
                "message": message,
                "validation_failures": failures,
                "application_id": application_id,
                "current_status": current_status,
            }),
            Self::NotFound { entity, message } => serde_json::json!({
                "error": format!("{entity}_not_found"),
                "message": message,
            }),
            Self::Unauthorized => serde_json::json!({
                "error": "unauthorized",
                "message": "You do not have permission to access this resource.",
            }),
            Self::Locked { status } => serde_json::json!({
                "error": "application_locked",
                "message": format!(
                    "Application is {status} and locked against further changes."
                ),
            }),
        }
    }
}

/// The core Tool trait. Each certification tool implements this and is
/// registered in the [`ToolRegistry`].
#[async_trait]
pub trait Tool: Send + Sync {
    /// The unique name of this tool (e.g., "query_application").
    fn name(&self) -> &str;

    /// A description of what this tool does (sent to the LLM).
    fn description(&self) -> &str;

    /// JSON Schema describing this tool's parameters.
    fn parameters_schema(&self) -> serde_json::Value;

    /// Execute the tool with the given arguments and session context.
    async fn execute(
        &self,
        input: serde_json::Value,
        ctx: &SessionContext,
    ) -> std::result::Result<ToolOutcome, ToolError>;

    /// Convert this tool into a definition for the LLM.
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            input_schema: self.parameters_schema(),
        }
    }
}

/// One executed tool call, as a uniform envelope.
///
/// Every outcome — success, handler-reported failure, bad input, unexpected
/// error — carries the tool name, wall-clock duration, and a timestamp.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolExecution {
    pub tool_name: String,
    pub success: bool,
    pub payload: serde_json::Value,
    pub duration_ms: u64,
    pub timestamp: DateTime<Utc>,
}

impl ToolExecution {
    /// Serialize this execution into the content of a tool-result turn.
    pub fn result_content(&self) -> String {
        serde_json::to_string(&serde_json::json!({
            "success": self.success,
            "tool_name": self.tool_name,
            "result": self.payload,
            "execution_time_ms": self.duration_ms,
            "timestamp": self.timestamp,
        }))
        .unwrap_or_else(|_| "{\"error\":\"serialization_failed\"}".into())
    }
}

/// A registry of available tools: a name → (schema, handler) map.
///
/// The conversation engine uses this to advertise capabilities to the LLM
/// on every turn and to route the model's tool-use requests.
pub struct ToolRegistry {
    tools: BTreeMap<String, Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: BTreeMap::new(),
        }
    }

    /// Register a tool, validating its definition shape up front.
    ///
    /// A malformed definition is a configuration error and fails fast.
    /// Re-registration under an existing name overwrites and is logged.
    pub fn register(&mut self, tool: Box<dyn Tool>) -> crate::error::Result<()> {
        let def = tool.definition();

        if def.name.is_empty() {
            return Err(Error::Config {
                message: "Tool definition has an empty name".into(),
            });
        }
        if def.name != tool.name() {
            return Err(Error::Config {
                message: format!(
                    "Tool name mismatch: handler '{}' vs definition '{}'",
                    tool.name(),
                    def.name
                ),
            });
        }
        if def.input_schema.get("type").and_then(|t| t.as_str()) != Some("object") {
            return Err(Error::Config {
                message: format!(
                    "Tool '{}' parameter schema must be a JSON Schema object",
                    def.name
                ),
            });
        }

        if self.tools.contains_key(&def.name) {
            warn!(tool = %def.name, "Tool already registered, overwriting");
        }
        debug!(tool = %def.name, "Registered tool");
        self.tools.insert(def.name, tool);
        Ok(())
    }

    /// All tool definitions, advertised to the LLM on every turn.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.values().map(|t| t.definition()).collect()
    }

    /// All registered tool names.
    pub fn names(&self) -> Vec<&str> {
        self.tools.keys().map(|s| s.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Execute a tool by name. Never fails: every failure mode becomes a
    /// structured envelope — `tool_not_found`, `invalid_input`,
    /// `database_error`, or `execution_error`.
    pub async fn execute(
        &self,
        name: &str,
        input: serde_json::Value,
        ctx: &SessionContext,
    ) -> ToolExecution {
        let start = std::time::Instant::now();
        info!(tool = %name, "Executing tool");

        let Some(tool) = self.tools.get(name) else {
            error!(tool = %name, "Tool not found in registry");
            return ToolExecution {
                tool_name: name.to_string(),
                success: false,
                payload: serde_json::json!({
                    "error": "tool_not_found",
                    "message": format!("Tool '{name}' not found in registry"),
                    "available_tools": self.names(),
                }),
                duration_ms: start.elapsed().as_millis() as u64,
                timestamp: Utc::now(),
            };
        };

        let (success, payload) = match tool.execute(input.clone(), ctx).await {
            Ok(outcome) => {
                let success = outcome.is_success();
                if success {
                    info!(
                        tool = %name,
                        duration_ms = start.elapsed().as_millis() as u64,
                        "Tool executed successfully"
                    );
                } else {
                    warn!(
                        tool = %name,
                        duration_ms = start.elapsed().as_millis() as u64,
                        outcome = ?outcome,
                        "Tool returned error"
                    );
                }
                (success, outcome.into_payload())
            }
            Err(ToolError::InvalidArguments(msg)) => {
                error!(tool = %name, input = %input, error = %msg, "Invalid tool input");
                (
                    false,
                    serde_json::json!({
                        "error": "invalid_input",
                        "message": format!("Invalid input parameters for tool '{name}': {msg}"),
                    }),
                )
            }
            Err(ToolError::Store(e)) => {
                error!(tool = %name, input = %input, error = %e, "Store failure in tool");
                (
                    false,
                    serde_json::json!({
                        "error": "database_error",
                        "message": format!("Database error while executing '{name}': {e}"),
                    }),
                )
            }
            Err(e) => {
                error!(tool = %name, input = %input, error = %e, "Unexpected tool failure");
                (
                    false,
                    serde_json::json!({
                        "error": "execution_error",
                        "message": format!("Unexpected error executing tool '{name}': {e}"),
                    }),
                )
            }
        };

        ToolExecution {
            tool_name: name.to_string(),
            success,
            payload,
            duration_ms: start.elapsed().as_millis() as u64,
            timestamp: Utc::now(),
        }
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }
        fn description(&self) -> &str {
            "Echoes back the input"
        }
        fn parameters_schema(&self) -> serde_json::Value {
            serde_json::json!({
                "type": "object",
                "properties": {
                    "text": { "type": "string" }
                },
                "required": ["text"]
            })
        }
        async fn execute(
            &self,
            input: serde_json::Value,
            _ctx: &SessionContext,
        ) -> std::result::Result<ToolOutcome, ToolError> {
            let text = input["text"]
                .as_str()
                .ok_or_else(|| ToolError::InvalidArguments("missing 'text'".into()))?;
            Ok(ToolOutcome::success(serde_json::json!({ "text": text })))
        }
    }

    struct BadSchemaTool;

    #[async_trait]
    impl Tool for BadSchemaTool {
        fn name(&self) -> &str {
            "bad_schema"
        }
        fn description(&self) -> &str {
            "Schema is not an object schema"
        }
        fn parameters_schema(&self) -> serde_json::Value {
            serde_json::json!("not a schema")
        }
        async fn execute(
            &self,
            _input: serde_json::Value,
            _ctx: &SessionContext,
        ) -> std::result::Result<ToolOutcome, ToolError> {
            Ok(ToolOutcome::success(serde_json::Value::Null))
        }
    }

    #[test]
    fn register_and_list() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(EchoTool)).unwrap();
        assert_eq!(registry.names(), vec!["echo"]);
        assert_eq!(registry.definitions().len(), 1);
    }

    #[test]
    fn register_rejects_bad_schema() {
        let mut registry = ToolRegistry::new();
        let err = registry.register(Box::new(BadSchemaTool)).unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
    }

    #[tokio::test]
    async fn execute_success() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(EchoTool)).unwrap();

        let exec = registry
            .execute(
                "echo",
                serde_json::json!({"text": "hello"}),
                &SessionContext::default(),
            )
            .await;
        assert!(exec.success);
        assert_eq!(exec.payload["text"], "hello");
        assert_eq!(exec.tool_name, "echo");
    }

    #[tokio::test]
    async fn execute_unknown_tool_returns_envelope() {
        let registry = ToolRegistry::new();
        let exec = registry
            .execute(
                "nonexistent",
                serde_json::json!({}),
                &SessionContext::default(),
            )
            .await;
        assert!(!exec.success);
        assert_eq!(exec.payload["error"], "tool_not_found");
        assert!(exec.payload["available_tools"].is_array());
    }

    #[tokio::test]
    async fn execute_invalid_input_is_classified() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(EchoTool)).unwrap();

        let exec = registry
            .execute("echo", serde_json::json!({}), &SessionContext::default())
            .await;
        assert!(!exec.success);
        assert_eq!(exec.payload["error"], "invalid_input");
    }

    #[test]
    fn outcome_payload_shapes() {
        let rejected = ToolOutcome::rejected("confirmation_required", "Confirm first.");
        let payload = rejected.into_payload();
        assert_eq!(payload["error"], "confirmation_required");

        let not_found = ToolOutcome::not_found("application", "Application abc not found.");
        assert_eq!(not_found.into_payload()["error"], "application_not_found");

        let locked = ToolOutcome::Locked {
            status: ApplicationStatus::Approved,
        };
        let payload = locked.into_payload();
        assert_eq!(payload["error"], "application_locked");
        assert!(payload["message"].as_str().unwrap().contains("approved"));
    }

    #[test]
    fn result_content_is_json() {
        let exec = ToolExecution {
            tool_name: "echo".into(),
            success: true,
            payload: serde_json::json!({"ok": true}),
            duration_ms: 3,
            timestamp: Utc::now(),
        };
        let content = exec.result_content();
        let parsed: serde_json::Value = serde_json::from_str(&content).unwrap();
        assert_eq!(parsed["tool_name"], "echo");
        assert_eq!(parsed["success"], true);
    }

    #[test]
    fn session_context_resolution() {
        let app = Uuid::new_v4();
        let other = Uuid::new_v4();
        let ctx = SessionContext {
            user_id: None,
            application_id: Some(app),
        };
        assert_eq!(ctx.resolve_application_id(None), Some(app));
        assert_eq!(ctx.resolve_application_id(Some(other)), Some(other));
        assert_eq!(
            SessionContext::default().resolve_application_id(None),
            None
        );
    }
}
