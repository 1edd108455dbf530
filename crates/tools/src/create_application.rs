//! `create_application` — start a new draft certification application.
//!
//! Resolves the owning user from the session context, or from a farmer
//! name + email when the call is unauthenticated. Account provisioning is
//! the authentication system's job: an unknown email is `user_not_found`,
//! never a silently fabricated account.

use agrocert_core::application::CertificationType;
use agrocert_core::error::ToolError;
use agrocert_core::store::Store;
use agrocert_core::tool::{SessionContext, Tool, ToolOutcome};
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;

pub struct CreateApplicationTool {
    store: Arc<dyn Store>,
}

impl CreateApplicationTool {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }
}

/// Syntactic email-shape check, nothing more.
fn is_valid_email(email: &str) -> bool {
    static EMAIL_RE: std::sync::OnceLock<regex_lite::Regex> = std::sync::OnceLock::new();
    EMAIL_RE
        .get_or_init(|| {
            regex_lite::Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$")
                .expect("email regex is valid")
        })
        .is_match(email)
}

#[derive(Debug, Deserialize)]
struct Input {
    #[serde(default)]
    farmer_name: Option<String>,
    #[serde(default)]
    farmer_email: Option<String>,
    #[serde(default)]
    certification_type: Option<String>,
    #[serde(default)]
    notes: Option<String>,
}

#[async_trait]
impl Tool for CreateApplicationTool {
    fn name(&self) -> &str {
        "create_application"
    }

    fn description(&self) -> &str {
        "Create a new agricultural finance certification application in draft status. \
         Use this when the user wants to start a new application or apply for \
         certification. When no user is logged in, farmer_name and a valid \
         farmer_email identifying an existing account are required. The returned \
         application_id is used by all other tools to track and update the case. \
         certification_type defaults to 'standard'."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "farmer_name": {
                    "type": "string",
                    "description": "Full name of the farmer or agricultural business. Required when no user is logged in."
                },
                "farmer_email": {
                    "type": "string",
                    "description": "Email address of an existing account. Required when no user is logged in."
                },
                "certification_type": {
                    "type": "string",
                    "description": "Type of certification. One of: standard, organic, sustainable, gmp. Defaults to standard.",
                    "enum": ["standard", "organic", "sustainable", "gmp"]
                },
                "notes": {
                    "type": "string",
                    "description": "Optional free-text notes recorded on the new application."
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

        // Validate the certification type before any lookup or write
        let certification_type = match input.certification_type.as_deref() {
            None => CertificationType::Standard,
            Some(raw) => match CertificationType::parse(raw) {
                Some(t) => t,
                None => {
                    let valid: Vec<&str> =
                        CertificationType::ALL.iter().map(|t| t.as_str()).collect();
                    return Ok(ToolOutcome::rejected(
                        "invalid_certification_type",
                        format!(
                            "Certification type must be one of: {}. Got: {raw}",
                            valid.join(", ")
                        ),
                    ));
                }
            },
        };

        // Email shape is checked whenever one is supplied
        if let Some(email) = input.farmer_email.as_deref() {
            if !is_valid_email(email) {
                return Ok(ToolOutcome::rejected(
                    "invalid_email",
                    format!("Invalid email format: {email}. Please provide a valid email address."),
                ));
            }
        }

        let user_id = match ctx.user_id {
            Some(id) => id,
            None => {
                let Some(email) = input.farmer_email.as_deref() else {
                    return Ok(ToolOutcome::rejected(
                        "missing_required_fields",
                        "Either a logged-in user or farmer_email is required to create an application.",
                    ));
                };
                if input.farmer_name.as_deref().unwrap_or("").is_empty() {
                    return Ok(ToolOutcome::rejected(
                        "missing_required_fields",
                        "farmer_name is required when creating an application without a logged-in user.",
                    ));
                }

                match self.store.find_user_by_email(email).await? {
                    Some(account) => account.id,
                    None => {
                        return Ok(ToolOutcome::rejected(
                            "user_not_found",
                            format!(
                                "No user found with email {email}. The account must be created \
                                 through the authentication system first."
                            ),
                        ));
                    }
                }
            }
        };

        let application = self
            .store
            .create_application(user_id, certification_type, input.notes.as_deref())
            .await?;

        Ok(ToolOutcome::success(serde_json::json!({
            "application_id": application.id,
            "status": application.status,
            "certification_type": application.certification_type,
            "created_at": application.created_at,
            "updated_at": application.updated_at,
            "message": format!(
                "Successfully created {} certification application. Application ID: {}",
                application.certification_type, application.id
            ),
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agrocert_core::application::ApplicationStatus;
    use agrocert_store::MemStore;
    use uuid::Uuid;

    #[tokio::test]
    async fn creates_draft_for_logged_in_user() {
        let store = Arc::new(MemStore::new());
        let tool = CreateApplicationTool::new(store.clone());

        let ctx = SessionContext {
            user_id: Some(Uuid::new_v4()),
            application_id: None,
        };
        let outcome = tool
            .execute(serde_json::json!({"certification_type": "organic"}), &ctx)
            .await
            .unwrap();

        assert!(outcome.is_success());
        let payload = outcome.into_payload();
        assert_eq!(payload["status"], "draft");
        assert_eq!(payload["certification_type"], "organic");

        let app_id: Uuid =
            serde_json::from_value(payload["application_id"].clone()).unwrap();
        let app = store.get_application(app_id).await.unwrap().unwrap();
        assert_eq!(app.status, ApplicationStatus::Draft);
    }

    #[tokio::test]
    async fn invalid_certification_type_fails_before_write() {
        let store = Arc::new(MemStore::new());
        let tool = CreateApplicationTool::new(store);

        let ctx = SessionContext {
            user_id: Some(Uuid::new_v4()),
            application_id: None,
        };
        let outcome = tool
            .execute(serde_json::json!({"certification_type": "premium"}), &ctx)
            .await
            .unwrap();

        let payload = outcome.into_payload();
        assert_eq!(payload["error"], "invalid_certification_type");
        assert!(payload["message"].as_str().unwrap().contains("standard"));
    }

    #[tokio::test]
    async fn unknown_email_is_user_not_found() {
        let store = Arc::new(MemStore::new());
        let tool = CreateApplicationTool::new(store);

        let outcome = tool
            .execute(
                serde_json::json!({
                    "farmer_name": "Jane Roe",
                    "farmer_email": "jane.roe@newfarm.example"
                }),
                &SessionContext::default(),
            )
            .await
            .unwrap();

        assert_eq!(outcome.into_payload()["error"], "user_not_found");
    }

    #[tokio::test]
    async fn existing_email_is_reused() {
        let store = Arc::new(MemStore::new());
        let user_id = store.insert_user("jane@farm.example", Some("Jane")).await;
        let tool = CreateApplicationTool::new(store.clone());

        let outcome = tool
            .execute(
                serde_json::json!({
                    "farmer_name": "Jane",
                    "farmer_email": "jane@farm.example"
                }),
                &SessionContext::default(),
            )
            .await
            .unwrap();

        assert!(outcome.is_success());
        let app_id: Uuid =
            serde_json::from_value(outcome.into_payload()["application_id"].clone()).unwrap();
        let app = store.get_application(app_id).await.unwrap().unwrap();
        assert_eq!(app.user_id, user_id);
    }

    #[tokio::test]
    async fn malformed_email_rejected() {
        let store = Arc::new(MemStore::new());
        let tool = CreateApplicationTool::new(store);

        let outcome = tool
            .execute(
                serde_json::json!({
                    "farmer_name": "Jane Roe",
                    "farmer_email": "not-an-email"
                }),
                &SessionContext::default(),
            )
            .await
            .unwrap();

        assert_eq!(outcome.into_payload()["error"], "invalid_email");
    }

    #[tokio::test]
    async fn unauthenticated_without_email_rejected() {
        let store = Arc::new(MemStore::new());
        let tool = CreateApplicationTool::new(store);

        let outcome = tool
            .execute(serde_json::json!({}), &SessionContext::default())
            .await
            .unwrap();

        assert_eq!(outcome.into_payload()["error"], "missing_required_fields");
    }

    #[test]
    fn email_shapes() {
        assert!(is_valid_email("john.smith@example.com"));
        assert!(is_valid_email("a+b@farm.co"));
        assert!(!is_valid_email("missing-at.example.com"));
        assert!(!is_valid_email("user@nodot"));
        assert!(!is_valid_email("user@.com"));
    }
}
