//! Shared application resolution and authorization policy.
//!
//! Every tool that touches an application follows the same steps, in order:
//! resolve the target id (explicit argument, else session context), load the
//! row, then compare owners. Existence is checked before ownership, so a
//! non-owner cannot distinguish "not found" from "not yours".

use agrocert_core::application::Application;
use agrocert_core::error::ToolError;
use agrocert_core::store::Store;
use agrocert_core::tool::{SessionContext, ToolOutcome};
use uuid::Uuid;

/// Outcome of the common resolution policy.
pub enum AppAccess {
    Granted(Application),
    Refused(ToolOutcome),
}

/// Resolve and authorize the target application for a tool call.
pub async fn resolve_application(
    store: &dyn Store,
    ctx: &SessionContext,
    explicit: Option<Uuid>,
) -> Result<AppAccess, ToolError> {
    let Some(application_id) = ctx.resolve_application_id(explicit) else {
        return Ok(AppAccess::Refused(ToolOutcome::rejected(
            "application_id_required",
            "No application_id provided and no application linked to the current session. \
             Provide an application_id or link an application to this conversation.",
        )));
    };

    let Some(application) = store.get_application(application_id).await? else {
        return Ok(AppAccess::Refused(ToolOutcome::not_found(
            "application",
            format!("Application {application_id} not found."),
        )));
    };

    if let Some(user_id) = ctx.user_id {
        if application.user_id != user_id {
            return Ok(AppAccess::Refused(ToolOutcome::Unauthorized));
        }
    }

    Ok(AppAccess::Granted(application))
}

/// Terminal applications are locked: mutation attempts get a distinct error.
pub fn refuse_if_locked(application: &Application) -> Option<ToolOutcome> {
    if application.status.is_terminal() {
        Some(ToolOutcome::Locked {
            status: application.status,
        })
    } else {
        None
    }
}
