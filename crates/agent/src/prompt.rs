//! Dynamic system prompt assembly.
//!
//! Pure string composition: persona, workflow-mode guidance, injected
//! application context, recalled memory snippets, and tool descriptions.
//! No control flow beyond missing-section defaults.

use agrocert_core::application::Application;
use agrocert_core::provider::ToolDefinition;
use agrocert_core::session::WorkflowMode;
use chrono::Utc;

const BASE_PERSONA: &str = "\
You are AgroCert AI, an expert assistant for agricultural finance certification.

Your role is to help users navigate agricultural finance compliance and certification:
- Understanding certification requirements and processes
- Completing application forms with accuracy and compliance
- Reviewing and organizing compliance documents
- Preparing for audits and assessments
- Answering questions about agricultural finance regulations

Your capabilities:
- Access to the user's certification application data
- Document search and analysis (OCR-extracted content)
- Tool execution for data retrieval and updates

Guidelines for interaction:
- Be professional, accurate, and helpful
- When uncertain, ask clarifying questions rather than guessing
- Cite specific requirements when possible
- Break down complex processes into manageable steps
- Maintain confidentiality and data security awareness";

fn workflow_guidance(mode: WorkflowMode) -> &'static str {
    match mode {
        WorkflowMode::GeneralHelp => {
            "Current mode: General Help\n\
             - Answer questions about the certification process\n\
             - Provide guidance on next steps\n\
             - Help navigate the application portal"
        }
        WorkflowMode::DocumentReview => {
            "Current mode: Document Review\n\
             - Focus on analyzing uploaded compliance documents\n\
             - Identify missing or incomplete documentation\n\
             - Suggest document organization strategies\n\
             - Flag potential compliance issues"
        }
        WorkflowMode::FieldCompletion => {
            "Current mode: Field Completion Assistant\n\
             - Help accurately complete application form fields\n\
             - Provide examples and guidance for complex fields\n\
             - Validate input against requirements\n\
             - Suggest corrections for common errors"
        }
        WorkflowMode::AuditPreparation => {
            "Current mode: Audit Preparation\n\
             - Guide audit readiness activities\n\
             - Review documentation completeness\n\
             - Identify potential audit questions\n\
             - Suggest remediation for gaps"
        }
    }
}

/// Everything that feeds into one system prompt.
#[derive(Default)]
pub struct PromptContext<'a> {
    pub workflow_mode: Option<WorkflowMode>,
    pub application: Option<&'a Application>,
    pub memories: &'a [String],
    pub tools: &'a [ToolDefinition],
}

/// Assemble the full system prompt.
pub fn build_system_prompt(ctx: &PromptContext<'_>) -> String {
    let mut parts: Vec<String> = vec![BASE_PERSONA.to_string()];

    if let Some(mode) = ctx.workflow_mode {
        parts.push("\n## Current Workflow".into());
        parts.push(workflow_guidance(mode).into());
    }

    if let Some(app) = ctx.application {
        parts.push("\n## Current Application Context".into());
        parts.push(format!(
            "The user is currently working on:\n\
             - Application ID: {}\n\
             - Certification Type: {}\n\
             - Status: {}",
            app.id, app.certification_type, app.status
        ));
    }

    if !ctx.memories.is_empty() {
        parts.push("\n## Relevant Context from Previous Conversations".into());
        parts.push("The following information from past interactions may be relevant:".into());
        for (idx, memory) in ctx.memories.iter().take(5).enumerate() {
            parts.push(format!("{}. {memory}", idx + 1));
        }
        parts.push("Use this context to provide more personalized assistance.".into());
    }

    if !ctx.tools.is_empty() {
        parts.push("\n## Available Tools".into());
        parts.push("You have access to the following tools:".into());
        for tool in ctx.tools {
            let first_line = tool.description.lines().next().unwrap_or("").trim();
            parts.push(format!("- **{}**: {first_line}", tool.name));
        }
        parts.push(
            "Use these tools when needed to provide accurate, data-driven assistance.".into(),
        );
    }

    parts.push("\n## Session Context".into());
    parts.push(format!(
        "Current date/time: {}",
        Utc::now().format("%Y-%m-%d %H:%M UTC")
    ));

    parts.push("\n## Instructions".into());
    parts.push(
        "- Provide clear, actionable guidance\n\
         - Use tools when you need specific data\n\
         - Ask for clarification if the user's request is ambiguous\n\
         - Keep responses focused and relevant to agricultural finance certification\n\
         - Maintain a professional yet approachable tone"
            .into(),
    );

    parts.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use agrocert_core::application::{ApplicationStatus, CertificationType};
    use uuid::Uuid;

    fn test_application() -> Application {
        Application {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            status: ApplicationStatus::InProgress,
            certification_type: CertificationType::Organic,
            notes: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn bare_prompt_has_persona_and_instructions() {
        let prompt = build_system_prompt(&PromptContext::default());
        assert!(prompt.contains("AgroCert AI"));
        assert!(prompt.contains("## Instructions"));
        assert!(!prompt.contains("## Current Workflow"));
        assert!(!prompt.contains("## Available Tools"));
    }

    #[test]
    fn workflow_mode_section() {
        let prompt = build_system_prompt(&PromptContext {
            workflow_mode: Some(WorkflowMode::DocumentReview),
            ..Default::default()
        });
        assert!(prompt.contains("Current mode: Document Review"));
    }

    #[test]
    fn application_context_section() {
        let app = test_application();
        let prompt = build_system_prompt(&PromptContext {
            application: Some(&app),
            ..Default::default()
        });
        assert!(prompt.contains(&app.id.to_string()));
        assert!(prompt.contains("organic"));
        assert!(prompt.contains("in_progress"));
    }

    #[test]
    fn memories_are_capped_at_five() {
        let memories: Vec<String> = (0..8).map(|i| format!("memory number {i}")).collect();
        let prompt = build_system_prompt(&PromptContext {
            memories: &memories,
            ..Default::default()
        });
        assert!(prompt.contains("memory number 4"));
        assert!(!prompt.contains("memory number 5"));
    }

    #[test]
    fn tools_listed_by_name() {
        let tools = vec![ToolDefinition {
            name: "query_application".into(),
            description: "Get detailed information about a certification application.\nMore detail here.".into(),
            input_schema: serde_json::json!({"type": "object"}),
        }];
        let prompt = build_system_prompt(&PromptContext {
            tools: &tools,
            ..Default::default()
        });
        assert!(prompt.contains("**query_application**"));
        // Only the first description line is inlined
        assert!(!prompt.contains("More detail here"));
    }
}
