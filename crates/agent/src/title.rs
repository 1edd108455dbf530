//! Session title generation from the first exchange, with a deterministic
//! truncation fallback when the model call fails.

use agrocert_core::chat::ChatMessage;
use agrocert_core::error::ProviderError;
use agrocert_core::provider::{Provider, ProviderRequest};

const MAX_TITLE_LEN: usize = 50;

const TITLE_PROMPT: &str = "\
Generate a brief, descriptive title (5-8 words max) for this conversation based on the first exchange.
The title should:
- Capture the main topic or intent
- Include relevant names, entities, or specifics if mentioned
- Be concise and scannable for a sidebar list
- NOT include quotes around the title
- NOT start with \"Title:\" or similar prefixes

Examples of good titles:
- John Smith Farm Loan Application
- Corn Yield Documentation Review
- Missing Tax Records Follow-up
- 2024 Operating Budget Questions";

fn clip(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

/// Ask the model for a title. Input sizes are clipped so a long first
/// exchange cannot blow the prompt up.
pub async fn generate_session_title(
    provider: &dyn Provider,
    model: &str,
    user_message: &str,
    assistant_response: &str,
) -> Result<String, ProviderError> {
    let prompt = format!(
        "{TITLE_PROMPT}\n\nUSER MESSAGE:\n{}\n\nASSISTANT RESPONSE:\n{}\n\nGenerate only the title, nothing else:",
        clip(user_message, 500),
        clip(assistant_response, 500),
    );

    let reply = provider
        .complete(ProviderRequest {
            model: model.to_string(),
            system: Some("You are a title generator. Output only the title, nothing else.".into()),
            messages: vec![ChatMessage::user(prompt)],
            max_tokens: 50,
            temperature: 1.0,
            tools: vec![],
        })
        .await?;

    let title = reply
        .message
        .content
        .trim()
        .trim_matches(|c| c == '"' || c == '\'')
        .to_string();

    let title = if title.chars().count() > MAX_TITLE_LEN {
        format!("{}...", clip(&title, MAX_TITLE_LEN - 3))
    } else {
        title
    };

    if title.is_empty() {
        Ok("New Conversation".into())
    } else {
        Ok(title)
    }
}

/// Deterministic fallback: the first user message, whitespace-collapsed and
/// truncated at a word boundary.
pub fn fallback_title(user_message: &str) -> String {
    let clean = user_message.split_whitespace().collect::<Vec<_>>().join(" ");

    if clean.chars().count() <= MAX_TITLE_LEN {
        return clean;
    }

    let truncated = clip(&clean, MAX_TITLE_LEN - 3);
    let cut = match truncated.rfind(' ') {
        Some(pos) if pos > MAX_TITLE_LEN / 2 => &truncated[..pos],
        _ => truncated.as_str(),
    };

    format!("{cut}...")
}

#[cfg(test)]
mod tests {
    use super::*;
    use agrocert_core::provider::{ProviderReply, StopReason};
    use async_trait::async_trait;

    struct FixedProvider {
        title: String,
    }

    #[async_trait]
    impl Provider for FixedProvider {
        fn name(&self) -> &str {
            "fixed"
        }
        async fn complete(
            &self,
            _request: ProviderRequest,
        ) -> Result<ProviderReply, ProviderError> {
            Ok(ProviderReply {
                message: ChatMessage::assistant(&self.title),
                stop_reason: Some(StopReason::EndTurn),
                usage: None,
                model: "fixed".into(),
            })
        }
    }

    #[tokio::test]
    async fn strips_quotes_and_whitespace() {
        let provider = FixedProvider {
            title: "  \"Jane Roe Farm Loan Application\"  ".into(),
        };
        let title = generate_session_title(&provider, "m", "help me", "sure")
            .await
            .unwrap();
        assert_eq!(title, "Jane Roe Farm Loan Application");
    }

    #[tokio::test]
    async fn long_generated_title_is_clipped() {
        let provider = FixedProvider {
            title: "A".repeat(80),
        };
        let title = generate_session_title(&provider, "m", "q", "a").await.unwrap();
        assert_eq!(title.chars().count(), 50);
        assert!(title.ends_with("..."));
    }

    #[tokio::test]
    async fn empty_generation_falls_back_to_default() {
        let provider = FixedProvider { title: "".into() };
        let title = generate_session_title(&provider, "m", "q", "a").await.unwrap();
        assert_eq!(title, "New Conversation");
    }

    #[test]
    fn short_message_is_title_verbatim() {
        assert_eq!(fallback_title("Help with my taxes"), "Help with my taxes");
    }

    #[test]
    fn long_message_truncates_at_word_boundary() {
        let title = fallback_title(
            "I need help understanding which documents are required for the organic certification",
        );
        assert!(title.chars().count() <= 50);
        assert!(title.ends_with("..."));
        // No mid-word cut before the ellipsis
        assert!(!title.trim_end_matches("...").ends_with(' '));
    }

    #[test]
    fn whitespace_is_collapsed() {
        assert_eq!(fallback_title("too   many\n\nspaces"), "too many spaces");
    }
}
