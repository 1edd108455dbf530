//! Conversation history preparation.
//!
//! Formats stored messages into the strict alternating user/assistant shape
//! the LLM requires, estimates token cost with a cheap character-count
//! heuristic, and truncates old turns to fit the context budget while
//! always preserving the most recent window.

use agrocert_core::chat::{ChatMessage, ChatRole};
use agrocert_core::error::HistoryError;
use agrocert_core::session::StoredMessage;
use tracing::{debug, info, warn};

/// Rough estimate: 1 token ≈ 4 characters.
const TOKENS_PER_CHAR: f64 = 0.25;

pub struct HistoryManager {
    max_tokens: usize,
    keep_most_recent: usize,
    summary_threshold: usize,
}

impl HistoryManager {
    pub fn new(max_tokens: usize, keep_most_recent: usize, summary_threshold: usize) -> Self {
        Self {
            max_tokens,
            keep_most_recent,
            summary_threshold,
        }
    }

    /// Format stored rows into chat messages. Rows with an unknown role are
    /// dropped with a warning rather than failing the whole batch.
    pub fn format(&self, messages: &[StoredMessage]) -> Vec<ChatMessage> {
        messages
            .iter()
            .filter_map(|msg| match msg.role.as_str() {
                "user" => Some(ChatMessage::user(&msg.content)),
                "assistant" => Some(ChatMessage::assistant(&msg.content)),
                other => {
                    warn!(role = %other, message_id = %msg.id, "Invalid role in stored message, skipping");
                    None
                }
            })
            .collect()
    }

    /// Estimate token count from character count. Intentionally approximate —
    /// only used to decide when to truncate.
    pub fn estimate_tokens(messages: &[ChatMessage]) -> usize {
        let total_chars: usize = messages.iter().map(|m| m.content.len()).sum();
        (total_chars as f64 * TOKENS_PER_CHAR) as usize
    }

    /// Truncate to fit the token budget.
    ///
    /// The most recent `keep_most_recent` messages are always retained.
    /// Older messages are then prepended one at a time, walking backward,
    /// only while the running estimate stays within budget — recency and a
    /// hard ceiling win over completeness.
    pub fn truncate_to_fit(&self, messages: Vec<ChatMessage>) -> Vec<ChatMessage> {
        let total = Self::estimate_tokens(&messages);
        if total <= self.max_tokens {
            debug!(tokens = total, "History fits in context");
            return messages;
        }

        info!(
            tokens = total,
            budget = self.max_tokens,
            "Truncating history to fit context budget"
        );

        let split = messages.len().saturating_sub(self.keep_most_recent);
        let (older, kept) = messages.split_at(split);

        let mut truncated: Vec<ChatMessage> = kept.to_vec();
        for msg in older.iter().rev() {
            let candidate_tokens =
                Self::estimate_tokens(&truncated) + Self::estimate_tokens(std::slice::from_ref(msg));
            if candidate_tokens > self.max_tokens {
                break;
            }
            truncated.insert(0, msg.clone());
        }

        info!(
            dropped = messages.len() - truncated.len(),
            kept = truncated.len(),
            "History truncated"
        );
        truncated
    }

    /// Verify strict user/assistant alternation starting with user.
    ///
    /// A violation is a caller error, not something to silently fix: the
    /// sequence must never reach the LLM boundary malformed.
    pub fn validate_alternation(messages: &[ChatMessage]) -> Result<(), HistoryError> {
        let mut prev: Option<ChatRole> = None;
        for (index, msg) in messages.iter().enumerate() {
            if !matches!(msg.role, ChatRole::User | ChatRole::Assistant) {
                return Err(HistoryError::InvalidRole {
                    index,
                    role: msg.role.to_string(),
                });
            }
            if let Some(prev_role) = prev {
                if prev_role == msg.role {
                    return Err(HistoryError::NonAlternating {
                        index,
                        prev: prev_role.to_string(),
                        next: msg.role.to_string(),
                    });
                }
            }
            prev = Some(msg.role);
        }

        if let Some(first) = messages.first() {
            if first.role != ChatRole::User {
                return Err(HistoryError::LeadingAssistant);
            }
        }

        Ok(())
    }

    /// Full preparation: truncate, format, append the new user message, and
    /// validate alternation.
    pub fn prepare(
        &self,
        stored: &[StoredMessage],
        new_user_message: Option<&str>,
    ) -> Result<Vec<ChatMessage>, HistoryError> {
        let formatted = self.format(stored);
        let mut messages = self.truncate_to_fit(formatted);

        if let Some(content) = new_user_message {
            messages.push(ChatMessage::user(content));
        }

        Self::validate_alternation(&messages)?;
        Ok(messages)
    }

    /// Collapse everything older than the recent window into one short
    /// synthetic summary string. Pure token-footprint reduction; returns
    /// `(None, all)` below the threshold.
    pub fn summarize_old_messages<'a>(
        &self,
        messages: &'a [ChatMessage],
    ) -> (Option<String>, &'a [ChatMessage]) {
        if messages.len() <= self.summary_threshold {
            return (None, messages);
        }

        let split = messages.len() - self.summary_threshold;
        let (old, recent) = messages.split_at(split);

        let user_count = old.iter().filter(|m| m.role == ChatRole::User).count();
        let assistant_count = old.len() - user_count;

        let all_text: String = old
            .iter()
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join(" ");
        let excerpt: String = all_text.chars().take(200).collect();

        let summary = format!(
            "Previous conversation summary ({} messages):\n\
             - User questions: {user_count}\n\
             - Assistant responses: {assistant_count}\n\
             - Topics discussed: {excerpt}...",
            old.len()
        );

        info!(summarized = old.len(), "Summarized old messages");
        (Some(summary), recent)
    }
}
