use serde::{Deserialize, Serialize};
use std::fmt;

/// Words are multiplied by this factor to approximate a token count.
pub const TOKENS_PER_WORD: f64 = 1.3;

/// The author of a single chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
    Model,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageRole::System => "system",
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
            MessageRole::Model => "model",
        }
    }
}

impl fmt::Display for MessageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One turn of a conversation. An ordered `Vec<ChatMessage>` is a conversation
/// whose last element is the current turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: MessageRole,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self { role, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(MessageRole::User, content)
    }
}

/// Approximate token usage for a completion.
///
/// These numbers are a word-count heuristic (`words * 1.3`, rounded), not the
/// provider's billed token count. Do not use them for billing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct UsageInfo {
    pub prompt_tokens: u32,
    pub output_tokens: u32,
    pub total_tokens: u32,
}

impl UsageInfo {
    /// Builds an estimate from the prompt and response texts.
    pub fn estimate<'a>(prompt: impl IntoIterator<Item = &'a str>, response: &str) -> Self {
        let prompt_words = prompt.into_iter().map(word_count).sum();
        let prompt_tokens = estimate_tokens(prompt_words);
        let output_tokens = estimate_tokens(word_count(response));
        Self {
            prompt_tokens,
            output_tokens,
            total_tokens: prompt_tokens + output_tokens,
        }
    }
}

pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

pub fn estimate_tokens(words: usize) -> u32 {
    (words as f64 * TOKENS_PER_WORD).round() as u32
}

/// The result of a single or multi-turn completion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatCompletion {
    pub response: String,
    pub usage: Option<UsageInfo>,
    pub model: String,
}
