use crate::convert::to_contents;
use crate::error::ChatError;
use crate::gemini::{Content, GeminiClient, Part};
use crate::{ChatProvider, GenerateRequest};
use configuration::GeminiConfig;
use core_types::{ChatCompletion, ChatMessage, UsageInfo};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Substituted when the provider answers with no text at all.
pub const NO_RESPONSE: &str = "No response generated";

// Prefix of models the provider serves. Anything else falls back to the default.
const MODEL_FAMILY_PREFIX: &str = "gemini";
const STREAM_CHANNEL_CAPACITY: usize = 64;

/// Per-call overrides. Unset fields use the configured defaults.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChatOptions {
    pub model: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

/// The chat gateway. Built once at startup and shared by every request.
#[derive(Clone)]
pub struct ChatService {
    provider: Arc<dyn ChatProvider>,
    default_model: String,
    default_temperature: f32,
    default_max_tokens: u32,
}

impl ChatService {
    pub fn new(provider: Arc<dyn ChatProvider>, config: &GeminiConfig) -> Self {
        Self {
            provider,
            default_model: config.model.clone(),
            default_temperature: config.temperature,
            default_max_tokens: config.max_tokens,
        }
    }

    /// A service talking to the live Gemini API.
    pub fn gemini(config: &GeminiConfig) -> Result<Self, ChatError> {
        Ok(Self::new(Arc::new(GeminiClient::new(config)?), config))
    }

    pub fn default_model(&self) -> &str {
        &self.default_model
    }

    /// The requested model if it belongs to the provider's family, otherwise
    /// the configured default.
    pub fn resolve_model(&self, requested: Option<&str>) -> String {
        match requested {
            Some(model) if model.starts_with(MODEL_FAMILY_PREFIX) => model.to_string(),
            _ => self.default_model.clone(),
        }
    }

    fn build_request(&self, contents: Vec<Content>, options: &ChatOptions) -> GenerateRequest {
        GenerateRequest {
            model: self.resolve_model(options.model.as_deref()),
            contents,
            temperature: options.temperature.unwrap_or(self.default_temperature),
            // A zero budget would generate nothing, so it counts as unset.
            max_tokens: options
                .max_tokens
                .filter(|tokens| *tokens > 0)
                .unwrap_or(self.default_max_tokens),
        }
    }

    /// A single-turn completion of `message`.
    pub async fn simple_chat(&self, message: &str, options: &ChatOptions) -> Result<ChatCompletion, ChatError> {
        let contents = vec![Content {
            role: "user".to_string(),
            parts: vec![Part { text: message.to_string() }],
        }];
        let request = self.build_request(contents, options);

        let text = self.provider.generate(&request).await.map_err(|e| {
            tracing::error!(error = %e, model = %request.model, "Gemini API error in simple_chat.");
            e
        })?;

        Ok(completion(text, [message], request.model))
    }

    /// A multi-turn completion. The last message is the turn being answered.
    pub async fn create_chat_completion(
        &self,
        messages: &[ChatMessage],
        options: &ChatOptions,
    ) -> Result<ChatCompletion, ChatError> {
        if messages.is_empty() {
            return Err(ChatError::EmptyConversation);
        }
        let request = self.build_request(to_contents(messages), options);

        let text = self.provider.generate(&request).await.map_err(|e| {
            tracing::error!(error = %e, model = %request.model, "Gemini API error in create_chat_completion.");
            e
        })?;

        Ok(completion(
            text,
            messages.iter().map(|m| m.content.as_str()),
            request.model,
        ))
    }

    /// A multi-turn completion delivered as text fragments.
    ///
    /// Only an empty conversation is rejected up front. Once started, the
    /// stream never fails: empty fragments are skipped and any provider error
    /// is sent as a final `"Error: <message>"` fragment before the channel
    /// closes.
    pub async fn streaming_chat_completion(
        &self,
        messages: &[ChatMessage],
        options: &ChatOptions,
    ) -> Result<mpsc::Receiver<String>, ChatError> {
        if messages.is_empty() {
            return Err(ChatError::EmptyConversation);
        }
        let request = self.build_request(to_contents(messages), options);
        let provider = self.provider.clone();
        let (tx, rx) = mpsc::channel(STREAM_CHANNEL_CAPACITY);

        tokio::spawn(async move {
            let mut fragments = match provider.stream(&request).await {
                Ok(fragments) => fragments,
                Err(e) => {
                    tracing::error!(error = %e, model = %request.model, "Gemini API error in streaming_chat_completion.");
                    let _ = tx.send(format!("Error: {e}")).await;
                    return;
                }
            };

            while let Some(fragment) = fragments.recv().await {
                let (text, last) = match fragment {
                    Ok(text) if text.is_empty() => continue,
                    Ok(text) => (text, false),
                    Err(e) => {
                        tracing::error!(error = %e, model = %request.model, "Gemini stream failed mid-response.");
                        (format!("Error: {e}"), true)
                    }
                };
                if tx.send(text).await.is_err() {
                    tracing::debug!("Stream consumer went away.");
                    return;
                }
                if last {
                    return;
                }
            }
        });

        Ok(rx)
    }
}

fn completion<'a>(text: String, prompt: impl IntoIterator<Item = &'a str>, model: String) -> ChatCompletion {
    let response = if text.is_empty() { NO_RESPONSE.to_string() } else { text };
    let usage = UsageInfo::estimate(prompt, &response);
    ChatCompletion {
        response,
        usage: Some(usage),
        model,
    }
}
