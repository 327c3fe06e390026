//! Chat completions against a hosted large language model.
//!
//! [`ChatService`] is the gateway used by the web layer. It resolves per-call
//! options against the configured defaults, converts conversations into the
//! provider's format and estimates token usage. The wire protocol lives behind
//! the [`ChatProvider`] trait, implemented for Gemini by [`GeminiClient`].

use crate::error::ChatError;
use async_trait::async_trait;
use tokio::sync::mpsc;

pub mod convert;
pub mod error;
pub mod gemini;
pub mod service;
// --- Public API ---
pub use gemini::{Content, GeminiClient, Part};
pub use service::{ChatOptions, ChatService, NO_RESPONSE};

/// A fully resolved generation call.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerateRequest {
    pub model: String,
    /// History followed by the current turn.
    pub contents: Vec<Content>,
    pub temperature: f32,
    pub max_tokens: u32,
}

/// The contract for a model provider, allowing the live client to be swapped
/// for a stub in tests.
#[async_trait]
pub trait ChatProvider: Send + Sync {
    /// Generates the full reply in one round trip.
    async fn generate(&self, request: &GenerateRequest) -> Result<String, ChatError>;

    /// Starts a streamed reply. Fragments arrive on the returned channel in
    /// order; an `Err` item is the last one sent.
    async fn stream(&self, request: &GenerateRequest) -> Result<mpsc::Receiver<Result<String, ChatError>>, ChatError>;
}
