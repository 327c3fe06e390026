use thiserror::Error;

#[derive(Error, Debug)]
pub enum ChatError {
    #[error("HTTP request to the model provider failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Gemini API error (HTTP {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Failed to deserialize the provider response: {0}")]
    Deserialization(String),

    #[error("A conversation needs at least one message")]
    EmptyConversation,

    #[error("Invalid client configuration: {0}")]
    Configuration(String),
}
