use api_client::error::ApiError;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chat_client::error::ChatError;
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] database::DbError),
    #[error("Chat provider error: {0}")]
    Chat(#[from] ChatError),
    #[error("Market data error: {0}")]
    MarketData(#[from] ApiError),
    #[error("Bad request: {0}")]
    BadRequest(String),
    #[error("Rate limit exceeded")]
    RateLimited,
}

/// Converts our custom `AppError` into an HTTP response.
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::Database(db_err) => {
                tracing::error!(error = ?db_err, "Database error.");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "An internal database error occurred".to_string(),
                )
            }
            AppError::Chat(ChatError::EmptyConversation) => (
                StatusCode::BAD_REQUEST,
                ChatError::EmptyConversation.to_string(),
            ),
            AppError::Chat(chat_err) => {
                tracing::error!(error = ?chat_err, "Chat provider error.");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "The chat provider failed to respond".to_string(),
                )
            }
            AppError::MarketData(ApiError::InvalidData(message)) => (StatusCode::BAD_REQUEST, message),
            AppError::MarketData(api_err) => {
                tracing::error!(error = ?api_err, "Market data error.");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "The market data provider failed to respond".to_string(),
                )
            }
            AppError::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
            AppError::RateLimited => (
                StatusCode::TOO_MANY_REQUESTS,
                "Rate limit exceeded, try again later".to_string(),
            ),
        };

        let body = Json(json!({ "error": error_message }));
        (status, body).into_response()
    }
}
