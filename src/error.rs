use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

pub const METHOD_NOT_ALLOWED_MESSAGE: &str = "Method not allowed";
pub const MISSING_PROMPT_MESSAGE: &str = "Missing 'prompt' field";
pub const PROCESSING_ERROR_MESSAGE: &str = "Error processing the query";

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Method not allowed: {0}")]
    MethodNotAllowed(String),

    #[error("Missing 'prompt' field")]
    MissingPrompt,

    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("Completion API error: {0}")]
    Completion(String),

    #[error("Invalid request body: {0}")]
    InvalidBody(String),
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
            AppError::MissingPrompt => StatusCode::BAD_REQUEST,
            AppError::JsonParse(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Completion(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::InvalidBody(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            AppError::MethodNotAllowed(_) => "method_not_allowed",
            AppError::MissingPrompt => "missing_prompt",
            AppError::JsonParse(_) => "json_parse_error",
            AppError::Completion(_) => "completion_error",
            AppError::InvalidBody(_) => "invalid_body",
        }
    }

    /// Message echoed back as `details` on server errors.
    pub fn details(&self) -> Option<String> {
        match self {
            AppError::MethodNotAllowed(_) | AppError::MissingPrompt => None,
            AppError::JsonParse(e) => Some(e.to_string()),
            AppError::Completion(msg) | AppError::InvalidBody(msg) => Some(msg.clone()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.error_code();

        let body = match self.details() {
            Some(details) => {
                error!(error_code = code, details = %details, "Error processing the query");
                json!({
                    "error": PROCESSING_ERROR_MESSAGE,
                    "details": details
                })
            }
            None => {
                let message = match self {
                    AppError::MethodNotAllowed(_) => METHOD_NOT_ALLOWED_MESSAGE,
                    _ => MISSING_PROMPT_MESSAGE,
                };
                tracing::debug!(error_code = code, "Rejected request: {}", self);
                json!({ "error": message })
            }
        };

        (status, Json(body)).into_response()
    }
}
