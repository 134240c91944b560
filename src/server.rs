use crate::assistant::Assistant;
use crate::config::ServerConfig;
use crate::error::AppError;
use axum::{
    extract::{Request, State},
    http::{header, Method},
    routing::any,
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, instrument};

pub type SharedState = Arc<AppState>;

pub struct AppState {
    pub assistant: Assistant,
    pub max_body_bytes: usize,
}

#[derive(Debug, Serialize)]
pub struct AssistantResponse {
    pub response: String,
}

pub fn create_router(state: SharedState, server: &ServerConfig) -> Router {
    let router = Router::new()
        .route(&server.path, any(handle_assistant))
        .with_state(state)
        .layer(TraceLayer::new_for_http());

    if server.cors {
        router.layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods([Method::POST, Method::OPTIONS])
                .allow_headers([header::CONTENT_TYPE]),
        )
    } else {
        router
    }
}

#[instrument(skip_all, fields(method = %request.method()))]
async fn handle_assistant(
    State(state): State<SharedState>,
    request: Request,
) -> Result<Json<AssistantResponse>, AppError> {
    if *request.method() != Method::POST {
        return Err(AppError::MethodNotAllowed(request.method().to_string()));
    }

    // Read by hand so oversized bodies still get a JSON error.
    let body = axum::body::to_bytes(request.into_body(), state.max_body_bytes)
        .await
        .map_err(|e| AppError::InvalidBody(format!("Failed to read request body: {}", e)))?;

    let payload: serde_json::Value = serde_json::from_slice(&body)?;
    if payload.is_null() {
        return Err(AppError::InvalidBody(
            "Cannot read property 'prompt' of null".to_string(),
        ));
    }
    let prompt = payload
        .get("prompt")
        .and_then(|p| p.as_str())
        .filter(|p| !p.is_empty())
        .ok_or(AppError::MissingPrompt)?;

    info!(prompt_chars = prompt.chars().count(), "Assistant request received");

    let response = state.assistant.answer(prompt).await?;
    Ok(Json(AssistantResponse { response }))
}
