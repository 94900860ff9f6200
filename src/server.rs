//! HTTP chat server.
//!
//! Exposes the query pipeline over a small JSON API.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/chat` | Run the pipeline and stream the answer text |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! `POST /chat` takes `{ "messages": [{ "role": ..., "content": ... }] }`
//! and responds with the generation deltas concatenated in arrival order as
//! a plain-text streaming body. Failures before streaming begins return
//! `{ "error": "..." }` with a 4xx/5xx status instead; failures mid-stream
//! terminate the body without retracting what was already sent.
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted to support browser-based
//! clients.

use axum::{
    body::Body,
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::config::Config;
use crate::generation::Message;
use crate::pipeline::ChatPipeline;

/// Shared application state passed to all route handlers.
#[derive(Clone)]
struct AppState {
    pipeline: Arc<ChatPipeline>,
}

/// Starts the chat server.
///
/// Wires the pipeline from configuration, binds to `[server].bind`, and
/// serves until the process is terminated. Returns an error if the corpus
/// cannot be loaded, a provider credential is missing, or binding fails.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let pipeline = Arc::new(ChatPipeline::from_config(config)?);
    let state = AppState { pipeline };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/chat", post(handle_chat))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(state);

    println!("chat server listening on http://{}", config.server.bind);

    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// ============ Error response ============

/// JSON error response body: `{ "error": "..." }`.
#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorBody {
            error: message.into(),
        }),
    )
        .into_response()
}

// ============ GET /health ============

/// JSON response body for `GET /health`.
#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ POST /chat ============

/// JSON request body for `POST /chat`.
#[derive(Deserialize)]
struct ChatRequest {
    messages: Vec<Message>,
}

/// Handler for `POST /chat`.
///
/// Validates the conversation, runs the pipeline, and relays the delta
/// stream as the response body. A pipeline error before the stream is
/// handed over becomes a 500 with `{ "error": "..." }`; a mid-stream error
/// ends the body early.
async fn handle_chat(State(state): State<AppState>, Json(request): Json<ChatRequest>) -> Response {
    if request.messages.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "messages must not be empty");
    }

    match state.pipeline.chat(&request.messages).await {
        Ok(stream) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            Body::from_stream(stream),
        )
            .into_response(),
        Err(e) => {
            eprintln!("chat request failed: {:#}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}
