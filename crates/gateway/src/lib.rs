//! HTTP API gateway for CopyCat.
//!
//! Exposes chat creation and turn processing over JSON, plus a health
//! check. Built on Axum.

use axum::extract::DefaultBodyLimit;
use axum::extract::rejection::JsonRejection;
use axum::{
    Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::{error, info, warn};

use copycat_agent::{ChatService, TurnReply};
use copycat_core::error::{Error, StoreError};
use copycat_core::event::EventBus;
use copycat_core::message::ConversationId;
use copycat_store::InMemoryConversationStore;

/// Shared application state for the gateway.
pub struct GatewayState {
    pub chat: ChatService,
}

type SharedState = Arc<GatewayState>;

/// Build the Axum router with all gateway routes.
pub fn build_router(state: SharedState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/api/chat/new", post(new_chat_handler))
        .route("/api/chat/process", post(process_handler))
        .layer(DefaultBodyLimit::max(1024 * 1024)) // 1 MB body limit
        .layer(
            CorsLayer::new()
                .allow_methods([axum::http::Method::GET, axum::http::Method::POST])
                .allow_headers([axum::http::header::CONTENT_TYPE]),
        )
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the gateway HTTP server.
///
/// Builds provider, tools, agent and store once and shares them across
/// requests.
pub async fn start(config: copycat_config::AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let addr = format!("{}:{}", config.gateway.host, config.gateway.port);

    let provider = copycat_providers::build_from_config(&config)?;
    let tools = Arc::new(copycat_tools::default_registry(&config));
    let event_bus = Arc::new(EventBus::default());
    let agent = Arc::new(copycat_agent::agent_from_config(
        &config, provider, tools, event_bus,
    ));
    let store = Arc::new(InMemoryConversationStore::new());

    let state = Arc::new(GatewayState {
        chat: ChatService::new(agent, store),
    });

    let app = build_router(state);

    info!(addr = %addr, "Gateway starting");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// --- Errors ---

/// A failed request: status plus `{ "success": false, "error": ... }`.
struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }
}

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        match e {
            Error::Store(StoreError::NotFound(_)) => Self {
                status: StatusCode::NOT_FOUND,
                message: "Chat not found".into(),
            },
            other => {
                error!(error = %other, "Request failed");
                Self {
                    status: StatusCode::INTERNAL_SERVER_ERROR,
                    message: "Internal server error".into(),
                }
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(serde_json::json!({ "success": false, "error": self.message })),
        )
            .into_response()
    }
}

// --- Handlers ---

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

#[derive(Deserialize)]
struct NewChatRequest {
    #[serde(default)]
    title: Option<String>,
}

#[derive(Serialize)]
struct NewChatResponse {
    success: bool,
    #[serde(rename = "chatId")]
    chat_id: String,
}

async fn new_chat_handler(
    State(state): State<SharedState>,
    payload: Result<Json<NewChatRequest>, JsonRejection>,
) -> Result<Json<NewChatResponse>, ApiError> {
    // An absent or unreadable body just means "no title".
    let title = payload
        .ok()
        .and_then(|Json(p)| p.title)
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| "New Chat".into());

    let chat = state
        .chat
        .store()
        .create(&title)
        .await
        .map_err(Error::from)?;

    Ok(Json(NewChatResponse {
        success: true,
        chat_id: chat.id.to_string(),
    }))
}

#[derive(Deserialize)]
struct ProcessRequest {
    #[serde(rename = "chatId", default)]
    chat_id: Option<String>,
    #[serde(default)]
    prompt: Option<String>,
}

async fn process_handler(
    State(state): State<SharedState>,
    payload: Result<Json<ProcessRequest>, JsonRejection>,
) -> Result<Json<TurnReply>, ApiError> {
    let Json(payload) = payload.map_err(|e| {
        warn!(error = %e, "Rejected malformed request body");
        ApiError::bad_request("chatId and prompt required")
    })?;

    let chat_id = payload.chat_id.filter(|s| !s.trim().is_empty());
    let prompt = payload.prompt.filter(|s| !s.trim().is_empty());
    let (Some(chat_id), Some(prompt)) = (chat_id, prompt) else {
        return Err(ApiError::bad_request("chatId and prompt required"));
    };

    info!(chat_id = %chat_id, prompt_len = prompt.len(), "Processing chat turn");

    let reply = state
        .chat
        .process_turn(&ConversationId::from(chat_id.trim()), &prompt)
        .await?;

    Ok(Json(reply))
}
