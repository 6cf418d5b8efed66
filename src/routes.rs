use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, timeout::TimeoutLayer, trace::TraceLayer};
use tracing::{info_span, Instrument};
use uuid::Uuid;

use crate::conversations::single_conversation::process_chat_message;
use crate::conversations::types::{ChatRequest, ChatResult};
use crate::error::ChatError;
use crate::state::AppState;

pub fn create_routes() -> Router<AppState> {
    Router::new()
        // Health check
        .route("/health", get(health_check))
        // Chat API
        .route("/ai/chat", post(chat))
}

/// Routes plus the HTTP middleware stack
pub fn build_app(state: AppState) -> Router {
    let request_timeout = state.config.system_config.request_timeout();

    create_routes()
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(TimeoutLayer::new(request_timeout))
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

async fn health_check() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn chat(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatResult>, ChatError> {
    let span = info_span!(
        "chat",
        request_id = %Uuid::new_v4(),
        tenant_id = request.tenant_id,
        messages = request.messages.len(),
        confirmed = request.confirmed,
    );
    process_chat_message(&state, request)
        .instrument(span)
        .await
        .map(Json)
}
