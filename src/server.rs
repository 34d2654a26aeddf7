use crate::config::BackendTarget;
use crate::logging::{LogLevel, SharedLogger, Stage};
use crate::proxy::{self, RelayOutcome};
use crate::translate::openai_types::{ChatCompletionRequest, RelayErrorBody};
use crate::translate::response::RELAY_MODEL;

use axum::body::Body;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use bytes::Bytes;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct AppState {
    pub backend: BackendTarget,
    pub client: reqwest::Client,
    pub logger: SharedLogger,
}

pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/v1/chat/completions", post(handle_chat_completions))
        .route("/health", get(handle_health))
        .route("/v1/models", get(handle_models))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn handle_chat_completions(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    let request_id = uuid::Uuid::new_v4().to_string();

    let raw: serde_json::Value = match serde_json::from_slice(&body) {
        Ok(v) => v,
        Err(e) => return reject_invalid(&state, &request_id, e),
    };
    if !raw.is_object() {
        return reject_invalid(&state, &request_id, "expected a JSON object");
    }

    state.logger.request(
        LogLevel::Info,
        Stage::Inbound,
        &request_id,
        "Received request",
        Some(raw.clone()),
    );

    let req: ChatCompletionRequest = match serde_json::from_value(raw) {
        Ok(r) => r,
        Err(e) => return reject_invalid(&state, &request_id, e),
    };

    match proxy::relay_chat(&req, &state.backend, &state.client, &state.logger, &request_id).await
    {
        Ok(RelayOutcome::Stream(frames)) => Response::builder()
            .status(StatusCode::OK)
            .header(header::CONTENT_TYPE, "text/event-stream")
            .header(header::CACHE_CONTROL, "no-cache")
            .body(Body::from_stream(frames))
            .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response()),
        Ok(RelayOutcome::Rejected(err, status_code)) => {
            let status = StatusCode::from_u16(status_code).unwrap_or(StatusCode::BAD_GATEWAY);
            (status, Json(err)).into_response()
        }
        Err(e) => {
            state.logger.request(
                LogLevel::Error,
                Stage::Upstream,
                &request_id,
                format!("Relay error: {}", e),
                None,
            );
            let err = RelayErrorBody::backend_failed(StatusCode::BAD_GATEWAY.as_u16());
            (StatusCode::BAD_GATEWAY, Json(err)).into_response()
        }
    }
}

fn reject_invalid(state: &AppState, request_id: &str, reason: impl std::fmt::Display) -> Response {
    state.logger.request(
        LogLevel::Warn,
        Stage::Inbound,
        request_id,
        format!("Rejected request body: {}", reason),
        None,
    );
    let err = RelayErrorBody::invalid_request(reason);
    (StatusCode::BAD_REQUEST, Json(err)).into_response()
}

async fn handle_health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn handle_models() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "object": "list",
        "data": [{
            "id": RELAY_MODEL,
            "object": "model",
            "owned_by": "dify",
        }],
    }))
}
