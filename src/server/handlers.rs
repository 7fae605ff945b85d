//! Route handlers

use axum::{
    extract::{Form, Query, State},
    http::StatusCode,
    response::Response,
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::mpsc;

use super::app::AppState;
use super::error::AppError;
use super::sse::event_stream_response;
use crate::history::Exchange;
use crate::relay::StreamRelay;
use crate::upstream::CompletionRequest;

/// `/generate` parameters; missing fields are empty strings
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct GenerateParams {
    pub model: String,
    pub prompt: String,
    pub session_id: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StopParams {
    pub session_id: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CompleteParams {
    pub model: String,
    pub prompt: String,
}

#[derive(Debug, Serialize)]
pub struct ModelEntry {
    pub id: String,
}

/// Data behind the chat page
#[derive(Debug, Serialize)]
pub struct IndexResponse {
    pub data: Vec<ModelEntry>,
    pub conversation_history: Vec<Exchange>,
    /// Fresh id a client may use to correlate `/generate` and `/stop`
    pub session_id: String,
}

/// Form fields, or all-empty parameters when the body is not a readable form
fn form_or_default<T: Default>(form: Option<Form<T>>) -> T {
    match form {
        Some(Form(params)) => params,
        None => {
            tracing::debug!("Request body is not form data, using empty parameters");
            T::default()
        }
    }
}

pub async fn index(State(state): State<AppState>) -> Json<IndexResponse> {
    let models = state.backend.list_models().await;
    Json(IndexResponse {
        data: models.into_iter().map(|id| ModelEntry { id }).collect(),
        conversation_history: state.history.snapshot(),
        session_id: uuid::Uuid::new_v4().to_string(),
    })
}

pub async fn health() -> &'static str {
    "OK"
}

pub async fn generate_form(State(state): State<AppState>, form: Option<Form<GenerateParams>>) -> Response {
    start_relay(state, form_or_default(form))
}

pub async fn generate_query(State(state): State<AppState>, Query(params): Query<GenerateParams>) -> Response {
    start_relay(state, params)
}

/// Spawn the relay task and hand its event channel to the response body
fn start_relay(state: AppState, params: GenerateParams) -> Response {
    tracing::info!(
        model = %params.model,
        session_id = %params.session_id,
        "Generating with model"
    );

    let request = CompletionRequest {
        model: params.model,
        prompt: params.prompt,
        stream: true,
    };
    let (tx, rx) = mpsc::channel(state.config.sessions.channel_capacity);

    let relay = StreamRelay::new(params.session_id, request.clone(), state.registry.clone())
        .with_history(state.history.clone());
    let backend = state.backend.clone();

    tokio::spawn(async move {
        relay.run(backend.open_stream(&request), tx).await;
    });

    event_stream_response(rx)
}

pub async fn stop(State(state): State<AppState>, form: Option<Form<StopParams>>) -> (StatusCode, Json<serde_json::Value>) {
    let params = form_or_default(form);
    if state.registry.cancel(&params.session_id) {
        tracing::info!(session_id = %params.session_id, "Generation stopped");
        (StatusCode::OK, Json(json!({ "status": "stopped" })))
    } else {
        tracing::debug!(session_id = %params.session_id, "Stop requested for unknown session");
        (StatusCode::NOT_FOUND, Json(json!({ "status": "not found" })))
    }
}

pub async fn clear_history(State(state): State<AppState>) -> Json<serde_json::Value> {
    let removed = state.history.clear();
    tracing::info!(removed, "Conversation history cleared");
    Json(json!({ "status": "cleared" }))
}

/// Non-streaming completion, upstream JSON returned as-is
pub async fn complete(
    State(state): State<AppState>,
    form: Option<Form<CompleteParams>>,
) -> Result<Json<serde_json::Value>, AppError> {
    let params = form_or_default(form);
    let request = CompletionRequest {
        model: params.model,
        prompt: params.prompt,
        stream: false,
    };
    let body = state.backend.complete(&request).await?;
    Ok(Json(body))
}
