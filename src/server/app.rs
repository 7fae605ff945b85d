//! Router assembly and the server entry point

use axum::{
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::error::handle_panic;
use super::handlers;
use crate::config::AppConfig;
use crate::history::ConversationHistory;
use crate::relay::SessionRegistry;
use crate::upstream::{CompletionBackend, LmStudioClient};

/// Shared state for every handler
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub backend: Arc<dyn CompletionBackend>,
    pub registry: Arc<SessionRegistry>,
    pub history: Arc<ConversationHistory>,
}

impl AppState {
    pub fn new(config: AppConfig, backend: Arc<dyn CompletionBackend>) -> Self {
        Self {
            registry: Arc::new(SessionRegistry::new(config.sessions.on_collision)),
            history: Arc::new(ConversationHistory::new(&config.history)),
            config: Arc::new(config),
            backend,
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(handlers::index))
        .route("/health", get(handlers::health))
        .route(
            "/generate",
            post(handlers::generate_form).get(handlers::generate_query),
        )
        .route("/stop", post(handlers::stop))
        .route("/clear_history", post(handlers::clear_history))
        .route("/complete", post(handlers::complete))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
                .layer(CatchPanicLayer::custom(handle_panic)),
        )
        .with_state(state)
}

/// Run the relay server until ctrl-c
pub async fn run_server(config: AppConfig) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let backend = LmStudioClient::from_config(&config)?;
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;

    let state = AppState::new(config, Arc::new(backend));
    let registry = state.registry.clone();
    let app = build_router(state.clone());

    let listener = tokio::net::TcpListener::bind(addr).await?;

    tracing::info!("lmstudio-relay listening on {}", addr);
    tracing::info!("Relaying to {}", state.config.backend.base_url());

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let cancelled = registry.cancel_all();
    if cancelled > 0 {
        tracing::info!(cancelled, "Cancelled active relays on shutdown");
    }
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        return;
    }
    tracing::info!("Shutdown signal received");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::upstream::{source_from_chunks, CompletionRequest, FragmentSource, UpstreamError};
    use async_trait::async_trait;
    use axum::{
        body::Body,
        http::{header, Method, Request, StatusCode},
        response::Response,
    };
    use bytes::Bytes;
    use futures::{stream, StreamExt};
    use serde_json::json;
    use tower::ServiceExt;

    const HELLO: &str = "data: {\"choices\":[{\"delta\":{\"content\":\"Hello\"}}]}\n\n";
    const WORLD: &str = "data: {\"choices\":[{\"delta\":{\"content\":\" world\"}}]}\n\n";
    const DONE: &str = "data: [DONE]\n\n";

    /// In-memory stand-in for LM Studio
    struct FakeBackend {
        endless: bool,
        fail: bool,
    }

    #[async_trait]
    impl CompletionBackend for FakeBackend {
        async fn list_models(&self) -> Vec<String> {
            vec!["model-a".to_string(), "model-b".to_string()]
        }

        async fn complete(&self, request: &CompletionRequest) -> Result<serde_json::Value, UpstreamError> {
            if self.fail {
                return Err(UpstreamError::Unreachable);
            }
            Ok(json!({"model": request.model, "choices": [{"message": {"content": "hi"}}]}))
        }

        async fn open_stream(&self, _request: &CompletionRequest) -> Result<FragmentSource, UpstreamError> {
            if self.fail {
                return Err(UpstreamError::TimedOut);
            }
            if self.endless {
                return Ok(FragmentSource::new(stream::repeat(Ok(Bytes::from_static(
                    HELLO.as_bytes(),
                )))));
            }
            Ok(source_from_chunks(&[HELLO, WORLD, DONE]))
        }
    }

    fn state_with(endless: bool, fail: bool) -> AppState {
        AppState::new(AppConfig::default(), Arc::new(FakeBackend { endless, fail }))
    }

    fn form(uri: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    async fn body_text(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    async fn body_json(response: Response) -> serde_json::Value {
        serde_json::from_str(&body_text(response).await).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let app = build_router(state_with(false, false));
        let response = app.oneshot(get("/health")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(response).await, "OK");
    }

    #[tokio::test]
    async fn test_generate_streams_fragments_then_done() {
        let state = state_with(false, false);
        let app = build_router(state.clone());

        let response = app
            .oneshot(form("/generate", "model=model-a&prompt=hi&session_id=s1"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "text/event-stream"
        );

        assert_eq!(
            body_text(response).await,
            "data: {\"content\":\"Hello\"}\n\ndata: {\"content\":\" world\"}\n\ndata: [DONE]\n\n"
        );
        assert!(state.registry.is_empty());
    }

    #[tokio::test]
    async fn test_generate_accepts_query_parameters() {
        let app = build_router(state_with(false, false));
        let response = app
            .oneshot(get("/generate?model=model-a&prompt=hi&session_id=q1"))
            .await
            .unwrap();
        assert!(body_text(response).await.ends_with("data: [DONE]\n\n"));
    }

    #[tokio::test]
    async fn test_generate_upstream_failure_is_error_event() {
        let app = build_router(state_with(false, true));
        let response = app
            .oneshot(form("/generate", "model=m&prompt=hi&session_id=s1"))
            .await
            .unwrap();

        let expected = format!(
            "data: {}\n\n",
            json!({"error": UpstreamError::TimedOut.to_string()})
        );
        assert_eq!(body_text(response).await, expected);
    }

    #[tokio::test]
    async fn test_stop_active_generation() {
        let state = state_with(true, false);
        let app = build_router(state.clone());

        let response = app
            .clone()
            .oneshot(form("/generate", "model=m&prompt=hi&session_id=live"))
            .await
            .unwrap();
        let mut body = response.into_body().into_data_stream();

        let first = body.next().await.unwrap().unwrap();
        assert_eq!(&first[..], b"data: {\"content\":\"Hello\"}\n\n");

        let stopped = app
            .clone()
            .oneshot(form("/stop", "session_id=live"))
            .await
            .unwrap();
        assert_eq!(stopped.status(), StatusCode::OK);
        assert_eq!(body_json(stopped).await, json!({"status": "stopped"}));

        let mut rest = Vec::new();
        while let Some(chunk) = body.next().await {
            rest.extend_from_slice(&chunk.unwrap());
        }
        let rest = String::from_utf8(rest).unwrap();
        assert!(!rest.contains("[DONE]"));
        assert!(!rest.contains("\"error\""));

        assert!(state.registry.is_empty());
        assert!(state.history.is_empty());

        let again = app.oneshot(form("/stop", "session_id=live")).await.unwrap();
        assert_eq!(again.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_stop_unknown_session() {
        let app = build_router(state_with(false, false));
        let response = app.oneshot(form("/stop", "session_id=nobody")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_json(response).await, json!({"status": "not found"}));
    }

    #[tokio::test]
    async fn test_stop_without_form_body_is_not_found() {
        let app = build_router(state_with(false, false));
        let request = Request::builder()
            .method(Method::POST)
            .uri("/stop")
            .body(Body::empty())
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_json(response).await, json!({"status": "not found"}));
    }

    #[tokio::test]
    async fn test_generate_with_json_body_uses_empty_fields() {
        let state = state_with(false, false);
        let app = build_router(state.clone());
        let request = Request::builder()
            .method(Method::POST)
            .uri("/generate")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{}"))
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "text/event-stream"
        );
        assert!(body_text(response).await.ends_with("data: [DONE]\n\n"));

        let entries = state.history.snapshot();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].model, "");
        assert_eq!(entries[0].prompt, "");
    }

    #[tokio::test]
    async fn test_index_lists_models_and_history() {
        let state = state_with(false, false);
        let app = build_router(state.clone());

        let streamed = app
            .clone()
            .oneshot(form("/generate", "model=model-a&prompt=hi&session_id=s1"))
            .await
            .unwrap();
        body_text(streamed).await;

        let index = body_json(app.clone().oneshot(get("/")).await.unwrap()).await;
        assert_eq!(index["data"], json!([{"id": "model-a"}, {"id": "model-b"}]));
        assert_eq!(index["conversation_history"][0]["prompt"], "hi");
        assert_eq!(index["conversation_history"][0]["response"], "Hello world");
        assert!(uuid::Uuid::parse_str(index["session_id"].as_str().unwrap()).is_ok());

        let cleared = app
            .clone()
            .oneshot(form("/clear_history", ""))
            .await
            .unwrap();
        assert_eq!(body_json(cleared).await, json!({"status": "cleared"}));
        assert!(state.history.is_empty());
    }

    #[tokio::test]
    async fn test_complete_returns_upstream_json() {
        let app = build_router(state_with(false, false));
        let response = app
            .oneshot(form("/complete", "model=model-a&prompt=hi"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["model"], "model-a");
    }

    #[tokio::test]
    async fn test_complete_failure_is_500() {
        let app = build_router(state_with(false, true));
        let response = app
            .oneshot(form("/complete", "model=model-a&prompt=hi"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            body_json(response).await,
            json!({"error": UpstreamError::Unreachable.to_string()})
        );
    }
}
