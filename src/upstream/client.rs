//! HTTP client for the LM Studio server

use async_trait::async_trait;
use std::collections::BTreeSet;
use std::time::Duration;

use super::{CompletionBackend, CompletionRequest, FragmentSource, UpstreamError};
use crate::api::{ChatCompletionRequest, Message, ModelsResponse};
use crate::config::{AppConfig, BackendConfig, GenerationConfig};

/// Client for LM Studio's OpenAI-compatible endpoints
#[derive(Clone)]
pub struct LmStudioClient {
    base_url: String,
    api_key: Option<String>,
    http_client: reqwest::Client,
    models_timeout: Duration,
    fallback_models: Vec<String>,
    generation: GenerationConfig,
}

/// Build an HTTP client with timeouts and TLS configuration
fn build_http_client(backend: &BackendConfig) -> Result<reqwest::Client, Box<dyn std::error::Error + Send + Sync>> {
    let timeout = Duration::from_secs(backend.timeout_seconds);
    let mut client_builder = reqwest::Client::builder()
        .connect_timeout(timeout)
        .read_timeout(timeout)
        .pool_max_idle_per_host(10);

    if let Some(ref tls) = backend.tls {
        if tls.accept_invalid_certs {
            client_builder = client_builder.danger_accept_invalid_certs(true);
            tracing::warn!("TLS: Accepting invalid certificates (use only for development/testing)");
        }

        if let Some(ref ca_path) = tls.ca_cert_path {
            let ca_cert = std::fs::read(ca_path)?;
            let ca_cert = reqwest::Certificate::from_pem(&ca_cert)?;
            client_builder = client_builder.add_root_certificate(ca_cert);
            tracing::info!("TLS: Loaded custom CA certificate from {}", ca_path);
        }

        if let (Some(cert_path), Some(key_path)) = (&tls.client_cert_path, &tls.client_key_path) {
            let cert_pem = std::fs::read(cert_path)?;
            let key_pem = std::fs::read(key_path)?;
            let identity = reqwest::Identity::from_pem(&[cert_pem, key_pem].concat())?;
            client_builder = client_builder.identity(identity);
            tracing::info!("TLS: Loaded client certificate from {} for mTLS", cert_path);
        }
    }

    Ok(client_builder.build()?)
}

/// Union of the fallback list and the upstream list, without duplicates
pub fn merge_models<I>(fallback: &[String], upstream: I) -> Vec<String>
where
    I: IntoIterator<Item = String>,
{
    fallback
        .iter()
        .cloned()
        .chain(upstream)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

impl LmStudioClient {
    pub fn from_config(config: &AppConfig) -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        Ok(Self {
            base_url: config.backend.base_url().to_string(),
            api_key: config.backend.api_key.clone(),
            http_client: build_http_client(&config.backend)?,
            models_timeout: Duration::from_secs(config.backend.models_timeout_seconds),
            fallback_models: config.models.fallback.clone(),
            generation: config.generation.clone(),
        })
    }

    /// Override the model listing timeout
    pub fn with_models_timeout(mut self, timeout: Duration) -> Self {
        self.models_timeout = timeout;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// List models, merged with the fallback list; never fails
    pub async fn get_models(&self) -> Vec<String> {
        match self.fetch_models().await {
            Ok(upstream) => {
                tracing::debug!(upstream_count = upstream.len(), "Fetched models from backend");
                merge_models(&self.fallback_models, upstream)
            }
            Err(e) => {
                tracing::error!(error = %e, "Error fetching models");
                merge_models(&self.fallback_models, Vec::new())
            }
        }
    }

    async fn fetch_models(&self) -> Result<Vec<String>, reqwest::Error> {
        let url = format!("{}/v1/models", self.base_url);
        let response = self
            .authorize(self.http_client.get(&url))
            .timeout(self.models_timeout)
            .send()
            .await?
            .error_for_status()?;
        let models: ModelsResponse = response.json().await?;
        Ok(models.data.into_iter().map(|m| m.id).collect())
    }

    /// Request body for a completion
    pub fn payload(&self, request: &CompletionRequest) -> ChatCompletionRequest {
        ChatCompletionRequest {
            model: request.model.clone(),
            messages: vec![Message::user(request.prompt.clone())],
            temperature: self.generation.temperature,
            max_tokens: self.generation.max_tokens,
            stream: request.stream,
        }
    }

    /// Send the completion request and check the status
    async fn send_completion(&self, request: &CompletionRequest) -> Result<reqwest::Response, UpstreamError> {
        let url = format!("{}/v1/chat/completions", self.base_url);
        let payload = self.payload(request);

        tracing::debug!(
            url = %url,
            model = %payload.model,
            stream = payload.stream,
            "Sending completion request"
        );

        let response = self
            .authorize(self.http_client.post(&url))
            .json(&payload)
            .send()
            .await
            .map_err(|e| UpstreamError::from_request(&e))?;

        response.error_for_status().map_err(|e| UpstreamError::from_request(&e))
    }

    /// Non-streaming completion: the parsed JSON body
    pub async fn generate(&self, request: &CompletionRequest) -> Result<serde_json::Value, UpstreamError> {
        let response = self.send_completion(request).await?;
        response
            .json::<serde_json::Value>()
            .await
            .map_err(|e| UpstreamError::from_request(&e))
    }

    /// Streaming completion: a lazy fragment source over the response body
    pub async fn generate_stream(&self, request: &CompletionRequest) -> Result<FragmentSource, UpstreamError> {
        let response = self.send_completion(request).await?;
        Ok(FragmentSource::from_response(response))
    }

    fn authorize(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.api_key {
            Some(ref api_key) => builder.bearer_auth(api_key),
            None => builder,
        }
    }
}

#[async_trait]
impl CompletionBackend for LmStudioClient {
    async fn list_models(&self) -> Vec<String> {
        self.get_models().await
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<serde_json::Value, UpstreamError> {
        let request = CompletionRequest {
            stream: false,
            ..request.clone()
        };
        self.generate(&request).await
    }

    async fn open_stream(&self, request: &CompletionRequest) -> Result<FragmentSource, UpstreamError> {
        let request = CompletionRequest {
            stream: true,
            ..request.clone()
        };
        self.generate_stream(&request).await
    }
}
