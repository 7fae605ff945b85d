//! Client side of the relay: LM Studio's OpenAI-compatible API

mod client;
mod error;
mod fragments;

pub use client::LmStudioClient;
pub use error::UpstreamError;
pub use fragments::{
    parse_line, FragmentSource, LineEvent, StreamStep, MALFORMED_LINE_MARKER,
    UNEXPECTED_LINE_MARKER,
};

#[cfg(test)]
pub(crate) use fragments::tests::source_from_chunks;

use async_trait::async_trait;

/// One generation request as the web client submitted it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionRequest {
    pub model: String,
    pub prompt: String,
    pub stream: bool,
}

/// Inference server the relay forwards to
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    /// Known models; never fails, falls back to the configured list
    async fn list_models(&self) -> Vec<String>;

    /// Run a non-streaming completion and return the raw JSON body
    async fn complete(&self, request: &CompletionRequest) -> Result<serde_json::Value, UpstreamError>;

    /// Start a streaming completion
    async fn open_stream(&self, request: &CompletionRequest) -> Result<FragmentSource, UpstreamError>;
}
