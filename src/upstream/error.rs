//! Errors raised while talking to LM Studio

/// Failure to reach or read from the upstream server
///
/// The messages are shown to end users as-is, so they describe the cause in
/// plain words rather than echoing transport internals.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UpstreamError {
    #[error("Unable to connect to the LM Studio server. Please check if it's running and accessible.")]
    Unreachable,

    #[error("The request to LM Studio server timed out. Please try again later.")]
    TimedOut,

    #[error("Error communicating with the LM Studio server: {0}")]
    Transport(String),

    /// The response started but the body broke off mid-stream
    #[error("{0}")]
    Stream(String),
}

impl UpstreamError {
    /// Categorize an error raised while establishing a request
    pub fn from_request(err: &reqwest::Error) -> Self {
        if err.is_connect() {
            tracing::error!(error = %err, "Connection error");
            UpstreamError::Unreachable
        } else if err.is_timeout() {
            tracing::error!(error = %err, "Timeout error");
            UpstreamError::TimedOut
        } else {
            tracing::error!(error = %err, "Request error");
            UpstreamError::Transport(err.to_string())
        }
    }

    /// Wrap an error raised while reading an already-established body
    pub fn from_stream(err: &reqwest::Error) -> Self {
        UpstreamError::Stream(err.to_string())
    }
}
