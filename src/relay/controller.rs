//! Drives one relay from upstream fragments to downstream SSE events

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::mpsc;

use super::events::RelayEvent;
use super::registry::{RegistryError, RelayHandle, SessionRegistry};
use crate::config::CollisionPolicy;
use crate::history::{ConversationHistory, Exchange};
use crate::upstream::{CompletionRequest, FragmentSource, StreamStep, UpstreamError};

/// Lifecycle of a relay
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayState {
    Starting,
    Streaming,
    Completed,
    Cancelled,
    Failed,
}

impl fmt::Display for RelayState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RelayState::Starting => write!(f, "starting"),
            RelayState::Streaming => write!(f, "streaming"),
            RelayState::Completed => write!(f, "completed"),
            RelayState::Cancelled => write!(f, "cancelled"),
            RelayState::Failed => write!(f, "failed"),
        }
    }
}

/// How a relay ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayOutcome {
    Completed { fragments: usize },
    Cancelled,
    Failed(String),
}

impl RelayOutcome {
    pub fn state(&self) -> RelayState {
        match self {
            RelayOutcome::Completed { .. } => RelayState::Completed,
            RelayOutcome::Cancelled => RelayState::Cancelled,
            RelayOutcome::Failed(_) => RelayState::Failed,
        }
    }
}

/// One generation request relayed to one web client
pub struct StreamRelay {
    session_id: String,
    request: CompletionRequest,
    registry: Arc<SessionRegistry>,
    history: Option<Arc<ConversationHistory>>,
    state: RelayState,
}

impl StreamRelay {
    pub fn new(session_id: impl Into<String>, request: CompletionRequest, registry: Arc<SessionRegistry>) -> Self {
        Self {
            session_id: session_id.into(),
            request,
            registry,
            history: None,
            state: RelayState::Starting,
        }
    }

    /// Record the exchange here when the relay completes
    pub fn with_history(mut self, history: Arc<ConversationHistory>) -> Self {
        self.history = Some(history);
        self
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn state(&self) -> RelayState {
        self.state
    }

    fn transition(&mut self, next: RelayState) {
        tracing::debug!(
            session_id = %self.session_id,
            from = %self.state,
            to = %next,
            "Relay state change"
        );
        self.state = next;
    }

    /// Run the relay to its end
    ///
    /// `open` starts the upstream completion. Events go to `events`; a closed
    /// channel means the client went away and ends the relay as cancelled.
    /// The registry entry is released as the last step, whatever the outcome.
    pub async fn run<F>(mut self, open: F, events: mpsc::Sender<RelayEvent>) -> RelayOutcome
    where
        F: Future<Output = Result<FragmentSource, UpstreamError>>,
    {
        tracing::info!(
            session_id = %self.session_id,
            model = %self.request.model,
            prompt_len = self.request.prompt.len(),
            "Generating"
        );

        let mut response = String::new();
        let mut handle: Option<Arc<RelayHandle>> = None;

        let outcome = match self.start(open).await {
            Ok((source, registered)) => {
                self.transition(RelayState::Streaming);
                let outcome = self.stream(source, &registered, &events, &mut response).await;
                handle = Some(registered);
                outcome
            }
            Err(message) => RelayOutcome::Failed(message),
        };
        let outcome = settle(outcome, handle.as_deref());
        self.transition(outcome.state());

        match outcome {
            RelayOutcome::Completed { fragments } => {
                tracing::info!(session_id = %self.session_id, fragments, "Relay completed");
                if events.send(RelayEvent::Done).await.is_err() {
                    tracing::debug!(session_id = %self.session_id, "Client gone before terminal event");
                }
                if let Some(ref history) = self.history {
                    history.record(Exchange::new(
                        self.request.model.clone(),
                        self.request.prompt.clone(),
                        response,
                    ));
                }
            }
            RelayOutcome::Cancelled => {
                tracing::info!(session_id = %self.session_id, "Relay cancelled");
            }
            RelayOutcome::Failed(ref message) => {
                tracing::error!(session_id = %self.session_id, error = %message, "Error during generation");
                if events.send(RelayEvent::Error(message.clone())).await.is_err() {
                    tracing::debug!(session_id = %self.session_id, "Client gone before terminal event");
                }
            }
        }

        if let Some(ref handle) = handle {
            if !self.registry.remove_if_current(&self.session_id, handle) {
                tracing::trace!(session_id = %self.session_id, "Registry entry already released");
            }
        }

        outcome
    }

    /// STARTING: open the upstream stream and register a cancellation handle
    async fn start<F>(&self, open: F) -> Result<(FragmentSource, Arc<RelayHandle>), String>
    where
        F: Future<Output = Result<FragmentSource, UpstreamError>>,
    {
        // Avoid a wasted upstream request when the id is known to be taken
        if self.registry.policy() == CollisionPolicy::Reject && self.registry.contains(&self.session_id) {
            return Err(RegistryError::SessionBusy(self.session_id.clone()).to_string());
        }

        let source = open.await.map_err(|e| e.to_string())?;

        let handle = RelayHandle::new();
        self.registry
            .try_register(&self.session_id, handle.clone())
            .map_err(|e| e.to_string())?;

        Ok((source, handle))
    }

    /// STREAMING: check for cancellation before every pull
    async fn stream(
        &self,
        mut source: FragmentSource,
        handle: &RelayHandle,
        events: &mpsc::Sender<RelayEvent>,
        response: &mut String,
    ) -> RelayOutcome {
        let mut fragments = 0;

        loop {
            if handle.is_cancelled() {
                return RelayOutcome::Cancelled;
            }

            match source.next_step().await {
                StreamStep::Fragment(fragment) => {
                    response.push_str(&fragment);
                    if events.send(RelayEvent::Content(fragment)).await.is_err() {
                        tracing::info!(session_id = %self.session_id, "Client disconnected");
                        return RelayOutcome::Cancelled;
                    }
                    fragments += 1;
                }
                StreamStep::Failed(e) => return RelayOutcome::Failed(e.to_string()),
                StreamStep::End if handle.is_cancelled() => return RelayOutcome::Cancelled,
                StreamStep::End => return RelayOutcome::Completed { fragments },
            }
        }
    }
}

/// A stop that lands after the upstream ended still wins over completion
fn settle(outcome: RelayOutcome, handle: Option<&RelayHandle>) -> RelayOutcome {
    match outcome {
        RelayOutcome::Completed { .. } if handle.is_some_and(RelayHandle::is_cancelled) => {
            RelayOutcome::Cancelled
        }
        other => other,
    }
}
