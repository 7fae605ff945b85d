//! lmstudio-relay: browser-facing SSE relay in front of an LM Studio server
//!
//! Features:
//! - Streaming chat completions relayed as Server-Sent Events
//! - Per-session cancellation through `/stop`
//! - Model listing with a fallback catalogue
//! - Bounded in-memory conversation history

pub mod api;
pub mod config;
pub mod history;
pub mod relay;
pub mod server;
pub mod upstream;

pub use config::AppConfig;
pub use history::ConversationHistory;
pub use relay::{SessionRegistry, StreamRelay};
pub use server::run_server;
pub use upstream::{CompletionBackend, LmStudioClient};
