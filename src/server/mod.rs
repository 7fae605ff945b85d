//! HTTP surface: routes, SSE bodies and error responses

mod app;
mod error;
mod handlers;
mod sse;

pub use app::{build_router, run_server, AppState};
pub use error::{handle_panic, AppError};
pub use handlers::{CompleteParams, GenerateParams, IndexResponse, ModelEntry, StopParams};
pub use sse::event_stream_response;
