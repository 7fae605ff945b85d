//! Cancellable relay of one upstream completion to one SSE client

mod controller;
mod events;
mod registry;

pub use controller::{RelayOutcome, RelayState, StreamRelay};
pub use events::{RelayEvent, EVENT_STREAM_CONTENT_TYPE};
pub use registry::{RegistryError, RelayHandle, SessionRegistry};
