//! SSE response body backed by a relay's event channel

use axum::{
    body::Body,
    http::header,
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use futures::stream;
use std::convert::Infallible;
use tokio::sync::mpsc;

use crate::relay::{RelayEvent, EVENT_STREAM_CONTENT_TYPE};

/// Stream frames out of `events` until the relay drops its sender
pub fn event_stream_response(events: mpsc::Receiver<RelayEvent>) -> Response {
    let frames = stream::unfold(events, |mut events| async move {
        let event = events.recv().await?;
        Some((Ok::<Bytes, Infallible>(event.into_bytes()), events))
    });

    (
        [
            (header::CONTENT_TYPE, EVENT_STREAM_CONTENT_TYPE),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        Body::from_stream(frames),
    )
        .into_response()
}
