//! Line-oriented SSE decoding of a streaming chat completion body

use bytes::Bytes;
use futures::stream::BoxStream;
use futures::{Stream, StreamExt};
use std::collections::VecDeque;

use super::UpstreamError;
use crate::api::delta_content;

/// Fragment emitted in place of a `data:` line whose payload is not JSON
pub const MALFORMED_LINE_MARKER: &str = "Error: Invalid response format from server";

/// Fragment emitted in place of a line that is not SSE data at all
pub const UNEXPECTED_LINE_MARKER: &str = "Warning: Unexpected response format from server";

const DATA_PREFIX: &str = "data: ";
const DONE_LINE: &str = "data: [DONE]";

/// Result of pulling once from a [`FragmentSource`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamStep {
    Fragment(String),
    Failed(UpstreamError),
    End,
}

/// What a single upstream line means for the relay
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineEvent {
    /// Text to forward downstream
    Fragment(String),
    /// Valid data with nothing to forward (empty delta, role-only chunk)
    Skip,
    /// `data: [DONE]`
    Done,
    Malformed,
    Unexpected,
}

impl LineEvent {
    /// Fragment text this line contributes, markers included
    pub fn fragment(self) -> Option<String> {
        match self {
            LineEvent::Fragment(text) => Some(text),
            LineEvent::Malformed => Some(MALFORMED_LINE_MARKER.to_string()),
            LineEvent::Unexpected => Some(UNEXPECTED_LINE_MARKER.to_string()),
            LineEvent::Skip | LineEvent::Done => None,
        }
    }
}

/// Classify one trimmed, non-empty upstream line
pub fn parse_line(line: &str) -> LineEvent {
    tracing::debug!(line = %line, "Received line");

    if line == DONE_LINE {
        tracing::info!("Stream completed");
        return LineEvent::Done;
    }

    let Some(payload) = line.strip_prefix(DATA_PREFIX) else {
        tracing::warn!(line = %line, "Unexpected line format");
        return LineEvent::Unexpected;
    };

    match serde_json::from_str::<serde_json::Value>(payload) {
        Ok(chunk) => match delta_content(&chunk) {
            Some(content) => LineEvent::Fragment(content.to_string()),
            None => LineEvent::Skip,
        },
        Err(e) => {
            tracing::error!(error = %e, line = %line, "Error decoding JSON");
            LineEvent::Malformed
        }
    }
}

/// Lazy, single-pass sequence of text fragments from an upstream body
///
/// Every call to [`FragmentSource::next_step`] reads just enough of the body
/// to produce the next fragment. Once `End` or `Failed` has been returned the
/// source stays exhausted.
pub struct FragmentSource {
    body: BoxStream<'static, Result<Bytes, UpstreamError>>,
    buffer: Vec<u8>,
    lines: VecDeque<String>,
    body_done: bool,
    finished: bool,
}

impl FragmentSource {
    pub fn new<S>(body: S) -> Self
    where
        S: Stream<Item = Result<Bytes, UpstreamError>> + Send + 'static,
    {
        Self {
            body: body.boxed(),
            buffer: Vec::new(),
            lines: VecDeque::new(),
            body_done: false,
            finished: false,
        }
    }

    /// Wrap a streaming reqwest response
    pub fn from_response(response: reqwest::Response) -> Self {
        Self::new(
            response
                .bytes_stream()
                .map(|chunk| chunk.map_err(|e| UpstreamError::from_stream(&e))),
        )
    }

    /// Pull the next fragment
    pub async fn next_step(&mut self) -> StreamStep {
        loop {
            if self.finished {
                return StreamStep::End;
            }

            while let Some(line) = self.lines.pop_front() {
                if line.is_empty() {
                    continue;
                }
                match parse_line(&line) {
                    LineEvent::Done => {
                        self.finish();
                        return StreamStep::End;
                    }
                    event => {
                        if let Some(fragment) = event.fragment() {
                            return StreamStep::Fragment(fragment);
                        }
                    }
                }
            }

            if self.body_done {
                self.finish();
                return StreamStep::End;
            }

            match self.body.next().await {
                Some(Ok(chunk)) => {
                    tracing::trace!("Raw chunk ({} bytes)", chunk.len());
                    self.buffer.extend_from_slice(&chunk);
                    self.split_lines();
                }
                Some(Err(e)) => {
                    tracing::error!(error = %e, "Error reading stream chunk");
                    self.finish();
                    return StreamStep::Failed(e);
                }
                None => {
                    self.body_done = true;
                    if !self.buffer.is_empty() {
                        let rest = std::mem::take(&mut self.buffer);
                        self.lines.push_back(decode_line(&rest));
                    }
                }
            }
        }
    }

    fn split_lines(&mut self) {
        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            self.lines.push_back(decode_line(&line));
        }
    }

    fn finish(&mut self) {
        self.finished = true;
        self.lines.clear();
        self.buffer.clear();
    }
}

fn decode_line(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw).trim().to_string()
}
