use std::collections::VecDeque;

use bytes::Bytes;
use serde::Deserialize;
use thiserror::Error;
use tracing::{
    trace,
    warn,
};

use super::consts::{
    DONE_MARKER,
    TOOL_USE_MARKER,
};
use crate::api_client::ApiClientError;
use crate::api_client::send_message_output::SendMessageOutput;

#[derive(Debug, Error)]
pub struct RecvError {
    /// The request id associated with the [SendMessageOutput] stream.
    pub request_id: Option<String>,
    #[source]
    pub source: RecvErrorKind,
}

impl std::fmt::Display for RecvError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Failed to receive the next message: ")?;
        if let Some(request_id) = self.request_id.as_ref() {
            write!(f, "request_id: {}, error: ", request_id)?;
        }
        write!(f, "{}", self.source)?;
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum RecvErrorKind {
    #[error("{0}")]
    Client(#[from] ApiClientError),
    /// A line of a newline-delimited stream was not a valid event frame.
    #[error("{0}")]
    Json(#[from] serde_json::Error),
}

/// How the backend frames the events of a response body.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum, strum::Display, strum::EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum WireFormat {
    /// Raw text chunks with in-band `TOOL_USE` and `DONE` markers.
    #[default]
    Legacy,
    /// One JSON event per line: `{"type": "token" | "tool_start" | "tool_end", "data": ...}`.
    Ndjson,
}

/// A decoded unit of the response stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// Text to append to the reply.
    Token(String),
    /// The backend started invoking tools.
    ToolStart,
    /// The backend finished invoking tools.
    ToolEnd,
}

impl StreamEvent {
    /// Classifies a raw text chunk of the legacy wire format.
    ///
    /// Markers are matched as substrings anywhere in the chunk, so a token that merely contains
    /// `DONE` is treated as the end of a tool invocation.
    pub fn classify(chunk: &str) -> Self {
        if chunk.contains(TOOL_USE_MARKER) {
            StreamEvent::ToolStart
        } else if chunk.contains(DONE_MARKER) {
            StreamEvent::ToolEnd
        } else {
            StreamEvent::Token(chunk.to_owned())
        }
    }
}

/// Incremental UTF-8 decoder.
///
/// Multi-byte sequences split across transport chunks are held back until the rest of the
/// sequence arrives. Invalid sequences are replaced with U+FFFD.
#[derive(Debug, Default)]
pub struct Utf8Decoder {
    pending: Vec<u8>,
}

impl Utf8Decoder {
    pub fn decode(&mut self, chunk: &[u8]) -> String {
        let mut buf = std::mem::take(&mut self.pending);
        buf.extend_from_slice(chunk);

        let mut out = String::with_capacity(buf.len());
        let mut rest = buf.as_slice();
        loop {
            match std::str::from_utf8(rest) {
                Ok(valid) => {
                    out.push_str(valid);
                    break;
                },
                Err(err) => {
                    let (valid, after) = rest.split_at(err.valid_up_to());
                    // `valid_up_to` guarantees this prefix is valid UTF-8.
                    out.push_str(&String::from_utf8_lossy(valid));
                    match err.error_len() {
                        Some(len) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            rest = &after[len..];
                        },
                        None => {
                            // Incomplete sequence at the end of the chunk.
                            self.pending = after.to_vec();
                            break;
                        },
                    }
                },
            }
        }
        out
    }

    /// Flushes whatever is still held back once the stream has ended.
    pub fn finish(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let pending = std::mem::take(&mut self.pending);
        Some(String::from_utf8_lossy(&pending).into_owned())
    }
}

#[derive(Debug, Deserialize)]
struct Frame {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: Option<serde_json::Value>,
}

/// Consumes a [SendMessageOutput] and turns it into a sequence of [StreamEvent]s.
///
/// # Usage
///
/// Repeatedly call [Self::recv] until it returns `Ok(None)`.
#[derive(Debug)]
pub struct ResponseParser {
    response: SendMessageOutput,
    wire_format: WireFormat,
    decoder: Utf8Decoder,
    /// Partial line of a newline-delimited stream.
    line_buf: String,
    /// Events decoded but not yet handed out.
    queue: VecDeque<StreamEvent>,
    ended: bool,
}

impl ResponseParser {
    pub fn new(response: SendMessageOutput, wire_format: WireFormat) -> Self {
        Self {
            response,
            wire_format,
            decoder: Utf8Decoder::default(),
            line_buf: String::new(),
            queue: VecDeque::new(),
            ended: false,
        }
    }

    pub async fn recv(&mut self) -> Result<Option<StreamEvent>, RecvError> {
        loop {
            if let Some(event) = self.queue.pop_front() {
                trace!(?event, "parsed event");
                return Ok(Some(event));
            }
            if self.ended {
                return Ok(None);
            }

            match self.response.recv().await {
                Ok(Some(chunk)) => self.ingest(&chunk)?,
                Ok(None) => {
                    self.ended = true;
                    self.finish()?;
                },
                Err(err) => return Err(self.error(err)),
            }
        }
    }

    fn ingest(&mut self, chunk: &Bytes) -> Result<(), RecvError> {
        let text = self.decoder.decode(chunk);
        self.push_text(text)
    }

    fn finish(&mut self) -> Result<(), RecvError> {
        if let Some(text) = self.decoder.finish() {
            self.push_text(text)?;
        }
        if self.wire_format == WireFormat::Ndjson {
            let line = std::mem::take(&mut self.line_buf);
            self.push_line(&line)?;
        }
        Ok(())
    }

    fn push_text(&mut self, text: String) -> Result<(), RecvError> {
        // A chunk made only of a held back partial character carries no content.
        if text.is_empty() {
            return Ok(());
        }

        match self.wire_format {
            WireFormat::Legacy => {
                self.queue.push_back(StreamEvent::classify(&text));
                Ok(())
            },
            WireFormat::Ndjson => {
                self.line_buf.push_str(&text);
                while let Some(idx) = self.line_buf.find('\n') {
                    let line: String = self.line_buf.drain(..=idx).collect();
                    self.push_line(&line)?;
                }
                Ok(())
            },
        }
    }

    fn push_line(&mut self, line: &str) -> Result<(), RecvError> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(());
        }

        let frame: Frame = serde_json::from_str(line).map_err(|err| self.error(err))?;
        match (frame.kind.as_str(), frame.data) {
            ("token", Some(serde_json::Value::String(text))) => self.queue.push_back(StreamEvent::Token(text)),
            ("token", data) => warn!(?data, "ignoring token frame without text"),
            ("tool_start", _) => self.queue.push_back(StreamEvent::ToolStart),
            ("tool_end", _) => self.queue.push_back(StreamEvent::ToolEnd),
            (kind, _) => warn!(kind, "ignoring unknown frame type"),
        }
        Ok(())
    }

    /// Helper to create a new [RecvError] populated with the associated request id for the stream.
    fn error(&self, source: impl Into<RecvErrorKind>) -> RecvError {
        RecvError {
            request_id: self.response.request_id().map(str::to_string),
            source: source.into(),
        }
    }
}
