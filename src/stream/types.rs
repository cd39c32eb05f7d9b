// Copyright 2026 The Gantry Authors
// SPDX-License-Identifier: Apache-2.0

// Stream types
//
// Canonical events produced by the per-backend parsers, the framing
// each backend uses on the wire, and stream errors.

use std::fmt;
use std::pin::Pin;

use futures_util::stream::Stream;

use crate::message::ChatCompletionStreamResponse;

// ---------------------------------------------------------------------------
// Framing
// ---------------------------------------------------------------------------

/// How a backend delimits events on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    /// Server-sent events: `field: value` lines, groups end at a blank line.
    Sse,
    /// One JSON document per line.
    JsonLines,
}

/// Fields of one SSE line-group. Only `event` and `data` matter here;
/// `id`, `retry`, comments and unknown fields are dropped.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SseFrame {
    pub event: Option<String>,
    /// All `data:` lines of the group joined with `\n`.
    pub data: Option<String>,
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    StreamStart,
    MessageStart,
    ContentDelta,
    ToolCallDelta,
    ContentEnd,
    MessageEnd,
    StreamEnd,
    Error,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::StreamStart => "stream-start",
            EventKind::MessageStart => "message-start",
            EventKind::ContentDelta => "content-delta",
            EventKind::ToolCallDelta => "tool-call-delta",
            EventKind::ContentEnd => "content-end",
            EventKind::MessageEnd => "message-end",
            EventKind::StreamEnd => "stream-end",
            EventKind::Error => "error",
        }
    }

    /// Parse a canonical event name as it may appear in an `event:` field.
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "stream-start" => EventKind::StreamStart,
            "message-start" => EventKind::MessageStart,
            "content-delta" => EventKind::ContentDelta,
            "tool-call-delta" => EventKind::ToolCallDelta,
            "content-end" => EventKind::ContentEnd,
            "message-end" => EventKind::MessageEnd,
            "stream-end" => EventKind::StreamEnd,
            "error" => EventKind::Error,
            _ => return None,
        })
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One canonical event, produced once per physical event on the wire.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamEvent {
    pub kind: EventKind,
    /// Payload exactly as the backend sent it.
    pub raw: String,
    /// Canonical chunk decoded from the payload, when it carries one.
    pub chunk: Option<ChatCompletionStreamResponse>,
    /// Message for `Error` events.
    pub error: Option<String>,
}

impl StreamEvent {
    pub fn new(kind: EventKind, raw: impl Into<String>) -> Self {
        Self {
            kind,
            raw: raw.into(),
            chunk: None,
            error: None,
        }
    }

    pub fn with_chunk(mut self, chunk: ChatCompletionStreamResponse) -> Self {
        self.chunk = Some(chunk);
        self
    }

    pub fn error(raw: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: EventKind::Error,
            raw: raw.into(),
            chunk: None,
            error: Some(message.into()),
        }
    }
}

/// Canonical events of one streaming call, in arrival order.
pub type EventStream = Pin<Box<dyn Stream<Item = Result<StreamEvent, StreamError>> + Send>>;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StreamError {
    #[error("no stream parser for backend \"{0}\"")]
    UnknownBackend(String),

    #[error("malformed stream fragment: {0}")]
    MalformedFragment(String),

    #[error("stream transport failed: {0}")]
    Transport(String),
}
