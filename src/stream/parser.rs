// Copyright 2026 The Gantry Authors
// SPDX-License-Identifier: Apache-2.0

// Stream parsers
//
// Turn one framed group into one canonical StreamEvent. SSE parsers hold no
// state between groups. The Ollama parser numbers tool calls across the
// lines of one call, so each stream starts from a fresh session.
//
// Three implementations, selected by backend identifier:
// - OpenAI-compatible SSE (event type sniffed from the payload)
// - Anthropic SSE (event type from the `event:` field, payload transcoded)
// - Ollama NDJSON (`done` flag drives the event type, payload transcoded)

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use serde_json::Value;

use crate::message::{
    ChatCompletionStreamResponse, Delta, FunctionChunk, Role, ToolCallChunk, Usage,
};
use crate::provider::codec::{anthropic_finish_reason, ollama_finish_reason, ollama_tool_calls};
use crate::provider::registry::{self, CodecKind};

use super::types::{EventKind, Framing, SseFrame, StreamError, StreamEvent};

/// Terminal payload recognised for every backend.
pub const DONE_PAYLOAD: &str = "[DONE]";

// ---------------------------------------------------------------------------
// Trait: StreamParser
// ---------------------------------------------------------------------------

pub trait StreamParser: Send + Sync {
    fn framing(&self) -> Framing;

    /// Decode one group. `Ok(None)` means the group carries nothing
    /// (comments, keep-alives, unrecognised fields).
    fn parse(&self, group: &str) -> Result<Option<StreamEvent>, StreamError>;

    /// Parser for one streaming call. Stateless dialects hand back `self`.
    fn session(self: Arc<Self>) -> Arc<dyn StreamParser>;
}

/// Select the parser for a backend identifier.
pub fn parser_for(identifier: &str) -> Result<Arc<dyn StreamParser>, StreamError> {
    let spec = registry::lookup(identifier)
        .map_err(|_| StreamError::UnknownBackend(identifier.to_string()))?;
    Ok(match spec.codec {
        CodecKind::OpenAiCompatible => Arc::new(OpenAiStreamParser),
        CodecKind::Anthropic => Arc::new(AnthropicStreamParser),
        CodecKind::Ollama => Arc::new(OllamaStreamParser::default()),
    })
}

// ---------------------------------------------------------------------------
// SSE group parsing
// ---------------------------------------------------------------------------

/// Split an SSE group into its `event` and `data` fields.
pub fn parse_sse_group(group: &str) -> SseFrame {
    let mut frame = SseFrame::default();

    for line in group.lines() {
        let line = line.trim_end_matches('\r');
        if line.is_empty() || line.starts_with(':') {
            continue;
        }
        let (field, value) = match line.split_once(':') {
            Some((f, v)) => (f, v.strip_prefix(' ').unwrap_or(v)),
            None => (line, ""),
        };
        match field {
            "event" => frame.event = Some(value.trim().to_string()),
            "data" => match frame.data.as_mut() {
                Some(data) => {
                    data.push('\n');
                    data.push_str(value);
                }
                None => frame.data = Some(value.to_string()),
            },
            _ => {}
        }
    }

    frame
}

fn malformed(e: impl std::fmt::Display) -> StreamError {
    StreamError::MalformedFragment(e.to_string())
}

/// Human-readable message from an error payload.
fn error_message(value: &Value) -> String {
    match value.get("error") {
        Some(Value::String(s)) => s.clone(),
        Some(err) => err
            .get("message")
            .and_then(|m| m.as_str())
            .map(str::to_string)
            .unwrap_or_else(|| err.to_string()),
        None => value.to_string(),
    }
}

// ---------------------------------------------------------------------------
// OpenAI-compatible parser
// ---------------------------------------------------------------------------

fn is_error(p: &str) -> bool {
    p.contains("\"error\":")
}

fn is_tool_call_delta(p: &str) -> bool {
    p.contains("\"tool_calls\":[{")
}

fn is_message_end(p: &str) -> bool {
    p.contains("\"finish_reason\":\"")
}

fn is_message_start(p: &str) -> bool {
    p.contains("\"role\":\"assistant\"")
        && (!p.contains("\"content\":\"") || p.contains("\"content\":\"\""))
}

fn is_content_delta(p: &str) -> bool {
    p.contains("\"content\":")
}

/// Event-type sniffing for payloads without an `event:` field, tried in
/// order against the compact JSON text. First match wins.
const SNIFF_RULES: &[(fn(&str) -> bool, EventKind)] = &[
    (is_error, EventKind::Error),
    (is_tool_call_delta, EventKind::ToolCallDelta),
    (is_message_end, EventKind::MessageEnd),
    (is_message_start, EventKind::MessageStart),
    (is_content_delta, EventKind::ContentDelta),
];

/// Sniff the event type of a payload. Any other non-empty JSON is content.
pub fn sniff_event_kind(value: &Value) -> EventKind {
    let compact = value.to_string();
    SNIFF_RULES
        .iter()
        .find(|(matches, _)| matches(&compact))
        .map(|(_, kind)| *kind)
        .unwrap_or(EventKind::ContentDelta)
}

/// Parses OpenAI chat-completion chunks.
///
/// - `data: {"choices":[{"delta":{"role":"assistant","content":""}}]}` -> MessageStart
/// - `data: {"choices":[{"delta":{"content":"Hi"}}]}` -> ContentDelta
/// - `data: {"choices":[{"delta":{"tool_calls":[{"index":0,...}]}}]}` -> ToolCallDelta
/// - `data: {"choices":[{"delta":{},"finish_reason":"stop"}]}` -> MessageEnd
/// - `data: [DONE]` -> StreamEnd
pub struct OpenAiStreamParser;

impl StreamParser for OpenAiStreamParser {
    fn framing(&self) -> Framing {
        Framing::Sse
    }

    fn session(self: Arc<Self>) -> Arc<dyn StreamParser> {
        self
    }

    fn parse(&self, group: &str) -> Result<Option<StreamEvent>, StreamError> {
        let frame = parse_sse_group(group);
        let payload = match frame.data.as_deref().map(str::trim) {
            Some(p) if !p.is_empty() => p,
            _ => return Ok(None),
        };

        if payload == DONE_PAYLOAD {
            return Ok(Some(StreamEvent::new(EventKind::StreamEnd, payload)));
        }

        let value: Value = serde_json::from_str(payload).map_err(malformed)?;
        let kind = frame
            .event
            .as_deref()
            .and_then(EventKind::from_name)
            .unwrap_or_else(|| sniff_event_kind(&value));

        if kind == EventKind::Error || value.get("error").is_some() {
            return Ok(Some(StreamEvent::error(payload, error_message(&value))));
        }

        let chunk: ChatCompletionStreamResponse =
            serde_json::from_value(value).map_err(malformed)?;
        Ok(Some(StreamEvent::new(kind, payload).with_chunk(chunk)))
    }
}

// ---------------------------------------------------------------------------
// Anthropic parser
// ---------------------------------------------------------------------------

/// Parses Anthropic messages-API events into canonical chunks.
///
/// - `message_start` -> MessageStart (assistant role)
/// - `content_block_start` text -> ContentDelta, tool_use -> ToolCallDelta (id, name)
/// - `content_block_delta` text_delta -> ContentDelta, input_json_delta -> ToolCallDelta
/// - `content_block_stop` -> ContentEnd
/// - `message_delta` -> MessageEnd (stop reason mapped to finish reason)
/// - `message_stop` -> StreamEnd
/// - `ping` and unknown events are skipped
///
/// Tool-call indices are Anthropic content-block indices, so a turn that
/// opens with text numbers its first tool call 1.
pub struct AnthropicStreamParser;

impl AnthropicStreamParser {
    fn chunk(value: &Value, delta: Delta) -> ChatCompletionStreamResponse {
        let message = value.get("message");
        let id = message
            .and_then(|m| m.get("id"))
            .and_then(|v| v.as_str())
            .unwrap_or("");
        let model = message
            .and_then(|m| m.get("model"))
            .and_then(|v| v.as_str())
            .unwrap_or("");
        ChatCompletionStreamResponse::from_delta(id, model, delta, None)
    }

    fn index(value: &Value) -> usize {
        value.get("index").and_then(|i| i.as_u64()).unwrap_or(0) as usize
    }
}

impl StreamParser for AnthropicStreamParser {
    fn framing(&self) -> Framing {
        Framing::Sse
    }

    fn session(self: Arc<Self>) -> Arc<dyn StreamParser> {
        self
    }

    fn parse(&self, group: &str) -> Result<Option<StreamEvent>, StreamError> {
        let frame = parse_sse_group(group);
        let payload = match frame.data.as_deref().map(str::trim) {
            Some(p) if !p.is_empty() => p,
            _ => return Ok(None),
        };

        if payload == DONE_PAYLOAD {
            return Ok(Some(StreamEvent::new(EventKind::StreamEnd, payload)));
        }

        let value: Value = serde_json::from_str(payload).map_err(malformed)?;
        let event = frame
            .event
            .clone()
            .or_else(|| value.get("type").and_then(|t| t.as_str()).map(str::to_string))
            .unwrap_or_default();

        let event = match event.as_str() {
            "message_start" => {
                let delta = Delta {
                    role: Some(Role::Assistant),
                    ..Delta::default()
                };
                StreamEvent::new(EventKind::MessageStart, payload)
                    .with_chunk(Self::chunk(&value, delta))
            }
            "content_block_start" => {
                let block = value.get("content_block");
                match block.and_then(|b| b.get("type")).and_then(|t| t.as_str()) {
                    Some("tool_use") => {
                        let call = ToolCallChunk {
                            index: Self::index(&value),
                            id: block
                                .and_then(|b| b.get("id"))
                                .and_then(|v| v.as_str())
                                .map(str::to_string),
                            kind: Some("function".to_string()),
                            function: Some(FunctionChunk {
                                name: block
                                    .and_then(|b| b.get("name"))
                                    .and_then(|v| v.as_str())
                                    .map(str::to_string),
                                arguments: None,
                            }),
                        };
                        let delta = Delta {
                            tool_calls: vec![call],
                            ..Delta::default()
                        };
                        StreamEvent::new(EventKind::ToolCallDelta, payload)
                            .with_chunk(Self::chunk(&value, delta))
                    }
                    Some("text") => {
                        let text = block
                            .and_then(|b| b.get("text"))
                            .and_then(|t| t.as_str())
                            .unwrap_or("");
                        let delta = Delta {
                            content: Some(text.to_string()),
                            ..Delta::default()
                        };
                        StreamEvent::new(EventKind::ContentDelta, payload)
                            .with_chunk(Self::chunk(&value, delta))
                    }
                    _ => return Ok(None),
                }
            }
            "content_block_delta" => {
                let delta = value.get("delta");
                match delta.and_then(|d| d.get("type")).and_then(|t| t.as_str()) {
                    Some("text_delta") => {
                        let text = delta
                            .and_then(|d| d.get("text"))
                            .and_then(|t| t.as_str())
                            .unwrap_or("");
                        let delta = Delta {
                            content: Some(text.to_string()),
                            ..Delta::default()
                        };
                        StreamEvent::new(EventKind::ContentDelta, payload)
                            .with_chunk(Self::chunk(&value, delta))
                    }
                    Some("input_json_delta") => {
                        let partial = delta
                            .and_then(|d| d.get("partial_json"))
                            .and_then(|t| t.as_str())
                            .unwrap_or("");
                        let call = ToolCallChunk {
                            index: Self::index(&value),
                            id: None,
                            kind: None,
                            function: Some(FunctionChunk {
                                name: None,
                                arguments: Some(partial.to_string()),
                            }),
                        };
                        let delta = Delta {
                            tool_calls: vec![call],
                            ..Delta::default()
                        };
                        StreamEvent::new(EventKind::ToolCallDelta, payload)
                            .with_chunk(Self::chunk(&value, delta))
                    }
                    _ => return Ok(None),
                }
            }
            "content_block_stop" => StreamEvent::new(EventKind::ContentEnd, payload),
            "message_delta" => {
                let finish_reason = value
                    .get("delta")
                    .and_then(|d| d.get("stop_reason"))
                    .and_then(|r| r.as_str())
                    .map(anthropic_finish_reason);
                let mut chunk = Self::chunk(&value, Delta::default());
                if let Some(choice) = chunk.choices.first_mut() {
                    choice.finish_reason = finish_reason;
                }
                chunk.usage = value.get("usage").map(|u| {
                    let output = u.get("output_tokens").and_then(|v| v.as_u64()).unwrap_or(0);
                    Usage {
                        prompt_tokens: 0,
                        completion_tokens: output,
                        total_tokens: output,
                    }
                });
                StreamEvent::new(EventKind::MessageEnd, payload).with_chunk(chunk)
            }
            "message_stop" => StreamEvent::new(EventKind::StreamEnd, payload),
            "error" => StreamEvent::error(payload, error_message(&value)),
            other => match EventKind::from_name(other) {
                Some(kind) => StreamEvent::new(kind, payload),
                None => return Ok(None),
            },
        };

        Ok(Some(event))
    }
}

// ---------------------------------------------------------------------------
// Ollama parser
// ---------------------------------------------------------------------------

/// Parses Ollama NDJSON chat lines.
///
/// - `{"message":{...},"done":false}` -> ContentDelta (ToolCallDelta with tool calls)
/// - `{"done":true,"done_reason":"stop"}` -> StreamEnd carrying the finish reason
/// - anything else -> StreamStart
///
/// Each line carries whole tool calls, never fragments, and a turn may
/// spread them over several lines. Indices run across the whole stream so
/// every call lands in its own accumulator slot.
#[derive(Debug, Default)]
pub struct OllamaStreamParser {
    next_index: AtomicUsize,
}

impl StreamParser for OllamaStreamParser {
    fn framing(&self) -> Framing {
        Framing::JsonLines
    }

    fn session(self: Arc<Self>) -> Arc<dyn StreamParser> {
        Arc::new(OllamaStreamParser::default())
    }

    fn parse(&self, group: &str) -> Result<Option<StreamEvent>, StreamError> {
        let line = group.trim();
        let line = line
            .strip_prefix("data:")
            .map(str::trim)
            .unwrap_or(line);
        if line.is_empty() {
            return Ok(None);
        }
        if line == DONE_PAYLOAD {
            return Ok(Some(StreamEvent::new(EventKind::StreamEnd, line)));
        }

        let value: Value = serde_json::from_str(line).map_err(malformed)?;
        if value.get("error").is_some() {
            return Ok(Some(StreamEvent::error(line, error_message(&value))));
        }

        let model = value.get("model").and_then(|m| m.as_str()).unwrap_or("");
        let message = value.get("message").cloned().unwrap_or(Value::Null);
        let call_count = message
            .get("tool_calls")
            .and_then(|tc| tc.as_array())
            .map_or(0, Vec::len);
        let first_index = self.next_index.fetch_add(call_count, Ordering::Relaxed);
        let tool_calls = ollama_tool_calls(&message, first_index);
        let content = message
            .get("content")
            .and_then(|c| c.as_str())
            .unwrap_or("")
            .to_string();

        let event = match value.get("done").and_then(|d| d.as_bool()) {
            Some(false) => {
                let kind = if tool_calls.is_empty() {
                    EventKind::ContentDelta
                } else {
                    EventKind::ToolCallDelta
                };
                let delta = Delta {
                    role: Some(Role::Assistant),
                    content: Some(content),
                    tool_calls: tool_calls
                        .into_iter()
                        .enumerate()
                        .map(|(offset, call)| ToolCallChunk {
                            index: first_index + offset,
                            id: Some(call.id),
                            kind: Some(call.kind),
                            function: Some(FunctionChunk {
                                name: Some(call.function.name),
                                arguments: Some(call.function.arguments),
                            }),
                        })
                        .collect(),
                };
                StreamEvent::new(kind, line)
                    .with_chunk(ChatCompletionStreamResponse::from_delta("", model, delta, None))
            }
            Some(true) => {
                let finish = ollama_finish_reason(
                    value.get("done_reason").and_then(|r| r.as_str()),
                    false,
                );
                let delta = Delta {
                    content: if content.is_empty() { None } else { Some(content) },
                    ..Delta::default()
                };
                StreamEvent::new(EventKind::StreamEnd, line).with_chunk(
                    ChatCompletionStreamResponse::from_delta("", model, delta, Some(finish)),
                )
            }
            None => StreamEvent::new(EventKind::StreamStart, line),
        };

        Ok(Some(event))
    }
}
