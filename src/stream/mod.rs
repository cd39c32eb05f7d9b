// Copyright 2026 The Gantry Authors
// SPDX-License-Identifier: Apache-2.0

// Stream event normalizer
//
// Responsibilities:
// - Frame SSE and NDJSON byte streams into groups, robust to any chunking
// - Parse each group into one canonical StreamEvent per backend dialect
// - `[DONE]` is stream-end for every backend
// - Skip blank lines, comments and unknown fields without error
// - Log and skip malformed fragments; the stream continues

mod decoder;
mod parser;
mod processor;
mod types;

pub use decoder::{FrameDecoder, MAX_PENDING_BYTES};
pub use parser::{
    parse_sse_group, parser_for, sniff_event_kind, AnthropicStreamParser, OllamaStreamParser,
    OpenAiStreamParser, StreamParser, DONE_PAYLOAD,
};
pub use processor::{event_stream, EVENT_CHANNEL_CAPACITY};
pub use types::{EventKind, EventStream, Framing, SseFrame, StreamError, StreamEvent};

#[cfg(test)]
mod tests;
