// Copyright 2026 The Gantry Authors
// SPDX-License-Identifier: Apache-2.0

// Tests for the stream event normalizer
//
// Tests cover:
//  1. Framing survives arbitrary chunk boundaries (including split UTF-8)
//  2. CRLF line endings and a missing trailing blank line
//  3. [DONE] is stream-end for every backend
//  4. Explicit event: field wins over sniffing
//  5. Sniff priority for OpenAI payloads
//  6. Blank groups, comments and unknown fields are skipped
//  7. Unknown backend identifier is rejected
//  8. Anthropic events are transcoded to canonical chunks
//  9. Ollama NDJSON done-flag handling
// 10. Reader task: malformed fragments skipped, transport failure surfaced
// 11. Explicit nulls in OpenAI chunks
// 12. Ollama tool calls spread over several lines
// 13. Oversized unterminated frames are discarded

use super::*;
use crate::agent::ToolCallAccumulator;
use crate::message::{FinishReason, Role};
use crate::transport::HttpError;
use bytes::Bytes;
use futures_util::stream;
use serde_json::json;
use std::sync::Arc;
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

const OPENAI_STREAM: &str = concat!(
    "data: {\"id\":\"c1\",\"choices\":[{\"index\":0,\"delta\":{\"role\":\"assistant\",\"content\":\"\"}}]}\n\n",
    "data: {\"id\":\"c1\",\"choices\":[{\"index\":0,\"delta\":{\"content\":\"Héllo\"}}]}\n\n",
    "data: {\"id\":\"c1\",\"choices\":[{\"index\":0,\"delta\":{\"content\":\" wörld\"}}]}\n\n",
    "data: {\"id\":\"c1\",\"choices\":[{\"index\":0,\"delta\":{},\"finish_reason\":\"stop\"}]}\n\n",
    "data: [DONE]\n\n",
);

fn decode_all(framing: Framing, chunks: &[&[u8]]) -> Vec<String> {
    let mut decoder = FrameDecoder::new(framing);
    let mut groups = Vec::new();
    for chunk in chunks {
        groups.extend(decoder.push(chunk).unwrap());
    }
    groups.extend(decoder.finish());
    groups
}

fn parse_one(parser: &dyn StreamParser, group: &str) -> StreamEvent {
    parser
        .parse(group)
        .expect("group should parse")
        .expect("group should produce an event")
}

async fn collect_events(stream: EventStream) -> Vec<Result<StreamEvent, StreamError>> {
    stream.collect::<Vec<_>>().await
}

fn byte_stream(chunks: Vec<Result<Bytes, HttpError>>) -> crate::transport::ByteStream {
    Box::pin(stream::iter(chunks))
}

// ---------------------------------------------------------------------------
// 1. Chunk-boundary independence
// ---------------------------------------------------------------------------

#[test]
fn framing_is_independent_of_chunk_boundaries() {
    let bytes = OPENAI_STREAM.as_bytes();
    let whole = decode_all(Framing::Sse, &[bytes]);
    assert_eq!(whole.len(), 5);

    // Every single split point, including inside the two-byte 'é' and 'ö'.
    for split in 1..bytes.len() {
        let (a, b) = bytes.split_at(split);
        assert_eq!(decode_all(Framing::Sse, &[a, b]), whole, "split at {split}");
    }

    // One byte at a time.
    let singles: Vec<&[u8]> = bytes.chunks(1).collect();
    assert_eq!(decode_all(Framing::Sse, &singles), whole);
}

#[test]
fn split_multibyte_character_is_reassembled() {
    let bytes = "data: {\"choices\":[{\"delta\":{\"content\":\"é\"}}]}\n\n".as_bytes();
    let pos = bytes.iter().position(|&b| b == 0xC3).unwrap();
    let groups = decode_all(Framing::Sse, &[&bytes[..pos + 1], &bytes[pos + 1..]]);
    assert_eq!(groups.len(), 1);
    assert!(groups[0].contains('é'));
    assert!(!groups[0].contains('\u{FFFD}'));
}

#[test]
fn ndjson_lines_are_framed_individually() {
    let input = b"{\"done\":false}\n\n{\"done\":true}\n";
    let groups = decode_all(Framing::JsonLines, &[&input[..5], &input[5..]]);
    assert_eq!(groups, vec!["{\"done\":false}", "{\"done\":true}"]);
}

// ---------------------------------------------------------------------------
// 2. CRLF and trailing group
// ---------------------------------------------------------------------------

#[test]
fn crlf_terminated_groups_are_recognised() {
    let input = b"event: message_stop\r\ndata: {\"type\":\"message_stop\"}\r\n\r\ndata: [DONE]\r\n\r\n";
    let groups = decode_all(Framing::Sse, &[input]);
    assert_eq!(groups.len(), 2);
    let frame = parse_sse_group(&groups[0]);
    assert_eq!(frame.event.as_deref(), Some("message_stop"));
    assert_eq!(frame.data.as_deref(), Some("{\"type\":\"message_stop\"}"));
}

#[test]
fn final_group_without_blank_line_is_flushed() {
    let groups = decode_all(Framing::Sse, &[b"data: {\"a\":1}\n\ndata: [DONE]\n"]);
    assert_eq!(groups.len(), 2);
    assert_eq!(parse_sse_group(&groups[1]).data.as_deref(), Some("[DONE]"));
}

#[test]
fn multi_line_data_is_joined() {
    let frame = parse_sse_group("data: {\"a\":\ndata: 1}\n");
    assert_eq!(frame.data.as_deref(), Some("{\"a\":\n1}"));
}

// ---------------------------------------------------------------------------
// 3. [DONE]
// ---------------------------------------------------------------------------

#[test]
fn done_is_stream_end_for_every_backend() {
    for id in ["openai", "groq", "anthropic", "ollama", "cohere"] {
        let parser = parser_for(id).unwrap();
        let group = match parser.framing() {
            Framing::Sse => "data: [DONE]\n",
            Framing::JsonLines => "[DONE]",
        };
        let event = parse_one(parser.as_ref(), group);
        assert_eq!(event.kind, EventKind::StreamEnd, "{id}");
        assert!(event.chunk.is_none());
    }
}

#[test]
fn done_wins_over_event_field() {
    let event = parse_one(&OpenAiStreamParser, "event: content-delta\ndata: [DONE]\n");
    assert_eq!(event.kind, EventKind::StreamEnd);
}

// ---------------------------------------------------------------------------
// 4. Explicit event field
// ---------------------------------------------------------------------------

#[test]
fn explicit_event_field_wins_over_sniffing() {
    let group = "event: message-end\ndata: {\"choices\":[{\"delta\":{\"content\":\"x\"}}]}\n";
    let event = parse_one(&OpenAiStreamParser, group);
    assert_eq!(event.kind, EventKind::MessageEnd);
    assert_eq!(
        event.chunk.unwrap().delta().unwrap().content.as_deref(),
        Some("x")
    );
}

#[test]
fn unknown_event_name_falls_back_to_sniffing() {
    let group = "event: chunk\ndata: {\"choices\":[{\"delta\":{\"content\":\"x\"}}]}\n";
    assert_eq!(
        parse_one(&OpenAiStreamParser, group).kind,
        EventKind::ContentDelta
    );
}

// ---------------------------------------------------------------------------
// 5. Sniff priority
// ---------------------------------------------------------------------------

#[test]
fn sniff_priority_order() {
    let cases = [
        (json!({"error": {"message": "boom"}}), EventKind::Error),
        (
            json!({"choices": [{"delta": {"tool_calls": [{"index": 0}]}, "finish_reason": "tool_calls"}]}),
            EventKind::ToolCallDelta,
        ),
        (
            json!({"choices": [{"delta": {"content": "x"}, "finish_reason": "stop"}]}),
            EventKind::MessageEnd,
        ),
        (
            json!({"choices": [{"delta": {"role": "assistant", "content": ""}}]}),
            EventKind::MessageStart,
        ),
        (
            json!({"choices": [{"delta": {"role": "assistant"}}]}),
            EventKind::MessageStart,
        ),
        (
            json!({"choices": [{"delta": {"role": "assistant", "content": "Hi"}}]}),
            EventKind::ContentDelta,
        ),
        (
            json!({"choices": [{"delta": {"content": "Hi"}, "finish_reason": null}]}),
            EventKind::ContentDelta,
        ),
        (json!({"usage": {"total_tokens": 3}, "choices": []}), EventKind::ContentDelta),
    ];
    for (value, expected) in cases {
        assert_eq!(sniff_event_kind(&value), expected, "{value}");
    }
}

#[test]
fn whitespace_in_payload_does_not_defeat_sniffing() {
    let group = "data: {\"choices\": [{\"delta\": {}, \"finish_reason\": \"tool_calls\"}]}\n";
    let event = parse_one(&OpenAiStreamParser, group);
    assert_eq!(event.kind, EventKind::MessageEnd);
    assert_eq!(
        event.chunk.unwrap().finish_reason(),
        Some(FinishReason::ToolCalls)
    );
}

#[test]
fn error_payload_becomes_error_event() {
    let event = parse_one(
        &OpenAiStreamParser,
        "data: {\"error\":{\"message\":\"rate limited\",\"type\":\"rate_limit\"}}\n",
    );
    assert_eq!(event.kind, EventKind::Error);
    assert_eq!(event.error.as_deref(), Some("rate limited"));
    assert!(event.chunk.is_none());
}

#[test]
fn tool_call_delta_is_decoded() {
    let group = "data: {\"choices\":[{\"delta\":{\"tool_calls\":[{\"index\":0,\"id\":\"call_1\",\"type\":\"function\",\"function\":{\"name\":\"add\",\"arguments\":\"\"}}]}}]}\n";
    let event = parse_one(&OpenAiStreamParser, group);
    assert_eq!(event.kind, EventKind::ToolCallDelta);
    let chunk = event.chunk.unwrap();
    let call = &chunk.delta().unwrap().tool_calls[0];
    assert_eq!(call.id.as_deref(), Some("call_1"));
    assert_eq!(call.function.as_ref().unwrap().name.as_deref(), Some("add"));
}

// ---------------------------------------------------------------------------
// 6. Skipped groups
// ---------------------------------------------------------------------------

#[test]
fn groups_without_data_are_skipped() {
    let parser = OpenAiStreamParser;
    assert_eq!(parser.parse("").unwrap(), None);
    assert_eq!(parser.parse(": keep-alive\n").unwrap(), None);
    assert_eq!(parser.parse("id: 7\nretry: 1000\n").unwrap(), None);
    assert_eq!(parser.parse("data:   \n").unwrap(), None);
}

#[test]
fn unknown_fields_do_not_disturb_data() {
    let group = "id: 1\nfoo: bar\ndata: {\"choices\":[{\"delta\":{\"content\":\"x\"}}]}\n";
    assert_eq!(
        parse_one(&OpenAiStreamParser, group).kind,
        EventKind::ContentDelta
    );
}

#[test]
fn malformed_json_is_an_error_not_a_panic() {
    let err = OpenAiStreamParser.parse("data: {\"choices\":[\n").unwrap_err();
    assert!(matches!(err, StreamError::MalformedFragment(_)));
}

// ---------------------------------------------------------------------------
// 7. Parser selection
// ---------------------------------------------------------------------------

#[test]
fn unknown_backend_is_rejected() {
    match parser_for("bedrock") {
        Err(StreamError::UnknownBackend(id)) => assert_eq!(id, "bedrock"),
        Err(other) => panic!("unexpected error: {other}"),
        Ok(_) => panic!("expected an error"),
    }
}

#[test]
fn parser_framing_follows_backend() {
    assert_eq!(parser_for("openai").unwrap().framing(), Framing::Sse);
    assert_eq!(parser_for("anthropic").unwrap().framing(), Framing::Sse);
    assert_eq!(parser_for("ollama").unwrap().framing(), Framing::JsonLines);
}

// ---------------------------------------------------------------------------
// 8. Anthropic
// ---------------------------------------------------------------------------

#[test]
fn anthropic_message_start_carries_assistant_role() {
    let group = "event: message_start\ndata: {\"type\":\"message_start\",\"message\":{\"id\":\"msg_1\",\"model\":\"claude\",\"role\":\"assistant\",\"content\":[]}}\n";
    let event = parse_one(&AnthropicStreamParser, group);
    assert_eq!(event.kind, EventKind::MessageStart);
    let chunk = event.chunk.unwrap();
    assert_eq!(chunk.id, "msg_1");
    assert_eq!(chunk.delta().unwrap().role, Some(Role::Assistant));
}

#[test]
fn anthropic_tool_use_maps_to_tool_call_deltas() {
    let start = "event: content_block_start\ndata: {\"type\":\"content_block_start\",\"index\":1,\"content_block\":{\"type\":\"tool_use\",\"id\":\"toolu_1\",\"name\":\"add\",\"input\":{}}}\n";
    let delta = "event: content_block_delta\ndata: {\"type\":\"content_block_delta\",\"index\":1,\"delta\":{\"type\":\"input_json_delta\",\"partial_json\":\"{\\\"a\\\":2\"}}\n";

    let start = parse_one(&AnthropicStreamParser, start);
    assert_eq!(start.kind, EventKind::ToolCallDelta);
    let call = start.chunk.unwrap().choices[0].delta.tool_calls[0].clone();
    assert_eq!(call.index, 1);
    assert_eq!(call.id.as_deref(), Some("toolu_1"));

    let delta = parse_one(&AnthropicStreamParser, delta);
    let call = delta.chunk.unwrap().choices[0].delta.tool_calls[0].clone();
    assert_eq!(call.index, 1);
    assert_eq!(
        call.function.unwrap().arguments.as_deref(),
        Some("{\"a\":2")
    );
}

#[test]
fn anthropic_text_and_stop_events() {
    let text = "event: content_block_delta\ndata: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\"Hi\"}}\n";
    let stop = "event: content_block_stop\ndata: {\"type\":\"content_block_stop\",\"index\":0}\n";
    let end = "event: message_delta\ndata: {\"type\":\"message_delta\",\"delta\":{\"stop_reason\":\"tool_use\"},\"usage\":{\"output_tokens\":12}}\n";
    let done = "event: message_stop\ndata: {\"type\":\"message_stop\"}\n";

    let text = parse_one(&AnthropicStreamParser, text);
    assert_eq!(text.kind, EventKind::ContentDelta);
    assert_eq!(
        text.chunk.unwrap().delta().unwrap().content.as_deref(),
        Some("Hi")
    );

    let stop = parse_one(&AnthropicStreamParser, stop);
    assert_eq!(stop.kind, EventKind::ContentEnd);
    assert!(stop.chunk.is_none());

    let end = parse_one(&AnthropicStreamParser, end);
    assert_eq!(end.kind, EventKind::MessageEnd);
    let chunk = end.chunk.unwrap();
    assert_eq!(chunk.finish_reason(), Some(FinishReason::ToolCalls));
    assert_eq!(chunk.usage.unwrap().completion_tokens, 12);

    assert_eq!(
        parse_one(&AnthropicStreamParser, done).kind,
        EventKind::StreamEnd
    );
}

#[test]
fn anthropic_ping_is_skipped_and_error_surfaces() {
    let ping = "event: ping\ndata: {\"type\":\"ping\"}\n";
    assert_eq!(AnthropicStreamParser.parse(ping).unwrap(), None);

    let err = "event: error\ndata: {\"type\":\"error\",\"error\":{\"type\":\"overloaded_error\",\"message\":\"Overloaded\"}}\n";
    let event = parse_one(&AnthropicStreamParser, err);
    assert_eq!(event.kind, EventKind::Error);
    assert_eq!(event.error.as_deref(), Some("Overloaded"));
}

// ---------------------------------------------------------------------------
// 9. Ollama
// ---------------------------------------------------------------------------

#[test]
fn ollama_done_false_is_content_delta() {
    let line = r#"{"model":"llama3","message":{"role":"assistant","content":"Hi"},"done":false}"#;
    let event = parse_one(&OllamaStreamParser::default(), line);
    assert_eq!(event.kind, EventKind::ContentDelta);
    assert_eq!(
        event.chunk.unwrap().delta().unwrap().content.as_deref(),
        Some("Hi")
    );
}

#[test]
fn ollama_tool_calls_become_complete_deltas() {
    let line = r#"{"model":"llama3","message":{"role":"assistant","content":"","tool_calls":[{"function":{"name":"add","arguments":{"a":2,"b":2}}}]},"done":false}"#;
    let event = parse_one(&OllamaStreamParser::default(), line);
    assert_eq!(event.kind, EventKind::ToolCallDelta);
    let call = event.chunk.unwrap().choices[0].delta.tool_calls[0].clone();
    assert_eq!(call.index, 0);
    assert_eq!(call.id.as_deref(), Some("call_0"));
    let args: serde_json::Value =
        serde_json::from_str(call.function.unwrap().arguments.as_deref().unwrap()).unwrap();
    assert_eq!(args, json!({"a": 2, "b": 2}));
}

#[test]
fn ollama_done_true_is_stream_end_with_finish_reason() {
    let line = r#"{"model":"llama3","message":{"role":"assistant","content":""},"done":true,"done_reason":"stop"}"#;
    let event = parse_one(&OllamaStreamParser::default(), line);
    assert_eq!(event.kind, EventKind::StreamEnd);
    assert_eq!(event.chunk.unwrap().finish_reason(), Some(FinishReason::Stop));
}

#[test]
fn ollama_line_without_done_is_stream_start() {
    let event = parse_one(&OllamaStreamParser::default(), r#"{"status":"loading model"}"#);
    assert_eq!(event.kind, EventKind::StreamStart);
}

// ---------------------------------------------------------------------------
// 10. Reader task
// ---------------------------------------------------------------------------

#[tokio::test]
async fn reader_task_emits_events_in_order_and_skips_garbage() {
    let input = byte_stream(vec![
        Ok(Bytes::from("data: {\"choices\":[{\"delta\":{\"content\":\"a\"}}]}\n\nda")),
        Ok(Bytes::from("ta: {not json}\n\n")),
        Ok(Bytes::from("data: {\"choices\":[{\"delta\":{\"content\":\"b\"}}]}\n\n")),
        Ok(Bytes::from("data: [DONE]\n\n")),
    ]);
    let events = collect_events(event_stream(
        input,
        Arc::new(OpenAiStreamParser),
        CancellationToken::new(),
    ))
    .await;

    let kinds: Vec<_> = events.iter().map(|e| e.as_ref().unwrap().kind).collect();
    assert_eq!(
        kinds,
        vec![
            EventKind::ContentDelta,
            EventKind::ContentDelta,
            EventKind::StreamEnd
        ]
    );
}

#[tokio::test]
async fn reader_task_surfaces_transport_failure_once() {
    let input = byte_stream(vec![
        Ok(Bytes::from("data: {\"choices\":[{\"delta\":{\"content\":\"a\"}}]}\n\n")),
        Err(HttpError::Transport("connection reset".into())),
        Ok(Bytes::from("data: [DONE]\n\n")),
    ]);
    let events = collect_events(event_stream(
        input,
        Arc::new(OpenAiStreamParser),
        CancellationToken::new(),
    ))
    .await;

    assert_eq!(events.len(), 2);
    assert!(events[0].is_ok());
    assert!(matches!(events[1], Err(StreamError::Transport(_))));
}

#[tokio::test]
async fn reader_task_stops_on_cancellation() {
    let cancel = CancellationToken::new();
    cancel.cancel();
    let input = byte_stream(vec![Ok(Bytes::from("data: [DONE]\n\n"))]);
    let events = collect_events(event_stream(input, Arc::new(OpenAiStreamParser), cancel)).await;
    assert!(events.is_empty());
}

#[tokio::test]
async fn reader_task_flushes_unterminated_ndjson_line() {
    let input = byte_stream(vec![Ok(Bytes::from(
        "{\"message\":{\"content\":\"x\"},\"done\":false}\n{\"done\":true,\"done_reason\":\"stop\"}",
    ))]);
    let events =
        collect_events(event_stream(input, Arc::new(OllamaStreamParser::default()), CancellationToken::new()))
            .await;
    let kinds: Vec<_> = events.iter().map(|e| e.as_ref().unwrap().kind).collect();
    assert_eq!(kinds, vec![EventKind::ContentDelta, EventKind::StreamEnd]);
}

// ---------------------------------------------------------------------------
// 11. Explicit nulls
// ---------------------------------------------------------------------------

#[test]
fn null_tool_calls_in_chunk_still_carry_content() {
    let group = "data: {\"choices\":[{\"index\":0,\"delta\":{\"content\":\"Hi\",\"tool_calls\":null},\"finish_reason\":null}]}\n";
    let event = parse_one(&OpenAiStreamParser, group);
    assert_eq!(event.kind, EventKind::ContentDelta);
    let chunk = event.chunk.unwrap();
    let delta = chunk.delta().unwrap();
    assert_eq!(delta.content.as_deref(), Some("Hi"));
    assert!(delta.tool_calls.is_empty());
}

#[test]
fn null_tool_calls_in_finish_chunk_keep_finish_reason() {
    let group = "data: {\"choices\":[{\"index\":0,\"delta\":{\"tool_calls\":null},\"finish_reason\":\"stop\"}]}\n";
    let event = parse_one(&OpenAiStreamParser, group);
    assert_eq!(event.kind, EventKind::MessageEnd);
    assert_eq!(event.chunk.unwrap().finish_reason(), Some(FinishReason::Stop));
}

// ---------------------------------------------------------------------------
// 12. Ollama tool calls across lines
// ---------------------------------------------------------------------------

const OLLAMA_SPLIT_TOOL_CALLS: &str = concat!(
    "{\"model\":\"llama3\",\"message\":{\"role\":\"assistant\",\"content\":\"\",\"tool_calls\":[{\"function\":{\"name\":\"add\",\"arguments\":{\"a\":1}}}]},\"done\":false}\n",
    "{\"model\":\"llama3\",\"message\":{\"role\":\"assistant\",\"content\":\"\",\"tool_calls\":[{\"function\":{\"name\":\"mul\",\"arguments\":{\"b\":2}}}]},\"done\":false}\n",
    "{\"model\":\"llama3\",\"message\":{\"role\":\"assistant\",\"content\":\"\"},\"done\":true,\"done_reason\":\"stop\"}\n",
);

fn fold_events(events: &[Result<StreamEvent, StreamError>]) -> Vec<(String, String, String)> {
    let mut acc = ToolCallAccumulator::new();
    for event in events {
        let event = event.as_ref().unwrap();
        if let Some(delta) = event.chunk.as_ref().and_then(|c| c.delta()) {
            for fragment in &delta.tool_calls {
                acc.fold(fragment).unwrap();
            }
        }
    }
    acc.finalize()
        .into_iter()
        .map(|c| (c.id, c.function.name, c.function.arguments))
        .collect()
}

#[tokio::test]
async fn ollama_tool_calls_on_separate_lines_stay_separate() {
    let parser = parser_for("ollama").unwrap();
    let input = byte_stream(vec![Ok(Bytes::from(OLLAMA_SPLIT_TOOL_CALLS))]);
    let events = collect_events(event_stream(input, parser, CancellationToken::new())).await;

    assert_eq!(
        fold_events(&events),
        vec![
            ("call_0".to_string(), "add".to_string(), "{\"a\":1}".to_string()),
            ("call_1".to_string(), "mul".to_string(), "{\"b\":2}".to_string()),
        ]
    );
}

#[tokio::test]
async fn ollama_numbering_restarts_for_each_stream() {
    let parser = parser_for("ollama").unwrap();
    for _ in 0..2 {
        let input = byte_stream(vec![Ok(Bytes::from(OLLAMA_SPLIT_TOOL_CALLS))]);
        let events =
            collect_events(event_stream(input, parser.clone(), CancellationToken::new())).await;
        let ids: Vec<String> = fold_events(&events).into_iter().map(|(id, _, _)| id).collect();
        assert_eq!(ids, vec!["call_0", "call_1"]);
    }
}

// ---------------------------------------------------------------------------
// 13. Oversized frames
// ---------------------------------------------------------------------------

#[test]
fn unterminated_frame_over_limit_is_discarded() {
    let mut decoder = FrameDecoder::new(Framing::JsonLines);
    let blob = vec![b'x'; MAX_PENDING_BYTES + 1];
    match decoder.push(&blob) {
        Err(StreamError::MalformedFragment(msg)) => assert!(msg.contains("exceeds"), "{msg}"),
        other => panic!("expected MalformedFragment, got {other:?}"),
    }

    // Buffer was dropped; the rest of the runaway line plus the next one
    // come through as ordinary groups.
    let groups = decoder.push(b"tail\n{\"done\":true}\n").unwrap();
    assert_eq!(groups, vec!["tail".to_string(), "{\"done\":true}".to_string()]);
    assert!(decoder.finish().is_none());
}

#[tokio::test]
async fn reader_task_survives_oversized_frame() {
    let huge = format!("data: {}", "x".repeat(MAX_PENDING_BYTES + 1));
    let input = byte_stream(vec![
        Ok(Bytes::from(huge)),
        Ok(Bytes::from("\n\ndata: [DONE]\n\n")),
    ]);
    let events = collect_events(event_stream(
        input,
        Arc::new(OpenAiStreamParser),
        CancellationToken::new(),
    ))
    .await;
    let kinds: Vec<_> = events.iter().map(|e| e.as_ref().unwrap().kind).collect();
    assert_eq!(kinds, vec![EventKind::StreamEnd]);
}
