// Copyright 2026 The Gantry Authors
// SPDX-License-Identifier: Apache-2.0

// Wire codecs
//
// A codec turns the canonical request into the backend's request body and
// the backend's response body back into the canonical response. Three
// wire dialects cover the registry:
// - OpenAI chat completions (and every "compatible" API)
// - Anthropic messages
// - Ollama native chat
//
// Model listing is handled separately by `decode_model_list`, keyed on the
// registry's `ModelListShape`.

use serde_json::{json, Map, Value};

use crate::message::{
    ChatCompletionRequest, ChatCompletionResponse, Choice, FinishReason, Message, Model, Role,
    ToolCall, Usage,
};

use super::registry::{CodecKind, ModelListShape, ProviderSpec};
use super::ProviderError;

/// Default `max_tokens` for backends that require one.
pub const ANTHROPIC_DEFAULT_MAX_TOKENS: u32 = 1024;

/// Default sampling temperature sent to Ollama.
pub const OLLAMA_DEFAULT_TEMPERATURE: f32 = 0.7;

/// Transcodes between the canonical shape and one backend dialect.
pub trait Codec: Send + Sync {
    fn encode_request(
        &self,
        request: &ChatCompletionRequest,
        stream: bool,
    ) -> Result<Value, ProviderError>;

    fn decode_response(&self, body: &[u8]) -> Result<ChatCompletionResponse, ProviderError>;
}

/// Pick the codec for a registry entry.
pub fn codec_for(spec: &ProviderSpec) -> Box<dyn Codec> {
    match spec.codec {
        CodecKind::OpenAiCompatible => Box::new(OpenAiCodec {
            stream_usage: spec.stream_usage,
        }),
        CodecKind::Anthropic => Box::new(AnthropicCodec),
        CodecKind::Ollama => Box::new(OllamaCodec),
    }
}

fn decode_error(e: impl std::fmt::Display) -> ProviderError {
    ProviderError::Decode(e.to_string())
}

fn parse_body(body: &[u8]) -> Result<Value, ProviderError> {
    serde_json::from_slice(body).map_err(decode_error)
}

/// Tool-call arguments as a JSON value. Backends that take objects get `{}`
/// for an empty or unparseable argument string.
fn arguments_object(arguments: &str) -> Value {
    match serde_json::from_str::<Value>(arguments) {
        Ok(v @ Value::Object(_)) => v,
        _ => Value::Object(Map::new()),
    }
}

/// Arguments coming back as a JSON value become the canonical string form.
fn arguments_string(arguments: Option<&Value>) -> String {
    match arguments {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => "{}".to_string(),
        Some(other) => other.to_string(),
    }
}

// ---------------------------------------------------------------------------
// OpenAI-compatible
// ---------------------------------------------------------------------------

pub struct OpenAiCodec {
    pub stream_usage: bool,
}

impl Codec for OpenAiCodec {
    fn encode_request(
        &self,
        request: &ChatCompletionRequest,
        stream: bool,
    ) -> Result<Value, ProviderError> {
        let mut body = serde_json::to_value(request).map_err(decode_error)?;
        if let Some(obj) = body.as_object_mut() {
            obj.insert("stream".into(), Value::Bool(stream));
            if stream && self.stream_usage {
                obj.insert("stream_options".into(), json!({"include_usage": true}));
            }
        }
        Ok(body)
    }

    fn decode_response(&self, body: &[u8]) -> Result<ChatCompletionResponse, ProviderError> {
        serde_json::from_slice(body).map_err(decode_error)
    }
}

// ---------------------------------------------------------------------------
// Anthropic messages
// ---------------------------------------------------------------------------

pub struct AnthropicCodec;

/// Map an Anthropic `stop_reason` onto the canonical finish reason.
pub(crate) fn anthropic_finish_reason(stop_reason: &str) -> FinishReason {
    match stop_reason {
        "end_turn" | "stop_sequence" => FinishReason::Stop,
        "tool_use" => FinishReason::ToolCalls,
        "max_tokens" => FinishReason::Length,
        _ => FinishReason::Other,
    }
}

impl AnthropicCodec {
    fn encode_messages(messages: &[Message]) -> (Vec<String>, Vec<Value>) {
        let mut system = Vec::new();
        let mut out: Vec<Value> = Vec::with_capacity(messages.len());

        for msg in messages {
            match msg.role {
                Role::System => system.push(msg.text().to_string()),
                Role::User => out.push(json!({"role": "user", "content": msg.text()})),
                Role::Assistant => {
                    let mut blocks = Vec::new();
                    if !msg.text().is_empty() {
                        blocks.push(json!({"type": "text", "text": msg.text()}));
                    }
                    for tc in &msg.tool_calls {
                        blocks.push(json!({
                            "type": "tool_use",
                            "id": tc.id,
                            "name": tc.function.name,
                            "input": arguments_object(&tc.function.arguments),
                        }));
                    }
                    // Anthropic rejects empty content, and empty text blocks too.
                    if !blocks.is_empty() {
                        out.push(json!({"role": "assistant", "content": blocks}));
                    }
                }
                Role::Tool => {
                    let block = json!({
                        "type": "tool_result",
                        "tool_use_id": msg.tool_call_id.clone().unwrap_or_default(),
                        "content": msg.text(),
                    });
                    // Consecutive tool results share one user turn.
                    let merged = out.last_mut().and_then(|last| {
                        let is_results = last.get("role").and_then(|r| r.as_str()) == Some("user")
                            && last
                                .get("content")
                                .and_then(|c| c.as_array())
                                .and_then(|a| a.first())
                                .and_then(|b| b.get("type"))
                                .and_then(|t| t.as_str())
                                == Some("tool_result");
                        if is_results {
                            last.get_mut("content").and_then(|c| c.as_array_mut())
                        } else {
                            None
                        }
                    });
                    match merged {
                        Some(blocks) => blocks.push(block),
                        None => out.push(json!({"role": "user", "content": [block]})),
                    }
                }
            }
        }

        (system, out)
    }
}

impl Codec for AnthropicCodec {
    fn encode_request(
        &self,
        request: &ChatCompletionRequest,
        stream: bool,
    ) -> Result<Value, ProviderError> {
        let (system, messages) = Self::encode_messages(&request.messages);

        let mut body = json!({
            "model": request.model,
            "max_tokens": request.max_tokens.unwrap_or(ANTHROPIC_DEFAULT_MAX_TOKENS),
            "messages": messages,
            "stream": stream,
        });
        let obj = body
            .as_object_mut()
            .ok_or_else(|| ProviderError::Decode("request body is not an object".into()))?;

        if !system.is_empty() {
            obj.insert("system".into(), Value::String(system.join("\n\n")));
        }
        if let Some(t) = request.temperature {
            obj.insert("temperature".into(), json!(t));
        }
        if let Some(tools) = &request.tools {
            let tools: Vec<Value> = tools
                .iter()
                .map(|t| {
                    json!({
                        "name": t.function.name,
                        "description": t.function.description.clone().unwrap_or_default(),
                        "input_schema": t.function.parameters.clone()
                            .unwrap_or_else(|| json!({"type": "object", "properties": {}})),
                    })
                })
                .collect();
            obj.insert("tools".into(), Value::Array(tools));
        }

        Ok(body)
    }

    fn decode_response(&self, body: &[u8]) -> Result<ChatCompletionResponse, ProviderError> {
        let root = parse_body(body)?;

        let blocks = root
            .get("content")
            .and_then(|c| c.as_array())
            .ok_or_else(|| ProviderError::Decode("missing content array".into()))?;

        let mut text = String::new();
        let mut tool_calls = Vec::new();
        for block in blocks {
            match block.get("type").and_then(|t| t.as_str()) {
                Some("text") => {
                    text.push_str(block.get("text").and_then(|t| t.as_str()).unwrap_or(""))
                }
                Some("tool_use") => tool_calls.push(ToolCall::new(
                    block.get("id").and_then(|v| v.as_str()).unwrap_or(""),
                    block.get("name").and_then(|v| v.as_str()).unwrap_or(""),
                    arguments_string(block.get("input")),
                )),
                _ => {}
            }
        }

        let finish_reason = root
            .get("stop_reason")
            .and_then(|r| r.as_str())
            .map(anthropic_finish_reason);

        let usage = root.get("usage").map(|u| {
            let input = u.get("input_tokens").and_then(|v| v.as_u64()).unwrap_or(0);
            let output = u.get("output_tokens").and_then(|v| v.as_u64()).unwrap_or(0);
            Usage {
                prompt_tokens: input,
                completion_tokens: output,
                total_tokens: input + output,
            }
        });

        Ok(ChatCompletionResponse {
            id: root.get("id").and_then(|v| v.as_str()).unwrap_or("").to_string(),
            object: "chat.completion".to_string(),
            created: 0,
            model: root.get("model").and_then(|v| v.as_str()).unwrap_or("").to_string(),
            choices: vec![Choice {
                index: 0,
                message: Message::assistant(text, tool_calls),
                finish_reason,
            }],
            usage,
        })
    }
}

// ---------------------------------------------------------------------------
// Ollama native
// ---------------------------------------------------------------------------

pub struct OllamaCodec;

/// Canonical tool calls from an Ollama `message.tool_calls` array. Ollama
/// omits ids; position-derived ids keep results correlatable. `first_index`
/// numbers the first call when earlier lines of a stream already had some.
pub(crate) fn ollama_tool_calls(message: &Value, first_index: usize) -> Vec<ToolCall> {
    message
        .get("tool_calls")
        .and_then(|tc| tc.as_array())
        .map(|calls| {
            calls
                .iter()
                .enumerate()
                .map(|(i, call)| {
                    let function = call.get("function");
                    let id = call
                        .get("id")
                        .and_then(|v| v.as_str())
                        .map(str::to_string)
                        .unwrap_or_else(|| format!("call_{}", first_index + i));
                    ToolCall::new(
                        id,
                        function
                            .and_then(|f| f.get("name"))
                            .and_then(|n| n.as_str())
                            .unwrap_or(""),
                        arguments_string(function.and_then(|f| f.get("arguments"))),
                    )
                })
                .collect()
        })
        .unwrap_or_default()
}

pub(crate) fn ollama_finish_reason(done_reason: Option<&str>, has_tool_calls: bool) -> FinishReason {
    if has_tool_calls {
        return FinishReason::ToolCalls;
    }
    match done_reason {
        Some("length") => FinishReason::Length,
        Some("stop") | None => FinishReason::Stop,
        Some(_) => FinishReason::Other,
    }
}

impl Codec for OllamaCodec {
    fn encode_request(
        &self,
        request: &ChatCompletionRequest,
        stream: bool,
    ) -> Result<Value, ProviderError> {
        let messages: Vec<Value> = request
            .messages
            .iter()
            .map(|m| {
                let mut v = json!({"role": m.role, "content": m.text()});
                if !m.tool_calls.is_empty() {
                    let calls: Vec<Value> = m
                        .tool_calls
                        .iter()
                        .map(|tc| {
                            json!({"function": {
                                "name": tc.function.name,
                                "arguments": arguments_object(&tc.function.arguments),
                            }})
                        })
                        .collect();
                    v["tool_calls"] = Value::Array(calls);
                }
                v
            })
            .collect();

        let mut body = json!({
            "model": request.model,
            "messages": messages,
            "stream": stream,
            "options": {
                "temperature": request.temperature.unwrap_or(OLLAMA_DEFAULT_TEMPERATURE),
            },
        });
        if let Some(tools) = &request.tools {
            body["tools"] = serde_json::to_value(tools).map_err(decode_error)?;
        }
        if let Some(max) = request.max_tokens {
            body["options"]["num_predict"] = json!(max);
        }
        Ok(body)
    }

    fn decode_response(&self, body: &[u8]) -> Result<ChatCompletionResponse, ProviderError> {
        let root = parse_body(body)?;
        let message = root
            .get("message")
            .ok_or_else(|| ProviderError::Decode("missing message".into()))?;

        let tool_calls = ollama_tool_calls(message, 0);
        let finish_reason = ollama_finish_reason(
            root.get("done_reason").and_then(|r| r.as_str()),
            !tool_calls.is_empty(),
        );
        let text = message
            .get("content")
            .and_then(|c| c.as_str())
            .unwrap_or("")
            .to_string();

        let prompt = root.get("prompt_eval_count").and_then(|v| v.as_u64()).unwrap_or(0);
        let completion = root.get("eval_count").and_then(|v| v.as_u64()).unwrap_or(0);

        Ok(ChatCompletionResponse {
            id: String::new(),
            object: "chat.completion".to_string(),
            created: 0,
            model: root.get("model").and_then(|v| v.as_str()).unwrap_or("").to_string(),
            choices: vec![Choice {
                index: 0,
                message: Message::assistant(text, tool_calls),
                finish_reason: Some(finish_reason),
            }],
            usage: Some(Usage {
                prompt_tokens: prompt,
                completion_tokens: completion,
                total_tokens: prompt + completion,
            }),
        })
    }
}

// ---------------------------------------------------------------------------
// Model lists
// ---------------------------------------------------------------------------

/// Decode a backend model list into canonical models named `<provider>/<id>`.
pub fn decode_model_list(spec: &ProviderSpec, body: &[u8]) -> Result<Vec<Model>, ProviderError> {
    let root = parse_body(body)?;
    let provider = spec.id.as_str();

    let (key, name_field) = match spec.model_list {
        ModelListShape::Data => ("data", "id"),
        ModelListShape::Models => ("models", "name"),
        ModelListShape::Result => ("result", "name"),
    };

    let entries = root
        .get(key)
        .and_then(|v| v.as_array())
        .ok_or_else(|| ProviderError::Decode(format!("missing \"{key}\" array in model list")))?;

    Ok(entries
        .iter()
        .filter_map(|entry| {
            let name = entry
                .get(name_field)
                .or_else(|| entry.get("id"))
                .and_then(|v| v.as_str())?;
            Some(Model {
                id: format!("{provider}/{name}"),
                object: "model".to_string(),
                created: entry.get("created").and_then(|v| v.as_i64()).unwrap_or(0),
                owned_by: entry
                    .get("owned_by")
                    .and_then(|v| v.as_str())
                    .unwrap_or(provider)
                    .to_string(),
                served_by: provider.to_string(),
            })
        })
        .collect())
}
