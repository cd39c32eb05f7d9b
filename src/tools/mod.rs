// Copyright 2026 The Gantry Authors
// SPDX-License-Identifier: Apache-2.0

// Tool execution
//
// Responsibilities:
// - Publish the tools the servers advertise as chat-completion tools
// - Turn the model's tool calls into gateway requests, in input order
// - Strip the `mcpServer` routing key and use it to pick the target
// - Convert every outcome (bad arguments, gateway failure, success) into a
//   tool-result message carrying the call's correlation id
//
// A failing call never stops its siblings; the model sees the error text
// and decides what to do next.

pub mod jsonrpc;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::message::{ChatCompletionRequest, FunctionDefinition, Message, Tool, ToolCall};
use crate::transport::HttpError;

pub use jsonrpc::JsonRpcToolGateway;

/// Argument key naming the tool server a call should be routed to.
pub const ROUTING_KEY: &str = "mcpServer";

/// Method name for tool invocation.
pub const TOOLS_CALL: &str = "tools/call";

/// Method name for tool discovery.
pub const TOOLS_LIST: &str = "tools/list";

/// Prefix on the names of server tools offered to the model.
pub const TOOL_PREFIX: &str = "mcp_";

// ---------------------------------------------------------------------------
// Gateway contract
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolParams {
    pub name: String,
    pub arguments: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolRequest {
    pub method: String,
    pub params: ToolParams,
}

impl ToolRequest {
    pub fn call(name: impl Into<String>, arguments: Map<String, Value>) -> Self {
        Self {
            method: TOOLS_CALL.to_string(),
            params: ToolParams {
                name: name.into(),
                arguments,
            },
        }
    }
}

/// A tool advertised by a tool server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerTool {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Server that advertised the tool.
    pub server: String,
    pub input_schema: Value,
}

impl ServerTool {
    /// The chat-completion form offered to the model: prefixed name, input
    /// schema as parameters.
    pub fn to_chat_tool(&self) -> Tool {
        Tool {
            kind: "function".to_string(),
            function: FunctionDefinition {
                name: format!("{TOOL_PREFIX}{}", self.name),
                description: Some(self.description.clone()),
                parameters: Some(self.input_schema.clone()),
            },
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("tool server {0} not found")]
    ServerNotFound(String),

    #[error("no default tool server configured")]
    NoDefaultServer,

    #[error("tool server request failed: {0}")]
    Transport(String),

    #[error("tool server returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("tool server error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("tool execution failed: {0}")]
    Execution(String),

    #[error("invalid tool server response: {0}")]
    Decode(String),
}

impl From<HttpError> for ToolError {
    fn from(e: HttpError) -> Self {
        ToolError::Transport(e.to_string())
    }
}

/// Invokes named tools on a tool server.
#[async_trait]
pub trait ToolGateway: Send + Sync {
    /// `target` selects the server; empty means the server that advertised
    /// the tool, else the gateway's default.
    async fn call(&self, request: ToolRequest, target: &str) -> Result<Value, ToolError>;

    /// Tools advertised by every reachable server. A server that cannot be
    /// listed is left out.
    async fn discover(&self) -> Vec<ServerTool> {
        Vec::new()
    }
}

// ---------------------------------------------------------------------------
// Executor
// ---------------------------------------------------------------------------

pub struct ToolExecutor {
    gateway: Arc<dyn ToolGateway>,
}

impl ToolExecutor {
    pub fn new(gateway: Arc<dyn ToolGateway>) -> Self {
        Self { gateway }
    }

    /// Advertised tools, in server order.
    pub async fn catalog(&self) -> Vec<ServerTool> {
        self.gateway.discover().await
    }

    /// Add the advertised tools to a request. Tools the caller already
    /// declared under the same name are left alone.
    pub async fn attach(&self, request: &mut ChatCompletionRequest) -> usize {
        let catalog = self.catalog().await;
        if catalog.is_empty() {
            return 0;
        }
        let tools = request.tools.get_or_insert_with(Vec::new);
        let mut added = 0;
        for tool in catalog.iter().map(ServerTool::to_chat_tool) {
            if tools.iter().all(|t| t.function.name != tool.function.name) {
                tools.push(tool);
                added += 1;
            }
        }
        added
    }

    /// Run a batch sequentially. The result has one tool message per call,
    /// in input order.
    pub async fn execute(&self, calls: &[ToolCall]) -> Vec<Message> {
        let mut results = Vec::with_capacity(calls.len());
        for call in calls {
            let content = self.execute_one(call).await;
            results.push(Message::tool_result(call.id.clone(), content));
        }
        results
    }

    async fn execute_one(&self, call: &ToolCall) -> String {
        let mut arguments = match parse_arguments(&call.function.arguments) {
            Ok(args) => args,
            Err(e) => {
                tracing::warn!(tool = %call.function.name, tool_call_id = %call.id, error = %e, "failed to parse tool arguments");
                return format!("Error: Failed to parse arguments: {e}");
            }
        };

        let target = match arguments.remove(ROUTING_KEY) {
            Some(Value::String(s)) => s,
            _ => String::new(),
        };

        let name = call
            .function
            .name
            .strip_prefix(TOOL_PREFIX)
            .unwrap_or(call.function.name.as_str());

        tracing::info!(tool = %name, tool_call_id = %call.id, server = %target, "executing tool call");
        let request = ToolRequest::call(name, arguments);
        match self.gateway.call(request, &target).await {
            Ok(value) => serde_json::to_string(&value)
                .unwrap_or_else(|e| format!("Error marshaling result: {e}")),
            Err(e) => {
                tracing::warn!(tool = %call.function.name, tool_call_id = %call.id, error = %e, "tool call failed");
                format!("Error: {e}")
            }
        }
    }
}

/// Arguments must be a JSON object. An empty string or `null` means no
/// arguments.
fn parse_arguments(raw: &str) -> Result<Map<String, Value>, String> {
    if raw.trim().is_empty() {
        return Ok(Map::new());
    }
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(Value::Null) => Ok(Map::new()),
        Ok(other) => Err(format!("expected a JSON object, got {}", json_type(&other))),
        Err(e) => Err(e.to_string()),
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
