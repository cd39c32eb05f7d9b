// Copyright 2026 The Gantry Authors
// SPDX-License-Identifier: Apache-2.0

// JSON-RPC tool gateway
//
// Speaks MCP's streamable HTTP transport: every message is a JSON-RPC 2.0
// POST, and the server may answer with a plain JSON body or with a
// single-event SSE body. Each server is initialized once, lazily, before
// its first request; the session id it hands out is echoed on every later
// request. Tool lists are fetched after the handshake and kept per server
// until the server answers once.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::http::header::{HeaderName, HeaderValue, ACCEPT, CONTENT_TYPE};
use axum::http::{HeaderMap, Method};
use bytes::Bytes;
use serde_json::{json, Value};

use crate::transport::{HttpRequest, HttpResponse, HttpSender};

use super::{ServerTool, ToolError, ToolGateway, ToolRequest, TOOLS_LIST};

pub const PROTOCOL_VERSION: &str = "2025-03-26";
pub const SESSION_HEADER: &str = "mcp-session-id";

/// Bound on `tools/list` pages fetched from one server.
const MAX_LIST_PAGES: usize = 32;

pub struct JsonRpcToolGateway {
    http: Arc<dyn HttpSender>,
    servers: Vec<String>,
    default_server: Option<String>,
    timeout_ms: Option<u64>,
    next_id: AtomicU64,
    /// Initialized servers and the session id each one assigned, if any.
    sessions: Mutex<HashMap<String, Option<String>>>,
    /// Tools listed by each server that has answered `tools/list`.
    catalog: Mutex<HashMap<String, Vec<ServerTool>>>,
}

impl JsonRpcToolGateway {
    /// `servers` lists every reachable tool server. The default server is
    /// added to the list when missing; without one, the first listed
    /// server is the default.
    pub fn new(
        http: Arc<dyn HttpSender>,
        mut servers: Vec<String>,
        default_server: Option<String>,
        timeout_ms: Option<u64>,
    ) -> Self {
        let default_server = default_server
            .filter(|s| !s.is_empty())
            .or_else(|| servers.first().cloned());
        if let Some(d) = &default_server {
            if !servers.contains(d) {
                servers.push(d.clone());
            }
        }
        Self {
            http,
            servers,
            default_server,
            timeout_ms,
            next_id: AtomicU64::new(1),
            sessions: Mutex::new(HashMap::new()),
            catalog: Mutex::new(HashMap::new()),
        }
    }

    pub fn servers(&self) -> &[String] {
        &self.servers
    }

    /// Pick the server for a call. An explicit target must be listed;
    /// otherwise the server that advertised `tool` wins over the default.
    fn resolve(&self, target: &str, tool: &str) -> Result<String, ToolError> {
        if !target.is_empty() {
            return if self.servers.iter().any(|s| s == target) {
                Ok(target.to_string())
            } else {
                Err(ToolError::ServerNotFound(target.to_string()))
            };
        }
        if let Some(owner) = self.owner(tool) {
            return Ok(owner);
        }
        self.default_server
            .clone()
            .ok_or(ToolError::NoDefaultServer)
    }

    fn owner(&self, tool: &str) -> Option<String> {
        let catalog = self.catalog.lock().ok()?;
        self.servers
            .iter()
            .find(|server| {
                catalog
                    .get(*server)
                    .is_some_and(|tools| tools.iter().any(|t| t.name == tool))
            })
            .cloned()
    }

    fn cached_tools(&self, server: &str) -> Option<Vec<ServerTool>> {
        self.catalog.lock().ok().and_then(|c| c.get(server).cloned())
    }

    fn session(&self, server: &str) -> Option<Option<String>> {
        self.sessions
            .lock()
            .ok()
            .and_then(|s| s.get(server).cloned())
    }

    fn remember(&self, server: &str, session: Option<String>) {
        if let Ok(mut sessions) = self.sessions.lock() {
            sessions.insert(server.to_string(), session);
        }
    }

    fn headers(session: Option<&str>) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/json, text/event-stream"),
        );
        if let Some(value) = session.and_then(|s| HeaderValue::from_str(s).ok()) {
            headers.insert(HeaderName::from_static(SESSION_HEADER), value);
        }
        headers
    }

    async fn post(
        &self,
        server: &str,
        session: Option<&str>,
        message: &Value,
    ) -> Result<(HeaderMap, Bytes), ToolError> {
        let body = serde_json::to_vec(message).map_err(|e| ToolError::Decode(e.to_string()))?;
        let request = HttpRequest {
            method: Method::POST,
            url: server.to_string(),
            headers: Self::headers(session),
            body: Bytes::from(body),
            timeout_ms: self.timeout_ms,
            stream: false,
        };
        let HttpResponse {
            status,
            headers,
            body,
        } = self.http.send(request).await?;
        let body = body.into_bytes().await?;
        if !status.is_success() {
            return Err(ToolError::Status {
                status: status.as_u16(),
                body: String::from_utf8_lossy(&body).into_owned(),
            });
        }
        Ok((headers, body))
    }

    /// Send a request and return its `result`.
    async fn rpc(
        &self,
        server: &str,
        session: Option<&str>,
        method: &str,
        params: Value,
    ) -> Result<(Value, Option<String>), ToolError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let message = json!({"jsonrpc": "2.0", "id": id, "method": method, "params": params});
        let (headers, body) = self.post(server, session, &message).await?;

        let assigned = headers
            .get(SESSION_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let reply = decode_reply(&headers, &body)?;
        if let Some(error) = reply.get("error") {
            return Err(ToolError::Rpc {
                code: error.get("code").and_then(|c| c.as_i64()).unwrap_or(0),
                message: error
                    .get("message")
                    .and_then(|m| m.as_str())
                    .unwrap_or("unknown error")
                    .to_string(),
            });
        }
        let result = reply
            .get("result")
            .cloned()
            .ok_or_else(|| ToolError::Decode("reply has neither result nor error".into()))?;
        Ok((result, assigned))
    }

    /// Run the initialize handshake once per server and return its session.
    async fn ensure_session(&self, server: &str) -> Result<Option<String>, ToolError> {
        if let Some(session) = self.session(server) {
            return Ok(session);
        }

        let params = json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": {},
            "clientInfo": {"name": env!("CARGO_PKG_NAME"), "version": env!("CARGO_PKG_VERSION")},
        });
        let (_, session) = self.rpc(server, None, "initialize", params).await?;

        let note = json!({"jsonrpc": "2.0", "method": "notifications/initialized"});
        if let Err(e) = self.post(server, session.as_deref(), &note).await {
            tracing::warn!(server, error = %e, "initialized notification rejected");
        }

        tracing::info!(server, session = session.as_deref().unwrap_or(""), "tool server initialized");
        self.remember(server, session.clone());
        Ok(session)
    }

    /// Fetch every page of `tools/list` from one server.
    async fn list_tools(&self, server: &str) -> Result<Vec<ServerTool>, ToolError> {
        let session = self.ensure_session(server).await?;
        let mut tools = Vec::new();
        let mut cursor: Option<String> = None;

        for _ in 0..MAX_LIST_PAGES {
            let params = match &cursor {
                Some(c) => json!({"cursor": c}),
                None => json!({}),
            };
            let (result, _) = self
                .rpc(server, session.as_deref(), TOOLS_LIST, params)
                .await?;
            tools.extend(parse_tool_list(server, &result)?);

            cursor = result
                .get("nextCursor")
                .and_then(|c| c.as_str())
                .filter(|c| !c.is_empty())
                .map(str::to_string);
            if cursor.is_none() {
                return Ok(tools);
            }
        }

        tracing::warn!(server, pages = MAX_LIST_PAGES, "tool list truncated");
        Ok(tools)
    }
}

#[async_trait]
impl ToolGateway for JsonRpcToolGateway {
    async fn call(&self, request: ToolRequest, target: &str) -> Result<Value, ToolError> {
        let server = self.resolve(target, &request.params.name)?;
        let session = self.ensure_session(&server).await?;

        let params =
            serde_json::to_value(&request.params).map_err(|e| ToolError::Decode(e.to_string()))?;
        let (result, _) = self
            .rpc(&server, session.as_deref(), &request.method, params)
            .await?;

        if result.get("isError").and_then(|v| v.as_bool()) == Some(true) {
            return Err(ToolError::Execution(result_text(&result)));
        }
        Ok(result)
    }

    async fn discover(&self) -> Vec<ServerTool> {
        let mut all = Vec::new();
        for server in &self.servers {
            if let Some(tools) = self.cached_tools(server) {
                all.extend(tools);
                continue;
            }
            match self.list_tools(server).await {
                Ok(tools) => {
                    tracing::info!(server = %server, count = tools.len(), "tools discovered");
                    if let Ok(mut catalog) = self.catalog.lock() {
                        catalog.insert(server.clone(), tools.clone());
                    }
                    all.extend(tools);
                }
                Err(e) => {
                    tracing::error!(server = %server, error = %e, "failed to list tools");
                }
            }
        }
        all
    }
}

/// Tools from one `tools/list` result. A missing description reads as
/// empty and a missing schema as an empty object.
fn parse_tool_list(server: &str, result: &Value) -> Result<Vec<ServerTool>, ToolError> {
    let entries = result
        .get("tools")
        .and_then(|t| t.as_array())
        .ok_or_else(|| ToolError::Decode("tools/list result has no tools array".into()))?;

    Ok(entries
        .iter()
        .filter_map(|entry| {
            let name = entry.get("name").and_then(|n| n.as_str())?;
            Some(ServerTool {
                name: name.to_string(),
                description: entry
                    .get("description")
                    .and_then(|d| d.as_str())
                    .unwrap_or("")
                    .to_string(),
                server: server.to_string(),
                input_schema: entry
                    .get("inputSchema")
                    .filter(|s| s.is_object())
                    .cloned()
                    .unwrap_or_else(|| json!({})),
            })
        })
        .collect())
}

/// Decode a JSON-RPC reply from a JSON or SSE body.
fn decode_reply(headers: &HeaderMap, body: &[u8]) -> Result<Value, ToolError> {
    let text = String::from_utf8_lossy(body);
    let is_sse = headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|ct| ct.starts_with("text/event-stream"))
        .unwrap_or(false)
        || text.trim_start().starts_with("event:")
        || text.trim_start().starts_with("data:");

    let json_text = if is_sse {
        text.lines()
            .filter_map(|line| line.trim().strip_prefix("data:"))
            .map(str::trim)
            .find(|data| !data.is_empty() && *data != "[DONE]")
            .ok_or_else(|| ToolError::Decode("no data in event-stream reply".into()))?
            .to_string()
    } else {
        text.into_owned()
    };

    serde_json::from_str(&json_text).map_err(|e| ToolError::Decode(e.to_string()))
}

/// Text blocks of an MCP tool result, joined by newlines.
fn result_text(result: &Value) -> String {
    let texts: Vec<&str> = result
        .get("content")
        .and_then(|c| c.as_array())
        .map(|blocks| {
            blocks
                .iter()
                .filter_map(|b| b.get("text").and_then(|t| t.as_str()))
                .collect()
        })
        .unwrap_or_default();
    if texts.is_empty() {
        result.to_string()
    } else {
        texts.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{HttpBody, HttpError};
    use axum::http::StatusCode;

    /// Answers by JSON-RPC method and records every message sent.
    ///
    /// `tools/list` serves `pages` in order, chained by `page-<n>` cursors;
    /// with no pages it fails with 503 until `pages` is filled in.
    struct ScriptedServer {
        sse: bool,
        tool_reply: Value,
        pages: Mutex<Vec<Value>>,
        sent: Mutex<Vec<(HttpRequest, Value)>>,
    }

    impl ScriptedServer {
        fn build(sse: bool, tool_reply: Value, pages: Vec<Value>) -> Arc<Self> {
            Arc::new(Self {
                sse,
                tool_reply,
                pages: Mutex::new(pages),
                sent: Mutex::new(Vec::new()),
            })
        }

        fn new(tool_reply: Value) -> Arc<Self> {
            Self::build(false, tool_reply, Vec::new())
        }

        fn sse(tool_reply: Value) -> Arc<Self> {
            Self::build(true, tool_reply, Vec::new())
        }

        fn listing(pages: Vec<Value>) -> Arc<Self> {
            Self::build(
                false,
                json!({"jsonrpc": "2.0", "result": {"content": [{"type": "text", "text": "ok"}]}}),
                pages,
            )
        }

        fn list_reply(&self, message: &Value) -> Option<Value> {
            let pages = self.pages.lock().unwrap();
            if pages.is_empty() {
                return None;
            }
            let page = message["params"]["cursor"]
                .as_str()
                .and_then(|c| c.strip_prefix("page-"))
                .and_then(|n| n.parse::<usize>().ok())
                .unwrap_or(0);
            let mut result = pages[page].clone();
            if page + 1 < pages.len() {
                result["nextCursor"] = json!(format!("page-{}", page + 1));
            }
            Some(json!({"jsonrpc": "2.0", "id": message["id"], "result": result}))
        }

        fn methods(&self) -> Vec<String> {
            self.sent
                .lock()
                .unwrap()
                .iter()
                .map(|(_, m)| m["method"].as_str().unwrap_or("").to_string())
                .collect()
        }
    }

    #[async_trait]
    impl HttpSender for ScriptedServer {
        async fn send(&self, request: HttpRequest) -> Result<HttpResponse, HttpError> {
            let message: Value = serde_json::from_slice(&request.body).unwrap();
            self.sent.lock().unwrap().push((request, message.clone()));

            let mut headers = HeaderMap::new();
            let reply = match message["method"].as_str() {
                Some("initialize") => {
                    headers.insert(SESSION_HEADER, HeaderValue::from_static("sess-1"));
                    json!({"jsonrpc": "2.0", "id": message["id"], "result": {"protocolVersion": PROTOCOL_VERSION}})
                }
                Some("notifications/initialized") => {
                    return Ok(HttpResponse {
                        status: StatusCode::ACCEPTED,
                        headers,
                        body: HttpBody::Full(Bytes::new()),
                    })
                }
                Some("tools/list") => match self.list_reply(&message) {
                    Some(reply) => reply,
                    None => {
                        return Ok(HttpResponse {
                            status: StatusCode::SERVICE_UNAVAILABLE,
                            headers,
                            body: HttpBody::Full(Bytes::from_static(b"warming up")),
                        })
                    }
                },
                _ => {
                    let mut reply = self.tool_reply.clone();
                    reply["id"] = message["id"].clone();
                    reply
                }
            };

            let body = if self.sse {
                headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/event-stream"));
                format!("event: message\ndata: {reply}\n\n")
            } else {
                headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
                reply.to_string()
            };
            Ok(HttpResponse {
                status: StatusCode::OK,
                headers,
                body: HttpBody::Full(Bytes::from(body)),
            })
        }
    }

    const SERVER: &str = "http://tools.test/mcp";

    fn gateway(http: Arc<ScriptedServer>) -> JsonRpcToolGateway {
        JsonRpcToolGateway::new(http, vec![SERVER.to_string()], None, Some(1_000))
    }

    fn add_request() -> ToolRequest {
        let args = json!({"a": 2, "b": 2});
        ToolRequest::call("add", args.as_object().unwrap().clone())
    }

    #[tokio::test]
    async fn first_call_initializes_then_reuses_session() {
        let http = ScriptedServer::new(json!({
            "jsonrpc": "2.0",
            "result": {"content": [{"type": "text", "text": "4"}]}
        }));
        let gw = gateway(http.clone());

        let result = gw.call(add_request(), "").await.unwrap();
        assert_eq!(result["content"][0]["text"], json!("4"));
        gw.call(add_request(), SERVER).await.unwrap();

        assert_eq!(
            http.methods(),
            vec!["initialize", "notifications/initialized", "tools/call", "tools/call"]
        );

        let sent = http.sent.lock().unwrap();
        let (call_req, call_msg) = &sent[2];
        assert_eq!(call_req.url, SERVER);
        assert_eq!(call_req.headers.get(SESSION_HEADER).unwrap(), "sess-1");
        assert_eq!(call_msg["jsonrpc"], json!("2.0"));
        assert_eq!(call_msg["params"]["name"], json!("add"));
        assert_eq!(call_msg["params"]["arguments"], json!({"a": 2, "b": 2}));
        assert_ne!(sent[2].1["id"], sent[3].1["id"]);
    }

    #[tokio::test]
    async fn sse_reply_is_decoded() {
        let http = ScriptedServer::sse(json!({"jsonrpc": "2.0", "result": {"content": []}}));
        let result = gateway(http).call(add_request(), "").await.unwrap();
        assert_eq!(result, json!({"content": []}));
    }

    #[tokio::test]
    async fn rpc_error_is_mapped() {
        let http = ScriptedServer::new(json!({
            "jsonrpc": "2.0",
            "error": {"code": -32602, "message": "unknown tool: add"}
        }));
        match gateway(http).call(add_request(), "").await {
            Err(ToolError::Rpc { code, message }) => {
                assert_eq!(code, -32602);
                assert_eq!(message, "unknown tool: add");
            }
            other => panic!("expected Rpc error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn is_error_result_is_execution_failure() {
        let http = ScriptedServer::new(json!({
            "jsonrpc": "2.0",
            "result": {"isError": true, "content": [{"type": "text", "text": "city not found"}]}
        }));
        match gateway(http).call(add_request(), "").await {
            Err(ToolError::Execution(msg)) => assert_eq!(msg, "city not found"),
            other => panic!("expected Execution error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn unknown_target_is_rejected_without_traffic() {
        let http = ScriptedServer::new(json!({}));
        let gw = gateway(http.clone());
        assert!(matches!(
            gw.call(add_request(), "http://evil.test/mcp").await,
            Err(ToolError::ServerNotFound(s)) if s == "http://evil.test/mcp"
        ));
        assert!(http.methods().is_empty());
    }

    #[tokio::test]
    async fn no_servers_means_no_default() {
        let gw = JsonRpcToolGateway::new(ScriptedServer::new(json!({})), vec![], None, None);
        assert!(matches!(
            gw.call(add_request(), "").await,
            Err(ToolError::NoDefaultServer)
        ));
    }

    #[test]
    fn default_server_joins_server_list() {
        let gw = JsonRpcToolGateway::new(
            ScriptedServer::new(json!({})),
            vec!["http://a/mcp".into()],
            Some("http://b/mcp".into()),
            None,
        );
        assert_eq!(gw.servers(), ["http://a/mcp", "http://b/mcp"]);
        assert_eq!(gw.resolve("", "add").unwrap(), "http://b/mcp");
    }

    fn tool(name: &str) -> Value {
        json!({
            "name": name,
            "description": format!("{name} two numbers"),
            "inputSchema": {"type": "object", "properties": {"a": {"type": "number"}}}
        })
    }

    #[tokio::test]
    async fn discovery_lists_tools_after_handshake() {
        let http = ScriptedServer::listing(vec![json!({"tools": [tool("add"), tool("mul")]})]);
        let gw = gateway(http.clone());

        let tools = gw.discover().await;
        let names: Vec<_> = tools.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["add", "mul"]);
        assert_eq!(tools[0].server, SERVER);
        assert_eq!(tools[0].description, "add two numbers");
        assert_eq!(tools[0].input_schema["type"], json!("object"));

        assert_eq!(
            http.methods(),
            vec!["initialize", "notifications/initialized", "tools/list"]
        );
        let sent = http.sent.lock().unwrap();
        assert_eq!(sent[2].0.headers.get(SESSION_HEADER).unwrap(), "sess-1");
    }

    #[tokio::test]
    async fn discovery_follows_cursors_and_is_cached() {
        let http = ScriptedServer::listing(vec![
            json!({"tools": [tool("add")]}),
            json!({"tools": [{"name": "now"}]}),
        ]);
        let gw = gateway(http.clone());

        let first = gw.discover().await;
        let second = gw.discover().await;
        assert_eq!(first, second);
        assert_eq!(first.len(), 2);
        assert_eq!(first[1].description, "");
        assert_eq!(first[1].input_schema, json!({}));

        let sent = http.sent.lock().unwrap();
        let lists: Vec<_> = sent
            .iter()
            .filter(|(_, m)| m["method"] == json!("tools/list"))
            .map(|(_, m)| m["params"].clone())
            .collect();
        assert_eq!(lists, vec![json!({}), json!({"cursor": "page-1"})]);
    }

    #[tokio::test]
    async fn failed_listing_is_skipped_and_retried() {
        let http = ScriptedServer::listing(Vec::new());
        let gw = gateway(http.clone());

        assert!(gw.discover().await.is_empty());

        http.pages
            .lock()
            .unwrap()
            .push(json!({"tools": [tool("add")]}));
        let tools = gw.discover().await;
        assert_eq!(tools.len(), 1);

        // One handshake, two listing attempts.
        assert_eq!(
            http.methods(),
            vec!["initialize", "notifications/initialized", "tools/list", "tools/list"]
        );
    }

    #[tokio::test]
    async fn untargeted_call_goes_to_the_advertising_server() {
        let other = "http://other.test/mcp";
        let http = ScriptedServer::new(json!({"jsonrpc": "2.0", "result": {"content": []}}));
        let gw = JsonRpcToolGateway::new(
            http.clone(),
            vec![other.to_string(), SERVER.to_string()],
            Some(other.to_string()),
            None,
        );
        // SERVER advertised `add`; `other` is the default.
        gw.catalog
            .lock()
            .unwrap()
            .insert(SERVER.to_string(), vec![ServerTool {
                name: "add".into(),
                description: String::new(),
                server: SERVER.into(),
                input_schema: json!({}),
            }]);

        gw.call(add_request(), "").await.unwrap();
        let unknown = ToolRequest::call("sub", serde_json::Map::new());
        gw.call(unknown, "").await.unwrap();

        let sent = http.sent.lock().unwrap();
        let calls: Vec<_> = sent
            .iter()
            .filter(|(_, m)| m["method"] == json!("tools/call"))
            .map(|(r, _)| r.url.as_str())
            .collect();
        assert_eq!(calls, vec![SERVER, other]);
    }

    #[test]
    fn tool_list_without_array_is_a_decode_error() {
        assert!(matches!(
            parse_tool_list(SERVER, &json!({"cursor": null})),
            Err(ToolError::Decode(_))
        ));
    }

    #[test]
    fn sse_body_without_content_type_is_detected() {
        let body = b"data: {\"jsonrpc\":\"2.0\",\"id\":1,\"result\":7}\n\n";
        let reply = decode_reply(&HeaderMap::new(), body).unwrap();
        assert_eq!(reply["result"], json!(7));
    }
}
