// Copyright 2026 The Gantry Authors
// SPDX-License-Identifier: Apache-2.0

// HTTP surface
//
// Responsibilities:
// - Heartbeat endpoint
// - Model listing, for one backend or all configured backends
// - Chat completions through the agent loop, JSON or SSE, with the tool
//   servers' tools added to every request
// - Tool catalog listing, when enabled
// - Backend selection from `?provider=` or a `<provider>/` model prefix
// - Client disconnect cancels the in-flight run
// - 404 for unknown paths

use std::convert::Infallible;
use std::sync::Arc;

use axum::body::{Body, Bytes};
use axum::extract::{Query, State};
use axum::http::header::{CACHE_CONTROL, CONTENT_TYPE};
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;

use crate::agent::AgentError;
use crate::gateway::Gateway;
use crate::message::{ChatCompletionRequest, ListModelsResponse};
use crate::provider::{Provider, ProviderError, ProviderId};
use crate::tools::ServerTool;

/// Buffered SSE frames between the agent task and the response body.
const FRAME_BUFFER: usize = 64;

/// Non-standard "client closed request" status.
const CLIENT_CLOSED_REQUEST: u16 = 499;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Failed to decode request: {0}")]
    MalformedJson(String),

    #[error("request body is empty")]
    EmptyBody,

    #[error("Unable to determine provider for model. Please specify a provider using the ?provider= query parameter or use the provider/model format (e.g., openai/gpt-4).")]
    ProviderUndetermined,

    #[error("provider {0} not found")]
    UnknownProvider(String),

    #[error("provider {0} is not configured")]
    NotConfigured(ProviderId),

    #[error("mcp tools endpoint is not exposed")]
    ToolsNotExposed,

    #[error(transparent)]
    Agent(#[from] AgentError),
}

impl From<ProviderError> for ServerError {
    fn from(e: ProviderError) -> Self {
        ServerError::Agent(e.into())
    }
}

impl ServerError {
    pub fn status(&self) -> StatusCode {
        match self {
            ServerError::MalformedJson(_)
            | ServerError::EmptyBody
            | ServerError::ProviderUndetermined
            | ServerError::UnknownProvider(_)
            | ServerError::NotConfigured(_) => StatusCode::BAD_REQUEST,
            ServerError::ToolsNotExposed => StatusCode::FORBIDDEN,
            ServerError::Agent(AgentError::Provider(e) | AgentError::StreamOpen(e)) => match e {
                ProviderError::RequestFailed { status, .. } => {
                    StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY)
                }
                ProviderError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
                ProviderError::UnknownProvider(_)
                | ProviderError::MissingCredential(_)
                | ProviderError::InvalidCredential(_) => StatusCode::BAD_REQUEST,
                ProviderError::Cancelled => client_closed(),
                ProviderError::Transport(_) | ProviderError::Decode(_) => StatusCode::BAD_GATEWAY,
            },
            ServerError::Agent(AgentError::Cancelled) => client_closed(),
            ServerError::Agent(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

fn client_closed() -> StatusCode {
    StatusCode::from_u16(CLIENT_CLOSED_REQUEST).unwrap_or(StatusCode::BAD_REQUEST)
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = serde_json::json!({ "error": self.to_string() });
        (status, Json(body)).into_response()
    }
}

// ---------------------------------------------------------------------------
// Backend selection
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
pub struct ProviderQuery {
    pub provider: Option<String>,
}

impl ProviderQuery {
    fn id(&self) -> Result<Option<ProviderId>, ServerError> {
        match self.provider.as_deref() {
            None | Some("") => Ok(None),
            Some(p) => p
                .parse()
                .map(Some)
                .map_err(|_| ServerError::UnknownProvider(p.to_string())),
        }
    }
}

/// Split a `<provider>/<model>` name. The prefix match ignores case; the
/// remainder keeps its original spelling.
pub fn split_model_prefix(model: &str) -> Option<(ProviderId, &str)> {
    let (prefix, rest) = model.split_once('/')?;
    let id = prefix.to_ascii_lowercase().parse().ok()?;
    Some((id, rest))
}

/// Pick the backend for a chat request. An explicit query wins and leaves
/// the model untouched; otherwise the model prefix decides and is stripped.
pub fn resolve_provider(
    query: Option<ProviderId>,
    model: &str,
) -> Result<(ProviderId, String), ServerError> {
    if let Some(id) = query {
        return Ok((id, model.to_string()));
    }
    split_model_prefix(model)
        .map(|(id, rest)| (id, rest.to_string()))
        .ok_or(ServerError::ProviderUndetermined)
}

// ---------------------------------------------------------------------------
// Shared application state
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct AppState {
    pub gateway: Arc<Gateway>,
}

impl AppState {
    fn provider(&self, id: ProviderId) -> Result<Arc<dyn Provider>, ServerError> {
        self.gateway.provider(id).ok_or(ServerError::NotConfigured(id))
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// GET /v1/heartbeat -> 200 OK
pub async fn heartbeat() -> StatusCode {
    StatusCode::OK
}

/// GET /v1/models[?provider=<id>]
///
/// Without a provider, every configured backend is asked concurrently and
/// the lists are merged. A backend that fails is logged and left out.
pub async fn list_models(
    State(state): State<AppState>,
    Query(query): Query<ProviderQuery>,
) -> Result<Json<ListModelsResponse>, ServerError> {
    let cancel = CancellationToken::new();
    let _guard = cancel.clone().drop_guard();

    if let Some(id) = query.id()? {
        let provider = state.provider(id)?;
        let response = provider.list_models(&cancel).await.map_err(|e| {
            tracing::error!(provider = %id, error = %e, "failed to list models");
            ServerError::from(e)
        })?;
        return Ok(Json(response));
    }

    let cancel = &cancel;
    let calls = state.gateway.providers().map(move |provider| {
        async move {
            let id = provider.id();
            match provider.list_models(cancel).await {
                Ok(response) => response.data,
                Err(e) => {
                    tracing::error!(provider = %id, error = %e, "failed to list models");
                    Vec::new()
                }
            }
        }
    });
    let data = join_all(calls).await.into_iter().flatten().collect();

    Ok(Json(ListModelsResponse::new(None, data)))
}

/// POST /v1/chat/completions[?provider=<id>]
pub async fn chat_completions(
    State(state): State<AppState>,
    Query(query): Query<ProviderQuery>,
    body: Bytes,
) -> Result<Response, ServerError> {
    let request_id = Uuid::new_v4().to_string();

    if body.is_empty() {
        return Err(ServerError::EmptyBody);
    }
    let mut request: ChatCompletionRequest =
        serde_json::from_slice(&body).map_err(|e| ServerError::MalformedJson(e.to_string()))?;

    let (id, model) = resolve_provider(query.id()?, &request.model)?;
    request.model = model;
    let provider = state.provider(id)?;
    let server_tools = state.gateway.attach_tools(&mut request).await;

    let span = tracing::info_span!(
        "chat",
        request_id = %request_id,
        provider = %id,
        model = %request.model,
        stream = request.stream,
        server_tools,
    );

    if request.stream {
        return Ok(stream_completion(&state, provider, request, span));
    }

    async move {
        let cancel = CancellationToken::new();
        let _guard = cancel.clone().drop_guard();

        let first = provider.generate_tokens(&request, &cancel).await.map_err(|e| {
            tracing::error!(error = %e, "failed to generate tokens");
            ServerError::from(e)
        })?;
        let run = state.gateway.agent(provider).run(&request, first, &cancel).await?;

        tracing::info!(
            round_trips = run.round_trips,
            exhausted = run.exhausted,
            "chat completion finished"
        );
        Ok(Json(run.response).into_response())
    }
    .instrument(span)
    .await
}

/// Spawn the streaming agent and hand its frames to the response body.
/// Dropping the body (client gone) cancels the run.
fn stream_completion(
    state: &AppState,
    provider: Arc<dyn Provider>,
    request: ChatCompletionRequest,
    span: tracing::Span,
) -> Response {
    let (tx, rx) = mpsc::channel::<Bytes>(FRAME_BUFFER);
    let cancel = CancellationToken::new();
    let guard = cancel.clone().drop_guard();
    let agent = state.gateway.agent(provider);

    tokio::spawn(
        async move {
            match agent.run_stream(&request, tx, &cancel).await {
                Ok(run) => tracing::info!(
                    round_trips = run.round_trips,
                    exhausted = run.exhausted,
                    "stream finished"
                ),
                Err(AgentError::Cancelled) => tracing::debug!("stream cancelled by client"),
                // Already relayed to the client as an error frame.
                Err(e) => tracing::debug!(error = %e, "stream ended with error"),
            }
        }
        .instrument(span),
    );

    let frames = ReceiverStream::new(rx).map(move |frame| {
        let _keep = &guard;
        Ok::<Bytes, Infallible>(frame)
    });

    let mut response = Response::new(Body::from_stream(frames));
    let headers = response.headers_mut();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/event-stream"));
    headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert("x-accel-buffering", HeaderValue::from_static("no"));
    response
}

#[derive(Debug, Serialize)]
pub struct ListToolsResponse {
    pub object: &'static str,
    pub data: Vec<ServerTool>,
}

/// GET /v1/mcp/tools -> every advertised tool with its server
pub async fn list_tools(
    State(state): State<AppState>,
) -> Result<Json<ListToolsResponse>, ServerError> {
    if !state.gateway.tool_listing_exposed() {
        tracing::warn!("tool catalog requested but not exposed");
        return Err(ServerError::ToolsNotExposed);
    }
    Ok(Json(ListToolsResponse {
        object: "list",
        data: state.gateway.tool_catalog().await,
    }))
}

async fn not_found() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(serde_json::json!({ "error": "Requested route is not found" })),
    )
}

// ---------------------------------------------------------------------------
// Router construction
// ---------------------------------------------------------------------------

pub fn build_router(gateway: Arc<Gateway>) -> Router {
    let state = AppState { gateway };

    Router::new()
        .route("/v1/heartbeat", get(heartbeat))
        .route("/v1/models", get(list_models))
        .route("/v1/chat/completions", post(chat_completions))
        .route("/v1/mcp/tools", get(list_tools))
        .fallback(not_found)
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
