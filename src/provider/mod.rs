// Copyright 2026 The Gantry Authors
// SPDX-License-Identifier: Apache-2.0

// Provider adapters
//
// Responsibilities:
// - Capability interface shared by every backend (list, generate, stream)
// - One HttpProvider per configured backend, built from its registry entry
// - Credential placement (bearer, named header, query parameter, none)
// - Non-2xx statuses surface as RequestFailed with the status code
// - Every outbound call races the caller's cancellation token

pub mod codec;
pub mod registry;

use std::sync::Arc;

use async_trait::async_trait;
use axum::http::header::{HeaderName, HeaderValue, ACCEPT, AUTHORIZATION, CACHE_CONTROL, CONTENT_TYPE};
use axum::http::{HeaderMap, Method};
use bytes::Bytes;
use futures_util::stream;
use tokio_util::sync::CancellationToken;

use crate::message::{ChatCompletionRequest, ChatCompletionResponse, ListModelsResponse};
use crate::stream::{event_stream, parser_for, EventStream, StreamParser};
use crate::transport::{ByteStream, HttpBody, HttpError, HttpRequest, HttpResponse, HttpSender};

use codec::{codec_for, decode_model_list, Codec};
pub use registry::{AuthScheme, ProviderId, ProviderSpec, REGISTRY};

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("provider {0} not found")]
    UnknownProvider(String),

    #[error("provider {0} token not configured")]
    MissingCredential(ProviderId),

    #[error("provider {0} token is not a valid header value")]
    InvalidCredential(ProviderId),

    #[error("request failed with status code: {status}")]
    RequestFailed { status: u16, body: String },

    #[error("upstream request failed: {0}")]
    Transport(String),

    #[error("upstream request timed out: {0}")]
    Timeout(String),

    #[error("failed to decode upstream response: {0}")]
    Decode(String),

    #[error("request cancelled")]
    Cancelled,
}

impl From<HttpError> for ProviderError {
    fn from(e: HttpError) -> Self {
        match e {
            HttpError::Transport(msg) => ProviderError::Transport(msg),
            HttpError::Timeout(msg) => ProviderError::Timeout(msg),
        }
    }
}

// ---------------------------------------------------------------------------
// Trait: Provider (capability interface)
// ---------------------------------------------------------------------------

/// One backend behind the canonical API.
#[async_trait]
pub trait Provider: Send + Sync {
    fn id(&self) -> ProviderId;

    async fn list_models(
        &self,
        cancel: &CancellationToken,
    ) -> Result<ListModelsResponse, ProviderError>;

    async fn generate_tokens(
        &self,
        request: &ChatCompletionRequest,
        cancel: &CancellationToken,
    ) -> Result<ChatCompletionResponse, ProviderError>;

    /// Open a streaming call. The returned stream yields canonical events in
    /// arrival order and ends when the backend closes the connection.
    async fn stream_generate_tokens(
        &self,
        request: &ChatCompletionRequest,
        cancel: &CancellationToken,
    ) -> Result<EventStream, ProviderError>;
}

// ---------------------------------------------------------------------------
// Construction
// ---------------------------------------------------------------------------

/// Per-backend settings supplied by configuration.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProviderSettings {
    pub api_key: Option<String>,
    /// Replaces the registry base URL when set.
    pub base_url: Option<String>,
    /// Whole-request timeout for non-streaming calls.
    pub timeout_ms: Option<u64>,
}

/// Build the adapter for `identifier`.
///
/// Fails when the identifier is not registered or the backend needs a
/// credential that was not supplied.
pub fn build_provider(
    identifier: &str,
    settings: ProviderSettings,
    http: Arc<dyn HttpSender>,
) -> Result<Arc<dyn Provider>, ProviderError> {
    let spec = registry::lookup(identifier)?;
    let token = settings.api_key.filter(|k| !k.is_empty());

    let auth = match (spec.auth, token) {
        (AuthScheme::None, _) => Credential::None,
        (_, None) => return Err(ProviderError::MissingCredential(spec.id)),
        (AuthScheme::Bearer, Some(t)) => Credential::Header(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {t}"))
                .map_err(|_| ProviderError::InvalidCredential(spec.id))?,
        ),
        (AuthScheme::Header(name), Some(t)) => Credential::Header(
            HeaderName::from_static(name),
            HeaderValue::from_str(&t).map_err(|_| ProviderError::InvalidCredential(spec.id))?,
        ),
        (AuthScheme::Query(name), Some(t)) => Credential::Query(name, t),
    };

    let parser = parser_for(spec.id.as_str())
        .map_err(|_| ProviderError::UnknownProvider(identifier.to_string()))?;

    Ok(Arc::new(HttpProvider {
        spec,
        base_url: settings
            .base_url
            .unwrap_or_else(|| spec.base_url.to_string())
            .trim_end_matches('/')
            .to_string(),
        auth,
        codec: codec_for(spec),
        parser,
        http,
        timeout_ms: settings.timeout_ms,
    }))
}

// ---------------------------------------------------------------------------
// HttpProvider
// ---------------------------------------------------------------------------

enum Credential {
    None,
    Header(HeaderName, HeaderValue),
    Query(&'static str, String),
}

pub struct HttpProvider {
    spec: &'static ProviderSpec,
    base_url: String,
    auth: Credential,
    codec: Box<dyn Codec>,
    parser: Arc<dyn StreamParser>,
    http: Arc<dyn HttpSender>,
    timeout_ms: Option<u64>,
}

impl HttpProvider {
    fn url(&self, endpoint: &str) -> Result<String, ProviderError> {
        let url = format!("{}{}", self.base_url, endpoint);
        match &self.auth {
            Credential::Query(name, token) => {
                let mut parsed = reqwest::Url::parse(&url)
                    .map_err(|e| ProviderError::Transport(format!("invalid url {url}: {e}")))?;
                parsed.query_pairs_mut().append_pair(name, token);
                Ok(parsed.to_string())
            }
            _ => Ok(url),
        }
    }

    fn headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("text/event-stream, application/json"),
        );
        headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
        if let Credential::Header(name, value) = &self.auth {
            headers.insert(name.clone(), value.clone());
        }
        for (name, value) in self.spec.extra_headers {
            headers.append(
                HeaderName::from_static(name),
                HeaderValue::from_static(value),
            );
        }
        headers
    }

    fn chat_request(
        &self,
        request: &ChatCompletionRequest,
        stream: bool,
    ) -> Result<HttpRequest, ProviderError> {
        let body = self.codec.encode_request(request, stream)?;
        let body = serde_json::to_vec(&body).map_err(|e| ProviderError::Decode(e.to_string()))?;
        Ok(HttpRequest {
            method: Method::POST,
            url: self.url(self.spec.endpoints.chat)?,
            headers: self.headers(),
            body: Bytes::from(body),
            timeout_ms: if stream { None } else { self.timeout_ms },
            stream,
        })
    }

    async fn send(
        &self,
        request: HttpRequest,
        cancel: &CancellationToken,
    ) -> Result<HttpResponse, ProviderError> {
        tracing::debug!(provider = %self.spec.id, url = %request.url, stream = request.stream, "sending upstream request");
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(ProviderError::Cancelled),
            result = self.http.send(request) => Ok(result?),
        }
    }

    /// Read the body of a non-2xx response into a RequestFailed error.
    async fn failure(&self, response: HttpResponse, cancel: &CancellationToken) -> ProviderError {
        let status = response.status.as_u16();
        let body = tokio::select! {
            biased;
            _ = cancel.cancelled() => return ProviderError::Cancelled,
            body = response.body.into_bytes() => body,
        };
        let body = match body {
            Ok(b) => String::from_utf8_lossy(&b).into_owned(),
            Err(e) => format!("failed to read response body (status {status}): {e}"),
        };
        tracing::warn!(provider = %self.spec.id, status, "upstream returned non-success status");
        ProviderError::RequestFailed { status, body }
    }

    async fn full_body(
        &self,
        response: HttpResponse,
        cancel: &CancellationToken,
    ) -> Result<Bytes, ProviderError> {
        if !response.status.is_success() {
            return Err(self.failure(response, cancel).await);
        }
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(ProviderError::Cancelled),
            body = response.body.into_bytes() => Ok(body?),
        }
    }
}

#[async_trait]
impl Provider for HttpProvider {
    fn id(&self) -> ProviderId {
        self.spec.id
    }

    async fn list_models(
        &self,
        cancel: &CancellationToken,
    ) -> Result<ListModelsResponse, ProviderError> {
        let mut headers = self.headers();
        headers.remove(CONTENT_TYPE);
        let request = HttpRequest {
            method: Method::GET,
            url: self.url(self.spec.endpoints.models)?,
            headers,
            body: Bytes::new(),
            timeout_ms: self.timeout_ms,
            stream: false,
        };

        let response = self.send(request, cancel).await?;
        let body = self.full_body(response, cancel).await?;
        let models = decode_model_list(self.spec, &body)?;
        Ok(ListModelsResponse::new(
            Some(self.spec.id.as_str().to_string()),
            models,
        ))
    }

    async fn generate_tokens(
        &self,
        request: &ChatCompletionRequest,
        cancel: &CancellationToken,
    ) -> Result<ChatCompletionResponse, ProviderError> {
        let http_request = self.chat_request(request, false)?;
        let response = self.send(http_request, cancel).await?;
        let body = self.full_body(response, cancel).await?;
        self.codec.decode_response(&body)
    }

    async fn stream_generate_tokens(
        &self,
        request: &ChatCompletionRequest,
        cancel: &CancellationToken,
    ) -> Result<EventStream, ProviderError> {
        let http_request = self.chat_request(request, true)?;
        let response = self.send(http_request, cancel).await?;
        if !response.status.is_success() {
            return Err(self.failure(response, cancel).await);
        }

        let input: ByteStream = match response.body {
            HttpBody::Stream(s) => s,
            HttpBody::Full(b) => Box::pin(stream::iter(vec![Ok::<_, HttpError>(b)])),
        };
        Ok(event_stream(input, self.parser.clone(), cancel.clone()))
    }
}
