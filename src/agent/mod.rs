// Copyright 2026 The Gantry Authors
// SPDX-License-Identifier: Apache-2.0

// Agent orchestrator
//
// Drives the model/tool loop for one client request:
// - Synchronous: start from an already-produced response, execute tool
//   calls, ask the model again, until it answers without tools
// - Streaming: open one streaming call per turn, relay every chunk to the
//   client sink as it arrives, fold tool-call fragments, execute, repeat
//
// Both loops stop at `max_iterations`. Hitting the ceiling is a warning:
// the last available answer is still returned. Every await races the
// caller's cancellation token.

pub mod accumulator;

use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;

use crate::message::{
    ChatCompletionRequest, ChatCompletionResponse, ChatCompletionStreamResponse, FinishReason,
    Message, ToolCall,
};
use crate::provider::{Provider, ProviderError};
use crate::stream::{EventKind, StreamError, StreamEvent};
use crate::tools::ToolExecutor;

pub use accumulator::{AccumulatorError, ToolCallAccumulator, MAX_ARGUMENT_BYTES};

pub const DEFAULT_MAX_ITERATIONS: usize = 10;

/// Terminal frame written once at the end of every streaming run.
pub const DONE_FRAME: &[u8] = b"data: [DONE]\n\n";

// ---------------------------------------------------------------------------
// Configuration and results
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AgentConfig {
    pub max_iterations: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_iterations: DEFAULT_MAX_ITERATIONS,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error(transparent)]
    Provider(ProviderError),

    #[error("Failed to start streaming: {0}")]
    StreamOpen(ProviderError),

    #[error(transparent)]
    Stream(#[from] StreamError),

    #[error("upstream error: {0}")]
    Upstream(String),

    #[error(transparent)]
    Accumulator(#[from] AccumulatorError),

    #[error("request cancelled")]
    Cancelled,
}

impl From<ProviderError> for AgentError {
    fn from(e: ProviderError) -> Self {
        match e {
            ProviderError::Cancelled => AgentError::Cancelled,
            other => AgentError::Provider(other),
        }
    }
}

/// Outcome of a synchronous run.
#[derive(Debug)]
pub struct AgentRun {
    pub response: ChatCompletionResponse,
    /// Model calls made after the initial response.
    pub round_trips: usize,
    /// The ceiling stopped the loop while tool calls were still pending.
    pub exhausted: bool,
}

/// Outcome of a streaming run.
#[derive(Debug, PartialEq)]
pub struct StreamRun {
    /// Content of the final turn, as relayed.
    pub content: String,
    /// Streaming calls opened.
    pub round_trips: usize,
    pub exhausted: bool,
}

// ---------------------------------------------------------------------------
// Agent
// ---------------------------------------------------------------------------

pub struct Agent {
    provider: Arc<dyn Provider>,
    tools: Arc<ToolExecutor>,
    config: AgentConfig,
}

impl Agent {
    pub fn new(provider: Arc<dyn Provider>, tools: Arc<ToolExecutor>, config: AgentConfig) -> Self {
        Self {
            provider,
            tools,
            config,
        }
    }

    /// Run the tool loop starting from `first`, the model's response to
    /// `request`. Returns `first` unchanged when it requests no tools.
    pub async fn run(
        &self,
        request: &ChatCompletionRequest,
        first: ChatCompletionResponse,
        cancel: &CancellationToken,
    ) -> Result<AgentRun, AgentError> {
        let mut turn = request.clone();
        turn.stream = false;
        let mut response = first;
        let mut round_trips = 0;

        loop {
            let calls = response.tool_calls().to_vec();
            if calls.is_empty() {
                return Ok(AgentRun {
                    response,
                    round_trips,
                    exhausted: false,
                });
            }
            if round_trips >= self.config.max_iterations {
                tracing::warn!(
                    provider = %self.provider.id(),
                    max_iterations = self.config.max_iterations,
                    pending_tool_calls = calls.len(),
                    "agent loop reached maximum iterations"
                );
                return Ok(AgentRun {
                    response,
                    round_trips,
                    exhausted: true,
                });
            }

            let text = response.message().map(Message::text).unwrap_or("").to_string();
            let results = self.dispatch(&calls, cancel).await?;
            turn.messages.push(Message::assistant(text, calls));
            turn.messages.extend(results);

            response = self.provider.generate_tokens(&turn, cancel).await?;
            round_trips += 1;
            tracing::debug!(iteration = round_trips, messages = turn.messages.len(), "agent iteration complete");
        }
    }

    /// Run the streaming tool loop, writing SSE frames to `sink`.
    ///
    /// Exactly one `[DONE]` frame is written on every exit path. A failure
    /// is relayed as an error frame before it; cancellation and a closed
    /// sink are not.
    pub async fn run_stream(
        &self,
        request: &ChatCompletionRequest,
        sink: mpsc::Sender<Bytes>,
        cancel: &CancellationToken,
    ) -> Result<StreamRun, AgentError> {
        let result = self.relay(request, &sink, cancel).await;

        match &result {
            Ok(_) | Err(AgentError::Cancelled) => {}
            Err(e) => {
                tracing::error!(provider = %self.provider.id(), error = %e, "streaming agent failed");
                let _ = sink.send(error_frame(&e.to_string())).await;
            }
        }
        let _ = sink.send(Bytes::from_static(DONE_FRAME)).await;
        result
    }

    async fn relay(
        &self,
        request: &ChatCompletionRequest,
        sink: &mpsc::Sender<Bytes>,
        cancel: &CancellationToken,
    ) -> Result<StreamRun, AgentError> {
        let mut turn = request.clone();
        turn.stream = true;
        let mut round_trips = 0;

        loop {
            let mut events = self
                .provider
                .stream_generate_tokens(&turn, cancel)
                .await
                .map_err(|e| match e {
                    ProviderError::Cancelled => AgentError::Cancelled,
                    other => AgentError::StreamOpen(other),
                })?;
            round_trips += 1;
            tracing::debug!(iteration = round_trips, "streaming iteration opened");

            let mut iteration = Iteration::new();
            while iteration.is_open() {
                let next = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(AgentError::Cancelled),
                    next = events.next() => next,
                };
                match next {
                    None => break,
                    Some(Err(e)) => return Err(e.into()),
                    Some(Ok(event)) => {
                        if let Some(frame) = iteration.on_event(event) {
                            sink.send(frame).await.map_err(|_| AgentError::Cancelled)?;
                        }
                    }
                }
            }

            let (content, calls) = iteration.finish()?;
            if calls.is_empty() {
                return Ok(StreamRun {
                    content,
                    round_trips,
                    exhausted: false,
                });
            }
            if round_trips >= self.config.max_iterations {
                tracing::warn!(
                    provider = %self.provider.id(),
                    max_iterations = self.config.max_iterations,
                    pending_tool_calls = calls.len(),
                    "agent streaming loop reached maximum iterations"
                );
                return Ok(StreamRun {
                    content,
                    round_trips,
                    exhausted: true,
                });
            }

            tracing::debug!(iteration = round_trips, tool_calls = calls.len(), "executing streamed tool calls");
            let results = self.dispatch(&calls, cancel).await?;
            turn.messages.push(Message::assistant(content, calls));
            turn.messages.extend(results);
        }
    }

    /// Execute a batch, abandoning it if the caller cancels.
    async fn dispatch(
        &self,
        calls: &[ToolCall],
        cancel: &CancellationToken,
    ) -> Result<Vec<Message>, AgentError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(AgentError::Cancelled),
            results = self.tools.execute(calls) => Ok(results),
        }
    }
}

// ---------------------------------------------------------------------------
// Streamed turn
// ---------------------------------------------------------------------------

#[derive(Debug)]
enum TurnState {
    Idle,
    Iterating,
    Completed,
    Aborted(AgentError),
}

/// Consumes the events of one streamed turn, one dispatch per event.
struct Iteration {
    state: TurnState,
    content: String,
    calls: ToolCallAccumulator,
}

impl Iteration {
    fn new() -> Self {
        Self {
            state: TurnState::Idle,
            content: String::new(),
            calls: ToolCallAccumulator::new(),
        }
    }

    fn is_open(&self) -> bool {
        matches!(self.state, TurnState::Idle | TurnState::Iterating)
    }

    /// Fold one event and return the frame to relay for it, if any.
    fn on_event(&mut self, event: StreamEvent) -> Option<Bytes> {
        self.state = TurnState::Iterating;

        match event.kind {
            EventKind::Error => {
                let message = event.error.unwrap_or(event.raw);
                self.state = TurnState::Aborted(AgentError::Upstream(message));
                return None;
            }
            EventKind::StreamEnd => self.state = TurnState::Completed,
            _ => {}
        }

        let chunk = event.chunk?;
        if let Some(delta) = chunk.delta() {
            if let Some(text) = &delta.content {
                self.content.push_str(text);
            }
            for fragment in &delta.tool_calls {
                if let Err(e) = self.calls.fold(fragment) {
                    self.state = TurnState::Aborted(e.into());
                    return None;
                }
            }
        }
        if matches!(
            chunk.finish_reason(),
            Some(FinishReason::Stop | FinishReason::ToolCalls)
        ) {
            self.state = TurnState::Completed;
        }

        chunk_frame(&chunk)
    }

    fn finish(self) -> Result<(String, Vec<ToolCall>), AgentError> {
        match self.state {
            TurnState::Aborted(e) => Err(e),
            _ => Ok((self.content, self.calls.finalize())),
        }
    }
}

fn chunk_frame(chunk: &ChatCompletionStreamResponse) -> Option<Bytes> {
    match serde_json::to_string(chunk) {
        Ok(json) => Some(Bytes::from(format!("data: {json}\n\n"))),
        Err(e) => {
            tracing::debug!(error = %e, "failed to encode stream chunk");
            None
        }
    }
}

/// `data: {"error": "<message>"}` with the message JSON-escaped.
pub fn error_frame(message: &str) -> Bytes {
    let escaped = serde_json::Value::String(message.to_string());
    Bytes::from(format!("data: {{\"error\": {escaped}}}\n\n"))
}
