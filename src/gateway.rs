// Copyright 2026 The Gantry Authors
// SPDX-License-Identifier: Apache-2.0

// Gateway wiring
//
// Owns everything shared across requests: one adapter per configured
// backend (all on the same connection pool) and the tool executor. Each
// inbound request gets its own Agent built from these, and its tool list
// extended with whatever the tool servers advertise.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::agent::{Agent, AgentConfig};
use crate::config::Config;
use crate::message::ChatCompletionRequest;
use crate::provider::{build_provider, Provider, ProviderError, ProviderId};
use crate::tools::jsonrpc::JsonRpcToolGateway;
use crate::tools::{ServerTool, ToolExecutor};
use crate::transport::{HttpError, HttpSender, ReqwestHttpSender};

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("failed to build HTTP client: {0}")]
    Client(#[from] HttpError),

    #[error(transparent)]
    Provider(#[from] ProviderError),
}

pub struct Gateway {
    providers: BTreeMap<ProviderId, Arc<dyn Provider>>,
    tools: Arc<ToolExecutor>,
    agent: AgentConfig,
    expose_tools: bool,
}

impl Gateway {
    pub fn new(
        providers: BTreeMap<ProviderId, Arc<dyn Provider>>,
        tools: Arc<ToolExecutor>,
        agent: AgentConfig,
    ) -> Self {
        Self {
            providers,
            tools,
            agent,
            expose_tools: false,
        }
    }

    /// Serve the tool catalog on the HTTP surface.
    pub fn with_tool_listing(mut self, expose: bool) -> Self {
        self.expose_tools = expose;
        self
    }

    /// Build every configured backend on one shared reqwest client.
    ///
    /// Fails on the first backend that cannot be constructed, e.g. a
    /// missing credential.
    pub fn from_config(config: &Config) -> Result<Self, GatewayError> {
        let http: Arc<dyn HttpSender> = Arc::new(ReqwestHttpSender::from_config(&config.client)?);
        Self::with_sender(config, http)
    }

    /// Same as [`Gateway::from_config`] with an injected transport.
    pub fn with_sender(config: &Config, http: Arc<dyn HttpSender>) -> Result<Self, GatewayError> {
        let mut providers = BTreeMap::new();
        for (id, settings) in &config.providers {
            let provider = build_provider(id.as_str(), settings.clone(), http.clone())?;
            tracing::debug!(provider = %id, "provider ready");
            providers.insert(*id, provider);
        }

        let gateway = JsonRpcToolGateway::new(
            http,
            config.tools.servers.clone(),
            config.tools.default_server.clone(),
            Some(config.tools.timeout_ms),
        );

        Ok(Self::new(
            providers,
            Arc::new(ToolExecutor::new(Arc::new(gateway))),
            config.agent,
        )
        .with_tool_listing(config.tools.expose))
    }

    pub fn provider(&self, id: ProviderId) -> Option<Arc<dyn Provider>> {
        self.providers.get(&id).cloned()
    }

    /// Configured backends in identifier order.
    pub fn providers(&self) -> impl Iterator<Item = &Arc<dyn Provider>> {
        self.providers.values()
    }

    pub fn tool_listing_exposed(&self) -> bool {
        self.expose_tools
    }

    /// Tools the configured servers advertise.
    pub async fn tool_catalog(&self) -> Vec<ServerTool> {
        self.tools.catalog().await
    }

    /// Offer the advertised tools to the model on this request.
    pub async fn attach_tools(&self, request: &mut ChatCompletionRequest) -> usize {
        self.tools.attach(request).await
    }

    pub fn agent(&self, provider: Arc<dyn Provider>) -> Agent {
        Agent::new(provider, self.tools.clone(), self.agent)
    }
}
