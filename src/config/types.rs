// Copyright 2026 The Gantry Authors
// SPDX-License-Identifier: Apache-2.0

use std::collections::BTreeMap;

use crate::agent::AgentConfig;
use crate::provider::{ProviderId, ProviderSettings};
use crate::transport::TransportConfig;

/// Parsed and validated gantry config.
#[derive(Debug, Clone)]
pub struct Config {
    /// Schema version. Always "v1".
    pub version: String,
    /// Environment label (e.g. "development", "production").
    pub environment: String,
    /// Settings for every configured backend. Only these are served.
    pub providers: BTreeMap<ProviderId, ProviderSettings>,
    /// Shared upstream connection pool.
    pub client: TransportConfig,
    pub agent: AgentConfig,
    pub tools: ToolsConfig,
    /// SHA-256 of the raw YAML: "sha256:{hex}".
    pub config_hash: String,
}

/// Tool server endpoints.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolsConfig {
    /// Servers a tool call may be routed to.
    pub servers: Vec<String>,
    /// Target for calls that do not name a server.
    pub default_server: Option<String>,
    pub timeout_ms: u64,
    /// Serve the discovered tools on `GET /v1/mcp/tools`.
    pub expose: bool,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            servers: Vec::new(),
            default_server: None,
            timeout_ms: super::DEFAULT_TOOL_TIMEOUT_MS,
            expose: false,
        }
    }
}
