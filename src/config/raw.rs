// Copyright 2026 The Gantry Authors
// SPDX-License-Identifier: Apache-2.0

// Raw YAML deserialization types (internal)
// Kept apart from the public Config structs: strings still hold `${VAR}`
// references and nothing has been validated yet.

use serde::Deserialize;
use std::collections::BTreeMap;

#[derive(Debug, Deserialize)]
pub struct RawConfig {
    pub gantry: String,
    pub environment: Option<String>,
    /// Keyed by provider identifier. `ollama:` with no body is allowed.
    #[serde(default)]
    pub providers: BTreeMap<String, Option<RawProvider>>,
    pub client: Option<RawClient>,
    pub agent: Option<RawAgent>,
    pub tools: Option<RawTools>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RawProvider {
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub timeout_ms: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct RawClient {
    pub timeout_ms: Option<u64>,
    pub connect_timeout_ms: Option<u64>,
    pub max_idle_per_host: Option<usize>,
    pub idle_timeout_ms: Option<u64>,
    pub keep_alive_ms: Option<u64>,
    pub tls_min_version: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RawAgent {
    pub max_iterations: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct RawTools {
    #[serde(default)]
    pub servers: Vec<String>,
    pub default_server: Option<String>,
    pub timeout_ms: Option<u64>,
    pub expose: Option<bool>,
}
