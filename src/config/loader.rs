// Copyright 2026 The Gantry Authors
// SPDX-License-Identifier: Apache-2.0

use std::collections::BTreeMap;
use std::time::Duration;

use sha2::{Digest, Sha256};

use crate::agent::AgentConfig;
use crate::provider::{ProviderId, ProviderSettings};
use crate::transport::{TlsVersion, TransportConfig};

use super::error::ConfigError;
use super::interpolation::resolve_variables;
use super::raw;
use super::source::ConfigSource;
use super::types::*;

/// Load and validate a gantry config from the given source.
///
/// Steps:
/// 1. Read raw YAML from source
/// 2. Compute SHA-256 config hash
/// 3. Parse YAML into raw deserialization types
/// 4. Validate version, provider identifiers and limits
/// 5. Resolve `${VAR}` references in string fields
/// 6. Build typed Config struct
pub fn load_config(source: &dyn ConfigSource) -> Result<Config, ConfigError> {
    let raw_yaml = source.load()?;
    let config_hash = compute_hash(&raw_yaml);

    let raw: raw::RawConfig = serde_yaml::from_str(&raw_yaml)?;

    if raw.gantry != "v1" {
        return Err(ConfigError::Validation(format!(
            "unsupported config version \"{}\", expected \"v1\"",
            raw.gantry
        )));
    }

    let client = build_client_config(raw.client)?;
    let providers = build_providers(raw.providers, &client)?;
    let agent = build_agent_config(raw.agent)?;
    let tools = build_tools_config(raw.tools)?;

    Ok(Config {
        version: raw.gantry,
        environment: raw.environment.unwrap_or_default(),
        providers,
        client,
        agent,
        tools,
        config_hash,
    })
}

pub fn compute_hash(raw_yaml: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(raw_yaml.as_bytes());
    format!("sha256:{:x}", hasher.finalize())
}

fn resolve(value: Option<String>) -> Result<Option<String>, ConfigError> {
    value.map(|v| resolve_variables(&v)).transpose()
}

fn validate_url(field: &str, url: &str) -> Result<(), ConfigError> {
    let parsed = reqwest::Url::parse(url)
        .map_err(|e| ConfigError::Validation(format!("{field}: invalid URL \"{url}\": {e}")))?;
    match parsed.scheme() {
        "http" | "https" => Ok(()),
        other => Err(ConfigError::Validation(format!(
            "{field}: unsupported URL scheme \"{other}\", expected http or https"
        ))),
    }
}

fn millis(field: &str, value: Option<u64>, default: Duration) -> Result<Duration, ConfigError> {
    match value {
        None => Ok(default),
        Some(0) => Err(ConfigError::Validation(format!("{field} must be greater than 0"))),
        Some(ms) => Ok(Duration::from_millis(ms)),
    }
}

fn parse_tls_version(s: &str) -> Result<TlsVersion, ConfigError> {
    match s {
        "1.2" => Ok(TlsVersion::Tls12),
        "1.3" => Ok(TlsVersion::Tls13),
        other => Err(ConfigError::Validation(format!(
            "client.tls_min_version: unsupported value \"{other}\", expected \"1.2\" or \"1.3\""
        ))),
    }
}

fn build_client_config(raw: Option<raw::RawClient>) -> Result<TransportConfig, ConfigError> {
    let defaults = TransportConfig::default();
    let Some(raw) = raw else {
        return Ok(defaults);
    };

    let max_idle_per_host = match raw.max_idle_per_host {
        Some(0) => {
            return Err(ConfigError::Validation(
                "client.max_idle_per_host must be greater than 0".into(),
            ))
        }
        Some(n) => n,
        None => defaults.max_idle_per_host,
    };

    Ok(TransportConfig {
        timeout: millis("client.timeout_ms", raw.timeout_ms, defaults.timeout)?,
        connect_timeout: millis(
            "client.connect_timeout_ms",
            raw.connect_timeout_ms,
            defaults.connect_timeout,
        )?,
        max_idle_per_host,
        idle_timeout: millis("client.idle_timeout_ms", raw.idle_timeout_ms, defaults.idle_timeout)?,
        keep_alive: millis("client.keep_alive_ms", raw.keep_alive_ms, defaults.keep_alive)?,
        tls_min_version: match raw.tls_min_version.as_deref() {
            Some(v) => parse_tls_version(v)?,
            None => defaults.tls_min_version,
        },
    })
}

fn build_providers(
    raw: BTreeMap<String, Option<raw::RawProvider>>,
    client: &TransportConfig,
) -> Result<BTreeMap<ProviderId, ProviderSettings>, ConfigError> {
    let mut providers = BTreeMap::new();

    for (key, entry) in raw {
        let id: ProviderId = key.parse().map_err(|_| {
            let known: Vec<&str> = ProviderId::ALL.iter().map(|p| p.as_str()).collect();
            ConfigError::Validation(format!(
                "providers: unknown provider \"{key}\", expected one of: {}",
                known.join(", ")
            ))
        })?;
        let entry = entry.unwrap_or_default();

        let base_url = resolve(entry.base_url)?;
        if let Some(url) = &base_url {
            validate_url(&format!("providers.{key}.base_url"), url)?;
        }
        let timeout = millis(
            &format!("providers.{key}.timeout_ms"),
            entry.timeout_ms,
            client.timeout,
        )?;

        providers.insert(
            id,
            ProviderSettings {
                api_key: resolve(entry.api_key)?,
                base_url,
                timeout_ms: Some(timeout.as_millis() as u64),
            },
        );
    }

    Ok(providers)
}

fn build_agent_config(raw: Option<raw::RawAgent>) -> Result<AgentConfig, ConfigError> {
    match raw.and_then(|a| a.max_iterations) {
        None => Ok(AgentConfig::default()),
        Some(0) => Err(ConfigError::Validation(
            "agent.max_iterations must be at least 1".into(),
        )),
        Some(n) => Ok(AgentConfig { max_iterations: n }),
    }
}

fn build_tools_config(raw: Option<raw::RawTools>) -> Result<ToolsConfig, ConfigError> {
    let Some(raw) = raw else {
        return Ok(ToolsConfig::default());
    };

    let mut servers = Vec::with_capacity(raw.servers.len());
    for (i, server) in raw.servers.into_iter().enumerate() {
        let server = resolve_variables(&server)?;
        validate_url(&format!("tools.servers[{i}]"), &server)?;
        servers.push(server);
    }

    let default_server = resolve(raw.default_server)?.filter(|s| !s.is_empty());
    if let Some(url) = &default_server {
        validate_url("tools.default_server", url)?;
    }

    let timeout = millis(
        "tools.timeout_ms",
        raw.timeout_ms,
        Duration::from_millis(super::DEFAULT_TOOL_TIMEOUT_MS),
    )?;

    Ok(ToolsConfig {
        servers,
        default_server,
        timeout_ms: timeout.as_millis() as u64,
        expose: raw.expose.unwrap_or(false),
    })
}
