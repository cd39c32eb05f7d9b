// Copyright 2026 The Gantry Authors
// SPDX-License-Identifier: Apache-2.0

// Provider registry
//
// Static, read-only catalogue of every backend the gateway can talk to:
// identity, base URL, auth scheme, endpoint paths and the wire codec
// used to transcode requests and responses.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::ProviderError;

/// Backend identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderId {
    Anthropic,
    Cloudflare,
    Cohere,
    Deepseek,
    Google,
    Groq,
    Mistral,
    Moonshot,
    Ollama,
    OllamaCloud,
    Openai,
}

impl ProviderId {
    pub const ALL: [ProviderId; 11] = [
        ProviderId::Anthropic,
        ProviderId::Cloudflare,
        ProviderId::Cohere,
        ProviderId::Deepseek,
        ProviderId::Google,
        ProviderId::Groq,
        ProviderId::Mistral,
        ProviderId::Moonshot,
        ProviderId::Ollama,
        ProviderId::OllamaCloud,
        ProviderId::Openai,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderId::Anthropic => "anthropic",
            ProviderId::Cloudflare => "cloudflare",
            ProviderId::Cohere => "cohere",
            ProviderId::Deepseek => "deepseek",
            ProviderId::Google => "google",
            ProviderId::Groq => "groq",
            ProviderId::Mistral => "mistral",
            ProviderId::Moonshot => "moonshot",
            ProviderId::Ollama => "ollama",
            ProviderId::OllamaCloud => "ollama_cloud",
            ProviderId::Openai => "openai",
        }
    }

    /// The registry entry for this backend.
    pub fn spec(&self) -> &'static ProviderSpec {
        // REGISTRY is declared in enum order.
        &REGISTRY[*self as usize]
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderId {
    type Err = ProviderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ProviderId::ALL
            .into_iter()
            .find(|id| id.as_str() == s)
            .ok_or_else(|| ProviderError::UnknownProvider(s.to_string()))
    }
}

/// How the credential is attached to outbound requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthScheme {
    /// `Authorization: Bearer <token>`
    Bearer,
    /// Token sent verbatim in the named header.
    Header(&'static str),
    /// Token appended as the named query parameter.
    Query(&'static str),
    /// No credential required.
    None,
}

/// Wire protocol spoken by the backend's chat endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodecKind {
    /// OpenAI chat-completions schema (also used by most "compatible" APIs).
    OpenAiCompatible,
    /// Anthropic messages API.
    Anthropic,
    /// Ollama native chat API with NDJSON streaming.
    Ollama,
}

/// Shape of the backend's model-list response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelListShape {
    /// `{"data": [{"id": ...}]}`
    Data,
    /// `{"models": [{"name": ...}]}`
    Models,
    /// `{"result": [{"name": ...}]}`
    Result,
}

#[derive(Debug, Clone, Copy)]
pub struct Endpoints {
    pub models: &'static str,
    pub chat: &'static str,
}

#[derive(Debug)]
pub struct ProviderSpec {
    pub id: ProviderId,
    pub display_name: &'static str,
    pub base_url: &'static str,
    pub auth: AuthScheme,
    pub endpoints: Endpoints,
    pub extra_headers: &'static [(&'static str, &'static str)],
    pub codec: CodecKind,
    pub model_list: ModelListShape,
    /// Whether streaming requests may carry `stream_options.include_usage`.
    pub stream_usage: bool,
}

const OPENAI_ENDPOINTS: Endpoints = Endpoints {
    models: "/models",
    chat: "/chat/completions",
};

/// The static catalogue.
pub static REGISTRY: &[ProviderSpec] = &[
    ProviderSpec {
        id: ProviderId::Anthropic,
        display_name: "Anthropic",
        base_url: "https://api.anthropic.com/v1",
        auth: AuthScheme::Header("x-api-key"),
        endpoints: Endpoints {
            models: "/models",
            chat: "/messages",
        },
        extra_headers: &[("anthropic-version", "2023-06-01")],
        codec: CodecKind::Anthropic,
        model_list: ModelListShape::Data,
        stream_usage: false,
    },
    ProviderSpec {
        id: ProviderId::Cloudflare,
        display_name: "Cloudflare",
        base_url: "https://api.cloudflare.com/client/v4/accounts/{ACCOUNT_ID}/ai",
        auth: AuthScheme::Bearer,
        endpoints: Endpoints {
            models: "/finetunes/public?limit=1000",
            chat: "/v1/chat/completions",
        },
        extra_headers: &[],
        codec: CodecKind::OpenAiCompatible,
        model_list: ModelListShape::Result,
        stream_usage: true,
    },
    ProviderSpec {
        id: ProviderId::Cohere,
        display_name: "Cohere",
        base_url: "https://api.cohere.ai",
        auth: AuthScheme::Bearer,
        endpoints: Endpoints {
            models: "/v1/models",
            chat: "/compatibility/v1/chat/completions",
        },
        extra_headers: &[],
        codec: CodecKind::OpenAiCompatible,
        model_list: ModelListShape::Models,
        stream_usage: false,
    },
    ProviderSpec {
        id: ProviderId::Deepseek,
        display_name: "Deepseek",
        base_url: "https://api.deepseek.com",
        auth: AuthScheme::Bearer,
        endpoints: OPENAI_ENDPOINTS,
        extra_headers: &[],
        codec: CodecKind::OpenAiCompatible,
        model_list: ModelListShape::Data,
        stream_usage: true,
    },
    ProviderSpec {
        id: ProviderId::Google,
        display_name: "Google",
        base_url: "https://generativelanguage.googleapis.com/v1beta/openai",
        auth: AuthScheme::Bearer,
        endpoints: OPENAI_ENDPOINTS,
        extra_headers: &[],
        codec: CodecKind::OpenAiCompatible,
        model_list: ModelListShape::Data,
        stream_usage: true,
    },
    ProviderSpec {
        id: ProviderId::Groq,
        display_name: "Groq",
        base_url: "https://api.groq.com/openai/v1",
        auth: AuthScheme::Bearer,
        endpoints: OPENAI_ENDPOINTS,
        extra_headers: &[],
        codec: CodecKind::OpenAiCompatible,
        model_list: ModelListShape::Data,
        stream_usage: true,
    },
    ProviderSpec {
        id: ProviderId::Mistral,
        display_name: "Mistral",
        base_url: "https://api.mistral.ai/v1",
        auth: AuthScheme::Bearer,
        endpoints: OPENAI_ENDPOINTS,
        extra_headers: &[],
        codec: CodecKind::OpenAiCompatible,
        model_list: ModelListShape::Data,
        stream_usage: false,
    },
    ProviderSpec {
        id: ProviderId::Moonshot,
        display_name: "Moonshot",
        base_url: "https://api.moonshot.ai/v1",
        auth: AuthScheme::Bearer,
        endpoints: OPENAI_ENDPOINTS,
        extra_headers: &[],
        codec: CodecKind::OpenAiCompatible,
        model_list: ModelListShape::Data,
        stream_usage: true,
    },
    ProviderSpec {
        id: ProviderId::Ollama,
        display_name: "Ollama",
        base_url: "http://ollama:8080",
        auth: AuthScheme::None,
        endpoints: Endpoints {
            models: "/api/tags",
            chat: "/api/chat",
        },
        extra_headers: &[],
        codec: CodecKind::Ollama,
        model_list: ModelListShape::Models,
        stream_usage: false,
    },
    ProviderSpec {
        id: ProviderId::OllamaCloud,
        display_name: "OllamaCloud",
        base_url: "https://ollama.com/v1",
        auth: AuthScheme::Bearer,
        endpoints: OPENAI_ENDPOINTS,
        extra_headers: &[],
        codec: CodecKind::OpenAiCompatible,
        model_list: ModelListShape::Data,
        stream_usage: false,
    },
    ProviderSpec {
        id: ProviderId::Openai,
        display_name: "Openai",
        base_url: "https://api.openai.com/v1",
        auth: AuthScheme::Bearer,
        endpoints: OPENAI_ENDPOINTS,
        extra_headers: &[],
        codec: CodecKind::OpenAiCompatible,
        model_list: ModelListShape::Data,
        stream_usage: true,
    },
];

/// Look up a backend by its string identifier.
pub fn lookup(identifier: &str) -> Result<&'static ProviderSpec, ProviderError> {
    Ok(identifier.parse::<ProviderId>()?.spec())
}
