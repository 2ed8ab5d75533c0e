//! Provider routing and the JSON round trip shared by chat and embeddings.

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;

use crate::config::LlmConfig;

/// Which wire dialect the configured endpoint speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    Ollama,
    OpenAi,
}

/// The two calls this service makes against a provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    Chat,
    Embed,
}

impl Provider {
    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        match config.provider.as_str() {
            "ollama" => Ok(Self::Ollama),
            "openai" => Ok(Self::OpenAi),
            other => anyhow::bail!("Unknown LLM provider: {other}"),
        }
    }

    pub fn path(self, endpoint: Endpoint) -> &'static str {
        match (self, endpoint) {
            (Self::Ollama, Endpoint::Chat) => "/api/chat",
            (Self::Ollama, Endpoint::Embed) => "/api/embed",
            (Self::OpenAi, Endpoint::Chat) => "/v1/chat/completions",
            (Self::OpenAi, Endpoint::Embed) => "/v1/embeddings",
        }
    }

    /// Texts per embedding request.
    pub fn embed_batch_size(self) -> usize {
        match self {
            Self::Ollama => 32,
            Self::OpenAi => 64,
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ollama => f.write_str("Ollama"),
            Self::OpenAi => f.write_str("OpenAI"),
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Chat => f.write_str("chat"),
            Self::Embed => f.write_str("embed"),
        }
    }
}

/// POST `body` to the provider's `endpoint` and decode the reply.
///
/// A non-2xx status becomes an error carrying the response text. The bearer
/// header is only sent to OpenAI-compatible endpoints that have a key.
pub async fn post_json<B, R>(
    client: &reqwest::Client,
    config: &LlmConfig,
    provider: Provider,
    endpoint: Endpoint,
    body: &B,
) -> Result<R>
where
    B: Serialize + ?Sized,
    R: DeserializeOwned,
{
    let url = format!(
        "{}{}",
        config.base_url.trim_end_matches('/'),
        provider.path(endpoint)
    );
    let mut request = client.post(&url).json(body);
    if let (Provider::OpenAi, Some(key)) = (provider, config.api_key.as_deref()) {
        request = request.bearer_auth(key);
    }

    let resp = request
        .send()
        .await
        .with_context(|| format!("Failed to call {provider} {endpoint} API"))?;
    let status = resp.status();
    if !status.is_success() {
        let text = resp.text().await.unwrap_or_default();
        anyhow::bail!("{provider} {endpoint} API returned {status}: {text}");
    }

    resp.json()
        .await
        .with_context(|| format!("Failed to parse {provider} {endpoint} response"))
}
