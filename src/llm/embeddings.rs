use anyhow::Result;
use serde::{Deserialize, Serialize};

use super::provider::{post_json, Endpoint, Provider};
use crate::config::LlmConfig;

/// Longest text, in bytes, sent for one embedding. Small sentence-embedding
/// models have short contexts.
const MAX_EMBED_BYTES: usize = 3_000;

/// Longest prefix of `text` within `max` bytes that ends on a char boundary.
fn clip(text: &str, max: usize) -> &str {
    if text.len() <= max {
        return text;
    }
    let end = (0..=max).rev().find(|&i| text.is_char_boundary(i)).unwrap_or(0);
    &text[..end]
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [&'a str],
    /// Ollama only: let the server cut inputs that still overflow.
    #[serde(skip_serializing_if = "Option::is_none")]
    truncate: Option<bool>,
}

/// Either provider's reply shape.
#[derive(Deserialize)]
#[serde(untagged)]
enum EmbedReply {
    Ollama { embeddings: Vec<Vec<f32>> },
    OpenAi { data: Vec<EmbeddingItem> },
}

#[derive(Deserialize)]
struct EmbeddingItem {
    embedding: Vec<f32>,
}

impl EmbedReply {
    fn into_vectors(self) -> Vec<Vec<f32>> {
        match self {
            Self::Ollama { embeddings } => embeddings,
            Self::OpenAi { data } => data.into_iter().map(|d| d.embedding).collect(),
        }
    }
}

/// Embed `texts` with the configured embedding model, in provider-sized
/// batches. The result is parallel to `texts`.
pub async fn embed_batch(
    client: &reqwest::Client,
    config: &LlmConfig,
    texts: &[String],
) -> Result<Vec<Vec<f32>>> {
    let provider = Provider::from_config(config)?;
    if texts.is_empty() {
        return Ok(Vec::new());
    }

    let clipped: Vec<&str> = texts.iter().map(|t| clip(t, MAX_EMBED_BYTES)).collect();
    let mut vectors = Vec::with_capacity(texts.len());
    for batch in clipped.chunks(provider.embed_batch_size()) {
        let request = EmbedRequest {
            model: &config.embedding_model,
            input: batch,
            truncate: (provider == Provider::Ollama).then_some(true),
        };
        let reply: EmbedReply =
            post_json(client, config, provider, Endpoint::Embed, &request).await?;
        vectors.extend(reply.into_vectors());
    }

    anyhow::ensure!(
        vectors.len() == texts.len(),
        "{provider} returned {} vectors for {} inputs",
        vectors.len(),
        texts.len()
    );
    Ok(vectors)
}
