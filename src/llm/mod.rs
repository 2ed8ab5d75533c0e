//! Language-model seams: text embedding and chat completion.
//!
//! Stores and the response generator only see the [`Embedder`] and
//! [`ChatModel`] traits. [`HttpLlm`] implements both against Ollama or an
//! OpenAI-compatible endpoint; tests substitute in-process fakes.

pub mod chat;
pub mod embeddings;
pub mod provider;
pub mod respond;

use anyhow::Result;
use async_trait::async_trait;
use std::time::Duration;

use crate::config::LlmConfig;
use crate::models::ChatMessage;

/// Which configured model a call should use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelRole {
    /// General-purpose chat model, used for file summaries and code explanation.
    General,
    /// Code-specialized model, used for relevance selection and code answers.
    Code,
}

/// Opaque text → vector function.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed every text; the output is parallel to `texts`.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// Opaque chat-completion service.
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn complete(&self, role: ModelRole, messages: Vec<ChatMessage>) -> Result<String>;
}

/// HTTP client for both seams, sharing one connection pool.
#[derive(Clone)]
pub struct HttpLlm {
    client: reqwest::Client,
    config: LlmConfig,
}

impl HttpLlm {
    pub fn new(config: LlmConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;
        Ok(Self { client, config })
    }

    fn model_for(&self, role: ModelRole) -> &str {
        match role {
            ModelRole::General => &self.config.chat_model,
            ModelRole::Code => &self.config.code_model,
        }
    }
}

#[async_trait]
impl Embedder for HttpLlm {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        embeddings::embed_batch(&self.client, &self.config, texts).await
    }
}

#[async_trait]
impl ChatModel for HttpLlm {
    async fn complete(&self, role: ModelRole, messages: Vec<ChatMessage>) -> Result<String> {
        let model = self.model_for(role).to_string();
        tracing::debug!("Chat completion with {model} ({} messages)", messages.len());
        chat::chat_completion(&self.client, &self.config, &model, messages).await
    }
}

/// Chat-template control tokens that must never reach the model from user or repo text.
const CONTROL_TOKENS: &[&str] = &[
    "<|im_start|>",
    "<|im_end|>",
    "<|endoftext|>",
    "<|system|>",
    "<|user|>",
    "<|assistant|>",
    "<|eot_id|>",
    "<|start_header_id|>",
    "<|end_header_id|>",
];

/// Strip chat-template control tokens from text headed into a prompt.
pub fn sanitize_for_prompt(text: &str) -> String {
    let mut out = text.to_string();
    for token in CONTROL_TOKENS {
        if out.contains(token) {
            out = out.replace(token, "");
        }
    }
    out
}
