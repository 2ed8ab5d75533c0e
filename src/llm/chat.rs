use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use super::provider::{post_json, Endpoint, Provider};
use crate::config::LlmConfig;
use crate::models::ChatMessage;

/// Low temperature keeps code answers close to the supplied context.
const TEMPERATURE: f32 = 0.2;

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    /// Ollama streams unless told otherwise.
    #[serde(skip_serializing_if = "Option::is_none")]
    stream: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

impl<'a> CompletionRequest<'a> {
    fn for_provider(provider: Provider, model: &'a str, messages: &'a [ChatMessage]) -> Self {
        let (stream, temperature) = match provider {
            Provider::Ollama => (Some(false), None),
            Provider::OpenAi => (None, Some(TEMPERATURE)),
        };
        Self {
            model,
            messages,
            stream,
            temperature,
        }
    }
}

/// Either provider's reply shape.
#[derive(Deserialize)]
#[serde(untagged)]
enum CompletionReply {
    Ollama { message: ChatMessage },
    OpenAi { choices: Vec<Choice> },
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

impl CompletionReply {
    fn into_text(self) -> Result<String> {
        match self {
            Self::Ollama { message } => Ok(message.content),
            Self::OpenAi { choices } => choices
                .into_iter()
                .next()
                .and_then(|c| c.message.content)
                .context("Completion returned no content"),
        }
    }
}

/// Run one non-streaming chat completion and return the assistant's text.
pub async fn chat_completion(
    client: &reqwest::Client,
    config: &LlmConfig,
    model: &str,
    messages: Vec<ChatMessage>,
) -> Result<String> {
    let provider = Provider::from_config(config)?;
    let request = CompletionRequest::for_provider(provider, model, &messages);
    let reply: CompletionReply =
        post_json(client, config, provider, Endpoint::Chat, &request).await?;
    reply.into_text()
}
