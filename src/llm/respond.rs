//! Response generation: one chat completion over (context, history, query).

use anyhow::{Context, Result};

use super::{sanitize_for_prompt, ChatModel, ModelRole};
use crate::models::ChatMessage;

const USER_PREFIX: &str = "User: ";
const ASSISTANT_PREFIX: &str = "Assistant: ";

/// How the user's query is phrased in the final turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryFrame {
    /// The query verbatim.
    Plain,
    /// Wrapped as a development task asking for production-ready changes.
    DevelopmentTask,
}

impl QueryFrame {
    fn apply(self, query: &str) -> String {
        match self {
            QueryFrame::Plain => query.to_string(),
            QueryFrame::DevelopmentTask => format!(
                "Development Task: {query}\n\nProvide a detailed solution with production-ready code changes."
            ),
        }
    }
}

/// Everything a context store hands to the generator for one query.
#[derive(Debug, Clone)]
pub struct AnswerContext {
    pub model: ModelRole,
    /// System instruction with the retrieved context already embedded.
    pub system: String,
    pub frame: QueryFrame,
    /// Paths chosen by relevance selection, echoed back to the caller.
    pub selected_files: Option<Vec<String>>,
}

/// Rebuild alternating turns from a `User: ` / `Assistant: ` transcript.
/// Lines with neither prefix are dropped.
pub fn parse_conversation_history(transcript: &str) -> Vec<ChatMessage> {
    transcript
        .split('\n')
        .filter_map(|line| {
            if let Some(rest) = line.strip_prefix(USER_PREFIX) {
                Some(ChatMessage::user(sanitize_for_prompt(rest)))
            } else {
                line.strip_prefix(ASSISTANT_PREFIX)
                    .map(|rest| ChatMessage::assistant(sanitize_for_prompt(rest)))
            }
        })
        .collect()
}

/// System turn, the last `max_history_turns` history turns, then the query.
pub fn build_messages(
    context: &AnswerContext,
    query: &str,
    conversation_history: &str,
    max_history_turns: usize,
) -> Vec<ChatMessage> {
    let history = parse_conversation_history(conversation_history);
    let skip = history.len().saturating_sub(max_history_turns);

    let mut messages = Vec::with_capacity(history.len() - skip + 2);
    messages.push(ChatMessage::system(sanitize_for_prompt(&context.system)));
    messages.extend(history.into_iter().skip(skip));
    messages.push(ChatMessage::user(
        context.frame.apply(&sanitize_for_prompt(query)),
    ));
    messages
}

/// Ask the chat model for a single answer. Failures are not retried.
pub async fn generate(
    chat: &dyn ChatModel,
    context: &AnswerContext,
    query: &str,
    conversation_history: &str,
    max_history_turns: usize,
) -> Result<String> {
    let messages = build_messages(context, query, conversation_history, max_history_turns);
    let answer = chat
        .complete(context.model, messages)
        .await
        .context("Failed to generate response")?;
    tracing::info!("Generated response ({} chars)", answer.len());
    Ok(answer)
}
