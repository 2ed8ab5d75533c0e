use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;

use super::{json_body, required};
use crate::error::AppError;
use crate::ingest;
use crate::models::{ChatRequest, ChatResponse};
use crate::state::AppState;

/// POST /chat - Answer a question about the session's repository
pub async fn chat(
    State(state): State<AppState>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<ChatResponse>, AppError> {
    let req = json_body(payload)?;
    let (Some(query), Some(chat_id)) = (required(req.query), required(req.chat_id)) else {
        return Err(AppError::validation("query and chat_id are required"));
    };
    let history = req.conversation_history.unwrap_or_default();

    let response = ingest::answer_chat(&state, &chat_id, &query, &history).await?;
    Ok(Json(response))
}
