use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;

use super::{json_body, required};
use crate::error::AppError;
use crate::ingest;
use crate::models::{FilesRequest, FilesResponse, LoadRepoRequest, StatusResponse};
use crate::state::AppState;

/// POST /load-repo - Clone and ingest a repository into a chat session
pub async fn load_repo(
    State(state): State<AppState>,
    payload: Result<Json<LoadRepoRequest>, JsonRejection>,
) -> Result<Json<StatusResponse>, AppError> {
    let req = json_body(payload)?;
    let (Some(repo_url), Some(chat_id)) = (required(req.repo_url), required(req.chat_id)) else {
        return Err(AppError::validation("repo_url and chat_id are required"));
    };

    ingest::load_repository(&state, &chat_id, &repo_url).await?;
    Ok(Json(StatusResponse {
        status: "success".to_string(),
    }))
}

/// POST /files - List the files of a chat session's repository
pub async fn files(
    State(state): State<AppState>,
    payload: Result<Json<FilesRequest>, JsonRejection>,
) -> Result<Json<FilesResponse>, AppError> {
    let req = json_body(payload)
        .ok()
        .ok_or_else(|| AppError::validation("chat_id is required"))?;
    let chat_id = required(req.chat_id).ok_or_else(|| AppError::validation("chat_id is required"))?;

    Ok(Json(FilesResponse {
        files: ingest::list_files(&state, &chat_id),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::test_support::extract;
    use crate::config::{Config, StoreKind};
    use crate::llm::fake::{BagOfWordsEmbedder, ScriptedChat};
    use std::sync::Arc;

    fn state() -> AppState {
        let config = Config {
            store: StoreKind::Flat,
            ..Config::default()
        };
        AppState::with_models(
            config,
            Arc::new(BagOfWordsEmbedder::new()),
            Arc::new(ScriptedChat::new(Vec::new())),
        )
    }

    fn message(err: &AppError) -> String {
        err.public_message()
    }

    #[tokio::test]
    async fn test_load_repo_without_json_body() {
        let payload = extract::<LoadRepoRequest>(None, "repo_url=x").await;
        let err = load_repo(State(state()), payload).await.unwrap_err();
        assert_eq!(err.status(), axum::http::StatusCode::BAD_REQUEST);
        assert_eq!(message(&err), "No JSON data provided");
    }

    #[tokio::test]
    async fn test_load_repo_with_malformed_json() {
        let payload = extract::<LoadRepoRequest>(Some("application/json"), "{not json").await;
        let err = load_repo(State(state()), payload).await.unwrap_err();
        assert_eq!(message(&err), "No JSON data provided");
    }

    #[tokio::test]
    async fn test_load_repo_requires_both_fields() {
        for body in [
            r#"{"repo_url": "https://github.com/acme/widgets"}"#,
            r#"{"chat_id": "c1"}"#,
            r#"{"repo_url": "", "chat_id": "c1"}"#,
        ] {
            let payload = extract::<LoadRepoRequest>(Some("application/json"), body).await;
            let err = load_repo(State(state()), payload).await.unwrap_err();
            assert_eq!(message(&err), "repo_url and chat_id are required");
        }
    }

    #[tokio::test]
    async fn test_load_repo_malformed_url_creates_no_session() {
        let state = state();
        let payload = extract::<LoadRepoRequest>(
            Some("application/json"),
            r#"{"repo_url": "::not-a-url::", "chat_id": "c1"}"#,
        )
        .await;
        let err = load_repo(State(state.clone()), payload).await.unwrap_err();
        assert_eq!(err.status(), axum::http::StatusCode::BAD_REQUEST);
        assert!(state.sessions.get("c1").is_none());
    }

    #[tokio::test]
    async fn test_files_requires_chat_id() {
        let payload = extract::<FilesRequest>(Some("application/json"), "{}").await;
        let err = files(State(state()), payload).await.unwrap_err();
        assert_eq!(message(&err), "chat_id is required");

        let payload = extract::<FilesRequest>(None, "").await;
        let err = files(State(state()), payload).await.unwrap_err();
        assert_eq!(message(&err), "chat_id is required");
    }

    #[tokio::test]
    async fn test_files_for_unknown_session_is_empty() {
        let payload =
            extract::<FilesRequest>(Some("application/json"), r#"{"chat_id": "ghost"}"#).await;
        let Json(body) = files(State(state()), payload).await.unwrap();
        assert!(body.files.is_empty());
    }
}
