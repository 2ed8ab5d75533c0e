//! The two request pipelines: loading a repository into a session, and
//! answering a query against it.

use anyhow::Context;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::error::AppError;
use crate::git::{clone_repo, validate_repo_url, walk_repo_files};
use crate::llm::respond::generate;
use crate::models::ChatResponse;
use crate::session::Session;
use crate::state::AppState;
use crate::store::{ContextStore, RepoSource};

const CLONE_FAILED: &str = "Failed to clone repository. Please check the URL and try again.";
const NO_FILES: &str = "No valid code files found in the repository";

/// Validate, clone and ingest `repo_url` as the new content of `session_key`.
///
/// The checkout lives in a temporary directory removed on every exit path.
/// On failure the session's previous generation, if any, stays in place.
pub async fn load_repository(
    state: &AppState,
    session_key: &str,
    repo_url: &str,
) -> Result<usize, AppError> {
    let repo_url = repo_url.trim();
    let repo_name = validate_repo_url(repo_url)?;

    let lock = state.sessions.load_lock(session_key);
    let _guard = lock.lock().await;

    let checkout = tempfile::Builder::new()
        .prefix("repo-chat-")
        .tempdir()
        .context("Failed to create checkout directory")?;
    let repo_dir = checkout.path().join(&repo_name);
    clone_with_limits(state, repo_url, repo_dir.clone()).await?;

    install_checkout(state, session_key, repo_url, &repo_name, &repo_dir).await
}

/// Ingest an existing local checkout as the new content of `session_key`.
pub async fn ingest_checkout(
    state: &AppState,
    session_key: &str,
    repo_url: &str,
    repo_name: &str,
    repo_dir: &Path,
) -> Result<usize, AppError> {
    let lock = state.sessions.load_lock(session_key);
    let _guard = lock.lock().await;
    install_checkout(state, session_key, repo_url, repo_name, repo_dir).await
}

async fn clone_with_limits(state: &AppState, url: &str, target: PathBuf) -> Result<(), AppError> {
    // Acquire clone permit (limits concurrent clones)
    let _permit = state
        .clone_semaphore
        .acquire()
        .await
        .map_err(|_| anyhow::anyhow!("Clone semaphore closed"))?;

    let url_owned = url.to_string();
    let git_token = state.config.git_token.clone();
    let timeout = std::time::Duration::from_secs(state.config.clone_timeout_secs);

    let clone_result = tokio::time::timeout(
        timeout,
        tokio::task::spawn_blocking(move || clone_repo(&url_owned, &target, git_token.as_deref())),
    )
    .await;

    match clone_result {
        Ok(Ok(Ok(()))) => Ok(()),
        Ok(Ok(Err(e))) => {
            tracing::error!("Git clone failed: {e:#}");
            Err(AppError::validation(CLONE_FAILED))
        }
        Ok(Err(e)) => Err(anyhow::anyhow!("Clone task failed: {e}").into()),
        Err(_) => {
            tracing::error!(
                "Clone of {url} timed out after {}s",
                state.config.clone_timeout_secs
            );
            Err(AppError::validation(CLONE_FAILED))
        }
    }
}

/// Walk, populate a fresh generation, then swap it in. Caller holds the load lock.
async fn install_checkout(
    state: &AppState,
    session_key: &str,
    repo_url: &str,
    repo_name: &str,
    repo_dir: &Path,
) -> Result<usize, AppError> {
    let max_file_size = state.config.max_file_size_bytes;
    let walk_dir = repo_dir.to_path_buf();
    let files = tokio::task::spawn_blocking(move || walk_repo_files(&walk_dir, max_file_size))
        .await
        .context("File walk task failed")?;

    tracing::info!("Processed {} code files from {repo_name}", files.len());
    if files.is_empty() {
        return Err(AppError::validation(NO_FILES));
    }

    let generation = Uuid::new_v4();
    let source = RepoSource {
        session_key: session_key.to_string(),
        repo_url: repo_url.to_string(),
        repo_name: repo_name.to_string(),
        files,
    };
    let mut pending = PendingGeneration {
        store: &*state.store,
        session_key,
        generation,
        installed: false,
    };
    let files = state
        .store
        .populate(source, generation)
        .await
        .with_context(|| format!("Failed to ingest {repo_name}"))?;
    let file_count = files.len();

    let session = Session::new(session_key, generation, repo_url, repo_name, files);
    let (_replaced, evicted) = state.sessions.install(session);
    pending.installed = true;
    state.store.retain_generation(session_key, generation);
    state.release(evicted);

    tracing::info!(
        "Repository loaded successfully: {repo_url} ({file_count} files, session {session_key})"
    );
    Ok(file_count)
}

/// A populated generation that no session points at yet. Dropping it before
/// the swap, whether on error or because the load future was cancelled,
/// removes whatever the store already wrote.
struct PendingGeneration<'a> {
    store: &'a dyn ContextStore,
    session_key: &'a str,
    generation: Uuid,
    installed: bool,
}

impl Drop for PendingGeneration<'_> {
    fn drop(&mut self) {
        if !self.installed {
            tracing::warn!(
                "Discarding unfinished load of session {} (generation {})",
                self.session_key,
                self.generation
            );
            self.store.evict(self.session_key, self.generation);
        }
    }
}

/// Answer `query` from the session's current generation.
pub async fn answer_chat(
    state: &AppState,
    session_key: &str,
    query: &str,
    conversation_history: &str,
) -> Result<ChatResponse, AppError> {
    let session = state.sessions.get(session_key).ok_or(AppError::NotLoaded)?;
    let context = state.store.retrieve(&session, query).await?;
    let response = generate(
        state.chat.as_ref(),
        &context,
        query,
        conversation_history,
        state.config.max_history_turns,
    )
    .await?;

    Ok(ChatResponse {
        response,
        selected_files: context.selected_files,
    })
}

/// Sorted file paths of the session, or nothing if it is not loaded.
pub fn list_files(state: &AppState, session_key: &str) -> Vec<String> {
    state
        .sessions
        .get(session_key)
        .map(|session| state.store.list_files(&session))
        .unwrap_or_default()
}
