use anyhow::{Context, Result};
use std::path::Path;

use crate::error::AppError;

/// Schemes a repository URL may use. `file://` is deliberately absent so a
/// request can never ingest the server's own filesystem.
const ALLOWED_SCHEMES: &[&str] = &["https", "http", "git", "ssh"];

/// Validate a repository URL and derive the repository name from it.
pub fn validate_repo_url(raw: &str) -> Result<String, AppError> {
    let invalid = || AppError::validation("Invalid repository URL");

    let url = reqwest::Url::parse(raw.trim()).map_err(|_| invalid())?;
    if !ALLOWED_SCHEMES.contains(&url.scheme()) {
        return Err(AppError::validation(
            "Only https://, http://, git:// and ssh:// repository URLs are allowed",
        ));
    }
    if url.host_str().map_or(true, str::is_empty) {
        return Err(invalid());
    }

    repo_name_from_path(url.path()).ok_or_else(invalid)
}

/// Last path segment without a trailing `.git`.
fn repo_name_from_path(path: &str) -> Option<String> {
    let name = path
        .trim_end_matches('/')
        .rsplit('/')
        .next()?
        .trim_end_matches(".git");
    if name.is_empty() {
        None
    } else {
        Some(name.to_string())
    }
}

/// Shallow-clone a git repository to the target directory.
pub fn clone_repo(url: &str, target: &Path, token: Option<&str>) -> Result<()> {
    tracing::info!("Cloning {} into {}", url, target.display());

    let mut callbacks = git2::RemoteCallbacks::new();
    if let Some(token) = token {
        let token = token.to_string();
        callbacks.credentials(move |_url, _user, _allowed| {
            git2::Cred::userpass_plaintext("x-access-token", &token)
        });
    }

    let mut fetch = git2::FetchOptions::new();
    fetch.remote_callbacks(callbacks);
    fetch.depth(1);

    git2::build::RepoBuilder::new()
        .fetch_options(fetch)
        .clone(url, target)
        .with_context(|| format!("Failed to clone {url}"))?;

    tracing::info!("Clone complete: {}", target.display());
    Ok(())
}
