//! Flat archive: the whole filtered repository as one text blob per session.

use anyhow::Result;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use super::{ContextStore, RepoSource};
use crate::config::StoreKind;
use crate::error::AppError;
use crate::llm::respond::{AnswerContext, QueryFrame};
use crate::llm::ModelRole;
use crate::models::FileRecord;
use crate::session::Session;

const SYSTEM_PROMPT: &str = "You are a code expert analyzing a GitHub repository.
Provide a comprehensive answer based on the entire codebase content.
When referring to specific files or code sections, mention the file names for clarity.";

const FILE_PREFIX: &str = "File: ";

fn heavy_rule() -> String {
    "=".repeat(80)
}

fn light_rule() -> String {
    "-".repeat(80)
}

/// Render the archive: a repository header, then every file framed by rules.
pub fn build_archive(repo_url: &str, repo_name: &str, files: &[FileRecord]) -> String {
    let mut parts = vec![
        format!("Repository: {repo_url}"),
        format!("Repository Name: {repo_name}"),
        format!("{}\n", heavy_rule()),
    ];
    for file in files {
        parts.push(format!("\n{FILE_PREFIX}{}", file.path));
        parts.push(light_rule());
        parts.push(file.content.clone());
        parts.push(format!("{}\n", heavy_rule()));
    }
    parts.join("\n")
}

/// Recover the sorted, de-duplicated file list from an archive.
///
/// Only a `File: ` line directly followed by the dash rule counts, so file
/// content that happens to contain `File: ` is not mistaken for a header.
pub fn archive_file_paths(archive: &str) -> Vec<String> {
    let rule = light_rule();
    let lines: Vec<&str> = archive.split('\n').collect();
    let mut paths: Vec<String> = lines
        .windows(2)
        .filter(|w| w[1] == rule)
        .filter_map(|w| w[0].strip_prefix(FILE_PREFIX))
        .map(|p| p.trim().to_string())
        .collect();
    paths.sort();
    paths.dedup();
    paths
}

#[derive(Default)]
pub struct FlatArchive {
    archives: RwLock<HashMap<String, HashMap<Uuid, Arc<str>>>>,
}

impl FlatArchive {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn build(
        &self,
        session_key: &str,
        generation: Uuid,
        repo_url: &str,
        repo_name: &str,
        files: &[FileRecord],
    ) -> Arc<str> {
        let archive: Arc<str> = build_archive(repo_url, repo_name, files).into();
        self.archives
            .write()
            .entry(session_key.to_string())
            .or_default()
            .insert(generation, archive.clone());
        archive
    }

    pub fn get(&self, session_key: &str, generation: Uuid) -> Option<Arc<str>> {
        self.archives.read().get(session_key)?.get(&generation).cloned()
    }
}

#[async_trait]
impl ContextStore for FlatArchive {
    fn kind(&self) -> StoreKind {
        StoreKind::Flat
    }

    async fn populate(&self, source: RepoSource, generation: Uuid) -> Result<Vec<FileRecord>> {
        let archive = self.build(
            &source.session_key,
            generation,
            &source.repo_url,
            &source.repo_name,
            &source.files,
        );
        tracing::info!(
            "Archived {} files ({} bytes) for {}",
            source.files.len(),
            archive.len(),
            source.repo_name
        );
        Ok(source.files)
    }

    fn retain_generation(&self, session_key: &str, keep: Uuid) {
        if let Some(generations) = self.archives.write().get_mut(session_key) {
            generations.retain(|g, _| *g == keep);
        }
    }

    fn evict(&self, session_key: &str, generation: Uuid) {
        let mut archives = self.archives.write();
        if let Some(generations) = archives.get_mut(session_key) {
            generations.remove(&generation);
            if generations.is_empty() {
                archives.remove(session_key);
            }
        }
    }

    async fn retrieve(&self, session: &Session, _query: &str) -> Result<AnswerContext, AppError> {
        let archive = self
            .get(&session.key, session.generation)
            .ok_or(AppError::NotLoaded)?;
        Ok(AnswerContext {
            model: ModelRole::Code,
            system: format!("{SYSTEM_PROMPT}\nRepository contents:\n{archive}"),
            frame: QueryFrame::Plain,
            selected_files: None,
        })
    }

    fn list_files(&self, session: &Session) -> Vec<String> {
        self.get(&session.key, session.generation)
            .map(|archive| archive_file_paths(&archive))
            .unwrap_or_default()
    }
}
