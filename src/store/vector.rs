//! Vector index: chunk embeddings with cosine-similarity retrieval.
//!
//! All sessions share one physical collection; each entry is tagged with its
//! session key and generation, and every query filters on both.

use anyhow::{Context, Result};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::sync::Arc;
use uuid::Uuid;

use super::{ContextStore, RepoSource};
use crate::chunking::{chunk_file, markers::MarkerTable};
use crate::config::StoreKind;
use crate::error::AppError;
use crate::llm::respond::{AnswerContext, QueryFrame};
use crate::llm::{Embedder, ModelRole};
use crate::models::{Chunk, FileRecord};
use crate::session::Session;

const SYSTEM_PROMPT: &str = "You are a helpful AI assistant specialized in code explanation. \
Use the following code context to answer the question, but don't mention that you're using any context:";

/// A stored vector entry
#[derive(Debug, Clone)]
struct VectorEntry {
    id: String,
    session_key: String,
    generation: Uuid,
    file_path: String,
    chunk_index: usize,
    content: String,
    start_line: usize,
    end_line: usize,
    embedding: Vec<f32>,
}

#[derive(Debug, Clone)]
pub struct VectorHit {
    pub id: String,
    pub file_path: String,
    pub chunk_index: usize,
    pub content: String,
    pub start_line: usize,
    pub end_line: usize,
    pub score: f32,
}

/// In-memory collection shared by every session.
#[derive(Default)]
pub struct VectorCollection {
    entries: RwLock<Vec<VectorEntry>>,
}

impl VectorCollection {
    fn insert(&self, new_entries: Vec<VectorEntry>) {
        self.entries.write().extend(new_entries);
    }

    /// Delete entries of `session_key` matching `doomed`; returns how many went.
    fn delete_where(&self, session_key: &str, doomed: impl Fn(Uuid) -> bool) -> usize {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|e| e.session_key != session_key || !doomed(e.generation));
        before - entries.len()
    }

    /// Search one session generation by cosine similarity against a query embedding.
    fn search(
        &self,
        query_embedding: &[f32],
        limit: usize,
        session_key: &str,
        generation: Uuid,
    ) -> Vec<VectorHit> {
        let entries = self.entries.read();

        let mut scored: Vec<(f32, &VectorEntry)> = entries
            .iter()
            .filter(|e| e.session_key == session_key && e.generation == generation)
            .map(|e| (cosine_similarity(query_embedding, &e.embedding), e))
            .collect();

        // Sort descending by score
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(limit);

        scored
            .into_iter()
            .map(|(score, e)| VectorHit {
                id: e.id.clone(),
                file_path: e.file_path.clone(),
                chunk_index: e.chunk_index,
                content: e.content.clone(),
                start_line: e.start_line,
                end_line: e.end_line,
                score,
            })
            .collect()
    }

    pub fn entry_count(&self) -> usize {
        self.entries.read().len()
    }

    pub fn session_entry_count(&self, session_key: &str) -> usize {
        self.entries
            .read()
            .iter()
            .filter(|e| e.session_key == session_key)
            .count()
    }
}

/// Logical per-session view over the shared collection.
pub struct SessionCollection<'a> {
    collection: &'a VectorCollection,
    embedder: &'a dyn Embedder,
    session_key: String,
}

impl SessionCollection<'_> {
    /// Remove every generation of this session.
    pub fn clear(&self) -> usize {
        self.collection.delete_where(&self.session_key, |_| true)
    }

    /// Embed `chunks` and store them under `generation`.
    pub async fn add(&self, generation: Uuid, chunks: &[Chunk]) -> Result<usize> {
        if chunks.is_empty() {
            return Ok(0);
        }
        let texts: Vec<String> = chunks
            .iter()
            .map(|c| format!("File: {}\n{}", c.file_path, c.content))
            .collect();
        let embeddings = self.embedder.embed(&texts).await?;
        if embeddings.len() != chunks.len() {
            anyhow::bail!(
                "Embedder returned {} vectors for {} chunks",
                embeddings.len(),
                chunks.len()
            );
        }

        let entries: Vec<VectorEntry> = chunks
            .iter()
            .zip(embeddings)
            .map(|(c, embedding)| VectorEntry {
                id: format!(
                    "{}_{}_{}_chunk_{}",
                    self.session_key, generation, c.file_path, c.chunk_index
                ),
                session_key: self.session_key.clone(),
                generation,
                file_path: c.file_path.clone(),
                chunk_index: c.chunk_index,
                content: c.content.clone(),
                start_line: c.start_line,
                end_line: c.end_line,
                embedding,
            })
            .collect();
        let count = entries.len();
        self.collection.insert(entries);
        Ok(count)
    }

    /// Top-`top_k` chunks of `generation` nearest to `text`.
    pub async fn query(
        &self,
        generation: Uuid,
        text: &str,
        top_k: usize,
    ) -> Result<Vec<VectorHit>> {
        let embedding = self
            .embedder
            .embed(&[text.to_string()])
            .await?
            .into_iter()
            .next()
            .context("Embedder returned no vector for the query")?;
        Ok(self
            .collection
            .search(&embedding, top_k, &self.session_key, generation))
    }
}

pub struct VectorIndex {
    collection: VectorCollection,
    embedder: Arc<dyn Embedder>,
    max_chunk_size: usize,
    top_k: usize,
    markers: MarkerTable,
}

impl VectorIndex {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        max_chunk_size: usize,
        top_k: usize,
        markers: MarkerTable,
    ) -> Self {
        Self {
            collection: VectorCollection::default(),
            embedder,
            max_chunk_size,
            top_k,
            markers,
        }
    }

    pub fn get_or_create(&self, session_key: &str) -> SessionCollection<'_> {
        SessionCollection {
            collection: &self.collection,
            embedder: self.embedder.as_ref(),
            session_key: session_key.to_string(),
        }
    }

    pub fn collection(&self) -> &VectorCollection {
        &self.collection
    }
}

#[async_trait]
impl ContextStore for VectorIndex {
    fn kind(&self) -> StoreKind {
        StoreKind::Vector
    }

    async fn populate(&self, source: RepoSource, generation: Uuid) -> Result<Vec<FileRecord>> {
        let handle = self.get_or_create(&source.session_key);
        let mut total = 0usize;

        // One embedding batch per file
        for file in &source.files {
            let chunks = chunk_file(
                &source.session_key,
                &file.path,
                &file.content,
                self.max_chunk_size,
                &self.markers,
            );
            total += handle
                .add(generation, &chunks)
                .await
                .with_context(|| format!("Failed to embed {}", file.path))?;
        }

        tracing::info!(
            "Indexed {} chunks from {} files for {}",
            total,
            source.files.len(),
            source.repo_name
        );
        Ok(source.files)
    }

    fn retain_generation(&self, session_key: &str, keep: Uuid) {
        let removed = self.collection.delete_where(session_key, |g| g != keep);
        if removed > 0 {
            tracing::debug!("Dropped {removed} stale vectors for session {session_key}");
        }
    }

    fn evict(&self, session_key: &str, generation: Uuid) {
        self.collection
            .delete_where(session_key, |g| g == generation);
    }

    async fn retrieve(&self, session: &Session, query: &str) -> Result<AnswerContext, AppError> {
        let hits = self
            .get_or_create(&session.key)
            .query(session.generation, query, self.top_k)
            .await?;
        if hits.is_empty() {
            return Err(AppError::NoRelevantContext);
        }
        tracing::debug!(
            "Retrieved {} chunks for session {} (best score {:.3})",
            hits.len(),
            session.key,
            hits[0].score
        );

        Ok(AnswerContext {
            model: ModelRole::General,
            system: format!("{SYSTEM_PROMPT} {}", build_context_block(&hits)),
            frame: QueryFrame::Plain,
            selected_files: None,
        })
    }
}

/// Retrieved chunks as one block, each headed by its file and line range.
pub fn build_context_block(hits: &[VectorHit]) -> String {
    hits.iter()
        .map(|h| {
            format!(
                "\nFile: {} (lines {}-{})\n{}",
                h.file_path, h.start_line, h.end_line, h.content
            )
        })
        .collect::<Vec<_>>()
        .join("\n---\n")
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for i in 0..a.len() {
        dot += a[i] * b[i];
        norm_a += a[i] * a[i];
        norm_b += b[i] * b[i];
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom == 0.0 {
        0.0
    } else {
        dot / denom
    }
}
