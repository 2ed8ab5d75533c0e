//! Context stores: the interchangeable backends that turn an ingested
//! repository into a bounded context for one query.
//!
//! Every store keeps its data keyed by session and tagged with a
//! *generation*. A load populates a fresh generation while readers keep using
//! the one recorded in their [`Session`] snapshot; once the registry has
//! swapped in the new snapshot, [`ContextStore::retain_generation`] drops the
//! rest. Readers therefore never observe a half-built store.

pub mod flat;
pub mod metadata;
pub mod vector;

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use uuid::Uuid;

use crate::config::{Config, StoreKind};
use crate::error::AppError;
use crate::llm::respond::AnswerContext;
use crate::llm::{ChatModel, Embedder};
use crate::models::FileRecord;
use crate::session::Session;

/// A freshly checked-out repository, ready to be stored.
#[derive(Debug, Clone)]
pub struct RepoSource {
    pub session_key: String,
    pub repo_url: String,
    pub repo_name: String,
    /// Eligible files in traversal order.
    pub files: Vec<FileRecord>,
}

#[async_trait]
pub trait ContextStore: Send + Sync {
    fn kind(&self) -> StoreKind;

    /// Store `source` under `generation` without disturbing other generations.
    /// Returns the file records to keep on the session (possibly enriched).
    async fn populate(&self, source: RepoSource, generation: Uuid) -> Result<Vec<FileRecord>>;

    /// Drop every generation of `session_key` except `keep`.
    fn retain_generation(&self, session_key: &str, keep: Uuid);

    /// Drop one generation of `session_key`, leaving any other in place.
    fn evict(&self, session_key: &str, generation: Uuid);

    /// Build the answer context for `query` from the session's generation.
    async fn retrieve(&self, session: &Session, query: &str) -> Result<AnswerContext, AppError>;

    /// Sorted relative paths known for the session.
    fn list_files(&self, session: &Session) -> Vec<String> {
        let mut files: Vec<String> = session.files.iter().map(|f| f.path.clone()).collect();
        files.sort();
        files
    }
}

/// Construct the store selected by configuration.
pub fn build_store(
    config: &Config,
    embedder: Arc<dyn Embedder>,
    chat: Arc<dyn ChatModel>,
) -> Arc<dyn ContextStore> {
    match config.store {
        StoreKind::Vector => Arc::new(vector::VectorIndex::new(
            embedder,
            config.max_chunk_size,
            config.top_k,
            config.chunk_markers.clone(),
        )),
        StoreKind::Flat => Arc::new(flat::FlatArchive::new()),
        StoreKind::Metadata => Arc::new(metadata::MetadataIndex::new(chat)),
    }
}
