use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::llm::{ChatModel, Embedder, HttpLlm};
use crate::session::{Session, SessionRegistry};
use crate::store::{build_store, ContextStore};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub sessions: Arc<SessionRegistry>,
    pub store: Arc<dyn ContextStore>,
    pub chat: Arc<dyn ChatModel>,
    pub clone_semaphore: Arc<tokio::sync::Semaphore>,
}

impl AppState {
    /// State backed by the configured HTTP model provider.
    pub fn new(config: Config) -> anyhow::Result<Self> {
        let llm = Arc::new(HttpLlm::new(config.llm.clone())?);
        Ok(Self::with_models(config, llm.clone(), llm))
    }

    /// State backed by caller-supplied model services.
    pub fn with_models(
        config: Config,
        embedder: Arc<dyn Embedder>,
        chat: Arc<dyn ChatModel>,
    ) -> Self {
        let store = build_store(&config, embedder, chat.clone());
        Self::with_store(config, store, chat)
    }

    /// State around an already-built context store.
    pub fn with_store(
        config: Config,
        store: Arc<dyn ContextStore>,
        chat: Arc<dyn ChatModel>,
    ) -> Self {
        Self {
            sessions: Arc::new(SessionRegistry::new(config.max_sessions)),
            clone_semaphore: Arc::new(tokio::sync::Semaphore::new(
                config.max_concurrent_clones.max(1),
            )),
            config: Arc::new(config),
            store,
            chat,
        }
    }

    /// Drop store data held for sessions that have left the registry.
    pub fn release(&self, evicted: Vec<Arc<Session>>) {
        for session in evicted {
            self.store.evict(&session.key, session.generation);
            tracing::info!(
                "Evicted session {} ({}, loaded {})",
                session.key,
                session.repo_name,
                session.loaded_at.to_rfc3339()
            );
        }
    }

    /// Evict sessions idle longer than the configured TTL. Returns how many went.
    pub fn sweep_expired(&self) -> usize {
        let evicted = self
            .sessions
            .evict_expired(Duration::from_secs(self.config.session_ttl_secs));
        let count = evicted.len();
        self.release(evicted);
        count
    }
}
