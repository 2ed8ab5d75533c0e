use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::chunking::markers::MarkerTable;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Server bind address
    pub bind_addr: String,
    /// Which context store backs every session
    pub store: StoreKind,
    /// LLM provider configuration
    pub llm: LlmConfig,
    /// Files larger than this are never ingested
    pub max_file_size_bytes: u64,
    /// Soft ceiling, in characters, for a single chunk
    pub max_chunk_size: usize,
    /// Chunks retrieved per query by the vector index
    pub top_k: usize,
    /// Most recent conversation turns replayed to the model
    pub max_history_turns: usize,
    /// Idle time after which a session is evicted
    pub session_ttl_secs: u64,
    /// Maximum live sessions; the least recently used one is evicted beyond this
    pub max_sessions: usize,
    /// Maximum concurrent clone operations
    pub max_concurrent_clones: usize,
    /// Clone timeout in seconds
    pub clone_timeout_secs: u64,
    /// Git personal access token for cloning private repos
    pub git_token: Option<String>,
    /// Declaration markers used by the chunker, per extension family
    pub chunk_markers: MarkerTable,
}

/// The context-selection strategy used for every session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreKind {
    /// Embedded chunks, top-K similarity retrieval.
    Vector,
    /// The whole filtered repository as one text blob.
    Flat,
    /// Per-file LLM summaries with LLM-driven relevance selection.
    Metadata,
}

impl FromStr for StoreKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "vector" | "rag" => Ok(StoreKind::Vector),
            "flat" | "full" => Ok(StoreKind::Flat),
            "metadata" => Ok(StoreKind::Metadata),
            other => Err(format!("unknown context store `{other}`")),
        }
    }
}

impl fmt::Display for StoreKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StoreKind::Vector => "vector",
            StoreKind::Flat => "flat",
            StoreKind::Metadata => "metadata",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// "ollama" or "openai"
    pub provider: String,
    /// Base URL for the LLM API
    pub base_url: String,
    /// General-purpose model used for summaries and code explanation
    pub chat_model: String,
    /// Code-specialized model used for file selection and code answers
    pub code_model: String,
    /// Model name for embeddings
    pub embedding_model: String,
    /// API key (only needed for cloud providers)
    pub api_key: Option<String>,
    /// Total timeout for one embedding or chat call
    pub request_timeout_secs: u64,
    pub connect_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:5000".to_string(),
            store: StoreKind::Vector,
            llm: LlmConfig::default(),
            max_file_size_bytes: 1_048_576,
            max_chunk_size: 1500,
            top_k: 3,
            max_history_turns: 20,
            session_ttl_secs: 6 * 60 * 60,
            max_sessions: 100,
            max_concurrent_clones: 2,
            clone_timeout_secs: 300,
            git_token: None,
            chunk_markers: MarkerTable::default(),
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "ollama".to_string(),
            base_url: "http://localhost:11434".to_string(),
            chat_model: "llama3.2:3b".to_string(),
            code_model: "code2".to_string(),
            embedding_model: "all-minilm".to_string(),
            api_key: None,
            request_timeout_secs: 120,
            connect_timeout_secs: 10,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(addr) = std::env::var("REPO_CHAT_BIND_ADDR") {
            config.bind_addr = addr;
        }
        if let Ok(kind) = std::env::var("REPO_CHAT_STORE") {
            match kind.parse() {
                Ok(k) => config.store = k,
                Err(e) => tracing::warn!("Ignoring REPO_CHAT_STORE: {e}"),
            }
        }
        parse_env("REPO_CHAT_MAX_FILE_SIZE_BYTES", &mut config.max_file_size_bytes);
        parse_env("REPO_CHAT_MAX_CHUNK_SIZE", &mut config.max_chunk_size);
        parse_env("REPO_CHAT_TOP_K", &mut config.top_k);
        parse_env("REPO_CHAT_MAX_HISTORY_TURNS", &mut config.max_history_turns);
        parse_env("REPO_CHAT_SESSION_TTL_SECS", &mut config.session_ttl_secs);
        parse_env("REPO_CHAT_MAX_SESSIONS", &mut config.max_sessions);
        parse_env(
            "REPO_CHAT_MAX_CONCURRENT_CLONES",
            &mut config.max_concurrent_clones,
        );
        parse_env("REPO_CHAT_CLONE_TIMEOUT_SECS", &mut config.clone_timeout_secs);
        if let Ok(token) = std::env::var("REPO_CHAT_GIT_TOKEN") {
            config.git_token = Some(token);
        }
        if let Ok(raw) = std::env::var("REPO_CHAT_CHUNK_MARKERS") {
            match serde_json::from_str(&raw) {
                Ok(overrides) => config.chunk_markers.apply_overrides(overrides),
                Err(e) => tracing::warn!("Ignoring REPO_CHAT_CHUNK_MARKERS: {e}"),
            }
        }

        if let Ok(provider) = std::env::var("LLM_PROVIDER") {
            config.llm.provider = provider;
        }
        if let Ok(url) = std::env::var("LLM_BASE_URL") {
            config.llm.base_url = url.trim_end_matches('/').to_string();
        }
        if let Ok(model) = std::env::var("LLM_CHAT_MODEL") {
            config.llm.chat_model = model;
        }
        if let Ok(model) = std::env::var("LLM_CODE_MODEL") {
            config.llm.code_model = model;
        }
        if let Ok(model) = std::env::var("LLM_EMBEDDING_MODEL") {
            config.llm.embedding_model = model;
        }
        if let Ok(key) = std::env::var("LLM_API_KEY") {
            config.llm.api_key = Some(key);
        }
        parse_env("LLM_REQUEST_TIMEOUT_SECS", &mut config.llm.request_timeout_secs);
        parse_env("LLM_CONNECT_TIMEOUT_SECS", &mut config.llm.connect_timeout_secs);

        // Zero would make every chunk a single line and every session instantly stale.
        config.max_chunk_size = config.max_chunk_size.max(1);
        config.max_sessions = config.max_sessions.max(1);
        config.max_concurrent_clones = config.max_concurrent_clones.max(1);

        config
    }
}

fn parse_env<T: FromStr>(key: &str, slot: &mut T) {
    if let Ok(val) = std::env::var(key) {
        if let Ok(v) = val.parse() {
            *slot = v;
        }
    }
}
