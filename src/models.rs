use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One eligible source file of an ingested repository
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileRecord {
    /// Path relative to the checkout root, unique within a session
    pub path: String,
    pub content: String,
    /// Size on disk in bytes
    pub size: u64,
    /// LLM-generated structured summary (metadata index only)
    pub metadata: Option<String>,
}

/// A contiguous run of lines from one file
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Chunk {
    pub session_key: String,
    pub file_path: String,
    /// Ordinal of this chunk within its file
    pub chunk_index: usize,
    pub content: String,
    /// 1-based, inclusive
    pub start_line: usize,
    /// 1-based, inclusive
    pub end_line: usize,
}

/// A single chat turn (user or assistant)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}

/// POST /load-repo body. Fields are optional so that a missing field is
/// reported as a validation error rather than a deserialization rejection.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoadRepoRequest {
    pub repo_url: Option<String>,
    pub chat_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusResponse {
    pub status: String,
}

/// POST /chat body
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChatRequest {
    pub query: Option<String>,
    pub chat_id: Option<String>,
    /// Newline-delimited transcript of `User: ` / `Assistant: ` lines
    #[serde(default)]
    pub conversation_history: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ChatResponse {
    pub response: String,
    #[serde(rename = "selectedFiles", skip_serializing_if = "Option::is_none")]
    pub selected_files: Option<Vec<String>>,
}

/// POST /files body
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FilesRequest {
    pub chat_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FilesResponse {
    pub files: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub store: String,
    pub sessions: usize,
    /// Completion time of the newest live load
    pub last_load: Option<DateTime<Utc>>,
}
