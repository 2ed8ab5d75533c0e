//! Metadata index: one LLM-written summary per file, and LLM-driven selection
//! of the files relevant to each query.

use anyhow::Result;
use async_trait::async_trait;
use parking_lot::RwLock;
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use uuid::Uuid;

use super::{ContextStore, RepoSource};
use crate::config::StoreKind;
use crate::error::AppError;
use crate::llm::respond::{AnswerContext, QueryFrame};
use crate::llm::{sanitize_for_prompt, ChatModel, ModelRole};
use crate::models::{ChatMessage, FileRecord};
use crate::session::Session;

const ANALYZER_PROMPT: &str = "You are an expert code analyzer specializing in generating structured metadata.
Focus on identifying key components, dependencies, and relationships between different parts of the code.
Provide detailed but concise descriptions that will help in understanding the file's role in the project.";

const SELECTOR_PROMPT: &str = "You are a senior software engineer with expertise in code analysis and architecture.
Your task is to identify ALL files that are:
1. Directly relevant to implementing or modifying the requested changes
2. Dependencies that might be affected by the changes
3. Configuration files that might need updating
4. Test files that should be modified or created
5. Related utility files that might be helpful

Analyze the repository structure and file metadata carefully.
Output ONLY the file paths, one per line, without any additional text or explanations.
Include files that might need modification, even if not directly mentioned in the query.";

const ENGINEER_PROMPT: &str = "You are a senior software engineer with extensive experience in software development and architecture.
Your task is to:
1. Analyze the provided code files thoroughly
2. Understand the current implementation and architecture
3. Provide detailed, production-ready solutions
4. Consider edge cases and potential issues
5. Follow best practices and design patterns
6. Maintain consistency with the existing codebase
7. Consider performance implications
8. Suggest necessary tests or validation steps

When providing solutions:
- Write complete, production-ready code
- Include clear explanations of your changes
- Highlight any potential risks or considerations
- Suggest related improvements if relevant
- Maintain existing code style and conventions
- Consider backward compatibility
- Focus on maintainability and scalability";

const NO_FILES_SELECTED: &str = "(No files were selected as relevant to this task.)";

/// Summary instruction for a file, chosen by extension.
pub fn language_template(file_path: &str) -> String {
    let ext = file_path
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_lowercase())
        .unwrap_or_default();

    let fields = match ext.as_str() {
        "py" => (
            "Python",
            "imports: [list all imports]
classes: [list all classes with their purpose]
functions: [list all functions with parameters and return values]
dependencies: [list external package dependencies]",
        ),
        "js" => (
            "JavaScript",
            "imports: [list all imports/requires]
exports: [list exported items]
components: [list React components if any]
functions: [list all functions with parameters and return values]
dependencies: [list package dependencies]",
        ),
        "ts" => (
            "TypeScript",
            "imports: [list all imports]
interfaces: [list all interfaces with descriptions]
types: [list all type definitions]
components: [list React components if any]
functions: [list all functions with type signatures]
dependencies: [list package dependencies]",
        ),
        "java" => (
            "Java",
            "package: [package name]
imports: [list all imports]
classes: [list all classes with their purpose]
interfaces: [list all interfaces]
methods: [list all methods with signatures]
dependencies: [list external dependencies]",
        ),
        _ => (
            "code",
            "imports: [list any imports or dependencies]
functions: [list main functions/methods with signatures]
dependencies: [list external dependencies]",
        ),
    };

    format!(
        "Analyze this {} file and provide metadata in this format:\nname: {file_path}\n{}\nbrief: [3-line summary of the file's purpose]",
        fields.0, fields.1
    )
}

/// Metadata entry used when a file could not be summarised.
pub fn placeholder_metadata(file_path: &str) -> String {
    format!("name: {file_path}\nbrief: Error processing file")
}

/// The repository overview handed to relevance selection.
pub fn build_overview(files: &[FileRecord]) -> String {
    let mut parts = vec!["Repository Structure and Contents:\n".to_string()];
    parts.extend(files.iter().map(|f| {
        format!(
            "\nFile: {}\nMetadata: {}\n",
            f.path,
            f.metadata.as_deref().unwrap_or_default()
        )
    }));
    parts.join("\n")
}

/// Strip a leading list marker (`-`, `*`, `+`, `•`, `1.`, `2)`) and wrapping quotes.
fn strip_list_marker(line: &str) -> &str {
    let t = line.trim();
    let t = match t.strip_prefix(|c: char| matches!(c, '-' | '*' | '+' | '•')) {
        Some(rest) => rest,
        None => {
            let digits = t.len() - t.trim_start_matches(|c: char| c.is_ascii_digit()).len();
            if digits > 0 {
                t[digits..]
                    .strip_prefix(|c: char| c == '.' || c == ')')
                    .unwrap_or(t)
            } else {
                t
            }
        }
    };
    t.trim()
        .trim_matches(|c: char| c == '`' || c == '"' || c == '\'')
        .trim()
}

/// Extract known paths from a selection response, in response order.
///
/// A line counts when it is a known path, either verbatim or once a list
/// marker is removed. Anything else is treated as prose and dropped.
pub fn parse_relevant_paths(response: &str, known: &HashSet<&str>) -> Vec<String> {
    let mut seen = HashSet::new();
    response
        .lines()
        .filter_map(|line| {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                return None;
            }
            if known.contains(trimmed) {
                return Some(trimmed);
            }
            let stripped = strip_list_marker(trimmed);
            known.contains(stripped).then_some(stripped)
        })
        .filter(|p| seen.insert(*p))
        .map(str::to_string)
        .collect()
}

struct CachedSummary {
    fingerprint: String,
    text: String,
}

fn fingerprint(content: &str) -> String {
    hex::encode(Sha256::digest(content.as_bytes()))
}

pub struct MetadataIndex {
    chat: Arc<dyn ChatModel>,
    /// session key -> path -> summary
    summaries: RwLock<HashMap<String, HashMap<String, CachedSummary>>>,
    /// session key -> generation -> overview
    overviews: RwLock<HashMap<String, HashMap<Uuid, Arc<str>>>>,
}

impl MetadataIndex {
    pub fn new(chat: Arc<dyn ChatModel>) -> Self {
        Self {
            chat,
            summaries: RwLock::new(HashMap::new()),
            overviews: RwLock::new(HashMap::new()),
        }
    }

    /// Summarise one file, reusing the session's cached summary while the
    /// content is unchanged. Failures degrade to a placeholder, which is not cached.
    pub async fn summarize(&self, session_key: &str, file: &FileRecord) -> String {
        let digest = fingerprint(&file.content);
        if let Some(cached) = self
            .summaries
            .read()
            .get(session_key)
            .and_then(|by_path| by_path.get(&file.path))
            .filter(|c| c.fingerprint == digest)
        {
            return cached.text.clone();
        }

        let messages = vec![
            ChatMessage::system(ANALYZER_PROMPT),
            ChatMessage::user(format!(
                "{}\n\nCode:\n{}",
                language_template(&file.path),
                sanitize_for_prompt(&file.content)
            )),
        ];
        match self.chat.complete(ModelRole::General, messages).await {
            Ok(text) => {
                tracing::info!("Summarized {}", file.path);
                self.summaries
                    .write()
                    .entry(session_key.to_string())
                    .or_default()
                    .insert(
                        file.path.clone(),
                        CachedSummary {
                            fingerprint: digest,
                            text: text.clone(),
                        },
                    );
                text
            }
            Err(e) => {
                tracing::warn!("Error processing file {}: {e:#}", file.path);
                placeholder_metadata(&file.path)
            }
        }
    }

    /// Ask the code model which files matter for `query`. Any failure yields
    /// an empty selection.
    pub async fn select_relevant<'f>(
        &self,
        overview: &str,
        query: &str,
        files: &'f [FileRecord],
    ) -> Vec<&'f FileRecord> {
        let messages = vec![
            ChatMessage::system(SELECTOR_PROMPT),
            ChatMessage::user(format!(
                "Repository structure and metadata:\n{overview}\n\nDevelopment Task: {}\n\nList all potentially relevant file paths:",
                sanitize_for_prompt(query)
            )),
        ];
        let response = match self.chat.complete(ModelRole::Code, messages).await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!("Relevance selection failed: {e:#}");
                return Vec::new();
            }
        };

        let known: HashSet<&str> = files.iter().map(|f| f.path.as_str()).collect();
        let chosen: HashSet<String> = parse_relevant_paths(&response, &known)
            .into_iter()
            .collect();
        if chosen.is_empty() {
            tracing::warn!("Relevance selection returned no known paths");
        }
        files.iter().filter(|f| chosen.contains(&f.path)).collect()
    }

    fn overview(&self, session_key: &str, generation: Uuid) -> Option<Arc<str>> {
        self.overviews
            .read()
            .get(session_key)?
            .get(&generation)
            .cloned()
    }
}

#[async_trait]
impl ContextStore for MetadataIndex {
    fn kind(&self) -> StoreKind {
        StoreKind::Metadata
    }

    async fn populate(&self, source: RepoSource, generation: Uuid) -> Result<Vec<FileRecord>> {
        let RepoSource {
            session_key,
            repo_name,
            mut files,
            ..
        } = source;

        for file in files.iter_mut() {
            file.metadata = Some(self.summarize(&session_key, file).await);
        }

        // Forget summaries of files that no longer exist
        if let Some(by_path) = self.summaries.write().get_mut(&session_key) {
            let live: HashSet<&str> = files.iter().map(|f| f.path.as_str()).collect();
            by_path.retain(|path, _| live.contains(path.as_str()));
        }

        let overview: Arc<str> = build_overview(&files).into();
        self.overviews
            .write()
            .entry(session_key)
            .or_default()
            .insert(generation, overview);
        tracing::info!("Built metadata overview of {} files for {repo_name}", files.len());
        Ok(files)
    }

    fn retain_generation(&self, session_key: &str, keep: Uuid) {
        if let Some(generations) = self.overviews.write().get_mut(session_key) {
            generations.retain(|g, _| *g == keep);
        }
    }

    fn evict(&self, session_key: &str, generation: Uuid) {
        let mut overviews = self.overviews.write();
        let drained = match overviews.get_mut(session_key) {
            Some(generations) => {
                generations.remove(&generation);
                generations.is_empty()
            }
            // A first load that never finished has summaries but no overview
            None => true,
        };
        if drained {
            overviews.remove(session_key);
            self.summaries.write().remove(session_key);
        }
    }

    async fn retrieve(&self, session: &Session, query: &str) -> Result<AnswerContext, AppError> {
        let overview = self
            .overview(&session.key, session.generation)
            .ok_or(AppError::NotLoaded)?;
        let selected = self.select_relevant(&overview, query, &session.files).await;
        tracing::info!(
            "Selected {} of {} files for session {}",
            selected.len(),
            session.files.len(),
            session.key
        );

        let files_context = if selected.is_empty() {
            NO_FILES_SELECTED.to_string()
        } else {
            selected
                .iter()
                .map(|f| format!("=== {} ===\n{}", f.path, f.content))
                .collect::<Vec<_>>()
                .join("\n\n")
        };

        Ok(AnswerContext {
            model: ModelRole::Code,
            system: format!("{ENGINEER_PROMPT}\n\nAvailable files:\n{files_context}"),
            frame: QueryFrame::DevelopmentTask,
            selected_files: Some(selected.iter().map(|f| f.path.clone()).collect()),
        })
    }
}
