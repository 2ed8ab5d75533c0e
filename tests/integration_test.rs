//! Integration tests for the load and chat pipelines.
//!
//! Each test builds a local checkout in a temp directory and drives it through
//! ingestion and chat with in-process model fakes, so no network, git remote
//! or running LLM is needed.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use repo_chat::chunking::markers::MarkerTable;
use repo_chat::config::{Config, StoreKind};
use repo_chat::error::AppError;
use repo_chat::ingest::{answer_chat, ingest_checkout, list_files};
use repo_chat::llm::{ChatModel, Embedder, ModelRole};
use repo_chat::models::ChatMessage;
use repo_chat::state::AppState;
use repo_chat::store::vector::VectorIndex;

/// Hashed bag-of-words vectors: texts sharing words score as similar.
struct WordHashEmbedder;

#[async_trait]
impl Embedder for WordHashEmbedder {
    async fn embed(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        Ok(texts
            .iter()
            .map(|text| {
                let mut v = vec![0.0f32; 128];
                for word in text
                    .split(|c: char| !c.is_alphanumeric())
                    .filter(|w| !w.is_empty())
                {
                    let h = word
                        .to_lowercase()
                        .bytes()
                        .fold(5381u32, |h, b| h.wrapping_mul(33) ^ b as u32);
                    v[h as usize % 128] += 1.0;
                }
                v
            })
            .collect())
    }
}

/// Serves the first embedding request, then hangs forever.
#[derive(Default)]
struct StallingEmbedder {
    served: AtomicUsize,
}

#[async_trait]
impl Embedder for StallingEmbedder {
    async fn embed(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        if self.served.fetch_add(1, Ordering::SeqCst) == 0 {
            WordHashEmbedder.embed(texts).await
        } else {
            std::future::pending().await
        }
    }
}

/// Answers by prompt kind and records every request.
#[derive(Default)]
struct RoutingChat {
    /// Reply to relevance-selection prompts.
    selection: String,
    requests: Mutex<Vec<(ModelRole, Vec<ChatMessage>)>>,
}

impl RoutingChat {
    fn selecting(selection: &str) -> Self {
        Self {
            selection: selection.to_string(),
            ..Self::default()
        }
    }

    fn last_system_prompt(&self) -> String {
        let requests = self.requests.lock();
        requests
            .last()
            .map(|(_, messages)| messages[0].content.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl ChatModel for RoutingChat {
    async fn complete(
        &self,
        role: ModelRole,
        messages: Vec<ChatMessage>,
    ) -> anyhow::Result<String> {
        let system = messages[0].content.clone();
        self.requests.lock().push((role, messages));
        if system.starts_with("You are an expert code analyzer") {
            Ok("brief: summarised".to_string())
        } else if system.contains("identify ALL files") {
            Ok(self.selection.clone())
        } else {
            Ok("final answer".to_string())
        }
    }
}

fn state(kind: StoreKind, chat: Arc<RoutingChat>) -> AppState {
    let config = Config {
        store: kind,
        ..Config::default()
    };
    AppState::with_models(config, Arc::new(WordHashEmbedder), chat)
}

fn write(dir: &Path, rel: &str, content: &[u8]) {
    let path = dir.join(rel);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, content).unwrap();
}

/// A small Flask service plus the clutter a real checkout carries.
fn sample_checkout() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    write(
        root,
        "app.py",
        b"from flask import Flask\n\napp = Flask(__name__)\n\n@app.route('/health')\ndef health():\n    return 'ok'\n",
    );
    write(
        root,
        "src/billing.py",
        b"def charge_invoice(invoice):\n    return invoice.total * tax_rate()\n",
    );
    write(root, "README.md", b"# Shop\n\nA tiny shop backend.\n");
    write(root, "Dockerfile", b"FROM python:3.12\n");
    write(root, "empty.py", b"\n\n   \n");
    write(root, "logo.png", b"\x89PNG\r\n\x1a\n");
    write(root, "node_modules/left-pad/index.js", b"module.exports = 1;\n");
    write(root, ".git/config", b"[core]\n");
    write(root, "data/blob.txt", b"\xff\xfe\xfa binary");
    dir
}

const SHOP_URL: &str = "https://git.example.com/acme/shop";

const EXPECTED_FILES: [&str; 4] = ["Dockerfile", "README.md", "app.py", "src/billing.py"];

#[tokio::test]
async fn test_classifier_filters_checkout() {
    let chat = Arc::new(RoutingChat::default());
    let state = state(StoreKind::Flat, chat);
    let checkout = sample_checkout();

    let count = ingest_checkout(
        &state,
        "c1",
        "https://git.example.com/acme/shop.git",
        "shop",
        checkout.path(),
    )
    .await
    .unwrap();
    assert_eq!(count, EXPECTED_FILES.len());
    assert_eq!(list_files(&state, "c1"), EXPECTED_FILES);
}

#[tokio::test]
async fn test_vector_store_end_to_end() {
    let chat = Arc::new(RoutingChat::default());
    let state = state(StoreKind::Vector, chat.clone());
    let checkout = sample_checkout();
    ingest_checkout(&state, "c1", SHOP_URL, "shop", checkout.path())
        .await
        .unwrap();

    let answer = answer_chat(&state, "c1", "how is an invoice charged with tax", "")
        .await
        .unwrap();
    assert_eq!(answer.response, "final answer");
    assert!(answer.selected_files.is_none());

    let system = chat.last_system_prompt();
    assert!(system.starts_with("You are a helpful AI assistant specialized in code"));
    assert!(system.contains("File: src/billing.py (lines 1-1)"));
    assert!(system.contains("charge_invoice"));
    assert_eq!(chat.requests.lock().last().unwrap().0, ModelRole::General);
    assert_eq!(list_files(&state, "c1"), EXPECTED_FILES);
}

#[tokio::test]
async fn test_flat_store_end_to_end() {
    let chat = Arc::new(RoutingChat::default());
    let state = state(StoreKind::Flat, chat.clone());
    let checkout = sample_checkout();
    ingest_checkout(&state, "c1", SHOP_URL, "shop", checkout.path())
        .await
        .unwrap();

    let history = "User: hi\nAssistant: hello";
    let answer = answer_chat(&state, "c1", "what does this repo do?", history)
        .await
        .unwrap();
    assert_eq!(answer.response, "final answer");

    let system = chat.last_system_prompt();
    assert!(system.contains(&format!("Repository: {SHOP_URL}\nRepository Name: shop")));
    for path in EXPECTED_FILES {
        assert!(system.contains(&format!("\nFile: {path}\n")));
    }
    assert!(!system.contains("left-pad"));

    let requests = chat.requests.lock();
    let (role, messages) = requests.last().unwrap();
    assert_eq!(*role, ModelRole::Code);
    assert_eq!(messages.len(), 4);
}

#[tokio::test]
async fn test_metadata_store_end_to_end() {
    let chat = Arc::new(RoutingChat::selecting(
        "Here are the files you need:\nsrc/billing.py\nsrc/imaginary.py\n- app.py",
    ));
    let state = state(StoreKind::Metadata, chat.clone());
    let checkout = sample_checkout();
    ingest_checkout(&state, "c1", SHOP_URL, "shop", checkout.path())
        .await
        .unwrap();

    // One summary per eligible file
    assert_eq!(chat.requests.lock().len(), EXPECTED_FILES.len());

    let answer = answer_chat(&state, "c1", "add a discount code", "").await.unwrap();
    assert_eq!(
        answer.selected_files,
        Some(vec!["app.py".to_string(), "src/billing.py".to_string()])
    );

    let system = chat.last_system_prompt();
    assert!(system.contains("Available files:\n=== app.py ===\n"));
    assert!(system.contains("=== src/billing.py ===\ndef charge_invoice"));
    assert!(!system.contains("=== README.md ==="));

    let requests = chat.requests.lock();
    let (role, messages) = requests.last().unwrap();
    assert_eq!(*role, ModelRole::Code);
    assert!(messages
        .last()
        .unwrap()
        .content
        .starts_with("Development Task: add a discount code"));
}

#[tokio::test]
async fn test_metadata_reload_reuses_summaries() {
    let chat = Arc::new(RoutingChat::default());
    let state = state(StoreKind::Metadata, chat.clone());
    let checkout = sample_checkout();
    ingest_checkout(&state, "c1", "u", "shop", checkout.path())
        .await
        .unwrap();
    write(checkout.path(), "README.md", b"# Shop\n\nNow with docs.\n");
    ingest_checkout(&state, "c1", "u", "shop", checkout.path())
        .await
        .unwrap();

    // Only the changed file is summarised again
    assert_eq!(chat.requests.lock().len(), EXPECTED_FILES.len() + 1);
}

#[tokio::test]
async fn test_reingest_replaces_instead_of_appending() {
    let chat = Arc::new(RoutingChat::default());
    let state = state(StoreKind::Vector, chat.clone());
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "notes.md", b"the only note");

    for _ in 0..3 {
        ingest_checkout(&state, "c1", "u", "notes", dir.path())
            .await
            .unwrap();
    }
    answer_chat(&state, "c1", "note", "").await.unwrap();
    let system = chat.last_system_prompt();
    assert_eq!(system.matches("File: notes.md").count(), 1);
}

#[tokio::test]
async fn test_reingest_with_new_content() {
    let chat = Arc::new(RoutingChat::default());
    let state = state(StoreKind::Flat, chat);
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "old.py", b"x = 1");
    ingest_checkout(&state, "c1", "u", "r", dir.path()).await.unwrap();

    std::fs::remove_file(dir.path().join("old.py")).unwrap();
    write(dir.path(), "new.py", b"y = 2");
    ingest_checkout(&state, "c1", "u", "r", dir.path()).await.unwrap();

    assert_eq!(list_files(&state, "c1"), vec!["new.py"]);
    assert_eq!(state.sessions.len(), 1);
}

#[tokio::test]
async fn test_sessions_do_not_see_each_other() {
    for kind in [StoreKind::Vector, StoreKind::Flat] {
        let chat = Arc::new(RoutingChat::default());
        let state = state(kind, chat.clone());

        let a = tempfile::tempdir().unwrap();
        write(a.path(), "alpha.py", b"def alpha_only():\n    pass\n");
        let b = tempfile::tempdir().unwrap();
        write(b.path(), "beta.py", b"def beta_only():\n    pass\n");

        ingest_checkout(&state, "a", "u", "a", a.path()).await.unwrap();
        ingest_checkout(&state, "b", "u", "b", b.path()).await.unwrap();

        answer_chat(&state, "a", "beta_only", "").await.unwrap();
        let system = chat.last_system_prompt();
        assert!(system.contains("alpha_only"), "{kind}");
        assert!(!system.contains("beta_only"), "{kind}");

        assert_eq!(list_files(&state, "a"), vec!["alpha.py"]);
        assert_eq!(list_files(&state, "b"), vec!["beta.py"]);
    }
}

#[tokio::test]
async fn test_chat_before_load_fails_for_every_store() {
    for kind in [StoreKind::Vector, StoreKind::Flat, StoreKind::Metadata] {
        let state = state(kind, Arc::new(RoutingChat::default()));
        let err = answer_chat(&state, "missing", "hello?", "").await.unwrap_err();
        assert!(matches!(err, AppError::NotLoaded), "{kind}");
        assert!(list_files(&state, "missing").is_empty());
    }
}

#[tokio::test]
async fn test_concurrent_loads_of_one_session_settle_on_one_generation() {
    let state = state(StoreKind::Vector, Arc::new(RoutingChat::default()));
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "lib.js", b"export function shared() {}\n");

    let mut handles = Vec::new();
    for _ in 0..4 {
        let state = state.clone();
        let path = dir.path().to_path_buf();
        handles.push(tokio::spawn(async move {
            ingest_checkout(&state, "c1", "u", "r", &path).await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    assert_eq!(state.sessions.len(), 1);
    answer_chat(&state, "c1", "shared", "").await.unwrap();
}

#[tokio::test]
async fn test_cancelled_load_leaves_no_vectors_behind() {
    let config = Config {
        store: StoreKind::Vector,
        ..Config::default()
    };
    let index = Arc::new(VectorIndex::new(
        Arc::new(StallingEmbedder::default()),
        config.max_chunk_size,
        config.top_k,
        MarkerTable::default(),
    ));
    let state = AppState::with_store(config, index.clone(), Arc::new(RoutingChat::default()));

    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "a.py", b"def first():\n    pass\n");
    write(dir.path(), "b.py", b"def second():\n    pass\n");

    // The client goes away while the second file is still being embedded
    let load = ingest_checkout(&state, "c1", "u", "r", dir.path());
    assert!(tokio::time::timeout(Duration::from_millis(200), load)
        .await
        .is_err());

    state.sweep_expired();
    assert!(state.sessions.is_empty());
    assert_eq!(index.collection().session_entry_count("c1"), 0);
    assert_eq!(index.collection().entry_count(), 0);
}
