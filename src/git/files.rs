//! File classification: which files in a checkout are worth ingesting.
//!
//! Eligibility is decided from the path alone (extension allow-list plus a
//! few well-known bare file names). Size and a 1 KiB UTF-8 probe are checked
//! separately, and ignored directories are pruned before the walker descends.

use std::fs::File;
use std::io::Read;
use std::path::Path;
use walkdir::WalkDir;

use crate::models::FileRecord;

/// Bytes read from the start of a file to decide whether it is text.
const TEXT_PROBE_BYTES: usize = 1024;

const IGNORED_DIRECTORIES: &[&str] = &[
    ".git",
    "__pycache__",
    "node_modules",
    "venv",
    ".venv",
    "env",
    "dist",
    "build",
    "target",
    "bin",
    "obj",
    "out",
    "coverage",
    ".idea",
    ".vscode",
    ".next",
    ".nuxt",
];

const ELIGIBLE_FILE_NAMES: &[&str] = &[
    "Dockerfile",
    "docker-compose.yml",
    "docker-compose.yaml",
    ".dockerignore",
];

/// Is `name` a directory the walker never descends into?
pub fn is_ignored_dir(name: &str) -> bool {
    IGNORED_DIRECTORIES.contains(&name)
}

/// Is this path an eligible source/config/doc file? Depends on the path only.
pub fn is_eligible(path: &Path) -> bool {
    let file_name = path
        .file_name()
        .map(|f| f.to_string_lossy())
        .unwrap_or_default();

    if ELIGIBLE_FILE_NAMES.contains(&file_name.as_ref()) {
        return true;
    }

    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();

    matches!(
        ext.as_str(),
        "py" | "java"
            | "cpp"
            | "c"
            | "cs"
            | "go"
            | "rb"
            | "php"
            | "js"
            | "jsx"
            | "ts"
            | "tsx"
            | "vue"
            | "svelte"
            | "html"
            | "css"
            | "scss"
            | "sass"
            | "txt"
            | "sh"
            | "bash"
            | "json"
            | "yaml"
            | "yml"
            | "toml"
            | "ini"
            | "tf"
            | "hcl"
            | "md"
    )
}

/// True when the file exceeds `max_size` bytes or its first KiB is not UTF-8.
/// Unreadable files count as binary.
pub fn is_too_large_or_binary(path: &Path, max_size: u64) -> bool {
    match std::fs::metadata(path) {
        Ok(meta) if meta.len() > max_size => return true,
        Ok(_) => {}
        Err(_) => return true,
    }

    let mut probe = Vec::with_capacity(TEXT_PROBE_BYTES);
    let read = File::open(path)
        .and_then(|f| f.take(TEXT_PROBE_BYTES as u64).read_to_end(&mut probe));
    if read.is_err() {
        return true;
    }

    match std::str::from_utf8(&probe) {
        Ok(_) => false,
        // The probe may end in the middle of a multi-byte character.
        Err(e) => e.error_len().is_some(),
    }
}

/// Walk a checkout and return every eligible, non-empty text file.
///
/// Entries are visited in file-name order so downstream concatenation is
/// deterministic. Unreadable or undecodable files are skipped.
pub fn walk_repo_files(repo_dir: &Path, max_file_size: u64) -> Vec<FileRecord> {
    let mut files = Vec::new();

    for entry in WalkDir::new(repo_dir)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| {
            e.depth() == 0
                || !(e.file_type().is_dir() && is_ignored_dir(&e.file_name().to_string_lossy()))
        })
        .filter_map(|e| e.ok())
    {
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        if !is_eligible(path) || is_too_large_or_binary(path, max_file_size) {
            continue;
        }

        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) => {
                tracing::debug!("Skipping unreadable file {}: {e}", path.display());
                continue;
            }
        };
        if content.trim().is_empty() {
            continue;
        }

        let relative = path
            .strip_prefix(repo_dir)
            .unwrap_or(path)
            .to_string_lossy()
            .replace('\\', "/");

        files.push(FileRecord {
            path: relative,
            size: content.len() as u64,
            content,
            metadata: None,
        });
    }

    files
}
