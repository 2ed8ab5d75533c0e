//! Declaration markers that end a chunk.
//!
//! A marker is a plain substring, not a token: a line containing `def `
//! anywhere (including in a comment or string) closes the current chunk.
//! Lists are kept per extension family and can be overridden per extension.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

/// Key used in overrides to replace the fallback list.
pub const FALLBACK_KEY: &str = "*";

/// Markers used for any extension without its own family.
const FALLBACK_MARKERS: &[&str] = &["class ", "def ", "function ", "@app.route", "public class"];

const FAMILIES: &[(&[&str], &[&str])] = &[
    (&["py"], &["class ", "def ", "@app.route", "@router."]),
    (
        &["js", "jsx", "ts", "tsx", "vue", "svelte"],
        &["function ", "class ", "export default"],
    ),
    (
        &["java", "cs"],
        &["public class", "class ", "interface ", "public static"],
    ),
    (&["go"], &["func ", "type "]),
    (&["rb"], &["def ", "class ", "module "]),
    (&["php"], &["function ", "class "]),
    (&["c", "cpp"], &["class ", "struct "]),
    (&["sh", "bash"], &["function "]),
    // Prose and data files only split on size.
    (
        &[
            "md", "txt", "json", "yaml", "yml", "toml", "ini", "html", "css", "scss", "sass",
            "tf", "hcl",
        ],
        &[],
    ),
];

/// Per-extension marker lists with a fallback for unknown extensions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarkerTable {
    by_extension: BTreeMap<String, Vec<String>>,
    fallback: Vec<String>,
}

impl Default for MarkerTable {
    fn default() -> Self {
        let mut by_extension = BTreeMap::new();
        for (extensions, markers) in FAMILIES {
            for ext in *extensions {
                by_extension.insert(
                    ext.to_string(),
                    markers.iter().map(|m| m.to_string()).collect(),
                );
            }
        }
        Self {
            by_extension,
            fallback: FALLBACK_MARKERS.iter().map(|m| m.to_string()).collect(),
        }
    }
}

impl MarkerTable {
    /// Markers that apply to `path`, chosen by its lowercased extension.
    pub fn for_path(&self, path: &str) -> &[String] {
        let ext = Path::new(path)
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase());

        ext.and_then(|ext| self.by_extension.get(&ext))
            .unwrap_or(&self.fallback)
    }

    /// Replace marker lists for the given extensions. The `*` key replaces the fallback.
    pub fn apply_overrides(&mut self, overrides: HashMap<String, Vec<String>>) {
        for (ext, markers) in overrides {
            let ext = ext.trim_start_matches('.').to_lowercase();
            if ext == FALLBACK_KEY {
                self.fallback = markers;
            } else {
                self.by_extension.insert(ext, markers);
            }
        }
    }
}
