//! Repository checkout and file classification.

mod clone;
pub mod files;

pub use clone::{clone_repo, validate_repo_url};
pub use files::walk_repo_files;
