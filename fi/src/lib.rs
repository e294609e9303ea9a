//! FileIndex - git-repository file indexer
//!
//! Walks a repository and produces the global file→metadata map consumed by
//! the taskweave Memory System. The index stores one unstructured metadata
//! string per file - never file contents. Readers treat an index as an
//! immutable snapshot; writers replace it in bulk.
//!
//! # Example
//!
//! ```ignore
//! use fileindex::{GlobalIndex, IndexOptions, index_repository};
//!
//! let index = index_repository("/path/to/repo", &IndexOptions::default())?;
//! index.save("/tmp/index.json")?;
//! println!("{}", index.format_for_matching());
//! ```

pub mod cli;
mod indexer;

pub use indexer::{IndexOptions, index_repository};

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Errors that can occur while building or loading an index
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("Not a directory: {path}")]
    NotADirectory { path: PathBuf },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Walk error: {0}")]
    Walk(#[from] walkdir::Error),
}

/// Global file→metadata map
///
/// Keys are absolute file paths; values are one-line unstructured metadata
/// strings. Ordered so that `format_for_matching` output is deterministic.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct GlobalIndex {
    entries: BTreeMap<PathBuf, String>,
}

impl GlobalIndex {
    /// Create an empty index
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a single entry
    pub fn insert(&mut self, path: impl Into<PathBuf>, metadata: impl Into<String>) {
        self.entries.insert(path.into(), metadata.into());
    }

    /// Look up metadata for a path
    pub fn get(&self, path: &Path) -> Option<&str> {
        self.entries.get(path).map(String::as_str)
    }

    /// Number of indexed files
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when no files are indexed
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over (path, metadata) pairs in path order
    pub fn iter(&self) -> impl Iterator<Item = (&PathBuf, &str)> {
        self.entries.iter().map(|(p, m)| (p, m.as_str()))
    }

    /// All indexed paths in order
    pub fn paths(&self) -> Vec<PathBuf> {
        self.entries.keys().cloned().collect()
    }

    /// Absorb another index, replacing overlapping entries
    pub fn merge(&mut self, other: GlobalIndex) {
        debug!(incoming = other.len(), "GlobalIndex::merge: called");
        self.entries.extend(other.entries);
    }

    /// Render the prompt-ready listing used by associative matching
    ///
    /// One line per file: `<path>: <metadata>`. Paths only, never contents.
    pub fn format_for_matching(&self) -> String {
        let mut out = String::new();
        for (path, metadata) in &self.entries {
            out.push_str(&format!("{}: {}\n", path.display(), metadata));
        }
        out
    }

    /// Load an index from a JSON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, IndexError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Write the index to a JSON file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), IndexError> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path.as_ref(), content)?;
        Ok(())
    }
}

impl FromIterator<(PathBuf, String)> for GlobalIndex {
    fn from_iter<T: IntoIterator<Item = (PathBuf, String)>>(iter: T) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}
