//! Repository walker producing per-file metadata strings

use std::path::Path;

use tracing::{debug, info};
use walkdir::WalkDir;

use crate::{GlobalIndex, IndexError};

/// Directories never descended into
const SKIP_DIRS: &[&str] = &[".git", "target", "node_modules", "__pycache__", ".venv"];

/// Options controlling a repository walk
#[derive(Debug, Clone)]
pub struct IndexOptions {
    /// Files larger than this are skipped entirely
    pub max_file_bytes: u64,
    /// Include dotfiles and dot-directories (other than the skip list)
    pub include_hidden: bool,
}

impl Default for IndexOptions {
    fn default() -> Self {
        Self {
            max_file_bytes: 1024 * 1024,
            include_hidden: false,
        }
    }
}

/// Walk a repository and build a [`GlobalIndex`]
///
/// Keys are absolute paths. Binary files (NUL byte in the first 8KB) and
/// files over `max_file_bytes` are skipped. Metadata is a one-line summary:
/// extension, line count, size, and the first non-empty line of the file.
pub fn index_repository(root: impl AsRef<Path>, options: &IndexOptions) -> Result<GlobalIndex, IndexError> {
    let root = root.as_ref();
    if !root.is_dir() {
        return Err(IndexError::NotADirectory { path: root.to_path_buf() });
    }

    let root = root.canonicalize()?;
    info!(root = %root.display(), "index_repository: walking");

    let mut index = GlobalIndex::new();

    let walker = WalkDir::new(&root).into_iter().filter_entry(|entry| {
        let name = entry.file_name().to_string_lossy();
        if SKIP_DIRS.contains(&name.as_ref()) {
            return false;
        }
        if !options.include_hidden && name.starts_with('.') && entry.depth() > 0 {
            return false;
        }
        true
    });

    for entry in walker {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                debug!(error = %e, "index_repository: skipping unreadable entry");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }

        let meta = entry.metadata()?;
        if meta.len() > options.max_file_bytes {
            debug!(path = %entry.path().display(), size = meta.len(), "index_repository: too large, skipped");
            continue;
        }

        let bytes = match std::fs::read(entry.path()) {
            Ok(b) => b,
            Err(e) => {
                debug!(path = %entry.path().display(), error = %e, "index_repository: unreadable, skipped");
                continue;
            }
        };
        if looks_binary(&bytes) {
            continue;
        }

        let metadata = describe_file(entry.path(), &bytes);
        index.insert(entry.path().to_path_buf(), metadata);
    }

    info!(files = index.len(), "index_repository: done");
    Ok(index)
}

/// NUL byte in the first 8KB marks a file as binary
fn looks_binary(bytes: &[u8]) -> bool {
    bytes.iter().take(8192).any(|&b| b == 0)
}

/// Build the one-line metadata summary for a file
fn describe_file(path: &Path, bytes: &[u8]) -> String {
    let content = String::from_utf8_lossy(bytes);
    let line_count = content.lines().count();
    let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("none");

    let headline = content
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .unwrap_or("")
        .trim_start_matches(['/', '#', '*', '-', '!', ' '])
        .trim();

    let mut summary = format!("{} file, {} lines, {} bytes", extension, line_count, bytes.len());
    if !headline.is_empty() {
        let headline: String = headline.chars().take(120).collect();
        summary.push_str(&format!("; {}", headline));
    }
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_index_repository_basic() {
        let temp = tempdir().unwrap();
        fs::write(temp.path().join("auth.py"), "# login flow\ndef login():\n    pass\n").unwrap();
        fs::write(temp.path().join("cache.rs"), "//! lru cache\npub struct Cache;\n").unwrap();

        let index = index_repository(temp.path(), &IndexOptions::default()).unwrap();

        assert_eq!(index.len(), 2);
        let listing = index.format_for_matching();
        assert!(listing.contains("auth.py"));
        assert!(listing.contains("login flow"));
        assert!(listing.contains("lru cache"));
    }

    #[test]
    fn test_index_repository_skips_git_dir() {
        let temp = tempdir().unwrap();
        fs::create_dir(temp.path().join(".git")).unwrap();
        fs::write(temp.path().join(".git").join("HEAD"), "ref: refs/heads/main").unwrap();
        fs::write(temp.path().join("main.rs"), "fn main() {}").unwrap();

        let index = index_repository(temp.path(), &IndexOptions::default()).unwrap();

        assert_eq!(index.len(), 1);
        assert!(!index.format_for_matching().contains(".git"));
    }

    #[test]
    fn test_index_repository_skips_binary() {
        let temp = tempdir().unwrap();
        fs::write(temp.path().join("blob.bin"), [0u8, 1, 2, 3]).unwrap();
        fs::write(temp.path().join("text.txt"), "hello").unwrap();

        let index = index_repository(temp.path(), &IndexOptions::default()).unwrap();

        assert_eq!(index.len(), 1);
        assert!(index.format_for_matching().contains("text.txt"));
    }

    #[test]
    fn test_index_repository_skips_large_files() {
        let temp = tempdir().unwrap();
        fs::write(temp.path().join("big.txt"), "x".repeat(2048)).unwrap();
        fs::write(temp.path().join("small.txt"), "ok").unwrap();

        let options = IndexOptions {
            max_file_bytes: 1024,
            ..Default::default()
        };
        let index = index_repository(temp.path(), &options).unwrap();

        assert_eq!(index.len(), 1);
        assert!(index.format_for_matching().contains("small.txt"));
    }

    #[test]
    fn test_index_repository_rejects_file_root() {
        let temp = tempdir().unwrap();
        let file = temp.path().join("a.txt");
        fs::write(&file, "x").unwrap();

        let result = index_repository(&file, &IndexOptions::default());
        assert!(matches!(result, Err(IndexError::NotADirectory { .. })));
    }

    #[test]
    fn test_describe_file_headline() {
        let summary = describe_file(Path::new("/r/mod.rs"), b"//! Cache layer\nstruct C;\n");
        assert!(summary.starts_with("rs file, 2 lines"));
        assert!(summary.contains("Cache layer"));
    }
}
