//! Dataset enumeration
//!
//! Walks the configured dataset root and returns every file whose
//! extension is in the supported set, sorted by path so runs are
//! deterministic. Unreadable subdirectories are logged and skipped
//! rather than failing the whole scan.

use anyhow::Result;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Recursive, extension-filtered file scanner.
#[derive(Debug, Clone)]
pub struct DatasetScanner {
    root: PathBuf,
    extensions: HashSet<String>,
}

impl DatasetScanner {
    /// `extensions` are matched case-insensitively, with or without a
    /// leading dot (`"jpg"` and `".JPG"` are the same filter).
    pub fn new(root: impl Into<PathBuf>, extensions: &[String]) -> Self {
        Self {
            root: root.into(),
            extensions: extensions
                .iter()
                .map(|ext| ext.trim_start_matches('.').to_lowercase())
                .collect(),
        }
    }

    /// Enumerate matching files under the root, sorted.
    pub async fn scan(&self) -> Result<Vec<PathBuf>> {
        let mut found = Vec::new();
        let mut dir_stack = vec![self.root.clone()];

        while let Some(current_dir) = dir_stack.pop() {
            let mut read_dir = match tokio::fs::read_dir(&current_dir).await {
                Ok(rd) => rd,
                Err(e) => {
                    warn!("Failed to read directory {}: {}", current_dir.display(), e);
                    continue;
                }
            };

            while let Some(entry) = read_dir.next_entry().await? {
                let path = entry.path();
                let file_type = match entry.file_type().await {
                    Ok(ft) => ft,
                    Err(e) => {
                        warn!("Failed to stat {}: {}", path.display(), e);
                        continue;
                    }
                };

                if file_type.is_dir() {
                    dir_stack.push(path);
                } else if file_type.is_file() && self.matches(&path) {
                    found.push(path);
                }
            }
        }

        found.sort();
        Ok(found)
    }

    fn matches(&self, path: &Path) -> bool {
        path.extension()
            .map(|ext| self.extensions.contains(&ext.to_string_lossy().to_lowercase()))
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_scan_filters_and_sorts() -> Result<()> {
        let dir = tempdir()?;
        tokio::fs::write(dir.path().join("b.jpg"), b"x").await?;
        tokio::fs::write(dir.path().join("a.PNG"), b"x").await?;
        tokio::fs::write(dir.path().join("notes.txt"), b"x").await?;

        let sub = dir.path().join("nested");
        tokio::fs::create_dir(&sub).await?;
        tokio::fs::write(sub.join("c.jpeg"), b"x").await?;

        let scanner = DatasetScanner::new(
            dir.path(),
            &["jpg".to_string(), "jpeg".to_string(), ".png".to_string()],
        );
        let found = scanner.scan().await?;

        let names: Vec<String> = found
            .iter()
            .map(|p| {
                p.strip_prefix(dir.path())
                    .unwrap()
                    .to_string_lossy()
                    .to_string()
            })
            .collect();
        assert_eq!(names, vec!["a.PNG", "b.jpg", "nested/c.jpeg"]);
        Ok(())
    }

    #[tokio::test]
    async fn test_scan_empty_directory_yields_nothing() -> Result<()> {
        let dir = tempdir()?;
        let scanner = DatasetScanner::new(dir.path(), &["jpg".to_string()]);
        assert!(scanner.scan().await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_files_without_extension_are_skipped() -> Result<()> {
        let dir = tempdir()?;
        tokio::fs::write(dir.path().join("README"), b"x").await?;
        let scanner = DatasetScanner::new(dir.path(), &["jpg".to_string()]);
        assert!(scanner.scan().await?.is_empty());
        Ok(())
    }
}
