//! File-backed fact store: one JSON-encoded `MemoryEntry` per line.
//!
//! Entries are loaded once on open and the whole file is rewritten on every
//! mutation (write to a sibling temp file, then rename). Corrupted lines
//! are skipped with a warning rather than failing the load.

use async_trait::async_trait;
use deskhand_core::error::MemoryError;
use deskhand_core::memory::{MemoryBackend, MemoryEntry, MemoryQuery};
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::keyword;

pub struct FileBackend {
    path: PathBuf,
    entries: RwLock<Vec<MemoryEntry>>,
}

impl FileBackend {
    /// Open (or lazily create) the store at `path`.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let entries = load_jsonl(&path);
        debug!(path = %path.display(), count = entries.len(), "File memory backend loaded");
        Self {
            path,
            entries: RwLock::new(entries),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Rewrite the file from `entries`. Caller holds the write lock.
    async fn flush(&self, entries: &[MemoryEntry]) -> Result<(), MemoryError> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| MemoryError::Storage(format!("create memory directory: {e}")))?;
        }

        let mut content = String::new();
        for entry in entries {
            let line = serde_json::to_string(entry)
                .map_err(|e| MemoryError::Storage(format!("serialize memory entry: {e}")))?;
            content.push_str(&line);
            content.push('\n');
        }

        let tmp = self.path.with_extension("jsonl.tmp");
        tokio::fs::write(&tmp, content)
            .await
            .map_err(|e| MemoryError::Storage(format!("write memory file: {e}")))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| MemoryError::Storage(format!("replace memory file: {e}")))?;
        Ok(())
    }
}

fn load_jsonl(path: &Path) -> Vec<MemoryEntry> {
    let Ok(content) = std::fs::read_to_string(path) else {
        return Vec::new();
    };

    content
        .lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| match serde_json::from_str::<MemoryEntry>(line) {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!(error = %e, "Skipping corrupted memory entry");
                None
            }
        })
        .collect()
}

#[async_trait]
impl MemoryBackend for FileBackend {
    fn name(&self) -> &str {
        "file"
    }

    async fn store(&self, mut entry: MemoryEntry) -> Result<String, MemoryError> {
        if entry.id.is_empty() {
            entry.id = Uuid::new_v4().to_string();
        }
        let id = entry.id.clone();
        let mut entries = self.entries.write().await;
        entries.push(entry);
        self.flush(&entries).await?;
        Ok(id)
    }

    async fn search(&self, query: MemoryQuery) -> Result<Vec<MemoryEntry>, MemoryError> {
        let entries = self.entries.read().await;
        Ok(keyword::rank(entries.iter(), &query))
    }

    async fn delete(&self, id: &str) -> Result<bool, MemoryError> {
        let mut entries = self.entries.write().await;
        let len_before = entries.len();
        entries.retain(|e| e.id != id);
        let removed = entries.len() < len_before;
        if removed {
            self.flush(&entries).await?;
        }
        Ok(removed)
    }

    async fn count(&self) -> Result<usize, MemoryError> {
        Ok(self.entries.read().await.len())
    }

    async fn clear(&self) -> Result<(), MemoryError> {
        let mut entries = self.entries.write().await;
        entries.clear();
        self.flush(&entries).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("memory.jsonl");

        let mem = FileBackend::open(&path);
        mem.store(MemoryEntry::new("Allergic to peanuts")).await.unwrap();
        mem.store(MemoryEntry::new("Prefers window seats")).await.unwrap();
        drop(mem);

        let reopened = FileBackend::open(&path);
        assert_eq!(reopened.count().await.unwrap(), 2);
        let hits = reopened.search(MemoryQuery::new("peanuts")).await.unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[tokio::test]
    async fn corrupted_lines_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("memory.jsonl");
        let good = serde_json::to_string(&MemoryEntry::new("valid fact")).unwrap();
        std::fs::write(&path, format!("{good}\n{{not json\n\n")).unwrap();

        let mem = FileBackend::open(&path);
        assert_eq!(mem.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn delete_and_clear_rewrite_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("memory.jsonl");
        let mem = FileBackend::open(&path);
        let id = mem.store(MemoryEntry::new("temporary")).await.unwrap();
        mem.store(MemoryEntry::new("permanent")).await.unwrap();

        assert!(mem.delete(&id).await.unwrap());
        let on_disk = std::fs::read_to_string(&path).unwrap();
        assert!(!on_disk.contains("temporary"));
        assert!(on_disk.contains("permanent"));

        mem.clear().await.unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "");
    }
}
