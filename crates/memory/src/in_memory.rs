//! In-memory fact store: tests and ephemeral sessions.

use async_trait::async_trait;
use deskhand_core::error::MemoryError;
use deskhand_core::memory::{MemoryBackend, MemoryEntry, MemoryQuery};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::keyword;

#[derive(Default)]
pub struct InMemoryBackend {
    entries: RwLock<Vec<MemoryEntry>>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MemoryBackend for InMemoryBackend {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn store(&self, mut entry: MemoryEntry) -> Result<String, MemoryError> {
        if entry.id.is_empty() {
            entry.id = Uuid::new_v4().to_string();
        }
        let id = entry.id.clone();
        self.entries.write().await.push(entry);
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
        Ok(entries.len() < len_before)
    }

    async fn count(&self) -> Result<usize, MemoryError> {
        Ok(self.entries.read().await.len())
    }

    async fn clear(&self) -> Result<(), MemoryError> {
        self.entries.write().await.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn store_assigns_id_and_search_finds_it() {
        let mem = InMemoryBackend::new();
        let id = mem.store(MemoryEntry::new("Sister's birthday is 12 March")).await.unwrap();
        assert!(!id.is_empty());

        let results = mem.search(MemoryQuery::new("birthday")).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, id);
    }

    #[tokio::test]
    async fn delete_and_clear() {
        let mem = InMemoryBackend::new();
        let id = mem.store(MemoryEntry::new("To be deleted")).await.unwrap();
        mem.store(MemoryEntry::new("Kept")).await.unwrap();

        assert!(mem.delete(&id).await.unwrap());
        assert!(!mem.delete(&id).await.unwrap());
        assert_eq!(mem.count().await.unwrap(), 1);

        mem.clear().await.unwrap();
        assert_eq!(mem.count().await.unwrap(), 0);
    }
}
