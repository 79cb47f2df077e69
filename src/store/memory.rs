use super::{read_document, write_atomic};
use crate::error::StoreError;
use std::collections::BTreeMap;
use std::path::PathBuf;
use tokio::sync::Mutex;

/// Key→text memory map, persisted as one JSON document and rewritten
/// wholesale on every mutation.
pub struct MemoryStore {
    path: PathBuf,
    memories: Mutex<BTreeMap<String, String>>,
}

impl MemoryStore {
    pub fn open(path: PathBuf) -> anyhow::Result<Self> {
        let memories = read_document(&path)?.unwrap_or_default();

        Ok(Self {
            path,
            memories: Mutex::new(memories),
        })
    }

    /// Create or overwrite a memory entry.
    pub async fn write(&self, id: &str, content: &str) -> anyhow::Result<()> {
        let mut memories = self.memories.lock().await;
        memories.insert(id.to_string(), content.to_string());
        self.persist(&memories).await
    }

    /// Remove an entry. Returns whether it existed.
    pub async fn delete(&self, id: &str) -> anyhow::Result<bool> {
        let mut memories = self.memories.lock().await;
        let existed = memories.remove(id).is_some();
        if existed {
            self.persist(&memories).await?;
        }
        Ok(existed)
    }

    /// One `id: content` line per entry, for the system prompt.
    pub async fn list_all(&self) -> String {
        let memories = self.memories.lock().await;
        if memories.is_empty() {
            return "No memories stored".to_string();
        }
        memories
            .iter()
            .map(|(id, content)| format!("{id}: {content}"))
            .collect::<Vec<_>>()
            .join("\n")
    }

    async fn persist(&self, memories: &BTreeMap<String, String>) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(memories)?;
        write_atomic(&self.path, &json)
            .await
            .map_err(|e| StoreError::Persist {
                path: self.path.display().to_string(),
                message: format!("{e:#}"),
            })?;
        Ok(())
    }
}
