pub mod memory;
pub mod tasks;

pub use memory::MemoryStore;
pub use tasks::{DueTask, RepeatPolicy, TaskRecord, TaskStore};

use crate::error::StoreError;
use anyhow::Context;
use std::path::Path;

/// Load a JSON store document. Returns `None` when the file does not exist
/// yet; read and parse failures surface as [`StoreError::Read`].
pub(crate) fn read_document<T>(path: &Path) -> Result<Option<T>, StoreError>
where
    T: serde::de::DeserializeOwned,
{
    if !path.exists() {
        return Ok(None);
    }
    let raw = std::fs::read_to_string(path).map_err(|e| StoreError::Read {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;
    let document = serde_json::from_str(&raw).map_err(|e| StoreError::Read {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;
    Ok(Some(document))
}

/// Rewrite a store document atomically: write to a sibling temp file, then
/// rename over the target. A crash mid-write leaves the previous document
/// intact.
pub(crate) async fn write_atomic(path: &Path, content: &str) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("failed creating store directory: {}", parent.display()))?;
    }

    let temp_path = path.with_extension("tmp");
    tokio::fs::write(&temp_path, content)
        .await
        .with_context(|| format!("failed writing temp file: {}", temp_path.display()))?;

    if let Err(rename_error) = tokio::fs::rename(&temp_path, path).await {
        let _ = tokio::fs::remove_file(&temp_path).await;
        return Err(rename_error).with_context(|| {
            format!("failed replacing store file atomically: {}", path.display())
        });
    }

    Ok(())
}
