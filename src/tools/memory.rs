use super::traits::{require_str, Tool, ToolResult};
use crate::store::MemoryStore;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;

/// Persistent key→text notes about the user. Read access happens through
/// the system prompt, so the tool only needs write and delete.
pub struct MemoryTool {
    store: Arc<MemoryStore>,
}

impl MemoryTool {
    pub fn new(store: Arc<MemoryStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for MemoryTool {
    fn name(&self) -> &str {
        "memory"
    }

    fn description(&self) -> &str {
        "Store or delete long-term memories about the user. \
         Existing memories are already visible in your context."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "mode": {
                    "type": "string",
                    "enum": ["w", "d"],
                    "description": "'w' to write or overwrite, 'd' to delete"
                },
                "id": {
                    "type": "string",
                    "description": "Short snake_case identifier for the memory"
                },
                "content": {
                    "type": "string",
                    "description": "Memory text, required for mode 'w'"
                }
            },
            "required": ["mode", "id"]
        })
    }

    async fn execute(&self, args: Value) -> anyhow::Result<ToolResult> {
        let mode = require_str(&args, "mode")?;
        let id = require_str(&args, "id")?;

        match mode {
            "w" => {
                let content = require_str(&args, "content")?;
                self.store.write(id, content).await?;
                Ok(ToolResult::ok(format!("Memory '{id}' saved")))
            }
            "d" => {
                if self.store.delete(id).await? {
                    Ok(ToolResult::ok(format!("Memory '{id}' deleted")))
                } else {
                    Ok(ToolResult::err(format!("No memory with id '{id}'")))
                }
            }
            other => Ok(ToolResult::err(format!(
                "Invalid mode '{other}': expected 'w' or 'd'"
            ))),
        }
    }
}
