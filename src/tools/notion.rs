use super::traits::{optional_str, require_str, Tool, ToolResult};
use crate::notion::NotionClient;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;

/// Notion workspace access. Structured payloads (filters, properties,
/// content blocks) travel as JSON strings so the schema stays flat.
pub struct NotionTool {
    client: Option<Arc<NotionClient>>,
}

impl NotionTool {
    pub fn new(client: Option<Arc<NotionClient>>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Tool for NotionTool {
    fn name(&self) -> &str {
        "notion"
    }

    fn description(&self) -> &str {
        "Work with the user's Notion workspace: list configured databases, \
         create pages, query databases, and read or edit page content."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "mode": {
                    "type": "string",
                    "enum": [
                        "list_databases", "create_page", "query_db",
                        "add_page_content", "get_page_content", "update_page_props"
                    ]
                },
                "page_title": {"type": "string"},
                "database_name": {
                    "type": "string",
                    "description": "Friendly database name from list_databases"
                },
                "parent_page_id": {"type": "string"},
                "page_id": {"type": "string"},
                "filter_json": {
                    "type": "string",
                    "description": "Notion filter object as a JSON string"
                },
                "sorts_json": {"type": "string"},
                "properties_json": {
                    "type": "string",
                    "description": "Notion properties object as a JSON string"
                },
                "content_blocks_json": {
                    "type": "string",
                    "description": "Array of Notion block objects as a JSON string"
                }
            },
            "required": ["mode"]
        })
    }

    async fn execute(&self, args: Value) -> anyhow::Result<ToolResult> {
        let Some(ref client) = self.client else {
            return Ok(ToolResult::err(
                "Notion is not configured: set [notion].api_token",
            ));
        };
        let mode = require_str(&args, "mode")?;

        let reply = match mode {
            "list_databases" => Ok(client.list_databases()),
            "create_page" => {
                client
                    .create_page(
                        require_str(&args, "page_title")?,
                        optional_str(&args, "database_name"),
                        optional_str(&args, "parent_page_id"),
                        optional_str(&args, "properties_json"),
                        optional_str(&args, "content_blocks_json"),
                    )
                    .await
            }
            "query_db" => {
                client
                    .query_database(
                        require_str(&args, "database_name")?,
                        optional_str(&args, "filter_json"),
                        optional_str(&args, "sorts_json"),
                    )
                    .await
            }
            "add_page_content" => {
                client
                    .add_page_content(
                        require_str(&args, "page_id")?,
                        require_str(&args, "content_blocks_json")?,
                    )
                    .await
            }
            "get_page_content" => client.get_page_content(require_str(&args, "page_id")?).await,
            "update_page_props" => {
                client
                    .update_page_properties(
                        require_str(&args, "page_id")?,
                        require_str(&args, "properties_json")?,
                    )
                    .await
            }
            other => return Ok(ToolResult::err(format!("Invalid Notion tool mode: {other}"))),
        };

        Ok(match reply {
            Ok(text) => ToolResult::ok(text),
            Err(e) => ToolResult::err(format!("{e:#}")),
        })
    }
}
