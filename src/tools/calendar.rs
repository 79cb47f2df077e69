use super::traits::{optional_str, require_str, Tool, ToolResult};
use crate::calendar::CalendarClient;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;

/// Google Calendar access. Registered even when the collaborator is not
/// configured, so the model gets a clear answer instead of a missing tool.
pub struct CalendarTool {
    client: Option<Arc<CalendarClient>>,
}

impl CalendarTool {
    pub fn new(client: Option<Arc<CalendarClient>>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Tool for CalendarTool {
    fn name(&self) -> &str {
        "calendar"
    }

    fn description(&self) -> &str {
        "Read, create, update, or delete events on the user's calendar. \
         Times are in the user's time zone, format YYYY-MM-DD HH:MM:SS."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "mode": {
                    "type": "string",
                    "enum": ["r", "w", "d"],
                    "description": "'r' to read, 'w' to create or update, 'd' to delete"
                },
                "range": {
                    "type": "integer",
                    "description": "For mode 'r': days ahead to list; negative looks back"
                },
                "event_id": {
                    "type": "string",
                    "description": "Existing event id, for update or delete"
                },
                "title": {"type": "string"},
                "description": {"type": "string"},
                "start_time": {"type": "string"},
                "end_time": {"type": "string"}
            },
            "required": ["mode"]
        })
    }

    async fn execute(&self, args: Value) -> anyhow::Result<ToolResult> {
        let Some(ref client) = self.client else {
            return Ok(ToolResult::err(
                "Calendar is not configured: set [calendar].api_token",
            ));
        };
        let mode = require_str(&args, "mode")?;

        let reply = match mode {
            "r" => {
                let range = args.get("range").and_then(Value::as_i64).unwrap_or(10);
                client.list_events(range).await
            }
            "w" => {
                let title = require_str(&args, "title")?;
                let start_time = require_str(&args, "start_time")?;
                let end_time = require_str(&args, "end_time")?;
                let description = optional_str(&args, "description").unwrap_or("");
                let event_id = optional_str(&args, "event_id").filter(|id| !id.is_empty());
                client
                    .upsert_event(event_id, title, description, start_time, end_time)
                    .await
            }
            "d" => client.delete_event(require_str(&args, "event_id")?).await,
            other => {
                return Ok(ToolResult::err(format!(
                    "Invalid mode '{other}': expected 'r', 'w' or 'd'"
                )));
            }
        };

        // API and conversion failures go back to the model as text.
        Ok(match reply {
            Ok(text) => ToolResult::ok(text),
            Err(e) => ToolResult::err(format!("{e:#}")),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unconfigured_collaborator_reports_not_configured() {
        let tool = CalendarTool::new(None);
        let result = tool.execute(json!({"mode": "r"})).await.unwrap();
        assert!(!result.success);
        assert!(result.error.unwrap().contains("not configured"));
    }

    #[tokio::test]
    async fn write_mode_requires_times() {
        let client = Arc::new(
            CalendarClient::new("t", "primary", chrono_tz::UTC).unwrap(),
        );
        let tool = CalendarTool::new(Some(client));
        let err = tool
            .execute(json!({"mode": "w", "title": "Lunch"}))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("'start_time'"));
    }
}
