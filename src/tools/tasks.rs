use super::traits::{optional_str, require_str, Tool, ToolResult};
use crate::store::tasks::DATETIME_FORMAT;
use crate::store::{RepeatPolicy, TaskRecord, TaskStore};
use async_trait::async_trait;
use chrono::NaiveDateTime;
use serde_json::{json, Value};
use std::sync::Arc;

/// Schedule, inspect, and cancel reminders. Due times are interpreted in
/// the user's configured time zone.
pub struct TasksTool {
    store: Arc<TaskStore>,
}

impl TasksTool {
    pub fn new(store: Arc<TaskStore>) -> Self {
        Self { store }
    }

    async fn read(&self, id: Option<&str>) -> anyhow::Result<ToolResult> {
        if let Some(id) = id.filter(|id| !id.is_empty()) {
            return Ok(match self.store.get(id).await {
                Some(record) => ToolResult::ok(render_task(id, &record)),
                None => ToolResult::err(format!("No task with id '{id}'")),
            });
        }

        let tasks = self.store.list().await;
        if tasks.is_empty() {
            return Ok(ToolResult::ok("No tasks scheduled"));
        }
        let listing = tasks
            .iter()
            .map(|(id, record)| render_task(id, record))
            .collect::<Vec<_>>()
            .join("\n");
        Ok(ToolResult::ok(listing))
    }

    async fn write(&self, args: &Value) -> anyhow::Result<ToolResult> {
        let id = require_str(args, "id")?;
        let instructions = require_str(args, "instructions")?;
        let raw_datetime = require_str(args, "datetime")?;
        let raw_repeat = optional_str(args, "repeat").unwrap_or("never");
        let agent = optional_str(args, "agent").unwrap_or("assistant");

        let Ok(due_at) = NaiveDateTime::parse_from_str(raw_datetime, DATETIME_FORMAT) else {
            return Ok(ToolResult::err(format!(
                "Invalid datetime '{raw_datetime}': expected format {DATETIME_FORMAT}"
            )));
        };
        let Some(repeat) = RepeatPolicy::parse(raw_repeat) else {
            return Ok(ToolResult::err(format!(
                "Invalid repeat '{raw_repeat}': expected one of {}",
                RepeatPolicy::ALL.join(", ")
            )));
        };
        if agent != "assistant" {
            return Ok(ToolResult::err(format!(
                "Unknown agent '{agent}': only 'assistant' is available"
            )));
        }

        let record = TaskRecord {
            instructions: instructions.to_string(),
            due_at,
            repeat,
            agent: agent.to_string(),
        };
        let existed = self.store.write(id, record).await?;
        let verb = if existed { "updated" } else { "scheduled" };
        Ok(ToolResult::ok(format!(
            "Task '{id}' {verb} for {raw_datetime} (repeat: {raw_repeat})"
        )))
    }

    async fn delete(&self, id: &str) -> anyhow::Result<ToolResult> {
        if self.store.delete(id).await? {
            Ok(ToolResult::ok(format!("Task '{id}' deleted")))
        } else {
            Ok(ToolResult::err(format!("No task with id '{id}'")))
        }
    }
}

fn render_task(id: &str, record: &TaskRecord) -> String {
    format!(
        "{id}: {} (due {}, repeat {})",
        record.instructions,
        record.due_at.format(DATETIME_FORMAT),
        record.repeat.as_str()
    )
}

#[async_trait]
impl Tool for TasksTool {
    fn name(&self) -> &str {
        "tasks"
    }

    fn description(&self) -> &str {
        "Schedule future or recurring tasks for yourself, list them, or \
         cancel them. When a task comes due you receive its instructions \
         as a new message."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "mode": {
                    "type": "string",
                    "enum": ["r", "w", "d"],
                    "description": "'r' to read, 'w' to create or overwrite, 'd' to delete"
                },
                "id": {
                    "type": "string",
                    "description": "Task identifier; empty with mode 'r' lists every task"
                },
                "instructions": {
                    "type": "string",
                    "description": "What to do when the task fires, required for mode 'w'"
                },
                "datetime": {
                    "type": "string",
                    "description": "Due time as YYYY-MM-DD HH:MM:SS in the user's time zone"
                },
                "repeat": {
                    "type": "string",
                    "enum": ["never", "daily", "weekly", "biweekly", "monthly", "yearly"],
                    "description": "Repeat policy, defaults to 'never'"
                }
            },
            "required": ["mode"]
        })
    }

    async fn execute(&self, args: Value) -> anyhow::Result<ToolResult> {
        let mode = require_str(&args, "mode")?;
        match mode {
            "r" => self.read(optional_str(&args, "id")).await,
            "w" => self.write(&args).await,
            "d" => self.delete(require_str(&args, "id")?).await,
            other => Ok(ToolResult::err(format!(
                "Invalid mode '{other}': expected 'r', 'w' or 'd'"
            ))),
        }
    }
}
