use super::traits::{require_str, Tool, ToolResult};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::path::PathBuf;
use std::time::Duration;
use tokio::process::Command;
use uuid::Uuid;

const SANDBOX_IMAGE: &str = "python:3.12-slim";
const SANDBOX_MEMORY: &str = "512m";
const SANDBOX_CPUS: &str = "0.5";

/// Run short Python snippets in a throwaway Docker container with no
/// network, a memory cap, and a wall-clock limit.
pub struct AnalysisTool {
    timeout_secs: u64,
}

impl AnalysisTool {
    pub fn new(timeout_secs: u64) -> Self {
        Self { timeout_secs }
    }

    async fn run_sandboxed(&self, code: &str) -> anyhow::Result<ToolResult> {
        let work_dir = std::env::temp_dir().join(format!("pai-analysis-{}", Uuid::new_v4()));
        tokio::fs::create_dir_all(&work_dir).await?;
        tokio::fs::write(work_dir.join("main.py"), code).await?;

        let result = self.run_container(&work_dir).await;
        let _ = tokio::fs::remove_dir_all(&work_dir).await;
        result
    }

    async fn run_container(&self, work_dir: &PathBuf) -> anyhow::Result<ToolResult> {
        let mut command = Command::new("docker");
        command
            .arg("run")
            .arg("--rm")
            .args(["--network", "none"])
            .args(["--memory", SANDBOX_MEMORY])
            .args(["--cpus", SANDBOX_CPUS])
            .args(["-v", &format!("{}:/code:ro", work_dir.display())])
            .arg(SANDBOX_IMAGE)
            .args(["python", "/code/main.py"])
            .kill_on_drop(true);

        let output = match tokio::time::timeout(
            Duration::from_secs(self.timeout_secs),
            command.output(),
        )
        .await
        {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return Ok(ToolResult::err(format!(
                    "Sandbox unavailable: failed to start docker: {e}"
                )));
            }
            // The dropped child is killed; report the limit as text.
            Err(_) => {
                return Ok(ToolResult::err(format!(
                    "Execution timed out after {} seconds",
                    self.timeout_secs
                )));
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();

        if output.status.success() {
            if stdout.is_empty() {
                Ok(ToolResult::ok("(no output)"))
            } else {
                Ok(ToolResult::ok(stdout))
            }
        } else {
            let detail = if stderr.is_empty() { &stdout } else { &stderr };
            Ok(ToolResult::err(format!(
                "Execution failed ({}): {detail}",
                output.status
            )))
        }
    }
}

#[async_trait]
impl Tool for AnalysisTool {
    fn name(&self) -> &str {
        "analysis"
    }

    fn description(&self) -> &str {
        "Execute a Python script in an isolated sandbox and return its \
         stdout. Use print() for anything you want to see. No network \
         access, limited memory and time."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "code": {
                    "type": "string",
                    "description": "Complete Python script to run"
                }
            },
            "required": ["code"]
        })
    }

    async fn execute(&self, args: Value) -> anyhow::Result<ToolResult> {
        let code = require_str(&args, "code")?;
        if code.trim().is_empty() {
            return Ok(ToolResult::err("Empty script"));
        }
        self.run_sandboxed(code).await
    }
}
