use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Result of a tool execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    pub success: bool,
    pub output: String,
    pub error: Option<String>,
}

impl ToolResult {
    pub fn ok(output: impl Into<String>) -> Self {
        Self {
            success: true,
            output: output.into(),
            error: None,
        }
    }

    pub fn err(message: impl Into<String>) -> Self {
        Self {
            success: false,
            output: String::new(),
            error: Some(message.into()),
        }
    }

    /// Render as the text fed back to the model.
    pub fn as_model_text(&self) -> String {
        if let Some(ref error) = self.error {
            format!("[ERROR] {error}")
        } else {
            self.output.clone()
        }
    }
}

/// Description of a tool for the LLM
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// Core tool trait — implement for any capability
#[async_trait]
pub trait Tool: Send + Sync {
    /// Tool name (used in LLM function calling)
    fn name(&self) -> &str;

    /// Human-readable description
    fn description(&self) -> &str;

    /// JSON schema for parameters
    fn parameters_schema(&self) -> serde_json::Value;

    /// Execute the tool with given arguments
    async fn execute(&self, args: serde_json::Value) -> anyhow::Result<ToolResult>;

    /// Get the full spec for LLM registration
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters_schema(),
        }
    }
}

/// Pull a required string argument out of a tool-call payload, with an
/// error message the model can act on.
pub fn require_str<'a>(args: &'a serde_json::Value, key: &str) -> anyhow::Result<&'a str> {
    args.get(key)
        .and_then(|v| v.as_str())
        .ok_or_else(|| anyhow::anyhow!("Missing '{key}' parameter"))
}

pub fn optional_str<'a>(args: &'a serde_json::Value, key: &str) -> Option<&'a str> {
    args.get(key).and_then(|v| v.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn tool_result_constructors() {
        let ok = ToolResult::ok("done");
        assert!(ok.success);
        assert_eq!(ok.as_model_text(), "done");

        let err = ToolResult::err("bad input");
        assert!(!err.success);
        assert_eq!(err.as_model_text(), "[ERROR] bad input");
    }

    #[test]
    fn require_str_reports_missing_key() {
        let args = json!({"mode": "w"});
        assert_eq!(require_str(&args, "mode").unwrap(), "w");
        let err = require_str(&args, "id").unwrap_err();
        assert!(err.to_string().contains("'id'"));
    }

    #[test]
    fn optional_str_tolerates_absence_and_wrong_type() {
        let args = json!({"content": "x", "count": 3});
        assert_eq!(optional_str(&args, "content"), Some("x"));
        assert_eq!(optional_str(&args, "count"), None);
        assert_eq!(optional_str(&args, "missing"), None);
    }
}
