use super::traits::{Tool, ToolResult, ToolSpec};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Central registry for tool instances.
///
/// Dispatch never returns `Err` for tool-level problems: unknown names and
/// handler failures are converted to failed [`ToolResult`]s so the turn loop
/// can feed them back to the model as text.
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Register a tool. Replaces any existing tool with the same name.
    pub fn register(&mut self, tool: Box<dyn Tool>) {
        let tool: Arc<dyn Tool> = Arc::from(tool);
        self.tools.insert(tool.name().to_string(), tool);
    }

    /// Look up a tool by name.
    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.get(name)
    }

    /// Return sorted list of registered tool names.
    pub fn tool_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tools.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Return specs for all registered tools, sorted by name for a stable
    /// schema across calls.
    pub fn specs(&self) -> Vec<ToolSpec> {
        let mut specs: Vec<ToolSpec> = self.tools.values().map(|tool| tool.spec()).collect();
        specs.sort_by(|a, b| a.name.cmp(&b.name));
        specs
    }

    /// Execute a tool by name, catching every handler error.
    pub async fn execute(&self, name: &str, args: Value) -> ToolResult {
        let Some(tool) = self.tools.get(name) else {
            return ToolResult::err(format!("Unknown tool: {name}"));
        };

        match tool.execute(args).await {
            Ok(result) => result,
            Err(e) => ToolResult::err(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::traits::Tool;
    use async_trait::async_trait;
    use serde_json::json;

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }

        fn description(&self) -> &str {
            "echoes its input"
        }

        fn parameters_schema(&self) -> Value {
            json!({"type": "object", "properties": {"text": {"type": "string"}}})
        }

        async fn execute(&self, args: Value) -> anyhow::Result<ToolResult> {
            let text = args
                .get("text")
                .and_then(|v| v.as_str())
                .ok_or_else(|| anyhow::anyhow!("Missing 'text' parameter"))?;
            Ok(ToolResult::ok(text))
        }
    }

    struct FailingTool;

    #[async_trait]
    impl Tool for FailingTool {
        fn name(&self) -> &str {
            "failing"
        }

        fn description(&self) -> &str {
            "always fails"
        }

        fn parameters_schema(&self) -> Value {
            json!({"type": "object"})
        }

        async fn execute(&self, _args: Value) -> anyhow::Result<ToolResult> {
            anyhow::bail!("collaborator unreachable")
        }
    }

    #[tokio::test]
    async fn execute_dispatches_to_registered_tool() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(EchoTool));

        let result = registry.execute("echo", json!({"text": "hi"})).await;
        assert!(result.success);
        assert_eq!(result.output, "hi");
    }

    #[tokio::test]
    async fn unknown_tool_returns_literal_result_not_error() {
        let registry = ToolRegistry::new();
        let result = registry.execute("nonexistent", json!({})).await;
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("Unknown tool: nonexistent"));

        // Idempotent: same literal every time.
        let again = registry.execute("nonexistent", json!({})).await;
        assert_eq!(again.error.as_deref(), Some("Unknown tool: nonexistent"));
    }

    #[tokio::test]
    async fn handler_errors_are_caught_into_failed_results() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(FailingTool));

        let result = registry.execute("failing", json!({})).await;
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("collaborator unreachable"));
    }

    #[tokio::test]
    async fn missing_required_argument_becomes_descriptive_result() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(EchoTool));

        let result = registry.execute("echo", json!({})).await;
        assert!(!result.success);
        assert!(result.error.as_deref().unwrap().contains("'text'"));
    }

    #[test]
    fn specs_are_sorted_by_name() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(FailingTool));
        registry.register(Box::new(EchoTool));

        let names: Vec<String> = registry.specs().into_iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["echo", "failing"]);
        assert_eq!(registry.tool_names(), vec!["echo", "failing"]);
    }
}
