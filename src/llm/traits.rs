use super::types::{ProviderMessage, ProviderResponse};
use crate::tools::ToolSpec;
use async_trait::async_trait;

/// Language-model service client.
///
/// One method is enough: passing an empty `tools` slice is the text-only
/// mode the turn loop uses for its forced final answer.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Provider identifier (e.g. "openai").
    fn name(&self) -> &str;

    async fn chat_with_tools(
        &self,
        system_prompt: Option<&str>,
        messages: &[ProviderMessage],
        tools: &[ToolSpec],
        model: &str,
        temperature: f64,
    ) -> anyhow::Result<ProviderResponse>;
}
