mod turn_loop;

pub use turn_loop::{ToolObserver, TurnLoop, TurnParams, TurnResult};

use crate::config::Config;
use crate::history::{ConversationStore, StoredMessage};
use crate::llm::traits::Provider;
use crate::llm::types::ContentBlock;
use crate::prompt::build_system_prompt;
use crate::store::MemoryStore;
use crate::tools::ToolRegistry;
use chrono_tz::Tz;
use std::sync::Arc;

/// A single conversational turn's input.
#[derive(Debug, Clone)]
pub enum TurnInput {
    Text(String),
    TextWithImage { text: String, image_url: String },
}

impl TurnInput {
    /// Synthetic input for a scheduled task coming due.
    pub fn task(id: &str, instructions: &str) -> Self {
        Self::Text(format!("TASK {id}: {instructions}"))
    }
}

/// The assistant: one provider, one tool registry, one transcript. Shared
/// between the front end and the scheduler behind an `Arc`; the stores
/// serialize concurrent turns.
pub struct Assistant {
    provider: Arc<dyn Provider>,
    registry: Arc<ToolRegistry>,
    history: Arc<ConversationStore>,
    memories: Arc<MemoryStore>,
    config: Arc<Config>,
    tz: Tz,
}

impl Assistant {
    pub fn new(
        provider: Arc<dyn Provider>,
        registry: Arc<ToolRegistry>,
        history: Arc<ConversationStore>,
        memories: Arc<MemoryStore>,
        config: Arc<Config>,
        tz: Tz,
    ) -> Self {
        Self {
            provider,
            registry,
            history,
            memories,
            config,
            tz,
        }
    }

    /// Run one turn and return the assistant's reply text. The observer,
    /// if present, receives each tool name as it is dispatched.
    pub async fn chat(
        &self,
        input: TurnInput,
        observer: Option<&ToolObserver>,
    ) -> anyhow::Result<String> {
        let stored = match &input {
            TurnInput::Text(text) => StoredMessage::user(text),
            TurnInput::TextWithImage { text, image_url } => {
                StoredMessage::user_blocks(vec![
                    ContentBlock::Text { text: text.clone() },
                    ContentBlock::Image {
                        source: crate::llm::types::ImageSource::Url {
                            url: image_url.clone(),
                        },
                    },
                ])
            }
        };
        self.history.append(stored).await?;

        let window = self.history.window(self.config.limits.history_window).await;
        let memories = self.memories.list_all().await;
        let system_prompt = build_system_prompt(&self.config, self.tz, &memories);

        let turn_loop = TurnLoop::new(
            self.registry.clone(),
            self.history.clone(),
            self.config.limits.max_tool_calls,
        );
        let result = turn_loop
            .run(TurnParams {
                provider: self.provider.as_ref(),
                system_prompt: &system_prompt,
                model: &self.config.assistant.model,
                temperature: self.config.assistant.temperature,
                window,
                observer,
            })
            .await?;

        tracing::info!(
            tool_calls = result.tool_calls_used,
            limit_reached = result.limit_reached,
            "turn completed"
        );
        Ok(result.text)
    }
}
