use crate::history::{ConversationStore, StoredMessage};
use crate::llm::traits::Provider;
use crate::llm::types::{ContentBlock, ProviderMessage};
use crate::tools::{ToolRegistry, ToolSpec};
use std::sync::Arc;
use tokio::sync::mpsc;

// ─── Constants ───────────────────────────────────────────────────────────────

/// Injected once when the tool budget is exhausted, before the model gets
/// its last look at the gathered results.
pub(crate) const WRAP_UP_DIRECTIVE: &str = "You have reached the maximum number of \
consecutive tool calls. Please summarize your progress and provide a final response \
to the user.";

/// Returned when even the forced final call yields nothing usable.
pub(crate) const FALLBACK_REPLY: &str =
    "Sorry, I reached a limit in processing your request. Please try again.";

// ─── Public types ────────────────────────────────────────────────────────────

/// Receives the name of each tool as it is dispatched. Send errors are
/// ignored; a slow or dead observer must never stall the turn.
pub type ToolObserver = mpsc::UnboundedSender<String>;

/// Drives one conversational turn: model round-trips, sequential tool
/// dispatch, and the bounded wrap-up when the tool budget runs out.
pub struct TurnLoop {
    registry: Arc<ToolRegistry>,
    history: Arc<ConversationStore>,
    max_tool_calls: u32,
}

pub struct TurnParams<'a> {
    pub provider: &'a dyn Provider,
    pub system_prompt: &'a str,
    pub model: &'a str,
    pub temperature: f64,
    /// Context window including the already-persisted user message.
    pub window: Vec<ProviderMessage>,
    pub observer: Option<&'a ToolObserver>,
}

/// Final output of a [`TurnLoop::run`] invocation.
#[derive(Debug)]
pub struct TurnResult {
    pub text: String,
    pub tool_calls_used: u32,
    pub limit_reached: bool,
}

// ─── Implementation ──────────────────────────────────────────────────────────

impl TurnLoop {
    pub fn new(
        registry: Arc<ToolRegistry>,
        history: Arc<ConversationStore>,
        max_tool_calls: u32,
    ) -> Self {
        Self {
            registry,
            history,
            max_tool_calls,
        }
    }

    /// Run the turn to completion.
    ///
    /// Provider transport errors on the in-loop calls abort the turn; tool
    /// failures never do, they are rendered back to the model as text. Every
    /// history append is persisted before the next provider call.
    pub async fn run(&self, mut params: TurnParams<'_>) -> anyhow::Result<TurnResult> {
        let tools = self.registry.specs();
        let mut messages = std::mem::take(&mut params.window);
        let mut tool_calls_used: u32 = 0;

        while tool_calls_used < self.max_tool_calls {
            let response = params
                .provider
                .chat_with_tools(
                    Some(params.system_prompt),
                    &messages,
                    &tools,
                    params.model,
                    params.temperature,
                )
                .await?;

            if !response.has_tool_use() {
                if response.text.is_empty() {
                    // Neither text nor tool calls; force a wrap-up below.
                    break;
                }
                self.history
                    .append(StoredMessage::assistant(&response.text))
                    .await?;
                return Ok(TurnResult {
                    text: response.text,
                    tool_calls_used,
                    limit_reached: false,
                });
            }

            let tool_blocks: Vec<ContentBlock> =
                response.tool_use_blocks().into_iter().cloned().collect();
            tool_calls_used += tool_blocks.len() as u32;

            if tool_calls_used >= self.max_tool_calls {
                self.history
                    .append(StoredMessage::Directive {
                        text: WRAP_UP_DIRECTIVE.to_string(),
                    })
                    .await?;
                messages.push(ProviderMessage::directive(WRAP_UP_DIRECTIVE));
            }

            self.execute_tool_blocks(&tool_blocks, &mut messages, params.observer)
                .await?;
        }

        self.forced_final_reply(&params, messages, tool_calls_used)
            .await
    }

    /// Dispatch one batch of tool calls in the order the model emitted them.
    async fn execute_tool_blocks(
        &self,
        tool_blocks: &[ContentBlock],
        messages: &mut Vec<ProviderMessage>,
        observer: Option<&ToolObserver>,
    ) -> anyhow::Result<()> {
        for block in tool_blocks {
            let ContentBlock::ToolUse { id, name, input } = block else {
                continue;
            };

            if let Some(observer) = observer {
                let _ = observer.send(name.clone());
            }

            self.history
                .append(StoredMessage::ToolCall {
                    id: id.clone(),
                    name: name.clone(),
                    input: input.clone(),
                })
                .await?;
            messages.push(ProviderMessage {
                role: crate::llm::types::MessageRole::Assistant,
                content: vec![block.clone()],
            });

            let result = self.registry.execute(name, input.clone()).await;
            let content = result.as_model_text();
            tracing::debug!(tool = %name, success = result.success, "tool dispatched");

            self.history
                .append(StoredMessage::ToolResult {
                    tool_use_id: id.clone(),
                    content: content.clone(),
                    is_error: !result.success,
                })
                .await?;
            messages.push(ProviderMessage::tool_result(id, content, !result.success));
        }
        Ok(())
    }

    /// One last model call with tools disabled. Falls back to a fixed reply
    /// when the call fails or returns nothing, so the turn always produces
    /// an answer.
    async fn forced_final_reply(
        &self,
        params: &TurnParams<'_>,
        messages: Vec<ProviderMessage>,
        tool_calls_used: u32,
    ) -> anyhow::Result<TurnResult> {
        let empty_tools: [ToolSpec; 0] = [];
        let text = match params
            .provider
            .chat_with_tools(
                Some(params.system_prompt),
                &messages,
                &empty_tools,
                params.model,
                params.temperature,
            )
            .await
        {
            Ok(response) if !response.text.is_empty() => response.text,
            Ok(_) => FALLBACK_REPLY.to_string(),
            Err(e) => {
                tracing::warn!(error = %e, "final wrap-up call failed");
                FALLBACK_REPLY.to_string()
            }
        };

        self.history.append(StoredMessage::assistant(&text)).await?;
        Ok(TurnResult {
            text,
            tool_calls_used,
            limit_reached: true,
        })
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
