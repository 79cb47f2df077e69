use crate::error::StoreError;
use crate::llm::{ContentBlock, MessageRole, ProviderMessage};
use crate::store::{read_document, write_atomic};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::sync::Mutex;

/// One entry in the persisted transcript. Tool calls and tool results are
/// stored as their own entries so the transcript replays exactly as the
/// provider saw it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum StoredMessage {
    User {
        content: Vec<ContentBlock>,
    },
    Assistant {
        content: Vec<ContentBlock>,
    },
    ToolCall {
        id: String,
        name: String,
        input: serde_json::Value,
    },
    ToolResult {
        tool_use_id: String,
        content: String,
        is_error: bool,
    },
    Directive {
        text: String,
    },
}

impl StoredMessage {
    pub fn user(text: impl Into<String>) -> Self {
        Self::User {
            content: vec![ContentBlock::Text { text: text.into() }],
        }
    }

    pub fn user_blocks(content: Vec<ContentBlock>) -> Self {
        Self::User { content }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::Assistant {
            content: vec![ContentBlock::Text { text: text.into() }],
        }
    }

    pub fn to_provider_message(&self) -> ProviderMessage {
        match self {
            Self::User { content } => ProviderMessage {
                role: MessageRole::User,
                content: content.clone(),
            },
            Self::Assistant { content } => ProviderMessage {
                role: MessageRole::Assistant,
                content: content.clone(),
            },
            Self::ToolCall { id, name, input } => ProviderMessage {
                role: MessageRole::Assistant,
                content: vec![ContentBlock::ToolUse {
                    id: id.clone(),
                    name: name.clone(),
                    input: input.clone(),
                }],
            },
            Self::ToolResult {
                tool_use_id,
                content,
                is_error,
            } => ProviderMessage::tool_result(tool_use_id.clone(), content.clone(), *is_error),
            Self::Directive { text } => ProviderMessage::directive(text.clone()),
        }
    }
}

/// Append-only conversation transcript, persisted as one JSON array and
/// rewritten atomically on every append. There is no edit or reorder API.
pub struct ConversationStore {
    path: PathBuf,
    messages: Mutex<Vec<StoredMessage>>,
}

impl ConversationStore {
    pub fn open(path: PathBuf) -> anyhow::Result<Self> {
        let messages = read_document(&path)?.unwrap_or_default();
        Ok(Self {
            path,
            messages: Mutex::new(messages),
        })
    }

    pub async fn append(&self, message: StoredMessage) -> anyhow::Result<()> {
        let mut messages = self.messages.lock().await;
        messages.push(message);
        let json = serde_json::to_string_pretty(&*messages)?;
        write_atomic(&self.path, &json)
            .await
            .map_err(|e| StoreError::Persist {
                path: self.path.display().to_string(),
                message: format!("{e:#}"),
            })?;
        Ok(())
    }

    /// Last `n` messages as provider messages, oldest first. Returns the
    /// whole transcript when it holds fewer than `n`.
    pub async fn window(&self, n: usize) -> Vec<ProviderMessage> {
        let messages = self.messages.lock().await;
        let start = messages.len().saturating_sub(n);
        messages[start..]
            .iter()
            .map(StoredMessage::to_provider_message)
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.messages.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.messages.lock().await.is_empty()
    }
}
