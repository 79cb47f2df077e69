pub mod telegram;

pub use telegram::TelegramChannel;

use async_trait::async_trait;

/// A message received from a front end.
#[derive(Debug, Clone)]
pub struct ChannelMessage {
    pub id: String,
    pub chat_id: String,
    pub text: String,
    pub image_url: Option<String>,
}

/// Core front-end trait — implement for any messaging platform.
#[async_trait]
pub trait Channel: Send + Sync {
    fn name(&self) -> &str;

    /// Send a message through this channel.
    async fn send(&self, message: &str, chat_id: &str) -> anyhow::Result<()>;

    /// Signal that the assistant is working on a reply.
    async fn send_typing(&self, _chat_id: &str) -> anyhow::Result<()> {
        Ok(())
    }

    /// Start listening for incoming messages (long-running). Returns when
    /// the receiving side is dropped.
    async fn listen(&self, tx: tokio::sync::mpsc::Sender<ChannelMessage>) -> anyhow::Result<()>;
}
