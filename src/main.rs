#![warn(clippy::all, clippy::pedantic)]
#![allow(
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::module_name_repetitions
)]

use anyhow::Context;
use clap::Parser;
use pai::agent::{Assistant, TurnInput};
use pai::channels::{Channel, ChannelMessage, TelegramChannel};
use pai::config::Config;
use pai::history::ConversationStore;
use pai::llm::openai::OpenAiProvider;
use pai::scheduler::Scheduler;
use pai::store::{MemoryStore, TaskStore};
use pai::tools::{
    analysis::AnalysisTool, calendar::CalendarTool, memory::MemoryTool, notion::NotionTool,
    tasks::TasksTool, url::UrlTool, ToolRegistry,
};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "pai", version, about = "Personal AI assistant with scheduled tasks")]
struct Cli {
    /// Path to config.toml (defaults to ~/.pai/config.toml)
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref()).context("failed to load configuration")?;
    if let Err(e) = config.validate() {
        tracing::error!("invalid configuration: {e}");
        std::process::exit(1);
    }
    let config = Arc::new(config);
    // validate() guarantees the zone parses.
    let tz = config
        .timezone()
        .ok_or_else(|| anyhow::anyhow!("unknown time zone"))?;

    // Stores.
    let history = Arc::new(ConversationStore::open(config.history_path())?);
    let memories = Arc::new(MemoryStore::open(config.memories_path())?);
    let tasks = Arc::new(TaskStore::open(config.tasks_path())?);

    // Optional collaborators.
    let calendar = match config.calendar.api_token.as_deref() {
        Some(token) if !token.is_empty() => Some(Arc::new(pai::calendar::CalendarClient::new(
            token,
            &config.calendar.calendar_id,
            tz,
        )?)),
        _ => None,
    };
    let notion = match config.notion.api_token.as_deref() {
        Some(token) if !token.is_empty() => Some(Arc::new(pai::notion::NotionClient::new(
            token,
            config.notion.databases.clone(),
        )?)),
        _ => None,
    };

    let mut registry = ToolRegistry::new();
    registry.register(Box::new(MemoryTool::new(memories.clone())));
    registry.register(Box::new(TasksTool::new(tasks.clone())));
    registry.register(Box::new(UrlTool::new(
        config.limits.url_timeout_secs,
        config.limits.url_max_chars,
    )?));
    registry.register(Box::new(AnalysisTool::new(
        config.limits.sandbox_timeout_secs,
    )));
    registry.register(Box::new(CalendarTool::new(calendar)));
    registry.register(Box::new(NotionTool::new(notion)));
    let registry = Arc::new(registry);
    tracing::info!(tools = ?registry.tool_names(), "tool registry ready");

    let provider = Arc::new(OpenAiProvider::new(
        config.assistant.api_key.as_deref(),
        config.assistant.api_base_url.as_deref(),
    ));
    let assistant = Arc::new(Assistant::new(
        provider,
        registry,
        history,
        memories,
        config.clone(),
        tz,
    ));

    // validate() guarantees the token is present.
    let token = config.telegram.token.clone().unwrap_or_default();
    let channel = Arc::new(TelegramChannel::new(
        token,
        config.telegram.allowed_users.clone(),
        config.telegram.broadcast_chat_ids.clone(),
    )?);

    let cancel = CancellationToken::new();
    let (broadcast_tx, broadcast_rx) = broadcast::channel::<String>(64);

    let scheduler = Scheduler::new(
        assistant.clone(),
        tasks,
        broadcast_tx,
        tz,
        config.scheduler.poll_secs,
    );
    let scheduler_handle = tokio::spawn(scheduler.run(cancel.clone()));

    let broadcast_channel = channel.clone();
    tokio::spawn(async move { broadcast_channel.broadcast_loop(broadcast_rx).await });

    let (message_tx, mut message_rx) = mpsc::channel::<ChannelMessage>(32);
    let listen_channel = channel.clone();
    tokio::spawn(async move {
        if let Err(e) = listen_channel.listen(message_tx).await {
            tracing::error!(error = %e, "telegram listener stopped");
        }
    });

    tracing::info!(assistant = %config.assistant.name, "assistant running");

    loop {
        tokio::select! {
            Some(message) = message_rx.recv() => {
                handle_message(&assistant, &channel, message).await;
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("shutdown requested");
                break;
            }
        }
    }

    cancel.cancel();
    let _ = scheduler_handle.await;
    Ok(())
}

/// Run one front-end turn: typing feedback per tool call, reply to the
/// originating chat. Turn failures become an apology instead of silence.
async fn handle_message(
    assistant: &Arc<Assistant>,
    channel: &Arc<TelegramChannel>,
    message: ChannelMessage,
) {
    let input = match message.image_url {
        Some(image_url) => TurnInput::TextWithImage {
            text: message.text,
            image_url,
        },
        None => TurnInput::Text(message.text),
    };

    let (observer_tx, mut observer_rx) = mpsc::unbounded_channel::<String>();
    let typing_channel = channel.clone();
    let chat_id = message.chat_id.clone();
    let typing = tokio::spawn(async move {
        while let Some(tool_name) = observer_rx.recv().await {
            tracing::debug!(tool = %tool_name, "tool in use");
            if let Err(e) = typing_channel.send_typing(&chat_id).await {
                tracing::debug!(error = %e, "typing action failed");
            }
        }
    });

    let reply = match assistant.chat(input, Some(&observer_tx)).await {
        Ok(reply) => reply,
        Err(e) => {
            tracing::error!(error = %e, "turn failed");
            "Sorry, something went wrong while processing your message.".to_string()
        }
    };
    drop(observer_tx);
    let _ = typing.await;

    if let Err(e) = channel.send(&reply, &message.chat_id).await {
        tracing::error!(error = %e, chat_id = %message.chat_id, "failed to deliver reply");
    }
}
