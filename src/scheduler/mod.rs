use crate::agent::{Assistant, TurnInput};
use crate::store::TaskStore;
use chrono::Utc;
use chrono_tz::Tz;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::time::{self, Duration};
use tokio_util::sync::CancellationToken;

/// Polls the task store and feeds due tasks through the assistant as
/// synthetic turns. Replies are fanned out to every front-end subscriber.
pub struct Scheduler {
    assistant: Arc<Assistant>,
    tasks: Arc<TaskStore>,
    broadcast_tx: broadcast::Sender<String>,
    tz: Tz,
    poll_secs: u64,
}

impl Scheduler {
    pub fn new(
        assistant: Arc<Assistant>,
        tasks: Arc<TaskStore>,
        broadcast_tx: broadcast::Sender<String>,
        tz: Tz,
        poll_secs: u64,
    ) -> Self {
        Self {
            assistant,
            tasks,
            broadcast_tx,
            tz,
            poll_secs,
        }
    }

    /// Run until cancelled. The in-flight poll is allowed to drain, so a
    /// task that already fired is never dropped halfway through its turn.
    pub async fn run(self, cancel: CancellationToken) {
        let mut interval = time::interval(Duration::from_secs(self.poll_secs));
        tracing::info!(poll_secs = self.poll_secs, "scheduler started");

        loop {
            tokio::select! {
                _ = interval.tick() => self.poll_once().await,
                _ = cancel.cancelled() => {
                    tracing::info!("scheduler stopping");
                    return;
                }
            }
        }
    }

    /// One poll: collect due tasks (already advanced and persisted by the
    /// store) and run each through the assistant. A failed turn is logged
    /// and the rest of the batch still runs.
    pub async fn poll_once(&self) {
        let now = Utc::now().with_timezone(&self.tz).naive_local();
        let due = match self.tasks.due_tasks(now).await {
            Ok(due) => due,
            Err(e) => {
                tracing::warn!(error = %e, "task poll failed");
                return;
            }
        };

        for task in due {
            tracing::info!(task_id = %task.id, "task due");
            match self
                .assistant
                .chat(TurnInput::task(&task.id, &task.instructions), None)
                .await
            {
                Ok(reply) => {
                    // No subscribers is normal at startup; the reply is
                    // still in the transcript.
                    let _ = self.broadcast_tx.send(reply);
                }
                Err(e) => {
                    tracing::warn!(task_id = %task.id, error = %e, "task turn failed");
                }
            }
        }
    }
}
