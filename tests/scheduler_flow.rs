//! Scheduler path: due tasks become turns, replies reach subscribers, and
//! repeat policies advance exactly once per firing.

use chrono::NaiveDateTime;
use pai::agent::Assistant;
use pai::config::Config;
use pai::history::ConversationStore;
use pai::llm::openai::OpenAiProvider;
use pai::scheduler::Scheduler;
use pai::store::tasks::DATETIME_FORMAT;
use pai::store::{MemoryStore, RepeatPolicy, TaskRecord, TaskStore};
use pai::tools::ToolRegistry;
use serde_json::json;
use std::sync::Arc;
use tempfile::TempDir;
use tokio::sync::broadcast;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn dt(s: &str) -> NaiveDateTime {
    NaiveDateTime::parse_from_str(s, DATETIME_FORMAT).unwrap()
}

async fn mount_text_reply(server: &MockServer, text: &str) {
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{
                "message": {"content": text, "tool_calls": null},
                "finish_reason": "stop"
            }]
        })))
        .mount(server)
        .await;
}

fn scheduler_fixture(
    server: &MockServer,
    tmp: &TempDir,
) -> (Scheduler, Arc<TaskStore>, broadcast::Receiver<String>) {
    let mut config = Config::default();
    config.data_dir = tmp.path().to_path_buf();
    config.assistant.api_key = Some("sk-test".into());
    let config = Arc::new(config);

    let history = Arc::new(ConversationStore::open(config.history_path()).unwrap());
    let memories = Arc::new(MemoryStore::open(config.memories_path()).unwrap());
    let tasks = Arc::new(TaskStore::open(config.tasks_path()).unwrap());

    let provider = Arc::new(OpenAiProvider::new(Some("sk-test"), Some(&server.uri())));
    let assistant = Arc::new(Assistant::new(
        provider,
        Arc::new(ToolRegistry::new()),
        history,
        memories,
        config,
        chrono_tz::UTC,
    ));

    let (tx, rx) = broadcast::channel(16);
    (
        Scheduler::new(assistant, tasks.clone(), tx, chrono_tz::UTC, 60),
        tasks,
        rx,
    )
}

#[tokio::test]
async fn due_task_reply_is_broadcast_and_one_shot_removed() {
    let server = MockServer::start().await;
    mount_text_reply(&server, "Good morning! Plants are on the list.").await;

    let tmp = TempDir::new().unwrap();
    let (scheduler, tasks, mut rx) = scheduler_fixture(&server, &tmp);
    tasks
        .write(
            "water_plants",
            TaskRecord {
                instructions: "Remind me to water the plants".into(),
                due_at: dt("2020-01-01 08:00:00"),
                repeat: RepeatPolicy::Never,
                agent: "assistant".into(),
            },
        )
        .await
        .unwrap();

    scheduler.poll_once().await;

    assert_eq!(
        rx.try_recv().unwrap(),
        "Good morning! Plants are on the list."
    );
    assert!(tasks.get("water_plants").await.is_none());

    // The synthetic turn carried the trigger format.
    let requests = server.received_requests().await.unwrap();
    let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
    let user_message = body["messages"]
        .as_array()
        .unwrap()
        .iter()
        .find(|m| m["role"] == "user")
        .unwrap();
    assert_eq!(
        user_message["content"],
        "TASK water_plants: Remind me to water the plants"
    );
}

#[tokio::test]
async fn monthly_task_advances_with_year_rollover() {
    let server = MockServer::start().await;
    mount_text_reply(&server, "Done.").await;

    let tmp = TempDir::new().unwrap();
    let (scheduler, tasks, mut rx) = scheduler_fixture(&server, &tmp);
    tasks
        .write(
            "rent",
            TaskRecord {
                instructions: "Transfer the rent".into(),
                due_at: dt("2020-12-15 09:00:00"),
                repeat: RepeatPolicy::Monthly,
                agent: "assistant".into(),
            },
        )
        .await
        .unwrap();

    scheduler.poll_once().await;
    assert!(rx.try_recv().is_ok());

    let advanced = tasks.get("rent").await.unwrap();
    assert_eq!(advanced.due_at, dt("2021-01-15 09:00:00"));
}

#[tokio::test]
async fn failed_turn_is_skipped_but_task_already_advanced() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&server)
        .await;

    let tmp = TempDir::new().unwrap();
    let (scheduler, tasks, mut rx) = scheduler_fixture(&server, &tmp);
    tasks
        .write(
            "daily_checkin",
            TaskRecord {
                instructions: "Check in".into(),
                due_at: dt("2020-01-01 08:00:00"),
                repeat: RepeatPolicy::Daily,
                agent: "assistant".into(),
            },
        )
        .await
        .unwrap();

    // Poll survives the provider failure without broadcasting anything.
    scheduler.poll_once().await;
    assert!(rx.try_recv().is_err());

    // Advance-before-return already moved the task on, so a broken provider
    // cannot cause a firing storm.
    let advanced = tasks.get("daily_checkin").await.unwrap();
    assert_eq!(advanced.due_at, dt("2020-01-02 08:00:00"));
}
