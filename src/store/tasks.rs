use super::{read_document, write_atomic};
use crate::error::StoreError;
use chrono::{Months, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use tokio::sync::Mutex;

pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

// ─── Records ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepeatPolicy {
    Never,
    Daily,
    Weekly,
    Biweekly,
    Monthly,
    Yearly,
}

impl RepeatPolicy {
    pub const ALL: [&'static str; 6] =
        ["never", "daily", "weekly", "biweekly", "monthly", "yearly"];

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "never" => Some(Self::Never),
            "daily" => Some(Self::Daily),
            "weekly" => Some(Self::Weekly),
            "biweekly" => Some(Self::Biweekly),
            "monthly" => Some(Self::Monthly),
            "yearly" => Some(Self::Yearly),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Never => "never",
            Self::Daily => "daily",
            Self::Weekly => "weekly",
            Self::Biweekly => "biweekly",
            Self::Monthly => "monthly",
            Self::Yearly => "yearly",
        }
    }

    /// Next due time after a firing, or `None` for one-shot tasks.
    ///
    /// Month and year advances clamp to the last valid day of the target
    /// month (Jan 31 → Feb 29 in a leap year), so a recurring task keeps
    /// firing instead of erroring on short months.
    pub fn advance(self, due_at: NaiveDateTime) -> Option<NaiveDateTime> {
        match self {
            Self::Never => None,
            Self::Daily => Some(due_at + chrono::Duration::days(1)),
            Self::Weekly => Some(due_at + chrono::Duration::days(7)),
            Self::Biweekly => Some(due_at + chrono::Duration::days(14)),
            Self::Monthly => due_at.checked_add_months(Months::new(1)),
            Self::Yearly => due_at.checked_add_months(Months::new(12)),
        }
    }
}

mod datetime_format {
    use super::{DATETIME_FORMAT, NaiveDateTime};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(dt: &NaiveDateTime, ser: S) -> Result<S::Ok, S::Error> {
        ser.serialize_str(&dt.format(DATETIME_FORMAT).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<NaiveDateTime, D::Error> {
        let raw = String::deserialize(de)?;
        NaiveDateTime::parse_from_str(&raw, DATETIME_FORMAT).map_err(serde::de::Error::custom)
    }
}

/// One scheduled instruction. Field names match the persisted document
/// format of the tasks file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRecord {
    pub instructions: String,
    #[serde(rename = "datetime", with = "datetime_format")]
    pub due_at: NaiveDateTime,
    pub repeat: RepeatPolicy,
    pub agent: String,
}

/// A task whose trigger time has passed, ready to be fed into a turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DueTask {
    pub id: String,
    pub instructions: String,
    pub agent: String,
}

// ─── Store ───────────────────────────────────────────────────────────────────

/// id→task map, persisted as one JSON document and rewritten wholesale on
/// every mutation.
pub struct TaskStore {
    path: PathBuf,
    tasks: Mutex<BTreeMap<String, TaskRecord>>,
}

impl TaskStore {
    pub fn open(path: PathBuf) -> anyhow::Result<Self> {
        let tasks = read_document(&path)?.unwrap_or_default();
        Ok(Self {
            path,
            tasks: Mutex::new(tasks),
        })
    }

    /// Create or overwrite a task. Returns whether a task with this id
    /// already existed.
    pub async fn write(&self, id: &str, record: TaskRecord) -> anyhow::Result<bool> {
        let mut tasks = self.tasks.lock().await;
        let existed = tasks.insert(id.to_string(), record).is_some();
        self.persist(&tasks).await?;
        Ok(existed)
    }

    pub async fn get(&self, id: &str) -> Option<TaskRecord> {
        self.tasks.lock().await.get(id).cloned()
    }

    pub async fn list(&self) -> Vec<(String, TaskRecord)> {
        self.tasks
            .lock()
            .await
            .iter()
            .map(|(id, record)| (id.clone(), record.clone()))
            .collect()
    }

    /// Remove a task. Returns whether it existed.
    pub async fn delete(&self, id: &str) -> anyhow::Result<bool> {
        let mut tasks = self.tasks.lock().await;
        let existed = tasks.remove(id).is_some();
        if existed {
            self.persist(&tasks).await?;
        }
        Ok(existed)
    }

    /// Emit every task with `due_at <= now`, advancing repeating tasks and
    /// deleting one-shot ones. All mutations are persisted before the due
    /// list is returned, so a crash after emission cannot re-fire what was
    /// already advanced. Results are sorted by due time, then id, for a
    /// deterministic same-poll order.
    pub async fn due_tasks(&self, now: NaiveDateTime) -> anyhow::Result<Vec<DueTask>> {
        let mut tasks = self.tasks.lock().await;

        let mut due: Vec<(NaiveDateTime, String)> = tasks
            .iter()
            .filter(|(_, record)| record.due_at <= now)
            .map(|(id, record)| (record.due_at, id.clone()))
            .collect();
        due.sort();

        if due.is_empty() {
            return Ok(Vec::new());
        }

        let mut events = Vec::with_capacity(due.len());
        for (_, id) in due {
            let Some(record) = tasks.get(&id) else {
                continue;
            };
            events.push(DueTask {
                id: id.clone(),
                instructions: record.instructions.clone(),
                agent: record.agent.clone(),
            });

            match record.repeat.advance(record.due_at) {
                Some(next_due) => {
                    if let Some(record) = tasks.get_mut(&id) {
                        record.due_at = next_due;
                    }
                }
                None => {
                    tasks.remove(&id);
                }
            }
        }

        self.persist(&tasks).await?;
        Ok(events)
    }

    async fn persist(&self, tasks: &BTreeMap<String, TaskRecord>) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(tasks)?;
        write_atomic(&self.path, &json)
            .await
            .map_err(|e| StoreError::Persist {
                path: self.path.display().to_string(),
                message: format!("{e:#}"),
            })?;
        Ok(())
    }
}
