use crate::error::ConfigError;
use directories::UserDirs;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

// ─── Config schema ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Data directory for persisted stores - computed, not serialized
    #[serde(skip)]
    pub data_dir: PathBuf,
    /// Path to config.toml - computed, not serialized
    #[serde(skip)]
    pub config_path: PathBuf,

    #[serde(default)]
    pub user: UserConfig,

    #[serde(default)]
    pub assistant: AssistantConfig,

    #[serde(default)]
    pub telegram: TelegramConfig,

    #[serde(default)]
    pub notion: NotionConfig,

    #[serde(default)]
    pub calendar: CalendarConfig,

    #[serde(default)]
    pub scheduler: SchedulerConfig,

    #[serde(default)]
    pub limits: LimitsConfig,
}

/// Who the assistant works for. Rendered into the system prompt verbatim.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserConfig {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub bio: String,
    #[serde(default)]
    pub country: String,
    #[serde(default)]
    pub region: String,
    #[serde(default)]
    pub city: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssistantConfig {
    #[serde(default = "default_assistant_name")]
    pub name: String,
    #[serde(default = "default_response_style")]
    pub response_style: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    /// IANA time zone name, e.g. "Europe/Berlin". All user-facing
    /// datetimes are interpreted in this zone.
    #[serde(default = "default_timezone")]
    pub timezone: String,
    #[serde(default)]
    pub api_key: Option<String>,
    /// Override for the chat-completions endpoint (tests, proxies).
    #[serde(default)]
    pub api_base_url: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TelegramConfig {
    #[serde(default)]
    pub token: Option<String>,
    /// Chat ids that receive scheduler-originated broadcasts.
    #[serde(default)]
    pub broadcast_chat_ids: Vec<String>,
    /// Usernames or numeric user ids allowed to talk to the assistant.
    /// Empty means everyone.
    #[serde(default)]
    pub allowed_users: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NotionConfig {
    #[serde(default)]
    pub api_token: Option<String>,
    /// Friendly name → database id.
    #[serde(default)]
    pub databases: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CalendarConfig {
    /// OAuth bearer token for the Google Calendar API.
    #[serde(default)]
    pub api_token: Option<String>,
    #[serde(default = "default_calendar_id")]
    pub calendar_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_poll_secs")]
    pub poll_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Tool calls permitted within one turn before the wrap-up directive.
    #[serde(default = "default_max_tool_calls")]
    pub max_tool_calls: u32,
    /// Messages from the transcript tail included as model context.
    #[serde(default = "default_history_window")]
    pub history_window: usize,
    #[serde(default = "default_url_max_chars")]
    pub url_max_chars: usize,
    #[serde(default = "default_url_timeout_secs")]
    pub url_timeout_secs: u64,
    #[serde(default = "default_sandbox_timeout_secs")]
    pub sandbox_timeout_secs: u64,
}

// ─── Defaults ────────────────────────────────────────────────────────────────

fn default_assistant_name() -> String {
    "Pai".into()
}

fn default_response_style() -> String {
    "Friendly and casual.".into()
}

fn default_model() -> String {
    "gpt-4.1".into()
}

fn default_temperature() -> f64 {
    0.7
}

fn default_timezone() -> String {
    "UTC".into()
}

fn default_calendar_id() -> String {
    "primary".into()
}

fn default_poll_secs() -> u64 {
    60
}

fn default_max_tool_calls() -> u32 {
    10
}

fn default_history_window() -> usize {
    200
}

fn default_url_max_chars() -> usize {
    10_000
}

fn default_url_timeout_secs() -> u64 {
    10
}

fn default_sandbox_timeout_secs() -> u64 {
    10
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            name: default_assistant_name(),
            response_style: default_response_style(),
            model: default_model(),
            temperature: default_temperature(),
            timezone: default_timezone(),
            api_key: None,
            api_base_url: None,
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_secs: default_poll_secs(),
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_tool_calls: default_max_tool_calls(),
            history_window: default_history_window(),
            url_max_chars: default_url_max_chars(),
            url_timeout_secs: default_url_timeout_secs(),
            sandbox_timeout_secs: default_sandbox_timeout_secs(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            config_path: PathBuf::from("config.toml"),
            user: UserConfig::default(),
            assistant: AssistantConfig::default(),
            telegram: TelegramConfig::default(),
            notion: NotionConfig::default(),
            calendar: CalendarConfig::default(),
            scheduler: SchedulerConfig::default(),
            limits: LimitsConfig::default(),
        }
    }
}

// ─── Loading ─────────────────────────────────────────────────────────────────

impl Config {
    /// Load config from the given path, or from the default location
    /// (`~/.pai/config.toml`). Secrets may come from the environment
    /// instead of the file; env always wins.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config_path = match path {
            Some(p) => p.to_path_buf(),
            None => default_config_path(),
        };

        let mut config = if config_path.exists() {
            let raw = fs::read_to_string(&config_path)?;
            toml::from_str::<Self>(&raw)
                .map_err(|e| ConfigError::Load(format!("{}: {e}", config_path.display())))?
        } else {
            Self::default()
        };

        config.config_path = config_path.clone();
        config.data_dir = config_path
            .parent()
            .map_or_else(|| PathBuf::from("data"), |dir| dir.join("data"));

        config.apply_env_overrides();
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(key) = std::env::var("OPENAI_API_KEY")
            && !key.is_empty()
        {
            self.assistant.api_key = Some(key);
        }
        if let Ok(token) = std::env::var("TELEGRAM_TOKEN")
            && !token.is_empty()
        {
            self.telegram.token = Some(token);
        }
        if let Ok(token) = std::env::var("NOTION_API_TOKEN")
            && !token.is_empty()
        {
            self.notion.api_token = Some(token);
        }
        if let Ok(token) = std::env::var("GOOGLE_CALENDAR_TOKEN")
            && !token.is_empty()
        {
            self.calendar.api_token = Some(token);
        }
    }

    /// Startup validation. Missing credentials for the model or the front
    /// end are fatal; optional collaborators (Notion, Calendar) are not.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.assistant.api_key.as_deref().unwrap_or("").is_empty() {
            return Err(ConfigError::Validation(
                "no model API key: set OPENAI_API_KEY or [assistant].api_key".into(),
            ));
        }
        if self.telegram.token.as_deref().unwrap_or("").is_empty() {
            return Err(ConfigError::Validation(
                "no Telegram token: set TELEGRAM_TOKEN or [telegram].token".into(),
            ));
        }
        if self.timezone().is_none() {
            return Err(ConfigError::Validation(format!(
                "unknown time zone: {}",
                self.assistant.timezone
            )));
        }
        if self.scheduler.poll_secs == 0 {
            return Err(ConfigError::Validation(
                "[scheduler].poll_secs must be at least 1".into(),
            ));
        }
        Ok(())
    }

    pub fn timezone(&self) -> Option<chrono_tz::Tz> {
        self.assistant.timezone.parse().ok()
    }

    pub fn history_path(&self) -> PathBuf {
        self.data_dir.join("conversation_history.json")
    }

    pub fn memories_path(&self) -> PathBuf {
        self.data_dir.join("memories.json")
    }

    pub fn tasks_path(&self) -> PathBuf {
        self.data_dir.join("tasks.json")
    }
}

fn default_config_path() -> PathBuf {
    UserDirs::new().map_or_else(
        || PathBuf::from("config.toml"),
        |dirs| dirs.home_dir().join(".pai").join("config.toml"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> Config {
        let mut config = Config::default();
        config.assistant.api_key = Some("sk-test".into());
        config.telegram.token = Some("123:abc".into());
        config
    }

    #[test]
    fn defaults_match_documented_limits() {
        let config = Config::default();
        assert_eq!(config.limits.max_tool_calls, 10);
        assert_eq!(config.limits.history_window, 200);
        assert_eq!(config.limits.url_max_chars, 10_000);
        assert_eq!(config.scheduler.poll_secs, 60);
    }

    #[test]
    fn validate_requires_api_key() {
        let mut config = valid_config();
        config.assistant.api_key = None;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("API key"));
    }

    #[test]
    fn validate_requires_telegram_token() {
        let mut config = valid_config();
        config.telegram.token = Some(String::new());
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("Telegram"));
    }

    #[test]
    fn validate_rejects_unknown_timezone() {
        let mut config = valid_config();
        config.assistant.timezone = "Mars/Olympus_Mons".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_accepts_optional_collaborators_missing() {
        let config = valid_config();
        assert!(config.notion.api_token.is_none());
        assert!(config.calendar.api_token.is_none());
        config.validate().unwrap();
    }

    #[test]
    fn load_parses_toml_sections() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
[user]
name = "Johannes"
role = "Developer"

[assistant]
model = "gpt-4.1"
timezone = "Europe/Berlin"

[notion.databases]
notes = "db-id-1"

[limits]
max_tool_calls = 5
"#,
        )
        .unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.user.name, "Johannes");
        assert_eq!(config.assistant.timezone, "Europe/Berlin");
        assert_eq!(config.notion.databases.get("notes").unwrap(), "db-id-1");
        assert_eq!(config.limits.max_tool_calls, 5);
        assert_eq!(config.data_dir, tmp.path().join("data"));
    }
}
