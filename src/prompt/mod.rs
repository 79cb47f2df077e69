use crate::config::Config;
use chrono::Utc;
use chrono_tz::Tz;

/// Render the assistant persona prompt. Memories are injected fresh on
/// every turn so the model always sees the current state of the store.
pub fn build_system_prompt(config: &Config, tz: Tz, memories: &str) -> String {
    let user = &config.user;
    let assistant = &config.assistant;
    let now = Utc::now().with_timezone(&tz);
    let databases = if config.notion.databases.is_empty() {
        "(none configured)".to_string()
    } else {
        config
            .notion
            .databases
            .keys()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(", ")
    };

    format!(
        "# Role and Objective\n\
         You are {assistant_name}, the proactive personal assistant for {user_name}, \
         interacting via Telegram. You help {user_name} manage daily tasks, reminders, \
         calendar events, and their Notion databases, with concise and context-aware replies.\n\
         \n\
         # Instructions\n\
         - Keep responses concise and friendly. Response style: {style}\n\
         - Do not use markdown formatting; replies are delivered over Telegram.\n\
         - You can see and analyze images sent by {user_name}.\n\
         - Proactively store relevant memories with the memory tool.\n\
         - If {user_name} mentions something matching a Notion database name, use the notion tool.\n\
         - Actively use your tools instead of guessing. Plan before calling them and \
           reflect on each result.\n\
         - All datetimes you read or write are in the {timezone} time zone, \
           format YYYY-MM-DD HH:MM:SS.\n\
         \n\
         # Scheduled tasks\n\
         Messages starting with \"TASK <id>:\" are your own scheduled tasks coming due. \
         Carry out the instructions and report the outcome.\n\
         \n\
         # Notion\n\
         Available databases: {databases}\n\
         \n\
         # Contextual Information\n\
         - User name: {user_name}\n\
         - User role: {role}\n\
         - User bio: {bio}\n\
         - User location: {city}, {region}, {country}\n\
         \n\
         # Current Context\n\
         - Date: {date}\n\
         - Time: {time}\n\
         \n\
         # Memories\n\
         {memories}\n",
        assistant_name = assistant.name,
        user_name = user.name,
        style = assistant.response_style,
        timezone = tz,
        databases = databases,
        role = user.role,
        bio = user.bio,
        city = user.city,
        region = user.region,
        country = user.country,
        date = now.format("%Y-%m-%d"),
        time = now.format("%H:%M:%S"),
        memories = memories,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> Config {
        let mut config = Config::default();
        config.user.name = "Johannes".into();
        config.user.city = "Berlin".into();
        config.assistant.timezone = "Europe/Berlin".into();
        config
            .notion
            .databases
            .insert("recipes".into(), "db-1".into());
        config
    }

    #[test]
    fn prompt_contains_persona_databases_and_memories() {
        let config = config();
        let prompt = build_system_prompt(
            &config,
            chrono_tz::Europe::Berlin,
            "birthday: June 3rd",
        );
        assert!(prompt.contains("assistant for Johannes"));
        assert!(prompt.contains("Available databases: recipes"));
        assert!(prompt.contains("birthday: June 3rd"));
        assert!(prompt.contains("Europe/Berlin"));
    }

    #[test]
    fn prompt_notes_missing_databases() {
        let mut config = config();
        config.notion.databases.clear();
        let prompt = build_system_prompt(&config, chrono_tz::UTC, "No memories stored");
        assert!(prompt.contains("(none configured)"));
    }
}
