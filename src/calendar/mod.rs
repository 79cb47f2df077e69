use crate::store::tasks::DATETIME_FORMAT;
use anyhow::{anyhow, Context};
use chrono::{DateTime, Duration, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use serde_json::json;

const DEFAULT_BASE_URL: &str = "https://www.googleapis.com/calendar/v3";

// ─── Wire types ──────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct EventList {
    #[serde(default)]
    items: Vec<Event>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Event {
    #[serde(default)]
    id: String,
    #[serde(default)]
    summary: String,
    #[serde(default)]
    description: String,
    start: EventTime,
    end: EventTime,
    #[serde(rename = "htmlLink", default)]
    html_link: String,
}

/// Timed events carry `dateTime`, all-day events only `date`.
#[derive(Debug, Default, Serialize, Deserialize)]
struct EventTime {
    #[serde(rename = "dateTime", skip_serializing_if = "Option::is_none")]
    date_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    date: Option<String>,
    #[serde(rename = "timeZone", skip_serializing_if = "Option::is_none")]
    time_zone: Option<String>,
}

// ─── Client ──────────────────────────────────────────────────────────────────

/// Google Calendar v3 client. All user-facing datetimes use the configured
/// local time zone; the wire always carries UTC.
pub struct CalendarClient {
    client: reqwest::Client,
    cached_auth_header: String,
    base_url: String,
    calendar_id: String,
    tz: Tz,
}

impl CalendarClient {
    pub fn new(api_token: &str, calendar_id: &str, tz: Tz) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .connect_timeout(std::time::Duration::from_secs(10))
            .build()
            .context("failed to build calendar HTTP client")?;

        Ok(Self {
            client,
            cached_auth_header: format!("Bearer {api_token}"),
            base_url: DEFAULT_BASE_URL.to_string(),
            calendar_id: calendar_id.to_string(),
            tz,
        })
    }

    #[cfg(test)]
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    fn events_url(&self) -> String {
        format!("{}/calendars/{}/events", self.base_url, self.calendar_id)
    }

    fn local_to_utc(&self, raw: &str) -> anyhow::Result<DateTime<Utc>> {
        let naive = NaiveDateTime::parse_from_str(raw, DATETIME_FORMAT).with_context(|| {
            format!("invalid datetime '{raw}': expected format {DATETIME_FORMAT}")
        })?;
        let local = self
            .tz
            .from_local_datetime(&naive)
            .single()
            .ok_or_else(|| anyhow!("datetime '{raw}' is ambiguous or skipped in {}", self.tz))?;
        Ok(local.with_timezone(&Utc))
    }

    fn render_time(&self, time: &EventTime) -> String {
        if let Some(ref raw) = time.date_time {
            if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
                return parsed
                    .with_timezone(&self.tz)
                    .format(DATETIME_FORMAT)
                    .to_string();
            }
            return raw.clone();
        }
        time.date.clone().unwrap_or_default()
    }

    /// Events within `range_days` of now. A negative range looks back
    /// instead of forward.
    pub async fn list_events(&self, range_days: i64) -> anyhow::Result<String> {
        let now = Utc::now().with_timezone(&self.tz);
        let offset = now + Duration::days(range_days);
        let (time_min, time_max) = if range_days >= 0 {
            (now, offset)
        } else {
            (offset, now)
        };

        let response = self
            .client
            .get(self.events_url())
            .header("Authorization", &self.cached_auth_header)
            .query(&[
                ("timeMin", time_min.with_timezone(&Utc).to_rfc3339()),
                ("timeMax", time_max.with_timezone(&Utc).to_rfc3339()),
                ("maxResults", range_days.unsigned_abs().max(1).to_string()),
                ("singleEvents", "true".to_string()),
                ("orderBy", "startTime".to_string()),
            ])
            .send()
            .await
            .context("calendar request failed")?
            .error_for_status()
            .context("calendar list rejected")?;

        let list: EventList = response.json().await.context("malformed calendar reply")?;
        if list.items.is_empty() {
            return Ok("No events found.".to_string());
        }

        let lines: Vec<String> = list
            .items
            .iter()
            .map(|event| {
                let mut parts = vec![format!("Event: {}", event.summary)];
                if !event.description.is_empty() {
                    parts.push(format!("Description: {}", event.description));
                }
                parts.push(format!(
                    "When: {} to {} {}",
                    self.render_time(&event.start),
                    self.render_time(&event.end),
                    self.tz
                ));
                parts.push(format!("ID: {}", event.id));
                parts.join(" | ")
            })
            .collect();
        Ok(lines.join("\n"))
    }

    /// Create an event, or replace an existing one when `event_id` is given.
    pub async fn upsert_event(
        &self,
        event_id: Option<&str>,
        title: &str,
        description: &str,
        start_local: &str,
        end_local: &str,
    ) -> anyhow::Result<String> {
        let body = json!({
            "summary": title,
            "description": description,
            "start": {
                "dateTime": self.local_to_utc(start_local)?.to_rfc3339(),
                "timeZone": self.tz.name(),
            },
            "end": {
                "dateTime": self.local_to_utc(end_local)?.to_rfc3339(),
                "timeZone": self.tz.name(),
            },
        });

        let (request, verb) = match event_id {
            Some(id) => (
                self.client.put(format!("{}/{id}", self.events_url())),
                "updated",
            ),
            None => (self.client.post(self.events_url()), "created"),
        };

        let event: Event = request
            .header("Authorization", &self.cached_auth_header)
            .json(&body)
            .send()
            .await
            .context("calendar request failed")?
            .error_for_status()
            .context("calendar write rejected")?
            .json()
            .await
            .context("malformed calendar reply")?;

        Ok(format!("Event {verb}: {}", event.html_link))
    }

    pub async fn delete_event(&self, event_id: &str) -> anyhow::Result<String> {
        self.client
            .delete(format!("{}/{event_id}", self.events_url()))
            .header("Authorization", &self.cached_auth_header)
            .send()
            .await
            .context("calendar request failed")?
            .error_for_status()
            .context("calendar delete rejected")?;
        Ok(format!("Event {event_id} deleted successfully"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, Request, ResponseTemplate};

    fn client(server: &MockServer) -> CalendarClient {
        CalendarClient::new("cal-token", "primary", chrono_tz::Europe::Berlin)
            .unwrap()
            .with_base_url(&server.uri())
    }

    #[test]
    fn local_to_utc_applies_configured_zone() {
        let client = CalendarClient::new("t", "primary", chrono_tz::Europe::Berlin).unwrap();
        // Berlin is UTC+2 in summer.
        let utc = client.local_to_utc("2024-07-01 12:00:00").unwrap();
        assert_eq!(utc.to_rfc3339(), "2024-07-01T10:00:00+00:00");
    }

    #[test]
    fn local_to_utc_rejects_malformed_input() {
        let client = CalendarClient::new("t", "primary", chrono_tz::UTC).unwrap();
        let err = client.local_to_utc("noonish").unwrap_err();
        assert!(err.to_string().contains("%Y-%m-%d %H:%M:%S"));
    }

    #[tokio::test]
    async fn list_renders_events_in_local_time() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/calendars/primary/events"))
            .and(header("Authorization", "Bearer cal-token"))
            .and(query_param("singleEvents", "true"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "items": [{
                    "id": "ev1",
                    "summary": "Dentist",
                    "description": "bring insurance card",
                    "start": {"dateTime": "2024-07-01T10:00:00Z"},
                    "end": {"dateTime": "2024-07-01T11:00:00Z"},
                    "htmlLink": "https://calendar/ev1"
                }]
            })))
            .mount(&server)
            .await;

        let listing = client(&server).list_events(7).await.unwrap();
        assert!(listing.contains("Event: Dentist"));
        assert!(listing.contains("When: 2024-07-01 12:00:00 to 2024-07-01 13:00:00"));
        assert!(listing.contains("ID: ev1"));
    }

    #[tokio::test]
    async fn negative_range_swaps_bounds() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/calendars/primary/events"))
            .respond_with(move |request: &Request| {
                let query: std::collections::HashMap<_, _> =
                    request.url.query_pairs().collect();
                let min = query.get("timeMin").unwrap().to_string();
                let max = query.get("timeMax").unwrap().to_string();
                assert!(min < max, "timeMin {min} must precede timeMax {max}");
                ResponseTemplate::new(200).set_body_json(json!({"items": []}))
            })
            .mount(&server)
            .await;

        let listing = client(&server).list_events(-7).await.unwrap();
        assert_eq!(listing, "No events found.");
    }

    #[tokio::test]
    async fn upsert_without_id_creates() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/calendars/primary/events"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "new1",
                "summary": "Lunch",
                "start": {"dateTime": "2024-07-01T10:00:00Z"},
                "end": {"dateTime": "2024-07-01T11:00:00Z"},
                "htmlLink": "https://calendar/new1"
            })))
            .mount(&server)
            .await;

        let reply = client(&server)
            .upsert_event(
                None,
                "Lunch",
                "",
                "2024-07-01 12:00:00",
                "2024-07-01 13:00:00",
            )
            .await
            .unwrap();
        assert_eq!(reply, "Event created: https://calendar/new1");
    }

    #[tokio::test]
    async fn upsert_with_id_updates() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/calendars/primary/events/ev1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "ev1",
                "summary": "Lunch",
                "start": {"dateTime": "2024-07-01T10:00:00Z"},
                "end": {"dateTime": "2024-07-01T11:00:00Z"},
                "htmlLink": "https://calendar/ev1"
            })))
            .mount(&server)
            .await;

        let reply = client(&server)
            .upsert_event(
                Some("ev1"),
                "Lunch",
                "",
                "2024-07-01 12:00:00",
                "2024-07-01 13:00:00",
            )
            .await
            .unwrap();
        assert!(reply.starts_with("Event updated:"));
    }

    #[tokio::test]
    async fn delete_hits_event_resource() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/calendars/primary/events/ev1"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;

        let reply = client(&server).delete_event("ev1").await.unwrap();
        assert_eq!(reply, "Event ev1 deleted successfully");
    }
}
