use anyhow::{anyhow, Context};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "https://api.notion.com/v1";
const NOTION_VERSION: &str = "2022-06-28";

/// Notion REST client. Databases are addressed by the friendly names
/// configured in `[notion.databases]`; structured payloads (filters,
/// properties, blocks) are passed through as opaque JSON strings.
pub struct NotionClient {
    client: reqwest::Client,
    cached_auth_header: String,
    base_url: String,
    databases: BTreeMap<String, String>,
}

impl NotionClient {
    pub fn new(api_token: &str, databases: BTreeMap<String, String>) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .context("failed to build Notion HTTP client")?;

        Ok(Self {
            client,
            cached_auth_header: format!("Bearer {api_token}"),
            base_url: DEFAULT_BASE_URL.to_string(),
            databases,
        })
    }

    #[cfg(test)]
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    fn resolve_database(&self, name: &str) -> anyhow::Result<&str> {
        self.databases.get(name).map(String::as_str).ok_or_else(|| {
            let available = self
                .databases
                .keys()
                .map(String::as_str)
                .collect::<Vec<_>>()
                .join(", ");
            anyhow!("Database '{name}' not found. Available databases: {available}")
        })
    }

    fn parse_payload(raw: &str, what: &str) -> anyhow::Result<Value> {
        serde_json::from_str(raw).with_context(|| format!("invalid JSON for {what}"))
    }

    async fn request(
        &self,
        request: reqwest::RequestBuilder,
        body: Option<Value>,
    ) -> anyhow::Result<String> {
        let mut request = request
            .header("Authorization", &self.cached_auth_header)
            .header("Notion-Version", NOTION_VERSION);
        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = request.send().await.context("Notion request failed")?;
        let status = response.status();
        let reply: Value = response.json().await.context("malformed Notion reply")?;
        if !status.is_success() {
            // The error body carries the actionable message.
            return Err(anyhow!(
                "Notion API error ({status}): {}",
                reply
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("no detail")
            ));
        }
        Ok(serde_json::to_string_pretty(&reply)?)
    }

    pub fn list_databases(&self) -> String {
        let names: Vec<&String> = self.databases.keys().collect();
        serde_json::to_string_pretty(&json!({
            "available_databases": names,
            "message": "Use one of these database names when working with Notion databases.",
        }))
        .unwrap_or_default()
    }

    pub async fn create_page(
        &self,
        title: &str,
        database_name: Option<&str>,
        parent_page_id: Option<&str>,
        properties_json: Option<&str>,
        content_blocks_json: Option<&str>,
    ) -> anyhow::Result<String> {
        let title_property = json!({"title": [{"text": {"content": title}}]});

        let (parent, mut properties) = match (database_name, parent_page_id) {
            (Some(name), _) => (
                json!({"database_id": self.resolve_database(name)?}),
                json!({"title": title_property}),
            ),
            (None, Some(page_id)) => (
                json!({"page_id": page_id}),
                json!({"title": title_property}),
            ),
            (None, None) => {
                return Err(anyhow!(
                    "A parent is required: pass database_name or parent_page_id. Available databases: {}",
                    self.databases
                        .keys()
                        .map(String::as_str)
                        .collect::<Vec<_>>()
                        .join(", ")
                ));
            }
        };

        if let Some(raw) = properties_json {
            let mut extra = Self::parse_payload(raw, "properties_json")?;
            if let (Some(properties), Some(extra)) =
                (properties.as_object_mut(), extra.as_object_mut())
            {
                // The main title wins over anything in the extra payload.
                extra.remove("title");
                properties.extend(extra.clone());
            }
        }

        let mut body = json!({"parent": parent, "properties": properties});
        if let Some(raw) = content_blocks_json {
            body["children"] = Self::parse_payload(raw, "content_blocks_json")?;
        }

        self.request(
            self.client.post(format!("{}/pages", self.base_url)),
            Some(body),
        )
        .await
    }

    pub async fn query_database(
        &self,
        database_name: &str,
        filter_json: Option<&str>,
        sorts_json: Option<&str>,
    ) -> anyhow::Result<String> {
        let database_id = self.resolve_database(database_name)?;
        let mut body = json!({});
        if let Some(raw) = filter_json {
            body["filter"] = Self::parse_payload(raw, "filter_json")?;
        }
        if let Some(raw) = sorts_json {
            body["sorts"] = Self::parse_payload(raw, "sorts_json")?;
        }

        self.request(
            self.client
                .post(format!("{}/databases/{database_id}/query", self.base_url)),
            Some(body),
        )
        .await
    }

    pub async fn add_page_content(
        &self,
        page_id: &str,
        content_blocks_json: &str,
    ) -> anyhow::Result<String> {
        let children = Self::parse_payload(content_blocks_json, "content_blocks_json")?;
        self.request(
            self.client
                .patch(format!("{}/blocks/{page_id}/children", self.base_url)),
            Some(json!({"children": children})),
        )
        .await
    }

    pub async fn get_page_content(&self, page_id: &str) -> anyhow::Result<String> {
        self.request(
            self.client
                .get(format!("{}/blocks/{page_id}/children", self.base_url)),
            None,
        )
        .await
    }

    pub async fn update_page_properties(
        &self,
        page_id: &str,
        properties_json: &str,
    ) -> anyhow::Result<String> {
        let properties = Self::parse_payload(properties_json, "properties_json")?;
        self.request(
            self.client
                .patch(format!("{}/pages/{page_id}", self.base_url)),
            Some(json!({"properties": properties})),
        )
        .await
    }
}
