use super::traits::{require_str, Tool, ToolResult};
use async_trait::async_trait;
use ego_tree::NodeRef;
use scraper::node::Node;
use scraper::Html;
use serde_json::{json, Value};
use std::time::Duration;

/// Fetch a web page and reduce it to plain text the model can read.
pub struct UrlTool {
    client: reqwest::Client,
    max_chars: usize,
}

impl UrlTool {
    pub fn new(timeout_secs: u64, max_chars: usize) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .connect_timeout(Duration::from_secs(timeout_secs))
            .build()?;
        Ok(Self { client, max_chars })
    }
}

/// Text content of a document with script, style, and noscript subtrees
/// dropped and all whitespace runs collapsed to single spaces.
pub(crate) fn html_to_text(html: &str) -> String {
    fn collect(node: NodeRef<'_, Node>, out: &mut String) {
        match node.value() {
            Node::Element(element)
                if matches!(element.name(), "script" | "style" | "noscript") =>
            {
                return;
            }
            Node::Text(text) => {
                out.push_str(text);
                out.push(' ');
            }
            _ => {}
        }
        for child in node.children() {
            collect(child, out);
        }
    }

    let document = Html::parse_document(html);
    let mut raw = String::new();
    collect(document.tree.root(), &mut raw);
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

#[async_trait]
impl Tool for UrlTool {
    fn name(&self) -> &str {
        "url"
    }

    fn description(&self) -> &str {
        "Fetch a web page and return its visible text, truncated to a \
         readable length."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "url": {
                    "type": "string",
                    "description": "Absolute http(s) URL to fetch"
                }
            },
            "required": ["url"]
        })
    }

    async fn execute(&self, args: Value) -> anyhow::Result<ToolResult> {
        let raw_url = require_str(&args, "url")?;
        let url = match url::Url::parse(raw_url) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => url,
            Ok(url) => {
                return Ok(ToolResult::err(format!(
                    "Unsupported URL scheme '{}'",
                    url.scheme()
                )));
            }
            Err(e) => return Ok(ToolResult::err(format!("Invalid URL '{raw_url}': {e}"))),
        };

        // Network failures go back to the model as text, not as turn errors.
        let response = match self.client.get(url).send().await {
            Ok(response) => response,
            Err(e) => return Ok(ToolResult::err(format!("Fetch failed: {e}"))),
        };
        if !response.status().is_success() {
            return Ok(ToolResult::err(format!(
                "Fetch failed: HTTP {}",
                response.status()
            )));
        }
        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => return Ok(ToolResult::err(format!("Failed reading body: {e}"))),
        };

        let text = truncate_chars(&html_to_text(&body), self.max_chars);
        if text.is_empty() {
            return Ok(ToolResult::err("Page contained no readable text"));
        }
        Ok(ToolResult::ok(text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn html_to_text_drops_scripts_and_collapses_whitespace() {
        let html = r#"
            <html><head>
                <style>body { color: red; }</style>
                <script>alert("nope")</script>
            </head><body>
                <h1>Title</h1>
                <p>Some    spaced
                   text.</p>
                <noscript>enable js</noscript>
            </body></html>
        "#;
        let text = html_to_text(html);
        assert_eq!(text, "Title Some spaced text.");
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("short", 100), "short");
    }

    #[tokio::test]
    async fn fetch_extracts_and_truncates() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/page"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                "<html><body><p>aaaa bbbb cccc dddd</p></body></html>",
            ))
            .mount(&server)
            .await;

        let tool = UrlTool::new(10, 9).unwrap();
        let result = tool
            .execute(json!({"url": format!("{}/page", server.uri())}))
            .await
            .unwrap();
        assert!(result.success);
        assert_eq!(result.output, "aaaa bbbb");
    }

    #[tokio::test]
    async fn http_error_status_becomes_failed_result() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/missing"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let tool = UrlTool::new(10, 10_000).unwrap();
        let result = tool
            .execute(json!({"url": format!("{}/missing", server.uri())}))
            .await
            .unwrap();
        assert!(!result.success);
        assert!(result.error.unwrap().contains("404"));
    }

    #[tokio::test]
    async fn non_http_scheme_is_rejected() {
        let tool = UrlTool::new(10, 10_000).unwrap();
        let result = tool
            .execute(json!({"url": "file:///etc/passwd"}))
            .await
            .unwrap();
        assert!(!result.success);
        assert!(result.error.unwrap().contains("scheme"));
    }
}
