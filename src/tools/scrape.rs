use super::{string_argument, AgentTool};
use async_trait::async_trait;
use log::info;
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, CONNECTION, REFERER, USER_AGENT};
use reqwest::Client;
use scraper::Html;
use serde_json::{json, Value};
use std::time::Duration;

pub static SCRAPE_TIMEOUT: Duration = Duration::from_secs(15);

static SCRAPE_ERROR: &str = "Error scraping website";
static BROWSER_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/96.0.4664.110 Safari/537.36";

/// Elements whose content is never rendered.
static HIDDEN_TAGS: [&str; 5] = ["script", "style", "noscript", "template", "head"];

/// Elements starting a new line of text.
static BLOCK_TAGS: [&str; 22] = [
    "address", "article", "aside", "blockquote", "br", "dd", "div", "dl", "dt", "footer", "form",
    "h1", "h2", "h3", "h4", "h5", "h6", "header", "li", "p", "section", "tr",
];

pub struct ScrapeTool {
    client: Client,
    timeout: Duration,
}

impl Default for ScrapeTool {
    fn default() -> Self {
        Self::new()
    }
}

impl ScrapeTool {
    pub fn new() -> Self {
        ScrapeTool {
            client: Client::new(),
            timeout: SCRAPE_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Fetches a page and returns its visible text, or an error message
    /// starting with `Error scraping website:`. Never fails.
    pub async fn scrape(&self, url: &str) -> String {
        info!("Scraping: {}", url);
        match self.fetch(url).await {
            Ok(html) => visible_text(&html),
            Err(e) => format!("{}: {}", SCRAPE_ERROR, e),
        }
    }

    async fn fetch(&self, url: &str) -> Result<String, reqwest::Error> {
        self.client
            .get(url)
            .timeout(self.timeout)
            .header(USER_AGENT, BROWSER_USER_AGENT)
            .header(
                ACCEPT,
                "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,image/apng,*/*;q=0.8",
            )
            .header(ACCEPT_LANGUAGE, "en-US,en;q=0.9")
            .header(REFERER, "https://www.google.com/")
            .header(CONNECTION, "keep-alive")
            .header("Upgrade-Insecure-Requests", "1")
            .send()
            .await?
            .error_for_status()?
            .text()
            .await
    }
}

/// Visible text of a document, one line per block with whitespace collapsed
/// and blank lines dropped.
pub fn visible_text(html: &str) -> String {
    let document = Html::parse_document(html);
    let mut raw = String::new();

    for node in document.root_element().descendants() {
        if let Some(element) = node.value().as_element() {
            if BLOCK_TAGS.contains(&element.name()) {
                raw.push('\n');
            }
        } else if let Some(text) = node.value().as_text() {
            let hidden = node.ancestors().any(|ancestor| {
                ancestor
                    .value()
                    .as_element()
                    .is_some_and(|e| HIDDEN_TAGS.contains(&e.name()))
            });
            if !hidden {
                raw.push_str(text);
            }
        }
    }

    collapse_whitespace(&raw)
}

pub fn collapse_whitespace(text: &str) -> String {
    text.lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

#[async_trait]
impl AgentTool for ScrapeTool {
    fn name(&self) -> String {
        "Scraping tool".to_string()
    }

    fn description(&self) -> String {
        "Scrap the content of a website and return its visible text.".to_string()
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "website_url": {
                    "type": "string",
                    "description": "The url of the website to scrap"
                }
            },
            "required": ["website_url"]
        })
    }

    async fn invoke(&self, input: Value) -> String {
        match string_argument(&input, "website_url") {
            Some(url) => self.scrape(url.trim()).await,
            None => format!("{}: website_url is required", SCRAPE_ERROR),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"<html>
        <head><title>Ignored</title><style>body { color: red; }</style></head>
        <body>
            <h1>Kubernetes   autoscaling</h1>


            <p>The <b>Horizontal</b> Pod Autoscaler
               scales pods.</p>
            <script>var hidden = true;</script>
            <ul><li>CPU</li><li>Memory</li></ul>
        </body>
    </html>"#;

    #[test]
    fn test_visible_text_is_normalized() {
        let text = visible_text(PAGE);
        assert_eq!(
            text,
            "Kubernetes autoscaling\nThe Horizontal Pod Autoscaler\nscales pods.\nCPU\nMemory"
        );
    }

    #[test]
    fn test_collapse_whitespace() {
        assert_eq!(collapse_whitespace("  a \t b\n\n\n c  \n"), "a b\nc");
        assert_eq!(collapse_whitespace("\n \n"), "");
    }

    #[tokio::test]
    async fn test_scrape_returns_text() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/")
            .match_header("referer", "https://www.google.com/")
            .with_status(200)
            .with_header("content-type", "text/html")
            .with_body(PAGE)
            .create_async()
            .await;

        let tool = ScrapeTool::new();
        let text = tool
            .invoke(json!({ "website_url": format!("{}/", server.url()) }))
            .await;

        mock.assert_async().await;
        assert!(text.starts_with("Kubernetes autoscaling"));
        assert!(!text.contains("hidden"));
    }

    #[tokio::test]
    async fn test_scrape_server_error_becomes_text() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/")
            .with_status(500)
            .with_body("boom")
            .create_async()
            .await;

        let text = ScrapeTool::new().scrape(&format!("{}/", server.url())).await;
        assert!(text.starts_with("Error scraping website:"));
    }

    #[tokio::test]
    async fn test_scrape_unreachable_or_invalid_url() {
        let tool = ScrapeTool::new().with_timeout(Duration::from_secs(2));
        assert!(tool
            .scrape("http://127.0.0.1:1/")
            .await
            .starts_with("Error scraping website:"));
        assert!(tool
            .scrape("not a url")
            .await
            .starts_with("Error scraping website:"));
        assert!(tool
            .invoke(json!({}))
            .await
            .starts_with("Error scraping website:"));
    }
}
