use super::{string_argument, AgentTool};
use crate::config::{is_set, Configuration};
use async_trait::async_trait;
use log::{debug, info};
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, AUTHORIZATION, CONTENT_TYPE, COOKIE, USER_AGENT};
use reqwest::{Client, Url};
use scraper::{ElementRef, Html, Selector};
use serde_json::{json, Value};
use std::error::Error;

pub static GOOGLE_URL: &str = "https://www.google.com";
pub static HOSTED_SEARCH_URL: &str = "https://delpha-recommender.delpha.io/global/v1/google-search";

static SEARCH_ERROR: &str = "Error performing Google search";
static RELATED_MARKER: &str = "See results about";
static LOCAL_USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/112.0.0.0 Safari/537.36";

/// How a query reaches the search engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchStrategy {
    /// POST the search URL to a hosted search proxy.
    Hosted { api_key: String, endpoint: String },
    /// GET the result page and extract the result blocks locally.
    Local,
}

impl SearchStrategy {
    /// The hosted proxy is only used outside local mode and with a key set.
    pub fn for_config(config: &Configuration) -> Self {
        if !config.local && is_set(&config.search_api_key) {
            SearchStrategy::Hosted {
                api_key: config.search_api_key.clone(),
                endpoint: HOSTED_SEARCH_URL.to_string(),
            }
        } else {
            SearchStrategy::Local
        }
    }
}

pub struct SearchTool {
    client: Client,
    strategy: SearchStrategy,
    base_url: String,
}

impl SearchTool {
    pub fn new(strategy: SearchStrategy) -> Self {
        SearchTool {
            client: Client::new(),
            strategy,
            base_url: GOOGLE_URL.to_string(),
        }
    }

    pub fn from_config(config: &Configuration) -> Self {
        Self::new(SearchStrategy::for_config(config))
    }

    /// Points the search engine somewhere else, used against mock servers.
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    pub fn strategy(&self) -> &SearchStrategy {
        &self.strategy
    }

    /// Result page URL for a query.
    pub fn search_url(&self, query: &str) -> Result<Url, String> {
        Url::parse_with_params(
            &format!("{}/search", self.base_url),
            &[
                ("q", query),
                ("hl", "en"),
                ("start", "0"),
                ("num", "10"),
                ("sourceid", "chrome"),
                ("ie", "UTF-8"),
            ],
        )
        .map_err(|e| e.to_string())
    }

    /// Runs the query and returns a newline joined digest of the result
    /// snippets, or an error message. Never fails.
    pub async fn search(&self, query: &str) -> String {
        info!("Searching for: {}", query);
        let url = match self.search_url(query) {
            Ok(url) => url,
            Err(e) => return format!("{}: {}", SEARCH_ERROR, e),
        };
        let result = match &self.strategy {
            SearchStrategy::Hosted { api_key, endpoint } => {
                self.hosted_search(&url, api_key, endpoint).await
            }
            SearchStrategy::Local => self.local_search(&url).await,
        };
        result.unwrap_or_else(|e| format!("{}: {}", SEARCH_ERROR, e))
    }

    async fn local_search(&self, url: &Url) -> Result<String, Box<dyn Error + Send + Sync>> {
        debug!("Local search at {}", url);
        let dom = self
            .client
            .get(url.clone())
            .header(USER_AGENT, LOCAL_USER_AGENT)
            .header(ACCEPT, "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8")
            .header(ACCEPT_LANGUAGE, "en-US,en;q=0.5")
            .header("DNT", "1")
            .header("Upgrade-Insecure-Requests", "1")
            .header(COOKIE, "CONSENT=YES+")
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        Ok(extract_results(&dom))
    }

    async fn hosted_search(
        &self,
        url: &Url,
        api_key: &str,
        endpoint: &str,
    ) -> Result<String, Box<dyn Error + Send + Sync>> {
        debug!("Hosted search through {}", endpoint);
        let response: Value = self
            .client
            .post(endpoint)
            .header(CONTENT_TYPE, "application/json;charset=UTF-8")
            .header(AUTHORIZATION, api_key)
            .json(&json!({ "url": url.as_str() }))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let snippets = response["results"]["searches_text"]
            .as_array()
            .ok_or("response has no results.searches_text")?;
        Ok(snippets
            .iter()
            .filter_map(|s| s.as_str())
            .collect::<Vec<_>>()
            .join("\n"))
    }
}

/// Extracts the text of every innermost result block of a result page.
///
/// A block is a `div.g` under `#search` that links somewhere, holds no other
/// result block and is not a "See results about" panel.
pub fn extract_results(dom: &str) -> String {
    let document = Html::parse_document(dom);
    let (Ok(block_selector), Ok(nested_selector), Ok(link_selector), Ok(span_selector)) = (
        Selector::parse("#search div.g"),
        Selector::parse("div.g"),
        Selector::parse("a[href]"),
        Selector::parse("span"),
    ) else {
        return String::new();
    };

    document
        .select(&block_selector)
        .filter(|block| {
            let has_link = block
                .select(&link_selector)
                .any(|a| a.value().attr("href").is_some_and(|href| !href.is_empty()));
            let has_nested = block
                .select(&nested_selector)
                .any(|inner| inner.id() != block.id());
            let is_related = block
                .select(&span_selector)
                .any(|span| span.text().collect::<String>().trim() == RELATED_MARKER);
            has_link && !has_nested && !is_related
        })
        .map(|block: ElementRef| block.text().collect::<String>())
        .collect::<Vec<_>>()
        .join("\n")
}

#[async_trait]
impl AgentTool for SearchTool {
    fn name(&self) -> String {
        "Google Searching tool".to_string()
    }

    fn description(&self) -> String {
        "Perform a google search with the given search value and return the text of the results."
            .to_string()
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "search_value": {
                    "type": "string",
                    "description": "The value to use as input for the search"
                }
            },
            "required": ["search_value"]
        })
    }

    async fn invoke(&self, input: Value) -> String {
        match string_argument(&input, "search_value") {
            Some(query) => self.search(&query).await,
            None => format!("{}: search_value is required", SEARCH_ERROR),
        }
    }
}
