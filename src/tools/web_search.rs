use super::ToolContext;
use crate::types::Tool;

use anyhow::{Context, Result};
use async_trait::async_trait;
use regex::Regex;
use schemars::JsonSchema;
use serde::Deserialize;
use std::sync::LazyLock;
use tracing::debug;

pub const WIKIPEDIA_ENDPOINT: &str = "https://en.wikipedia.org/w/api.php";
const RESULT_LIMIT: &str = "3";

static MARKUP: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<[^>]+>").expect("markup pattern is valid"));

#[derive(Debug, Default, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    query: SearchQuery,
}

#[derive(Debug, Default, Deserialize)]
struct SearchQuery {
    #[serde(default)]
    search: Vec<SearchHit>,
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    #[serde(default)]
    title: String,
    #[serde(default)]
    snippet: String,
}

/// Read-only client for the Wikipedia full-text search API.
#[derive(Debug, Clone)]
pub struct WikipediaSearch {
    http: reqwest::Client,
    endpoint: String,
    user_agent: String,
}

impl WikipediaSearch {
    pub fn new(contact: &str) -> Result<Self> {
        Self::with_endpoint(WIKIPEDIA_ENDPOINT, contact)
    }

    pub fn with_endpoint(endpoint: impl Into<String>, contact: &str) -> Result<Self> {
        let user_agent = format!(
            "{}/{} (personal, non-commercial chat client; searches are made by an AI model guided by a human; contact: {})",
            env!("CARGO_PKG_NAME"),
            env!("CARGO_PKG_VERSION"),
            contact
        );
        let http = reqwest::Client::builder()
            .user_agent(&user_agent)
            .build()
            .context("could not build http client")?;
        Ok(Self {
            http,
            endpoint: endpoint.into(),
            user_agent,
        })
    }

    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    pub async fn search(&self, query: &str) -> Result<String> {
        debug!(query, endpoint = %self.endpoint, "searching wikipedia");
        let response: SearchResponse = self
            .http
            .get(&self.endpoint)
            .query(&[
                ("action", "query"),
                ("list", "search"),
                ("srsearch", query),
                ("format", "json"),
                ("srlimit", RESULT_LIMIT),
                ("utf8", "1"),
            ])
            .send()
            .await
            .context("wikipedia search request failed")?
            .error_for_status()
            .context("wikipedia search returned an error status")?
            .json()
            .await
            .context("could not decode wikipedia search response")?;

        let hits = response.query.search;
        if hits.is_empty() {
            return Ok(format!(
                "No relevant Wikipedia articles found for '{query}'."
            ));
        }
        Ok(hits
            .iter()
            .map(|hit| format!("- {}: {}", hit.title, MARKUP.replace_all(&hit.snippet, "")))
            .collect::<Vec<_>>()
            .join("\n"))
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
#[schemars(
    title = "web_search",
    description = "Perform a web search to find information relevant to the query."
)]
pub struct WebSearch {
    #[schemars(description = "The search query string.")]
    pub query: String,
}

#[async_trait]
impl Tool for WebSearch {
    type Context = ToolContext;

    async fn apply(&self, context: &ToolContext) -> Result<String> {
        context.search.search(&self.query).await
    }

    fn from_inline(args: &str) -> Result<Self, serde_json::Error> {
        Ok(Self {
            query: args.trim().to_string(),
        })
    }
}
