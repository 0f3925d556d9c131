//! 웹 검색 툴 (Tavily)
//!
//! ref: https://docs.tavily.com/documentation/api-reference/endpoint/search

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::{required_str, Tool};

pub const TAVILY_BASE_URL: &str = "https://api.tavily.com";
const MAX_RESULTS: usize = 5;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Serialize)]
struct SearchRequest<'a> {
    api_key: &'a str,
    query: &'a str,
    max_results: usize,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<SearchHit>,
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    #[serde(default)]
    title: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    content: String,
}

/// Tavily 검색 툴
#[derive(Debug, Clone)]
pub struct WebSearchTool {
    api_key: String,
    endpoint: String,
    client: reqwest::Client,
}

impl WebSearchTool {
    pub fn new(api_key: String) -> Result<Self> {
        Self::with_base_url(api_key, TAVILY_BASE_URL)
    }

    pub fn with_base_url(api_key: String, base_url: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            api_key,
            endpoint: format!("{}/search", base_url.trim_end_matches('/')),
            client,
        })
    }
}

#[async_trait]
impl Tool for WebSearchTool {
    fn name(&self) -> &str {
        "web_search"
    }

    fn description(&self) -> &str {
        "Search the web for current information. Use for questions the documents cannot answer."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": {"type": "string", "description": "Search query"}
            },
            "required": ["query"]
        })
    }

    async fn invoke(&self, args: Value) -> Result<String> {
        let query = required_str(&args, "query")?;

        let response = self
            .client
            .post(&self.endpoint)
            .json(&SearchRequest {
                api_key: &self.api_key,
                query,
                max_results: MAX_RESULTS,
            })
            .send()
            .await
            .context("Failed to send search request")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("search API error ({}): {}", status, body);
        }

        let results: SearchResponse = response
            .json()
            .await
            .context("Failed to parse search response")?;

        if results.results.is_empty() {
            return Ok("No results found.".to_string());
        }

        Ok(results
            .results
            .iter()
            .enumerate()
            .map(|(i, hit)| format!("[{}] {} ({})\n{}", i + 1, hit.title, hit.url, hit.content))
            .collect::<Vec<_>>()
            .join("\n\n"))
    }
}
