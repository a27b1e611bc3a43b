//! Client for the web-search service.

use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("request failed: {0}")]
    Request(String),

    #[error("search API error: {0}")]
    Api(String),

    #[error("unexpected response: {0}")]
    Parse(String),
}

#[derive(Debug, Clone)]
pub struct SearchConfig {
    pub base_url: String,
    pub api_key: String,
}

impl SearchConfig {
    pub fn from_env() -> Option<Self> {
        let api_key = std::env::var("SEARCH_API_KEY").ok()?;
        let base_url = std::env::var("SEARCH_API_URL").ok()?;
        Some(Self { base_url, api_key })
    }
}

/// One search result.
#[derive(Debug, Clone, Deserialize)]
pub struct SearchHit {
    pub title: String,
    pub url: String,
    #[serde(default)]
    pub snippet: Option<String>,
}

#[derive(Deserialize)]
struct SearchResponse {
    results: Vec<SearchHit>,
}

/// Thin client over the retrieval service's search endpoint.
pub struct SearchClient {
    client: reqwest::Client,
    config: SearchConfig,
}

impl SearchClient {
    pub fn new(config: SearchConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    pub async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>, SearchError> {
        let response = self
            .client
            .get(format!("{}/search", self.config.base_url))
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .query(&[("q", query), ("limit", &limit.to_string())])
            .send()
            .await
            .map_err(|e| SearchError::Request(e.to_string()))?;

        if !response.status().is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(SearchError::Api(text));
        }

        let parsed: SearchResponse = response
            .json()
            .await
            .map_err(|e| SearchError::Parse(e.to_string()))?;
        Ok(parsed.results)
    }
}
