use anyhow::anyhow;
use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::info;
use triage_flow::{ProductSearch, SearchHit, ServiceError};

const SEARCH_URL: &str = "https://api.firecrawl.dev/v1/search";

/// Web search through Firecrawl
pub struct FirecrawlSearch {
    http: reqwest::Client,
    api_key: String,
}

impl FirecrawlSearch {
    pub fn new(http: reqwest::Client, api_key: String) -> Self {
        Self { http, api_key }
    }
}

#[async_trait]
impl ProductSearch for FirecrawlSearch {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>, ServiceError> {
        let response = self
            .http
            .post(SEARCH_URL)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&json!({
                "query": query,
                "limit": limit
            }))
            .send()
            .await
            .map_err(anyhow::Error::from)?;

        if !response.status().is_success() {
            return Err(anyhow!("Firecrawl search failed: {}", response.status()).into());
        }

        let body: Value = response.json().await.map_err(anyhow::Error::from)?;
        let hits = parse_hits(&body)?;
        info!(count = hits.len(), "Product search finished");
        Ok(hits)
    }
}

fn parse_hits(body: &Value) -> Result<Vec<SearchHit>, ServiceError> {
    if body["success"].as_bool() == Some(false) {
        return Err(ServiceError::InvalidResponse(
            body["error"]
                .as_str()
                .unwrap_or("search was not successful")
                .to_string(),
        ));
    }

    Ok(body["data"]
        .as_array()
        .map(|results| {
            results
                .iter()
                .map(|result| SearchHit {
                    url: result["url"].as_str().unwrap_or_default().to_string(),
                })
                .collect()
        })
        .unwrap_or_default())
}
