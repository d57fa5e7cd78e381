//! Serper Client
//!
//! Provides Google web search through the Serper JSON API.
//!
//! ## Ranking
//!
//! Serper returns results in Google's order. Results from agricultural
//! extension services, universities and government agencies are moved to the
//! front (stable), since their dosage and safety guidance is the most
//! trustworthy input for treatment extraction.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::config::SearchConfig;
use crate::types::{AppError, AppResult};

const SERPER_API_BASE: &str = "https://google.serper.dev";

/// One ranked web result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub title: String,
    pub snippet: String,
    pub url: String,
}

#[derive(Serialize)]
struct SerperRequest<'a> {
    q: &'a str,
    gl: &'a str,
    hl: &'a str,
    num: usize,
}

/// Serper client for web search
pub struct SerperClient {
    client: Client,
    api_key: String,
    base_url: String,
    country: String,
    max_results: usize,
}

impl SerperClient {
    pub fn new(api_key: String) -> Self {
        Self::with_client(Client::new(), api_key)
    }

    /// Reuse an existing connection pool
    pub fn with_client(client: Client, api_key: String) -> Self {
        Self {
            client,
            api_key,
            base_url: SERPER_API_BASE.to_string(),
            country: "us".to_string(),
            max_results: 8,
        }
    }

    /// Configure client from config
    pub fn from_config(client: Client, config: &SearchConfig) -> Option<Self> {
        if config.serper_api_key.trim().is_empty() {
            return None;
        }

        Some(
            Self::with_client(client, config.serper_api_key.clone())
                .with_base_url(&config.base_url)
                .with_country(&config.country)
                .with_max_results(config.max_results),
        )
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    pub fn with_country(mut self, country: &str) -> Self {
        self.country = country.to_string();
        self
    }

    /// Set maximum results per search
    pub fn with_max_results(mut self, max: usize) -> Self {
        self.max_results = max.max(1);
        self
    }

    /// Run one web search. An empty result list is not an error.
    pub async fn search(&self, query: &str) -> AppResult<Vec<SearchHit>> {
        info!(query = %query, "Searching the web via Serper");

        let response = self
            .client
            .post(format!("{}/search", self.base_url))
            .header("X-API-KEY", &self.api_key)
            .json(&SerperRequest {
                q: query,
                gl: &self.country,
                hl: "en",
                num: self.max_results,
            })
            .send()
            .await
            .map_err(|e| AppError::CapabilityUnavailable(format!("Serper request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(AppError::CapabilityUnavailable(format!(
                "Serper API error ({}): {}",
                status, error_text
            )));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| AppError::MalformedResponse(format!("Failed to parse Serper response: {}", e)))?;

        debug!("Raw Serper response received");

        let hits = parse_organic_results(&body, self.max_results);
        info!(count = hits.len(), "Serper search completed");
        Ok(hits)
    }
}

/// Turn Serper's `organic` array into ranked hits
fn parse_organic_results(body: &Value, max_results: usize) -> Vec<SearchHit> {
    let Some(organic) = body.get("organic").and_then(Value::as_array) else {
        return Vec::new();
    };

    let mut hits: Vec<SearchHit> = organic
        .iter()
        .take(max_results)
        .filter_map(|result| {
            let url = result.get("link").and_then(Value::as_str)?.to_string();
            let title = result
                .get("title")
                .and_then(Value::as_str)
                .unwrap_or("Untitled")
                .to_string();
            let snippet = result
                .get("snippet")
                .and_then(Value::as_str)
                .unwrap_or("")
                .to_string();
            Some(SearchHit { title, snippet, url })
        })
        .collect();

    // Stable: original order is kept within each group
    hits.sort_by_key(|hit| !is_extension_source(&hit.url));
    hits
}

/// Check if a URL belongs to an agricultural extension, research or government source
pub fn is_extension_source(url: &str) -> bool {
    let trusted_markers = [
        // Academic institutions and extension services
        ".edu",
        ".ac.uk",
        ".ac.in",
        "extension",
        "ipm.",
        // Government / intergovernmental
        ".gov",
        "fao.org",
        "icar.org.in",
        "ahdb.org.uk",
        // Plant health references
        "apsnet.org",
        "cabi.org",
        "plantwise",
        "rhs.org.uk",
        "wikipedia.org",
    ];

    let url_lower = url.to_lowercase();
    trusted_markers.iter().any(|marker| url_lower.contains(marker))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_is_extension_source() {
        assert!(is_extension_source("https://extension.umn.edu/diseases/early-blight"));
        assert!(is_extension_source("https://www.apsnet.org/edcenter"));
        assert!(is_extension_source("https://www.fao.org/plant-health"));
        assert!(!is_extension_source("https://random-garden-shop.com/blight-spray"));
    }

    #[test]
    fn test_parse_ranks_trusted_first() {
        let body = json!({
            "organic": [
                {"title": "Shop", "link": "https://shop.example.com/a", "snippet": "buy now"},
                {"title": "Ext", "link": "https://extension.psu.edu/b", "snippet": "apply copper"},
                {"title": "No link"},
                {"title": "Blog", "link": "https://blog.example.com/c", "snippet": "neem oil"}
            ]
        });

        let hits = parse_organic_results(&body, 10);
        let titles: Vec<_> = hits.iter().map(|h| h.title.as_str()).collect();
        assert_eq!(titles, vec!["Ext", "Shop", "Blog"]);
    }

    #[test]
    fn test_parse_missing_organic_is_empty() {
        assert!(parse_organic_results(&json!({"searchParameters": {}}), 10).is_empty());
    }

    #[tokio::test]
    async fn test_search_against_mock_server() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/search")
            .match_header("x-api-key", "serper-key")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"organic":[{"title":"Early blight","link":"https://extension.umd.edu/eb","snippet":"Use chlorothalonil"}]}"#)
            .create_async()
            .await;

        let client = SerperClient::new("serper-key".to_string()).with_base_url(&server.url());
        let hits = client.search("early blight tomato treatment").await.unwrap();

        mock.assert_async().await;
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].snippet, "Use chlorothalonil");
    }

    #[tokio::test]
    async fn test_search_http_error_is_unavailable() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/search")
            .with_status(401)
            .with_body("invalid key")
            .create_async()
            .await;

        let client = SerperClient::new("bad".to_string()).with_base_url(&server.url());
        let err = client.search("anything").await.unwrap_err();
        assert!(matches!(err, AppError::CapabilityUnavailable(_)));
    }
}
