//! Web search provider boundary.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

use crate::retry::{classify_http_status, HttpFailure};

const SERPAPI_URL: &str = "https://serpapi.com/search";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Failure of a single search request.
#[derive(Debug, Clone, Error)]
pub enum SearchError {
    #[error("network error: {0}")]
    Network(String),
    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },
    #[error("provider quota exhausted: {0}")]
    QuotaExhausted(String),
    #[error("provider error: {0}")]
    Provider(String),
    #[error("malformed response: {0}")]
    Malformed(String),
    #[error("live search is disabled")]
    Disabled,
}

impl SearchError {
    /// Worth retrying after a short backoff.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Network(_) => true,
            Self::Http { status, .. } => matches!(
                classify_http_status(*status),
                HttpFailure::RateLimited | HttpFailure::ServerError
            ),
            _ => false,
        }
    }

    pub(crate) fn from_reqwest(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Network(format!("request timeout: {}", e))
        } else if e.is_connect() {
            Self::Network(format!("connection failed: {}", e))
        } else if e.is_decode() {
            Self::Malformed(e.to_string())
        } else {
            Self::Network(e.to_string())
        }
    }
}

/// Returns up to `top_k` text snippets for a query.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    async fn search(&self, query: &str, top_k: usize) -> Result<Vec<String>, SearchError>;

    /// `false` when no request will ever be made, so callers skip live lookup.
    fn is_enabled(&self) -> bool {
        true
    }
}

/// Provider for offline runs.
pub struct DisabledSearch;

#[async_trait]
impl SearchProvider for DisabledSearch {
    async fn search(&self, _query: &str, _top_k: usize) -> Result<Vec<String>, SearchError> {
        Err(SearchError::Disabled)
    }

    fn is_enabled(&self) -> bool {
        false
    }
}

/// SerpAPI (Google engine) search.
pub struct SerpApiSearch {
    client: reqwest::Client,
    api_key: String,
}

impl SerpApiSearch {
    pub fn new(api_key: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { client, api_key }
    }
}

#[derive(Debug, Deserialize)]
struct SerpApiResponse {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    organic_results: Vec<SerpApiResult>,
}

#[derive(Debug, Deserialize)]
struct SerpApiResult {
    #[serde(default)]
    title: String,
    #[serde(default)]
    snippet: String,
}

/// Turn a SerpAPI body into snippets, or the error it reports.
fn parse_serpapi(status: u16, body: &str, top_k: usize) -> Result<Vec<String>, SearchError> {
    let parsed: Result<SerpApiResponse, _> = serde_json::from_str(body);

    if let Ok(SerpApiResponse {
        error: Some(message),
        ..
    }) = &parsed
    {
        if message.to_lowercase().contains("run out of searches") {
            return Err(SearchError::QuotaExhausted(message.clone()));
        }
        if (200..300).contains(&status) {
            return Err(SearchError::Provider(message.clone()));
        }
    }

    if !(200..300).contains(&status) {
        return Err(SearchError::Http {
            status,
            message: body.chars().take(200).collect(),
        });
    }

    let parsed = parsed.map_err(|e| SearchError::Malformed(e.to_string()))?;
    Ok(parsed
        .organic_results
        .into_iter()
        .take(top_k)
        .map(|r| format!("{} {}", r.title, r.snippet).trim().to_string())
        .filter(|s| !s.is_empty())
        .collect())
}

#[async_trait]
impl SearchProvider for SerpApiSearch {
    async fn search(&self, query: &str, top_k: usize) -> Result<Vec<String>, SearchError> {
        let num = top_k.to_string();
        let response = self
            .client
            .get(SERPAPI_URL)
            .query(&[
                ("q", query),
                ("api_key", self.api_key.as_str()),
                ("engine", "google"),
                ("num", num.as_str()),
            ])
            .send()
            .await
            .map_err(SearchError::from_reqwest)?;

        let status = response.status().as_u16();
        let body = response.text().await.map_err(SearchError::from_reqwest)?;
        parse_serpapi(status, &body, top_k)
    }
}
