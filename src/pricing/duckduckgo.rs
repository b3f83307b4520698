//! Key-less search through the DuckDuckGo HTML endpoint.

use std::time::Duration;

use async_trait::async_trait;

use super::search::{SearchError, SearchProvider};

const DDG_URL: &str = "https://html.duckduckgo.com/html/";

pub struct DuckDuckGoSearch {
    client: reqwest::Client,
}

impl DuckDuckGoSearch {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .user_agent("Mozilla/5.0 (compatible; stack-harmonizer/0.1)")
            .timeout(Duration::from_secs(15))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { client }
    }
}

impl Default for DuckDuckGoSearch {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SearchProvider for DuckDuckGoSearch {
    async fn search(&self, query: &str, top_k: usize) -> Result<Vec<String>, SearchError> {
        let url = format!("{}?q={}", DDG_URL, urlencoding::encode(query));
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(SearchError::from_reqwest)?;

        let status = response.status();
        let html = response.text().await.map_err(SearchError::from_reqwest)?;
        if !status.is_success() {
            return Err(SearchError::Http {
                status: status.as_u16(),
                message: html.chars().take(200).collect(),
            });
        }
        if !html.contains("result__body") && !html.contains("no-results") {
            return Err(SearchError::Malformed(
                "page has no result markup".to_string(),
            ));
        }

        Ok(extract_results(&html, top_k))
    }
}

/// Pull `title snippet` pairs out of the result page.
fn extract_results(html: &str, top_k: usize) -> Vec<String> {
    html.split("result__body")
        .skip(1)
        .take(top_k)
        .filter_map(|chunk| {
            let title = element_text(chunk, "class=\"result__a\"");
            let snippet = element_text(chunk, "class=\"result__snippet\"");
            let text = format!("{} {}", title.unwrap_or_default(), snippet.unwrap_or_default());
            let text = html_decode(text.trim());
            (!text.is_empty()).then_some(text)
        })
        .collect()
}

/// Text of the first element carrying `marker`, with inline tags removed.
fn element_text(chunk: &str, marker: &str) -> Option<String> {
    let after = chunk.split(marker).nth(1)?;
    let open_end = after.find('>')?;
    let inner = &after[open_end + 1..];
    let close = inner.find("</a>").or_else(|| inner.find("</div>"))?;
    Some(strip_tags(&inner[..close]))
}

fn strip_tags(fragment: &str) -> String {
    let mut out = String::with_capacity(fragment.len());
    let mut in_tag = false;
    for c in fragment.chars() {
        match c {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => out.push(c),
            _ => {}
        }
    }
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Basic HTML entity decoding.
fn html_decode(s: &str) -> String {
    s.replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&#x27;", "'")
        .replace("&nbsp;", " ")
}
