//! Price resolution - live lookup under quota, catalog fallback otherwise.
//!
//! # Key Concepts
//! - Quota: shared budget of live-lookup attempts, consumed atomically
//! - Extraction: pure regex parsing of search snippets into price candidates
//! - Search: provider boundary (SerpAPI, DuckDuckGo, or disabled)
//! - Resolver: run-scoped, memoized, single-flight per tool name

mod duckduckgo;
mod extract;
mod quota;
mod resolver;
mod search;

pub use duckduckgo::DuckDuckGoSearch;
pub use extract::{extract_candidates, extract_price, Confidence, PriceBand, PriceCandidate};
pub use quota::{LookupQuota, QuotaWindow};
pub use resolver::{PriceResolver, Resolution, ResolverSettings, ResolverStats};
pub use search::{DisabledSearch, SearchError, SearchProvider, SerpApiSearch};

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

/// Currency of every quote; price extraction only reads dollar amounts.
pub const QUOTE_CURRENCY: &str = "USD";

/// Where a quote's price came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QuoteSource {
    Live,
    Fallback,
}

impl fmt::Display for QuoteSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Live => write!(f, "LIVE"),
            Self::Fallback => write!(f, "FALLBACK"),
        }
    }
}

/// Why live lookup did not produce the price.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FallbackReason {
    /// Our own lookup budget had no units left.
    QuotaExhausted,
    /// The search provider reported its account quota as spent.
    ProviderQuotaExhausted,
    /// Timeouts or 5xx responses outlasted the retry bound.
    TransientFailure,
    /// Provider rejected the request or reported an error.
    ProviderError,
    /// Response could not be decoded.
    MalformedResponse,
    /// Snippets held no price inside the validation band.
    NoValidCandidate,
    /// The run deadline abandoned the lookup.
    DeadlineExceeded,
    /// No search provider is configured (offline run); no quota was taken.
    LiveLookupDisabled,
}

impl FallbackReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::QuotaExhausted => "quota exhausted",
            Self::ProviderQuotaExhausted => "provider quota exhausted",
            Self::TransientFailure => "transient failure",
            Self::ProviderError => "provider error",
            Self::MalformedResponse => "malformed response",
            Self::NoValidCandidate => "no valid price found",
            Self::DeadlineExceeded => "deadline exceeded",
            Self::LiveLookupDisabled => "live lookup disabled",
        }
    }
}

impl fmt::Display for FallbackReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The authoritative price of one tool for one run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PriceQuote {
    pub tool_name: String,
    /// Per seat, per month.
    pub unit_price: f64,
    pub currency: String,
    pub source: QuoteSource,
    /// Set exactly when `source` is `Fallback`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback_reason: Option<FallbackReason>,
    /// Extraction confidence for live quotes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<Confidence>,
    pub resolved_at: DateTime<Utc>,
}

impl PriceQuote {
    /// Human-readable provenance, e.g. `LIVE` or `FALLBACK: quota exhausted`.
    pub fn provenance(&self) -> String {
        match self.fallback_reason {
            Some(reason) => format!("{}: {}", self.source, reason),
            None => self.source.to_string(),
        }
    }
}

/// Live lookup failed and the catalog has no baseline for the tool.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[error("no price could be determined for '{tool_name}' (live lookup: {reason})")]
pub struct UnresolvedPrice {
    pub tool_name: String,
    pub reason: FallbackReason,
}
