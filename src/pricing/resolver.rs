//! Run-scoped price resolver.
//!
//! `resolve` is memoized per normalized tool name. The memo holds one
//! `OnceCell` per name, so concurrent callers for the same tool all await a
//! single in-flight resolution instead of issuing duplicate lookups.
//!
//! A live attempt sequence looks like:
//! 0. Skip straight to the fallback when the provider is disabled
//! 1. Take a lookup permit (bounds concurrent network calls)
//! 2. Take one quota unit, or give up with `QuotaExhausted`
//! 3. Search, extract, validate against the price band
//! 4. On a transient failure, back off and go to 2 (bounded retries)
//!
//! Any failure falls back to the catalog baseline; without one the tool is
//! unresolved. Cancellation or the run deadline abandons in-flight work.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::{Mutex, OnceCell, Semaphore};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::extract::{extract_price, PriceBand, PriceCandidate};
use super::quota::LookupQuota;
use super::search::{SearchError, SearchProvider};
use super::{FallbackReason, PriceQuote, QuoteSource, UnresolvedPrice, QUOTE_CURRENCY};
use crate::catalog::{normalize_name, Catalog};
use crate::retry::RetryConfig;

/// Outcome of resolving one tool.
pub type Resolution = Result<PriceQuote, UnresolvedPrice>;

/// Tunables for live lookups.
#[derive(Debug, Clone)]
pub struct ResolverSettings {
    pub band: PriceBand,
    pub top_k: usize,
    pub retry: RetryConfig,
    pub max_concurrent_lookups: usize,
}

impl Default for ResolverSettings {
    fn default() -> Self {
        Self {
            band: PriceBand::default(),
            top_k: 5,
            retry: RetryConfig::default(),
            max_concurrent_lookups: 4,
        }
    }
}

/// Counters for one resolver, i.e. one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ResolverStats {
    /// Quota units taken, one per search request issued.
    pub quota_consumed: u64,
    pub resolved_live: u64,
    pub resolved_fallback: u64,
    pub unresolved: u64,
}

#[derive(Default)]
struct Counters {
    quota_consumed: AtomicU64,
    resolved_live: AtomicU64,
    resolved_fallback: AtomicU64,
    unresolved: AtomicU64,
}

/// Why a live attempt sequence ended without a price.
#[derive(Debug, Error)]
enum LookupFailure {
    #[error("search provider disabled")]
    Disabled,
    #[error("lookup quota exhausted")]
    QuotaExhausted,
    #[error("{0}")]
    Search(SearchError),
    /// Transient errors outlasted the retry bound.
    #[error("retries exhausted, last error: {0}")]
    RetriesExhausted(SearchError),
    #[error("no price in the search results")]
    NoValidCandidate,
    #[error("abandoned at the run deadline")]
    Abandoned,
}

impl LookupFailure {
    fn reason(&self) -> FallbackReason {
        match self {
            Self::Disabled | Self::Search(SearchError::Disabled) => {
                FallbackReason::LiveLookupDisabled
            }
            Self::QuotaExhausted => FallbackReason::QuotaExhausted,
            Self::Search(SearchError::QuotaExhausted(_)) => FallbackReason::ProviderQuotaExhausted,
            Self::Search(SearchError::Malformed(_)) => FallbackReason::MalformedResponse,
            Self::Search(_) => FallbackReason::ProviderError,
            Self::RetriesExhausted(_) => FallbackReason::TransientFailure,
            Self::NoValidCandidate => FallbackReason::NoValidCandidate,
            Self::Abandoned => FallbackReason::DeadlineExceeded,
        }
    }
}

pub struct PriceResolver {
    catalog: Arc<Catalog>,
    search: Arc<dyn SearchProvider>,
    quota: Arc<LookupQuota>,
    settings: ResolverSettings,
    permits: Semaphore,
    cancel: CancellationToken,
    deadline: Option<Instant>,
    memo: Mutex<HashMap<String, Arc<OnceCell<Resolution>>>>,
    counters: Counters,
}

impl PriceResolver {
    pub fn new(
        catalog: Arc<Catalog>,
        search: Arc<dyn SearchProvider>,
        quota: Arc<LookupQuota>,
        settings: ResolverSettings,
    ) -> Self {
        let permits = Semaphore::new(settings.max_concurrent_lookups.max(1));
        Self {
            catalog,
            search,
            quota,
            settings,
            permits,
            cancel: CancellationToken::new(),
            deadline: None,
            memo: Mutex::new(HashMap::new()),
            counters: Counters::default(),
        }
    }

    /// Live lookups still running at `deadline` are abandoned.
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Live lookups are abandoned once `token` is cancelled.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Resolve a tool's price, at most once per run.
    pub async fn resolve(&self, tool_name: &str) -> Resolution {
        let cell = {
            let mut memo = self.memo.lock().await;
            memo.entry(normalize_name(tool_name)).or_default().clone()
        };
        cell.get_or_init(|| self.resolve_uncached(tool_name))
            .await
            .clone()
    }

    pub fn stats(&self) -> ResolverStats {
        ResolverStats {
            quota_consumed: self.counters.quota_consumed.load(Ordering::Relaxed),
            resolved_live: self.counters.resolved_live.load(Ordering::Relaxed),
            resolved_fallback: self.counters.resolved_fallback.load(Ordering::Relaxed),
            unresolved: self.counters.unresolved.load(Ordering::Relaxed),
        }
    }

    async fn resolve_uncached(&self, tool_name: &str) -> Resolution {
        match self.live_lookup(tool_name).await {
            Ok(candidate) => {
                self.counters.resolved_live.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(
                    "Live price for '{}': {} ({:?} confidence)",
                    tool_name,
                    candidate.amount,
                    candidate.confidence
                );
                Ok(PriceQuote {
                    tool_name: tool_name.to_string(),
                    unit_price: candidate.amount,
                    currency: QUOTE_CURRENCY.to_string(),
                    source: QuoteSource::Live,
                    fallback_reason: None,
                    confidence: Some(candidate.confidence),
                    resolved_at: Utc::now(),
                })
            }
            Err(failure) => self.fall_back(tool_name, failure),
        }
    }

    fn fall_back(&self, tool_name: &str, failure: LookupFailure) -> Resolution {
        let reason = failure.reason();
        match self.catalog.baseline_price(tool_name) {
            Some(price) => {
                tracing::warn!(
                    "Using catalog price for '{}' ({}): {}",
                    tool_name,
                    reason,
                    failure
                );
                self.counters.resolved_fallback.fetch_add(1, Ordering::Relaxed);
                Ok(PriceQuote {
                    tool_name: tool_name.to_string(),
                    unit_price: price,
                    currency: QUOTE_CURRENCY.to_string(),
                    source: QuoteSource::Fallback,
                    fallback_reason: Some(reason),
                    confidence: None,
                    resolved_at: Utc::now(),
                })
            }
            None => {
                tracing::warn!("No price for '{}' ({}): {}", tool_name, reason, failure);
                self.counters.unresolved.fetch_add(1, Ordering::Relaxed);
                Err(UnresolvedPrice {
                    tool_name: tool_name.to_string(),
                    reason,
                })
            }
        }
    }

    fn is_expired(&self) -> bool {
        self.cancel.is_cancelled() || self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// Completes when the run is cancelled or its deadline passes.
    async fn expired(&self) {
        match self.deadline {
            Some(deadline) => tokio::select! {
                _ = self.cancel.cancelled() => {}
                _ = tokio::time::sleep_until(deadline) => {}
            },
            None => self.cancel.cancelled().await,
        }
    }

    async fn live_lookup(&self, tool_name: &str) -> Result<PriceCandidate, LookupFailure> {
        if !self.search.is_enabled() {
            return Err(LookupFailure::Disabled);
        }
        let query = format!("{} pricing cost per user per month business plan", tool_name);
        let mut retry = 0;

        loop {
            if self.is_expired() {
                return Err(LookupFailure::Abandoned);
            }

            let _permit = tokio::select! {
                biased;
                _ = self.expired() => return Err(LookupFailure::Abandoned),
                permit = self.permits.acquire() => permit
                    .map_err(|_| LookupFailure::Search(SearchError::Provider("lookup pool closed".into())))?,
            };

            if !self.quota.try_acquire() {
                return Err(LookupFailure::QuotaExhausted);
            }
            self.counters.quota_consumed.fetch_add(1, Ordering::Relaxed);
            tracing::debug!("Live lookup for '{}' (attempt {})", tool_name, retry + 1);

            let result = tokio::select! {
                biased;
                _ = self.expired() => return Err(LookupFailure::Abandoned),
                r = self.search.search(&query, self.settings.top_k) => r,
            };

            let error = match result {
                Ok(snippets) => {
                    let text = snippets.join("\n");
                    return extract_price(&text, &self.settings.band)
                        .ok_or(LookupFailure::NoValidCandidate);
                }
                Err(e) => e,
            };

            if !error.is_transient() {
                return Err(LookupFailure::Search(error));
            }
            if retry >= self.settings.retry.max_retries {
                return Err(LookupFailure::RetriesExhausted(error));
            }

            let delay = self.settings.retry.delay_for(retry);
            tracing::debug!(
                "Lookup for '{}' failed transiently ({}), retrying in {:?}",
                tool_name,
                error,
                delay
            );
            drop(_permit);
            tokio::select! {
                biased;
                _ = self.expired() => return Err(LookupFailure::Abandoned),
                _ = tokio::time::sleep(delay) => {}
            }
            retry += 1;
        }
    }
}
