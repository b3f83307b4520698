//! Categorizer: raw invoice names -> (canonical tool, category).
//!
//! Lookup order:
//! 1. Catalog match on the normalized name or one of its aliases
//! 2. The injected [`Classifier`] (typically an LLM)
//! 3. `UNCATEGORIZED`, with the normalized raw name as canonical name
//!
//! Results are cached per run by normalized raw name, so the same input always
//! yields the same answer within a run and the classifier is asked at most once
//! per distinct name.

mod llm;

pub use llm::LlmClassifier;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::{Mutex, OnceCell};
use tokio::time::Instant;

use crate::catalog::{normalize_name, Catalog};
use crate::model::UNCATEGORIZED;

/// Longest category label accepted from a classifier.
const MAX_CATEGORY_LEN: usize = 64;

/// Labels a classifier may use to say "I don't know"; treated as failures.
const NON_ANSWERS: &[&str] = &["uncategorized", "unknown", "none", "n/a", "other", "null"];

/// Why an external classification could not be used.
#[derive(Debug, Clone, Error)]
pub enum ClassifyError {
    #[error("classifier unavailable: {0}")]
    Unavailable(String),
    #[error("classifier request failed: {0}")]
    Request(String),
    #[error("classifier reply does not match the expected schema: {0}")]
    Schema(String),
    #[error("classifier returned an unusable category '{0}'")]
    InvalidCategory(String),
    #[error("classification abandoned at the run deadline")]
    DeadlineExceeded,
}

/// External capability that guesses a category for an unknown tool name.
#[async_trait]
pub trait Classifier: Send + Sync {
    async fn classify(&self, name: &str) -> Result<String, ClassifyError>;
}

/// Classifier for runs without credentials: every call fails.
pub struct UnavailableClassifier;

#[async_trait]
impl Classifier for UnavailableClassifier {
    async fn classify(&self, _name: &str) -> Result<String, ClassifyError> {
        Err(ClassifyError::Unavailable(
            "no classifier configured".to_string(),
        ))
    }
}

/// Where a categorization came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CategorySource {
    Catalog,
    Classifier,
    Uncategorized,
}

/// Result of categorizing one raw name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Categorization {
    pub canonical_name: String,
    pub category: String,
    pub source: CategorySource,
}

/// Run-scoped categorizer.
pub struct Categorizer {
    catalog: Arc<Catalog>,
    classifier: Arc<dyn Classifier>,
    deadline: Option<Instant>,
    cache: Mutex<HashMap<String, Arc<OnceCell<Categorization>>>>,
}

impl Categorizer {
    pub fn new(catalog: Arc<Catalog>, classifier: Arc<dyn Classifier>) -> Self {
        Self {
            catalog,
            classifier,
            deadline: None,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Classifier calls still pending at `deadline` are abandoned.
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub async fn categorize(&self, raw_name: &str) -> Categorization {
        let key = normalize_name(raw_name);
        let cell = {
            let mut cache = self.cache.lock().await;
            cache.entry(key.clone()).or_default().clone()
        };
        // Concurrent callers for one name share a single classifier call.
        cell.get_or_init(|| self.resolve(raw_name, &key))
            .await
            .clone()
    }

    async fn resolve(&self, raw_name: &str, key: &str) -> Categorization {
        if let Some(tool) = self.catalog.lookup(raw_name) {
            return Categorization {
                canonical_name: tool.canonical_name.clone(),
                category: tool.category.clone(),
                source: CategorySource::Catalog,
            };
        }

        match self.classify(raw_name).await {
            Ok(category) => {
                tracing::debug!("Classifier placed '{}' in '{}'", raw_name, category);
                Categorization {
                    canonical_name: raw_name.split_whitespace().collect::<Vec<_>>().join(" "),
                    category,
                    source: CategorySource::Classifier,
                }
            }
            Err(e) => {
                tracing::warn!("Could not categorize '{}': {}", raw_name, e);
                Categorization {
                    canonical_name: key.to_string(),
                    category: UNCATEGORIZED.to_string(),
                    source: CategorySource::Uncategorized,
                }
            }
        }
    }

    async fn classify(&self, raw_name: &str) -> Result<String, ClassifyError> {
        let call = self.classifier.classify(raw_name);
        let raw = match self.deadline {
            Some(deadline) => tokio::time::timeout_at(deadline, call)
                .await
                .map_err(|_| ClassifyError::DeadlineExceeded)??,
            None => call.await?,
        };
        self.validate_category(&raw)
    }

    fn validate_category(&self, raw: &str) -> Result<String, ClassifyError> {
        let category = raw.trim();
        let lowered = category.to_lowercase();
        if category.is_empty()
            || category.len() > MAX_CATEGORY_LEN
            || category.chars().any(char::is_control)
            || NON_ANSWERS.contains(&lowered.as_str())
        {
            return Err(ClassifyError::InvalidCategory(raw.to_string()));
        }
        Ok(self
            .catalog
            .canonical_category(category)
            .map(str::to_string)
            .unwrap_or_else(|| category.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingClassifier {
        answer: Result<String, ClassifyError>,
        calls: AtomicUsize,
    }

    impl CountingClassifier {
        fn new(answer: Result<String, ClassifyError>) -> Arc<Self> {
            Arc::new(Self {
                answer,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl Classifier for CountingClassifier {
        async fn classify(&self, _name: &str) -> Result<String, ClassifyError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.answer.clone()
        }
    }

    fn catalog() -> Arc<Catalog> {
        Arc::new(Catalog::builtin().unwrap())
    }

    #[tokio::test]
    async fn test_catalog_match_skips_classifier() {
        let classifier = CountingClassifier::new(Ok("Wrong".into()));
        let categorizer = Categorizer::new(catalog(), classifier.clone());

        let result = categorizer.categorize("  slack!! ").await;
        assert_eq!(result.canonical_name, "Slack");
        assert_eq!(result.category, "Communication");
        assert_eq!(result.source, CategorySource::Catalog);
        assert_eq!(classifier.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_classifier_fallback_adopts_catalog_spelling() {
        let classifier = CountingClassifier::new(Ok(" crm ".into()));
        let categorizer = Categorizer::new(catalog(), classifier);

        let result = categorizer.categorize("Pipedrive  Pro").await;
        assert_eq!(result.canonical_name, "Pipedrive Pro");
        assert_eq!(result.category, "CRM");
        assert_eq!(result.source, CategorySource::Classifier);
    }

    #[tokio::test]
    async fn test_unavailable_classifier_yields_uncategorized() {
        let categorizer = Categorizer::new(catalog(), Arc::new(UnavailableClassifier));

        let result = categorizer.categorize("Acme Internal Thing!").await;
        assert_eq!(result.category, UNCATEGORIZED);
        assert_eq!(result.canonical_name, "acme internal thing");
        assert_eq!(result.source, CategorySource::Uncategorized);
    }

    #[tokio::test]
    async fn test_non_answers_are_failures() {
        for answer in ["", "   ", "Unknown", "UNCATEGORIZED", "line\nbreak"] {
            let categorizer =
                Categorizer::new(catalog(), CountingClassifier::new(Ok(answer.to_string())));
            let result = categorizer.categorize("Mystery Tool").await;
            assert_eq!(result.category, UNCATEGORIZED, "answer {:?}", answer);
        }
    }

    #[tokio::test]
    async fn test_categorize_is_idempotent_and_cached() {
        let classifier = CountingClassifier::new(Ok("Analytics".into()));
        let categorizer = Categorizer::new(catalog(), classifier.clone());

        let first = categorizer.categorize("Mixpanel").await;
        let second = categorizer.categorize("mixpanel").await;
        let third = categorizer.categorize("Mixpanel").await;
        assert_eq!(first, second);
        assert_eq!(first, third);
        assert_eq!(classifier.calls.load(Ordering::SeqCst), 1);
    }

    struct SlowClassifier {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Classifier for SlowClassifier {
        async fn classify(&self, _name: &str) -> Result<String, ClassifyError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            Ok("Analytics".into())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_lookups_share_one_classifier_call() {
        let classifier = Arc::new(SlowClassifier {
            calls: AtomicUsize::new(0),
        });
        let categorizer = Categorizer::new(catalog(), classifier.clone());

        let names = ["Mixpanel", "mixpanel", "MIXPANEL!", "Mixpanel"];
        let results =
            futures::future::join_all(names.iter().map(|n| categorizer.categorize(n))).await;

        assert_eq!(classifier.calls.load(Ordering::SeqCst), 1);
        assert!(results.iter().all(|r| r.category == "Analytics"));
        assert!(results.iter().all(|r| *r == results[0]));
    }

    struct StalledClassifier;

    #[async_trait]
    impl Classifier for StalledClassifier {
        async fn classify(&self, _name: &str) -> Result<String, ClassifyError> {
            std::future::pending().await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_abandons_classifier() {
        let deadline = Instant::now() + std::time::Duration::from_secs(1);
        let categorizer =
            Categorizer::new(catalog(), Arc::new(StalledClassifier)).with_deadline(deadline);

        let result = categorizer.categorize("Slow Tool").await;
        assert_eq!(result.category, UNCATEGORIZED);
    }
}
