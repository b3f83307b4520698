//! Reconciliation runs.
//!
//! # Key Concepts
//! - Run: one pass over both organizations' invoices, producing a report
//! - Catalog outlives runs; categorizer cache and price memo do not
//! - Quota: a fresh one per run for `PerRun`, one shared by every run for a
//!   rolling window or when supplied through [`Reconciler::with_quota`]
//! - Deadline: `result_timeout` after the run starts, plus an optional external
//!   cancellation token. Expiry degrades pending lookups to fallback prices,
//!   it never drops a group from the report.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::catalog::Catalog;
use crate::categorize::{Categorizer, Classifier};
use crate::compose::{compose, Recommendation};
use crate::config::Config;
use crate::detect::{detect, unique_tools};
use crate::model::{CategorizedInvoice, ToolInvoice};
use crate::pricing::{LookupQuota, PriceResolver, QuotaWindow, Resolution, SearchProvider};

/// Both organizations' invoices for one run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReconciliationInput {
    #[serde(default)]
    pub company_a_invoices: Vec<ToolInvoice>,
    #[serde(default)]
    pub company_b_invoices: Vec<ToolInvoice>,
}

/// An input record left out of the run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedInvoice {
    /// `company_a_invoices` or `company_b_invoices`.
    pub source: &'static str,
    pub index: usize,
    pub organization_id: String,
    pub raw_service_name: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UniqueTool {
    pub category: String,
    pub tool: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunMetadata {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub invoices_processed: usize,
    pub groups_detected: usize,
    /// Quota units taken this run; equals live lookup attempts.
    pub quota_consumed: u64,
    pub quotes_resolved_live: u64,
    pub quotes_resolved_fallback: u64,
    pub quotes_unresolved: u64,
    pub skipped_invoices: Vec<SkippedInvoice>,
    pub uncategorized_tools: Vec<String>,
    /// Categorized tools with no competitor in their category.
    pub unique_tools: Vec<UniqueTool>,
    pub deadline_exceeded: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReconciliationReport {
    /// Ordered by category.
    pub recommendations: Vec<Recommendation>,
    pub metadata: RunMetadata,
}

/// Long-lived engine: holds the catalog and collaborators.
pub struct Reconciler {
    catalog: Arc<Catalog>,
    classifier: Arc<dyn Classifier>,
    search: Arc<dyn SearchProvider>,
    /// Set for rolling windows; `None` means each run budgets on its own.
    shared_quota: Option<Arc<LookupQuota>>,
    config: Config,
}

impl Reconciler {
    pub fn new(
        catalog: Arc<Catalog>,
        classifier: Arc<dyn Classifier>,
        search: Arc<dyn SearchProvider>,
        config: Config,
    ) -> Self {
        let shared_quota = match config.quota_window {
            QuotaWindow::PerRun => None,
            window @ QuotaWindow::Rolling { .. } => {
                Some(Arc::new(LookupQuota::new(config.quota_budget, window)))
            }
        };
        Self {
            catalog,
            classifier,
            search,
            shared_quota,
            config,
        }
    }

    /// Draw every run's lookups from `quota`, shared with other engines.
    pub fn with_quota(mut self, quota: Arc<LookupQuota>) -> Self {
        self.shared_quota = Some(quota);
        self
    }

    fn run_quota(&self) -> Arc<LookupQuota> {
        match &self.shared_quota {
            Some(quota) => quota.clone(),
            None => Arc::new(LookupQuota::new(
                self.config.quota_budget,
                QuotaWindow::PerRun,
            )),
        }
    }

    pub async fn reconcile(&self, input: ReconciliationInput) -> ReconciliationReport {
        self.reconcile_with_cancellation(input, CancellationToken::new())
            .await
    }

    /// Run once; cancelling `cancel` has the same effect as the deadline passing.
    pub async fn reconcile_with_cancellation(
        &self,
        input: ReconciliationInput,
        cancel: CancellationToken,
    ) -> ReconciliationReport {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let deadline = Instant::now() + self.config.result_timeout();
        let workers = self.config.max_concurrency.max(1);
        let quota = self.run_quota();
        tracing::info!(
            "Run {} started: {} + {} invoices, {} lookups available",
            run_id,
            input.company_a_invoices.len(),
            input.company_b_invoices.len(),
            quota.remaining()
        );

        let (valid, skipped_invoices) = validate_invoices(input);

        let categorizer =
            Categorizer::new(self.catalog.clone(), self.classifier.clone()).with_deadline(deadline);
        let names: Vec<String> = valid.iter().map(|i| i.raw_service_name.clone()).collect();
        let categorizations: Vec<_> = stream::iter(names)
            .map(|name| {
                let categorizer = &categorizer;
                async move { categorizer.categorize(&name).await }
            })
            .buffered(workers)
            .collect()
            .await;
        let categorized: Vec<CategorizedInvoice> = valid
            .into_iter()
            .zip(categorizations)
            .map(|(invoice, c)| CategorizedInvoice {
                invoice,
                canonical_name: c.canonical_name,
                category: c.category,
            })
            .collect();

        let uncategorized_tools: Vec<String> = categorized
            .iter()
            .filter(|c| !c.is_categorized())
            .map(|c| c.canonical_name.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let org_sizes = organization_sizes(&categorized);
        let groups = detect(&categorized);
        let unique_tools = unique_tools(&categorized)
            .into_iter()
            .map(|(category, tool)| UniqueTool { category, tool })
            .collect();

        let resolver = PriceResolver::new(
            self.catalog.clone(),
            self.search.clone(),
            quota,
            self.config.resolver_settings(),
        )
        .with_deadline(deadline)
        .with_cancellation(cancel.clone());
        let policy = self.config.compose_policy();

        let mut recommendations: Vec<Recommendation> = stream::iter(0..groups.len())
            .map(|index| {
                let group = &groups[index];
                let resolver = &resolver;
                let org_sizes = &org_sizes;
                let policy = &policy;
                let names: Vec<String> = group.tool_names().map(String::from).collect();
                async move {
                    let quotes: HashMap<String, Resolution> =
                        futures::future::join_all(names.into_iter().map(|name| async move {
                            let resolution = resolver.resolve(&name).await;
                            (name, resolution)
                        }))
                        .await
                        .into_iter()
                        .collect();
                    compose(group, &quotes, org_sizes, policy)
                }
            })
            .buffer_unordered(workers)
            .collect()
            .await;
        recommendations.sort_by(|a, b| a.category.cmp(&b.category));

        let stats = resolver.stats();
        let deadline_exceeded = cancel.is_cancelled() || Instant::now() >= deadline;
        if deadline_exceeded {
            tracing::warn!("Run {} hit its deadline; pending lookups fell back", run_id);
        }
        tracing::info!(
            "Run {} finished: {} groups, {} live / {} fallback / {} unresolved quotes, {} lookups used",
            run_id,
            groups.len(),
            stats.resolved_live,
            stats.resolved_fallback,
            stats.unresolved,
            stats.quota_consumed
        );

        ReconciliationReport {
            recommendations,
            metadata: RunMetadata {
                run_id,
                started_at,
                finished_at: Utc::now(),
                invoices_processed: categorized.len(),
                groups_detected: groups.len(),
                quota_consumed: stats.quota_consumed,
                quotes_resolved_live: stats.resolved_live,
                quotes_resolved_fallback: stats.resolved_fallback,
                quotes_unresolved: stats.unresolved,
                skipped_invoices,
                uncategorized_tools,
                unique_tools,
                deadline_exceeded,
            },
        }
    }
}

fn validate_invoices(input: ReconciliationInput) -> (Vec<ToolInvoice>, Vec<SkippedInvoice>) {
    let mut valid = Vec::new();
    let mut skipped = Vec::new();
    let sources = [
        ("company_a_invoices", input.company_a_invoices),
        ("company_b_invoices", input.company_b_invoices),
    ];
    for (source, invoices) in sources {
        for (index, invoice) in invoices.into_iter().enumerate() {
            match invoice.validate() {
                Ok(()) => valid.push(invoice),
                Err(e) => {
                    tracing::warn!("Skipping {}[{}]: {}", source, index, e);
                    skipped.push(SkippedInvoice {
                        source,
                        index,
                        organization_id: invoice.organization_id,
                        raw_service_name: invoice.raw_service_name,
                        reason: e.to_string(),
                    });
                }
            }
        }
    }
    (valid, skipped)
}

/// Declared seats per organization over its valid invoices.
fn organization_sizes(invoices: &[CategorizedInvoice]) -> HashMap<String, u64> {
    let mut sizes: HashMap<String, u64> = HashMap::new();
    for item in invoices {
        let seats = item.invoice.declared_user_count.map(u64::from).unwrap_or(0);
        *sizes.entry(item.invoice.organization_id.clone()).or_default() += seats;
    }
    sizes
}
