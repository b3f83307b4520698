//! stack-harmonizer - command-line entry point
//!
//! Reads a reconciliation request (`{company_a_invoices, company_b_invoices}`)
//! from a file or stdin and writes the JSON report to stdout. Logs go to
//! stderr.

use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing::info;

use stack_harmonizer::categorize::{Classifier, LlmClassifier, UnavailableClassifier};
use stack_harmonizer::llm::OpenRouterClient;
use stack_harmonizer::pricing::{DisabledSearch, DuckDuckGoSearch, SearchProvider, SerpApiSearch};
use stack_harmonizer::{Catalog, Config, ReconciliationInput, Reconciler};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum SearchBackend {
    /// SerpAPI when a key is set, DuckDuckGo otherwise
    Auto,
    Serpapi,
    Duckduckgo,
    None,
}

/// Command-line arguments for stack-harmonizer
#[derive(Parser, Debug)]
#[command(name = "stack-harmonizer")]
#[command(about = "Reconcile two organizations' software tools and recommend consolidations")]
#[command(version)]
struct Args {
    /// Request file; reads stdin when omitted or "-"
    input: Option<PathBuf>,

    /// Catalog JSON replacing the built-in one
    #[arg(long, env = "HARMONIZER_CATALOG")]
    catalog: Option<PathBuf>,

    /// Settings JSON; environment defaults are used without it
    #[arg(long, env = "HARMONIZER_SETTINGS")]
    settings: Option<PathBuf>,

    /// No live price lookups and no classifier calls
    #[arg(long)]
    offline: bool,

    #[arg(long, value_enum, default_value = "auto")]
    search: SearchBackend,

    #[arg(long, env = "SEARCH_API_KEY", hide_env_values = true)]
    search_api_key: Option<String>,

    #[arg(long, env = "OPENROUTER_API_KEY", hide_env_values = true)]
    openrouter_api_key: Option<String>,

    /// OpenAI-compatible chat completions URL used instead of OpenRouter
    #[arg(long, env = "HARMONIZER_CLASSIFIER_ENDPOINT")]
    classifier_endpoint: Option<String>,

    /// Model used to classify tools the catalog does not know
    #[arg(long, env = "HARMONIZER_CLASSIFIER_MODEL", default_value = "openai/gpt-4o-mini")]
    classifier_model: String,

    /// Pretty-print the report
    #[arg(long)]
    pretty: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let catalog = match &args.catalog {
        Some(path) => Catalog::load(path)
            .with_context(|| format!("Failed to load catalog from {}", path.display()))?,
        None => Catalog::builtin().context("Built-in catalog is invalid")?,
    };
    if catalog.is_empty() {
        tracing::warn!("Catalog is empty; every tool will need the classifier");
    } else {
        info!("Catalog ready: {} tools", catalog.len());
    }
    let catalog = Arc::new(catalog);

    let config = Config::load(args.settings.as_deref());
    config.validate().context("Invalid settings")?;

    let input = read_input(args.input.as_ref()).context("Failed to read request")?;

    let reconciler = Reconciler::new(
        catalog.clone(),
        classifier(&args, &catalog),
        search_provider(&args),
        config,
    );

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted; finishing with fallback prices");
            on_interrupt.cancel();
        }
    });

    let report = reconciler.reconcile_with_cancellation(input, cancel).await;

    let json = if args.pretty {
        serde_json::to_string_pretty(&report)
    } else {
        serde_json::to_string(&report)
    }
    .context("Failed to serialize report")?;
    println!("{}", json);
    Ok(())
}

fn read_input(path: Option<&PathBuf>) -> Result<ReconciliationInput> {
    let raw = match path {
        Some(path) if path.as_os_str() != "-" => std::fs::read_to_string(path)
            .with_context(|| format!("Cannot read {}", path.display()))?,
        _ => {
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf)?;
            buf
        }
    };
    serde_json::from_str(&raw).context("Request is not a valid reconciliation request")
}

fn classifier(args: &Args, catalog: &Catalog) -> Arc<dyn Classifier> {
    match (&args.openrouter_api_key, args.offline) {
        (Some(key), false) => {
            info!("Classifier: {} via OpenRouter", args.classifier_model);
            let client = Arc::new(match &args.classifier_endpoint {
                Some(url) => OpenRouterClient::with_base_url(key.clone(), url.clone()),
                None => OpenRouterClient::new(key.clone()),
            });
            let categories = catalog.categories().into_iter().map(String::from).collect();
            Arc::new(LlmClassifier::new(client, args.classifier_model.clone(), categories))
        }
        _ => {
            info!("Classifier: unavailable, unknown tools will be uncategorized");
            Arc::new(UnavailableClassifier)
        }
    }
}

fn search_provider(args: &Args) -> Arc<dyn SearchProvider> {
    let backend = if args.offline { SearchBackend::None } else { args.search };
    match (backend, &args.search_api_key) {
        (SearchBackend::None, _) => {
            info!("Search: disabled, catalog prices only");
            Arc::new(DisabledSearch)
        }
        (SearchBackend::Auto | SearchBackend::Serpapi, Some(key)) => {
            info!("Search: SerpAPI");
            Arc::new(SerpApiSearch::new(key.clone()))
        }
        (SearchBackend::Serpapi, None) => {
            tracing::warn!("SerpAPI selected but SEARCH_API_KEY is not set; live search disabled");
            Arc::new(DisabledSearch)
        }
        (SearchBackend::Auto | SearchBackend::Duckduckgo, _) => {
            info!("Search: DuckDuckGo");
            Arc::new(DuckDuckGoSearch::new())
        }
    }
}
