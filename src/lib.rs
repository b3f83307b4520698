//! # Stack Harmonizer
//!
//! Reconciles the software-tool inventories of two merging organizations,
//! finds categories served by more than one tool, prices each tool and
//! recommends which to keep.
//!
//! ## Pipeline
//!
//! ```text
//!   invoices (org A + org B)
//!            │
//!            ▼
//!   ┌─────────────────┐     catalog, then classifier
//!   │   Categorizer   │
//!   └────────┬────────┘
//!            ▼
//!   ┌─────────────────┐     ≥2 distinct tools per category
//!   │    Detector     │
//!   └────────┬────────┘
//!            ▼
//!   ┌─────────────────┐     live search under quota,
//!   │  PriceResolver  │     catalog baseline otherwise
//!   └────────┬────────┘
//!            ▼
//!   ┌─────────────────┐     MIGRATE / KEEP / REVIEW
//!   │    Composer     │     + annual savings
//!   └─────────────────┘
//! ```
//!
//! ## Modules
//! - `catalog`: known tools, categories and baseline prices
//! - `categorize`: raw name to category, with an LLM classifier fallback
//! - `pricing`: quota, search providers, price extraction, resolver
//! - `detect`: redundancy groups
//! - `savings` / `compose`: the decision per group
//! - `engine`: one reconciliation run end to end

pub mod catalog;
pub mod categorize;
pub mod compose;
pub mod config;
pub mod detect;
pub mod engine;
pub mod llm;
pub mod model;
pub mod pricing;
pub mod retry;
pub mod savings;

pub use catalog::{CanonicalTool, Catalog, CatalogError};
pub use compose::{Action, Recommendation};
pub use config::Config;
pub use engine::{ReconciliationInput, ReconciliationReport, Reconciler, RunMetadata};
pub use model::{CategorizedInvoice, ToolInvoice, UNCATEGORIZED};
