//! Canonical catalog of known tools.
//!
//! The catalog is loaded once at startup and shared read-only by every run.
//! It answers two questions: which canonical tool (and category) does a raw
//! invoice name refer to, and what is the baseline monthly per-seat price to
//! fall back on when live pricing is unavailable.
//!
//! Loading is the one fatal step of the engine: a catalog that cannot be read
//! or fails validation prevents the engine from starting.

mod builtin;

use std::collections::{BTreeSet, HashMap};
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::UNCATEGORIZED;

/// Errors raised while loading a catalog.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("failed to read catalog {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse catalog: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("catalog entry '{0}' has an empty name or category")]
    EmptyField(String),
    #[error("catalog entry '{name}' has invalid baseline price {price}")]
    InvalidPrice { name: String, price: f64 },
    #[error("catalog name or alias '{0}' is defined more than once")]
    Duplicate(String),
    #[error("catalog entry '{0}' uses the reserved category UNCATEGORIZED")]
    ReservedCategory(String),
}

/// A known tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalTool {
    pub canonical_name: String,
    pub category: String,
    /// Per-seat monthly list price; absent when only the category is known.
    #[serde(default)]
    pub baseline_monthly_price: Option<f64>,
    /// Alternative spellings that identify the same product.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub aliases: Vec<String>,
}

impl CanonicalTool {
    pub fn new(name: &str, category: &str, price: Option<f64>, aliases: &[&str]) -> Self {
        Self {
            canonical_name: name.to_string(),
            category: category.to_string(),
            baseline_monthly_price: price,
            aliases: aliases.iter().map(|a| a.to_string()).collect(),
        }
    }
}

/// On-disk catalog layout.
#[derive(Debug, Deserialize)]
struct CatalogFile {
    tools: Vec<CanonicalTool>,
}

/// Immutable lookup table over canonical tools.
#[derive(Debug, Clone)]
pub struct Catalog {
    tools: Vec<CanonicalTool>,
    /// Normalized name or alias -> index into `tools`.
    index: HashMap<String, usize>,
    /// Lowercased category -> category as spelled in the catalog.
    categories: HashMap<String, String>,
}

impl Catalog {
    /// Build a catalog, validating every entry.
    pub fn from_tools(tools: Vec<CanonicalTool>) -> Result<Self, CatalogError> {
        let mut index = HashMap::new();
        let mut categories = HashMap::new();

        for (i, tool) in tools.iter().enumerate() {
            if tool.canonical_name.trim().is_empty() || tool.category.trim().is_empty() {
                return Err(CatalogError::EmptyField(tool.canonical_name.clone()));
            }
            if tool.category == UNCATEGORIZED {
                return Err(CatalogError::ReservedCategory(tool.canonical_name.clone()));
            }
            if let Some(price) = tool.baseline_monthly_price {
                if !price.is_finite() || price < 0.0 {
                    return Err(CatalogError::InvalidPrice {
                        name: tool.canonical_name.clone(),
                        price,
                    });
                }
            }

            let keys = std::iter::once(&tool.canonical_name).chain(tool.aliases.iter());
            for key in keys {
                let normalized = normalize_name(key);
                if normalized.is_empty() {
                    return Err(CatalogError::EmptyField(tool.canonical_name.clone()));
                }
                if index.insert(normalized, i).is_some() {
                    return Err(CatalogError::Duplicate(key.clone()));
                }
            }

            categories
                .entry(tool.category.to_lowercase())
                .or_insert_with(|| tool.category.clone());
        }

        Ok(Self {
            tools,
            index,
            categories,
        })
    }

    /// The catalog shipped with the binary.
    pub fn builtin() -> Result<Self, CatalogError> {
        Self::from_tools(builtin::tools())
    }

    /// Load a catalog from a JSON file of the form `{"tools": [...]}`.
    pub fn load(path: &Path) -> Result<Self, CatalogError> {
        let contents = std::fs::read_to_string(path).map_err(|source| CatalogError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let file: CatalogFile = serde_json::from_str(&contents)?;
        let catalog = Self::from_tools(file.tools)?;
        tracing::info!(
            "Loaded catalog with {} tools from {}",
            catalog.len(),
            path.display()
        );
        Ok(catalog)
    }

    /// Look up a tool by canonical name or alias, after normalization.
    pub fn lookup(&self, name: &str) -> Option<&CanonicalTool> {
        self.index
            .get(&normalize_name(name))
            .map(|&i| &self.tools[i])
    }

    /// Baseline price for a tool, if the catalog knows one.
    pub fn baseline_price(&self, name: &str) -> Option<f64> {
        self.lookup(name).and_then(|t| t.baseline_monthly_price)
    }

    /// Catalog spelling of a category, matched case-insensitively.
    pub fn canonical_category(&self, category: &str) -> Option<&str> {
        self.categories
            .get(&category.trim().to_lowercase())
            .map(String::as_str)
    }

    /// All categories, sorted.
    pub fn categories(&self) -> Vec<&str> {
        let set: BTreeSet<&str> = self.categories.values().map(String::as_str).collect();
        set.into_iter().collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

/// Lowercase, drop punctuation, collapse whitespace.
///
/// `"Microsoft  Teams!"` and `"microsoft teams"` normalize to the same key.
pub fn normalize_name(name: &str) -> String {
    let stripped: String = name
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect();
    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}
