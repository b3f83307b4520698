//! Redundancy detection across both organizations' categorized invoices.
//!
//! A category is redundant when it is served by two or more distinct
//! canonical tools. The same tool bought by both organizations is not a
//! conflict. Uncategorized invoices never take part.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use crate::model::CategorizedInvoice;

/// One distinct tool inside a category, aggregated over its invoices.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupMember {
    pub canonical_name: String,
    /// Organizations that pay for the tool.
    pub organizations: BTreeSet<String>,
    /// Largest user count declared on any of the tool's invoices.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub declared_user_count: Option<u32>,
    /// Lowest per-seat cost seen on the tool's invoices.
    pub invoiced_unit_cost: f64,
}

impl GroupMember {
    fn from_invoice(item: &CategorizedInvoice) -> Self {
        Self {
            canonical_name: item.canonical_name.clone(),
            organizations: BTreeSet::from([item.invoice.organization_id.clone()]),
            declared_user_count: item.invoice.declared_user_count,
            invoiced_unit_cost: item.invoice.monthly_unit_cost,
        }
    }

    fn absorb(&mut self, item: &CategorizedInvoice) {
        self.organizations.insert(item.invoice.organization_id.clone());
        self.declared_user_count = self.declared_user_count.max(item.invoice.declared_user_count);
        self.invoiced_unit_cost = self.invoiced_unit_cost.min(item.invoice.monthly_unit_cost);
    }
}

/// A category served by two or more distinct tools.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RedundancyGroup {
    pub category: String,
    /// Sorted by canonical name; always at least two entries.
    pub members: Vec<GroupMember>,
}

impl RedundancyGroup {
    pub fn tool_names(&self) -> impl Iterator<Item = &str> {
        self.members.iter().map(|m| m.canonical_name.as_str())
    }
}

/// Categories and the tools in them, both ordered.
type CategoryIndex = BTreeMap<String, BTreeMap<String, GroupMember>>;

fn index(invoices: &[CategorizedInvoice]) -> CategoryIndex {
    let mut by_category: CategoryIndex = BTreeMap::new();
    for item in invoices.iter().filter(|i| i.is_categorized()) {
        by_category
            .entry(item.category.clone())
            .or_default()
            .entry(item.canonical_name.clone())
            .and_modify(|m| m.absorb(item))
            .or_insert_with(|| GroupMember::from_invoice(item));
    }
    by_category
}

/// Redundancy groups ordered by category name.
pub fn detect(invoices: &[CategorizedInvoice]) -> Vec<RedundancyGroup> {
    index(invoices)
        .into_iter()
        .filter(|(_, tools)| tools.len() >= 2)
        .map(|(category, tools)| RedundancyGroup {
            category,
            members: tools.into_values().collect(),
        })
        .collect()
}

/// Categorized tools that have no competitor, as `(category, tool)` pairs.
pub fn unique_tools(invoices: &[CategorizedInvoice]) -> Vec<(String, String)> {
    index(invoices)
        .into_iter()
        .filter(|(_, tools)| tools.len() == 1)
        .flat_map(|(category, tools)| tools.into_keys().map(move |t| (category.clone(), t)))
        .collect()
}
