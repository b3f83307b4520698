//! Input records and the per-run views derived from them.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Reserved category for tools neither the catalog nor the classifier could place.
pub const UNCATEGORIZED: &str = "UNCATEGORIZED";

/// One line of a software invoice, as ingested from an organization's books.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolInvoice {
    pub organization_id: String,
    #[serde(alias = "service_name")]
    pub raw_service_name: String,
    /// Price per seat per month, as invoiced.
    #[serde(alias = "internal_cost")]
    pub monthly_unit_cost: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub declared_user_count: Option<u32>,
    /// Free-text line description (e.g. "Software Subscription").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl ToolInvoice {
    pub fn new(
        organization_id: impl Into<String>,
        raw_service_name: impl Into<String>,
        monthly_unit_cost: f64,
    ) -> Self {
        Self {
            organization_id: organization_id.into(),
            raw_service_name: raw_service_name.into(),
            monthly_unit_cost,
            declared_user_count: None,
            description: None,
        }
    }

    pub fn with_users(mut self, users: u32) -> Self {
        self.declared_user_count = Some(users);
        self
    }

    /// Reject records the engine cannot reason about.
    pub fn validate(&self) -> Result<(), InvalidInvoice> {
        if self.organization_id.trim().is_empty() {
            return Err(InvalidInvoice::MissingOrganization);
        }
        if self.raw_service_name.trim().is_empty() {
            return Err(InvalidInvoice::EmptyServiceName);
        }
        if !self.monthly_unit_cost.is_finite() || self.monthly_unit_cost < 0.0 {
            return Err(InvalidInvoice::InvalidCost(self.monthly_unit_cost));
        }
        if self.declared_user_count == Some(0) {
            return Err(InvalidInvoice::ZeroUsers);
        }
        Ok(())
    }
}

/// Why an invoice was skipped.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum InvalidInvoice {
    #[error("invoice has no organization id")]
    MissingOrganization,
    #[error("invoice has an empty service name")]
    EmptyServiceName,
    #[error("invoice cost {0} is not a non-negative finite amount")]
    InvalidCost(f64),
    #[error("invoice declares zero users")]
    ZeroUsers,
}

/// An invoice after the categorizer has placed it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategorizedInvoice {
    pub invoice: ToolInvoice,
    pub canonical_name: String,
    /// Never empty; `UNCATEGORIZED` when placement failed.
    pub category: String,
}

impl CategorizedInvoice {
    pub fn is_categorized(&self) -> bool {
        self.category != UNCATEGORIZED
    }
}
