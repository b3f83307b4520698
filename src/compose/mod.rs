//! Turns a redundancy group and its resolved prices into a decision.
//!
//! Rules, first match wins:
//! 1. Any member without a price: `REVIEW`, no savings claimed
//! 2. Every member priced within epsilon of the cheapest: `KEEP` the tool of
//!    the larger organization, no savings
//! 3. Otherwise `MIGRATE` onto the cheapest tool
//!
//! Reasoning text always states where each price came from.

use std::cmp::Ordering;
use std::collections::HashMap;

use serde::Serialize;

use crate::detect::{GroupMember, RedundancyGroup};
use crate::pricing::{PriceQuote, Resolution};
use crate::savings::{self, assumed_user_count};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Action {
    Migrate,
    Keep,
    Review,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Recommendation {
    pub category: String,
    pub action: Action,
    /// Absent for `REVIEW`.
    pub tool_to_keep: Option<String>,
    /// The costliest retired tool; absent for `REVIEW`.
    pub tool_to_drop: Option<String>,
    /// Further retired tools when the category has three or more.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub additional_drops: Vec<String>,
    pub estimated_annual_savings: f64,
    pub reasoning: String,
    /// Prices the decision was based on.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub quotes: Vec<PriceQuote>,
}

/// Knobs the composer needs from the run configuration.
#[derive(Debug, Clone, Copy)]
pub struct ComposePolicy {
    /// Fraction of the lower price under which two prices count as equal.
    pub tie_break_epsilon: f64,
    pub default_user_count: u32,
}

impl Default for ComposePolicy {
    fn default() -> Self {
        Self {
            tie_break_epsilon: 0.01,
            default_user_count: 100,
        }
    }
}

impl ComposePolicy {
    pub fn within_epsilon(&self, a: f64, b: f64) -> bool {
        let diff = (a - b).abs();
        diff == 0.0 || diff < self.tie_break_epsilon * a.min(b)
    }
}

struct Priced<'a> {
    member: &'a GroupMember,
    quote: &'a PriceQuote,
    org_size: u64,
}

impl Priced<'_> {
    fn name(&self) -> &str {
        &self.member.canonical_name
    }

    fn price(&self) -> f64 {
        self.quote.unit_price
    }

    fn describe(&self) -> String {
        format!(
            "{} at ${:.2}/user/month ({})",
            self.name(),
            self.price(),
            self.quote.provenance()
        )
    }
}

/// Decide what to do with one group.
///
/// `quotes` is keyed by canonical tool name and `org_sizes` by organization
/// id (sum of declared users).
pub fn compose(
    group: &RedundancyGroup,
    quotes: &HashMap<String, Resolution>,
    org_sizes: &HashMap<String, u64>,
    policy: &ComposePolicy,
) -> Recommendation {
    let mut priced = Vec::with_capacity(group.members.len());
    let mut missing = Vec::new();
    for member in &group.members {
        match quotes.get(&member.canonical_name) {
            Some(Ok(quote)) => priced.push(Priced {
                member,
                quote,
                org_size: member
                    .organizations
                    .iter()
                    .filter_map(|org| org_sizes.get(org))
                    .copied()
                    .max()
                    .unwrap_or(0),
            }),
            Some(Err(unresolved)) => missing.push(format!(
                "{} (live lookup: {}; invoiced at ${:.2}/user/month)",
                member.canonical_name, unresolved.reason, member.invoiced_unit_cost
            )),
            None => missing.push(format!(
                "{} (not priced; invoiced at ${:.2}/user/month)",
                member.canonical_name, member.invoiced_unit_cost
            )),
        }
    }
    let quotes_used: Vec<PriceQuote> = priced.iter().map(|p| p.quote.clone()).collect();

    if !missing.is_empty() {
        return Recommendation {
            category: group.category.clone(),
            action: Action::Review,
            tool_to_keep: None,
            tool_to_drop: None,
            additional_drops: Vec::new(),
            estimated_annual_savings: 0.0,
            reasoning: format!(
                "{} overlap. No price could be determined for {}. Manual review required before consolidating.",
                group.category,
                missing.join(", ")
            ),
            quotes: quotes_used,
        };
    }

    let cheapest = priced
        .iter()
        .map(Priced::price)
        .fold(f64::INFINITY, f64::min);
    let all_tied = priced
        .iter()
        .all(|p| policy.within_epsilon(cheapest, p.price()));

    // Among near-cheapest tools: larger organization first, then name.
    let keeper = priced
        .iter()
        .filter(|p| policy.within_epsilon(cheapest, p.price()))
        .min_by(|a, b| {
            b.org_size
                .cmp(&a.org_size)
                .then_with(|| a.name().cmp(b.name()))
        });
    let Some(keeper) = keeper else {
        // Only reachable with non-finite prices.
        return Recommendation {
            category: group.category.clone(),
            action: Action::Review,
            tool_to_keep: None,
            tool_to_drop: None,
            additional_drops: Vec::new(),
            estimated_annual_savings: 0.0,
            reasoning: format!("{} overlap. Prices could not be compared.", group.category),
            quotes: quotes_used,
        };
    };

    let mut drops: Vec<&Priced> = priced
        .iter()
        .filter(|p| p.name() != keeper.name())
        .collect();
    drops.sort_by(|a, b| {
        b.price()
            .partial_cmp(&a.price())
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.name().cmp(b.name()))
    });

    let savings: f64 = drops
        .iter()
        .filter(|d| !policy.within_epsilon(keeper.price(), d.price()))
        .map(|d| {
            let users = assumed_user_count(
                keeper.member.declared_user_count,
                d.member.declared_user_count,
                policy.default_user_count,
            );
            savings::compute(keeper.price(), d.price(), users)
        })
        .sum();

    let dropped = drops
        .iter()
        .map(|d| d.describe())
        .collect::<Vec<_>>()
        .join(", ");
    let (action, reasoning) = if all_tied {
        let larger = drops.iter().all(|d| d.org_size < keeper.org_size);
        let basis = if larger {
            format!(
                "used by the larger organization ({} declared users)",
                keeper.org_size
            )
        } else {
            "chosen alphabetically as organization sizes are unknown or equal".to_string()
        };
        (
            Action::Keep,
            format!(
                "{} overlap. {} and {} are priced within {:.1}% of each other, so consolidating saves nothing. Keep {}, {}.",
                group.category,
                keeper.describe(),
                dropped,
                policy.tie_break_epsilon * 100.0,
                keeper.name(),
                basis
            ),
        )
    } else {
        (
            Action::Migrate,
            format!(
                "{} overlap. {} is cheaper than {}. Migrating saves an estimated ${:.2}/year.",
                group.category,
                keeper.describe(),
                dropped,
                savings
            ),
        )
    };

    let mut names = drops.iter().map(|d| d.name().to_string());
    let tool_to_drop = names.next();
    Recommendation {
        category: group.category.clone(),
        action,
        tool_to_keep: Some(keeper.name().to_string()),
        tool_to_drop,
        additional_drops: names.collect(),
        estimated_annual_savings: if all_tied { 0.0 } else { savings::round_cents(savings) },
        reasoning,
        quotes: quotes_used,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pricing::{FallbackReason, QuoteSource, UnresolvedPrice};
    use chrono::Utc;
    use std::collections::BTreeSet;

    fn member(name: &str, org: &str, users: Option<u32>) -> GroupMember {
        GroupMember {
            canonical_name: name.to_string(),
            organizations: BTreeSet::from([org.to_string()]),
            declared_user_count: users,
            invoiced_unit_cost: 1.0,
        }
    }

    fn live(name: &str, price: f64) -> (String, Resolution) {
        (
            name.to_string(),
            Ok(PriceQuote {
                tool_name: name.to_string(),
                unit_price: price,
                currency: crate::pricing::QUOTE_CURRENCY.to_string(),
                source: QuoteSource::Live,
                fallback_reason: None,
                confidence: None,
                resolved_at: Utc::now(),
            }),
        )
    }

    fn fallback(name: &str, price: f64) -> (String, Resolution) {
        let (name, quote) = live(name, price);
        let mut quote = quote.unwrap();
        quote.source = QuoteSource::Fallback;
        quote.fallback_reason = Some(FallbackReason::QuotaExhausted);
        (name, Ok(quote))
    }

    fn group(members: Vec<GroupMember>) -> RedundancyGroup {
        RedundancyGroup {
            category: "Communication".to_string(),
            members,
        }
    }

    #[test]
    fn test_migrate_to_cheaper_tool() {
        let g = group(vec![member("Microsoft Teams", "b", None), member("Slack", "a", None)]);
        let quotes = HashMap::from([fallback("Slack", 15.0), fallback("Microsoft Teams", 5.0)]);
        let rec = compose(&g, &quotes, &HashMap::new(), &ComposePolicy::default());

        assert_eq!(rec.action, Action::Migrate);
        assert_eq!(rec.tool_to_keep.as_deref(), Some("Microsoft Teams"));
        assert_eq!(rec.tool_to_drop.as_deref(), Some("Slack"));
        assert_eq!(rec.estimated_annual_savings, 12000.0);
        assert!(rec.reasoning.contains("FALLBACK: quota exhausted"));
        assert!(rec.reasoning.contains("$5.00"));
        assert!(rec.reasoning.contains("$15.00"));
    }

    #[test]
    fn test_declared_users_drive_savings() {
        let g = group(vec![
            member("Microsoft Teams", "b", Some(40)),
            member("Slack", "a", Some(10)),
        ]);
        let quotes = HashMap::from([live("Slack", 8.75), live("Microsoft Teams", 4.0)]);
        let rec = compose(&g, &quotes, &HashMap::new(), &ComposePolicy::default());
        assert_eq!(rec.estimated_annual_savings, 2280.0);
        assert!(rec.reasoning.contains("LIVE"));
    }

    #[test]
    fn test_unresolved_price_forces_review() {
        let g = group(vec![member("Discord", "a", None), member("Slack", "b", None)]);
        let quotes = HashMap::from([
            live("Slack", 8.75),
            (
                "Discord".to_string(),
                Err(UnresolvedPrice {
                    tool_name: "Discord".to_string(),
                    reason: FallbackReason::NoValidCandidate,
                }),
            ),
        ]);
        let rec = compose(&g, &quotes, &HashMap::new(), &ComposePolicy::default());

        assert_eq!(rec.action, Action::Review);
        assert_eq!(rec.estimated_annual_savings, 0.0);
        assert_eq!(rec.tool_to_keep, None);
        assert!(rec.reasoning.contains("Discord"));
        assert!(rec.reasoning.contains("no valid price found"));
    }

    #[test]
    fn test_near_equal_prices_keep_larger_org_tool() {
        let g = group(vec![member("Slack", "a", None), member("Teams", "b", None)]);
        let quotes = HashMap::from([live("Slack", 10.0), live("Teams", 10.05)]);
        let sizes = HashMap::from([("a".to_string(), 20), ("b".to_string(), 300)]);
        let rec = compose(&g, &quotes, &sizes, &ComposePolicy::default());

        assert_eq!(rec.action, Action::Keep);
        assert_eq!(rec.tool_to_keep.as_deref(), Some("Teams"));
        assert_eq!(rec.tool_to_drop.as_deref(), Some("Slack"));
        assert_eq!(rec.estimated_annual_savings, 0.0);
        assert!(rec.reasoning.contains("300 declared users"));
    }

    #[test]
    fn test_keep_ties_break_alphabetically() {
        let g = group(vec![member("Slack", "a", None), member("Teams", "b", None)]);
        let quotes = HashMap::from([live("Slack", 10.0), live("Teams", 10.0)]);
        let rec = compose(&g, &quotes, &HashMap::new(), &ComposePolicy::default());
        assert_eq!(rec.action, Action::Keep);
        assert_eq!(rec.tool_to_keep.as_deref(), Some("Slack"));
    }

    #[test]
    fn test_three_tools() {
        let g = group(vec![
            member("Google Chat", "a", None),
            member("Slack", "a", None),
            member("Teams", "b", None),
        ]);
        let quotes = HashMap::from([
            live("Google Chat", 5.02),
            live("Slack", 12.5),
            live("Teams", 5.0),
        ]);
        let sizes = HashMap::from([("a".to_string(), 50), ("b".to_string(), 10)]);
        let rec = compose(&g, &quotes, &sizes, &ComposePolicy::default());

        assert_eq!(rec.action, Action::Migrate);
        // Google Chat is within 1% of Teams and its organization is larger.
        assert_eq!(rec.tool_to_keep.as_deref(), Some("Google Chat"));
        assert_eq!(rec.tool_to_drop.as_deref(), Some("Slack"));
        assert_eq!(rec.additional_drops, vec!["Teams".to_string()]);
        // Only the Slack pair contributes: (12.5 - 5.02) * 100 * 12.
        assert_eq!(rec.estimated_annual_savings, 8976.0);
    }

    #[test]
    fn test_within_epsilon() {
        let policy = ComposePolicy::default();
        assert!(policy.within_epsilon(10.0, 10.0));
        assert!(policy.within_epsilon(10.0, 10.09));
        assert!(!policy.within_epsilon(10.0, 10.2));
        assert!(policy.within_epsilon(0.0, 0.0));
        assert!(!policy.within_epsilon(0.0, 1.0));
    }
}
