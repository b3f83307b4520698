//! Price extraction from free-text search snippets.
//!
//! Pure functions, no I/O. Each currency-tagged number becomes a candidate
//! whose confidence depends on the unit stated next to it:
//! - High: per user / seat / member (`$8.75 per user`, `$10/seat`)
//! - Medium: per month only (`$12/mo`)
//! - Low: bare currency amount (`$15`, `15 USD`)
//!
//! Amounts quoted per year are discarded rather than converted.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// How strongly the surrounding text ties an amount to a per-seat monthly price.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    Low,
    Medium,
    High,
}

/// Inclusive range of plausible monthly per-seat prices.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceBand {
    pub min: f64,
    pub max: f64,
}

impl Default for PriceBand {
    fn default() -> Self {
        Self {
            min: 1.0,
            max: 500.0,
        }
    }
}

impl PriceBand {
    pub fn contains(&self, price: f64) -> bool {
        price.is_finite() && price >= self.min && price <= self.max
    }
}

/// One number found in the text.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PriceCandidate {
    pub amount: f64,
    pub confidence: Confidence,
    /// Byte offset of the match; earlier results rank higher.
    pub offset: usize,
}

const CURRENCY: &str = r"(?:US\$|\$|USD\s?)\s?";
const AMOUNT: &str = r"(\d{1,3}(?:,\d{3})+(?:\.\d{1,2})?|\d+(?:\.\d{1,2})?)";

struct Patterns {
    per_seat: Regex,
    per_month: Regex,
    prefixed: Regex,
    suffixed: Regex,
    annual_tail: Regex,
}

fn patterns() -> &'static Patterns {
    static PATTERNS: OnceLock<Patterns> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        let build = |pattern: String| {
            Regex::new(&pattern).unwrap_or_else(|e| panic!("invalid price pattern {pattern}: {e}"))
        };
        Patterns {
            per_seat: build(format!(
                r"(?i){CURRENCY}{AMOUNT}\s*(?:/|per|a|each)\s*(?:active\s+)?(?:user|seat|member|agent|licen[cs]e|editor)s?\b"
            )),
            per_month: build(format!(r"(?i){CURRENCY}{AMOUNT}\s*(?:/|per|a)\s*(?:mo|month)\b")),
            prefixed: build(format!(r"(?i){CURRENCY}{AMOUNT}")),
            suffixed: build(format!(r"(?i)\b{AMOUNT}\s?USD\b")),
            annual_tail: build(r"(?i)^\s*(?:/|per|a)\s*(?:yr|year|annum)\b".to_string()),
        }
    })
}

fn parse_amount(raw: &str) -> Option<f64> {
    raw.replace(',', "").parse::<f64>().ok()
}

/// Every price-like amount in `text`, at most one per position.
pub fn extract_candidates(text: &str) -> Vec<PriceCandidate> {
    let p = patterns();
    let tiers = [
        (&p.per_seat, Confidence::High),
        (&p.per_month, Confidence::Medium),
        (&p.prefixed, Confidence::Low),
        (&p.suffixed, Confidence::Low),
    ];

    let mut candidates: Vec<PriceCandidate> = Vec::new();
    // Tiers run strongest first, so the first tier to reach an offset owns it.
    let mut claimed: Vec<usize> = Vec::new();
    for (regex, confidence) in tiers {
        for caps in regex.captures_iter(text) {
            let (Some(whole), Some(amount)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            if claimed.contains(&whole.start()) {
                continue;
            }
            claimed.push(whole.start());
            // "$96 per user per year" is not a monthly price.
            if p.annual_tail.is_match(&text[whole.end()..]) {
                continue;
            }
            if let Some(value) = parse_amount(amount.as_str()) {
                candidates.push(PriceCandidate {
                    amount: value,
                    confidence,
                    offset: whole.start(),
                });
            }
        }
    }

    candidates.sort_by_key(|c| c.offset);
    candidates
}

/// The best in-band candidate: highest confidence, then earliest.
pub fn extract_price(text: &str, band: &PriceBand) -> Option<PriceCandidate> {
    extract_candidates(text)
        .into_iter()
        .filter(|c| band.contains(c.amount))
        .max_by(|a, b| {
            a.confidence
                .cmp(&b.confidence)
                .then_with(|| b.offset.cmp(&a.offset))
        })
}
