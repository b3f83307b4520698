//! Annualized savings from consolidating onto the cheaper of two tools.

/// `|a - b| * users * 12`, rounded to cents. Never negative; zero for equal prices.
pub fn compute(price_a: f64, price_b: f64, users: u32) -> f64 {
    let diff = (price_a - price_b).abs();
    if !diff.is_finite() || diff == 0.0 {
        return 0.0;
    }
    round_cents(diff * f64::from(users) * 12.0)
}

/// Seats to assume for a pair of tools.
///
/// The larger declared count when both declare one, the single declared
/// count when only one does, `default` otherwise.
pub fn assumed_user_count(a: Option<u32>, b: Option<u32>, default: u32) -> u32 {
    match (a, b) {
        (Some(a), Some(b)) => a.max(b),
        (Some(n), None) | (None, Some(n)) => n,
        (None, None) => default,
    }
}

pub fn round_cents(amount: f64) -> f64 {
    (amount * 100.0).round() / 100.0
}
