//! Pure per-market reward/cost math. No I/O, no state; every function is
//! total over finite inputs with explicit degenerate-input rules.

use serde::{Deserialize, Serialize};

/// Combined distance of the two midpoints from a fully-priced pair.
/// Negative means the YES and NO books are crossed (potential arbitrage).
#[inline]
pub fn spread_total(yes_mid: f64, no_mid: f64) -> f64 {
    (yes_mid + no_mid) - 1.0
}

/// Cost of one YES+NO pair when both resting bids fill, fees included.
/// Symmetric in the two sides; negative means filling is itself profitable.
#[inline]
pub fn fill_cost_per_event(yes_bid: f64, no_bid: f64, fee_rate: f64) -> f64 {
    (yes_bid + no_bid) * (1.0 + fee_rate) - 1.0
}

/// Dollar cost of filling a whole paired position of `order_size` per side.
///
/// At price extremes the pair count blows up and the estimate is meaningless,
/// so it reports 0 there; otherwise the magnitude is clamped to
/// `2 * order_size` (a full pair can never cost more than the capital in it).
pub fn fill_cost_usdc(order_size: f64, yes_price: f64, no_price: f64, cost_per_pair: f64) -> f64 {
    const EXTREME_LO: f64 = 0.02;
    const EXTREME_HI: f64 = 0.98;
    if yes_price < EXTREME_LO || yes_price > EXTREME_HI {
        return 0.0;
    }
    if no_price < EXTREME_LO || no_price > EXTREME_HI {
        return 0.0;
    }
    let pairs = (order_size / yes_price).min(order_size / no_price);
    let cost = pairs * cost_per_pair;
    let cap = 2.0 * order_size;
    cost.clamp(-cap, cap)
}

/// The venue's published reward-eligibility curve: quadratic decay of the
/// daily rate as the quoted spread approaches the order size.
pub fn reward_score(order_size: f64, spread_pct: f64, daily_rate: f64) -> f64 {
    if order_size <= 0.0 || daily_rate <= 0.0 || spread_pct >= order_size {
        return 0.0;
    }
    let factor = 1.0 - spread_pct / order_size;
    daily_rate * factor * factor
}

/// Pro-rata share of the market's daily reward pool for an order of
/// `my_order_size` against `competition_usdc` of resting liquidity, scaled
/// by the eligibility factor `(1 - spread/max_spread)^2`.
pub fn estimate_daily_reward(
    my_order_size: f64,
    competition_usdc: f64,
    daily_rate: f64,
    spread: f64,
    max_spread: f64,
) -> f64 {
    if my_order_size <= 0.0 || daily_rate <= 0.0 || max_spread <= 0.0 {
        return 0.0;
    }
    if spread >= max_spread {
        return 0.0;
    }
    let competition = competition_usdc.max(0.0);
    let share = my_order_size / (my_order_size + competition);
    let eligibility = 1.0 - spread / max_spread;
    daily_rate * share * eligibility * eligibility
}

/// Fills per day the reward covers before the position loses money.
pub fn break_even_fills(daily_reward: f64, cost_per_fill: f64) -> f64 {
    if cost_per_fill <= 0.0 {
        return f64::INFINITY;
    }
    if daily_reward <= 0.0 {
        return 0.0;
    }
    daily_reward / cost_per_fill
}

#[inline]
pub fn estimate_net_profit(reward: f64, cost_per_fill: f64, fills: f64) -> f64 {
    reward - fills * cost_per_fill
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Category {
    Gold,
    Silver,
    Bronze,
    Avoid,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Gold => "gold",
            Category::Silver => "silver",
            Category::Bronze => "bronze",
            Category::Avoid => "avoid",
        }
    }
}

const MIN_REWARD_FOR_CATEGORY: f64 = 0.01;
const GOLD_MAX_SPREAD_TOTAL: f64 = 0.02;
const SILVER_MAX_SPREAD_TOTAL: f64 = 0.05;

/// Bucket an opportunity by reward size and closeness to arbitrage.
/// The tighter the combined spread, the closer both fills are to free.
pub fn categorize(daily_reward: f64, spread_total: f64) -> Category {
    if daily_reward < MIN_REWARD_FOR_CATEGORY {
        return Category::Avoid;
    }
    if spread_total <= GOLD_MAX_SPREAD_TOTAL {
        Category::Gold
    } else if spread_total <= SILVER_MAX_SPREAD_TOTAL {
        Category::Silver
    } else {
        Category::Bronze
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-6;

    #[test]
    fn neutral_pair_cost() {
        // yes 0.70 + no 0.28 at 2% fee sits just under break-even.
        let c = fill_cost_per_event(0.70, 0.28, 0.02);
        assert!((c - (-0.0004)).abs() < 1e-9, "cost = {c}");
    }

    #[test]
    fn costly_pair_cost() {
        let c = fill_cost_per_event(0.75, 0.30, 0.02);
        assert!((c - 0.071).abs() < 1e-9, "cost = {c}");
    }

    #[test]
    fn true_arb_is_negative() {
        let c = fill_cost_per_event(0.48, 0.48, 0.001);
        assert!(c < 0.0, "cost = {c}");
    }

    #[test]
    fn fill_cost_symmetric_in_sides() {
        let a = fill_cost_per_event(0.62, 0.31, 0.015);
        let b = fill_cost_per_event(0.31, 0.62, 0.015);
        assert!((a - b).abs() < EPS);
    }

    #[test]
    fn spread_total_crossed_books() {
        assert!(spread_total(0.48, 0.49) < 0.0);
        assert!((spread_total(0.50, 0.50)).abs() < EPS);
    }

    #[test]
    fn fill_cost_usdc_extremes_and_clamp() {
        // Extreme prices make the pair count meaningless.
        assert_eq!(fill_cost_usdc(100.0, 0.01, 0.50, 0.05), 0.0);
        assert_eq!(fill_cost_usdc(100.0, 0.50, 0.99, 0.05), 0.0);
        // Magnitude is capped at 2x the order size.
        let c = fill_cost_usdc(100.0, 0.02, 0.02, 0.9);
        assert!((c - 200.0).abs() < EPS, "cost = {c}");
        let c = fill_cost_usdc(100.0, 0.02, 0.02, -0.9);
        assert!((c + 200.0).abs() < EPS, "cost = {c}");
    }

    #[test]
    fn fill_cost_usdc_normal_range() {
        // pairs = min(100/0.70, 100/0.28) = 142.857..; cost = pairs * -0.0004
        let c = fill_cost_usdc(100.0, 0.70, 0.28, -0.0004);
        assert!((c - (100.0 / 0.70) * -0.0004).abs() < EPS, "cost = {c}");
    }

    #[test]
    fn reward_score_degenerate_inputs() {
        assert_eq!(reward_score(0.0, 1.0, 10.0), 0.0);
        assert_eq!(reward_score(-5.0, 1.0, 10.0), 0.0);
        assert_eq!(reward_score(100.0, 1.0, 0.0), 0.0);
        assert_eq!(reward_score(100.0, 100.0, 10.0), 0.0);
        assert_eq!(reward_score(100.0, 150.0, 10.0), 0.0);
    }

    #[test]
    fn reward_score_monotone_in_spread() {
        let mut prev = f64::INFINITY;
        for spread in [0.0, 1.0, 5.0, 20.0, 50.0, 99.0] {
            let s = reward_score(100.0, spread, 10.0);
            assert!(s > 0.0);
            assert!(s <= prev, "score not non-increasing at spread {spread}");
            prev = s;
        }
    }

    #[test]
    fn daily_reward_reference_case() {
        let r = estimate_daily_reward(100.0, 35_000.0, 200.0, 0.02, 5.5);
        assert!((r - 0.566).abs() < 0.05, "reward = {r}");
    }

    #[test]
    fn daily_reward_degenerate_inputs() {
        assert_eq!(estimate_daily_reward(0.0, 100.0, 200.0, 0.02, 5.5), 0.0);
        assert_eq!(estimate_daily_reward(100.0, 100.0, 0.0, 0.02, 5.5), 0.0);
        assert_eq!(estimate_daily_reward(100.0, 100.0, 200.0, 0.02, 0.0), 0.0);
        // spread at or past the eligibility boundary earns nothing.
        assert_eq!(estimate_daily_reward(100.0, 100.0, 200.0, 5.5, 5.5), 0.0);
        assert_eq!(estimate_daily_reward(100.0, 100.0, 200.0, 6.0, 5.5), 0.0);
    }

    #[test]
    fn break_even_edges() {
        assert!(break_even_fills(1.0, 0.0).is_infinite());
        assert!(break_even_fills(1.0, -0.5).is_infinite());
        assert_eq!(break_even_fills(0.0, 0.1), 0.0);
        assert!((break_even_fills(1.0, 0.25) - 4.0).abs() < EPS);
    }

    #[test]
    fn net_profit_linear_in_fills() {
        assert!((estimate_net_profit(1.0, 0.1, 4.0) - 0.6).abs() < EPS);
        assert!(estimate_net_profit(1.0, 0.1, 20.0) < 0.0);
    }

    #[test]
    fn categorize_buckets() {
        assert_eq!(categorize(0.005, -0.05), Category::Avoid);
        assert_eq!(categorize(0.5, 0.01), Category::Gold);
        assert_eq!(categorize(0.5, -0.03), Category::Gold);
        assert_eq!(categorize(0.5, 0.04), Category::Silver);
        assert_eq!(categorize(0.5, 0.10), Category::Bronze);
    }
}
