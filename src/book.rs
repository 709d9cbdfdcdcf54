use serde::{Deserialize, Serialize};

const PRICE_EPS: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BookLevel {
    pub price: f64,
    pub size: f64,
}

/// Aggregated bid/ask ladder for one outcome token. Bids are held in
/// descending price order, asks ascending; levels are unique per price with
/// strictly positive sizes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrderBook {
    pub bids: Vec<BookLevel>,
    pub asks: Vec<BookLevel>,
}

impl OrderBook {
    pub fn new(raw_bids: Vec<BookLevel>, raw_asks: Vec<BookLevel>) -> Self {
        Self {
            bids: aggregate(raw_bids, true),
            asks: aggregate(raw_asks, false),
        }
    }

    pub fn best_bid(&self) -> f64 {
        self.bids.first().map(|l| l.price).unwrap_or(0.0)
    }

    pub fn best_ask(&self) -> f64 {
        self.asks.first().map(|l| l.price).unwrap_or(0.0)
    }

    /// Mid price; 0 when either side is empty.
    pub fn midpoint(&self) -> f64 {
        if self.bids.is_empty() || self.asks.is_empty() {
            return 0.0;
        }
        0.5 * (self.best_bid() + self.best_ask())
    }

    /// USDC notional resting on the bid side within `delta` of the best bid.
    pub fn bid_depth_within_usdc(&self, delta: f64) -> f64 {
        let floor = self.best_bid() - delta;
        self.bids
            .iter()
            .filter(|l| l.price >= floor - PRICE_EPS)
            .map(|l| l.price * l.size)
            .sum()
    }

    /// USDC notional on both sides within `delta` of the midpoint.
    pub fn depth_within_usdc(&self, delta: f64) -> f64 {
        let mid = self.midpoint();
        if mid <= 0.0 {
            return 0.0;
        }
        let in_window = |l: &&BookLevel| (l.price - mid).abs() <= delta + PRICE_EPS;
        let bid_side: f64 = self.bids.iter().filter(in_window).map(|l| l.price * l.size).sum();
        let ask_side: f64 = self.asks.iter().filter(in_window).map(|l| l.price * l.size).sum();
        bid_side + ask_side
    }

    /// USDC notional that must be consumed before a bid resting at `price`
    /// begins to fill: everything quoted strictly better, plus whatever is
    /// already resting at `price` itself.
    pub fn queue_position(&self, price: f64) -> f64 {
        self.bids
            .iter()
            .filter(|l| l.price > price - PRICE_EPS)
            .map(|l| l.price * l.size)
            .sum()
    }
}

fn aggregate(mut levels: Vec<BookLevel>, descending: bool) -> Vec<BookLevel> {
    levels.retain(|l| l.size > 0.0 && l.price.is_finite() && l.price > 0.0);
    levels.sort_by(|a, b| {
        let ord = a.price.partial_cmp(&b.price).unwrap_or(std::cmp::Ordering::Equal);
        if descending {
            ord.reverse()
        } else {
            ord
        }
    });
    let mut out: Vec<BookLevel> = Vec::with_capacity(levels.len());
    for l in levels {
        if let Some(last) = out.last_mut() {
            if (last.price - l.price).abs() < PRICE_EPS {
                last.size += l.size;
                continue;
            }
        }
        out.push(l);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lvl(price: f64, size: f64) -> BookLevel {
        BookLevel { price, size }
    }

    fn sample() -> OrderBook {
        OrderBook::new(
            vec![lvl(0.68, 100.0), lvl(0.70, 50.0), lvl(0.70, 30.0), lvl(0.69, 200.0)],
            vec![lvl(0.73, 40.0), lvl(0.72, 10.0)],
        )
    }

    #[test]
    fn aggregates_and_sorts() {
        let b = sample();
        assert_eq!(b.bids.len(), 3);
        assert!((b.bids[0].price - 0.70).abs() < 1e-12);
        assert!((b.bids[0].size - 80.0).abs() < 1e-12);
        assert!((b.asks[0].price - 0.72).abs() < 1e-12);
    }

    #[test]
    fn top_of_book_and_mid() {
        let b = sample();
        assert!((b.best_bid() - 0.70).abs() < 1e-12);
        assert!((b.best_ask() - 0.72).abs() < 1e-12);
        assert!((b.midpoint() - 0.71).abs() < 1e-12);
    }

    #[test]
    fn empty_sides_read_as_zero() {
        let empty = OrderBook::default();
        assert_eq!(empty.best_bid(), 0.0);
        assert_eq!(empty.best_ask(), 0.0);
        assert_eq!(empty.midpoint(), 0.0);

        let bid_only = OrderBook::new(vec![lvl(0.5, 10.0)], vec![]);
        assert_eq!(bid_only.midpoint(), 0.0);
        assert!((bid_only.best_bid() - 0.5).abs() < 1e-12);
    }

    #[test]
    fn bid_depth_window() {
        let b = sample();
        // Within 0.01 of best bid 0.70: levels 0.70 and 0.69.
        let d = b.bid_depth_within_usdc(0.01);
        let want = 0.70 * 80.0 + 0.69 * 200.0;
        assert!((d - want).abs() < 1e-9, "depth = {d}");
    }

    #[test]
    fn queue_position_counts_better_and_at_price() {
        let b = sample();
        // Resting at 0.69: ahead of us is 0.70 (80) plus the 200 already at 0.69.
        let q = b.queue_position(0.69);
        let want = 0.70 * 80.0 + 0.69 * 200.0;
        assert!((q - want).abs() < 1e-9, "queue = {q}");
        // Resting above the touch: nothing ahead.
        assert_eq!(b.queue_position(0.71), 0.0);
    }

    #[test]
    fn non_positive_sizes_dropped() {
        let b = OrderBook::new(vec![lvl(0.5, 0.0), lvl(0.4, -3.0)], vec![]);
        assert!(b.bids.is_empty());
    }
}
