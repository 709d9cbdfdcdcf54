use std::collections::HashMap;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::book::OrderBook;
use crate::client::{Market, MarketProvider};
use crate::config::Settings;
use crate::economics::{self, Category};
use crate::store::SqliteStore;
use crate::utils::{hours_until, now_ts};

const BOOK_BATCH: usize = 20;

/// Everything the engine needs to know about one reward-bearing market,
/// derived deterministically from a single scan's inputs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Opportunity {
    pub market: Market,
    pub yes_book: OrderBook,
    pub no_book: OrderBook,
    pub scanned_at: f64,
    pub spread_total: f64,
    pub your_daily_reward: f64,
    pub competition_usdc: f64,
    pub fill_cost_per_pair: f64,
    pub fill_cost_usdc: f64,
    pub reward_score: f64,
    pub break_even_fills: f64,
    pub net_profit_est: f64,
    pub category: Category,
    pub qualifies_reward: bool,
    pub hours_to_resolution: f64,
}

#[derive(Debug, Clone)]
pub struct ScanFilter {
    pub min_daily_reward: f64,
    pub min_reward_score: f64,
    pub max_spread_total: f64,
    pub max_competition_usdc: f64,
    pub require_qualifies: bool,
    pub min_hours_to_resolution: f64,
}

impl ScanFilter {
    pub fn from_settings(s: &Settings) -> Self {
        Self {
            min_daily_reward: s.min_daily_reward,
            min_reward_score: s.min_reward_score,
            max_spread_total: s.max_spread_total,
            max_competition_usdc: s.max_competition_usdc,
            require_qualifies: s.require_qualifies,
            min_hours_to_resolution: s.min_hours_to_resolution,
        }
    }

    pub fn matches(&self, o: &Opportunity) -> bool {
        if o.your_daily_reward < self.min_daily_reward {
            return false;
        }
        if o.reward_score < self.min_reward_score {
            return false;
        }
        if o.spread_total > self.max_spread_total {
            return false;
        }
        if o.competition_usdc > self.max_competition_usdc {
            return false;
        }
        if self.require_qualifies && !o.qualifies_reward {
            return false;
        }
        if o.hours_to_resolution < self.min_hours_to_resolution {
            return false;
        }
        true
    }
}

/// Distance of the resting best bid from the midpoint, in cents — the unit
/// the venue's reward eligibility is quoted in. Infinite when the side has
/// no usable top-of-book.
fn side_spread_cents(book: &OrderBook) -> f64 {
    let mid = book.midpoint();
    let bid = book.best_bid();
    if mid <= 0.0 || bid <= 0.0 {
        return f64::INFINITY;
    }
    (mid - bid).max(0.0) * 100.0
}

/// Resting bid liquidity near the best bid, used as the competition term of
/// the pro-rata reward estimate. Named so strategies can substitute their
/// own count; it undercounts liquidity resting further from the touch.
pub fn competition_proxy(book: &OrderBook, max_spread_cents: f64) -> f64 {
    book.bid_depth_within_usdc(max_spread_cents / 100.0)
}

pub fn evaluate_market(
    market: &Market,
    yes_book: &OrderBook,
    no_book: &OrderBook,
    order_size: f64,
    fee_rate_default: f64,
    now: f64,
) -> Opportunity {
    let fee_rate = market.maker_base_fee.unwrap_or(fee_rate_default);
    let rewards = &market.rewards;

    let spread_total = economics::spread_total(yes_book.midpoint(), no_book.midpoint());
    let yes_bid = yes_book.best_bid();
    let no_bid = no_book.best_bid();
    let fill_cost_per_pair = economics::fill_cost_per_event(yes_bid, no_bid, fee_rate);
    let fill_cost_usdc = economics::fill_cost_usdc(order_size, yes_bid, no_bid, fill_cost_per_pair);

    let spread_yes = side_spread_cents(yes_book);
    let spread_no = side_spread_cents(no_book);
    let spread_cents = spread_yes.max(spread_no);

    let competition_usdc = competition_proxy(yes_book, rewards.max_spread)
        + competition_proxy(no_book, rewards.max_spread);

    let your_daily_reward = economics::estimate_daily_reward(
        order_size,
        competition_usdc,
        rewards.daily_rate,
        spread_cents,
        rewards.max_spread,
    );
    let reward_score = economics::reward_score(order_size, spread_cents, rewards.daily_rate);

    // Per-day viability assuming one both-sides fill event per day.
    let break_even_fills = economics::break_even_fills(your_daily_reward, fill_cost_per_pair);
    let net_profit_est = economics::estimate_net_profit(your_daily_reward, fill_cost_per_pair, 1.0);

    let qualifies_reward = spread_yes <= rewards.max_spread
        && spread_no <= rewards.max_spread
        && rewards.min_size <= order_size;

    let hours_to_resolution = market
        .end_ts
        .map(|e| hours_until(e, now))
        .unwrap_or(f64::INFINITY);

    Opportunity {
        market: market.clone(),
        yes_book: yes_book.clone(),
        no_book: no_book.clone(),
        scanned_at: now,
        spread_total,
        your_daily_reward,
        competition_usdc,
        fill_cost_per_pair,
        fill_cost_usdc,
        reward_score,
        break_even_fills,
        net_profit_est,
        category: economics::categorize(your_daily_reward, spread_total),
        qualifies_reward,
        hours_to_resolution,
    }
}

pub fn rank_opportunities(opps: &mut [Opportunity]) {
    opps.sort_by(|a, b| {
        b.your_daily_reward
            .partial_cmp(&a.your_daily_reward)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| {
                a.fill_cost_per_pair
                    .partial_cmp(&b.fill_cost_per_pair)
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .then_with(|| {
                a.hours_to_resolution
                    .partial_cmp(&b.hours_to_resolution)
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
    });
}

pub struct Scanner<P: MarketProvider> {
    provider: P,
    store: SqliteStore,
    filter: ScanFilter,
    order_size: f64,
    fee_rate_default: f64,
}

impl<P: MarketProvider> Scanner<P> {
    pub fn new(provider: P, store: SqliteStore, settings: &Settings) -> Self {
        Self {
            provider,
            store,
            filter: ScanFilter::from_settings(settings),
            order_size: settings.order_size_usdc,
            fee_rate_default: settings.fee_rate_default,
        }
    }

    /// One scan cycle: fetch markets, fetch books in batches, evaluate,
    /// filter, rank, persist (unless dry-run). A market with a missing book
    /// is skipped with a warning; it never fails the scan.
    pub async fn run_once(&self, dry_run: bool) -> Result<Vec<Opportunity>> {
        let now = now_ts();
        let markets = self.provider.fetch_sampling_markets().await?;
        let tradable: Vec<&Market> = markets
            .iter()
            .filter(|m| m.active && !m.closed && m.rewards.daily_rate > 0.0)
            .collect();

        let mut token_ids: Vec<String> = Vec::with_capacity(tradable.len() * 2);
        for m in &tradable {
            token_ids.push(m.yes_token_id.clone());
            token_ids.push(m.no_token_id.clone());
        }

        let mut books: HashMap<String, OrderBook> = HashMap::new();
        for chunk in token_ids.chunks(BOOK_BATCH) {
            books.extend(self.provider.fetch_order_books(chunk).await?);
        }

        let mut opps: Vec<Opportunity> = Vec::new();
        for m in &tradable {
            let (Some(yes_book), Some(no_book)) =
                (books.get(&m.yes_token_id), books.get(&m.no_token_id))
            else {
                log::warn!("scan.book.missing condition_id={}", m.condition_id);
                continue;
            };
            let opp = evaluate_market(m, yes_book, no_book, self.order_size, self.fee_rate_default, now);
            if self.filter.matches(&opp) {
                opps.push(opp);
            }
        }

        rank_opportunities(&mut opps);

        if !dry_run {
            if let Err(e) = self.store.save_scan(&opps) {
                log::warn!("scan.persist.error {}", e);
            }
        }
        self.store
            .upsert_runtime_status(
                "scanner",
                "ok",
                &format!("markets={} opportunities={}", tradable.len(), opps.len()),
                None,
                now,
            )
            .ok();

        log::info!(
            "scan.done markets={} with_books={} opportunities={}",
            tradable.len(),
            books.len() / 2,
            opps.len()
        );
        Ok(opps)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::book::BookLevel;
    use crate::client::RewardConfig;
    use crate::store::tests::temp_store;

    pub(crate) fn market(condition_id: &str, daily_rate: f64, end_ts: Option<f64>) -> Market {
        Market {
            condition_id: condition_id.to_string(),
            question: format!("Question {condition_id}"),
            end_ts,
            yes_token_id: format!("{condition_id}-yes"),
            no_token_id: format!("{condition_id}-no"),
            rewards: RewardConfig {
                daily_rate,
                min_size: 10.0,
                max_spread: 3.5,
            },
            maker_base_fee: None,
            active: true,
            closed: false,
        }
    }

    pub(crate) fn book(bid: f64, ask: f64, depth: f64) -> OrderBook {
        OrderBook::new(
            vec![BookLevel { price: bid, size: depth }],
            vec![BookLevel { price: ask, size: depth }],
        )
    }

    /// In-memory market source for scanner/engine tests.
    pub(crate) struct FakeMarkets {
        pub markets: Vec<Market>,
        pub books: HashMap<String, OrderBook>,
    }

    impl MarketProvider for FakeMarkets {
        async fn fetch_sampling_markets(&self) -> Result<Vec<Market>> {
            Ok(self.markets.clone())
        }

        async fn fetch_order_books(&self, token_ids: &[String]) -> Result<HashMap<String, OrderBook>> {
            Ok(token_ids
                .iter()
                .filter_map(|t| self.books.get(t).map(|b| (t.clone(), b.clone())))
                .collect())
        }
    }

    fn settings() -> Settings {
        let mut s = crate::config::tests_settings();
        s.require_qualifies = false;
        s
    }

    #[test]
    fn evaluator_uses_market_fee_override() {
        let now = 0.0;
        let mut m = market("0xa", 100.0, Some(3600.0 * 72.0));
        let yes = book(0.70, 0.71, 100.0);
        let no = book(0.28, 0.30, 100.0);

        let base = evaluate_market(&m, &yes, &no, 100.0, 0.02, now);
        m.maker_base_fee = Some(0.10);
        let with_fee = evaluate_market(&m, &yes, &no, 100.0, 0.02, now);
        assert!(with_fee.fill_cost_per_pair > base.fill_cost_per_pair);
    }

    #[test]
    fn evaluator_disqualifies_wide_or_missing_books() {
        let now = 0.0;
        let m = market("0xa", 100.0, Some(3600.0 * 72.0));
        // Bid far from mid: (mid - bid) in cents above max_spread 3.5.
        let wide = evaluate_market(&m, &book(0.50, 0.60, 100.0), &book(0.40, 0.42, 100.0), 100.0, 0.0, now);
        assert!(!wide.qualifies_reward);

        let empty = OrderBook::default();
        let missing = evaluate_market(&m, &empty, &book(0.40, 0.42, 100.0), 100.0, 0.0, now);
        assert!(!missing.qualifies_reward);
        assert_eq!(missing.your_daily_reward, 0.0);
    }

    #[test]
    fn ranking_prefers_reward_then_cost_then_horizon() {
        let now = 0.0;
        let m = market("0xa", 100.0, Some(3600.0 * 72.0));
        let mk = |ydr: f64, cost: f64, hours: f64| {
            let mut o = evaluate_market(&m, &book(0.70, 0.71, 100.0), &book(0.28, 0.30, 100.0), 100.0, 0.0, now);
            o.your_daily_reward = ydr;
            o.fill_cost_per_pair = cost;
            o.hours_to_resolution = hours;
            o
        };
        let mut opps = vec![mk(0.5, 0.0, 48.0), mk(0.8, 0.0, 48.0), mk(0.8, -0.01, 48.0), mk(0.8, -0.01, 24.0)];
        rank_opportunities(&mut opps);
        assert!((opps[0].hours_to_resolution - 24.0).abs() < 1e-9);
        assert!((opps[1].fill_cost_per_pair - (-0.01)).abs() < 1e-9);
        assert!((opps[3].your_daily_reward - 0.5).abs() < 1e-9);
    }

    #[tokio::test]
    async fn run_once_skips_markets_without_books() {
        let s = settings();
        let store = temp_store();
        let m1 = market("0xa", 100.0, Some(now_ts() + 3600.0 * 72.0));
        let m2 = market("0xb", 100.0, Some(now_ts() + 3600.0 * 72.0));
        let mut books = HashMap::new();
        books.insert(m1.yes_token_id.clone(), book(0.70, 0.71, 100.0));
        books.insert(m1.no_token_id.clone(), book(0.28, 0.30, 100.0));
        // m2 has no books at all.
        let scanner = Scanner::new(FakeMarkets { markets: vec![m1, m2], books }, store, &s);

        let opps = scanner.run_once(true).await.unwrap();
        assert_eq!(opps.len(), 1);
        assert_eq!(opps[0].market.condition_id, "0xa");
    }

    #[tokio::test]
    async fn run_once_persists_unless_dry_run() {
        let s = settings();
        let store = temp_store();
        let m1 = market("0xa", 100.0, Some(now_ts() + 3600.0 * 72.0));
        let mut books = HashMap::new();
        books.insert(m1.yes_token_id.clone(), book(0.70, 0.71, 100.0));
        books.insert(m1.no_token_id.clone(), book(0.28, 0.30, 100.0));
        let scanner = Scanner::new(FakeMarkets { markets: vec![m1], books }, store.clone(), &s);

        scanner.run_once(true).await.unwrap();
        assert!(store.fetch_latest_scan(10).unwrap().is_empty());

        scanner.run_once(false).await.unwrap();
        assert_eq!(store.fetch_latest_scan(10).unwrap().len(), 1);
    }

    #[test]
    fn filter_thresholds() {
        let now = 0.0;
        let m = market("0xa", 100.0, Some(3600.0 * 72.0));
        let o = evaluate_market(&m, &book(0.70, 0.71, 100.0), &book(0.28, 0.30, 100.0), 100.0, 0.0, now);
        let mut f = ScanFilter {
            min_daily_reward: 0.0,
            min_reward_score: 0.0,
            max_spread_total: 1.0,
            max_competition_usdc: f64::INFINITY,
            require_qualifies: false,
            min_hours_to_resolution: 0.0,
        };
        assert!(f.matches(&o));
        f.min_daily_reward = o.your_daily_reward + 1.0;
        assert!(!f.matches(&o));
        f.min_daily_reward = 0.0;
        f.min_hours_to_resolution = o.hours_to_resolution + 1.0;
        assert!(!f.matches(&o));
    }
}
