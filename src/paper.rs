use std::collections::{HashMap, HashSet};

use anyhow::Result;
use serde::Serialize;
use uuid::Uuid;

use crate::book::OrderBook;
use crate::client::{MarketProvider, Trade, TradeProvider, TradeSide};
use crate::config::Settings;
use crate::economics;
use crate::scanner::{Opportunity, Scanner};
use crate::store::{DailySummary, OrderSide, OrderStatus, PaperOrder, PaperStats, SqliteStore};
use crate::utils::{hours_until, now_ts, today_key};

const MAX_PARTIAL_HOURS: f64 = 6.0;
const NEAR_END_HOURS: f64 = 24.0;
const MIN_ORDER_SIZE: f64 = 10.0;
const MAX_BID_TICK_UP: f64 = 0.03;
const BID_TICK_STEP: f64 = 0.01;
const MERGE_GAS_COST: f64 = 0.02;
const MERGE_DELAY_MINS: f64 = 2.0;
const STALE_HOURS: f64 = 4.0;

const KELLY_MIN_SAMPLE: i64 = 10;
const KELLY_DEFAULT: f64 = 0.25;
const KELLY_FLOOR: f64 = 0.10;
const KELLY_CAP: f64 = 0.50;

const VELOCITY_MIN_HOURS: f64 = 24.0;
const TRADE_COVERAGE_WARN_SECS: f64 = 3600.0;

const SECS_PER_HOUR: f64 = 3600.0;
const SECS_PER_DAY: f64 = 86_400.0;

/// Both legs of a pair plus the derived per-pair view built at cycle end.
#[derive(Debug, Clone, Serialize)]
pub struct PairPosition {
    pub pair_id: String,
    pub condition_id: String,
    pub yes: PaperOrder,
    pub no: PaperOrder,
    pub reward_accrued: f64,
    pub is_complete: bool,
    pub is_resolved: bool,
    pub partial_since: Option<f64>,
    pub hours_to_end: f64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CycleResult {
    pub positions: Vec<PairPosition>,
    pub new_orders: usize,
    pub new_fills: usize,
    pub complete_pairs: usize,
    pub capital_deployed: f64,
    pub merges: usize,
    pub merge_profit: f64,
    pub compound_balance: f64,
    pub total_rotations: i64,
    pub avg_cycle_hours: f64,
    pub kelly_fraction: f64,
    pub warnings: Vec<String>,
    pub partial_alerts: Vec<String>,
}

/// Capped Kelly fraction from observed merge history. Falls back to a fixed
/// default until the sample is large enough to trust.
pub fn kelly_fraction(stats: &PaperStats) -> f64 {
    if stats.merges < KELLY_MIN_SAMPLE {
        return KELLY_DEFAULT;
    }
    let p = stats.wins as f64 / stats.merges as f64;
    if stats.avg_loss <= 1e-9 {
        // No observed losses; deploy at the cap rather than divide by zero.
        return KELLY_CAP;
    }
    let b = stats.avg_win / stats.avg_loss;
    if b <= 0.0 {
        return KELLY_FLOOR;
    }
    let k = (p * (b + 1.0) - 1.0) / b;
    k.clamp(KELLY_FLOOR, KELLY_CAP)
}

/// Compound growth is `(1 + r)^n` in rotations per horizon, so comparable
/// rewards prefer the faster-resolving market. Horizon is clipped below at
/// 24 h to keep near-end markets from dominating.
pub fn compound_velocity_score(o: &Opportunity) -> f64 {
    let h = o.hours_to_resolution.max(VELOCITY_MIN_HOURS);
    o.your_daily_reward * h.powf(-0.25)
}

fn rank_by_velocity(opps: &mut [Opportunity]) {
    opps.sort_by(|a, b| {
        compound_velocity_score(b)
            .partial_cmp(&compound_velocity_score(a))
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| {
                a.fill_cost_per_pair
                    .partial_cmp(&b.fill_cost_per_pair)
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
    });
}

#[derive(Debug, Clone)]
pub(crate) struct SimOutcome {
    pub filled_size: f64,
    pub newly_filled: f64,
    pub fill_ts: f64,
    /// Id of the last trade that contributed; empty when credited at cycle
    /// time with no matching print.
    pub trade_id: String,
    pub complete: bool,
}

/// Queue-aware fill model: public SELL prints at or below the resting bid
/// consume the queue ahead first, then the order itself. Fills are credited
/// at the order's bid price — conservative for queue consumption, with a
/// known slight positive price bias when sells print below the bid.
///
/// Monotone in the trade stream: adding in-scope SELL volume can only grow
/// `filled_size`. Returns None when nothing new filled.
pub(crate) fn simulate_order_fill(order: &PaperOrder, trades: &[Trade], now: f64) -> Option<SimOutcome> {
    let mut cum_sell_usdc = 0.0;
    let mut last_match: Option<&Trade> = None;
    for t in trades {
        if t.ts < order.placed_ts || t.side != TradeSide::Sell {
            continue;
        }
        if t.price > order.bid_price + 1e-9 {
            continue;
        }
        cum_sell_usdc += t.price * t.size;
        last_match = Some(t);
    }

    let effective = (cum_sell_usdc - order.queue_ahead).clamp(0.0, order.size);
    let newly = effective - order.filled_size;
    if newly <= 0.0 {
        return None;
    }
    Some(SimOutcome {
        filled_size: effective,
        newly_filled: newly,
        fill_ts: last_match.map(|t| t.ts).unwrap_or(now),
        trade_id: last_match.map(|t| t.id.clone()).unwrap_or_default(),
        complete: effective >= order.size,
    })
}

fn initial_bid(book: &OrderBook) -> f64 {
    let bid = book.best_bid();
    if bid > 0.0 {
        bid
    } else {
        book.best_ask() * 0.99
    }
}

fn placement_score(book: &OrderBook, price: f64, ticks: usize, order_size: f64) -> f64 {
    let queue = book.queue_position(price);
    let tick_cost = ticks as f64 * BID_TICK_STEP * order_size;
    order_size / (queue + order_size + 1.0) - tick_cost / order_size
}

fn optimise_side(book: &OrderBook, base_bid: f64, counter_bid: f64, fee_rate: f64, order_size: f64) -> f64 {
    let mut best_price = base_bid;
    let mut best_score = placement_score(book, base_bid, 0, order_size);
    let max_ticks = (MAX_BID_TICK_UP / BID_TICK_STEP).round() as usize;
    for k in 1..=max_ticks {
        let candidate = base_bid + k as f64 * BID_TICK_STEP;
        if candidate >= 1.0 {
            break;
        }
        if economics::fill_cost_per_event(candidate, counter_bid, fee_rate) > 0.0 {
            continue;
        }
        let score = placement_score(book, candidate, k, order_size);
        if score > best_score {
            best_score = score;
            best_price = candidate;
        }
    }
    best_price
}

/// Joint bid selection for the pair: each side may tick up over the touch to
/// jump queue, as long as the pair stays at-or-below break-even. If the two
/// independently optimised bids cross break-even together, both revert.
pub(crate) fn optimise_pair_bids(
    yes_book: &OrderBook,
    no_book: &OrderBook,
    fee_rate: f64,
    order_size: f64,
) -> Option<(f64, f64)> {
    let yes_base = initial_bid(yes_book);
    let no_base = initial_bid(no_book);
    if yes_base <= 0.0 || no_base <= 0.0 {
        return None;
    }
    let yes = optimise_side(yes_book, yes_base, no_base, fee_rate, order_size);
    let no = optimise_side(no_book, no_base, yes_base, fee_rate, order_size);
    if economics::fill_cost_per_event(yes, no, fee_rate) > 0.0 {
        Some((yes_base, no_base))
    } else {
        Some((yes, no))
    }
}

pub struct PaperEngine<P: MarketProvider, T: TradeProvider> {
    scanner: Scanner<P>,
    trades: T,
    store: SqliteStore,
    settings: Settings,
    scan_dry_run: bool,
    last_scan: f64,
}

impl<P: MarketProvider, T: TradeProvider> PaperEngine<P, T> {
    pub fn new(scanner: Scanner<P>, trades: T, store: SqliteStore, settings: Settings, scan_dry_run: bool) -> Self {
        Self {
            scanner,
            trades,
            store,
            settings,
            scan_dry_run,
            last_scan: 0.0,
        }
    }

    fn optimal_order_size(&self, opp: &Opportunity) -> f64 {
        // Keep the pair reward-eligible when the market demands more size
        // than the configured default.
        self.settings.order_size_usdc.max(opp.market.rewards.min_size)
    }

    /// One engine cycle in fixed order: scan, expire, queue-refresh, rotate
    /// stale, fill, merge, compound, allocate, place, build positions, save
    /// the daily summary. All durable state lives in the store; nothing but
    /// `last_scan` survives on the engine between cycles.
    pub async fn run_once(&mut self) -> Result<CycleResult> {
        let now = now_ts();
        let mut result = CycleResult::default();

        // 1. Scan.
        let opps = self.scanner.run_once(self.scan_dry_run).await?;
        if self.last_scan > 0.0 {
            log::debug!("paper.scan.age secs={:.0}", now - self.last_scan);
        }
        self.last_scan = now;

        let by_condition: HashMap<&str, &Opportunity> = opps
            .iter()
            .map(|o| (o.market.condition_id.as_str(), o))
            .collect();
        let mut books: HashMap<&str, &OrderBook> = HashMap::new();
        for o in &opps {
            books.insert(o.market.yes_token_id.as_str(), &o.yes_book);
            books.insert(o.market.no_token_id.as_str(), &o.no_book);
        }

        let mut live = match self.store.open_paper_orders() {
            Ok(orders) => orders,
            Err(e) => {
                log::warn!("paper.orders.load.error {}", e);
                result.warnings.push(format!("load open orders failed: {e}"));
                Vec::new()
            }
        };

        // 2. Resolve / near-end expiry, deduped per condition.
        let mut expired_conditions: HashSet<String> = HashSet::new();
        for o in &live {
            if expired_conditions.contains(&o.condition_id) {
                continue;
            }
            let reason = match by_condition.get(o.condition_id.as_str()) {
                Some(opp) => {
                    let end = opp.market.end_ts.or(o.end_ts_snapshot);
                    match end {
                        Some(end) if end <= now => Some("resolved"),
                        Some(end) => {
                            let h = hours_until(end, now);
                            (h > 0.0 && h < NEAR_END_HOURS).then_some("near_end")
                        }
                        None => None,
                    }
                }
                // Gone from the scan: only expire once its snapshotted end
                // has passed.
                None => match o.end_ts_snapshot {
                    Some(end) if end <= now => Some("resolved_disappeared"),
                    _ => None,
                },
            };
            if let Some(reason) = reason {
                self.expire(&o.condition_id, reason, &mut result);
                expired_conditions.insert(o.condition_id.clone());
            }
        }
        live.retain(|o| !expired_conditions.contains(&o.condition_id));

        // 3. Queue refresh for orders that have not started filling.
        for o in live.iter_mut() {
            if o.status != OrderStatus::Open {
                continue;
            }
            let Some(book) = books.get(o.token_id.as_str()) else {
                continue;
            };
            let q = book.queue_position(o.bid_price);
            if (q - o.queue_ahead).abs() > 1e-9 {
                o.queue_ahead = q;
                if let Err(e) = self.store.update_order_queue(&o.order_id, q) {
                    log::warn!("paper.queue.persist.error order_id={} {}", o.order_id, e);
                }
            }
        }

        // 4. Stale rotation: a pair untouched for too long ties up capital
        // that compounds faster elsewhere.
        let mut stale_conditions: HashSet<String> = HashSet::new();
        {
            let mut by_pair: HashMap<&str, Vec<&PaperOrder>> = HashMap::new();
            for o in &live {
                by_pair.entry(o.pair_id.as_str()).or_default().push(o);
            }
            for orders in by_pair.values() {
                // A pair with a filled or partially-filled leg has only one
                // live side here and is settlement-pending, never stale.
                let untouched = orders.len() == 2
                    && orders
                        .iter()
                        .all(|o| o.status == OrderStatus::Open && o.filled_size <= 0.0);
                let age_hours = orders
                    .iter()
                    .map(|o| (now - o.placed_ts) / SECS_PER_HOUR)
                    .fold(0.0, f64::max);
                if untouched && age_hours > STALE_HOURS {
                    stale_conditions.insert(orders[0].condition_id.clone());
                }
            }
        }
        for condition_id in &stale_conditions {
            self.expire(condition_id, "stale", &mut result);
        }
        live.retain(|o| !stale_conditions.contains(&o.condition_id));

        // 5. Queue-aware fill simulation from public trade flow.
        let tokens: Vec<String> = {
            let mut t: Vec<String> = live.iter().map(|o| o.token_id.clone()).collect();
            t.sort();
            t.dedup();
            t
        };
        for token_id in tokens {
            let mut trades = match self.trades.fetch_trades(&token_id).await {
                Ok(t) => t,
                Err(e) => {
                    log::warn!("paper.trades.fetch.error token={} {}", token_id, e);
                    result.warnings.push(format!("trade fetch failed for {token_id}: {e}"));
                    continue;
                }
            };
            trades.sort_by(|a, b| a.ts.partial_cmp(&b.ts).unwrap_or(std::cmp::Ordering::Equal));
            if let Some(first) = trades.first() {
                if now - first.ts < TRADE_COVERAGE_WARN_SECS {
                    log::warn!("paper.trades.coverage token={} window_secs={:.0}", token_id, now - first.ts);
                    result
                        .warnings
                        .push(format!("trade coverage under 1h for {token_id}"));
                }
            }

            for o in live.iter_mut().filter(|o| o.token_id == token_id) {
                let Some(sim) = simulate_order_fill(o, &trades, now) else {
                    continue;
                };
                let fill_id = Uuid::new_v4().to_string();
                if let Err(e) = self.store.insert_paper_fill(
                    &fill_id,
                    &o.order_id,
                    &sim.trade_id,
                    o.bid_price,
                    sim.newly_filled,
                    sim.fill_ts,
                ) {
                    log::warn!("paper.fill.persist.error order_id={} {}", o.order_id, e);
                    continue;
                }
                let persisted = if sim.complete {
                    self.store.mark_order_filled(&o.order_id, sim.fill_ts, o.bid_price)
                } else {
                    self.store.update_order_partial(&o.order_id, sim.filled_size, o.bid_price)
                };
                if let Err(e) = persisted {
                    log::warn!("paper.fill.status.error order_id={} {}", o.order_id, e);
                    continue;
                }
                o.filled_size = sim.filled_size;
                o.fill_price = Some(o.bid_price);
                if sim.complete {
                    o.status = OrderStatus::Filled;
                    o.fill_ts = Some(sim.fill_ts);
                } else {
                    o.status = OrderStatus::Partial;
                }
                result.new_fills += 1;
                log::info!(
                    "paper.fill order_id={} side={} newly={:.2} total={:.2} complete={}",
                    o.order_id,
                    o.side.as_str(),
                    sim.newly_filled,
                    sim.filled_size,
                    sim.complete
                );
            }
        }
        // Fully-filled legs leave the live set; they wait for merge below.
        live.retain(|o| o.status != OrderStatus::Filled);

        // 6. Merge complete pairs after the settlement debounce.
        match self.store.filled_unmerged_orders() {
            Ok(filled) => {
                let mut by_pair: HashMap<&str, Vec<&PaperOrder>> = HashMap::new();
                for o in &filled {
                    by_pair.entry(o.pair_id.as_str()).or_default().push(o);
                }
                for (pair_id, orders) in by_pair {
                    if orders.len() != 2 {
                        continue;
                    }
                    result.complete_pairs += 1;
                    let later_fill = orders
                        .iter()
                        .filter_map(|o| o.fill_ts)
                        .fold(0.0, f64::max);
                    if now - later_fill < MERGE_DELAY_MINS * 60.0 {
                        continue;
                    }
                    // Fill rows must reconcile with the leg totals before
                    // money is booked against them.
                    for o in &orders {
                        let recorded = self.store.fills_total_for_order(&o.order_id).unwrap_or(o.filled_size);
                        if (recorded - o.filled_size).abs() > 1e-6 {
                            log::warn!(
                                "paper.merge.fill_drift order_id={} recorded={:.4} filled={:.4}",
                                o.order_id,
                                recorded,
                                o.filled_size
                            );
                        }
                    }
                    let profit: f64 = orders
                        .iter()
                        .map(|o| o.size * (1.0 - o.fill_price.unwrap_or(o.bid_price)))
                        .sum::<f64>()
                        - MERGE_GAS_COST;
                    let placed = orders[0].placed_ts;
                    let condition_id = &orders[0].condition_id;
                    if let Err(e) = self.store.insert_merge(pair_id, condition_id, now, profit, placed) {
                        log::warn!("paper.merge.persist.error pair_id={} {}", pair_id, e);
                        continue;
                    }
                    if let Err(e) = self.store.mark_pair_merged(pair_id) {
                        log::warn!("paper.merge.mark.error pair_id={} {}", pair_id, e);
                        continue;
                    }
                    result.merges += 1;
                    result.merge_profit += profit;
                    log::info!(
                        "paper.merge pair_id={} condition_id={} profit={:.4} cycle_hours={:.1}",
                        pair_id,
                        condition_id,
                        profit,
                        (now - placed) / SECS_PER_HOUR
                    );
                }
            }
            Err(e) => {
                log::warn!("paper.merge.load.error {}", e);
                result.warnings.push(format!("load filled orders failed: {e}"));
            }
        }

        // 7. Compound metrics.
        let stats = match self.store.paper_stats() {
            Ok(s) => s,
            Err(e) => {
                log::warn!("paper.stats.error {}", e);
                result.warnings.push(format!("stats load failed: {e}"));
                PaperStats::default()
            }
        };
        result.compound_balance = self.settings.initial_capital + stats.total_profit;
        result.total_rotations = stats.merges;
        result.avg_cycle_hours = stats.avg_cycle_hours;

        // 8. Capital allocation.
        result.kelly_fraction = kelly_fraction(&stats);
        let effective_capital = result.compound_balance * result.kelly_fraction;

        // 9. New-pair placement in compound-velocity order.
        let mut active_conditions: HashSet<String> = match self.store.active_conditions() {
            Ok(c) => c.into_iter().collect(),
            Err(e) => {
                log::warn!("paper.active.load.error {}", e);
                result.warnings.push(format!("load active conditions failed: {e}"));
                live.iter().map(|o| o.condition_id.clone()).collect()
            }
        };
        let active_pairs = active_conditions.len();
        let mut deployed = self.deployed_capital(&active_conditions, &mut result);
        let mut new_pairs = 0usize;

        let mut ranked = opps.clone();
        rank_by_velocity(&mut ranked);

        for opp in &ranked {
            if active_pairs + new_pairs >= self.settings.max_markets {
                break;
            }
            let condition_id = &opp.market.condition_id;
            if active_conditions.contains(condition_id) {
                continue;
            }
            if opp.fill_cost_per_pair > 0.0 || opp.your_daily_reward <= 0.0 || !opp.qualifies_reward {
                continue;
            }
            let h = opp.hours_to_resolution;
            if h > 0.0 && h < NEAR_END_HOURS {
                continue;
            }

            let cap = ((effective_capital - deployed) / 2.0).max(0.0);
            let mut size = self.optimal_order_size(opp).min(cap);
            if size < MIN_ORDER_SIZE {
                if deployed <= 0.0 {
                    size = cap;
                } else {
                    result.warnings.push("capital limit reached".to_string());
                    break;
                }
            }
            if size < 1.0 {
                result.warnings.push("capital limit reached".to_string());
                break;
            }

            let fee_rate = opp.market.maker_base_fee.unwrap_or(self.settings.fee_rate_default);
            let Some((yes_bid, no_bid)) =
                optimise_pair_bids(&opp.yes_book, &opp.no_book, fee_rate, size)
            else {
                log::warn!("paper.place.skip.empty_books condition_id={}", condition_id);
                continue;
            };

            if let Err(e) = self.place_pair(opp, yes_bid, no_bid, size, now) {
                log::warn!("paper.place.error condition_id={} {}", condition_id, e);
                result.warnings.push(format!("placement failed for {condition_id}: {e}"));
                continue;
            }
            active_conditions.insert(condition_id.clone());
            deployed += 2.0 * size;
            new_pairs += 1;
            result.new_orders += 2;
        }

        // 10. Positions, partial alerts, deployed capital.
        self.build_positions(now, &mut result);

        // 11. Daily summary keyed by UTC date.
        let day_start = now - (now % SECS_PER_DAY);
        let fills_today = self.store.count_fills_between(day_start, now + 1.0).unwrap_or(0);
        let (merges_today, profit_today) = self
            .store
            .merges_between(day_start, now + 1.0)
            .unwrap_or((0, 0.0));
        let summary = DailySummary {
            date: today_key(now),
            ts: now,
            open_pairs: result.positions.iter().filter(|p| !p.is_complete).count() as i64,
            fills: fills_today,
            merges: merges_today,
            reward_accrued: result.positions.iter().map(|p| p.reward_accrued).sum(),
            capital_deployed: result.capital_deployed,
            merge_profit: profit_today,
            compound_balance: result.compound_balance,
            total_rotations: result.total_rotations,
        };
        if let Err(e) = self.store.upsert_daily_summary(&summary) {
            log::warn!("paper.summary.persist.error {}", e);
        }

        self.store
            .upsert_runtime_status(
                "paper",
                "ok",
                &format!(
                    "pairs={} new_orders={} fills={} merges={}",
                    result.positions.len(),
                    result.new_orders,
                    result.new_fills,
                    result.merges
                ),
                None,
                now,
            )
            .ok();
        log::info!(
            "paper.cycle positions={} new_orders={} fills={} merges={} deployed={:.2} balance={:.2} kelly={:.2}",
            result.positions.len(),
            result.new_orders,
            result.new_fills,
            result.merges,
            result.capital_deployed,
            result.compound_balance,
            result.kelly_fraction
        );
        Ok(result)
    }

    fn expire(&self, condition_id: &str, reason: &str, result: &mut CycleResult) {
        match self.store.expire_condition(condition_id) {
            Ok(n) => {
                log::info!("paper.expire condition_id={} orders={} reason={}", condition_id, n, reason)
            }
            Err(e) => {
                log::warn!("paper.expire.error condition_id={} {}", condition_id, e);
                result.warnings.push(format!("expire failed for {condition_id}: {e}"));
            }
        }
    }

    fn deployed_capital(&self, active_conditions: &HashSet<String>, result: &mut CycleResult) -> f64 {
        let mut deployed = 0.0;
        let mut count = |orders: Vec<PaperOrder>| {
            for o in orders {
                if active_conditions.contains(&o.condition_id) {
                    deployed += o.size;
                }
            }
        };
        match self.store.open_paper_orders() {
            Ok(orders) => count(orders),
            Err(e) => result.warnings.push(format!("deployed capital load failed: {e}")),
        }
        match self.store.filled_unmerged_orders() {
            Ok(orders) => count(orders),
            Err(e) => result.warnings.push(format!("deployed capital load failed: {e}")),
        }
        deployed
    }

    fn place_pair(&self, opp: &Opportunity, yes_bid: f64, no_bid: f64, size: f64, now: f64) -> Result<()> {
        let pair_id = Uuid::new_v4().to_string();
        let legs = [
            (OrderSide::Yes, &opp.market.yes_token_id, yes_bid, &opp.yes_book),
            (OrderSide::No, &opp.market.no_token_id, no_bid, &opp.no_book),
        ];
        for (side, token_id, bid, book) in legs {
            let order = PaperOrder {
                order_id: Uuid::new_v4().to_string(),
                pair_id: pair_id.clone(),
                condition_id: opp.market.condition_id.clone(),
                token_id: token_id.clone(),
                side,
                bid_price: bid,
                size,
                placed_ts: now,
                filled_size: 0.0,
                status: OrderStatus::Open,
                queue_ahead: book.queue_position(bid),
                fill_ts: None,
                fill_price: None,
                daily_reward_snapshot: opp.your_daily_reward,
                end_ts_snapshot: opp.market.end_ts,
                merged: false,
            };
            self.store.insert_paper_order(&order)?;
        }
        log::info!(
            "paper.place pair_id={} condition_id={} yes_bid={:.3} no_bid={:.3} size={:.2}",
            pair_id,
            opp.market.condition_id,
            yes_bid,
            no_bid,
            size
        );
        Ok(())
    }

    fn build_positions(&self, now: f64, result: &mut CycleResult) {
        let mut orders: Vec<PaperOrder> = Vec::new();
        match self.store.open_paper_orders() {
            Ok(o) => orders.extend(o),
            Err(e) => {
                result.warnings.push(format!("positions load failed: {e}"));
                return;
            }
        }
        match self.store.filled_unmerged_orders() {
            Ok(o) => orders.extend(o),
            Err(e) => {
                result.warnings.push(format!("positions load failed: {e}"));
                return;
            }
        }

        let mut by_pair: HashMap<String, Vec<PaperOrder>> = HashMap::new();
        for o in orders {
            by_pair.entry(o.pair_id.clone()).or_default().push(o);
        }

        for (pair_id, mut legs) in by_pair {
            if legs.len() != 2 {
                log::warn!("paper.positions.odd_pair pair_id={} legs={}", pair_id, legs.len());
                continue;
            }
            legs.sort_by_key(|o| o.side != OrderSide::Yes);
            let no = legs.remove(1);
            let yes = legs.remove(0);
            if yes.side == no.side {
                log::warn!("paper.positions.same_side pair_id={}", pair_id);
                continue;
            }

            let is_complete = yes.status == OrderStatus::Filled && no.status == OrderStatus::Filled;
            let partial_since = match (yes.status, no.status) {
                (OrderStatus::Filled, s) if s != OrderStatus::Filled => yes.fill_ts,
                (s, OrderStatus::Filled) if s != OrderStatus::Filled => no.fill_ts,
                _ => None,
            };
            if let Some(since) = partial_since {
                if (now - since) / SECS_PER_HOUR > MAX_PARTIAL_HOURS {
                    result.partial_alerts.push(format!(
                        "pair {} one-sided for {:.1}h on {}",
                        pair_id,
                        (now - since) / SECS_PER_HOUR,
                        yes.condition_id
                    ));
                }
            }

            let days_open = ((now - yes.placed_ts) / SECS_PER_DAY).max(0.0);
            let reward_accrued = if is_complete {
                0.0
            } else {
                yes.daily_reward_snapshot * days_open
            };
            let hours_to_end = yes
                .end_ts_snapshot
                .map(|e| hours_until(e, now))
                .unwrap_or(f64::INFINITY);
            let is_resolved = yes.end_ts_snapshot.map(|e| e <= now).unwrap_or(false);

            result.capital_deployed += yes.size + no.size;
            result.positions.push(PairPosition {
                pair_id,
                condition_id: yes.condition_id.clone(),
                yes,
                no,
                reward_accrued,
                is_complete,
                is_resolved,
                partial_since,
                hours_to_end,
            });
        }
        result
            .positions
            .sort_by(|a, b| a.pair_id.cmp(&b.pair_id));
    }
}
