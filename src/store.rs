use std::path::Path;

use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::scanner::Opportunity;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderSide {
    Yes,
    No,
}

impl OrderSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderSide::Yes => "yes",
            OrderSide::No => "no",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "yes" => Some(OrderSide::Yes),
            "no" => Some(OrderSide::No),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    Open,
    Partial,
    Filled,
    Expired,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Open => "open",
            OrderStatus::Partial => "partial",
            OrderStatus::Filled => "filled",
            OrderStatus::Expired => "expired",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "open" => Some(OrderStatus::Open),
            "partial" => Some(OrderStatus::Partial),
            "filled" => Some(OrderStatus::Filled),
            "expired" => Some(OrderStatus::Expired),
            _ => None,
        }
    }
}

/// One leg of a virtual YES+NO pair. The store owns these rows; the engine
/// holds them only transiently within a cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaperOrder {
    pub order_id: String,
    pub pair_id: String,
    pub condition_id: String,
    pub token_id: String,
    pub side: OrderSide,
    pub bid_price: f64,
    pub size: f64,
    pub placed_ts: f64,
    pub filled_size: f64,
    pub status: OrderStatus,
    pub queue_ahead: f64,
    pub fill_ts: Option<f64>,
    pub fill_price: Option<f64>,
    pub daily_reward_snapshot: f64,
    pub end_ts_snapshot: Option<f64>,
    pub merged: bool,
}

#[derive(Debug, Clone, Default)]
pub struct PaperStats {
    pub merges: i64,
    pub total_profit: f64,
    pub wins: i64,
    pub avg_win: f64,
    pub avg_loss: f64,
    pub avg_cycle_hours: f64,
}

#[derive(Debug, Clone, Default)]
pub struct DailySummary {
    pub date: String,
    pub ts: f64,
    pub open_pairs: i64,
    pub fills: i64,
    pub merges: i64,
    pub reward_accrued: f64,
    pub capital_deployed: f64,
    pub merge_profit: f64,
    pub compound_balance: f64,
    pub total_rotations: i64,
}

#[derive(Clone)]
pub struct SqliteStore {
    path: String,
}

impl SqliteStore {
    pub fn new(path: &str) -> Result<Self> {
        if path.trim().is_empty() {
            anyhow::bail!("SQLITE_PATH is empty");
        }
        if path != ":memory:" && !path.starts_with("file:") {
            if let Some(parent) = Path::new(path).parent() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("create sqlite parent dir for {path}"))?;
            }
        }

        // rusqlite::Connection is not Send/Sync; keep only a path and open
        // short-lived connections per operation. WAL keeps this fast enough
        // for once-a-minute cycles plus the dashboard readers.
        Ok(Self { path: path.to_string() })
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    fn open_conn(&self) -> Result<Connection> {
        let conn = Connection::open(&self.path).with_context(|| format!("open sqlite {}", self.path))?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
        Ok(conn)
    }

    pub fn init_db(&self) -> Result<()> {
        let conn = self.open_conn()?;
        conn.execute_batch(
            r#"
CREATE TABLE IF NOT EXISTS scans (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  ts REAL,
  condition_id TEXT,
  question TEXT,
  spread_total REAL,
  daily_reward REAL,
  competition_usdc REAL,
  fill_cost_per_pair REAL,
  fill_cost_usdc REAL,
  reward_score REAL,
  break_even_fills REAL,
  net_profit_est REAL,
  category TEXT,
  qualifies INTEGER,
  hours_to_resolution REAL
);

CREATE INDEX IF NOT EXISTS idx_scans_ts ON scans(ts);
CREATE INDEX IF NOT EXISTS idx_scans_condition ON scans(condition_id, ts);

CREATE TABLE IF NOT EXISTS paper_orders (
  order_id TEXT PRIMARY KEY,
  pair_id TEXT,
  condition_id TEXT,
  token_id TEXT,
  side TEXT,
  bid_price REAL,
  size REAL,
  placed_ts REAL,
  filled_size REAL,
  status TEXT,
  queue_ahead REAL,
  fill_ts REAL,
  fill_price REAL,
  daily_reward_snapshot REAL,
  end_ts_snapshot REAL,
  merged INTEGER DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_paper_orders_condition ON paper_orders(condition_id, status);
CREATE INDEX IF NOT EXISTS idx_paper_orders_pair ON paper_orders(pair_id);

CREATE TABLE IF NOT EXISTS paper_fills (
  fill_id TEXT PRIMARY KEY,
  order_id TEXT,
  trade_id TEXT,
  price REAL,
  size REAL,
  ts REAL
);

CREATE INDEX IF NOT EXISTS idx_paper_fills_order ON paper_fills(order_id);

CREATE TABLE IF NOT EXISTS paper_merges (
  pair_id TEXT PRIMARY KEY,
  condition_id TEXT,
  ts REAL,
  profit REAL,
  pair_placed_ts REAL
);

CREATE TABLE IF NOT EXISTS daily_summaries (
  date TEXT PRIMARY KEY,
  ts REAL,
  open_pairs INTEGER,
  fills INTEGER,
  merges INTEGER,
  reward_accrued REAL,
  capital_deployed REAL,
  merge_profit REAL,
  compound_balance REAL,
  total_rotations INTEGER
);

CREATE TABLE IF NOT EXISTS runtime_status (
  component TEXT PRIMARY KEY,
  ts REAL,
  level TEXT,
  message TEXT,
  detail TEXT
);
"#,
        )?;
        Ok(())
    }

    pub fn upsert_runtime_status(
        &self,
        component: &str,
        level: &str,
        message: &str,
        detail: Option<&str>,
        ts: f64,
    ) -> Result<()> {
        let conn = self.open_conn()?;
        conn.execute(
            r#"
INSERT INTO runtime_status(component, ts, level, message, detail)
VALUES(?,?,?,?,?)
ON CONFLICT(component) DO UPDATE SET
  ts=excluded.ts,
  level=excluded.level,
  message=excluded.message,
  detail=excluded.detail
"#,
            params![component, ts, level, message, detail],
        )?;
        Ok(())
    }

    // ---- Scan history ----

    pub fn save_scan(&self, opps: &[Opportunity]) -> Result<()> {
        let mut conn = self.open_conn()?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                r#"
INSERT INTO scans(
  ts, condition_id, question,
  spread_total, daily_reward, competition_usdc,
  fill_cost_per_pair, fill_cost_usdc, reward_score, break_even_fills, net_profit_est,
  category, qualifies, hours_to_resolution
)
VALUES(?,?,?,?,?,?,?,?,?,?,?,?,?,?)
"#,
            )?;
            for o in opps {
                stmt.execute(params![
                    o.scanned_at,
                    o.market.condition_id,
                    o.market.question,
                    o.spread_total,
                    o.your_daily_reward,
                    o.competition_usdc,
                    o.fill_cost_per_pair,
                    o.fill_cost_usdc,
                    o.reward_score,
                    o.break_even_fills,
                    o.net_profit_est,
                    o.category.as_str(),
                    if o.qualifies_reward { 1 } else { 0 },
                    o.hours_to_resolution,
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    pub fn scan_history(&self, from_ts: f64, to_ts: f64) -> Result<Vec<JsonValue>> {
        let conn = self.open_conn()?;
        let mut stmt = conn.prepare(
            r#"
SELECT ts, condition_id, question, spread_total, daily_reward, competition_usdc,
       fill_cost_per_pair, reward_score, category, qualifies, hours_to_resolution
FROM scans
WHERE ts >= ? AND ts <= ?
ORDER BY ts DESC
"#,
        )?;
        let mut rows = stmt.query(params![from_ts, to_ts])?;
        let mut out = vec![];
        while let Some(r) = rows.next()? {
            out.push(serde_json::json!({
                "ts": r.get::<_, f64>(0)?,
                "condition_id": r.get::<_, String>(1)?,
                "question": r.get::<_, String>(2)?,
                "spread_total": r.get::<_, f64>(3)?,
                "daily_reward": r.get::<_, f64>(4)?,
                "competition_usdc": r.get::<_, f64>(5)?,
                "fill_cost_per_pair": r.get::<_, f64>(6)?,
                "reward_score": r.get::<_, f64>(7)?,
                "category": r.get::<_, String>(8)?,
                "qualifies": r.get::<_, i64>(9)? != 0,
                "hours_to_resolution": r.get::<_, f64>(10)?,
            }));
        }
        Ok(out)
    }

    // ---- Paper orders ----

    pub fn insert_paper_order(&self, o: &PaperOrder) -> Result<()> {
        let conn = self.open_conn()?;
        conn.execute(
            r#"
INSERT OR REPLACE INTO paper_orders(
  order_id, pair_id, condition_id, token_id, side,
  bid_price, size, placed_ts, filled_size, status,
  queue_ahead, fill_ts, fill_price, daily_reward_snapshot, end_ts_snapshot, merged
)
VALUES(?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?)
"#,
            params![
                o.order_id,
                o.pair_id,
                o.condition_id,
                o.token_id,
                o.side.as_str(),
                o.bid_price,
                o.size,
                o.placed_ts,
                o.filled_size,
                o.status.as_str(),
                o.queue_ahead,
                o.fill_ts,
                o.fill_price,
                o.daily_reward_snapshot,
                o.end_ts_snapshot,
                if o.merged { 1 } else { 0 },
            ],
        )?;
        Ok(())
    }

    fn row_to_order(r: &rusqlite::Row<'_>) -> rusqlite::Result<PaperOrder> {
        let side_raw: String = r.get(4)?;
        let status_raw: String = r.get(9)?;
        let side = OrderSide::parse(&side_raw).ok_or_else(|| {
            rusqlite::Error::FromSqlConversionFailure(
                4,
                rusqlite::types::Type::Text,
                format!("unknown order side {side_raw}").into(),
            )
        })?;
        let status = OrderStatus::parse(&status_raw).ok_or_else(|| {
            rusqlite::Error::FromSqlConversionFailure(
                9,
                rusqlite::types::Type::Text,
                format!("unknown order status {status_raw}").into(),
            )
        })?;
        Ok(PaperOrder {
            order_id: r.get(0)?,
            pair_id: r.get(1)?,
            condition_id: r.get(2)?,
            token_id: r.get(3)?,
            side,
            bid_price: r.get(5)?,
            size: r.get(6)?,
            placed_ts: r.get(7)?,
            filled_size: r.get(8)?,
            status,
            queue_ahead: r.get(10)?,
            fill_ts: r.get(11)?,
            fill_price: r.get(12)?,
            daily_reward_snapshot: r.get(13)?,
            end_ts_snapshot: r.get(14)?,
            merged: r.get::<_, i64>(15)? != 0,
        })
    }

    const ORDER_COLS: &'static str = r#"
order_id, pair_id, condition_id, token_id, side,
bid_price, size, placed_ts, filled_size, status,
queue_ahead, fill_ts, fill_price, daily_reward_snapshot, end_ts_snapshot, merged
"#;

    pub fn open_paper_orders(&self) -> Result<Vec<PaperOrder>> {
        let conn = self.open_conn()?;
        let sql = format!(
            "SELECT {} FROM paper_orders WHERE status IN ('open','partial') ORDER BY placed_ts ASC",
            Self::ORDER_COLS
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map([], Self::row_to_order)?;
        let mut out = vec![];
        for r in rows {
            out.push(r?);
        }
        Ok(out)
    }

    /// Fully-filled legs whose pairs have not yet been merged.
    pub fn filled_unmerged_orders(&self) -> Result<Vec<PaperOrder>> {
        let conn = self.open_conn()?;
        let sql = format!(
            "SELECT {} FROM paper_orders WHERE status = 'filled' AND merged = 0 ORDER BY placed_ts ASC",
            Self::ORDER_COLS
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map([], Self::row_to_order)?;
        let mut out = vec![];
        for r in rows {
            out.push(r?);
        }
        Ok(out)
    }

    pub fn update_order_queue(&self, order_id: &str, queue_ahead: f64) -> Result<()> {
        let conn = self.open_conn()?;
        conn.execute(
            "UPDATE paper_orders SET queue_ahead=? WHERE order_id=?",
            params![queue_ahead, order_id],
        )?;
        Ok(())
    }

    pub fn update_order_partial(&self, order_id: &str, filled_size: f64, fill_price: f64) -> Result<()> {
        let conn = self.open_conn()?;
        conn.execute(
            "UPDATE paper_orders SET status='partial', filled_size=?, fill_price=? WHERE order_id=?",
            params![filled_size, fill_price, order_id],
        )?;
        Ok(())
    }

    pub fn mark_order_filled(&self, order_id: &str, fill_ts: f64, fill_price: f64) -> Result<()> {
        let conn = self.open_conn()?;
        conn.execute(
            "UPDATE paper_orders SET status='filled', filled_size=size, fill_ts=?, fill_price=? WHERE order_id=?",
            params![fill_ts, fill_price, order_id],
        )?;
        Ok(())
    }

    /// Expire every live leg on the condition (both sides of all pairs).
    /// Returns the number of orders transitioned.
    pub fn expire_condition(&self, condition_id: &str) -> Result<usize> {
        let conn = self.open_conn()?;
        let n = conn.execute(
            "UPDATE paper_orders SET status='expired' WHERE condition_id=? AND status IN ('open','partial')",
            params![condition_id],
        )?;
        Ok(n)
    }

    /// Conditions that still hold a live or settle-pending pair.
    pub fn active_conditions(&self) -> Result<Vec<String>> {
        let conn = self.open_conn()?;
        let mut stmt = conn.prepare(
            "SELECT DISTINCT condition_id FROM paper_orders WHERE status IN ('open','partial') OR (status='filled' AND merged=0)",
        )?;
        let rows = stmt.query_map([], |r| r.get::<_, String>(0))?;
        let mut out = vec![];
        for r in rows {
            out.push(r?);
        }
        Ok(out)
    }

    pub fn mark_pair_merged(&self, pair_id: &str) -> Result<()> {
        let conn = self.open_conn()?;
        conn.execute("UPDATE paper_orders SET merged=1 WHERE pair_id=?", params![pair_id])?;
        Ok(())
    }

    // ---- Paper fills ----

    pub fn insert_paper_fill(
        &self,
        fill_id: &str,
        order_id: &str,
        trade_id: &str,
        price: f64,
        size: f64,
        ts: f64,
    ) -> Result<()> {
        let conn = self.open_conn()?;
        conn.execute(
            "INSERT OR REPLACE INTO paper_fills(fill_id, order_id, trade_id, price, size, ts) VALUES(?,?,?,?,?,?)",
            params![fill_id, order_id, trade_id, price, size, ts],
        )?;
        Ok(())
    }

    pub fn fills_total_for_order(&self, order_id: &str) -> Result<f64> {
        let conn = self.open_conn()?;
        let v: Option<f64> = conn
            .query_row(
                "SELECT SUM(size) FROM paper_fills WHERE order_id=?",
                params![order_id],
                |r| r.get(0),
            )
            .optional()?
            .flatten();
        Ok(v.unwrap_or(0.0))
    }

    pub fn count_fills_between(&self, from_ts: f64, to_ts: f64) -> Result<i64> {
        let conn = self.open_conn()?;
        let n: i64 = conn.query_row(
            "SELECT COUNT(*) FROM paper_fills WHERE ts >= ? AND ts < ?",
            params![from_ts, to_ts],
            |r| r.get(0),
        )?;
        Ok(n)
    }

    /// Merge count and summed profit inside a window (daily-summary input).
    pub fn merges_between(&self, from_ts: f64, to_ts: f64) -> Result<(i64, f64)> {
        let conn = self.open_conn()?;
        let row = conn.query_row(
            "SELECT COUNT(*), COALESCE(SUM(profit), 0.0) FROM paper_merges WHERE ts >= ? AND ts < ?",
            params![from_ts, to_ts],
            |r| Ok((r.get::<_, i64>(0)?, r.get::<_, f64>(1)?)),
        )?;
        Ok(row)
    }

    // ---- Merges / stats ----

    pub fn insert_merge(
        &self,
        pair_id: &str,
        condition_id: &str,
        ts: f64,
        profit: f64,
        pair_placed_ts: f64,
    ) -> Result<()> {
        let conn = self.open_conn()?;
        conn.execute(
            "INSERT OR REPLACE INTO paper_merges(pair_id, condition_id, ts, profit, pair_placed_ts) VALUES(?,?,?,?,?)",
            params![pair_id, condition_id, ts, profit, pair_placed_ts],
        )?;
        Ok(())
    }

    pub fn paper_stats(&self) -> Result<PaperStats> {
        let conn = self.open_conn()?;
        let stats = conn.query_row(
            r#"
SELECT COUNT(*),
       COALESCE(SUM(profit), 0.0),
       COALESCE(SUM(CASE WHEN profit > 0 THEN 1 ELSE 0 END), 0),
       COALESCE(AVG(CASE WHEN profit > 0 THEN profit END), 0.0),
       COALESCE(AVG(CASE WHEN profit <= 0 THEN -profit END), 0.0),
       COALESCE(AVG((ts - pair_placed_ts) / 3600.0), 0.0)
FROM paper_merges
"#,
            [],
            |r| {
                Ok(PaperStats {
                    merges: r.get(0)?,
                    total_profit: r.get(1)?,
                    wins: r.get(2)?,
                    avg_win: r.get(3)?,
                    avg_loss: r.get(4)?,
                    avg_cycle_hours: r.get(5)?,
                })
            },
        )?;
        Ok(stats)
    }

    // ---- Daily summaries ----

    pub fn upsert_daily_summary(&self, s: &DailySummary) -> Result<()> {
        let conn = self.open_conn()?;
        conn.execute(
            r#"
INSERT INTO daily_summaries(
  date, ts, open_pairs, fills, merges,
  reward_accrued, capital_deployed, merge_profit, compound_balance, total_rotations
)
VALUES(?,?,?,?,?,?,?,?,?,?)
ON CONFLICT(date) DO UPDATE SET
  ts=excluded.ts,
  open_pairs=excluded.open_pairs,
  fills=excluded.fills,
  merges=excluded.merges,
  reward_accrued=excluded.reward_accrued,
  capital_deployed=excluded.capital_deployed,
  merge_profit=excluded.merge_profit,
  compound_balance=excluded.compound_balance,
  total_rotations=excluded.total_rotations
"#,
            params![
                s.date,
                s.ts,
                s.open_pairs,
                s.fills,
                s.merges,
                s.reward_accrued,
                s.capital_deployed,
                s.merge_profit,
                s.compound_balance,
                s.total_rotations,
            ],
        )?;
        Ok(())
    }

    // ---- Dashboard queries (read-only) ----

    pub fn fetch_recent_orders(&self, limit: usize) -> Result<Vec<JsonValue>> {
        let conn = self.open_conn()?;
        let mut stmt = conn.prepare(
            r#"
SELECT order_id, pair_id, condition_id, side, bid_price, size, placed_ts, filled_size, status, queue_ahead, merged
FROM paper_orders
ORDER BY placed_ts DESC
LIMIT ?
"#,
        )?;
        let mut rows = stmt.query(params![limit as i64])?;
        let mut out = vec![];
        while let Some(r) = rows.next()? {
            out.push(serde_json::json!({
                "order_id": r.get::<_, String>(0)?,
                "pair_id": r.get::<_, String>(1)?,
                "condition_id": r.get::<_, String>(2)?,
                "side": r.get::<_, String>(3)?,
                "bid_price": r.get::<_, f64>(4)?,
                "size": r.get::<_, f64>(5)?,
                "placed_ts": r.get::<_, f64>(6)?,
                "filled_size": r.get::<_, f64>(7)?,
                "status": r.get::<_, String>(8)?,
                "queue_ahead": r.get::<_, f64>(9)?,
                "merged": r.get::<_, i64>(10)? != 0,
            }));
        }
        Ok(out)
    }

    pub fn fetch_recent_fills(&self, limit: usize) -> Result<Vec<JsonValue>> {
        let conn = self.open_conn()?;
        let mut stmt = conn.prepare(
            "SELECT fill_id, order_id, trade_id, price, size, ts FROM paper_fills ORDER BY ts DESC LIMIT ?",
        )?;
        let mut rows = stmt.query(params![limit as i64])?;
        let mut out = vec![];
        while let Some(r) = rows.next()? {
            out.push(serde_json::json!({
                "fill_id": r.get::<_, String>(0)?,
                "order_id": r.get::<_, String>(1)?,
                "trade_id": r.get::<_, String>(2)?,
                "price": r.get::<_, f64>(3)?,
                "size": r.get::<_, f64>(4)?,
                "ts": r.get::<_, f64>(5)?,
            }));
        }
        Ok(out)
    }

    pub fn fetch_recent_merges(&self, limit: usize) -> Result<Vec<JsonValue>> {
        let conn = self.open_conn()?;
        let mut stmt = conn.prepare(
            "SELECT pair_id, condition_id, ts, profit, pair_placed_ts FROM paper_merges ORDER BY ts DESC LIMIT ?",
        )?;
        let mut rows = stmt.query(params![limit as i64])?;
        let mut out = vec![];
        while let Some(r) = rows.next()? {
            out.push(serde_json::json!({
                "pair_id": r.get::<_, String>(0)?,
                "condition_id": r.get::<_, String>(1)?,
                "ts": r.get::<_, f64>(2)?,
                "profit": r.get::<_, f64>(3)?,
                "pair_placed_ts": r.get::<_, f64>(4)?,
            }));
        }
        Ok(out)
    }

    pub fn fetch_latest_scan(&self, limit: usize) -> Result<Vec<JsonValue>> {
        let conn = self.open_conn()?;
        let latest: Option<f64> = conn
            .query_row("SELECT MAX(ts) FROM scans", [], |r| r.get(0))
            .optional()?
            .flatten();
        let Some(ts) = latest else {
            return Ok(vec![]);
        };
        let mut stmt = conn.prepare(
            r#"
SELECT condition_id, question, spread_total, daily_reward, competition_usdc,
       fill_cost_per_pair, reward_score, break_even_fills, category, qualifies, hours_to_resolution
FROM scans
WHERE ts = ?
ORDER BY daily_reward DESC
LIMIT ?
"#,
        )?;
        let mut rows = stmt.query(params![ts, limit as i64])?;
        let mut out = vec![];
        while let Some(r) = rows.next()? {
            out.push(serde_json::json!({
                "ts": ts,
                "condition_id": r.get::<_, String>(0)?,
                "question": r.get::<_, String>(1)?,
                "spread_total": r.get::<_, f64>(2)?,
                "daily_reward": r.get::<_, f64>(3)?,
                "competition_usdc": r.get::<_, f64>(4)?,
                "fill_cost_per_pair": r.get::<_, f64>(5)?,
                "reward_score": r.get::<_, f64>(6)?,
                "break_even_fills": r.get::<_, f64>(7)?,
                "category": r.get::<_, String>(8)?,
                "qualifies": r.get::<_, i64>(9)? != 0,
                "hours_to_resolution": r.get::<_, f64>(10)?,
            }));
        }
        Ok(out)
    }

    pub fn fetch_daily_summaries(&self, limit: usize) -> Result<Vec<JsonValue>> {
        let conn = self.open_conn()?;
        let mut stmt = conn.prepare(
            r#"
SELECT date, ts, open_pairs, fills, merges, reward_accrued,
       capital_deployed, merge_profit, compound_balance, total_rotations
FROM daily_summaries
ORDER BY date DESC
LIMIT ?
"#,
        )?;
        let mut rows = stmt.query(params![limit as i64])?;
        let mut out = vec![];
        while let Some(r) = rows.next()? {
            out.push(serde_json::json!({
                "date": r.get::<_, String>(0)?,
                "ts": r.get::<_, f64>(1)?,
                "open_pairs": r.get::<_, i64>(2)?,
                "fills": r.get::<_, i64>(3)?,
                "merges": r.get::<_, i64>(4)?,
                "reward_accrued": r.get::<_, f64>(5)?,
                "capital_deployed": r.get::<_, f64>(6)?,
                "merge_profit": r.get::<_, f64>(7)?,
                "compound_balance": r.get::<_, f64>(8)?,
                "total_rotations": r.get::<_, i64>(9)?,
            }));
        }
        Ok(out)
    }

    pub fn fetch_runtime_statuses(&self) -> Result<JsonValue> {
        let conn = self.open_conn()?;
        let mut stmt =
            conn.prepare("SELECT component, ts, level, message, detail FROM runtime_status ORDER BY ts DESC")?;
        let mut rows = stmt.query([])?;
        let mut out = serde_json::Map::new();
        while let Some(r) = rows.next()? {
            let component: String = r.get(0)?;
            out.insert(
                component.clone(),
                serde_json::json!({
                    "component": component,
                    "ts": r.get::<_, f64>(1)?,
                    "level": r.get::<_, String>(2)?,
                    "message": r.get::<_, String>(3)?,
                    "detail": r.get::<_, Option<String>>(4)?.unwrap_or_default(),
                }),
            );
        }
        Ok(JsonValue::Object(out))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn temp_store() -> SqliteStore {
        let path = std::env::temp_dir().join(format!("rewardscout-test-{}.sqlite", uuid::Uuid::new_v4()));
        let store = SqliteStore::new(path.to_str().unwrap()).unwrap();
        store.init_db().unwrap();
        store
    }

    pub(crate) fn sample_order(pair_id: &str, condition_id: &str, side: OrderSide) -> PaperOrder {
        PaperOrder {
            order_id: uuid::Uuid::new_v4().to_string(),
            pair_id: pair_id.to_string(),
            condition_id: condition_id.to_string(),
            token_id: format!("tok-{}", side.as_str()),
            side,
            bid_price: 0.70,
            size: 100.0,
            placed_ts: 1_000.0,
            filled_size: 0.0,
            status: OrderStatus::Open,
            queue_ahead: 200.0,
            fill_ts: None,
            fill_price: None,
            daily_reward_snapshot: 0.8,
            end_ts_snapshot: Some(1_000_000.0),
            merged: false,
        }
    }

    #[test]
    fn order_round_trip() {
        let store = temp_store();
        let o = sample_order("pair-1", "0xcond", OrderSide::Yes);
        store.insert_paper_order(&o).unwrap();
        // Idempotent on order_id.
        store.insert_paper_order(&o).unwrap();

        let open = store.open_paper_orders().unwrap();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].order_id, o.order_id);
        assert_eq!(open[0].side, OrderSide::Yes);
        assert_eq!(open[0].status, OrderStatus::Open);
    }

    #[test]
    fn partial_then_filled_transitions() {
        let store = temp_store();
        let o = sample_order("pair-1", "0xcond", OrderSide::Yes);
        store.insert_paper_order(&o).unwrap();

        store.update_order_partial(&o.order_id, 44.0, 0.70).unwrap();
        let open = store.open_paper_orders().unwrap();
        assert_eq!(open[0].status, OrderStatus::Partial);
        assert!((open[0].filled_size - 44.0).abs() < 1e-9);

        store.mark_order_filled(&o.order_id, 2_000.0, 0.70).unwrap();
        assert!(store.open_paper_orders().unwrap().is_empty());
        let filled = store.filled_unmerged_orders().unwrap();
        assert_eq!(filled.len(), 1);
        assert!((filled[0].filled_size - filled[0].size).abs() < 1e-9);
        assert_eq!(filled[0].fill_ts, Some(2_000.0));
    }

    #[test]
    fn expire_hits_both_sides() {
        let store = temp_store();
        store.insert_paper_order(&sample_order("pair-1", "0xcond", OrderSide::Yes)).unwrap();
        store.insert_paper_order(&sample_order("pair-1", "0xcond", OrderSide::No)).unwrap();
        store.insert_paper_order(&sample_order("pair-2", "0xother", OrderSide::Yes)).unwrap();

        let n = store.expire_condition("0xcond").unwrap();
        assert_eq!(n, 2);
        let open = store.open_paper_orders().unwrap();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].condition_id, "0xother");
    }

    #[test]
    fn stats_aggregate_wins_and_losses() {
        let store = temp_store();
        store.insert_merge("p1", "c1", 7_200.0, 0.5, 0.0).unwrap();
        store.insert_merge("p2", "c2", 10_800.0, -0.1, 0.0).unwrap();
        store.insert_merge("p3", "c3", 3_600.0, 1.5, 0.0).unwrap();

        let s = store.paper_stats().unwrap();
        assert_eq!(s.merges, 3);
        assert_eq!(s.wins, 2);
        assert!((s.total_profit - 1.9).abs() < 1e-9);
        assert!((s.avg_win - 1.0).abs() < 1e-9);
        assert!((s.avg_loss - 0.1).abs() < 1e-9);
        assert!((s.avg_cycle_hours - 2.0).abs() < 1e-9);
    }

    #[test]
    fn daily_summary_upserts_by_date() {
        let store = temp_store();
        let mut s = DailySummary {
            date: "2026-03-01".into(),
            ts: 1.0,
            open_pairs: 2,
            ..Default::default()
        };
        store.upsert_daily_summary(&s).unwrap();
        s.open_pairs = 5;
        s.ts = 2.0;
        store.upsert_daily_summary(&s).unwrap();

        let rows = store.fetch_daily_summaries(10).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["open_pairs"], 5);
    }
}
