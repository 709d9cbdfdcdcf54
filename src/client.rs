use std::collections::HashMap;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};
use parking_lot::Mutex;
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::book::{BookLevel, OrderBook};
use crate::config::Settings;
use crate::utils::parse_ts_rfc3339;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RewardConfig {
    pub daily_rate: f64,
    pub min_size: f64,
    /// Max distance from the midpoint (in cents) that still earns rewards.
    pub max_spread: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Market {
    pub condition_id: String,
    pub question: String,
    pub end_ts: Option<f64>,
    pub yes_token_id: String,
    pub no_token_id: String,
    pub rewards: RewardConfig,
    pub maker_base_fee: Option<f64>,
    pub active: bool,
    pub closed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradeSide {
    Buy,
    Sell,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trade {
    pub id: String,
    pub token_id: String,
    pub side: TradeSide,
    pub price: f64,
    pub size: f64,
    pub ts: f64,
}

/// Read-only market data source. One production impl (`VenueClient`) and
/// in-memory fakes in the scanner/paper tests.
#[allow(async_fn_in_trait)]
pub trait MarketProvider {
    async fn fetch_sampling_markets(&self) -> Result<Vec<Market>>;
    /// Books for the requested tokens; tokens the venue did not return are
    /// simply absent from the map.
    async fn fetch_order_books(&self, token_ids: &[String]) -> Result<HashMap<String, OrderBook>>;
}

#[allow(async_fn_in_trait)]
pub trait TradeProvider {
    /// Recent public trades for one token, newest-first or oldest-first —
    /// callers sort defensively.
    async fn fetch_trades(&self, token_id: &str) -> Result<Vec<Trade>>;
}

const BACKOFF_BASE_MS: u64 = 500;
const BACKOFF_CAP_MS: u64 = 10_000;
const MAX_CURSOR_PAGES: usize = 50;
const CURSOR_END: &str = "LTE=";

pub struct VenueClient {
    http: reqwest::Client,
    clob_base_url: String,
    data_base_url: String,
    max_retries: usize,
    min_interval: Duration,
    last_request: Mutex<Instant>,
}

impl VenueClient {
    pub fn new(settings: &Settings) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.http_timeout_secs))
            .build()
            .context("build http client")?;
        Ok(Self {
            http,
            clob_base_url: settings.clob_base_url.trim_end_matches('/').to_string(),
            data_base_url: settings.data_base_url.trim_end_matches('/').to_string(),
            max_retries: settings.max_retries,
            min_interval: Duration::from_millis(settings.min_request_interval_ms),
            last_request: Mutex::new(Instant::now()),
        })
    }

    /// Space requests out so a scan burst stays well inside venue limits.
    async fn throttle(&self) {
        let wait = {
            let mut last = self.last_request.lock();
            let due = *last + self.min_interval;
            let now = Instant::now();
            if due > now {
                *last = due;
                Some(due - now)
            } else {
                *last = now;
                None
            }
        };
        if let Some(w) = wait {
            tokio::time::sleep(w).await;
        }
    }

    async fn request_json(&self, req: reqwest::RequestBuilder) -> Result<JsonValue> {
        let mut attempt = 0usize;
        loop {
            self.throttle().await;
            let err: anyhow::Error = match req
                .try_clone()
                .ok_or_else(|| anyhow!("request not cloneable"))?
                .send()
                .await
            {
                Ok(resp) if resp.status().is_success() => {
                    match resp.json::<JsonValue>().await {
                        Ok(v) => return Ok(v),
                        Err(e) => anyhow!("decode body: {e}"),
                    }
                }
                Ok(resp) => anyhow!("http status {}", resp.status()),
                Err(e) => anyhow!("http send: {e}"),
            };

            if attempt >= self.max_retries {
                return Err(err.context("transient: exhausted retries"));
            }
            let backoff = (BACKOFF_BASE_MS * (1u64 << attempt.min(5))).min(BACKOFF_CAP_MS);
            let jitter = rand::rng().random_range(0..=BACKOFF_BASE_MS / 2);
            log::warn!("client.retry attempt={} backoff_ms={} err={}", attempt + 1, backoff + jitter, err);
            tokio::time::sleep(Duration::from_millis(backoff + jitter)).await;
            attempt += 1;
        }
    }
}

impl MarketProvider for VenueClient {
    async fn fetch_sampling_markets(&self) -> Result<Vec<Market>> {
        let mut out: Vec<Market> = Vec::new();
        let mut cursor = String::new();

        for _page in 0..MAX_CURSOR_PAGES {
            let url = if cursor.is_empty() {
                format!("{}/sampling-markets", self.clob_base_url)
            } else {
                format!("{}/sampling-markets?next_cursor={}", self.clob_base_url, cursor)
            };
            let body = self.request_json(self.http.get(&url)).await?;

            let data = body
                .get("data")
                .and_then(|d| d.as_array())
                .cloned()
                .unwrap_or_default();
            for raw in &data {
                match parse_market(raw) {
                    Some(m) => out.push(m),
                    None => log::warn!(
                        "markets.parse.skip condition_id={}",
                        raw.get("condition_id").and_then(|v| v.as_str()).unwrap_or("?")
                    ),
                }
            }

            cursor = body
                .get("next_cursor")
                .and_then(|c| c.as_str())
                .unwrap_or("")
                .to_string();
            if cursor.is_empty() || cursor == CURSOR_END || data.is_empty() {
                break;
            }
        }
        Ok(out)
    }

    async fn fetch_order_books(&self, token_ids: &[String]) -> Result<HashMap<String, OrderBook>> {
        let mut out = HashMap::new();
        if token_ids.is_empty() {
            return Ok(out);
        }
        let url = format!("{}/books", self.clob_base_url);
        let body: Vec<JsonValue> = token_ids
            .iter()
            .map(|t| serde_json::json!({ "token_id": t }))
            .collect();
        let resp = self.request_json(self.http.post(&url).json(&body)).await?;

        for raw in resp.as_array().cloned().unwrap_or_default() {
            let Some(token_id) = raw.get("asset_id").and_then(|v| v.as_str()) else {
                continue;
            };
            out.insert(token_id.to_string(), parse_book(&raw));
        }
        Ok(out)
    }
}

impl TradeProvider for VenueClient {
    async fn fetch_trades(&self, token_id: &str) -> Result<Vec<Trade>> {
        let url = format!("{}/trades?asset={}&limit=500", self.data_base_url, token_id);
        let resp = self.request_json(self.http.get(&url)).await?;

        let mut out = Vec::new();
        for raw in resp.as_array().cloned().unwrap_or_default() {
            if let Some(t) = parse_trade(&raw, token_id) {
                out.push(t);
            }
        }
        Ok(out)
    }
}

/// Numbers come back as either JSON numbers or quoted strings depending on
/// the endpoint; accept both.
fn json_f64(v: Option<&JsonValue>) -> Option<f64> {
    let v = v?;
    v.as_f64()
        .or_else(|| v.as_str().and_then(|s| s.trim().parse::<f64>().ok()))
}

fn parse_market(raw: &JsonValue) -> Option<Market> {
    let condition_id = raw.get("condition_id")?.as_str()?.trim().to_string();
    if condition_id.is_empty() {
        return None;
    }
    let question = raw
        .get("question")
        .and_then(|q| q.as_str())
        .unwrap_or("")
        .to_string();

    let tokens = raw.get("tokens")?.as_array()?;
    let mut yes_token = None;
    let mut no_token = None;
    for t in tokens {
        let id = t.get("token_id").and_then(|v| v.as_str()).unwrap_or("").trim();
        if id.is_empty() {
            continue;
        }
        let outcome = t.get("outcome").and_then(|v| v.as_str()).unwrap_or("");
        if outcome.eq_ignore_ascii_case("yes") {
            yes_token = Some(id.to_string());
        } else if outcome.eq_ignore_ascii_case("no") {
            no_token = Some(id.to_string());
        }
    }
    // Some markets label outcomes differently; fall back to positional.
    if (yes_token.is_none() || no_token.is_none()) && tokens.len() >= 2 {
        let first = tokens[0].get("token_id").and_then(|v| v.as_str())?.to_string();
        let second = tokens[1].get("token_id").and_then(|v| v.as_str())?.to_string();
        yes_token.get_or_insert(first);
        no_token.get_or_insert(second);
    }
    let yes_token_id = yes_token?;
    let no_token_id = no_token?;
    if yes_token_id == no_token_id {
        return None;
    }

    let rewards_raw = raw.get("rewards");
    let daily_rate = rewards_raw
        .and_then(|r| r.get("rates"))
        .and_then(|r| r.as_array())
        .map(|rates| {
            rates
                .iter()
                .filter_map(|r| json_f64(r.get("rewards_daily_rate")))
                .sum()
        })
        .unwrap_or(0.0);
    let rewards = RewardConfig {
        daily_rate: daily_rate.max(0.0),
        min_size: rewards_raw.and_then(|r| json_f64(r.get("min_size"))).unwrap_or(0.0),
        max_spread: rewards_raw.and_then(|r| json_f64(r.get("max_spread"))).unwrap_or(0.0),
    };

    Some(Market {
        condition_id,
        question,
        end_ts: raw
            .get("end_date_iso")
            .and_then(|v| v.as_str())
            .and_then(parse_ts_rfc3339),
        yes_token_id,
        no_token_id,
        rewards,
        maker_base_fee: json_f64(raw.get("maker_base_fee")).filter(|f| *f > 0.0),
        active: raw.get("active").and_then(|v| v.as_bool()).unwrap_or(true),
        closed: raw.get("closed").and_then(|v| v.as_bool()).unwrap_or(false),
    })
}

fn parse_book(raw: &JsonValue) -> OrderBook {
    let side = |key: &str| -> Vec<BookLevel> {
        raw.get(key)
            .and_then(|v| v.as_array())
            .map(|levels| {
                levels
                    .iter()
                    .filter_map(|l| {
                        Some(BookLevel {
                            price: json_f64(l.get("price"))?,
                            size: json_f64(l.get("size"))?,
                        })
                    })
                    .collect()
            })
            .unwrap_or_default()
    };
    OrderBook::new(side("bids"), side("asks"))
}

fn parse_trade(raw: &JsonValue, token_id: &str) -> Option<Trade> {
    let side = match raw.get("side").and_then(|v| v.as_str())?.to_ascii_uppercase().as_str() {
        "BUY" => TradeSide::Buy,
        "SELL" => TradeSide::Sell,
        _ => return None,
    };
    let price = json_f64(raw.get("price"))?;
    let size = json_f64(raw.get("size"))?;
    let ts = json_f64(raw.get("timestamp"))?;
    if !(price > 0.0) || !(size > 0.0) {
        return None;
    }
    let id = raw
        .get("id")
        .and_then(|v| v.as_str())
        .or_else(|| raw.get("transactionHash").and_then(|v| v.as_str()))
        .unwrap_or("")
        .to_string();
    Some(Trade {
        id,
        token_id: token_id.to_string(),
        side,
        price,
        size,
        ts,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_sampling_market() {
        let raw = json!({
            "condition_id": "0xabc",
            "question": "Will it rain tomorrow?",
            "end_date_iso": "2026-03-01T12:00:00Z",
            "active": true,
            "closed": false,
            "maker_base_fee": "0.02",
            "tokens": [
                {"token_id": "tok-yes", "outcome": "Yes"},
                {"token_id": "tok-no", "outcome": "No"}
            ],
            "rewards": {
                "min_size": 50,
                "max_spread": "3.5",
                "rates": [{"rewards_daily_rate": 120.0}, {"rewards_daily_rate": 30.0}]
            }
        });
        let m = parse_market(&raw).unwrap();
        assert_eq!(m.condition_id, "0xabc");
        assert_eq!(m.yes_token_id, "tok-yes");
        assert_eq!(m.no_token_id, "tok-no");
        assert!((m.rewards.daily_rate - 150.0).abs() < 1e-9);
        assert!((m.rewards.max_spread - 3.5).abs() < 1e-9);
        assert_eq!(m.maker_base_fee, Some(0.02));
        assert!(m.end_ts.is_some());
    }

    #[test]
    fn market_with_identical_tokens_rejected() {
        let raw = json!({
            "condition_id": "0xabc",
            "tokens": [
                {"token_id": "tok", "outcome": "Yes"},
                {"token_id": "tok", "outcome": "No"}
            ]
        });
        assert!(parse_market(&raw).is_none());
    }

    #[test]
    fn parses_string_priced_book() {
        let raw = json!({
            "asset_id": "tok-yes",
            "bids": [{"price": "0.70", "size": "80"}, {"price": "0.69", "size": "200"}],
            "asks": [{"price": "0.72", "size": "10"}]
        });
        let b = parse_book(&raw);
        assert!((b.best_bid() - 0.70).abs() < 1e-12);
        assert!((b.best_ask() - 0.72).abs() < 1e-12);
    }

    #[test]
    fn parses_trade_sides() {
        let raw = json!({
            "id": "t1", "side": "SELL", "price": 0.7, "size": "50", "timestamp": 1000.0
        });
        let t = parse_trade(&raw, "tok").unwrap();
        assert_eq!(t.side, TradeSide::Sell);
        assert!((t.size - 50.0).abs() < 1e-12);

        let raw = json!({"side": "HOLD", "price": 0.7, "size": 50, "timestamp": 1000});
        assert!(parse_trade(&raw, "tok").is_none());
    }
}
