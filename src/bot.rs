use std::path::Path;
use std::time::Duration;

use anyhow::Result;

use crate::client::{MarketProvider, TradeProvider};
use crate::config::Settings;
use crate::paper::PaperEngine;
use crate::report;
use crate::scanner::Scanner;
use crate::store::SqliteStore;
use crate::utils::now_ts;

const STOP_SENTINEL: &str = "STOP";

/// A `STOP` file in the working directory requests a clean shutdown at the
/// next tick; it is consumed so the next start is unaffected.
fn stop_requested() -> bool {
    let p = Path::new(STOP_SENTINEL);
    if !p.exists() {
        return false;
    }
    if let Err(e) = std::fs::remove_file(p) {
        log::warn!("loop.stop_sentinel.remove.error {}", e);
    }
    true
}

fn make_tick(secs: u64) -> tokio::time::Interval {
    let mut tick = tokio::time::interval(Duration::from_secs(secs));
    tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    tick
}

pub async fn run_scan_loop<P: MarketProvider>(
    scanner: Scanner<P>,
    settings: Settings,
    store: SqliteStore,
    dry_run: bool,
) -> Result<()> {
    let mut tick = make_tick(settings.scan_interval_secs);
    let mut cycles = 0u64;
    loop {
        tokio::select! {
            _ = tick.tick() => {}
            _ = tokio::signal::ctrl_c() => {
                log::info!("scan.shutdown signal=interrupt cycles={}", cycles);
                break;
            }
        }

        // A bad cycle never takes down the loop.
        match scanner.run_once(dry_run).await {
            Ok(opps) => {
                cycles += 1;
                log::info!("scan.cycle n={} opportunities={}", cycles, opps.len());
            }
            Err(e) => {
                log::warn!("scan.cycle.error {}", e);
                store
                    .upsert_runtime_status("scanner", "error", "cycle_failed", Some(&e.to_string()), now_ts())
                    .ok();
            }
        }

        if stop_requested() {
            log::info!("scan.shutdown signal=stop_sentinel cycles={}", cycles);
            break;
        }
    }
    Ok(())
}

pub async fn run_paper_loop<P: MarketProvider, T: TradeProvider>(
    mut engine: PaperEngine<P, T>,
    settings: Settings,
    store: SqliteStore,
) -> Result<()> {
    let mut tick = make_tick(settings.scan_interval_secs);
    let mut cycles = 0u64;
    loop {
        tokio::select! {
            _ = tick.tick() => {}
            _ = tokio::signal::ctrl_c() => {
                log::info!("paper.shutdown signal=interrupt cycles={}", cycles);
                break;
            }
        }

        match engine.run_once().await {
            Ok(result) => {
                cycles += 1;
                for w in &result.warnings {
                    log::warn!("paper.cycle.warning {}", w);
                }
                for a in &result.partial_alerts {
                    log::warn!("paper.cycle.partial_alert {}", a);
                }
                if let Err(e) = report::write_cycle_snapshot(&store, &result) {
                    log::warn!("paper.snapshot.error {}", e);
                }
            }
            Err(e) => {
                log::warn!("paper.cycle.error {}", e);
                store
                    .upsert_runtime_status("paper", "error", "cycle_failed", Some(&e.to_string()), now_ts())
                    .ok();
            }
        }

        if stop_requested() {
            log::info!("paper.shutdown signal=stop_sentinel cycles={}", cycles);
            break;
        }
    }

    final_summary(&store, cycles);
    Ok(())
}

fn final_summary(store: &SqliteStore, cycles: u64) {
    match store.paper_stats() {
        Ok(s) => log::info!(
            "paper.final cycles={} rotations={} merge_profit={:.2} wins={} avg_cycle_hours={:.1}",
            cycles,
            s.merges,
            s.total_profit,
            s.wins,
            s.avg_cycle_hours
        ),
        Err(e) => log::warn!("paper.final.stats.error {}", e),
    }
}
