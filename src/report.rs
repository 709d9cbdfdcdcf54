use anyhow::Result;

use crate::paper::CycleResult;
use crate::scanner::Opportunity;
use crate::store::SqliteStore;
use crate::utils::now_ts;

/// Stdout table of ranked opportunities for one-shot scans.
pub fn print_opportunities(opps: &[Opportunity], limit: usize) {
    if opps.is_empty() {
        println!("no opportunities matched the filter");
        return;
    }
    println!(
        "{:<44} {:>7} {:>10} {:>9} {:>10} {:>12} {:>10} {:>7} {:>5}",
        "question", "cat", "reward/d", "spread", "cost/pair", "competition", "depth", "hours", "ok"
    );
    for o in opps.iter().take(limit) {
        let mut q: String = o.market.question.chars().take(42).collect();
        if o.market.question.chars().count() > 42 {
            q.pop();
            q.push('…');
        }
        let depth = o.yes_book.depth_within_usdc(0.05) + o.no_book.depth_within_usdc(0.05);
        println!(
            "{:<44} {:>7} {:>10.3} {:>9.4} {:>10.4} {:>12.0} {:>10.0} {:>7.0} {:>5}",
            q,
            o.category.as_str(),
            o.your_daily_reward,
            o.spread_total,
            o.fill_cost_per_pair,
            o.competition_usdc,
            depth,
            o.hours_to_resolution,
            if o.qualifies_reward { "yes" } else { "no" }
        );
    }
    if opps.len() > limit {
        println!("… and {} more", opps.len() - limit);
    }
}

/// Markdown snapshot refreshed each paper cycle (ops/telemetry/latest.md).
pub fn write_cycle_snapshot(store: &SqliteStore, result: &CycleResult) -> Result<()> {
    let now = now_ts();
    let mut md = String::new();
    md.push_str("# Paper-trading snapshot\n\n");
    md.push_str(&format!("- generated: `{}`\n", now as u64));
    md.push_str(&format!("- compound balance: **${:.2}**\n", result.compound_balance));
    md.push_str(&format!("- capital deployed: ${:.2}\n", result.capital_deployed));
    md.push_str(&format!("- kelly fraction: {:.2}\n", result.kelly_fraction));
    md.push_str(&format!(
        "- rotations: {} (avg cycle {:.1}h)\n\n",
        result.total_rotations, result.avg_cycle_hours
    ));

    md.push_str(&format!("## Positions ({})\n\n", result.positions.len()));
    md.push_str("| pair | condition | yes bid | no bid | size | filled y/n | reward acc | hours left |\n");
    md.push_str("|---|---|---:|---:|---:|---|---:|---:|\n");
    for p in &result.positions {
        md.push_str(&format!(
            "| `{}` | `{}` | {:.3} | {:.3} | {:.0} | {:.0}/{:.0} | {:.3} | {:.0} |\n",
            &p.pair_id[..8.min(p.pair_id.len())],
            &p.condition_id[..12.min(p.condition_id.len())],
            p.yes.bid_price,
            p.no.bid_price,
            p.yes.size,
            p.yes.filled_size,
            p.no.filled_size,
            p.reward_accrued,
            p.hours_to_end
        ));
    }

    if !result.partial_alerts.is_empty() {
        md.push_str("\n## Partial-fill alerts\n\n");
        for a in &result.partial_alerts {
            md.push_str(&format!("- {a}\n"));
        }
    }
    if !result.warnings.is_empty() {
        md.push_str("\n## Warnings\n\n");
        for w in &result.warnings {
            md.push_str(&format!("- {w}\n"));
        }
    }

    let merges = store.fetch_recent_merges(20).unwrap_or_default();
    md.push_str("\n## Recent merges (20)\n\n| ts | condition | profit |\n|---:|---|---:|\n");
    for m in merges {
        let ts = m.get("ts").and_then(|x| x.as_f64()).unwrap_or(0.0) as u64;
        let cid = m.get("condition_id").and_then(|x| x.as_str()).unwrap_or("--");
        let profit = m.get("profit").and_then(|x| x.as_f64()).unwrap_or(0.0);
        md.push_str(&format!("| {} | `{}` | ${:.4} |\n", ts, cid, profit));
    }

    std::fs::create_dir_all("ops/telemetry").ok();
    std::fs::write("ops/telemetry/latest.md", md)?;
    Ok(())
}
