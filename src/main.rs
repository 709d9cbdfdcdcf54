mod book;
mod bot;
mod client;
mod config;
mod dashboard;
mod economics;
mod paper;
mod report;
mod scanner;
mod store;
mod utils;

use anyhow::Result;
use clap::Parser;

use crate::{
    client::VenueClient, config::Settings, paper::PaperEngine, scanner::Scanner, store::SqliteStore,
};

#[derive(Debug, Parser)]
#[command(name = "rewardscout", version)]
struct Cli {
    /// Run a single scan cycle, print the ranked table, and exit
    #[arg(long)]
    once: bool,

    /// Run the paper-trading loop (overrides RUN_MODE)
    #[arg(long)]
    paper: bool,

    /// Validate configuration and exit
    #[arg(long)]
    validate: bool,

    /// Skip scan persistence
    #[arg(long)]
    dry_run: bool,

    /// Debug logging
    #[arg(long)]
    verbose: bool,

    /// Override RUN_MODE (paper|scan)
    #[arg(long)]
    mode: Option<String>,
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(if cli.verbose { "debug" } else { "info" }),
    )
    .init();

    let mut settings = Settings::load()?;
    if let Some(m) = cli.mode {
        settings.run_mode = m.to_lowercase();
    }
    if cli.paper {
        settings.run_mode = "paper".to_string();
    }

    if cli.validate {
        println!("configuration ok (run_mode={})", settings.run_mode);
        return Ok(());
    }

    let store = SqliteStore::new(&settings.sqlite_path)?;
    store.init_db()?;

    log::info!(
        "app.start run_mode={} scan_interval_secs={} sqlite={}",
        settings.run_mode,
        settings.scan_interval_secs,
        store.path()
    );

    let scanner = Scanner::new(VenueClient::new(&settings)?, store.clone(), &settings);

    if cli.once {
        let opps = scanner.run_once(cli.dry_run).await?;
        report::print_opportunities(&opps, 25);
        return Ok(());
    }

    // Read-only dashboard in the background.
    if settings.dashboard_enabled {
        let st = settings.clone();
        let db = store.clone();
        tokio::spawn(async move {
            if let Err(e) = dashboard::serve_dashboard(st, db).await {
                log::error!("dashboard.error {}", e);
            }
        });
    }

    match settings.run_mode.as_str() {
        "scan" => bot::run_scan_loop(scanner, settings.clone(), store, cli.dry_run).await,
        _ => {
            let trades = VenueClient::new(&settings)?;
            let engine = PaperEngine::new(scanner, trades, store.clone(), settings.clone(), cli.dry_run);
            bot::run_paper_loop(engine, settings, store).await
        }
    }
}
