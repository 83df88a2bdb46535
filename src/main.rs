// src/main.rs
// =============================================================================
// This is the entry point of the crawler.
//
// What happens here:
// 1. Parse command-line arguments using clap
// 2. Set up logging
// 3. Build the pieces: Tor transport -> crawl engine, and the store
// 4. Hand them to the scheduler and run until Ctrl-C (or one cycle)
// 5. Exit with a proper code (0 = clean stop, 2 = error)
// =============================================================================

mod cli;
mod config;
mod crawl;
mod error;
mod logging;
mod scheduler;
mod store;
mod transport;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use cli::Cli;
use config::Config;
use crawl::{CrawlEngine, Watermark};
use scheduler::Scheduler;
use store::NormalizingStore;
use tracing::info;
use transport::TorTransport;

#[tokio::main]
async fn main() {
    let exit_code = match run().await {
        Ok(()) => 0,
        Err(e) => {
            // Plain stderr: logging may not be up yet
            eprintln!("Error: {:#}", e);
            2
        }
    };

    std::process::exit(exit_code);
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose, cli.quiet, cli.log_path.as_deref())?;

    let config = cli.into_config();
    let mut scheduler = build_scheduler(&config)?;

    info!(
        db = %scheduler.store().location().display(),
        every_hours = config.schedule.interval.as_secs_f64() / 3600.0,
        once = config.schedule.run_once,
        "paste-sentinel started"
    );

    let outcome = scheduler.run().await;
    info!(last_crawl = %scheduler.engine().watermark().last_crawl(), "stopped");
    scheduler.finish().context("closing the database")?;
    outcome.context("crawl cycle failed")
}

fn build_scheduler(config: &Config) -> Result<Scheduler<TorTransport>> {
    // "now" is read here, when the crawler starts, never earlier
    let watermark = match config.crawl.since {
        Some(seconds) => {
            Watermark::from_epoch(seconds).ok_or_else(|| anyhow!("--since {} is out of range", seconds))?
        }
        None => Watermark::now(),
    };

    let transport = TorTransport::new(config.transport.clone());
    let engine = CrawlEngine::new(transport, &config.crawl, watermark)?;
    let store = NormalizingStore::new(&config.store)
        .with_context(|| format!("opening {}", config.store.db_path.display()))?;

    Ok(Scheduler::new(engine, store, config.schedule.clone()))
}
