mod config;
mod models;
mod pipeline;
mod scraper;
mod server;
mod storage;
mod utils;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::AppConfig;
use crate::models::Kind;
use crate::pipeline::Pipeline;
use crate::scraper::chromium::ChromiumLauncher;
use crate::storage::{Policies, Store};

#[derive(Parser)]
#[command(name = "brawl-etl", about = "Brawler dashboard scraper and store", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP API (scrape triggers and data reads)
    Serve,

    /// Run one scrape cycle and exit
    Scrape {
        #[arg(value_enum, default_value = "rankings")]
        kind: Kind,
    },

    /// Create missing tables without scraping
    Migrate,

    /// Show row counts
    Stats,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "brawl_etl=info,warn",
        1 => "brawl_etl=debug,info",
        _ => "trace",
    };

    tracing_subscriber::registry()
        .with(fmt::layer().compact().with_target(false))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .init();

    let config = AppConfig::load()?;
    let policies = Policies::from(&config);

    match cli.command {
        Command::Serve => {
            let store = Arc::new(Store::open(&config.storage.db_path)?);
            if config.storage.run_migrations {
                if let Err(e) = store.ensure_schema(policies) {
                    error!("Error ensuring tables exist: {:#}", e);
                }
            }

            let launcher = Arc::new(ChromiumLauncher::new(&config.scraper));
            let (host, port) = (config.server.host.clone(), config.server.port);
            let pipeline = actix_web::web::Data::new(Pipeline::new(config, store.clone(), launcher));

            let served = server::serve(pipeline, &host, port).await;
            info!("Server stopped, closing store");
            store.close()?;
            served?;
        }

        Command::Scrape { kind } => {
            let store = Arc::new(Store::open(&config.storage.db_path)?);
            if config.storage.run_migrations {
                store.ensure_schema(policies)?;
            }
            let launcher = Arc::new(ChromiumLauncher::new(&config.scraper));
            let pipeline = Pipeline::new(config, store.clone(), launcher);

            let result = pipeline.scrape(kind).await;
            store.close()?;
            let outcome = result?;

            println!(
                "{}: {} records from {} pages{} in {:.1?}",
                outcome.kind,
                outcome.data.len(),
                outcome.pages_visited,
                if outcome.complete { "" } else { " (stopped early)" },
                outcome.elapsed
            );
        }

        Command::Migrate => {
            let mut timer = utils::RunTimer::start("Migrations");
            let store = Store::open(&config.storage.db_path)?;
            store.ensure_schema(policies)?;
            store.close()?;
            timer.done();
            println!("Tables ensured.");
        }

        Command::Stats => {
            let store = Store::open(&config.storage.db_path)?;
            let conn = store.checkout()?;
            let (ranks, classes) = storage::row_counts(&conn).context("Reading stats")?;
            println!("─────────────────────────────────");
            println!("  Brawl ETL — Database Stats");
            println!("─────────────────────────────────");
            println!("  Rankings   : {} ({:?})", utils::group_thousands(ranks), policies.rankings);
            println!("  Categories : {} ({:?})", utils::group_thousands(classes), policies.categories);
            println!("  Database   : {}", config.storage.db_path.display());
            println!("─────────────────────────────────");
            drop(conn);
            store.close()?;
        }
    }

    Ok(())
}
