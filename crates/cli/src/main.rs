use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use tracing::info;

use autopilot_brokerage::paper::PaperBrokerage;
use autopilot_brokerage::retry::{RetryPolicy, RetryingBrokerage};
use autopilot_core::config_loader::ConfigLoader;
use autopilot_core::traits::{Brokerage, Store};
use autopilot_engine::controller::MasterController;
use autopilot_engine::notify::LogNotificationSink;
use autopilot_store::memory::MemoryStore;
use autopilot_store::postgres::PgStore;

#[derive(Parser)]
#[command(name = "autopilot")]
#[command(about = "Unattended options trading automation engine", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the cycle scheduler as a daemon
    Run {
        /// Config file path
        #[arg(short, long, default_value = "config/Config.toml")]
        config: String,
        /// Use the in-memory store instead of Postgres (paper mode)
        #[arg(long)]
        paper: bool,
    },
    /// Run one cycle immediately for a user and print the report
    Cycle {
        /// Config file path
        #[arg(short, long, default_value = "config/Config.toml")]
        config: String,
        /// User to run the cycle for
        #[arg(short, long)]
        user: i64,
        /// Use the in-memory store instead of Postgres (paper mode)
        #[arg(long)]
        paper: bool,
    },
    /// Print the last scan diagnostic for an automation
    Diagnostics {
        /// Config file path
        #[arg(short, long, default_value = "config/Config.toml")]
        config: String,
        /// Automation id
        #[arg(short, long)]
        automation: i64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Run { config, paper } => {
            let config = ConfigLoader::load_from(&config)?;
            let (brokerage, store) = build_backends(&config, paper).await?;
            let controller = MasterController::new(
                brokerage,
                store,
                Arc::new(LogNotificationSink),
                config.engine.clone(),
            );
            info!("starting scheduler");
            controller.run().await?;
        }
        Commands::Cycle { config, user, paper } => {
            let config = ConfigLoader::load_from(&config)?;
            let (brokerage, store) = build_backends(&config, paper).await?;
            let controller = MasterController::new(
                brokerage,
                store,
                Arc::new(LogNotificationSink),
                config.engine.clone(),
            );
            let report = controller.run_cycle_now(user).await?;
            println!(
                "cycle complete: session={:?} exits={} entries={} scanned={} skipped={} pending_resolved={}",
                report.session,
                report.exits_triggered,
                report.entries_placed,
                report.automations_scanned,
                report.automations_skipped,
                report.pending_resolved,
            );
        }
        Commands::Diagnostics { config, automation } => {
            let config = ConfigLoader::load_from(&config)?;
            let store = PgStore::connect(&config.database).await?;
            match store.diagnostic(automation).await? {
                Some(diag) => println!("{}", serde_json::to_string_pretty(&diag)?),
                None => println!("no diagnostic recorded for automation {automation}"),
            }
        }
    }

    Ok(())
}

/// Wires the brokerage (paper, behind the retry/timeout policy) and the
/// chosen store.
async fn build_backends(
    config: &autopilot_core::config::AppConfig,
    paper: bool,
) -> Result<(Arc<dyn Brokerage>, Arc<dyn Store>)> {
    let commission = Decimal::try_from(config.broker.paper_commission).unwrap_or_default();
    let inner: Arc<dyn Brokerage> = Arc::new(PaperBrokerage::new(commission));
    let brokerage: Arc<dyn Brokerage> = Arc::new(RetryingBrokerage::new(
        inner,
        RetryPolicy::from_settings(&config.broker),
    ));

    let store: Arc<dyn Store> = if paper {
        Arc::new(MemoryStore::new())
    } else {
        let store = PgStore::connect(&config.database).await?;
        store.init_schema().await?;
        Arc::new(store)
    };

    Ok((brokerage, store))
}
