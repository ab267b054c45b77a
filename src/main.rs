use clap::{Parser, Subcommand};
use portfolio_reports::commands;
use portfolio_reports::config::Config;
use portfolio_reports::db::sqlite::models::ReportStatus;
use portfolio_reports::state::AppState;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "portfolio-reports", version, about = "Batch portfolio dashboard pipeline")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Queue a batch of random portfolios
    Produce {
        /// Number of portfolios in the batch
        #[arg(long, default_value_t = 10)]
        count: usize,
        /// Holdings per portfolio, benchmark excluded
        #[arg(long, default_value_t = 5)]
        tickers: usize,
    },
    /// Consume the job queue
    Work {
        /// Handle a single receive and exit
        #[arg(long)]
        once: bool,
    },
    /// Finalise dead-lettered jobs as FAILED
    Reconcile {
        /// Handle a single receive and exit
        #[arg(long)]
        once: bool,
    },
    /// Re-fetch market data into the cache
    Refresh {
        /// Tickers to refresh, the default universe when empty
        tickers: Vec<String>,
    },
    /// Run the status API and the daily refresh scheduler
    Serve,
    /// List jobs stuck in a status
    Stale {
        #[arg(long, default_value_t = 30)]
        older_than_mins: i64,
        #[arg(long, default_value = "IN_PROGRESS")]
        status: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    portfolio_reports::init_tracing();

    let cli = Cli::parse();
    let config = Config::from_env()?;
    let state = Arc::new(AppState::new(config)?);

    tracing::info!("Starting portfolio-reports...");

    match cli.command {
        Command::Produce { count, tickers } => {
            let submission = commands::produce::run(&state, count, tickers).await?;
            println!("{}", serde_json::to_string_pretty(&submission)?);
        }
        Command::Work { once } => commands::work::run(&state, once).await?,
        Command::Reconcile { once } => commands::reconcile::run(&state, once).await?,
        Command::Refresh { tickers } => {
            let summary = commands::refresh::run(&state, &tickers).await;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        Command::Serve => commands::serve::run(state).await?,
        Command::Stale {
            older_than_mins,
            status,
        } => {
            let status: ReportStatus = status.to_uppercase().parse()?;
            let records = commands::stale::run(&state, status, older_than_mins)?;
            println!("{}", serde_json::to_string_pretty(&records)?);
        }
    }

    Ok(())
}
