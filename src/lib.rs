//! Portfolio Reports - batch portfolio dashboard generation
//!
//! A producer queues one job per portfolio; workers claim jobs in a SQLite
//! ledger, resolve price history through a SQLite cache, compute valuation
//! and risk metrics, render a PDF dashboard and upload it. Rejected jobs are
//! dead-lettered and finalised by the reconciler.

pub mod api;
pub mod commands;
pub mod config;
pub mod db;
pub mod error;
pub mod providers;
pub mod queue;
pub mod render;
pub mod scheduler;
pub mod services;
pub mod state;
pub mod storage;

#[cfg(test)]
mod testing;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Install the global tracing subscriber
pub fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "portfolio_reports=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
