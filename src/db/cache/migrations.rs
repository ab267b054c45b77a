//! Market cache migrations

use crate::error::Result;
use rusqlite::Connection;

/// Run all market cache migrations
pub fn run_migrations(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS migrations (
            name TEXT PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
        [],
    )?;

    run_migration(conn, "001_ticker_cache", CREATE_TICKER_CACHE)?;
    run_migration(conn, "002_ticker_bars", CREATE_TICKER_BARS)?;

    tracing::info!("Market cache migrations completed");
    Ok(())
}

fn run_migration(conn: &Connection, name: &str, sql: &str) -> Result<()> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM migrations WHERE name = ?)",
        [name],
        |row| row.get(0),
    )?;

    if !exists {
        tracing::info!("Running market cache migration: {}", name);
        conn.execute_batch(sql)?;
        conn.execute("INSERT OR IGNORE INTO migrations (name) VALUES (?)", [name])?;
    }

    Ok(())
}

const CREATE_TICKER_CACHE: &str = r#"
CREATE TABLE IF NOT EXISTS ticker_cache (
    ticker TEXT PRIMARY KEY,
    period TEXT NOT NULL,
    record_count INTEGER NOT NULL DEFAULT 0,
    updated_at TEXT NOT NULL,
    is_valid INTEGER NOT NULL DEFAULT 1
);
"#;

const CREATE_TICKER_BARS: &str = r#"
CREATE TABLE IF NOT EXISTS ticker_bars (
    ticker TEXT NOT NULL,
    date TEXT NOT NULL,
    open REAL NOT NULL,
    high REAL NOT NULL,
    low REAL NOT NULL,
    close REAL NOT NULL,
    volume INTEGER NOT NULL,
    PRIMARY KEY (ticker, date)
) WITHOUT ROWID;
"#;
