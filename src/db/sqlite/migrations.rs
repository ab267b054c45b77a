//! SQLite database migrations

use crate::error::Result;
use rusqlite::Connection;

/// Run all database migrations
pub fn run_migrations(conn: &Connection) -> Result<()> {
    // Create migrations table
    conn.execute(
        "CREATE TABLE IF NOT EXISTS migrations (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
        [],
    )?;

    run_migration(conn, "001_reports", CREATE_REPORTS_TABLE)?;
    run_migration(conn, "002_report_status_log", CREATE_REPORT_STATUS_LOG_TABLE)?;
    run_migration(conn, "003_queue_messages", CREATE_QUEUE_MESSAGES_TABLE)?;

    tracing::info!("Database migrations completed");
    Ok(())
}

fn run_migration(conn: &Connection, name: &str, sql: &str) -> Result<()> {
    // Check if migration already applied
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM migrations WHERE name = ?)",
        [name],
        |row| row.get(0),
    )?;

    if !exists {
        tracing::info!("Running migration: {}", name);
        conn.execute_batch(sql)?;
        conn.execute("INSERT OR IGNORE INTO migrations (name) VALUES (?)", [name])?;
    }

    Ok(())
}

const CREATE_REPORTS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS reports (
    report_id INTEGER NOT NULL,
    batch_no INTEGER NOT NULL,
    status TEXT NOT NULL,
    s3_key TEXT,
    payload TEXT NOT NULL,
    error_msg TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    PRIMARY KEY (report_id, batch_no)
);
CREATE INDEX IF NOT EXISTS idx_reports_batch_no ON reports(batch_no);
CREATE INDEX IF NOT EXISTS idx_reports_status ON reports(status, updated_at);
"#;

const CREATE_REPORT_STATUS_LOG_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS report_status_log (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    report_id INTEGER NOT NULL,
    batch_no INTEGER NOT NULL,
    status TEXT NOT NULL,
    error_msg TEXT,
    at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_report_status_log_key ON report_status_log(report_id, batch_no);
"#;

const CREATE_QUEUE_MESSAGES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS queue_messages (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    queue TEXT NOT NULL,
    message_id TEXT NOT NULL UNIQUE,
    body TEXT NOT NULL,
    receive_count INTEGER NOT NULL DEFAULT 0,
    visible_after INTEGER NOT NULL DEFAULT 0,
    receipt_handle TEXT,
    sent_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_queue_messages_visible ON queue_messages(queue, visible_after);
CREATE UNIQUE INDEX IF NOT EXISTS idx_queue_messages_receipt ON queue_messages(receipt_handle);
"#;
