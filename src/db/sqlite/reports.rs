//! Report ledger operations
//!
//! Conditional writes (`create`, `claim`, `force_fail`) are the only
//! concurrency guard for a job; every other write is an unconditional set.

use crate::db::sqlite::connection::begin_write;
use crate::db::sqlite::models::{JobRecord, Portfolio, ReportStatus, StatusLogEntry};
use crate::db::timestamp_now;
use crate::error::{AppError, Result};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};

const RECORD_COLUMNS: &str =
    "report_id, batch_no, status, s3_key, payload, error_msg, created_at, updated_at";

fn record_from_row(row: &Row<'_>) -> rusqlite::Result<JobRecord> {
    let payload_json: String = row.get(4)?;
    let payload: Portfolio = serde_json::from_str(&payload_json)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(4, Type::Text, Box::new(e)))?;

    Ok(JobRecord {
        report_id: row.get(0)?,
        batch_no: row.get(1)?,
        status: row.get(2)?,
        s3_key: row.get(3)?,
        payload,
        error_msg: row.get(5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

fn append_status_log(
    conn: &Connection,
    report_id: i64,
    batch_no: i64,
    status: ReportStatus,
    error_msg: Option<&str>,
    at: &str,
) -> Result<()> {
    conn.execute(
        "INSERT INTO report_status_log (report_id, batch_no, status, error_msg, at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![report_id, batch_no, status, error_msg, at],
    )?;
    Ok(())
}

/// Insert a report iff no row exists for (report_id, batch_no).
///
/// Returns `(record, false)` with the stored row when a duplicate is detected;
/// nothing is written in that case.
pub fn create_report(
    conn: &Connection,
    report_id: i64,
    batch_no: i64,
    payload: &Portfolio,
) -> Result<(JobRecord, bool)> {
    let now = timestamp_now();
    let payload_json = serde_json::to_string(payload)?;

    let tx = begin_write(conn)?;
    let inserted = tx.execute(
        "INSERT INTO reports (report_id, batch_no, status, s3_key, payload, error_msg, created_at, updated_at)
         VALUES (?1, ?2, ?3, NULL, ?4, NULL, ?5, ?5)
         ON CONFLICT (report_id, batch_no) DO NOTHING",
        params![report_id, batch_no, ReportStatus::Created, payload_json, now],
    )?;

    if inserted == 1 {
        append_status_log(&tx, report_id, batch_no, ReportStatus::Created, None, &now)?;
    }
    tx.commit()?;

    let record = get_report(conn, report_id, batch_no)?.ok_or_else(|| {
        AppError::Internal(format!("Report {}/{} vanished after insert", batch_no, report_id))
    })?;

    Ok((record, inserted == 1))
}

/// Atomically move a report from QUEUED to IN_PROGRESS.
///
/// Returns false when the row is in any other status (or missing).
pub fn claim_report(conn: &Connection, report_id: i64, batch_no: i64) -> Result<bool> {
    let now = timestamp_now();

    let tx = begin_write(conn)?;
    let updated = tx.execute(
        "UPDATE reports SET status = ?3, updated_at = MAX(updated_at, ?4)
         WHERE report_id = ?1 AND batch_no = ?2 AND status = ?5",
        params![
            report_id,
            batch_no,
            ReportStatus::InProgress,
            now,
            ReportStatus::Queued
        ],
    )?;

    if updated == 1 {
        append_status_log(&tx, report_id, batch_no, ReportStatus::InProgress, None, &now)?;
    }
    tx.commit()?;

    Ok(updated == 1)
}

/// Unconditionally set status (and optionally s3_key / error_msg).
pub fn update_report_status(
    conn: &Connection,
    report_id: i64,
    batch_no: i64,
    status: ReportStatus,
    s3_key: Option<&str>,
    error_msg: Option<&str>,
) -> Result<JobRecord> {
    let now = timestamp_now();

    let tx = begin_write(conn)?;
    let current: Option<ReportStatus> = tx
        .query_row(
            "SELECT status FROM reports WHERE report_id = ?1 AND batch_no = ?2",
            params![report_id, batch_no],
            |row| row.get(0),
        )
        .optional()?;

    let current = current.ok_or_else(|| {
        AppError::NotFound(format!("Report {} in batch {}", report_id, batch_no))
    })?;

    if current != status && !current.can_transition_to(status) {
        tracing::warn!(
            "Non-monotonic status write for report {} batch {}: {} -> {}",
            report_id,
            batch_no,
            current,
            status
        );
    }

    tx.execute(
        "UPDATE reports
         SET status = ?3,
             s3_key = COALESCE(?4, s3_key),
             error_msg = COALESCE(?5, error_msg),
             updated_at = MAX(updated_at, ?6)
         WHERE report_id = ?1 AND batch_no = ?2",
        params![report_id, batch_no, status, s3_key, error_msg, now],
    )?;

    if current != status {
        append_status_log(&tx, report_id, batch_no, status, error_msg, &now)?;
    }
    tx.commit()?;

    get_report(conn, report_id, batch_no)?
        .ok_or_else(|| AppError::NotFound(format!("Report {} in batch {}", report_id, batch_no)))
}

/// Dead-letter override: set FAILED unless the report already FINISHED.
///
/// Returns `None` when the row is FINISHED and was left untouched.
pub fn force_fail_report(
    conn: &Connection,
    report_id: i64,
    batch_no: i64,
    error_msg: &str,
) -> Result<Option<JobRecord>> {
    let now = timestamp_now();

    let tx = begin_write(conn)?;
    let exists: bool = tx.query_row(
        "SELECT EXISTS(SELECT 1 FROM reports WHERE report_id = ?1 AND batch_no = ?2)",
        params![report_id, batch_no],
        |row| row.get(0),
    )?;
    if !exists {
        return Err(AppError::NotFound(format!(
            "Report {} in batch {}",
            report_id, batch_no
        )));
    }

    let updated = tx.execute(
        "UPDATE reports SET status = ?3, error_msg = ?4, updated_at = MAX(updated_at, ?5)
         WHERE report_id = ?1 AND batch_no = ?2 AND status <> ?6",
        params![
            report_id,
            batch_no,
            ReportStatus::Failed,
            error_msg,
            now,
            ReportStatus::Finished
        ],
    )?;

    if updated == 1 {
        append_status_log(&tx, report_id, batch_no, ReportStatus::Failed, Some(error_msg), &now)?;
    }
    tx.commit()?;

    if updated == 0 {
        return Ok(None);
    }
    get_report(conn, report_id, batch_no)
}

pub fn get_report(conn: &Connection, report_id: i64, batch_no: i64) -> Result<Option<JobRecord>> {
    let record = conn
        .query_row(
            &format!(
                "SELECT {} FROM reports WHERE report_id = ?1 AND batch_no = ?2",
                RECORD_COLUMNS
            ),
            params![report_id, batch_no],
            record_from_row,
        )
        .optional()?;

    Ok(record)
}

pub fn list_reports_by_batch(conn: &Connection, batch_no: i64) -> Result<Vec<JobRecord>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM reports WHERE batch_no = ?1 ORDER BY report_id",
        RECORD_COLUMNS
    ))?;

    let records = stmt
        .query_map(params![batch_no], record_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(records)
}

/// Rows sitting in `status` whose last update is older than `updated_before`.
pub fn list_stale_reports(
    conn: &Connection,
    status: ReportStatus,
    updated_before: &str,
) -> Result<Vec<JobRecord>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM reports WHERE status = ?1 AND updated_at < ?2
         ORDER BY updated_at, batch_no, report_id",
        RECORD_COLUMNS
    ))?;

    let records = stmt
        .query_map(params![status, updated_before], record_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(records)
}

pub fn get_status_history(
    conn: &Connection,
    report_id: i64,
    batch_no: i64,
) -> Result<Vec<StatusLogEntry>> {
    let mut stmt = conn.prepare(
        "SELECT id, report_id, batch_no, status, error_msg, at
         FROM report_status_log
         WHERE report_id = ?1 AND batch_no = ?2
         ORDER BY id",
    )?;

    let entries = stmt
        .query_map(params![report_id, batch_no], |row| {
            Ok(StatusLogEntry {
                id: row.get(0)?,
                report_id: row.get(1)?,
                batch_no: row.get(2)?,
                status: row.get(3)?,
                error_msg: row.get(4)?,
                at: row.get(5)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(entries)
}

pub fn delete_report(conn: &Connection, report_id: i64, batch_no: i64) -> Result<bool> {
    let tx = begin_write(conn)?;
    let deleted = tx.execute(
        "DELETE FROM reports WHERE report_id = ?1 AND batch_no = ?2",
        params![report_id, batch_no],
    )?;
    tx.execute(
        "DELETE FROM report_status_log WHERE report_id = ?1 AND batch_no = ?2",
        params![report_id, batch_no],
    )?;
    tx.commit()?;

    Ok(deleted > 0)
}
