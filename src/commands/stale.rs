//! Stale command: list jobs stuck in a status

use crate::db::sqlite::models::{JobRecord, ReportStatus};
use crate::error::Result;
use crate::state::AppState;
use chrono::{SecondsFormat, Utc};
use tracing::{info, warn};

/// Jobs in `status` whose last update is older than `older_than_mins`.
///
/// Read-only; nothing is reclaimed.
pub fn run(state: &AppState, status: ReportStatus, older_than_mins: i64) -> Result<Vec<JobRecord>> {
    let cutoff = (Utc::now() - chrono::Duration::minutes(older_than_mins))
        .to_rfc3339_opts(SecondsFormat::Micros, true);

    let records = state.ledger.list_stale(status, &cutoff)?;
    for record in &records {
        warn!(
            "[batch={} report={}] {} since {}",
            record.batch_no, record.report_id, record.status, record.updated_at
        );
    }
    info!(
        "{} report(s) in {} for more than {} minute(s)",
        records.len(),
        status,
        older_than_mins
    );

    Ok(records)
}
