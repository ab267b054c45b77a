//! Daily market data refresh
//!
//! Re-fetches the ticker universe once a day so morning batches are served
//! from a warm cache.

use crate::config::RefreshSchedule;
use crate::services::producer_service::universe_tickers;
use crate::services::MarketDataService;
use crate::state::AppState;
use chrono::{DateTime, Timelike, Utc};
use chrono_tz::Tz;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::info;

/// Refresh scheduler that runs at the configured wall-clock time
pub struct RefreshScheduler {
    state: Arc<AppState>,
    schedule: RefreshSchedule,
}

impl RefreshScheduler {
    /// Create a new refresh scheduler
    pub fn new(state: Arc<AppState>) -> Self {
        let schedule = state.config.refresh.clone();
        Self { state, schedule }
    }

    /// Duration from `now` until the next `hour:minute` in `now`'s zone
    pub fn duration_until(now: DateTime<Tz>, hour: u32, minute: u32) -> Duration {
        let target_secs = hour * 3600 + minute * 60;
        let now_secs = now.time().num_seconds_from_midnight();

        let duration_secs = if now_secs < target_secs {
            // Target is later today
            target_secs - now_secs
        } else {
            // Target is tomorrow
            24 * 3600 - now_secs + target_secs
        };

        Duration::from_secs(u64::from(duration_secs))
    }

    /// Start the scheduler on the tokio runtime
    pub fn start(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!(
                "Refresh scheduler started, daily at {:02}:{:02} {}",
                self.schedule.hour, self.schedule.minute, self.schedule.timezone
            );

            loop {
                let now = Utc::now().with_timezone(&self.schedule.timezone);
                let duration =
                    Self::duration_until(now, self.schedule.hour, self.schedule.minute);
                info!(
                    "Next market data refresh in {} hours {} minutes",
                    duration.as_secs() / 3600,
                    (duration.as_secs() % 3600) / 60
                );

                tokio::time::sleep(duration).await;

                self.execute_refresh().await;
            }
        })
    }

    /// Execute the refresh
    async fn execute_refresh(&self) {
        info!(
            "Executing market data refresh ({:02}:{:02} {})",
            self.schedule.hour, self.schedule.minute, self.schedule.timezone
        );

        let summary = MarketDataService::refresh_all(&self.state, &universe_tickers()).await;

        info!(
            "Market data refresh completed: {} stored, {} failed",
            summary.success,
            summary.failed.len()
        );
    }
}
