//! Scheduled ledger cleanup
//!
//! Runs [`JobLedger::cleanup`] on a cron schedule (UTC) until cancelled.
//! A failed run is logged and the schedule keeps firing.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use cron::Schedule;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::ledger::{CleanupStats, JobLedger};

/// Daily at midnight UTC
pub const DEFAULT_CLEANUP_CRON: &str = "0 0 * * *";

/// Accept classic 5-field expressions by adding a seconds field
pub fn normalize_cron(expr: &str) -> String {
    let expr = expr.trim();
    if expr.split_whitespace().count() == 5 {
        format!("0 {expr}")
    } else {
        expr.to_string()
    }
}

pub fn parse_schedule(expr: &str) -> Result<Schedule, cron::error::Error> {
    Schedule::from_str(&normalize_cron(expr))
}

pub struct MaintenanceWorker {
    ledger: JobLedger,
    schedule: Schedule,
    cron: String,
    retention_days: u32,
}

impl MaintenanceWorker {
    pub fn new(
        ledger: JobLedger,
        cron_expr: &str,
        retention_days: u32,
    ) -> Result<Self, cron::error::Error> {
        let schedule = parse_schedule(cron_expr)?;
        Ok(Self {
            ledger,
            schedule,
            cron: cron_expr.to_string(),
            retention_days,
        })
    }

    /// Next firing strictly after `now`
    pub fn next_run_after(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.schedule.after(&now).next()
    }

    /// One cleanup pass
    pub async fn run_once(&self) -> crate::ledger::Result<CleanupStats> {
        let ledger = self.ledger.clone();
        let retention_days = self.retention_days;

        let stats = tokio::task::spawn_blocking(move || ledger.cleanup(retention_days))
            .await
            .map_err(|e| std::io::Error::other(e.to_string()))??;

        Ok(stats)
    }

    /// Run until `cancel` fires
    pub async fn run(self, cancel: CancellationToken) {
        info!(
            cron = %self.cron,
            retention_days = self.retention_days,
            "Ledger maintenance worker started"
        );

        loop {
            let now = Utc::now();
            let Some(next) = self.next_run_after(now) else {
                warn!(cron = %self.cron, "Cron schedule has no upcoming runs, stopping");
                break;
            };
            let wait = (next - now).to_std().unwrap_or_default();
            debug!(next_run = %next, "Next ledger cleanup scheduled");

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(wait) => {}
            }

            match self.run_once().await {
                Ok(stats) if stats.total() > 0 => info!(
                    completed_removed = stats.completed_removed,
                    failed_removed = stats.failed_removed,
                    "Ledger cleanup removed expired jobs"
                ),
                Ok(_) => debug!("Ledger cleanup found nothing to remove"),
                Err(e) => error!(error = %e, "Ledger cleanup failed"),
            }
        }

        info!("Ledger maintenance worker stopped");
    }
}
