/// Retention cleanup for terminal job records
use chrono::{DateTime, Duration, Utc};
use fjall::{TxKeyspace, TxPartitionHandle};
use tracing::{debug, info, warn};

use super::error::Result;
use super::partitions::{COMPLETED, FAILED};
use super::record::JobRecord;

/// Default number of days completed/failed records are kept
pub const DEFAULT_RETENTION_DAYS: u32 = 7;

/// Cleanup statistics
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CleanupStats {
    pub completed_removed: usize,
    pub failed_removed: usize,
}

impl CleanupStats {
    pub fn total(&self) -> usize {
        self.completed_removed + self.failed_removed
    }
}

/// Oldest `updated_at` that survives a cleanup run at `now`
pub fn retention_cutoff(retention_days: u32, now: DateTime<Utc>) -> DateTime<Utc> {
    now - Duration::days(i64::from(retention_days))
}

/// Delete terminal records whose `updated_at` is older than `cutoff`.
///
/// Both partitions are swept inside one write transaction, so a failed run
/// deletes nothing.
pub fn remove_expired(
    keyspace: &TxKeyspace,
    completed: &TxPartitionHandle,
    failed: &TxPartitionHandle,
    cutoff: DateTime<Utc>,
) -> Result<CleanupStats> {
    let mut tx = keyspace.write_tx();

    let expired_completed = collect_expired(&tx, completed, COMPLETED, cutoff)?;
    let expired_failed = collect_expired(&tx, failed, FAILED, cutoff)?;

    for key in &expired_completed {
        tx.remove(completed, key.as_slice());
    }
    for key in &expired_failed {
        tx.remove(failed, key.as_slice());
    }
    tx.commit()?;

    let stats = CleanupStats {
        completed_removed: expired_completed.len(),
        failed_removed: expired_failed.len(),
    };

    keyspace.persist(fjall::PersistMode::SyncAll)?;
    info!(
        completed = stats.completed_removed,
        failed = stats.failed_removed,
        cutoff = %cutoff,
        "Removed expired job records"
    );

    Ok(stats)
}

fn collect_expired(
    tx: &fjall::WriteTransaction,
    partition: &TxPartitionHandle,
    partition_name: &str,
    cutoff: DateTime<Utc>,
) -> Result<Vec<Vec<u8>>> {
    let mut expired = Vec::new();

    for item in tx.iter(partition) {
        let (key, value) = item?;
        let record: JobRecord = match serde_json::from_slice(&value) {
            Ok(record) => record,
            Err(e) => {
                // Unreadable entries are left for manual inspection
                warn!(partition = partition_name, error = %e, "Skipping undecodable job record");
                continue;
            }
        };

        if record.updated_at < cutoff {
            debug!(partition = partition_name, job_id = %record.id, "Record expired");
            expired.push(key.to_vec());
        }
    }

    Ok(expired)
}
