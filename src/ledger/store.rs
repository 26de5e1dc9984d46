use std::path::Path;

use chrono::{DateTime, Utc};
use fjall::{Config, PartitionCreateOptions, TxKeyspace, TxPartitionHandle};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::error::{LedgerError, Result};
use super::partitions::{COMPLETED, FAILED, IN_PROGRESS, JobState, PENDING, encode_job_key};
use super::pruning::{CleanupStats, remove_expired, retention_cutoff};
use super::record::JobRecord;

/// Fjall-backed durable ledger of job lifecycle records.
///
/// Every operation runs inside a single fjall transaction, so a record is
/// always visible in exactly one partition.
#[derive(Clone)]
pub struct JobLedger {
    keyspace: TxKeyspace,
    pending: TxPartitionHandle,
    in_progress: TxPartitionHandle,
    completed: TxPartitionHandle,
    failed: TxPartitionHandle,
}

impl JobLedger {
    /// Open or create a ledger at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!("Opening job ledger at: {}", path.display());

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let keyspace = Config::new(path).open_transactional()?;

        let pending = keyspace.open_partition(PENDING, PartitionCreateOptions::default())?;
        let in_progress = keyspace.open_partition(IN_PROGRESS, PartitionCreateOptions::default())?;
        let completed = keyspace.open_partition(COMPLETED, PartitionCreateOptions::default())?;
        let failed = keyspace.open_partition(FAILED, PartitionCreateOptions::default())?;

        info!("Job ledger opened successfully");
        Ok(Self {
            keyspace,
            pending,
            in_progress,
            completed,
            failed,
        })
    }

    fn partition(&self, state: JobState) -> &TxPartitionHandle {
        match state {
            JobState::Pending => &self.pending,
            JobState::InProgress => &self.in_progress,
            JobState::Completed => &self.completed,
            JobState::Failed => &self.failed,
        }
    }

    /// Insert a new record into the pending partition
    pub fn add(&self, record: &JobRecord) -> Result<()> {
        let value = serde_json::to_vec(record)?;

        let mut tx = self.keyspace.write_tx();
        tx.insert(&self.pending, encode_job_key(&record.id), value);
        tx.commit()?;

        debug!(job_id = %record.id, job = %record.name, "Job recorded as pending");
        Ok(())
    }

    /// All pending records, oldest first
    pub fn pending_jobs(&self) -> Result<Vec<JobRecord>> {
        self.jobs_in(JobState::Pending)
    }

    /// Records that were marked in progress but never finished
    pub fn in_progress_jobs(&self) -> Result<Vec<JobRecord>> {
        self.jobs_in(JobState::InProgress)
    }

    /// All records in one partition, in key order
    pub fn jobs_in(&self, state: JobState) -> Result<Vec<JobRecord>> {
        let tx = self.keyspace.read_tx();
        let mut records = Vec::new();

        for item in tx.iter(self.partition(state)) {
            let (_, value) = item?;
            match serde_json::from_slice::<JobRecord>(&value) {
                Ok(record) => records.push(record),
                Err(e) => {
                    warn!(partition = state.partition(), error = %e, "Skipping undecodable job record")
                }
            }
        }

        Ok(records)
    }

    /// Move a record into `new_state` from its required source partition.
    ///
    /// Fails without touching any partition when the target is not reachable
    /// (`pending`) or the record is absent from the source partition.
    pub fn transition(&self, id: Uuid, new_state: JobState, error: Option<&str>) -> Result<JobRecord> {
        let source = new_state
            .required_source()
            .ok_or(LedgerError::InvalidTransition(new_state))?;
        let key = encode_job_key(&id);

        let mut tx = self.keyspace.write_tx();

        let value = tx
            .get(self.partition(source), key.as_slice())?
            .ok_or_else(|| LedgerError::NotInPartition {
                id: id.to_string(),
                partition: source.partition(),
            })?;

        let mut record: JobRecord = serde_json::from_slice(&value)?;
        record.state = new_state;
        record.updated_at = Utc::now();
        if let Some(message) = error.filter(|m| !m.is_empty()) {
            record.error = Some(message.to_string());
        }

        let updated = serde_json::to_vec(&record)?;
        tx.insert(self.partition(new_state), key.as_slice(), updated);
        tx.remove(self.partition(source), key.as_slice());
        tx.commit()?;

        debug!(job_id = %id, from = %source, to = %new_state, "Job state transitioned");
        Ok(record)
    }

    /// Look a record up in whichever partition currently holds it
    pub fn find(&self, id: Uuid) -> Result<Option<JobRecord>> {
        let key = encode_job_key(&id);
        let tx = self.keyspace.read_tx();

        for state in JobState::ALL {
            if let Some(value) = tx.get(self.partition(state), key.as_slice())? {
                return Ok(Some(serde_json::from_slice(&value)?));
            }
        }

        Ok(None)
    }

    /// Remove completed/failed records older than `retention_days`
    pub fn cleanup(&self, retention_days: u32) -> Result<CleanupStats> {
        self.cleanup_at(retention_days, Utc::now())
    }

    /// Same as [`cleanup`](Self::cleanup), evaluated as if the current time were `now`
    pub fn cleanup_at(&self, retention_days: u32, now: DateTime<Utc>) -> Result<CleanupStats> {
        let cutoff = retention_cutoff(retention_days, now);
        info!(retention_days, "Starting job ledger cleanup");
        remove_expired(&self.keyspace, &self.completed, &self.failed, cutoff)
    }

    /// Persist all pending writes to disk
    pub fn persist(&self) -> Result<()> {
        self.keyspace.persist(fjall::PersistMode::SyncAll)?;
        Ok(())
    }

    /// Record counts per partition (for health/monitoring)
    pub fn stats(&self) -> Result<LedgerStats> {
        let tx = self.keyspace.read_tx();
        let count = |state: JobState| -> Result<usize> {
            let mut n = 0;
            for item in tx.iter(self.partition(state)) {
                item?;
                n += 1;
            }
            Ok(n)
        };

        Ok(LedgerStats {
            pending: count(JobState::Pending)?,
            in_progress: count(JobState::InProgress)?,
            completed: count(JobState::Completed)?,
            failed: count(JobState::Failed)?,
        })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct LedgerStats {
    pub pending: usize,
    pub in_progress: usize,
    pub completed: usize,
    pub failed: usize,
}
