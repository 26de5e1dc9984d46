/// Fjall-based durable ledger of job lifecycle state
///
/// Every job accepted by the execution queue gets a [`JobRecord`] that moves
/// through four partitions, one per state:
///
/// ```text
/// pending -> inprogress -> completed
///                       \-> failed
/// ```
///
/// Each operation is a single fjall transaction, so a record is never seen in
/// two partitions or in none. On startup the queue re-admits everything still
/// in `pending`; the maintenance worker trims old `completed`/`failed`
/// records.
///
/// ## Usage
///
/// ```rust,ignore
/// use taskrelay::ledger::{JobLedger, JobRecord, JobState};
///
/// let ledger = JobLedger::open("data/jobs.ledger")?;
/// ledger.add(&record)?;
/// ledger.transition(record.id, JobState::InProgress, None)?;
/// ledger.cleanup(7)?;
/// ```

pub mod error;
pub mod partitions;
pub mod pruning;
pub mod record;
pub mod store;

pub use error::{LedgerError, Result};
pub use partitions::JobState;
pub use pruning::{CleanupStats, DEFAULT_RETENTION_DAYS};
pub use record::JobRecord;
pub use store::{JobLedger, LedgerStats};
