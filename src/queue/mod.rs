//! Single-worker job execution queue
//!
//! Jobs are recorded as pending in the [`JobLedger`](crate::ledger::JobLedger),
//! pushed into a bounded channel and executed one at a time, in submission
//! order, by a single worker task. Every lifecycle step is published to the
//! [`StatusBroadcaster`](crate::broadcast::StatusBroadcaster).
//!
//! ```text
//! submit ──> ledger: pending ──> channel (capacity C) ──> worker
//!                                                          │
//!                     ledger: inprogress ── execute ── ledger: completed | failed
//! ```

pub mod broker;
pub mod error;
pub mod executor;
pub mod job;
mod worker;

pub use broker::{DEFAULT_QUEUE_CAPACITY, JobQueue, RecoveryReport};
pub use error::{QueueError, Result};
pub use executor::{ExecError, JobExecutor};
pub use job::{
    Annotation, Credentials, Job, NewTask, TaskEdit, TaskModification, TaskOperation, TaskRef,
    TaskRefs,
};
