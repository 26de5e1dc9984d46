use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::{Notify, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::error::{QueueError, Result};
use super::executor::JobExecutor;
use super::job::Job;
use crate::broadcast::{JobStatus, JobStatusEvent, StatusBroadcaster};
use crate::ledger::{JobLedger, JobState};
use crate::observability::Metrics;
use crate::synclog::SyncLogStore;

pub const DEFAULT_QUEUE_CAPACITY: usize = 100;

/// Error recorded on jobs that were mid-execution when the process died
pub(super) const INTERRUPTED: &str = "interrupted: process stopped while job was in progress";

/// Error recorded on jobs refused because the worker stopped before taking them
pub(super) const REJECTED: &str = "rejected: queue stopped before the job was accepted";

/// A job on its way to the worker
#[derive(Debug)]
pub(super) struct JobEnvelope {
    pub job: Job,
    /// Whether the job has a ledger record to move through states
    pub durable: bool,
}

/// Outcome of re-admitting ledger state at startup
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RecoveryReport {
    /// Pending jobs put back on the queue
    pub requeued: usize,
    /// In-progress jobs marked failed without re-running them
    pub interrupted: usize,
    /// Pending jobs that could not be rebuilt and were marked failed
    pub discarded: usize,
}

/// Bounded FIFO of jobs drained by exactly one worker.
///
/// Architecture:
/// 1. API handlers call `queue.submit(job)`
/// 2. The job is recorded as pending in the ledger (best effort)
/// 3. A `queued` event is published and the job enters the channel,
///    waiting while the channel is full
/// 4. The worker started by `start()` executes jobs one at a time
pub struct JobQueue {
    pub(super) sender: mpsc::Sender<JobEnvelope>,
    pub(super) receiver: Mutex<Option<mpsc::Receiver<JobEnvelope>>>,
    pub(super) ledger: Option<JobLedger>,
    pub(super) broadcaster: Arc<StatusBroadcaster>,
    pub(super) executor: Arc<dyn JobExecutor>,
    pub(super) logs: Arc<SyncLogStore>,
    pub(super) metrics: Arc<Metrics>,
    pub(super) job_timeout: Option<Duration>,
    outstanding: AtomicUsize,
    idle: Notify,
    capacity: usize,
}

#[bon::bon]
impl JobQueue {
    #[builder]
    pub fn new(
        executor: Arc<dyn JobExecutor>,
        broadcaster: Arc<StatusBroadcaster>,
        ledger: Option<JobLedger>,
        #[builder(default = DEFAULT_QUEUE_CAPACITY)] capacity: usize,
        job_timeout: Option<Duration>,
        #[builder(default)] logs: Arc<SyncLogStore>,
        #[builder(default)] metrics: Arc<Metrics>,
    ) -> Self {
        let capacity = capacity.max(1);
        let (sender, receiver) = mpsc::channel(capacity);

        info!(capacity, durable = ledger.is_some(), ?job_timeout, "Creating job queue");

        Self {
            sender,
            receiver: Mutex::new(Some(receiver)),
            ledger,
            broadcaster,
            executor,
            logs,
            metrics,
            job_timeout,
            outstanding: AtomicUsize::new(0),
            idle: Notify::new(),
            capacity,
        }
    }
}

impl JobQueue {
    /// Accept a job for execution.
    ///
    /// Waits while the channel is full. Fails only once the worker has
    /// stopped.
    pub async fn submit(&self, job: Job) -> Result<Uuid> {
        if self.sender.is_closed() {
            return Err(QueueError::Closed);
        }

        let id = job.id;
        let name = job.name();
        let durable = self.record_pending(&job);
        self.metrics.job_submitted();

        match self.enqueue(JobEnvelope { job, durable }).await {
            // A refused job must not come back through recovery
            Err(QueueError::Closed) => {
                if durable {
                    self.fail_pending(id, REJECTED);
                }
                self.broadcaster
                    .publish(JobStatusEvent::new(id, name, JobStatus::Failure));
                Err(QueueError::Closed)
            }
            other => other,
        }
    }

    /// Spawn the single worker. A queue can only be started once.
    pub fn start(self: &Arc<Self>, cancel: CancellationToken) -> Result<JoinHandle<()>> {
        let receiver = self
            .receiver
            .lock()
            .take()
            .ok_or(QueueError::AlreadyStarted)?;

        let queue = Arc::clone(self);
        Ok(tokio::spawn(async move {
            queue.run_worker(receiver, cancel).await;
        }))
    }

    /// Re-admit work left in the ledger by a previous run.
    ///
    /// In-progress records are failed rather than re-run. Pending records are
    /// rebuilt from their payload and queued again in creation order. Call
    /// after [`start`](Self::start) when more than `capacity` jobs may be
    /// pending, otherwise this waits on a full channel.
    pub async fn recover(&self) -> Result<RecoveryReport> {
        let Some(ledger) = &self.ledger else {
            return Ok(RecoveryReport::default());
        };

        let mut report = RecoveryReport::default();

        for record in ledger.in_progress_jobs()? {
            match ledger.transition(record.id, JobState::Failed, Some(INTERRUPTED)) {
                Ok(_) => {
                    warn!(job_id = %record.id, job = %record.name, "Marked interrupted job as failed");
                    report.interrupted += 1;
                }
                Err(e) => warn!(job_id = %record.id, error = %e, "Failed to mark interrupted job"),
            }
        }

        for record in ledger.pending_jobs()? {
            match Job::from_record(&record) {
                Ok(job) => {
                    debug!(job_id = %job.id, job = job.name(), "Re-admitting pending job");
                    self.metrics.job_recovered();
                    self.enqueue(JobEnvelope { job, durable: true }).await?;
                    report.requeued += 1;
                }
                Err(e) => {
                    let reason = e.to_string();
                    warn!(job_id = %record.id, job = %record.name, error = %reason, "Discarding pending job");
                    self.fail_pending(record.id, &reason);
                    report.discarded += 1;
                }
            }
        }

        info!(
            requeued = report.requeued,
            interrupted = report.interrupted,
            discarded = report.discarded,
            "Job recovery finished"
        );
        Ok(report)
    }

    /// Jobs submitted but not yet finished
    pub fn outstanding(&self) -> usize {
        self.outstanding.load(Ordering::SeqCst)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Whether new jobs are still accepted
    pub fn is_accepting(&self) -> bool {
        !self.sender.is_closed()
    }

    pub fn is_durable(&self) -> bool {
        self.ledger.is_some()
    }

    /// Resolve once every submitted job has finished
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.idle.notified();
            if self.outstanding() == 0 {
                return;
            }
            notified.await;
        }
    }

    async fn enqueue(&self, envelope: JobEnvelope) -> Result<Uuid> {
        let id = envelope.job.id;
        let name = envelope.job.name();

        self.outstanding.fetch_add(1, Ordering::SeqCst);
        self.broadcaster
            .publish(JobStatusEvent::new(id, name, JobStatus::Queued));

        if self.sender.send(envelope).await.is_err() {
            warn!(job_id = %id, job = name, "Worker stopped, job not delivered");
            self.finish_one();
            return Err(QueueError::Closed);
        }

        debug!(job_id = %id, job = name, "Job queued");
        Ok(id)
    }

    fn record_pending(&self, job: &Job) -> bool {
        let Some(ledger) = &self.ledger else {
            return false;
        };

        let persisted = job
            .to_record()
            .map_err(|e| e.to_string())
            .and_then(|record| ledger.add(&record).map_err(|e| e.to_string()));

        match persisted {
            Ok(()) => true,
            Err(e) => {
                warn!(job_id = %job.id, job = job.name(), error = %e, "Job will run without a ledger record");
                self.metrics.job_not_persisted();
                false
            }
        }
    }

    /// Move a pending record straight to failed
    fn fail_pending(&self, id: Uuid, reason: &str) {
        let Some(ledger) = &self.ledger else {
            return;
        };

        let failed = ledger
            .transition(id, JobState::InProgress, None)
            .and_then(|_| ledger.transition(id, JobState::Failed, Some(reason)));
        if let Err(e) = failed {
            warn!(job_id = %id, error = %e, "Failed to mark pending job as failed");
        }
    }

    pub(super) fn finish_one(&self) {
        if self.outstanding.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.idle.notify_waiters();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::executor::ExecError;
    use crate::queue::job::{Credentials, TaskOperation, TaskRef};
    use crate::ledger::JobRecord;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicBool;
    use tempfile::TempDir;

    /// Records execution order and flags any overlapping calls
    #[derive(Default)]
    struct RecordingExecutor {
        seen: Mutex<Vec<Uuid>>,
        busy: AtomicBool,
        overlapped: AtomicBool,
        fail: bool,
        delay: Duration,
    }

    impl RecordingExecutor {
        fn failing() -> Self {
            Self {
                fail: true,
                ..Default::default()
            }
        }

        fn slow(delay: Duration) -> Self {
            Self {
                delay,
                ..Default::default()
            }
        }

        fn seen(&self) -> Vec<Uuid> {
            self.seen.lock().clone()
        }
    }

    #[async_trait]
    impl JobExecutor for RecordingExecutor {
        async fn execute(&self, job: &Job) -> std::result::Result<(), ExecError> {
            if self.busy.swap(true, Ordering::SeqCst) {
                self.overlapped.store(true, Ordering::SeqCst);
            }
            self.seen.lock().push(job.id);
            tokio::time::sleep(self.delay).await;
            self.busy.store(false, Ordering::SeqCst);

            if self.fail {
                Err(ExecError::CommandFailed {
                    command: "task done".to_string(),
                    status: "exit status: 1".to_string(),
                    stderr: "no such task".to_string(),
                })
            } else {
                Ok(())
            }
        }
    }

    fn test_job(n: usize) -> Job {
        Job::new(
            Credentials {
                email: "alice@example.com".to_string(),
                client_id: "client-a".to_string(),
                encryption_secret: "secret".to_string(),
            },
            TaskOperation::CompleteTask(TaskRef {
                task_uuid: format!("task-{n}"),
            }),
        )
    }

    fn test_queue(executor: Arc<RecordingExecutor>, ledger: Option<JobLedger>) -> Arc<JobQueue> {
        Arc::new(
            JobQueue::builder()
                .executor(executor)
                .broadcaster(Arc::new(StatusBroadcaster::default()))
                .maybe_ledger(ledger)
                .capacity(16)
                .build(),
        )
    }

    async fn settle(queue: &JobQueue) {
        tokio::time::timeout(Duration::from_secs(5), queue.wait_idle())
            .await
            .expect("queue did not drain");
    }

    #[tokio::test]
    async fn test_jobs_run_in_order_without_overlap() {
        let temp_dir = TempDir::new().unwrap();
        let ledger = JobLedger::open(temp_dir.path().join("ledger")).unwrap();
        let executor = Arc::new(RecordingExecutor::slow(Duration::from_millis(5)));
        let queue = test_queue(executor.clone(), Some(ledger.clone()));
        let cancel = CancellationToken::new();
        queue.start(cancel.clone()).unwrap();

        let mut ids = Vec::new();
        for n in 0..10 {
            ids.push(queue.submit(test_job(n)).await.unwrap());
        }
        settle(&queue).await;

        assert_eq!(executor.seen(), ids);
        assert!(!executor.overlapped.load(Ordering::SeqCst));
        assert_eq!(queue.outstanding(), 0);

        let stats = ledger.stats().unwrap();
        assert_eq!(stats.completed, 10);
        assert_eq!(stats.pending, 0);
        assert_eq!(stats.in_progress, 0);

        cancel.cancel();
    }

    #[tokio::test]
    async fn test_event_order() {
        let executor = Arc::new(RecordingExecutor::default());
        let queue = test_queue(executor, None);
        let mut events = queue.broadcaster.subscribe();

        let a = queue.submit(test_job(1)).await.unwrap();
        let b = queue.submit(test_job(2)).await.unwrap();
        let c = queue.submit(test_job(3)).await.unwrap();

        let cancel = CancellationToken::new();
        queue.start(cancel.clone()).unwrap();
        settle(&queue).await;

        let mut received = Vec::new();
        while let Ok(event) = events.try_recv() {
            received.push((event.id, event.status));
        }

        use JobStatus::*;
        assert_eq!(
            received,
            vec![
                (a, Queued),
                (b, Queued),
                (c, Queued),
                (a, InProgress),
                (a, Success),
                (b, InProgress),
                (b, Success),
                (c, InProgress),
                (c, Success),
            ]
        );

        cancel.cancel();
    }

    #[tokio::test]
    async fn test_failed_job_is_not_retried() {
        let temp_dir = TempDir::new().unwrap();
        let ledger = JobLedger::open(temp_dir.path().join("ledger")).unwrap();
        let executor = Arc::new(RecordingExecutor::failing());
        let queue = test_queue(executor.clone(), Some(ledger.clone()));
        let mut events = queue.broadcaster.subscribe();
        let cancel = CancellationToken::new();
        queue.start(cancel.clone()).unwrap();

        let id = queue.submit(test_job(1)).await.unwrap();
        settle(&queue).await;

        assert_eq!(executor.seen().len(), 1);

        let record = ledger.find(id).unwrap().unwrap();
        assert_eq!(record.state, JobState::Failed);
        assert!(record.error.unwrap().contains("no such task"));

        let statuses: Vec<_> = std::iter::from_fn(|| events.try_recv().ok())
            .map(|e| e.status)
            .collect();
        assert_eq!(
            statuses,
            vec![JobStatus::Queued, JobStatus::InProgress, JobStatus::Failure]
        );

        let logs = queue.logs.recent_for("client-a", 0);
        assert!(logs.iter().any(|entry| entry.message.contains("no such task")));

        assert_eq!(queue.metrics.snapshot().jobs_failed, 1);
        cancel.cancel();
    }

    #[tokio::test]
    async fn test_start_twice_is_rejected() {
        let queue = test_queue(Arc::new(RecordingExecutor::default()), None);
        let cancel = CancellationToken::new();

        queue.start(cancel.clone()).unwrap();
        assert!(matches!(
            queue.start(cancel.clone()),
            Err(QueueError::AlreadyStarted)
        ));
        cancel.cancel();
    }

    #[tokio::test]
    async fn test_submit_after_shutdown_is_refused() {
        let queue = test_queue(Arc::new(RecordingExecutor::default()), None);
        let cancel = CancellationToken::new();
        let handle = queue.start(cancel.clone()).unwrap();

        cancel.cancel();
        handle.await.unwrap();

        assert!(!queue.is_accepting());
        assert!(matches!(
            queue.submit(test_job(1)).await,
            Err(QueueError::Closed)
        ));
        assert_eq!(queue.outstanding(), 0);
    }

    #[tokio::test]
    async fn test_submit_blocked_at_shutdown_is_not_recovered() {
        let temp_dir = TempDir::new().unwrap();
        let ledger = JobLedger::open(temp_dir.path().join("ledger")).unwrap();
        let executor = Arc::new(RecordingExecutor::slow(Duration::from_millis(200)));
        let queue = Arc::new(
            JobQueue::builder()
                .executor(executor.clone())
                .broadcaster(Arc::new(StatusBroadcaster::default()))
                .ledger(ledger.clone())
                .capacity(1)
                .build(),
        );
        let cancel = CancellationToken::new();
        let handle = queue.start(cancel.clone()).unwrap();

        // First job is executing, second fills the channel, third waits for room
        let first = queue.submit(test_job(1)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        let second = queue.submit(test_job(2)).await.unwrap();
        let third_job = test_job(3);
        let third_id = third_job.id;
        let blocked = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move { queue.submit(third_job).await })
        };
        tokio::time::sleep(Duration::from_millis(30)).await;

        cancel.cancel();
        handle.await.unwrap();

        assert!(matches!(blocked.await.unwrap(), Err(QueueError::Closed)));
        assert_eq!(executor.seen(), vec![first]);

        let third = ledger.find(third_id).unwrap().unwrap();
        assert_eq!(third.state, JobState::Failed);
        assert_eq!(third.error.as_deref(), Some(REJECTED));

        // Only the job that made it into the channel comes back
        let pending: Vec<Uuid> = ledger.pending_jobs().unwrap().iter().map(|r| r.id).collect();
        assert_eq!(pending, vec![second]);
        assert_eq!(queue.outstanding(), 0);
    }

    #[tokio::test]
    async fn test_timeout_fails_job() {
        let executor = Arc::new(RecordingExecutor::slow(Duration::from_secs(10)));
        let queue = Arc::new(
            JobQueue::builder()
                .executor(executor)
                .broadcaster(Arc::new(StatusBroadcaster::default()))
                .job_timeout(Duration::from_millis(20))
                .build(),
        );
        let mut events = queue.broadcaster.subscribe();
        let cancel = CancellationToken::new();
        queue.start(cancel.clone()).unwrap();

        queue.submit(test_job(1)).await.unwrap();
        settle(&queue).await;

        let last = std::iter::from_fn(|| events.try_recv().ok()).last().unwrap();
        assert_eq!(last.status, JobStatus::Failure);
        cancel.cancel();
    }

    #[tokio::test]
    async fn test_recovery_reruns_pending_and_fails_interrupted() {
        let temp_dir = TempDir::new().unwrap();
        let ledger = JobLedger::open(temp_dir.path().join("ledger")).unwrap();

        // Left pending by a previous run
        let pending = test_job(1);
        ledger.add(&pending.to_record().unwrap()).unwrap();

        // Was executing when the previous run died
        let interrupted = test_job(2);
        ledger.add(&interrupted.to_record().unwrap()).unwrap();
        ledger
            .transition(interrupted.id, JobState::InProgress, None)
            .unwrap();

        // Pending but without anything to rebuild it from
        let orphan = JobRecord::pending(Uuid::now_v7(), "Add Task", None);
        ledger.add(&orphan).unwrap();

        let executor = Arc::new(RecordingExecutor::default());
        let queue = test_queue(executor.clone(), Some(ledger.clone()));
        let cancel = CancellationToken::new();
        queue.start(cancel.clone()).unwrap();

        let report = queue.recover().await.unwrap();
        assert_eq!(
            report,
            RecoveryReport {
                requeued: 1,
                interrupted: 1,
                discarded: 1,
            }
        );
        settle(&queue).await;

        assert_eq!(executor.seen(), vec![pending.id]);
        assert_eq!(ledger.find(pending.id).unwrap().unwrap().state, JobState::Completed);

        let interrupted = ledger.find(interrupted.id).unwrap().unwrap();
        assert_eq!(interrupted.state, JobState::Failed);
        assert_eq!(interrupted.error.as_deref(), Some(INTERRUPTED));

        let orphan = ledger.find(orphan.id).unwrap().unwrap();
        assert_eq!(orphan.state, JobState::Failed);
        assert!(orphan.error.is_some());

        cancel.cancel();
    }

    #[tokio::test]
    async fn test_runs_without_ledger() {
        let executor = Arc::new(RecordingExecutor::default());
        let queue = test_queue(executor.clone(), None);
        let cancel = CancellationToken::new();
        queue.start(cancel.clone()).unwrap();

        queue.submit(test_job(1)).await.unwrap();
        settle(&queue).await;

        assert!(!queue.is_durable());
        assert_eq!(executor.seen().len(), 1);
        assert_eq!(queue.recover().await.unwrap(), RecoveryReport::default());
        cancel.cancel();
    }
}
