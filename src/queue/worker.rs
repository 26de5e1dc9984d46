//! The single worker draining the job queue

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::broker::{JobEnvelope, JobQueue};
use super::executor::ExecError;
use super::job::Job;
use crate::broadcast::{JobStatus, JobStatusEvent};
use crate::ledger::JobState;
use crate::synclog::LogLevel;

impl JobQueue {
    pub(super) async fn run_worker(
        self: Arc<Self>,
        mut receiver: mpsc::Receiver<JobEnvelope>,
        cancel: CancellationToken,
    ) {
        info!("Job worker started");

        loop {
            let envelope = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                next = receiver.recv() => match next {
                    Some(envelope) => envelope,
                    None => break,
                },
            };

            self.process(envelope).await;
        }

        // Anything still buffered keeps its pending ledger record for the next start
        receiver.close();
        let mut left_behind = 0;
        while let Ok(envelope) = receiver.try_recv() {
            warn!(job_id = %envelope.job.id, job = envelope.job.name(), "Job left queued at shutdown");
            left_behind += 1;
            self.finish_one();
        }

        info!(left_behind, "Job worker stopped");
    }

    async fn process(&self, envelope: JobEnvelope) {
        let JobEnvelope { job, durable } = envelope;
        let name = job.name();
        let owner = job.credentials.client_id.as_str();

        self.record_state(&job, durable, JobState::InProgress, None);
        self.broadcaster
            .publish(JobStatusEvent::new(job.id, name, JobStatus::InProgress));
        self.logs
            .add(LogLevel::Info, format!("{name} started"), owner, name);

        let started = Instant::now();
        let outcome = self.execute(&job).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        match outcome {
            Ok(()) => {
                info!(job_id = %job.id, job = name, elapsed_ms, "Job succeeded");
                self.record_state(&job, durable, JobState::Completed, None);
                self.broadcaster
                    .publish(JobStatusEvent::new(job.id, name, JobStatus::Success));
                self.logs
                    .add(LogLevel::Info, format!("{name} completed"), owner, name);
                self.metrics.job_succeeded();
            }
            Err(e) => {
                let reason = e.to_string();
                error!(job_id = %job.id, job = name, elapsed_ms, error = %reason, "Job failed");
                self.record_state(&job, durable, JobState::Failed, Some(&reason));
                self.broadcaster
                    .publish(JobStatusEvent::new(job.id, name, JobStatus::Failure));
                self.logs
                    .add(LogLevel::Error, format!("{name} failed: {reason}"), owner, name);
                self.metrics.job_failed();
            }
        }

        self.finish_one();
    }

    async fn execute(&self, job: &Job) -> Result<(), ExecError> {
        match self.job_timeout {
            Some(limit) => tokio::time::timeout(limit, self.executor.execute(job))
                .await
                .unwrap_or(Err(ExecError::TimedOut(limit))),
            None => self.executor.execute(job).await,
        }
    }

    fn record_state(&self, job: &Job, durable: bool, state: JobState, error: Option<&str>) {
        let Some(ledger) = self.ledger.as_ref().filter(|_| durable) else {
            return;
        };

        if let Err(e) = ledger.transition(job.id, state, error) {
            warn!(job_id = %job.id, to = %state, error = %e, "Failed to record job state");
        }
    }
}

