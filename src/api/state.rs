use std::sync::Arc;

use crate::broadcast::StatusBroadcaster;
use crate::config::{Config, HumanDuration};
use crate::ledger::JobLedger;
use crate::observability::Metrics;
use crate::queue::{JobExecutor, JobQueue};
use crate::ratelimit::{CidrParseError, RateLimiter, TrustedProxies};
use crate::session::{InMemorySessions, SessionStore};
use crate::synclog::SyncLogStore;
use crate::taskwarrior::TaskReader;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub ledger: Option<JobLedger>,
    pub queue: Arc<JobQueue>,
    pub broadcaster: Arc<StatusBroadcaster>,
    pub limiter: Arc<RateLimiter>,
    pub trusted_proxies: Arc<TrustedProxies>,
    pub sessions: Arc<dyn SessionStore>,
    pub tasks: Arc<dyn TaskReader>,
    pub logs: Arc<SyncLogStore>,
    pub metrics: Arc<Metrics>,
}

impl AppState {
    /// Wire every service from configuration.
    ///
    /// Sessions come from `auth.sessions`. Jobs run on `executor`; `tasks`
    /// serves reads.
    pub fn new(
        config: Config,
        ledger: Option<JobLedger>,
        executor: Arc<dyn JobExecutor>,
        tasks: Arc<dyn TaskReader>,
    ) -> Result<Self, CidrParseError> {
        let trusted_proxies = TrustedProxies::from_config(&config.rate_limit)?;
        let limiter = RateLimiter::from_config(&config.rate_limit);
        let broadcaster = Arc::new(StatusBroadcaster::new(
            config.broadcast.capacity,
            config.broadcast.connection_buffer,
        ));
        let logs = Arc::new(SyncLogStore::default());
        let metrics = Arc::new(Metrics::new());
        let sessions: Arc<dyn SessionStore> = Arc::new(InMemorySessions::from_config(&config.auth));

        let queue = JobQueue::builder()
            .executor(executor)
            .broadcaster(Arc::clone(&broadcaster))
            .maybe_ledger(ledger.clone())
            .logs(Arc::clone(&logs))
            .metrics(Arc::clone(&metrics))
            .capacity(config.queue.capacity)
            .maybe_job_timeout(config.queue.job_timeout.as_ref().map(HumanDuration::as_duration))
            .build();

        Ok(Self {
            config: Arc::new(config),
            ledger,
            queue: Arc::new(queue),
            broadcaster,
            limiter: Arc::new(limiter),
            trusted_proxies: Arc::new(trusted_proxies),
            sessions,
            tasks,
            logs,
            metrics,
        })
    }
}
