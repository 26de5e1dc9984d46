use crate::humanize::HumanDuration;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;

/// Top-level configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub ledger: LedgerConfig,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub maintenance: MaintenanceConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub broadcast: BroadcastConfig,
    #[serde(default)]
    pub executor: ExecutorConfig,
    #[serde(default)]
    pub auth: AuthConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: SocketAddr,
    /// Browser origin of the frontend, allowed for CORS and the status stream
    #[serde(default)]
    pub frontend_origin: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            frontend_origin: None,
        }
    }
}

fn default_bind_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8000))
}

/// Job ledger configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LedgerConfig {
    /// Fjall keyspace directory
    #[serde(default = "default_ledger_path")]
    pub path: PathBuf,
    /// Run without durability when false
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            path: default_ledger_path(),
            enabled: true,
        }
    }
}

fn default_ledger_path() -> PathBuf {
    PathBuf::from("data/jobs.ledger")
}

fn default_true() -> bool {
    true
}

/// Execution queue configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct QueueConfig {
    #[serde(default = "default_queue_capacity")]
    pub capacity: usize,
    /// Deadline for a single job; unset means no deadline
    #[serde(default)]
    pub job_timeout: Option<HumanDuration>,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            capacity: default_queue_capacity(),
            job_timeout: None,
        }
    }
}

fn default_queue_capacity() -> usize {
    crate::queue::DEFAULT_QUEUE_CAPACITY
}

/// Ledger maintenance configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MaintenanceConfig {
    /// Cron expression, 5 or 6 fields, evaluated in UTC
    #[serde(default = "default_cron")]
    pub cron: String,
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            cron: default_cron(),
            retention_days: default_retention_days(),
        }
    }
}

fn default_cron() -> String {
    "0 0 * * *".to_string()
}

fn default_retention_days() -> u32 {
    crate::ledger::DEFAULT_RETENTION_DAYS
}

/// Admission control algorithm
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RateLimitStrategy {
    #[default]
    FixedWindow,
    TokenBucket,
}

impl fmt::Display for RateLimitStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RateLimitStrategy::FixedWindow => "fixed_window",
            RateLimitStrategy::TokenBucket => "token_bucket",
        })
    }
}

/// Rate limiter configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RateLimitConfig {
    #[serde(default)]
    pub strategy: RateLimitStrategy,
    #[serde(default = "default_window")]
    pub window: HumanDuration,
    #[serde(default = "default_max_requests")]
    pub max_requests: u32,
    /// Peers allowed to set X-Real-IP / X-Forwarded-For (IPs or CIDRs)
    #[serde(default)]
    pub trusted_proxies: Vec<String>,
    /// Also trust 172.16.0.0/12, the container bridge range
    #[serde(default)]
    pub trust_container_bridge: bool,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            strategy: RateLimitStrategy::default(),
            window: default_window(),
            max_requests: default_max_requests(),
            trusted_proxies: Vec::new(),
            trust_container_bridge: false,
        }
    }
}

fn default_window() -> HumanDuration {
    HumanDuration::from_secs(30)
}

fn default_max_requests() -> u32 {
    50
}

/// Status broadcaster configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BroadcastConfig {
    /// Events buffered before the oldest are dropped
    #[serde(default = "default_event_capacity")]
    pub capacity: usize,
    /// Outbound frames buffered per connection before it is dropped
    #[serde(default = "default_connection_buffer")]
    pub connection_buffer: usize,
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            capacity: default_event_capacity(),
            connection_buffer: default_connection_buffer(),
        }
    }
}

fn default_event_capacity() -> usize {
    crate::broadcast::DEFAULT_EVENT_CAPACITY
}

fn default_connection_buffer() -> usize {
    crate::broadcast::DEFAULT_CONNECTION_BUFFER
}

/// Task CLI executor configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ExecutorConfig {
    #[serde(default = "default_task_bin")]
    pub task_bin: PathBuf,
    /// Sync server the task CLI talks to
    #[serde(default)]
    pub sync_origin: Option<String>,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            task_bin: default_task_bin(),
            sync_origin: None,
        }
    }
}

fn default_task_bin() -> PathBuf {
    PathBuf::from("task")
}

/// A session known to the server, keyed by its token
#[derive(Clone, Deserialize, Serialize)]
pub struct StaticSession {
    pub email: String,
    pub client_id: String,
    pub encryption_secret: String,
}

impl fmt::Debug for StaticSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StaticSession")
            .field("email", &self.email)
            .field("client_id", &self.client_id)
            .finish_non_exhaustive()
    }
}

/// Authentication configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AuthConfig {
    #[serde(default)]
    pub sessions: HashMap<String, StaticSession>,
}
