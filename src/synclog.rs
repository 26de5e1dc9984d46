//! Per-user job log shown to users as "sync logs"
//!
//! Keeps the most recent entries in memory only; entries are also emitted
//! through `tracing` so nothing is lost from the server log.

use std::collections::VecDeque;
use std::fmt;

use chrono::{SecondsFormat, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// Number of entries retained across all users
pub const DEFAULT_MAX_ENTRIES: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    pub timestamp: String,
    pub level: LogLevel,
    pub message: String,
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub sync_id: String,
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub operation: String,
}

/// Bounded ring of recent job log entries
#[derive(Debug)]
pub struct SyncLogStore {
    entries: RwLock<VecDeque<LogEntry>>,
    max_entries: usize,
}

impl SyncLogStore {
    pub fn new(max_entries: usize) -> Self {
        let max_entries = max_entries.max(1);
        Self {
            entries: RwLock::new(VecDeque::with_capacity(max_entries)),
            max_entries,
        }
    }

    pub fn add(&self, level: LogLevel, message: impl Into<String>, sync_id: &str, operation: &str) {
        let message = message.into();
        match level {
            LogLevel::Info => tracing::info!(sync_id, operation, "{}", message),
            LogLevel::Warn => tracing::warn!(sync_id, operation, "{}", message),
            LogLevel::Error => tracing::error!(sync_id, operation, "{}", message),
        }

        let entry = LogEntry {
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            level,
            message,
            sync_id: sync_id.to_string(),
            operation: operation.to_string(),
        };

        let mut entries = self.entries.write();
        entries.push_back(entry);
        while entries.len() > self.max_entries {
            entries.pop_front();
        }
    }

    /// Newest-first entries for one user, at most `last` (0 means all)
    pub fn recent_for(&self, sync_id: &str, last: usize) -> Vec<LogEntry> {
        let entries = self.entries.read();
        let matching = entries.iter().rev().filter(|e| e.sync_id == sync_id);
        if last == 0 {
            matching.cloned().collect()
        } else {
            matching.take(last).cloned().collect()
        }
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for SyncLogStore {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ENTRIES)
    }
}
