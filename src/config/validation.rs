use super::models::Config;
use crate::maintenance::parse_schedule;
use crate::ratelimit::IpCidr;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Queue capacity must be positive")]
    InvalidQueueCapacity,

    #[error("Job timeout must be positive when set")]
    InvalidJobTimeout,

    #[error("Invalid cron expression '{expr}': {reason}")]
    InvalidCron { expr: String, reason: String },

    #[error("Retention must be positive: retention_days = {0}")]
    InvalidRetention(u32),

    #[error("Rate limit must be positive: {field}")]
    InvalidRateLimit { field: &'static str },

    #[error("Invalid trusted proxy '{entry}': {reason}")]
    InvalidTrustedProxy { entry: String, reason: String },

    #[error("Broadcast buffers must be positive: {field}")]
    InvalidBroadcastBuffer { field: &'static str },

    #[error("Invalid origin '{0}', expected scheme://host[:port]")]
    InvalidOrigin(String),

    #[error("Session token must not be empty")]
    EmptySessionToken,
}

/// Validate the entire configuration
pub fn validate(config: &Config) -> Result<(), ValidationError> {
    validate_queue(config)?;
    validate_maintenance(config)?;
    validate_rate_limit(config)?;
    validate_broadcast(config)?;
    validate_origins(config)?;
    validate_auth(config)?;
    Ok(())
}

fn validate_queue(config: &Config) -> Result<(), ValidationError> {
    if config.queue.capacity == 0 {
        return Err(ValidationError::InvalidQueueCapacity);
    }

    if config.queue.job_timeout.is_some_and(|t| t.is_zero()) {
        return Err(ValidationError::InvalidJobTimeout);
    }

    Ok(())
}

fn validate_maintenance(config: &Config) -> Result<(), ValidationError> {
    parse_schedule(&config.maintenance.cron).map_err(|e| ValidationError::InvalidCron {
        expr: config.maintenance.cron.clone(),
        reason: e.to_string(),
    })?;

    if config.maintenance.retention_days == 0 {
        return Err(ValidationError::InvalidRetention(0));
    }

    Ok(())
}

fn validate_rate_limit(config: &Config) -> Result<(), ValidationError> {
    let limits = &config.rate_limit;

    if limits.max_requests == 0 {
        return Err(ValidationError::InvalidRateLimit {
            field: "max_requests",
        });
    }
    if limits.window.is_zero() {
        return Err(ValidationError::InvalidRateLimit { field: "window" });
    }

    for entry in &limits.trusted_proxies {
        entry
            .parse::<IpCidr>()
            .map_err(|e| ValidationError::InvalidTrustedProxy {
                entry: entry.clone(),
                reason: e.to_string(),
            })?;
    }

    Ok(())
}

fn validate_broadcast(config: &Config) -> Result<(), ValidationError> {
    if config.broadcast.capacity == 0 {
        return Err(ValidationError::InvalidBroadcastBuffer { field: "capacity" });
    }
    if config.broadcast.connection_buffer == 0 {
        return Err(ValidationError::InvalidBroadcastBuffer {
            field: "connection_buffer",
        });
    }
    Ok(())
}

fn validate_origins(config: &Config) -> Result<(), ValidationError> {
    let origins = [
        config.server.frontend_origin.as_deref(),
        config.executor.sync_origin.as_deref(),
    ];

    for origin in origins.into_iter().flatten() {
        let valid = origin
            .split_once("://")
            .is_some_and(|(scheme, rest)| !scheme.is_empty() && !rest.is_empty());
        if !valid {
            return Err(ValidationError::InvalidOrigin(origin.to_string()));
        }
    }

    Ok(())
}

fn validate_auth(config: &Config) -> Result<(), ValidationError> {
    if config.auth.sessions.keys().any(|token| token.trim().is_empty()) {
        return Err(ValidationError::EmptySessionToken);
    }
    Ok(())
}
