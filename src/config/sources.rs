use super::models::Config;
use config::{ConfigError, Environment, File};
use std::env;
use std::path::PathBuf;

const CONFIG_ENV_VAR: &str = "TASKRELAY_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "config/taskrelay.toml";
const ENV_PREFIX: &str = "TASKRELAY";
const ENV_SEPARATOR: &str = "__";

/// Load configuration from multiple sources with priority:
/// 1. Defaults (embedded in structs)
/// 2. TOML file (if exists)
/// 3. Environment variables from .env file (via dotenvy)
/// 4. System environment variables
/// 5. Legacy deployment variables (highest priority)
pub fn load() -> Result<Config, ConfigError> {
    // Load .env file if it exists (ignore errors if file doesn't exist)
    let _ = dotenvy::dotenv();

    let config_path = env::var(CONFIG_ENV_VAR)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));

    load_with(config_path, |key| env::var(key).ok())
}

/// Same layering as [`load`] for an explicit file
pub fn load_path(config_path: PathBuf) -> Result<Config, ConfigError> {
    let _ = dotenvy::dotenv();
    load_with(config_path, |key| env::var(key).ok())
}

/// File and `TASKRELAY__*` layers, then the legacy variables from `lookup`
pub fn load_with<F>(config_path: PathBuf, lookup: F) -> Result<Config, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut config = load_from_sources(config_path)?;
    apply_legacy_env(&mut config, lookup);
    Ok(config)
}

/// Apply the plain variable names existing deployments already set.
///
/// `lookup` is `std::env::var` in production and a map in tests.
pub fn apply_legacy_env<F>(config: &mut Config, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let lookup = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

    if let Some(cron) = lookup("CLEANUP_CRON_SCHEDULE") {
        config.maintenance.cron = cron.trim().to_string();
    }

    if let Some(days) = lookup("CLEANUP_RETENTION_DAYS") {
        match days.trim().parse::<u32>() {
            Ok(days) if days > 0 => config.maintenance.retention_days = days,
            _ => tracing::warn!(
                value = %days,
                default = config.maintenance.retention_days,
                "Ignoring invalid CLEANUP_RETENTION_DAYS"
            ),
        }
    }

    if let Some(proxies) = lookup("TRUSTED_PROXIES") {
        config.rate_limit.trusted_proxies.extend(
            proxies
                .split(',')
                .map(str::trim)
                .filter(|entry| !entry.is_empty())
                .map(str::to_string),
        );
    }

    if lookup("ENV").is_some_and(|env| env == "production") {
        config.rate_limit.trust_container_bridge = true;
    }

    if let Some(origin) = lookup("CONTAINER_ORIGIN") {
        config.executor.sync_origin = Some(origin);
    }

    if let Some(origin) = lookup("FRONTEND_ORIGIN_DEV") {
        config.server.frontend_origin = Some(origin);
    }

    if let Some(path) = lookup("JOB_LEDGER_PATH") {
        config.ledger.path = PathBuf::from(path);
    }
}

/// Load configuration from a specific path and environment
/// Useful for testing with custom config files
pub fn load_from_sources(config_path: PathBuf) -> Result<Config, ConfigError> {
    let mut builder = config::Config::builder();

    // Start with defaults (handled by struct Default implementations)
    // Add TOML file if it exists (optional)
    if config_path.exists() {
        tracing::info!("Loading configuration from: {}", config_path.display());
        builder = builder.add_source(File::from(config_path).required(false));
    } else {
        tracing::warn!(
            "Configuration file not found at {}, using defaults and environment overrides",
            config_path.display()
        );
    }

    // TASKRELAY__RATE_LIMIT__MAX_REQUESTS -> rate_limit.max_requests
    builder = builder.add_source(
        Environment::with_prefix(ENV_PREFIX)
            .separator(ENV_SEPARATOR)
            .list_separator(",")
            .with_list_parse_key("rate_limit.trusted_proxies")
            .try_parsing(true),
    );

    let config = builder.build()?;
    config.try_deserialize()
}
