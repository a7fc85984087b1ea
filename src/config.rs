//! Configuration types.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;
use crate::onboarding::retry::RetryPolicy;

/// Service configuration, read from `ONBOARD_*` environment variables.
#[derive(Debug, Clone)]
pub struct OnboardConfig {
    /// Path of the libSQL database file.
    pub db_path: PathBuf,
    /// Port the REST server listens on.
    pub http_port: u16,
    /// Attempts per persistence call, including the first.
    pub retry_max_attempts: u32,
    /// Delay before the first retry.
    pub retry_base_delay: Duration,
    /// Idle time after which an in-progress record is abandoned. `None` disables the sweep.
    pub abandon_after: Option<Duration>,
    /// How often the abandonment sweep runs.
    pub sweep_interval: Duration,
    /// Optional JSON file replacing the built-in classification rules.
    pub classifier_rules: Option<PathBuf>,
}

impl Default for OnboardConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("./data/onboard-flow.db"),
            http_port: 8080,
            retry_max_attempts: 3,
            retry_base_delay: Duration::from_millis(100),
            abandon_after: Some(Duration::from_secs(720 * 3600)), // 30 days
            sweep_interval: Duration::from_secs(3600),            // 1 hour
            classifier_rules: None,
        }
    }
}

impl OnboardConfig {
    /// Build config from environment variables, falling back to defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build config from an arbitrary key lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let defaults = Self::default();

        let db_path = get("ONBOARD_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or(defaults.db_path);
        let http_port = parse_or(get("ONBOARD_HTTP_PORT"), "ONBOARD_HTTP_PORT", defaults.http_port)?;

        let retry_max_attempts = parse_or(
            get("ONBOARD_RETRY_MAX_ATTEMPTS"),
            "ONBOARD_RETRY_MAX_ATTEMPTS",
            defaults.retry_max_attempts,
        )?;
        if retry_max_attempts == 0 {
            return Err(ConfigError::InvalidValue {
                key: "ONBOARD_RETRY_MAX_ATTEMPTS".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        let retry_base_ms: u64 = parse_or(get("ONBOARD_RETRY_BASE_MS"), "ONBOARD_RETRY_BASE_MS", 100)?;

        let abandon_hours: u64 =
            parse_or(get("ONBOARD_ABANDON_AFTER_HOURS"), "ONBOARD_ABANDON_AFTER_HOURS", 720)?;
        let sweep_secs: u64 =
            parse_or(get("ONBOARD_SWEEP_INTERVAL_SECS"), "ONBOARD_SWEEP_INTERVAL_SECS", 3600)?;
        if sweep_secs == 0 {
            return Err(ConfigError::InvalidValue {
                key: "ONBOARD_SWEEP_INTERVAL_SECS".to_string(),
                message: "must be at least 1".to_string(),
            });
        }

        let abandon_after = match abandon_hours {
            0 => None,
            hours => Some(Duration::from_secs(hours.checked_mul(3600).ok_or_else(|| {
                ConfigError::InvalidValue {
                    key: "ONBOARD_ABANDON_AFTER_HOURS".to_string(),
                    message: format!("{hours} hours is out of range"),
                }
            })?)),
        };

        Ok(Self {
            db_path,
            http_port,
            retry_max_attempts,
            retry_base_delay: Duration::from_millis(retry_base_ms),
            abandon_after,
            sweep_interval: Duration::from_secs(sweep_secs),
            classifier_rules: get("ONBOARD_CLASSIFIER_RULES").map(PathBuf::from),
        })
    }

    /// Retry policy for persistence calls.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry_max_attempts,
            base_delay: self.retry_base_delay,
            ..RetryPolicy::default()
        }
    }
}

fn parse_or<T>(value: Option<String>, key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match value {
        Some(raw) => raw.parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("'{raw}': {e}"),
        }),
        None => Ok(default),
    }
}
