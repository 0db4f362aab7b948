//! Invocation configuration. Everything comes from the environment;
//! a missing required credential fails fast at startup rather than being
//! retried.

use std::time::Duration;

use snapshot_core::RetryPolicy;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    MissingVar(&'static str),

    #[error("invalid value for {name}: {value}")]
    InvalidVar { name: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub provider_base_url: String,
    pub provider_token: String,

    pub push_base_url: String,
    pub push_channel_token: String,
    pub push_recipient_id: String,

    pub chart_bucket: String,
    pub chart_bucket_region: String,
    pub storage_access_key: String,
    pub storage_secret_key: String,
    /// Endpoint override for S3-compatible stores.
    pub storage_endpoint: Option<String>,
    pub signed_url_ttl: Duration,

    pub fetch_retry: RetryPolicy,
    pub push_retry: RetryPolicy,
    /// Overall invocation budget; retry waits never sleep past it.
    pub run_deadline: Option<Duration>,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            provider_base_url: require("MARKET_DATA_BASE_URL")?,
            provider_token: require("MARKET_DATA_TOKEN")?,

            push_base_url: env_or("PUSH_API_BASE_URL", "https://api.line.me"),
            push_channel_token: require("PUSH_CHANNEL_TOKEN")?,
            push_recipient_id: require("PUSH_RECIPIENT_ID")?,

            chart_bucket: require("CHART_BUCKET")?,
            chart_bucket_region: env_or("CHART_BUCKET_REGION", "ap-northeast-1"),
            storage_access_key: require("STORAGE_ACCESS_KEY")?,
            storage_secret_key: require("STORAGE_SECRET_KEY")?,
            storage_endpoint: optional("STORAGE_ENDPOINT"),
            signed_url_ttl: Duration::from_secs(parse_or("SIGNED_URL_TTL_SECS", 3600)?),

            fetch_retry: RetryPolicy::new(
                parse_or("FETCH_MAX_ATTEMPTS", 3)? as u32,
                Duration::from_secs(parse_or("FETCH_RETRY_DELAY_SECS", 5)?),
            ),
            push_retry: RetryPolicy::new(
                parse_or("PUSH_MAX_ATTEMPTS", 3)? as u32,
                Duration::from_secs(parse_or("PUSH_RETRY_DELAY_SECS", 10)?),
            ),
            run_deadline: parse_optional("RUN_DEADLINE_SECS")?.map(Duration::from_secs),
        })
    }
}

fn optional(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|s| !s.is_empty())
}

fn require(name: &'static str) -> Result<String, ConfigError> {
    optional(name).ok_or(ConfigError::MissingVar(name))
}

fn env_or(name: &str, default: &str) -> String {
    optional(name).unwrap_or_else(|| default.to_string())
}

fn parse_or(name: &'static str, default: u64) -> Result<u64, ConfigError> {
    match optional(name) {
        None => Ok(default),
        Some(value) => value
            .parse()
            .map_err(|_| ConfigError::InvalidVar { name, value }),
    }
}

fn parse_optional(name: &'static str) -> Result<Option<u64>, ConfigError> {
    match optional(name) {
        None => Ok(None),
        Some(value) => value
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidVar { name, value }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // One test covers the whole env surface: env mutation is process-wide,
    // so splitting these into parallel tests would race.
    #[test]
    fn test_from_env() {
        let required = [
            ("MARKET_DATA_BASE_URL", "https://data.example"),
            ("MARKET_DATA_TOKEN", "data-token"),
            ("PUSH_CHANNEL_TOKEN", "channel-token"),
            ("PUSH_RECIPIENT_ID", "user-1"),
            ("CHART_BUCKET", "snapshot-charts"),
            ("STORAGE_ACCESS_KEY", "ak"),
            ("STORAGE_SECRET_KEY", "sk"),
        ];
        for (name, value) in required {
            std::env::set_var(name, value);
        }
        std::env::set_var("FETCH_MAX_ATTEMPTS", "5");
        std::env::set_var("RUN_DEADLINE_SECS", "120");

        let config = Config::from_env().unwrap();
        assert_eq!(config.provider_base_url, "https://data.example");
        assert_eq!(config.push_base_url, "https://api.line.me");
        assert_eq!(config.chart_bucket_region, "ap-northeast-1");
        assert_eq!(config.signed_url_ttl, Duration::from_secs(3600));
        assert_eq!(config.fetch_retry.max_attempts, 5);
        assert_eq!(config.fetch_retry.delay, Duration::from_secs(5));
        assert_eq!(config.run_deadline, Some(Duration::from_secs(120)));

        // Invalid numeric values are configuration errors, not fallbacks.
        std::env::set_var("PUSH_MAX_ATTEMPTS", "many");
        assert!(matches!(
            Config::from_env(),
            Err(ConfigError::InvalidVar { name: "PUSH_MAX_ATTEMPTS", .. })
        ));
        std::env::remove_var("PUSH_MAX_ATTEMPTS");

        // A missing credential fails fast.
        std::env::remove_var("PUSH_CHANNEL_TOKEN");
        assert!(matches!(
            Config::from_env(),
            Err(ConfigError::MissingVar("PUSH_CHANNEL_TOKEN"))
        ));
    }
}
