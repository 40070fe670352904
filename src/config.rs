use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),
    #[error("invalid value {value:?} for {key}")]
    Invalid { key: &'static str, value: String },
    #[error("{0}")]
    Validation(&'static str),
}

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub default_processor_url: String,
    pub fallback_processor_url: String,
    pub queue_capacity: usize,
    pub port: u16,
    pub worker_concurrency: usize,
    pub redis_url: Option<String>,
    pub health_check_interval: Duration,
    pub processor_timeout: Duration,
    pub http_timeout: Duration,
    pub breaker_failure_threshold: u32,
    pub breaker_cooldown: Duration,
    pub max_payment_attempts: u32,
    pub health_offset_requested_at: bool,
    pub health_aware_routing: bool,
}

impl GatewayConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &'static str| lookup(key).ok_or(ConfigError::Missing(key));

        let config = Self {
            default_processor_url: required("PROCESSOR_DEFAULT_BASEURL")?,
            fallback_processor_url: required("PROCESSOR_FALLBACK_BASEURL")?,
            queue_capacity: parse_or(&lookup, "QUEUE_BUFFER_SIZE", 10_000)?,
            port: parse_or(&lookup, "PORT", 9999)?,
            worker_concurrency: parse_or(&lookup, "WORKER_CONCURRENCY", 20)?,
            redis_url: lookup("REDIS_URL").filter(|url| !url.is_empty()),
            health_check_interval: Duration::from_secs(parse_or(
                &lookup,
                "HEALTH_CHECK_INTERVAL_SECS",
                5,
            )?),
            processor_timeout: Duration::from_millis(parse_or(
                &lookup,
                "PROCESSOR_TIMEOUT_MILLIS",
                10_000,
            )?),
            http_timeout: Duration::from_secs(parse_or(&lookup, "HTTP_TIMEOUT_SECS", 15)?),
            breaker_failure_threshold: parse_or(&lookup, "BREAKER_FAILURE_THRESHOLD", 1)?,
            breaker_cooldown: Duration::from_millis(parse_or(
                &lookup,
                "BREAKER_COOLDOWN_MILLIS",
                1000,
            )?),
            max_payment_attempts: parse_or(&lookup, "MAX_PAYMENT_ATTEMPTS", 0)?,
            health_offset_requested_at: parse_or(&lookup, "HEALTH_OFFSET_REQUESTED_AT", false)?,
            health_aware_routing: parse_or(&lookup, "HEALTH_AWARE_ROUTING", false)?,
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.default_processor_url.is_empty() {
            return Err(ConfigError::Validation("Default processor URL cannot be empty"));
        }

        if self.fallback_processor_url.is_empty() {
            return Err(ConfigError::Validation("Fallback processor URL cannot be empty"));
        }

        if self.queue_capacity == 0 {
            return Err(ConfigError::Validation("Queue capacity must be greater than 0"));
        }

        if self.worker_concurrency == 0 {
            return Err(ConfigError::Validation("Worker concurrency must be greater than 0"));
        }

        if self.health_check_interval.is_zero() {
            return Err(ConfigError::Validation(
                "Health check interval must be greater than 0",
            ));
        }

        if self.processor_timeout.is_zero() {
            return Err(ConfigError::Validation("Processor timeout must be greater than 0"));
        }

        if self.breaker_failure_threshold == 0 {
            return Err(ConfigError::Validation(
                "Breaker failure threshold must be greater than 0",
            ));
        }

        Ok(())
    }

    /// `None` means payments are retried until a processor accepts them.
    pub fn retry_limit(&self) -> Option<u32> {
        (self.max_payment_attempts > 0).then_some(self.max_payment_attempts)
    }

    pub fn log_configuration(&self) {
        info!(
            default_processor_url = %self.default_processor_url,
            fallback_processor_url = %self.fallback_processor_url,
            queue_capacity = self.queue_capacity,
            port = self.port,
            worker_concurrency = self.worker_concurrency,
            store = if self.redis_url.is_some() { "redis" } else { "memory" },
            health_check_interval = ?self.health_check_interval,
            processor_timeout = ?self.processor_timeout,
            http_timeout = ?self.http_timeout,
            breaker_failure_threshold = self.breaker_failure_threshold,
            breaker_cooldown = ?self.breaker_cooldown,
            max_payment_attempts = self.max_payment_attempts,
            health_offset_requested_at = self.health_offset_requested_at,
            health_aware_routing = self.health_aware_routing,
            "Gateway configuration"
        );
    }
}

fn parse_or<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(value) => value
            .trim()
            .parse::<T>()
            .map_err(|_| ConfigError::Invalid { key, value }),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    fn base_vars() -> Vec<(&'static str, &'static str)> {
        vec![
            ("PROCESSOR_DEFAULT_BASEURL", "http://default:8080"),
            ("PROCESSOR_FALLBACK_BASEURL", "http://fallback:8080"),
        ]
    }

    #[test]
    fn test_defaults_applied() {
        let config = GatewayConfig::from_lookup(lookup_from(&base_vars())).unwrap();

        assert_eq!(config.queue_capacity, 10_000);
        assert_eq!(config.port, 9999);
        assert_eq!(config.worker_concurrency, 20);
        assert_eq!(config.redis_url, None);
        assert_eq!(config.health_check_interval, Duration::from_secs(5));
        assert_eq!(config.processor_timeout, Duration::from_secs(10));
        assert_eq!(config.breaker_failure_threshold, 1);
        assert_eq!(config.breaker_cooldown, Duration::from_secs(1));
        assert_eq!(config.retry_limit(), None);
        assert!(!config.health_offset_requested_at);
        assert!(!config.health_aware_routing);
    }

    #[test]
    fn test_missing_processor_url_is_rejected() {
        let result = GatewayConfig::from_lookup(lookup_from(&[(
            "PROCESSOR_DEFAULT_BASEURL",
            "http://default:8080",
        )]));

        assert!(matches!(
            result,
            Err(ConfigError::Missing("PROCESSOR_FALLBACK_BASEURL"))
        ));
    }

    #[test]
    fn test_overrides_parsed() {
        let mut vars = base_vars();
        vars.extend([
            ("QUEUE_BUFFER_SIZE", "50"),
            ("PORT", "8080"),
            ("WORKER_CONCURRENCY", "4"),
            ("REDIS_URL", "redis://localhost:6379"),
            ("MAX_PAYMENT_ATTEMPTS", "7"),
            ("HEALTH_AWARE_ROUTING", "true"),
        ]);

        let config = GatewayConfig::from_lookup(lookup_from(&vars)).unwrap();

        assert_eq!(config.queue_capacity, 50);
        assert_eq!(config.port, 8080);
        assert_eq!(config.worker_concurrency, 4);
        assert_eq!(config.redis_url.as_deref(), Some("redis://localhost:6379"));
        assert_eq!(config.retry_limit(), Some(7));
        assert!(config.health_aware_routing);
    }

    #[test]
    fn test_unparsable_value_is_rejected() {
        let mut vars = base_vars();
        vars.push(("PORT", "not-a-port"));

        let result = GatewayConfig::from_lookup(lookup_from(&vars));
        assert!(matches!(result, Err(ConfigError::Invalid { key: "PORT", .. })));
    }

    #[test]
    fn test_zero_workers_fails_validation() {
        let mut vars = base_vars();
        vars.push(("WORKER_CONCURRENCY", "0"));

        let result = GatewayConfig::from_lookup(lookup_from(&vars));
        assert!(matches!(result, Err(ConfigError::Validation(_))));
    }
}
