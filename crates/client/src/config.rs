use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use idyll_core::audit::DEFAULT_AUDIT_LOG_LIMIT;
use idyll_db::RestConfig;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{var} has an invalid value: {value}")]
    Invalid { var: &'static str, value: String },
}

/// Client configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Remote project URL.
    pub backend_url: String,
    /// Public API key sent with every request.
    pub anon_key: String,
    /// Ceiling on initial session resolution (default: 5 s).
    pub session_timeout: Duration,
    /// Change-feed poll interval (default: 10 s).
    pub poll_interval: Duration,
    /// Per-request HTTP timeout (default: 30 s).
    pub request_timeout: Duration,
    /// Directory for the local key-value file (default: `.idyll`).
    pub state_dir: PathBuf,
    /// Audit entries fetched per refresh (default: 100).
    pub audit_log_limit: usize,
}

impl ClientConfig {
    /// Load configuration from environment variables.
    ///
    /// | Env Var                | Default    |
    /// |------------------------|------------|
    /// | `IDYLL_BACKEND_URL`    | (required) |
    /// | `IDYLL_ANON_KEY`       | (required) |
    /// | `SESSION_TIMEOUT_SECS` | `5`        |
    /// | `POLL_INTERVAL_SECS`   | `10`       |
    /// | `REQUEST_TIMEOUT_SECS` | `30`       |
    /// | `IDYLL_STATE_DIR`      | `.idyll`   |
    /// | `AUDIT_LOG_LIMIT`      | `100`      |
    pub fn from_env() -> Result<Self, ConfigError> {
        let backend_url = required("IDYLL_BACKEND_URL")?;
        let anon_key = required("IDYLL_ANON_KEY")?;

        let session_timeout = Duration::from_secs(parse_or("SESSION_TIMEOUT_SECS", 5)?);
        let poll_interval = Duration::from_secs(parse_or("POLL_INTERVAL_SECS", 10)?);
        let request_timeout = Duration::from_secs(parse_or("REQUEST_TIMEOUT_SECS", 30)?);
        let state_dir = std::env::var("IDYLL_STATE_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(".idyll"));
        let audit_log_limit = parse_or("AUDIT_LOG_LIMIT", DEFAULT_AUDIT_LOG_LIMIT)?;

        Ok(Self {
            backend_url,
            anon_key,
            session_timeout,
            poll_interval,
            request_timeout,
            state_dir,
            audit_log_limit,
        })
    }

    pub fn rest_config(&self) -> RestConfig {
        RestConfig {
            base_url: self.backend_url.clone(),
            api_key: self.anon_key.clone(),
            request_timeout: self.request_timeout,
            poll_interval: self.poll_interval,
        }
    }
}

impl Default for ClientConfig {
    /// Defaults for an in-process backend.
    fn default() -> Self {
        Self {
            backend_url: String::new(),
            anon_key: String::new(),
            session_timeout: Duration::from_secs(5),
            poll_interval: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
            state_dir: PathBuf::from(".idyll"),
            audit_log_limit: DEFAULT_AUDIT_LOG_LIMIT,
        }
    }
}

fn required(var: &'static str) -> Result<String, ConfigError> {
    std::env::var(var)
        .ok()
        .filter(|value| !value.trim().is_empty())
        .ok_or(ConfigError::Missing(var))
}

fn parse_or<T: FromStr>(var: &'static str, default: T) -> Result<T, ConfigError> {
    match std::env::var(var) {
        Ok(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { var, value }),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = ClientConfig::default();
        assert_eq!(config.session_timeout, Duration::from_secs(5));
        assert_eq!(config.audit_log_limit, 100);
    }

    #[test]
    fn unset_variable_falls_back_to_default() {
        let value: u64 = parse_or("IDYLL_TEST_SURELY_UNSET_VARIABLE", 42).unwrap();
        assert_eq!(value, 42);
    }

    #[test]
    fn rest_config_carries_timeouts() {
        let config = ClientConfig {
            backend_url: "https://p.example.co".into(),
            anon_key: "anon".into(),
            ..ClientConfig::default()
        };
        let rest = config.rest_config();
        assert_eq!(rest.base_url, "https://p.example.co");
        assert_eq!(rest.poll_interval, Duration::from_secs(10));
    }
}
