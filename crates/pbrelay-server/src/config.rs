use std::time::Duration;

use pbrelay::constants::{API_BASE_URL, DEFAULT_BASE_DELAY, DEFAULT_MAX_ATTEMPTS, DEFAULT_TIMEOUT};
use pbrelay::{ClientConfig, RelayError, RetryConfig};

/// Default listen port.
pub const DEFAULT_PORT: u16 = 3000;

/// How the webhook endpoint answers a POST.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseMode {
    /// Answer 202 at once and process in the background.
    Async,
    /// Process first, then answer 200/400/500.
    Sync,
}

impl std::str::FromStr for ResponseMode {
    type Err = RelayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "async" => Ok(ResponseMode::Async),
            "sync" => Ok(ResponseMode::Sync),
            other => Err(RelayError::Config(format!(
                "RESPONSE_MODE must be `async` or `sync`, got `{other}`"
            ))),
        }
    }
}

/// Who may read `/metrics`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetricsAccess {
    Token(Vec<u8>),
    Public,
    Disabled,
}

/// Process configuration, read once at startup.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub port: u16,
    pub response_mode: ResponseMode,
    pub client: ClientConfig,
    pub metrics: MetricsAccess,
}

impl RelayConfig {
    pub fn from_env() -> Result<Self, RelayError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable source. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, RelayError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let token = var("PRODUCTBOARD_API_TOKEN").ok_or_else(|| {
            RelayError::Config("PRODUCTBOARD_API_TOKEN environment variable is required".into())
        })?;

        let base_url = var("PRODUCTBOARD_API_URL").unwrap_or_else(|| API_BASE_URL.to_string());
        validate_base_url(&base_url)?;

        let port = parse_or("PORT", var("PORT"), DEFAULT_PORT)?;

        let response_mode = match var("RESPONSE_MODE") {
            Some(mode) => mode.parse()?,
            None => ResponseMode::Async,
        };

        let timeout_secs = parse_or(
            "UPSTREAM_TIMEOUT_SECS",
            var("UPSTREAM_TIMEOUT_SECS"),
            DEFAULT_TIMEOUT.as_secs(),
        )?;
        if timeout_secs == 0 {
            return Err(RelayError::Config(
                "UPSTREAM_TIMEOUT_SECS must be at least 1".into(),
            ));
        }

        let max_attempts = parse_or(
            "RETRY_MAX_ATTEMPTS",
            var("RETRY_MAX_ATTEMPTS"),
            DEFAULT_MAX_ATTEMPTS,
        )?;
        if max_attempts == 0 {
            return Err(RelayError::Config(
                "RETRY_MAX_ATTEMPTS must be at least 1".into(),
            ));
        }
        let base_delay_ms = parse_or(
            "RETRY_BASE_DELAY_MS",
            var("RETRY_BASE_DELAY_MS"),
            DEFAULT_BASE_DELAY.as_millis() as u64,
        )?;

        let retry_transport = match var("RETRY_TRANSPORT_ERRORS") {
            Some(v) => parse_flag("RETRY_TRANSPORT_ERRORS", &v)?,
            None => false,
        };

        let retry = RetryConfig {
            max_attempts,
            base_delay: Duration::from_millis(base_delay_ms),
            retry_transport,
            ..RetryConfig::default()
        };

        let metrics = match var("METRICS_TOKEN") {
            Some(token) => MetricsAccess::Token(token.into_bytes()),
            None => {
                let public = var("METRICS_PUBLIC")
                    .map(|v| v == "true" || v == "1")
                    .unwrap_or(false);
                if public {
                    MetricsAccess::Public
                } else {
                    MetricsAccess::Disabled
                }
            }
        };

        Ok(Self {
            port,
            response_mode,
            client: ClientConfig::new(token)
                .with_base_url(base_url)
                .with_timeout(Duration::from_secs(timeout_secs))
                .with_retry(retry),
            metrics,
        })
    }
}

fn parse_or<T: std::str::FromStr>(
    key: &str,
    value: Option<String>,
    default: T,
) -> Result<T, RelayError> {
    match value {
        Some(raw) => raw
            .parse()
            .map_err(|_| RelayError::Config(format!("{key} has invalid value `{raw}`"))),
        None => Ok(default),
    }
}

fn parse_flag(key: &str, raw: &str) -> Result<bool, RelayError> {
    match raw.to_ascii_lowercase().as_str() {
        "true" | "1" => Ok(true),
        "false" | "0" => Ok(false),
        _ => Err(RelayError::Config(format!("{key} has invalid value `{raw}`"))),
    }
}

fn validate_base_url(raw: &str) -> Result<(), RelayError> {
    let parsed = url::Url::parse(raw)
        .map_err(|e| RelayError::Config(format!("PRODUCTBOARD_API_URL is invalid: {e}")))?;
    match parsed.scheme() {
        "https" => Ok(()),
        "http" => {
            tracing::warn!(url = %raw, "PRODUCTBOARD_API_URL does not use HTTPS, the API token will be sent in cleartext");
            Ok(())
        }
        other => Err(RelayError::Config(format!(
            "PRODUCTBOARD_API_URL must be http or https, got `{other}`"
        ))),
    }
}
