//! Runtime configuration.
//!
//! Configuration is read from the environment once at startup. The upstream
//! bearer credential is held in a [`secrecy::SecretString`] so it never shows
//! up in debug output or logs.

use std::time::Duration;

use secrecy::SecretString;

use crate::error::RelayError;

const DEFAULT_BIND_ADDR: &str = "127.0.0.1:8787";
const DEFAULT_UPSTREAM_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "gpt-4o-mini";
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_PROBE_LIMIT: usize = 12;

/// Upstream token-streaming API configuration.
#[derive(Debug, Clone)]
pub struct UpstreamConfig {
    /// Base URL of the chat-completions API, without a trailing slash.
    pub base_url: String,
    /// Bearer credential forwarded on the upstream call.
    pub api_key: SecretString,
    /// Model requested on every upstream call.
    pub model: String,
    /// Connection timeout. There is deliberately no overall request timeout:
    /// the response body is an open-ended stream.
    pub connect_timeout: Duration,
}

impl UpstreamConfig {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: SecretString::from(api_key.into()),
            model: DEFAULT_MODEL.to_string(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Read the upstream configuration from the environment.
    ///
    /// `UPSTREAM_API_KEY` is required; `UPSTREAM_BASE_URL` and
    /// `UPSTREAM_MODEL` fall back to OpenAI defaults.
    pub fn from_env() -> Result<Self, RelayError> {
        let api_key = std::env::var("UPSTREAM_API_KEY").map_err(|_| {
            RelayError::ConfigurationError("UPSTREAM_API_KEY is not set".to_string())
        })?;
        let base_url = std::env::var("UPSTREAM_BASE_URL")
            .unwrap_or_else(|_| DEFAULT_UPSTREAM_BASE_URL.to_string());
        let mut config = Self::new(base_url, api_key);
        if let Ok(model) = std::env::var("UPSTREAM_MODEL") {
            config = config.with_model(model);
        }
        Ok(config)
    }
}

/// Probe orchestrator configuration.
#[derive(Debug, Clone)]
pub struct ProbeConfig {
    /// Base URL of the network-testing API, without a trailing slash.
    pub base_url: String,
    /// Optional bearer credential for the network-testing API.
    pub api_token: Option<SecretString>,
    /// Upper bound on how many locations one probe run measures.
    pub max_locations: usize,
}

impl ProbeConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_token: None,
            max_locations: DEFAULT_PROBE_LIMIT,
        }
    }

    pub fn with_api_token(mut self, token: impl Into<String>) -> Self {
        self.api_token = Some(SecretString::from(token.into()));
        self
    }

    pub fn with_max_locations(mut self, limit: usize) -> Self {
        self.max_locations = limit;
        self
    }

    pub fn from_env() -> Result<Self, RelayError> {
        let base_url = std::env::var("PROBE_API_BASE_URL").map_err(|_| {
            RelayError::ConfigurationError("PROBE_API_BASE_URL is not set".to_string())
        })?;
        let mut config = Self::new(base_url);
        if let Ok(token) = std::env::var("PROBE_API_TOKEN") {
            config = config.with_api_token(token);
        }
        if let Ok(limit) = std::env::var("PROBE_MAX_LOCATIONS") {
            let limit: usize = limit.parse().map_err(|_| {
                RelayError::ConfigurationError("PROBE_MAX_LOCATIONS must be an integer".to_string())
            })?;
            config = config.with_max_locations(limit);
        }
        Ok(config)
    }
}

/// Top-level service configuration.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub bind_addr: String,
    pub upstream: UpstreamConfig,
    /// Probe configuration is optional: the relay works without it and the
    /// probe endpoint reports it as unconfigured.
    pub probe: Option<ProbeConfig>,
}

impl RelayConfig {
    pub fn from_env() -> Result<Self, RelayError> {
        let bind_addr =
            std::env::var("RELAYMETER_BIND").unwrap_or_else(|_| DEFAULT_BIND_ADDR.to_string());
        let upstream = UpstreamConfig::from_env()?;
        // Absent PROBE_API_BASE_URL means the probe is unconfigured; any
        // other probe env problem is a real configuration error.
        let probe = if std::env::var("PROBE_API_BASE_URL").is_ok() {
            Some(ProbeConfig::from_env()?)
        } else {
            None
        };
        Ok(Self {
            bind_addr,
            upstream,
            probe,
        })
    }
}
