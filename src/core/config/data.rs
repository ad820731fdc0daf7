use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_API_VERSION: &str = "2023-05-15";
pub const DEFAULT_MODEL: &str = "gpt-4";

pub const ENV_ENDPOINT: &str = "AZURE_OPENAI_ENDPOINT";
pub const ENV_DEPLOYMENT: &str = "AZURE_OPENAI_DEPLOYMENT_NAME";
pub const ENV_API_KEY: &str = "AZURE_OPENAI_API_KEY";

/// Backoff applied when the endpoint answers 429.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Retries before the send is reported as failed. `None` retries forever.
    pub max_attempts: Option<u32>,
    /// Delay used when the response carries no usable `Retry-After`.
    pub default_delay_secs: u64,
    /// Base of the exponential schedule for repeated 429s.
    pub base_delay_secs: u64,
    pub max_delay_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_attempts: Some(5),
            default_delay_secs: 1,
            base_delay_secs: 1,
            max_delay_secs: 60,
        }
    }
}

impl RateLimitConfig {
    pub fn default_delay(&self) -> Duration {
        Duration::from_secs(self.default_delay_secs)
    }

    /// Delay before retry number `attempt` (1-based). The first retry waits
    /// exactly what the server asked for; later ones grow exponentially but
    /// never below the server's hint or above `max_delay_secs`.
    pub fn delay_for(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        let hint = retry_after.unwrap_or_else(|| self.default_delay());
        if attempt <= 1 {
            return hint;
        }
        let exponent = (attempt - 1).min(16);
        let backoff = Duration::from_secs(self.base_delay_secs.saturating_mul(1 << exponent));
        let cap = Duration::from_secs(self.max_delay_secs);
        backoff.min(cap).max(hint)
    }

    pub fn allows(&self, attempt: u32) -> bool {
        self.max_attempts.is_none_or(|max| attempt <= max)
    }
}

#[derive(Debug, Serialize, Deserialize, Default, Clone)]
pub struct Config {
    /// Base URL of the Azure OpenAI resource, e.g. `https://example.openai.azure.com`
    pub endpoint: Option<String>,
    /// Deployment name used in the request path
    pub deployment: Option<String>,
    /// Prefer the environment variable; stored here only when set explicitly
    pub api_key: Option<String>,
    pub api_version: Option<String>,
    /// Model identifier sent in the request body
    pub model: Option<String>,
    /// Where thread snapshots are stored
    pub data_dir: Option<PathBuf>,
    /// Enable markdown rendering in the chat area
    pub markdown: Option<bool>,
    /// Enable syntax highlighting for fenced code blocks when markdown is enabled
    pub syntax: Option<bool>,
    /// Upper bound on one request including its streamed body
    pub stream_timeout_secs: Option<u64>,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
}

/// Everything needed to address the completion endpoint. Fields stay
/// optional so missing values fail the send, not startup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApiSettings {
    pub endpoint: Option<String>,
    pub deployment: Option<String>,
    pub api_key: Option<String>,
    pub api_version: String,
    pub model: String,
}

impl Config {
    /// Overlay environment variables onto the file values. `lookup` is
    /// `std::env::var` in production.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        if let Some(endpoint) = non_empty(ENV_ENDPOINT) {
            self.endpoint = Some(endpoint);
        }
        if let Some(deployment) = non_empty(ENV_DEPLOYMENT) {
            self.deployment = Some(deployment);
        }
        if let Some(key) = non_empty(ENV_API_KEY) {
            self.api_key = Some(key);
        }
    }

    pub fn api_settings(&self) -> ApiSettings {
        ApiSettings {
            endpoint: self.endpoint.clone(),
            deployment: self.deployment.clone(),
            api_key: self.api_key.clone(),
            api_version: self
                .api_version
                .clone()
                .unwrap_or_else(|| DEFAULT_API_VERSION.to_string()),
            model: self
                .model
                .clone()
                .unwrap_or_else(|| DEFAULT_MODEL.to_string()),
        }
    }

    pub fn markdown_enabled(&self) -> bool {
        self.markdown.unwrap_or(true)
    }

    pub fn syntax_enabled(&self) -> bool {
        self.syntax.unwrap_or(true)
    }

    pub fn stream_timeout(&self) -> Option<Duration> {
        self.stream_timeout_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }
}

/// Get a user-friendly display string for a path
/// Converts absolute paths to use ~ notation on Unix-like systems when possible
pub fn path_display<P: AsRef<Path>>(path: P) -> String {
    let path = path.as_ref();

    #[cfg(unix)]
    {
        if let Some(home) = std::env::var_os("HOME") {
            let home_path = PathBuf::from(home);
            if let Ok(relative) = path.strip_prefix(&home_path) {
                return format!("~/{}", relative.display());
            }
        }
    }

    path.display().to_string()
}
