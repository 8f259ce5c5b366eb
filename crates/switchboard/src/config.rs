//! Runtime configuration.
//!
//! [`SwitchboardConfig`] carries provider credentials, timing limits, and
//! the error-exposure switch. Build it with [`SwitchboardConfig::from_env`]
//! in binaries, or from [`Default`] plus `with_*` methods in tests.

use std::collections::HashMap;
use std::time::Duration;

use crate::api::retry::{RetryConfig, RetryPolicy};
use crate::catalog::Provider;
use crate::error::{Error, Result};

/// Environment variable holding each provider's API key.
pub fn api_key_var(provider: Provider) -> &'static str {
    match provider {
        Provider::OpenAi => "OPENAI_API_KEY",
        Provider::Anthropic => "ANTHROPIC_API_KEY",
        Provider::DeepSeek => "DEEPSEEK_API_KEY",
        Provider::OpenRouter => "OPENROUTER_API_KEY",
    }
}

/// Optional environment variable overriding each provider's base URL.
pub fn base_url_var(provider: Provider) -> &'static str {
    match provider {
        Provider::OpenAi => "OPENAI_BASE_URL",
        Provider::Anthropic => "ANTHROPIC_BASE_URL",
        Provider::DeepSeek => "DEEPSEEK_BASE_URL",
        Provider::OpenRouter => "OPENROUTER_BASE_URL",
    }
}

pub const REQUEST_TIMEOUT_VAR: &str = "SWITCHBOARD_REQUEST_TIMEOUT_MS";
pub const STREAM_TIMEOUT_VAR: &str = "SWITCHBOARD_STREAM_TIMEOUT_MS";
pub const MAX_RETRIES_VAR: &str = "SWITCHBOARD_MAX_RETRIES";
pub const RETRY_BASE_DELAY_VAR: &str = "SWITCHBOARD_RETRY_BASE_DELAY_MS";
pub const EXPOSE_ERRORS_VAR: &str = "SWITCHBOARD_EXPOSE_ERRORS";
pub const DEFAULT_MODEL_VAR: &str = "SWITCHBOARD_DEFAULT_MODEL";
pub const MAX_TOKENS_VAR: &str = "SWITCHBOARD_MAX_TOKENS";

/// Orchestration settings.
#[derive(Debug, Clone)]
pub struct SwitchboardConfig {
    api_keys: HashMap<Provider, String>,
    base_urls: HashMap<Provider, String>,
    /// Deadline for a provider to accept a request (and, for non-streamed
    /// calls, to finish it). Default: 30s.
    pub request_timeout: Duration,
    /// Total wall-clock budget for a streamed response. Default: 120s.
    pub stream_timeout: Duration,
    /// Retries after the first failed attempt. Default: `2`.
    pub max_retries: u32,
    /// Backoff before the first retry; doubles per retry. Default: 1s.
    pub retry_base_delay: Duration,
    /// Include raw internal error messages in HTTP error bodies.
    /// Default: `false`.
    pub expose_errors: bool,
    /// Model used when a request names none and no recommendation applies
    /// by keyword. `None` means the catalog default.
    pub default_model: Option<String>,
    /// Output token cap sent upstream. Default: `2048`.
    pub max_tokens: u32,
    /// Sampling temperature. Default: `0.7`.
    pub temperature: f32,
}

impl Default for SwitchboardConfig {
    fn default() -> Self {
        Self {
            api_keys: HashMap::new(),
            base_urls: HashMap::new(),
            request_timeout: Duration::from_secs(30),
            stream_timeout: Duration::from_secs(120),
            max_retries: 2,
            retry_base_delay: Duration::from_millis(1000),
            expose_errors: false,
            default_model: None,
            max_tokens: 2048,
            temperature: 0.7,
        }
    }
}

impl SwitchboardConfig {
    /// Read configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if a numeric or boolean variable is
    /// set but unparseable.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read configuration through an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let mut config = Self::default();

        for provider in Provider::ALL {
            if let Some(key) = get(api_key_var(provider)) {
                config.api_keys.insert(provider, key.trim().to_string());
            }
            if let Some(url) = get(base_url_var(provider)) {
                config.base_urls.insert(provider, url.trim().to_string());
            }
        }

        if let Some(ms) = get(REQUEST_TIMEOUT_VAR) {
            config.request_timeout = Duration::from_millis(parse_num(REQUEST_TIMEOUT_VAR, &ms)?);
        }
        if let Some(ms) = get(STREAM_TIMEOUT_VAR) {
            config.stream_timeout = Duration::from_millis(parse_num(STREAM_TIMEOUT_VAR, &ms)?);
        }
        if let Some(n) = get(MAX_RETRIES_VAR) {
            config.max_retries = parse_num(MAX_RETRIES_VAR, &n)?;
        }
        if let Some(ms) = get(RETRY_BASE_DELAY_VAR) {
            config.retry_base_delay = Duration::from_millis(parse_num(RETRY_BASE_DELAY_VAR, &ms)?);
        }
        if let Some(n) = get(MAX_TOKENS_VAR) {
            config.max_tokens = parse_num(MAX_TOKENS_VAR, &n)?;
        }
        if let Some(flag) = get(EXPOSE_ERRORS_VAR) {
            config.expose_errors = parse_bool(EXPOSE_ERRORS_VAR, &flag)?;
        }
        config.default_model = get(DEFAULT_MODEL_VAR).map(|m| m.trim().to_string());

        config.validate()?;
        Ok(config)
    }

    /// Check limits that overrides applied after loading may have broken.
    pub fn validate(&self) -> Result<()> {
        if self.request_timeout.is_zero() {
            return Err(Error::configuration(format!(
                "{REQUEST_TIMEOUT_VAR} must be greater than zero"
            )));
        }
        Ok(())
    }

    pub fn api_key(&self, provider: Provider) -> Option<&str> {
        self.api_keys.get(&provider).map(String::as_str)
    }

    pub fn base_url(&self, provider: Provider) -> Option<&str> {
        self.base_urls.get(&provider).map(String::as_str)
    }

    /// Providers with credentials, in catalog order.
    pub fn configured_providers(&self) -> Vec<Provider> {
        Provider::ALL
            .into_iter()
            .filter(|p| self.api_keys.contains_key(p))
            .collect()
    }

    /// Retry settings for provider calls. Only transient failures retry.
    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig::new(self.max_retries, self.retry_base_delay)
            .with_policy(RetryPolicy::TransientOnly)
    }

    pub fn with_api_key(mut self, provider: Provider, key: impl Into<String>) -> Self {
        self.api_keys.insert(provider, key.into());
        self
    }

    pub fn with_base_url(mut self, provider: Provider, url: impl Into<String>) -> Self {
        self.base_urls.insert(provider, url.into());
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_stream_timeout(mut self, timeout: Duration) -> Self {
        self.stream_timeout = timeout;
        self
    }

    pub fn with_retries(mut self, max_retries: u32, base_delay: Duration) -> Self {
        self.max_retries = max_retries;
        self.retry_base_delay = base_delay;
        self
    }

    pub fn with_expose_errors(mut self, expose: bool) -> Self {
        self.expose_errors = expose;
        self
    }

    pub fn with_default_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = Some(model.into());
        self
    }
}

fn parse_num<T: std::str::FromStr>(name: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| Error::configuration(format!("{name} must be a non-negative integer, got {value:?}")))
}

fn parse_bool(name: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(Error::configuration(format!(
            "{name} must be a boolean, got {value:?}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn defaults() {
        let config = SwitchboardConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.request_timeout, Duration::from_secs(30));
        assert_eq!(config.max_retries, 2);
        assert!(!config.expose_errors);
        assert!(config.configured_providers().is_empty());
        assert_eq!(config.retry_config().policy, RetryPolicy::TransientOnly);
    }

    #[test]
    fn reads_keys_and_limits() {
        let config = SwitchboardConfig::from_lookup(lookup(&[
            ("OPENAI_API_KEY", "sk-1"),
            ("ANTHROPIC_API_KEY", "  "),
            ("DEEPSEEK_BASE_URL", "http://localhost:1234/v1"),
            (REQUEST_TIMEOUT_VAR, "5000"),
            (MAX_RETRIES_VAR, "0"),
            (EXPOSE_ERRORS_VAR, "true"),
            (DEFAULT_MODEL_VAR, "gpt-4"),
        ]))
        .unwrap();
        assert_eq!(config.api_key(Provider::OpenAi), Some("sk-1"));
        assert_eq!(config.api_key(Provider::Anthropic), None);
        assert_eq!(
            config.base_url(Provider::DeepSeek),
            Some("http://localhost:1234/v1")
        );
        assert_eq!(config.request_timeout, Duration::from_millis(5000));
        assert_eq!(config.max_retries, 0);
        assert!(config.expose_errors);
        assert_eq!(config.default_model.as_deref(), Some("gpt-4"));
        assert_eq!(config.configured_providers(), vec![Provider::OpenAi]);
    }

    #[test]
    fn malformed_values_are_configuration_errors() {
        let err = SwitchboardConfig::from_lookup(lookup(&[(MAX_RETRIES_VAR, "lots")])).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Configuration);
        assert!(SwitchboardConfig::from_lookup(lookup(&[(EXPOSE_ERRORS_VAR, "maybe")])).is_err());
        assert!(SwitchboardConfig::from_lookup(lookup(&[(REQUEST_TIMEOUT_VAR, "0")])).is_err());
    }

    #[test]
    fn validate_catches_overrides() {
        let config = SwitchboardConfig::default().with_request_timeout(Duration::ZERO);
        assert_eq!(
            config.validate().unwrap_err().kind(),
            crate::error::ErrorKind::Configuration
        );
        assert!(SwitchboardConfig::default().validate().is_ok());
    }
}
