//! Provider client boundary.
//!
//! A [`ProviderClient`] turns a [`CompletionRequest`] into either a single
//! [`Completion`] or a raw [`ChunkStream`] of framed stream parts. The
//! orchestrator never talks HTTP itself; it only sees this trait, which
//! keeps the bundled clients swappable for fakes in tests.
//!
//! - [`openai`]: OpenAI-compatible chat completions (OpenAI, DeepSeek,
//!   OpenRouter).
//! - [`anthropic`]: Anthropic Messages API.
//! - [`sse`]: upstream SSE decoding and re-framing shared by both.

pub mod anthropic;
pub mod openai;
pub mod sse;

pub use anthropic::AnthropicClient;
pub use openai::OpenAiCompatibleClient;

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use crate::api::streaming::ChunkStream;
use crate::catalog::Provider;
use crate::config::SwitchboardConfig;
use crate::error::{Error, Result};
use crate::{Message, UsageInfo};

/// Boxed future returned by [`ProviderClient`] methods.
///
/// Type alias to keep trait signatures and implementations readable.
pub type ProviderFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// A provider-agnostic generation request.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<Message>,
    pub max_tokens: u32,
    pub temperature: f32,
}

/// A finished, non-streamed generation.
#[derive(Debug, Clone)]
pub struct Completion {
    pub content: String,
    /// Model that actually served the request (may differ from requested).
    pub model: String,
    pub usage: Option<UsageInfo>,
    pub finish_reason: Option<String>,
}

/// Interface every upstream LLM client implements.
pub trait ProviderClient: Send + Sync {
    fn provider(&self) -> Provider;

    /// Generate a single completion.
    fn complete<'a>(&'a self, request: &'a CompletionRequest) -> ProviderFuture<'a, Completion>;

    /// Open a streamed generation. Resolves once the upstream has accepted
    /// the request; chunks then arrive through the returned stream.
    fn stream<'a>(&'a self, request: &'a CompletionRequest) -> ProviderFuture<'a, ChunkStream>;
}

/// Clients keyed by provider.
#[derive(Clone, Default)]
pub struct ProviderSet {
    clients: HashMap<Provider, Arc<dyn ProviderClient>>,
}

impl std::fmt::Debug for ProviderSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut configured: Vec<_> = self.clients.keys().collect();
        configured.sort();
        f.debug_struct("ProviderSet")
            .field("configured", &configured)
            .finish()
    }
}

impl ProviderSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build clients for every provider that has credentials in `config`.
    ///
    /// Providers without credentials are simply absent; requesting one later
    /// fails with [`Error::Configuration`].
    pub fn from_config(config: &SwitchboardConfig) -> Result<Self> {
        let mut set = Self::new();
        for provider in Provider::ALL {
            let Some(api_key) = config.api_key(provider) else {
                continue;
            };
            let client: Arc<dyn ProviderClient> = match provider {
                Provider::Anthropic => Arc::new(AnthropicClient::new(
                    api_key,
                    config.base_url(provider),
                    config.request_timeout,
                )?),
                _ => Arc::new(OpenAiCompatibleClient::new(
                    provider,
                    api_key,
                    config.base_url(provider),
                    config.request_timeout,
                )?),
            };
            set.clients.insert(provider, client);
        }
        Ok(set)
    }

    pub fn with_client(mut self, client: Arc<dyn ProviderClient>) -> Self {
        self.clients.insert(client.provider(), client);
        self
    }

    pub fn is_configured(&self, provider: Provider) -> bool {
        self.clients.contains_key(&provider)
    }

    pub fn get(&self, provider: Provider) -> Result<Arc<dyn ProviderClient>> {
        self.clients.get(&provider).cloned().ok_or_else(|| {
            Error::configuration(format!("provider {provider} has no API key configured"))
        })
    }
}

/// Parse a `Retry-After` header given in seconds.
pub(crate) fn retry_after(headers: &reqwest::header::HeaderMap) -> Option<Duration> {
    headers
        .get(reqwest::header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

/// Pass successful responses through; turn anything else into an [`Error`].
pub(crate) async fn check_status(
    resp: reqwest::Response,
    provider: Provider,
) -> Result<reqwest::Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let wait = retry_after(resp.headers());
    let text = resp.text().await.unwrap_or_default();
    Err(Error::from_status(
        status.as_u16(),
        &format!("{provider} API: {}", text.trim()),
        wait,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::{HeaderMap, HeaderValue, RETRY_AFTER};

    #[test]
    fn retry_after_seconds() {
        let mut headers = HeaderMap::new();
        assert_eq!(retry_after(&headers), None);
        headers.insert(RETRY_AFTER, HeaderValue::from_static("12"));
        assert_eq!(retry_after(&headers), Some(Duration::from_secs(12)));
        headers.insert(
            RETRY_AFTER,
            HeaderValue::from_static("Wed, 21 Oct 2015 07:28:00 GMT"),
        );
        assert_eq!(retry_after(&headers), None);
    }

    #[test]
    fn missing_provider_is_configuration_error() {
        let set = ProviderSet::new();
        assert!(!set.is_configured(Provider::OpenAi));
        let err = set.get(Provider::OpenAi).err().unwrap();
        assert_eq!(err.kind(), crate::error::ErrorKind::Configuration);
    }

    #[test]
    fn from_config_only_builds_keyed_providers() {
        let config = SwitchboardConfig::default()
            .with_api_key(Provider::DeepSeek, "sk-test")
            .with_api_key(Provider::Anthropic, "sk-ant");
        let set = ProviderSet::from_config(&config).unwrap();
        assert!(set.is_configured(Provider::DeepSeek));
        assert!(set.is_configured(Provider::Anthropic));
        assert!(!set.is_configured(Provider::OpenAi));
        assert_eq!(set.get(Provider::DeepSeek).unwrap().provider(), Provider::DeepSeek);
    }
}
