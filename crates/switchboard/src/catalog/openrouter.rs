//! Live OpenRouter model catalog.
//!
//! The `/models` listing is external data: any field may be missing or of
//! an unexpected type. Each entry is parsed independently into an
//! [`OpenRouterModelRecord`] with every field optional, then mapped into a
//! [`Model`]. A single bad entry is skipped with a warning; it never fails
//! the whole fetch.

use std::time::{Duration, Instant};

use serde::Deserialize;
use tracing::{debug, warn};

use super::capability::*;
use super::{Model, Provider};
use crate::error::{Error, Result};
use crate::provider::openai::OPENROUTER_API_BASE;

/// Context length assumed when an entry does not report one.
pub const DEFAULT_CONTEXT_LENGTH: u32 = 4_096;

/// Envelope of the `/models` response.
#[derive(Deserialize, Debug)]
struct ModelListing {
    #[serde(default)]
    data: Vec<serde_json::Value>,
}

/// One entry of the OpenRouter listing, with nothing assumed present.
#[derive(Deserialize, Debug, Default, Clone, PartialEq)]
pub struct OpenRouterModelRecord {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub context_length: Option<serde_json::Value>,
    #[serde(default)]
    pub pricing: Option<OpenRouterPricing>,
}

/// Prices in USD per million tokens. OpenRouter sends these as strings,
/// but numbers are accepted too.
#[derive(Deserialize, Debug, Default, Clone, PartialEq)]
pub struct OpenRouterPricing {
    #[serde(default)]
    pub prompt: Option<serde_json::Value>,
    #[serde(default)]
    pub completion: Option<serde_json::Value>,
}

fn number_of(value: Option<&serde_json::Value>) -> Option<f64> {
    match value? {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

impl OpenRouterModelRecord {
    /// Map into the internal model shape. Returns `None` only when the
    /// entry has no usable id.
    pub fn into_model(self) -> Option<Model> {
        let id = self.id.filter(|id| !id.trim().is_empty())?;
        let name = self.name.unwrap_or_else(|| id.clone());
        let description = self.description.unwrap_or_default();

        let (prompt, completion) = self.pricing.map_or((0.0, 0.0), |p| {
            (
                number_of(p.prompt.as_ref()).unwrap_or(0.0),
                number_of(p.completion.as_ref()).unwrap_or(0.0),
            )
        });
        let cost_per_token = ((prompt + completion) / 2.0 / 1_000_000.0).max(0.0);

        let max_tokens = number_of(self.context_length.as_ref())
            .filter(|n| *n >= 1.0)
            .map_or(DEFAULT_CONTEXT_LENGTH, |n| n.min(f64::from(u32::MAX)) as u32);

        let capabilities = derive_capabilities(&name, &description);

        Some(
            Model::new(id, name, Provider::OpenRouter, max_tokens, cost_per_token)
                .with_capabilities(capabilities)
                .with_description(description),
        )
    }
}

/// Capability tags inferred from a model's name and description.
pub fn derive_capabilities(name: &str, description: &str) -> Vec<&'static str> {
    let text = format!("{name} {description}").to_lowercase();
    let mut tags = Vec::new();
    if text.contains("code") {
        tags.push(CODE_GENERATION);
    }
    if ["vision", "image", "multimodal"]
        .iter()
        .any(|k| text.contains(k))
    {
        tags.push(MULTIMODAL);
    }
    if text.contains("research") || text.contains("web") {
        tags.push(RESEARCH);
    }
    if text.contains("reasoning") || text.contains("think") {
        tags.push(REASONING);
    }
    if tags.is_empty() {
        tags.extend([ANALYSIS, CREATIVE]);
    }
    tags
}

/// Parse a raw `/models` response body into models, in listing order.
///
/// # Errors
///
/// Fails only when the body is not a JSON object at all. Individual
/// entries that cannot be mapped are skipped.
pub fn models_from_response(body: &str) -> Result<Vec<Model>> {
    let listing: ModelListing = serde_json::from_str(body)
        .map_err(|e| Error::provider(format!("failed to parse OpenRouter model list: {e}")))?;

    let total = listing.data.len();
    let models: Vec<Model> = listing
        .data
        .into_iter()
        .filter_map(|entry| {
            match serde_json::from_value::<OpenRouterModelRecord>(entry) {
                Ok(record) => record.into_model(),
                Err(e) => {
                    warn!("Skipping unreadable OpenRouter model entry: {e}");
                    None
                }
            }
        })
        .collect();

    if models.len() < total {
        warn!(
            "Mapped {} of {} OpenRouter model entries",
            models.len(),
            total
        );
    }
    Ok(models)
}

/// Client for the OpenRouter model listing.
pub struct OpenRouterCatalog {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl OpenRouterCatalog {
    pub fn new(api_key: Option<String>) -> Result<Self> {
        Self::with_base_url(api_key, OPENROUTER_API_BASE)
    }

    pub fn with_base_url(api_key: Option<String>, base_url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("switchboard/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| Error::configuration(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
        })
    }

    /// Fetch and map the live catalog. Nothing is cached.
    pub async fn fetch(&self) -> Result<Vec<Model>> {
        let url = format!("{}/models", self.base_url);
        debug!("Fetching OpenRouter catalog from {url}");
        let start = Instant::now();

        let mut request = self.client.get(&url);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }
        let resp = request.send().await?;

        let status = resp.status();
        let text = resp.text().await?;
        if !status.is_success() {
            return Err(Error::from_status(status.as_u16(), &text, None));
        }

        let models = models_from_response(&text)?;
        debug!(
            "OpenRouter catalog: {} models in {:.1}s",
            models.len(),
            start.elapsed().as_secs_f64()
        );
        Ok(models)
    }
}
