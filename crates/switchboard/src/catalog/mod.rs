//! Model catalog: what models exist, who serves them, and what they cost.
//!
//! - [`registry`]: the static [`ModelRegistry`] loaded once at startup,
//!   with lookup, filtering, cost estimation, and task-based recommendation.
//! - [`openrouter`]: live OpenRouter catalog, fetched per request and
//!   mapped into the same [`Model`] shape without touching the static
//!   registry.

pub mod openrouter;
pub mod registry;

pub use openrouter::OpenRouterCatalog;
pub use registry::{DEFAULT_MODEL_ID, ModelRegistry};

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Capability tags used by the built-in catalog and the OpenRouter mapping.
pub mod capability {
    pub const CODE_GENERATION: &str = "code-generation";
    pub const LONG_CONTEXT: &str = "long-context";
    pub const REASONING: &str = "reasoning";
    pub const ANALYSIS: &str = "analysis";
    pub const RESEARCH: &str = "research";
    pub const CREATIVE: &str = "creative";
    pub const CHAT: &str = "chat";
    pub const FAST: &str = "fast";
    pub const MULTIMODAL: &str = "multimodal";
}

/// An upstream LLM vendor.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    OpenAi,
    Anthropic,
    DeepSeek,
    OpenRouter,
}

impl Provider {
    pub const ALL: [Provider; 4] = [
        Provider::OpenAi,
        Provider::Anthropic,
        Provider::DeepSeek,
        Provider::OpenRouter,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Provider::OpenAi => "openai",
            Provider::Anthropic => "anthropic",
            Provider::DeepSeek => "deepseek",
            Provider::OpenRouter => "openrouter",
        }
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Provider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Provider::ALL
            .into_iter()
            .find(|p| p.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown provider: {s}"))
    }
}

/// A model a request can be routed to.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Model {
    pub id: String,
    pub name: String,
    pub provider: Provider,
    /// Provider context limit, in tokens.
    pub max_tokens: u32,
    /// Blended price in USD per token.
    pub cost_per_token: f64,
    pub capabilities: BTreeSet<String>,
    pub description: String,
}

impl Model {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        provider: Provider,
        max_tokens: u32,
        cost_per_token: f64,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            provider,
            max_tokens,
            cost_per_token,
            capabilities: BTreeSet::new(),
            description: String::new(),
        }
    }

    pub fn with_capabilities<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.capabilities.extend(tags.into_iter().map(Into::into));
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn has_capability(&self, tag: &str) -> bool {
        self.capabilities.contains(tag)
    }

    /// Cost of a request with the given token counts.
    pub fn estimate_cost(&self, input_tokens: u32, output_tokens: u32) -> f64 {
        (u64::from(input_tokens) + u64::from(output_tokens)) as f64 * self.cost_per_token
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_round_trips_through_strings() {
        for p in Provider::ALL {
            assert_eq!(p.as_str().parse::<Provider>().unwrap(), p);
        }
        assert_eq!("OpenAI".parse::<Provider>().unwrap(), Provider::OpenAi);
        assert!("mistral".parse::<Provider>().is_err());
    }

    #[test]
    fn model_serializes_camel_case() {
        let model = Model::new("m", "M", Provider::DeepSeek, 1000, 0.5)
            .with_capabilities(["chat"])
            .with_description("test");
        let json = serde_json::to_value(&model).unwrap();
        assert_eq!(json["provider"], "deepseek");
        assert_eq!(json["maxTokens"], 1000);
        assert_eq!(json["costPerToken"], 0.5);
        assert_eq!(json["capabilities"][0], "chat");
    }

    #[test]
    fn capabilities_are_a_set() {
        let model = Model::new("m", "M", Provider::OpenAi, 1, 0.0).with_capabilities([
            "chat",
            "fast",
            "chat",
        ]);
        assert_eq!(model.capabilities.len(), 2);
        assert!(model.has_capability("fast"));
    }
}
