//! Static model registry.
//!
//! The built-in catalog is constructed once on first use and is read-only
//! afterwards, so it can be shared across tasks without locking. Lookups
//! never fail: unknown ids yield `None`, an empty capability set, or a cost
//! of zero, and [`ModelRegistry::recommend_model`] always returns a model.

use std::collections::{BTreeSet, HashSet};
use std::sync::LazyLock;

use tracing::debug;

use super::capability::*;
use super::{Model, Provider};
use crate::error::{Error, Result};

/// Model returned when no recommendation rule matches. Always present in
/// the built-in catalog.
pub const DEFAULT_MODEL_ID: &str = "gpt-3.5-turbo";

/// Preferred model for programming tasks.
pub const CODE_MODEL_ID: &str = "deepseek-coder";

/// Preferred model for analysis and research tasks.
pub const ANALYSIS_MODEL_ID: &str = "claude-3-opus-20240229";

/// Preferred model for conversational tasks.
pub const CHAT_MODEL_ID: &str = "claude-3-sonnet-20240229";

/// Keyword rules in priority order. The first rule with a keyword found in
/// the task description wins.
const RECOMMENDATION_RULES: &[(&[&str], &str)] = &[
    (&["code", "programming"], CODE_MODEL_ID),
    (&["analysis", "research"], ANALYSIS_MODEL_ID),
    (&["chat", "conversation"], CHAT_MODEL_ID),
];

static BUILTIN: LazyLock<ModelRegistry> = LazyLock::new(|| ModelRegistry {
    models: builtin_models(),
    default_model: DEFAULT_MODEL_ID.to_string(),
});

fn builtin_models() -> Vec<Model> {
    vec![
        Model::new("gpt-4", "GPT-4", Provider::OpenAi, 8_192, 0.000_03)
            .with_capabilities([CODE_GENERATION, REASONING, ANALYSIS])
            .with_description("OpenAI's most capable general-purpose model"),
        Model::new(
            "gpt-4-turbo",
            "GPT-4 Turbo",
            Provider::OpenAi,
            128_000,
            0.000_01,
        )
        .with_capabilities([CODE_GENERATION, LONG_CONTEXT, ANALYSIS])
        .with_description("GPT-4 with a 128k context window and lower pricing"),
        Model::new(
            DEFAULT_MODEL_ID,
            "GPT-3.5 Turbo",
            Provider::OpenAi,
            16_385,
            0.000_001_5,
        )
        .with_capabilities([CHAT, FAST])
        .with_description("Fast, inexpensive model for everyday tasks"),
        Model::new(
            ANALYSIS_MODEL_ID,
            "Claude 3 Opus",
            Provider::Anthropic,
            200_000,
            0.000_015,
        )
        .with_capabilities([LONG_CONTEXT, REASONING, ANALYSIS, RESEARCH])
        .with_description("Anthropic's strongest model for deep analysis and research"),
        Model::new(
            CHAT_MODEL_ID,
            "Claude 3 Sonnet",
            Provider::Anthropic,
            200_000,
            0.000_003,
        )
        .with_capabilities([LONG_CONTEXT, CHAT, ANALYSIS, CREATIVE])
        .with_description("Balanced intelligence and speed for conversation"),
        Model::new(
            "claude-3-haiku-20240307",
            "Claude 3 Haiku",
            Provider::Anthropic,
            200_000,
            0.000_000_25,
        )
        .with_capabilities([LONG_CONTEXT, CHAT, FAST])
        .with_description("Anthropic's fastest, most compact model"),
        Model::new(
            "deepseek-chat",
            "DeepSeek Chat",
            Provider::DeepSeek,
            64_000,
            0.000_000_14,
        )
        .with_capabilities([CHAT, REASONING])
        .with_description("General conversation model from DeepSeek"),
        Model::new(
            CODE_MODEL_ID,
            "DeepSeek Coder",
            Provider::DeepSeek,
            64_000,
            0.000_000_14,
        )
        .with_capabilities([CODE_GENERATION, REASONING])
        .with_description("DeepSeek model tuned for programming tasks"),
    ]
}

/// Read-only catalog of known models.
#[derive(Debug, Clone)]
pub struct ModelRegistry {
    models: Vec<Model>,
    default_model: String,
}

impl ModelRegistry {
    /// The process-wide built-in catalog.
    pub fn builtin() -> &'static ModelRegistry {
        &BUILTIN
    }

    /// Build a custom registry.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if two models share an id or if
    /// `default_model` is not one of `models`.
    pub fn new(models: Vec<Model>, default_model: impl Into<String>) -> Result<Self> {
        let default_model = default_model.into();
        let mut seen = HashSet::new();
        for model in &models {
            if !seen.insert(model.id.as_str()) {
                return Err(Error::configuration(format!(
                    "duplicate model id in registry: {}",
                    model.id
                )));
            }
        }
        if !seen.contains(default_model.as_str()) {
            return Err(Error::configuration(format!(
                "default model {default_model} is not in the registry"
            )));
        }
        Ok(Self {
            models,
            default_model,
        })
    }

    /// All models in registry order.
    pub fn models(&self) -> &[Model] {
        &self.models
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    pub fn default_model(&self) -> &Model {
        // `new` and the built-in catalog both guarantee presence.
        self.get_model_by_id(&self.default_model)
            .unwrap_or(&self.models[0])
    }

    pub fn get_model_by_id(&self, id: &str) -> Option<&Model> {
        self.models.iter().find(|m| m.id == id)
    }

    pub fn get_models_by_provider(&self, provider: Provider) -> Vec<&Model> {
        self.models
            .iter()
            .filter(|m| m.provider == provider)
            .collect()
    }

    /// Capability tags of a model; empty for unknown ids.
    pub fn get_model_capabilities(&self, id: &str) -> BTreeSet<String> {
        self.get_model_by_id(id)
            .map(|m| m.capabilities.clone())
            .unwrap_or_default()
    }

    /// `(input + output) * cost_per_token`, or `0.0` for unknown ids.
    pub fn estimate_cost(&self, id: &str, input_tokens: u32, output_tokens: u32) -> f64 {
        self.get_model_by_id(id)
            .map_or(0.0, |m| m.estimate_cost(input_tokens, output_tokens))
    }

    /// Pick a model for a free-form task description.
    ///
    /// Case-insensitive keyword match in priority order: code, analysis,
    /// chat. Falls back to the default model when nothing matches or when
    /// the preferred model is missing from this registry.
    pub fn recommend_model(&self, task_description: &str) -> &Model {
        let task = task_description.to_lowercase();
        let preferred = RECOMMENDATION_RULES
            .iter()
            .find(|(keywords, _)| keywords.iter().any(|k| task.contains(k)))
            .map(|(_, id)| *id);

        if let Some(id) = preferred {
            if let Some(model) = self.get_model_by_id(id) {
                debug!("Recommended {id} for task");
                return model;
            }
            debug!("Preferred model {id} not registered, using default");
        }
        self.default_model()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_ids_are_unique() {
        let reg = ModelRegistry::builtin();
        let rebuilt = ModelRegistry::new(reg.models().to_vec(), DEFAULT_MODEL_ID);
        assert!(rebuilt.is_ok());
        assert!(reg.get_model_by_id(DEFAULT_MODEL_ID).is_some());
    }

    #[test]
    fn lookup_by_id() {
        let reg = ModelRegistry::builtin();
        assert_eq!(reg.get_model_by_id("gpt-4").unwrap().name, "GPT-4");
        assert!(reg.get_model_by_id("gpt-5-ultra").is_none());
        assert!(reg.get_model_by_id("GPT-4").is_none());
    }

    #[test]
    fn filter_by_provider_preserves_order() {
        let reg = ModelRegistry::builtin();
        let ids: Vec<&str> = reg
            .get_models_by_provider(Provider::OpenAi)
            .iter()
            .map(|m| m.id.as_str())
            .collect();
        assert_eq!(ids, vec!["gpt-4", "gpt-4-turbo", "gpt-3.5-turbo"]);
        assert!(reg.get_models_by_provider(Provider::OpenRouter).is_empty());
    }

    #[test]
    fn capabilities_for_unknown_model_are_empty() {
        let reg = ModelRegistry::builtin();
        assert!(reg.get_model_capabilities("nope").is_empty());
        assert!(reg.get_model_capabilities(CODE_MODEL_ID).contains(CODE_GENERATION));
    }

    #[test]
    fn cost_estimation() {
        let reg = ModelRegistry::builtin();
        let cost = reg.estimate_cost("gpt-4", 1000, 500);
        assert!((cost - 1500.0 * 0.000_03).abs() < 1e-12);
        assert_eq!(reg.estimate_cost("unknown-id", 1000, 500), 0.0);
    }

    #[test]
    fn recommendation_rules() {
        let reg = ModelRegistry::builtin();
        assert_eq!(reg.recommend_model("write code for a parser").id, CODE_MODEL_ID);
        assert_eq!(reg.recommend_model("Programming help").id, CODE_MODEL_ID);
        assert_eq!(
            reg.recommend_model("market RESEARCH please").id,
            ANALYSIS_MODEL_ID
        );
        assert_eq!(reg.recommend_model("let's chat").id, CHAT_MODEL_ID);
        assert_eq!(reg.recommend_model("summarize this").id, DEFAULT_MODEL_ID);
    }

    #[test]
    fn recommendation_priority_prefers_code() {
        let reg = ModelRegistry::builtin();
        assert_eq!(
            reg.recommend_model("chat about code analysis").id,
            CODE_MODEL_ID
        );
        assert_eq!(
            reg.recommend_model("conversation analysis").id,
            ANALYSIS_MODEL_ID
        );
    }

    #[test]
    fn recommendation_falls_back_when_preferred_missing() {
        let reg = ModelRegistry::new(
            vec![Model::new("only", "Only", Provider::OpenAi, 100, 0.0)],
            "only",
        )
        .unwrap();
        assert_eq!(reg.recommend_model("write code").id, "only");
    }

    #[test]
    fn new_rejects_duplicates_and_missing_default() {
        let m = Model::new("a", "A", Provider::OpenAi, 100, 0.0);
        assert!(ModelRegistry::new(vec![m.clone(), m.clone()], "a").is_err());
        assert!(ModelRegistry::new(vec![m], "b").is_err());
    }
}
