//! Request orchestration.
//!
//! [`Orchestrator`] is what request handlers call. For each chat request it
//! validates input, picks a model, resolves that model's provider client,
//! and opens the upstream call inside a deadline and a bounded retry loop.
//! Streamed replies are normalized to plain text and cut off after the
//! configured stream budget.
//!
//! Validation and configuration errors are returned before any timer or
//! retry is engaged.

use std::sync::{Arc, Mutex};

use tracing::{Instrument, debug, info, info_span, warn};

use crate::api::deadline::with_deadline;
use crate::api::retry::with_retry_config;
use crate::api::streaming::{ChunkStream, normalize, with_stream_deadline};
use crate::api::timeouts::TimeoutRegistry;
use crate::api::tracing::{CostTracker, generate_request_id};
use crate::catalog::openrouter::{DEFAULT_CONTEXT_LENGTH, OpenRouterCatalog};
use crate::catalog::{Model, ModelRegistry, Provider};
use crate::config::SwitchboardConfig;
use crate::error::{Error, Result};
use crate::provider::{CompletionRequest, ProviderClient, ProviderSet};
use crate::{Message, UsageInfo};

/// Longest accepted chat message, in characters.
pub const MAX_MESSAGE_CHARS: usize = 32_000;

/// An open, normalized chat stream.
pub struct ChatStream {
    pub request_id: String,
    pub model: Model,
    /// Plain-text fragments in upstream order.
    pub stream: ChunkStream,
}

impl std::fmt::Debug for ChatStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatStream")
            .field("request_id", &self.request_id)
            .field("model", &self.model.id)
            .finish_non_exhaustive()
    }
}

/// A finished, non-streamed chat reply.
#[derive(Debug, Clone)]
pub struct ChatCompletion {
    pub request_id: String,
    pub text: String,
    pub model: Model,
    pub usage: Option<UsageInfo>,
    pub estimated_cost_usd: f64,
}

/// Composes the model catalog, provider clients and failure handling.
pub struct Orchestrator {
    config: SwitchboardConfig,
    registry: ModelRegistry,
    providers: ProviderSet,
    openrouter: OpenRouterCatalog,
    timeouts: TimeoutRegistry,
    costs: Mutex<CostTracker>,
}

impl Orchestrator {
    /// Build an orchestrator with HTTP clients for every keyed provider.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if the configured default model is
    /// not in the catalog or an HTTP client cannot be built.
    pub fn new(config: SwitchboardConfig) -> Result<Self> {
        config.validate()?;
        let registry = match &config.default_model {
            Some(id) => ModelRegistry::new(ModelRegistry::builtin().models().to_vec(), id.clone())?,
            None => ModelRegistry::builtin().clone(),
        };
        let providers = ProviderSet::from_config(&config)?;
        let openrouter_key = config.api_key(Provider::OpenRouter).map(String::from);
        let openrouter = match config.base_url(Provider::OpenRouter) {
            Some(url) => OpenRouterCatalog::with_base_url(openrouter_key, url)?,
            None => OpenRouterCatalog::new(openrouter_key)?,
        };
        info!(
            "Orchestrator ready: default model {}, providers {:?}",
            registry.default_model().id,
            config.configured_providers()
        );
        Ok(Self {
            config,
            registry,
            providers,
            openrouter,
            timeouts: TimeoutRegistry::new(),
            costs: Mutex::new(CostTracker::new()),
        })
    }

    /// Replace the provider clients.
    pub fn with_providers(mut self, providers: ProviderSet) -> Self {
        self.providers = providers;
        self
    }

    /// Replace the live OpenRouter catalog client.
    pub fn with_openrouter_catalog(mut self, catalog: OpenRouterCatalog) -> Self {
        self.openrouter = catalog;
        self
    }

    pub fn config(&self) -> &SwitchboardConfig {
        &self.config
    }

    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    /// Timers guarding open streams, keyed by request id.
    pub fn timeouts(&self) -> &TimeoutRegistry {
        &self.timeouts
    }

    /// Snapshot of cumulative usage for non-streamed requests.
    pub fn costs(&self) -> CostTracker {
        self.costs
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// The static model catalog.
    pub fn list_models(&self) -> &[Model] {
        self.registry.models()
    }

    /// The live OpenRouter catalog, fetched fresh on every call.
    pub async fn list_openrouter_models(&self) -> Result<Vec<Model>> {
        self.openrouter.fetch().await
    }

    /// Open a streamed chat reply.
    ///
    /// `model` selects a catalog model or an OpenRouter `vendor/model` id;
    /// `None` recommends one from the message text.
    pub async fn stream_chat(&self, message: &str, model: Option<&str>) -> Result<ChatStream> {
        let request_id = generate_request_id();
        let span = info_span!("stream_chat", request_id = %request_id);
        async {
            let (model, client, request) = self.prepare(message, model)?;
            let timeout = self.config.request_timeout;
            let client = &client;
            let request = &request;

            let raw = with_retry_config(&self.config.retry_config(), move || {
                with_deadline(
                    client.stream(request),
                    timeout,
                    format!("{} did not start streaming within {timeout:?}", request.model),
                )
            })
            .await?;

            info!("Streaming from {} ({})", model.id, model.provider);
            let stream = with_stream_deadline(
                normalize(raw),
                &self.timeouts,
                request_id.clone(),
                self.config.stream_timeout,
            );
            Ok(ChatStream {
                request_id: request_id.clone(),
                model,
                stream,
            })
        }
        .instrument(span)
        .await
    }

    /// Generate a complete chat reply.
    pub async fn complete_chat(&self, message: &str, model: Option<&str>) -> Result<ChatCompletion> {
        let request_id = generate_request_id();
        let span = info_span!("complete_chat", request_id = %request_id);
        async {
            let (model, client, request) = self.prepare(message, model)?;
            let timeout = self.config.request_timeout;
            let client = &client;
            let request = &request;

            let completion = with_retry_config(&self.config.retry_config(), move || {
                with_deadline(
                    client.complete(request),
                    timeout,
                    format!("{} did not respond within {timeout:?}", request.model),
                )
            })
            .await?;

            let (prompt_tokens, completion_tokens) = completion
                .usage
                .as_ref()
                .map(|u| (u.prompt_tokens.unwrap_or(0), u.completion_tokens.unwrap_or(0)))
                .unwrap_or_default();
            let cost = {
                let mut costs = self
                    .costs
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner());
                let cost = costs.record(&model, prompt_tokens, completion_tokens);
                debug!("{}", costs.summary());
                cost
            };
            info!(
                "Completed with {}: {prompt_tokens} prompt + {completion_tokens} completion tokens, est. ${cost:.6}",
                model.id
            );

            Ok(ChatCompletion {
                request_id: request_id.clone(),
                text: completion.content,
                model,
                usage: completion.usage,
                estimated_cost_usd: cost,
            })
        }
        .instrument(span)
        .await
    }

    /// Cancel every pending stream deadline. Returns how many were pending.
    pub fn shutdown(&self) -> usize {
        let cancelled = self.timeouts.cancel_all();
        info!("Orchestrator shut down, {cancelled} stream timer(s) cancelled");
        cancelled
    }

    /// Validate input and resolve everything needed to call upstream.
    fn prepare(
        &self,
        message: &str,
        model: Option<&str>,
    ) -> Result<(Model, Arc<dyn ProviderClient>, CompletionRequest)> {
        let message = validate_message(message)?;
        let model = self.select_model(message, model)?;
        let client = self.providers.get(model.provider).inspect_err(|e| {
            warn!("Cannot serve {}: {e}", model.id);
        })?;
        let request = CompletionRequest {
            model: model.id.clone(),
            messages: vec![Message::user(message)],
            max_tokens: self.config.max_tokens.min(model.max_tokens),
            temperature: self.config.temperature,
        };
        Ok((model, client, request))
    }

    /// Explicit model if given, otherwise a recommendation for `message`.
    pub fn select_model(&self, message: &str, model: Option<&str>) -> Result<Model> {
        let Some(id) = model else {
            return Ok(self.registry.recommend_model(message).clone());
        };
        let id = id.trim();
        if id.is_empty() {
            return Err(Error::validation("model must not be empty"));
        }
        if let Some(found) = self.registry.get_model_by_id(id) {
            return Ok(found.clone());
        }
        if is_openrouter_id(id) {
            debug!("Passing {id} through to OpenRouter");
            return Ok(Model::new(id, id, Provider::OpenRouter, DEFAULT_CONTEXT_LENGTH, 0.0));
        }
        Err(Error::validation(format!("unknown model: {id}")))
    }
}

/// Trim and bound-check a chat message.
pub fn validate_message(message: &str) -> Result<&str> {
    let message = message.trim();
    if message.is_empty() {
        return Err(Error::validation("message is required"));
    }
    let chars = message.chars().count();
    if chars > MAX_MESSAGE_CHARS {
        return Err(Error::validation(format!(
            "message is {chars} characters, limit is {MAX_MESSAGE_CHARS}"
        )));
    }
    Ok(message)
}

/// `vendor/model` with both halves non-empty.
fn is_openrouter_id(id: &str) -> bool {
    id.split_once('/').is_some_and(|(vendor, name)| {
        !vendor.is_empty() && !name.is_empty() && !id.chars().any(char::is_whitespace)
    })
}
