//! Request orchestration core for multi-provider LLM chat.
//!
//! `switchboard` sits between an HTTP front end and a handful of LLM vendors
//! (OpenAI, Anthropic, DeepSeek, OpenRouter). Given a chat message it picks a
//! model from a static catalog, calls that model's provider, and hands back
//! either a complete reply or a stream of plain-text fragments. Every
//! upstream call runs under a hard deadline and a bounded retry loop, and
//! every stream is cut off after a wall-clock budget.
//!
//! # Getting started
//!
//! ```ignore
//! use switchboard::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> switchboard::Result<()> {
//!     let config = SwitchboardConfig::from_env()?;
//!     let orchestrator = Orchestrator::new(config)?;
//!
//!     let chat = orchestrator.stream_chat("write code for a parser", None).await?;
//!     println!("model: {}", chat.model.id);
//!     let text = collect_text(chat.stream).await?;
//!     println!("{text}");
//!
//!     orchestrator.shutdown();
//!     Ok(())
//! }
//! ```
//!
//! # Where to find things
//!
//! - **Pick or price a model:** [`ModelRegistry`](catalog::ModelRegistry)
//!   for the built-in catalog, keyword recommendation, and cost estimates;
//!   [`OpenRouterCatalog`](catalog::OpenRouterCatalog) for the live
//!   OpenRouter listing mapped into the same [`Model`](catalog::Model) shape.
//!
//! - **Bound an operation in time:** [`with_deadline`](api::with_deadline)
//!   for a single call, [`TimeoutRegistry`](api::TimeoutRegistry) for keyed
//!   timers that replace rather than stack.
//!
//! - **Retry flaky calls:** [`with_retry`](api::with_retry) and
//!   [`with_retry_config`](api::with_retry_config).
//!
//! - **Turn provider stream parts into text:** [`normalize`](api::normalize).
//!
//! - **Call a vendor:** the [`ProviderClient`](provider::ProviderClient)
//!   trait and the bundled clients in [`provider`].
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`catalog`] | Static model registry, recommendation, cost, live OpenRouter catalog |
//! | [`api`] | Timeout registry, deadline wrapper, retry with backoff, stream normalizer, request ids |
//! | [`provider`] | Provider client trait, OpenAI-compatible and Anthropic clients, SSE decoding |
//! | [`orchestrator`] | [`Orchestrator`](orchestrator::Orchestrator), composing the above per request |
//! | [`config`] | [`SwitchboardConfig`](config::SwitchboardConfig) and environment loading |
//! | [`error`] | [`Error`] taxonomy and HTTP status classification |

pub mod api;
pub mod catalog;
pub mod config;
pub mod error;
pub mod orchestrator;
pub mod prelude;
pub mod provider;

use serde::{Deserialize, Serialize};

pub use error::{Error, ErrorKind, Result};

// ── Message types ──────────────────────────────────────────────────

/// Role of a message in the conversation.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
}

impl std::fmt::Display for MessageRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MessageRole::System => write!(f, "system"),
            MessageRole::User => write!(f, "user"),
        }
    }
}

/// A message in the conversation.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }
}

/// Token usage statistics.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UsageInfo {
    #[serde(alias = "prompt_tokens")]
    pub prompt_tokens: Option<u32>,
    #[serde(alias = "completion_tokens")]
    pub completion_tokens: Option<u32>,
    #[serde(alias = "total_tokens")]
    pub total_tokens: Option<u32>,
}
