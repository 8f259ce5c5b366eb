//! Convenience re-exports for common `switchboard` types.
//!
//! ```ignore
//! use switchboard::prelude::*;
//! ```
//!
//! Wire-level pieces (SSE decoding, stream part parsing, OpenRouter records)
//! are left out; import those from their modules directly.

// ── Core types ──────────────────────────────────────────────────────
pub use crate::{Error, ErrorKind, Message, MessageRole, Result, UsageInfo};

// ── Catalog ─────────────────────────────────────────────────────────
pub use crate::catalog::{Model, ModelRegistry, OpenRouterCatalog, Provider};

// ── Failure handling ────────────────────────────────────────────────
pub use crate::api::{
    ChunkStream, RetryConfig, RetryPolicy, TimeoutHandle, TimeoutRegistry, collect_text,
    normalize, with_deadline, with_retry, with_retry_config,
};

// ── Orchestration ───────────────────────────────────────────────────
pub use crate::config::SwitchboardConfig;
pub use crate::orchestrator::{ChatCompletion, ChatStream, Orchestrator};
pub use crate::provider::{CompletionRequest, ProviderClient, ProviderSet};
