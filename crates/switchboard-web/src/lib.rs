//! HTTP chat endpoints for `switchboard`.
//!
//! `switchboard-web` puts an axum server in front of an
//! [`Orchestrator`]. Chat endpoints stream plain text as it
//! arrives from the provider; catalog endpoints return JSON.
//!
//! # Quick start
//!
//! ```ignore
//! use std::sync::Arc;
//! use switchboard::config::SwitchboardConfig;
//! use switchboard::orchestrator::Orchestrator;
//! use switchboard_web::{WebConfig, spawn_web};
//!
//! let orchestrator = Arc::new(Orchestrator::new(SwitchboardConfig::from_env()?)?);
//! let (addr, server) = spawn_web(orchestrator, WebConfig::default(), std::future::pending()).await?;
//! println!("Listening on http://{addr}");
//! server.await?;
//! ```
//!
//! # Endpoints
//!
//! | Method | Path | Body | Response |
//! |--------|------|------|----------|
//! | POST | `/api/chat` | `{message}` | streamed `text/plain`, `X-Model-Id` header |
//! | POST | `/api/chat/model` | `{message, model}` | streamed `text/plain` |
//! | POST | `/api/complete` | `{message, model?}` | `{text, model, requestId, usage?, estimatedCostUsd}` |
//! | GET | `/api/models` | | `{models, count, timestamp}` |
//! | GET | `/api/models/openrouter` | | same, or `{error, message, models: []}` |
//! | GET | `/api/health` | | `{status: "ok"}` |
//!
//! Failures are `{error, message?}` with status 400 (invalid request),
//! 408 (timeout), 429 (rate limited, with `Retry-After` when known),
//! 503 (provider not configured), or 500 (provider error).

mod api;
mod error;
mod server;

pub use api::{MODEL_ID_HEADER, REQUEST_ID_HEADER};
pub use error::{ApiError, ErrorBody};
pub use server::{build_router, start_server};

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use switchboard::orchestrator::Orchestrator;
use tokio::task::JoinHandle;

/// Configuration for the web server.
pub struct WebConfig {
    /// Address to bind to. Default: `127.0.0.1:3001`.
    pub bind_addr: SocketAddr,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 3001)),
        }
    }
}

/// Spawn the web server on a Tokio task.
///
/// Returns the bound address and the server task, which ends once
/// `shutdown` resolves and in-flight requests drain.
pub async fn spawn_web<F>(
    orchestrator: Arc<Orchestrator>,
    config: WebConfig,
    shutdown: F,
) -> std::io::Result<(SocketAddr, JoinHandle<()>)>
where
    F: Future<Output = ()> + Send + 'static,
{
    let router = server::build_router(orchestrator);
    server::start_server(router, config.bind_addr, shutdown).await
}
