//! Axum server setup and router construction.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use switchboard::orchestrator::Orchestrator;
use tokio::task::JoinHandle;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::api::{self, AppState};

/// Build the full axum router.
///
/// The router serves the REST API at `/api/*`.
pub fn build_router(orchestrator: Arc<Orchestrator>) -> Router {
    let app_state = AppState { orchestrator };

    // Browser front ends are usually served from another origin.
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
        .expose_headers([api::MODEL_ID_HEADER, api::REQUEST_ID_HEADER]);

    Router::new()
        .route("/api/chat", post(api::post_chat))
        .route("/api/chat/model", post(api::post_chat_model))
        .route("/api/complete", post(api::post_complete))
        .route("/api/models", get(api::get_models))
        .route("/api/models/openrouter", get(api::get_openrouter_models))
        .route("/api/health", get(api::get_health))
        .with_state(app_state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

/// Bind `bind_addr` and serve `router` on a Tokio task until `shutdown`
/// resolves.
///
/// Returns the bound address (useful with port 0) and the server task.
pub async fn start_server<F>(
    router: Router,
    bind_addr: SocketAddr,
    shutdown: F,
) -> std::io::Result<(SocketAddr, JoinHandle<()>)>
where
    F: Future<Output = ()> + Send + 'static,
{
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    let addr = listener.local_addr()?;
    info!("Listening on http://{addr}");

    let task = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, router)
            .with_graceful_shutdown(shutdown)
            .await
        {
            error!("Server error: {e}");
        }
    });

    Ok((addr, task))
}
