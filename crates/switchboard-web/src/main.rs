//! Chat API server.
//!
//! Serves the `switchboard` orchestrator over HTTP. Provider keys and limits
//! come from the environment (`OPENAI_API_KEY`, `ANTHROPIC_API_KEY`,
//! `DEEPSEEK_API_KEY`, `OPENROUTER_API_KEY`, `SWITCHBOARD_*`); flags
//! override the environment. Logs follow `RUST_LOG` (default `info`).
//!
//! # Usage
//!
//! ```bash
//! OPENAI_API_KEY=sk-... cargo run -p switchboard-web
//! OPENAI_API_KEY=sk-... cargo run -p switchboard-web -- --port 8080 --expose-errors
//! ```
//!
//! Then stream a reply:
//!
//! ```bash
//! curl -N localhost:3001/api/chat -H 'content-type: application/json' \
//!   -d '{"message": "write code for a parser"}'
//! ```

use std::net::IpAddr;
use std::process;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use switchboard::config::SwitchboardConfig;
use switchboard::orchestrator::Orchestrator;
use switchboard_web::{WebConfig, spawn_web};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Chat API server.
#[derive(Parser)]
#[command(about = "HTTP chat endpoints over multiple LLM providers")]
struct Args {
    /// Port to listen on.
    #[arg(long, default_value_t = 3001)]
    port: u16,

    /// Address to bind.
    #[arg(long, default_value = "127.0.0.1")]
    bind: IpAddr,

    /// Model used when no keyword rule matches.
    #[arg(long)]
    model: Option<String>,

    /// Upstream request deadline in milliseconds.
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Retries after a failed upstream attempt.
    #[arg(long)]
    max_retries: Option<u32>,

    /// Include internal error details in error responses.
    #[arg(long)]
    expose_errors: bool,
}

fn load_config(args: &Args) -> switchboard::Result<SwitchboardConfig> {
    let mut config = SwitchboardConfig::from_env()?;
    if let Some(model) = &args.model {
        config.default_model = Some(model.clone());
    }
    if let Some(ms) = args.timeout_ms {
        config.request_timeout = Duration::from_millis(ms);
    }
    if let Some(n) = args.max_retries {
        config.max_retries = n;
    }
    if args.expose_errors {
        config.expose_errors = true;
    }
    config.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let orchestrator = match load_config(&args).and_then(Orchestrator::new) {
        Ok(orchestrator) => Arc::new(orchestrator),
        Err(e) => {
            error!("Startup failed: {e}");
            process::exit(1);
        }
    };

    let config = WebConfig {
        bind_addr: (args.bind, args.port).into(),
    };
    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Cannot listen for ctrl-c: {e}");
            std::future::pending::<()>().await;
        }
        info!("Shutdown requested");
    };

    let (addr, server) = match spawn_web(orchestrator.clone(), config, shutdown).await {
        Ok(bound) => bound,
        Err(e) => {
            error!("Cannot bind {}:{}: {e}", args.bind, args.port);
            process::exit(1);
        }
    };
    println!("Chat API: http://{addr}/api");

    if let Err(e) = server.await {
        error!("Server task failed: {e}");
    }
    orchestrator.shutdown();
}
