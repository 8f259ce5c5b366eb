//! Inspect the model catalog and send chat requests from the command line.
//!
//! Provider keys come from `OPENAI_API_KEY`, `ANTHROPIC_API_KEY`,
//! `DEEPSEEK_API_KEY`, and `OPENROUTER_API_KEY`. Logs go to stderr and
//! follow `RUST_LOG` (default `warn`).
//!
//! # Examples
//!
//! ```sh
//! # List the built-in catalog, or one provider's models
//! switchboard models
//! switchboard models --provider anthropic
//!
//! # List the live OpenRouter catalog
//! switchboard models --openrouter
//!
//! # Which model would serve this task?
//! switchboard recommend "write code for a parser"
//!
//! # Estimated cost of 1000 prompt + 500 completion tokens on gpt-4
//! switchboard cost gpt-4 1000 500
//!
//! # Stream a reply (recommended model), or wait for the full reply
//! switchboard chat "Explain backpressure"
//! switchboard chat --model deepseek-coder --no-stream "Write a parser"
//! ```

use std::io::Write;
use std::process;
use std::time::Duration;

use clap::{Parser, Subcommand};
use futures::StreamExt;
use switchboard::catalog::{Model, ModelRegistry, Provider};
use switchboard::config::SwitchboardConfig;
use switchboard::orchestrator::Orchestrator;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Inspect the model catalog and send chat requests.
#[derive(Parser)]
#[command(name = "switchboard", version)]
struct Cli {
    /// Upstream request deadline in milliseconds
    #[arg(long, global = true)]
    timeout_ms: Option<u64>,

    /// Retries after a failed upstream attempt
    #[arg(long, global = true)]
    max_retries: Option<u32>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List known models
    Models {
        /// Only models served by this provider
        #[arg(long)]
        provider: Option<Provider>,

        /// Fetch the live OpenRouter catalog instead of the built-in one
        #[arg(long, conflicts_with = "provider")]
        openrouter: bool,
    },

    /// Show which model a task description would be routed to
    Recommend {
        /// Free-form task description
        task: String,
    },

    /// Estimate the cost of a request
    Cost {
        model: String,
        input_tokens: u32,
        output_tokens: u32,
    },

    /// Send a chat message and print the reply
    Chat {
        message: String,

        /// Catalog model id or OpenRouter `vendor/model` id
        #[arg(long)]
        model: Option<String>,

        /// Wait for the full reply and print usage and cost
        #[arg(long)]
        no_stream: bool,
    },
}

fn print_models<'a>(models: impl IntoIterator<Item = &'a Model>) {
    for model in models {
        let tags: Vec<&str> = model.capabilities.iter().map(String::as_str).collect();
        println!(
            "{:<40} {:<10} {:>8} ctx  ${:.8}/tok  [{}]",
            model.id,
            model.provider,
            model.max_tokens,
            model.cost_per_token,
            tags.join(", ")
        );
    }
}

async fn run(cli: Cli) -> switchboard::Result<()> {
    let registry = ModelRegistry::builtin();

    match cli.command {
        Command::Models {
            provider: Some(provider),
            ..
        } => print_models(registry.get_models_by_provider(provider)),
        Command::Models {
            openrouter: false, ..
        } => print_models(registry.models()),
        Command::Recommend { task } => {
            let model = registry.recommend_model(&task);
            println!("{} ({})", model.id, model.name);
        }
        Command::Cost {
            model,
            input_tokens,
            output_tokens,
        } => {
            if registry.get_model_by_id(&model).is_none() {
                eprintln!("warning: unknown model {model}, cost is 0");
            }
            let cost = registry.estimate_cost(&model, input_tokens, output_tokens);
            println!("${cost:.6}");
        }
        command => {
            let mut config = SwitchboardConfig::from_env()?;
            if let Some(ms) = cli.timeout_ms {
                config.request_timeout = Duration::from_millis(ms);
            }
            if let Some(n) = cli.max_retries {
                config.max_retries = n;
            }
            let orchestrator = Orchestrator::new(config)?;

            match command {
                Command::Chat {
                    message,
                    model,
                    no_stream: true,
                } => {
                    let reply = orchestrator.complete_chat(&message, model.as_deref()).await?;
                    println!("{}", reply.text);
                    eprintln!(
                        "[{}] est. cost ${:.6}",
                        reply.model.id, reply.estimated_cost_usd
                    );
                }
                Command::Chat { message, model, .. } => {
                    let mut chat = orchestrator.stream_chat(&message, model.as_deref()).await?;
                    eprintln!("[{}]", chat.model.id);
                    let mut stdout = std::io::stdout();
                    while let Some(fragment) = chat.stream.next().await {
                        let fragment = fragment?;
                        // Best effort: a closed stdout only loses output.
                        let _ = stdout.write_all(&fragment);
                        let _ = stdout.flush();
                    }
                    println!();
                }
                _ => print_models(&orchestrator.list_openrouter_models().await?),
            }
            orchestrator.shutdown();
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}
