use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::{Arc, OnceLock};

use clap::Parser;
use serde_json::Value;
use skylark_agent_core::FlightSearchAgent;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

mod agent;
mod capabilities;
mod config;
mod handler;

#[derive(Parser, Debug)]
#[command(name = "skylark", version, about = "skylark flight search agent")]
struct Cli {
    /// Configuration directory (defaults to ~/.skylark).
    #[arg(long)]
    conf_dir: Option<PathBuf>,
    /// Gemini model name override.
    #[arg(long)]
    model: Option<String>,
    /// Gemini API base URL override.
    #[arg(long)]
    base_url: Option<String>,
    /// Run a single query and print the answer instead of the REPL.
    #[arg(long)]
    prompt: Option<String>,
    /// Handle one JSON payload (e.g. '{"query": "..."}') and print the
    /// JSON response.
    #[arg(long)]
    payload: Option<String>,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    config::init_conf_dir(cli.conf_dir.clone());
    init_tracing();
    if let Err(error) = run(cli).await {
        eprintln!("error: {error}");
        std::process::exit(1);
    }
}

fn init_tracing() {
    static TRACE_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

    let log_dir = config::current_conf_dir();
    if let Err(error) = std::fs::create_dir_all(&log_dir) {
        eprintln!(
            "warning: failed to create log dir {}: {error}",
            log_dir.display()
        );
        return;
    }

    let appender = tracing_appender::rolling::never(&log_dir, "skylark.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(appender);
    let _ = TRACE_GUARD.set(guard);

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(non_blocking),
        )
        .try_init();
}

async fn run(cli: Cli) -> Result<(), String> {
    let mut config = config::load_config().map_err(|error| error.to_string())?;
    if let Some(model) = cli.model {
        config.model = model;
    }
    if let Some(base_url) = cli.base_url {
        config.base_url = Some(base_url);
    }

    let agent = agent::global_agent(&config).map_err(|error| error.to_string())?;

    if let Some(payload) = cli.payload {
        let payload: Value = serde_json::from_str(&payload)
            .map_err(|error| format!("invalid JSON payload: {error}"))?;
        let response = handler::handle_payload(&agent, payload).await;
        println!("{response}");
        return Ok(());
    }

    if let Some(prompt) = cli.prompt {
        let Some(prompt) = trimmed_query(&prompt) else {
            return Err("empty prompt: please provide a flight search query".to_string());
        };
        let answer = agent.run_query(prompt).await;
        println!("{}", answer.into_text());
        return Ok(());
    }

    repl(agent).await
}

async fn repl(agent: Arc<FlightSearchAgent>) -> Result<(), String> {
    println!("Welcome to the Flight Search Agent!");
    println!("Ask me to find flights, e.g. 'Find flights from JFK to LHR on 2025-06-01'.");
    println!("Type 'exit' or 'quit' to leave.");

    let stdin = io::stdin();
    loop {
        print!("> ");
        io::stdout()
            .flush()
            .map_err(|error| format!("flush stdout failed: {error}"))?;

        let mut line = String::new();
        let read = stdin
            .read_line(&mut line)
            .map_err(|error| format!("read stdin failed: {error}"))?;
        if read == 0 {
            println!();
            break;
        }

        let Some(input) = trimmed_query(&line) else {
            println!("Please enter a flight search query.");
            continue;
        };
        if input.eq_ignore_ascii_case("exit") || input.eq_ignore_ascii_case("quit") {
            println!("Goodbye!");
            break;
        }

        let answer = agent.run_query(input).await;
        println!("{}", answer.into_text());
    }

    Ok(())
}

/// Empty or whitespace-only input never enters a dialogue; every entry
/// point validates before calling the agent.
fn trimmed_query(input: &str) -> Option<&str> {
    let trimmed = input.trim();
    (!trimmed.is_empty()).then_some(trimmed)
}
