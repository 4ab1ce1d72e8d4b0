//! slopbot CLI
//!
//! Runs the chat bot, or resolves a single link with `--url` and prints it.

use clap::Parser;
use slopbot::bot::{run_bot, BotConfig};
use slopbot::oneshot::run_oneshot;
use slopbot::{Dispatcher, Fetcher};
use std::process::ExitCode;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "slopbot")]
#[command(version)]
#[command(about = "Resolves meme, photo, short-video and microblog links to raw media")]
#[command(long_about = "Resolves meme, photo, short-video and microblog links to raw media.\n\nWithout --url the Discord bot runs until Ctrl-C.\nWith --url a single link is resolved and printed.")]
struct Cli {
    /// Resolve a single supported link locally and exit
    #[arg(long)]
    url: Option<String>,

    /// Discord bot token
    #[arg(long, env = "TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Timeout per upstream request in seconds
    #[arg(long, env = "SLOPBOT_TIMEOUT", default_value = "30")]
    timeout: u64,

    /// Seconds between channel polls
    #[arg(long, env = "SLOPBOT_POLL_INTERVAL", default_value = "5")]
    poll_interval: u64,

    /// Log level when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

async fn run_cli(url: &str, timeout: Duration) -> ExitCode {
    let result = match Fetcher::new(timeout) {
        Ok(fetcher) => {
            let mut stdout = std::io::stdout().lock();
            run_oneshot(&Dispatcher::new(), &fetcher, url, &mut stdout).await
        }
        Err(e) => Err(e.into()),
    };

    match result {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    // a missing .env is fine
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    init_logging(&cli.log_level);

    let timeout = Duration::from_secs(cli.timeout.max(1));

    if let Some(url) = &cli.url {
        return run_cli(url, timeout).await;
    }

    let Some(token) = cli.token.filter(|t| !t.trim().is_empty()) else {
        eprintln!("TOKEN environment variable not set.");
        return ExitCode::FAILURE;
    };

    let config = BotConfig {
        token,
        timeout,
        poll_interval: Duration::from_secs(cli.poll_interval.max(1)),
    };

    match run_bot(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
