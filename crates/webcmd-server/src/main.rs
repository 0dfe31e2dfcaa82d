//! webcmd: serve an interactive shell command over HTTP.
//!
//! Runs a line-oriented program (try `bc`), shows everything it prints on
//! a web page, and forwards whatever is submitted through the page's form
//! to the program's stdin.

mod config;
mod page;
mod routes;
mod state;

use anyhow::Context;
use clap::Parser;
use config::{CliOverrides, ServerConfig};
use state::AppState;
use std::path::PathBuf;
use tracing::{error, info};

/// webcmd — webify a basic interactive shell command
#[derive(Parser, Debug)]
#[command(name = "webcmd", version, about = "Webify a basic interactive shell command (like bc or pianobar)")]
struct Cli {
    /// Shell command to run (try bc on macOS and Linux)
    #[arg(short, long)]
    command: String,

    /// Web port
    #[arg(short, long)]
    port: Option<u16>,

    /// Address to bind
    #[arg(long)]
    bind: Option<String>,

    /// Output file (defaults to a random name in the temp directory)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Milliseconds to wait after forwarding input before redirecting
    #[arg(long)]
    input_delay_ms: Option<u64>,

    /// Config file path
    #[arg(long, default_value = "~/.webcmd/config.toml")]
    config: String,

    /// Print extra information about what is happening behind the scenes
    #[arg(short, long)]
    verbose: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize tracing
    use tracing_subscriber::EnvFilter;
    let level = if cli.verbose { "debug" } else { cli.log_level.as_str() };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .init();

    if let Err(e) = run(cli).await {
        error!("webcmd failed: {e:#}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config_path = PathBuf::from(&cli.config);
    let config = ServerConfig::load(
        Some(&config_path),
        cli.command,
        CliOverrides {
            port: cli.port,
            bind: cli.bind,
            input_delay_ms: cli.input_delay_ms,
            output: cli.output,
        },
    )?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        command = %config.command,
        output = %config.output_path.display(),
        "starting webcmd"
    );

    let state = AppState::start(&config)
        .await
        .with_context(|| format!("cannot start `{}`", config.command))?;

    let addr = config.listen_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("cannot listen on {addr}"))?;
    info!(addr = %addr, "listening");

    let result = axum::serve(listener, routes::router(state.clone()))
        .with_graceful_shutdown(shutdown_signal())
        .await;

    info!("shutting down");
    state.shutdown().await;
    result.context("web server error")
}

/// Wait for SIGTERM or SIGINT (Ctrl+C).
async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = ctrl_c => {}
            _ = sigterm.recv() => {}
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
    }
}
