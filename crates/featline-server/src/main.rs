//! # featline
//!
//! Online feature serving: HTTP server plus registry tooling.
//!
//! ## Startup Flow
//!
//! 1. Initialize tracing/logging
//! 2. Parse command-line arguments
//! 3. Load configuration (file, then `FEATLINE_*` overrides, then flags)
//! 4. Open the registry and the online store
//! 5. Serve until SIGINT/SIGTERM
//!
//! ## Usage
//!
//! ```bash
//! # Start server with defaults
//! featline serve
//!
//! # Specify configuration file and port
//! featline serve --config featline.yaml --port 8080
//!
//! # Publish definitions
//! featline apply definitions.yaml --registry ./featline_registry.db
//! ```

use anyhow::Context;
use clap::{Parser, Subcommand};
use featline_server::{config, router, shutdown, state::AppState};
use std::net::SocketAddr;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod cli;

const SHUTDOWN_GRACE_PERIOD: Duration = Duration::from_secs(30);

#[derive(Parser)]
#[command(name = "featline")]
#[command(about = "Online feature retrieval engine", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server
    Serve {
        /// Configuration file path
        #[arg(short, long, default_value = "featline.yaml")]
        config: String,

        /// Port to listen on (overrides the configuration)
        #[arg(short, long)]
        port: Option<u16>,

        /// Host to bind to (overrides the configuration)
        #[arg(long)]
        host: Option<String>,
    },

    /// Publish entities, feature views and feature services from a YAML file
    Apply {
        /// Path to the definitions file
        file: String,

        /// Registry database path
        #[arg(long, default_value = "./featline_registry.db")]
        registry: String,
    },

    /// List the feature views of a project
    List {
        /// Project name
        project: String,

        /// Registry database path
        #[arg(long, default_value = "./featline_registry.db")]
        registry: String,
    },

    /// Print the server version
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // - RUST_LOG: log level (e.g. "info", "featline_serving=debug")
    // - LOG_FORMAT: "json" for production, "pretty" for development
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "pretty".to_string());
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    if log_format == "json" {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(true)
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_thread_names(true),
            )
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().pretty().with_target(false).with_thread_ids(false))
            .init();
    }

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { config, port, host } => serve(config, host, port).await?,
        Commands::Apply { file, registry } => cli::apply(file, registry).await?,
        Commands::List { project, registry } => cli::list(registry, project).await?,
        Commands::Version => println!("featline {}", featline_serving::SERVING_INFO.version),
    }

    Ok(())
}

async fn serve(config_path: String, host: Option<String>, port: Option<u16>) -> anyhow::Result<()> {
    info!("Starting featline server");

    let mut config = config::load(&config_path)?;
    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }

    let shutdown_token = CancellationToken::new();
    tokio::spawn(shutdown::cancel_on_signal(shutdown_token.clone()));

    let state = AppState::from_config(&config, shutdown_token.clone()).await?;
    let app = router(state, config.server.max_body_bytes);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("Invalid host/port")?;
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    info!(
        request_timeout_ms = config.server.request_timeout_ms,
        max_body_bytes = config.server.max_body_bytes,
        "Server listening on http://{}",
        addr
    );

    let server = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_token.clone().cancelled_owned());
    let mut server = tokio::spawn(async move { server.await });

    tokio::select! {
        result = &mut server => {
            result.context("Server task failed")?.context("Server error")?;
        }
        _ = shutdown_token.cancelled() => {
            shutdown::drain(
                async {
                    let _ = server.await;
                },
                SHUTDOWN_GRACE_PERIOD,
            )
            .await;
        }
    }

    info!("Server shut down gracefully");
    Ok(())
}
