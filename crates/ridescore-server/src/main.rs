//! # RideScore Server
//!
//! Online scoring service and registry tooling.
//!
//! ## Startup Flow (serve)
//!
//! 1. Initialize tracing/logging
//! 2. Parse command-line arguments
//! 3. Load configuration (file, then RIDESCORE_* environment overrides)
//! 4. Initialize the scoring context (registry, stores, model)
//! 5. Start HTTP server, then release the context on shutdown
//!
//! ## Usage
//!
//! ```bash
//! # Register the driver/customer repository
//! ridescore apply demos/driver_repo.yaml --registry data/registry.db
//!
//! # Start server
//! RIDESCORE_ONLINE_CONN=redis://localhost:6379 ridescore serve --config ridescore.yaml
//!
//! # Score once without a server
//! ridescore score --request '{"driver": 17, "customer_id": 42}'
//! ```

use clap::{Parser, Subcommand};
use ridescore_server::error::{AppError, Result};
use ridescore_server::{api, cli, config, shutdown, state::AppState, ScoringContext};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// RideScore command-line interface
#[derive(Parser)]
#[command(name = "ridescore")]
#[command(about = "Feature-store schemas and online scoring for ride-hailing", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Available CLI subcommands
#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP scoring server
    Serve {
        /// Configuration file path
        #[arg(short, long, default_value = "ridescore.yaml")]
        config: String,

        /// Port to listen on (overrides the config file)
        #[arg(short, long, env = "RIDESCORE_PORT")]
        port: Option<u16>,

        /// Host to bind to (overrides the config file)
        #[arg(long, env = "RIDESCORE_HOST")]
        host: Option<String>,
    },

    /// Validate a repository definition and write it to the registry
    Apply {
        /// Path to repository YAML file
        file: String,

        /// Registry location (path or sqlite:// URI)
        #[arg(long, env = "RIDESCORE_REGISTRY", default_value = "data/registry.db")]
        registry: String,
    },

    /// Validate a repository definition without applying it
    Validate {
        /// Path to repository YAML file
        file: String,
    },

    /// List registered feature views
    List {
        /// Registry location (path or sqlite:// URI)
        #[arg(long, env = "RIDESCORE_REGISTRY", default_value = "data/registry.db")]
        registry: String,

        /// Filter by name substring
        #[arg(short, long)]
        filter: Option<String>,
    },

    /// Score a single request against the configured stores
    Score {
        /// Configuration file path
        #[arg(short, long, default_value = "ridescore.yaml")]
        config: String,

        /// Request JSON, e.g. '{"driver": 17, "customer_id": 42}'
        #[arg(short, long)]
        request: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // RUST_LOG sets the level (default info); LOG_FORMAT=json for production
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
            .with(
                fmt::layer()
                    .pretty()
                    .with_target(false)
                    .with_thread_ids(false),
            )
            .init();
    }

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { config, port, host } => {
            serve(config, host, port).await?;
        }
        Commands::Apply { file, registry } => {
            cli::apply(file, registry).await?;
        }
        Commands::Validate { file } => {
            cli::validate(file)?;
        }
        Commands::List { registry, filter } => {
            cli::list(registry, filter).await?;
        }
        Commands::Score { config, request } => {
            cli::score(config, request).await?;
        }
    }

    Ok(())
}

/// Start the HTTP server
///
/// Initialization errors abort startup; no port is bound until the scoring
/// context is ready.
async fn serve(config_path: String, host: Option<String>, port: Option<u16>) -> Result<()> {
    info!("Starting RideScore server");
    info!("Loading configuration from: {}", config_path);

    let mut config = config::load(&config_path)?;
    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }

    let context = Arc::new(ScoringContext::initialize(&config.scoring).await?);

    info!(
        "Server resilience config: max_body_size={}KB, request_timeout={}s",
        config.server.max_body_bytes / 1024,
        config.server.request_timeout_secs
    );

    let app = api::router(AppState::new(context.clone()), &config.server);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .map_err(|e| AppError::Internal(format!("Invalid host/port: {}", e)))?;

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| AppError::Internal(format!("Failed to bind address: {}", e)))?;

    info!("Server listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown::shutdown_signal())
        .await
        .map_err(|e| AppError::Internal(format!("Server error: {}", e)))?;

    match Arc::try_unwrap(context) {
        Ok(context) => context.shutdown(),
        Err(_) => info!("Scoring context still referenced, dropping on exit"),
    }

    info!("Server shut down gracefully");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parsing_serve() {
        let cli = Cli::parse_from(["ridescore", "serve"]);
        match cli.command {
            Commands::Serve { config, .. } => {
                assert_eq!(config, "ridescore.yaml");
            }
            _ => panic!("Expected Serve command"),
        }
    }

    #[test]
    fn test_cli_with_custom_port() {
        let cli = Cli::parse_from(["ridescore", "serve", "--port", "9000"]);
        match cli.command {
            Commands::Serve { port, .. } => {
                assert_eq!(port, Some(9000));
            }
            _ => panic!("Expected Serve command"),
        }
    }

    #[test]
    fn test_cli_apply_command() {
        let cli = Cli::parse_from([
            "ridescore",
            "apply",
            "demos/driver_repo.yaml",
            "--registry",
            "/tmp/registry.db",
        ]);
        match cli.command {
            Commands::Apply { file, registry } => {
                assert_eq!(file, "demos/driver_repo.yaml");
                assert_eq!(registry, "/tmp/registry.db");
            }
            _ => panic!("Expected Apply command"),
        }
    }

    #[test]
    fn test_cli_list_with_filter() {
        let cli = Cli::parse_from(["ridescore", "list", "--registry", "r.db", "-f", "driver"]);
        match cli.command {
            Commands::List { registry, filter } => {
                assert_eq!(registry, "r.db");
                assert_eq!(filter.as_deref(), Some("driver"));
            }
            _ => panic!("Expected List command"),
        }
    }

    #[test]
    fn test_cli_score_requires_request() {
        assert!(Cli::try_parse_from(["ridescore", "score"]).is_err());

        let cli = Cli::parse_from(["ridescore", "score", "--request", r#"{"driver": 17}"#]);
        match cli.command {
            Commands::Score { request, config } => {
                assert_eq!(request, r#"{"driver": 17}"#);
                assert_eq!(config, "ridescore.yaml");
            }
            _ => panic!("Expected Score command"),
        }
    }

    #[test]
    fn test_cli_validate_command() {
        let cli = Cli::parse_from(["ridescore", "validate", "test.yaml"]);
        match cli.command {
            Commands::Validate { file } => {
                assert_eq!(file, "test.yaml");
            }
            _ => panic!("Expected Validate command"),
        }
    }
}
