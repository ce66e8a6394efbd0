//! # murmur
//!
//! `murmur serve` runs the mock streaming chat server.
//! `murmur chat` opens a terminal chat against a running server.

#![deny(unsafe_code)]

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use murmur_client::console::{self, DEFAULT_URL};
use murmur_server::{DEFAULT_SHUTDOWN_TIMEOUT, MurmurServer, ServerConfig, load_config};
use murmur_telemetry::LoggingConfig;
use tracing::Level;

/// Mock streaming chat over `WebSocket`.
#[derive(Parser, Debug)]
#[command(name = "murmur", about = "Mock streaming chat over WebSocket")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the chat server.
    Serve {
        /// Host to bind (overrides `MURMUR_HOST`).
        #[arg(long)]
        host: Option<String>,

        /// Port to bind, 0 for auto-assign (overrides `PORT`).
        #[arg(long)]
        port: Option<u16>,

        /// Log as newline-delimited JSON.
        #[arg(long)]
        json_logs: bool,
    },
    /// Chat with a running server from the terminal.
    Chat {
        /// Server `WebSocket` URL.
        #[arg(long, default_value = DEFAULT_URL)]
        url: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    match Cli::parse().command {
        Command::Serve {
            host,
            port,
            json_logs,
        } => serve(host, port, json_logs).await,
        Command::Chat { url } => chat(&url).await,
    }
}

async fn serve(host: Option<String>, port: Option<u16>, json_logs: bool) -> Result<()> {
    let logging = LoggingConfig {
        json: json_logs,
        ..LoggingConfig::default()
    };
    let config = startup_config(&logging, host, port);

    let mut server = MurmurServer::new(config);
    match murmur_server::metrics::install_recorder() {
        Ok(handle) => server = server.with_metrics(handle),
        Err(e) => {
            tracing::warn!(error = %e, "metrics recorder not installed, /metrics disabled");
        }
    }

    let (addr, handle) = server.listen().await.context("Failed to bind server")?;
    tracing::info!("murmur listening on ws://{addr}");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    tracing::info!("Shutting down...");
    if server.shutdown(handle, DEFAULT_SHUTDOWN_TIMEOUT).await {
        tracing::info!("Shutdown complete");
    }
    Ok(())
}

/// Install logging, then load the server config and apply CLI overrides.
///
/// Logging comes first so warnings about invalid env values are visible.
fn startup_config(
    logging: &LoggingConfig,
    host: Option<String>,
    port: Option<u16>,
) -> ServerConfig {
    let _ = murmur_telemetry::init_logging(logging);

    let mut config = load_config();
    if let Some(host) = host {
        config.host = host;
    }
    if let Some(port) = port {
        config.port = port;
    }
    config
}

async fn chat(url: &str) -> Result<()> {
    let _ = murmur_telemetry::init_logging(&LoggingConfig {
        level: Level::WARN,
        ..LoggingConfig::default()
    });

    let input = tokio::io::BufReader::new(tokio::io::stdin());
    console::run_chat(url, input, std::io::stdout())
        .await
        .with_context(|| format!("chat session with {url} failed"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serve_defaults_leave_config_alone() {
        let cli = Cli::parse_from(["murmur", "serve"]);
        match cli.command {
            Command::Serve {
                host,
                port,
                json_logs,
            } => {
                assert!(host.is_none());
                assert!(port.is_none());
                assert!(!json_logs);
            }
            Command::Chat { .. } => panic!("expected serve"),
        }
    }

    #[test]
    fn serve_overrides() {
        let cli = Cli::parse_from([
            "murmur",
            "serve",
            "--host",
            "127.0.0.1",
            "--port",
            "9000",
            "--json-logs",
        ]);
        match cli.command {
            Command::Serve {
                host,
                port,
                json_logs,
            } => {
                assert_eq!(host.as_deref(), Some("127.0.0.1"));
                assert_eq!(port, Some(9000));
                assert!(json_logs);
            }
            Command::Chat { .. } => panic!("expected serve"),
        }
    }

    #[test]
    fn chat_default_url() {
        let cli = Cli::parse_from(["murmur", "chat"]);
        match cli.command {
            Command::Chat { url } => assert_eq!(url, "ws://localhost:8080"),
            Command::Serve { .. } => panic!("expected chat"),
        }
    }

    #[test]
    fn invalid_port_rejected() {
        assert!(Cli::try_parse_from(["murmur", "serve", "--port", "70000"]).is_err());
    }

    #[test]
    fn logging_is_installed_before_config_loads() {
        let config = startup_config(
            &LoggingConfig::default(),
            Some("127.0.0.1".into()),
            Some(9100),
        );
        assert!(tracing::dispatcher::has_been_set());
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 9100);
    }

    #[test]
    fn subcommand_required() {
        assert!(Cli::try_parse_from(["murmur"]).is_err());
    }
}
