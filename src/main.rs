use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use relay_server::ServerConfig;
use relay_telemetry::TelemetryConfig;
use tracing::Level;

/// Real-time chat relay: presence, typing and broadcast over WebSocket.
#[derive(Debug, Parser)]
#[command(name = "relay", version)]
struct Cli {
    /// Address to bind.
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    /// Port to listen on.
    #[arg(long, env = "PORT", default_value_t = 3000)]
    port: u16,

    /// Directory with index.html and the client assets.
    #[arg(long, default_value = "public")]
    public_dir: PathBuf,

    /// Per-connection outbound queue length.
    #[arg(long, default_value_t = 256)]
    max_send_queue: usize,

    /// Seconds between WebSocket pings.
    #[arg(long, default_value_t = 30)]
    heartbeat_interval: u64,

    /// Seconds without a pong before a client is dropped.
    #[arg(long, default_value_t = 90)]
    client_timeout: u64,

    /// Reject joins with names shorter than two characters.
    #[arg(long)]
    require_valid_names: bool,

    /// Default log level (RUST_LOG takes precedence).
    #[arg(long, default_value_t = Level::INFO)]
    log_level: Level,

    /// Log as JSON lines.
    #[arg(long)]
    json_logs: bool,
}

impl Cli {
    fn server_config(&self) -> ServerConfig {
        ServerConfig {
            host: self.host.clone(),
            port: self.port,
            public_dir: self.public_dir.clone(),
            max_send_queue: self.max_send_queue,
            heartbeat_interval_secs: self.heartbeat_interval,
            client_timeout_secs: self.client_timeout,
            require_valid_names: self.require_valid_names,
            ..Default::default()
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let telemetry = relay_telemetry::init_telemetry(TelemetryConfig {
        log_level: cli.log_level,
        json: cli.json_logs,
        ..Default::default()
    });

    tracing::info!("Starting relay server");

    let config = cli.server_config();
    let handle = relay_server::start(config, telemetry.metrics())
        .await
        .context("failed to start server")?;

    tracing::info!(url = %format!("http://localhost:{}", handle.port()), "Relay server ready");

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl+c")?;

    tracing::info!("Shutting down");
    handle.shutdown().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_defaults_match_server_defaults() {
        let cli = Cli::try_parse_from(["relay", "--port", "3000"]).unwrap();
        let cfg = cli.server_config();
        let defaults = ServerConfig::default();
        assert_eq!(cfg.host, defaults.host);
        assert_eq!(cfg.port, defaults.port);
        assert_eq!(cfg.public_dir, defaults.public_dir);
        assert_eq!(cfg.heartbeat_interval_secs, defaults.heartbeat_interval_secs);
        assert!(!cfg.require_valid_names);
    }

    #[test]
    fn cli_flags_map_onto_config() {
        let cli = Cli::try_parse_from([
            "relay",
            "--port",
            "8080",
            "--public-dir",
            "/srv/chat",
            "--require-valid-names",
            "--log-level",
            "debug",
        ])
        .unwrap();
        assert_eq!(cli.log_level, Level::DEBUG);
        let cfg = cli.server_config();
        assert_eq!(cfg.port, 8080);
        assert_eq!(cfg.public_dir, PathBuf::from("/srv/chat"));
        assert!(cfg.require_valid_names);
    }
}
