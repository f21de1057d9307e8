//! Wheats authorization server daemon
//!
//! Loads the TOML configuration, seeds the client registry and user
//! directory, and serves the OAuth endpoints plus the demo protected
//! resources over HTTP.

use anyhow::Context;
use clap::Parser;
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use wheats_oauth::{
    ClientSeed, OAuthState, TokenConfig, UserSeed, config, oauth_router, resource_router,
};

/// Command-line arguments.
#[derive(Debug, Parser)]
#[command(name = "wheats-authd", version, about = "Wheats OAuth 2.0 authorization server")]
struct Args {
    /// Path to the server configuration file.
    #[arg(short, long, env = "WHEATS_AUTHD_CONFIG", default_value = "authd.toml")]
    config: PathBuf,

    /// Log level filter when RUST_LOG is unset.
    #[arg(long, env = "WHEATS_AUTHD_LOG", default_value = "info")]
    log_level: String,
}

/// On-disk server configuration.
#[derive(Debug, Deserialize)]
struct ServerConfig {
    /// Socket address to bind.
    #[serde(default = "default_listen_addr")]
    listen_addr: SocketAddr,

    /// Seconds between expired-record sweeps.
    #[serde(default = "default_cleanup_interval_secs")]
    cleanup_interval_secs: u64,

    /// Token lifetime policy.
    #[serde(default)]
    tokens: TokenConfig,

    /// Registered clients.
    #[serde(default)]
    clients: Vec<ClientSeed>,

    /// Resource owners.
    #[serde(default)]
    users: Vec<UserSeed>,
}

fn default_listen_addr() -> SocketAddr {
    ([127, 0, 0, 1], 9205).into()
}

fn default_cleanup_interval_secs() -> u64 {
    300
}

fn init_logging(level: &str) -> anyhow::Result<()> {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .context("invalid log filter")?;

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .init();
    Ok(())
}

fn load_config(path: &PathBuf) -> anyhow::Result<ServerConfig> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    toml::from_str(&raw).with_context(|| format!("failed to parse {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_parses_with_defaults() {
        let config: ServerConfig = toml::from_str(
            r#"
            [[clients]]
            client_id = "android_app_client"
            client_secret = "secret123"
            redirect_uris = ["com.wheats.app://callback"]
            allowed_scopes = "profile customer store"
            "#,
        )
        .unwrap();

        assert_eq!(config.listen_addr, default_listen_addr());
        assert_eq!(config.cleanup_interval_secs, 300);
        assert_eq!(config.tokens.access_ttl_secs, 3600);
        assert_eq!(config.clients.len(), 1);
        assert!(config.users.is_empty());
    }

    #[test]
    fn config_overrides_apply() {
        let config: ServerConfig = toml::from_str(
            r#"
            listen_addr = "0.0.0.0:8080"
            cleanup_interval_secs = 60

            [tokens]
            code_ttl_secs = 120
            access_ttl_secs = 600
            refresh_ttl_days = 7
            "#,
        )
        .unwrap();

        assert_eq!(config.listen_addr, "0.0.0.0:8080".parse().unwrap());
        assert_eq!(config.cleanup_interval_secs, 60);
        assert_eq!(config.tokens.refresh_ttl_days, 7);
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(&args.log_level)?;

    let config_file = load_config(&args.config)?;
    anyhow::ensure!(
        !config_file.clients.is_empty(),
        "config must register at least one client"
    );

    let registry = Arc::new(config::build_registry(config_file.clients));
    let users = Arc::new(config::build_users(config_file.users));
    let state = OAuthState::in_memory(registry, users, config_file.tokens);

    // Periodic sweep of expired codes and tokens.
    let sweeper = state.storage.clone();
    let interval = Duration::from_secs(config_file.cleanup_interval_secs);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            if let Err(e) = sweeper.cleanup_expired(chrono::Utc::now()).await {
                tracing::warn!(error = %e, "expired-record sweep failed");
            }
        }
    });

    let app = oauth_router()
        .merge(resource_router(&state))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(config_file.listen_addr)
        .await
        .with_context(|| format!("failed to bind {}", config_file.listen_addr))?;
    tracing::info!(addr = %config_file.listen_addr, "authorization server listening");

    axum::serve(listener, app)
        .await
        .context("server terminated")?;
    Ok(())
}
