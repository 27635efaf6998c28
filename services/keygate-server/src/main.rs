//! Keygate API server
//!
//! Identity and session service: password and OAuth sign-in, refresh-token
//! rotation with reuse detection, account lockout, CSRF protection and
//! session inventory over a PostgreSQL + Redis dual store.
//!
//! # Usage
//!
//! ```bash
//! # Start with default settings
//! keygate-server
//!
//! # Start with a config file
//! keygate-server --config /etc/keygate/config.toml
//!
//! # Environment overrides
//! KEYGATE__SERVER__PORT=8080 keygate-server
//! ```

mod config;

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::signal;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use keygate_api::{create_router, ApiConfig, AppState};
use keygate_auth::{spawn_sweeper, AuthConfig, AuthService, LogMailer, Mailer};
use keygate_db::{Database, DatabaseConfig as DbConfig};

use crate::config::ServerConfig;

/// Keygate identity and session service
#[derive(Parser, Debug)]
#[command(name = "keygate-server")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file (TOML, JSON, or YAML)
    #[arg(short, long, env = "KEYGATE_CONFIG")]
    config: Option<String>,

    /// Host to bind to
    #[arg(long, env = "KEYGATE_HOST")]
    host: Option<String>,

    /// Port to listen on
    #[arg(short, long, env = "KEYGATE_PORT")]
    port: Option<u16>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "KEYGATE_LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Log format (json, pretty)
    #[arg(long, env = "KEYGATE_LOG_FORMAT", default_value = "pretty")]
    log_format: String,

    /// PostgreSQL connection URL
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,

    /// Redis connection URL
    #[arg(long, env = "REDIS_URL")]
    redis_url: Option<String>,

    /// Allow missing token secrets (development only)
    #[arg(long, env = "KEYGATE_DEV_MODE")]
    dev_mode: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut server_config = ServerConfig::load(args.config.as_deref())?;

    if let Some(host) = args.host {
        server_config.server.host = host;
    }
    if let Some(port) = args.port {
        server_config.server.port = port;
    }
    if let Some(database_url) = args.database_url {
        server_config.database.url = database_url;
    }
    if let Some(redis_url) = args.redis_url {
        server_config.redis.url = redis_url;
    }
    server_config.logging.level = args.log_level;
    server_config.logging.format = args.log_format;

    init_logging(&server_config.logging)?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        "Starting Keygate API server"
    );

    let auth_config = build_auth_config(&server_config, args.dev_mode)?;

    let db = init_database(&server_config).await?;

    let mailer: Arc<dyn Mailer> = Arc::new(LogMailer::new(&auth_config.frontend_url));
    let auth = Arc::new(AuthService::new(db.clone(), mailer, auth_config));

    // Expired-row sweeper runs on its own schedule
    let sweeper = spawn_sweeper(db.clone(), server_config.server.sweep_interval());

    let state = Arc::new(AppState::new(db, auth));

    let api_config = ApiConfig {
        enable_cors: server_config.api.enable_cors,
        cors_origins: server_config.api.cors_origins.clone(),
        enable_compression: server_config.api.enable_compression,
        enable_tracing: server_config.api.enable_tracing,
    };

    let app = create_router(state, api_config);

    let addr = server_config.server.socket_addr()?;

    tracing::info!(
        host = %server_config.server.host,
        port = %server_config.server.port,
        "Server listening"
    );

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(server_config.server.shutdown_timeout()))
        .await?;

    sweeper.abort();

    tracing::info!("Server shutdown complete");

    Ok(())
}

/// Initialize tracing/logging
fn init_logging(config: &config::LoggingSettings) -> anyhow::Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let subscriber = tracing_subscriber::registry().with(env_filter);

    match config.format.as_str() {
        "json" => {
            subscriber.with(fmt::layer().json().with_target(true)).init();
        }
        _ => {
            subscriber
                .with(fmt::layer().pretty().with_target(true))
                .init();
        }
    }

    Ok(())
}

/// Map the flat server settings onto the engine configuration and validate it
fn build_auth_config(config: &ServerConfig, dev_mode: bool) -> anyhow::Result<AuthConfig> {
    let mut auth_config = AuthConfig::default();

    auth_config.jwt.access_secret = config.auth.access_token_secret.clone();
    auth_config.jwt.refresh_secret = config.auth.refresh_token_secret.clone();
    auth_config.jwt.access_token_lifetime =
        Duration::from_secs(config.auth.access_token_lifetime_secs);
    auth_config.jwt.refresh_token_lifetime =
        Duration::from_secs(config.auth.refresh_token_lifetime_secs);
    auth_config.jwt.issuer = config.auth.jwt_issuer.clone();
    auth_config.jwt.audience = config.auth.jwt_audience.clone();

    auth_config.frontend_url = config.auth.frontend_url.clone();

    auth_config.rate_limit.max_requests = config.auth.rate_limit_max;
    auth_config.rate_limit.window = Duration::from_secs(config.auth.rate_limit_window_secs);

    auth_config.oauth.google.client_id = config.oauth.google.client_id.clone();
    auth_config.oauth.google.client_secret = config.oauth.google.client_secret.clone();
    auth_config.oauth.google.redirect_url = config.oauth.google.redirect_url.clone();
    auth_config.oauth.github.client_id = config.oauth.github.client_id.clone();
    auth_config.oauth.github.client_secret = config.oauth.github.client_secret.clone();
    auth_config.oauth.github.redirect_url = config.oauth.github.redirect_url.clone();

    if dev_mode {
        if auth_config.jwt.access_secret.is_empty() {
            tracing::warn!("dev mode: generating an ephemeral access-token secret");
            auth_config.jwt.access_secret = keygate_auth::random_token();
        }
        if auth_config.jwt.refresh_secret.is_empty() {
            tracing::warn!("dev mode: generating an ephemeral refresh-token secret");
            auth_config.jwt.refresh_secret = keygate_auth::random_token();
        }
    }

    if let Err(errors) = auth_config.validate() {
        anyhow::bail!("Invalid auth configuration:\n  - {}", errors.join("\n  - "));
    }

    Ok(auth_config)
}

/// Initialize database connections and run migrations
async fn init_database(config: &ServerConfig) -> anyhow::Result<Arc<Database>> {
    tracing::info!("Connecting to stores...");

    let db_config = DbConfig {
        postgres_url: config.database.url.clone(),
        redis_url: config.redis.url.clone(),
        pg_max_connections: config.database.max_connections,
        pg_min_connections: config.database.min_connections,
        pg_acquire_timeout_secs: config.database.acquire_timeout_secs,
    };

    let db = Database::connect(&db_config).await?;

    if config.database.run_migrations {
        db.migrate().await?;
    }

    let health = db.health_check().await?;
    if !health.healthy {
        anyhow::bail!(
            "Store health check failed (postgres: {}, redis: {})",
            health.postgres,
            health.redis
        );
    }

    tracing::info!(
        postgres = health.postgres,
        redis = health.redis,
        "Store health check passed"
    );

    Ok(Arc::new(db))
}

/// Wait for Ctrl+C or SIGTERM, then allow in-flight requests to drain
async fn shutdown_signal(timeout: Duration) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown...");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown...");
        }
    }

    tracing::info!(
        timeout_secs = timeout.as_secs(),
        "Waiting for in-flight requests to complete..."
    );

    tokio::time::sleep(timeout).await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parsing() {
        let args = Args::parse_from(["keygate-server", "--port", "8080"]);
        assert_eq!(args.port, Some(8080));
        assert!(!args.dev_mode);
    }

    #[test]
    fn test_auth_config_requires_secrets() {
        let config = ServerConfig::default();
        assert!(build_auth_config(&config, false).is_err());
    }

    #[test]
    fn test_dev_mode_generates_secrets() {
        let config = ServerConfig::default();
        let auth_config = build_auth_config(&config, true).unwrap();
        assert!(auth_config.jwt.access_secret.len() >= 32);
        assert_ne!(
            auth_config.jwt.access_secret,
            auth_config.jwt.refresh_secret
        );
    }
}
