//! `parley-server` binary: loads config, opens the database, spawns the
//! evaluation scheduler and serves the HTTP API until SIGINT/SIGTERM.

use std::net::SocketAddr;

use parley_server::config::{self, LoggingConfig};
use parley_server::{app, build_default_state, evaluation, Oracles};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

const DEFAULT_CONFIG_PATH: &str = "config.toml";

/// Where the config path came from, for the startup log.
#[derive(Debug, Clone, Copy)]
enum ConfigSource {
    Argument,
    Environment,
    Default,
}

fn config_path() -> (String, ConfigSource) {
    let non_blank = |value: String| (!value.trim().is_empty()).then_some(value);

    if let Some(path) = std::env::args().nth(1).and_then(non_blank) {
        return (path, ConfigSource::Argument);
    }
    if let Some(path) = std::env::var("PARLEY_CONFIG_PATH").ok().and_then(non_blank) {
        return (path, ConfigSource::Environment);
    }
    (DEFAULT_CONFIG_PATH.to_string(), ConfigSource::Default)
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_new(&logging.level).unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() {
    let (path, source) = config_path();
    let config = config::load_config(Some(path.as_str()))
        .unwrap_or_else(|e| panic!("cannot start without a valid configuration ({path}): {e}"));

    init_tracing(&config.logging);
    tracing::info!(path = %path, source = ?source, "configuration loaded");

    let (pool, applied) =
        parley_db::open_database(&config.database.path, config.database.runtime_settings())
            .expect("failed to open database; check database.path");
    tracing::info!(
        db_path = %config.database.path,
        migrations_applied = applied,
        "database ready"
    );

    if !config.voice_agent.is_configured() {
        tracing::warn!("voice agent api key or agent id missing; voice sessions will be rejected");
    }

    let oracles = Oracles::from_config(&config).expect("failed to build oracle clients");
    let state = build_default_state(&config, pool, oracles);

    tokio::spawn(evaluation::start_evaluation_task(
        state.evaluator.clone(),
        config.evaluation.interval_seconds,
    ));

    let addr = SocketAddr::new(config.server.host, config.server.port);
    let listener = TcpListener::bind(addr)
        .await
        .unwrap_or_else(|e| panic!("failed to bind {addr}: {e}"));
    tracing::info!(%addr, version = env!("CARGO_PKG_VERSION"), "parley server listening");

    axum::serve(
        listener,
        app(state).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .expect("server error");

    tracing::info!("parley server stopped");
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut terminate = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                result.expect("failed to listen for SIGINT");
                tracing::info!(signal = "SIGINT", "shutting down");
            }
            _ = terminate.recv() => {
                tracing::info!(signal = "SIGTERM", "shutting down");
            }
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to listen for Ctrl+C");
        tracing::info!(signal = "ctrl-c", "shutting down");
    }
}
