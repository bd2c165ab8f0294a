use quickpoll_backend::{
    app,
    config::Config,
    db,
    realtime::ConnectionRegistry,
    startup::{AppState, spawn_pool_health_check},
};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    // initialize tracing, RUST_LOG defaults to info
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid configuration: {e}");
            std::process::exit(1);
        }
    };

    info!("Starting up application...");
    let pool = db::init_db(&config.database_url)
        .await
        .expect("Unable to connect to database");
    info!("Database initialized");

    spawn_pool_health_check(pool.clone());

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let app_state = AppState::new(pool.clone(), config);
    let registry = Arc::clone(app_state.registry());

    info!("listening on {addr}");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Unable to spawn tcp listener");

    axum::serve(listener, app(app_state))
        .with_graceful_shutdown(shutdown_signal(registry))
        .await
        .expect("Server error");

    pool.close().await;
    info!("Shut down cleanly");
}

/// Resolves on Ctrl-C or SIGTERM, after closing every live WebSocket.
async fn shutdown_signal(registry: Arc<ConnectionRegistry>) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutting down application...");
    let closed = registry.clear();
    info!(closed, "Closed live connections");
}
