use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

use relay_server::auth;
use relay_server::config::{generate_config_template, Config};
use relay_server::db;
use relay_server::routes;
use relay_server::state::AppState;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load config with layered precedence: defaults < TOML < env < CLI
    let config = Config::load()?;

    // Handle --generate-config: print template and exit
    if config.generate_config {
        print!("{}", generate_config_template());
        return Ok(());
    }

    // Initialize tracing/logging
    let filter = || {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("relay_server=info"))
    };
    if config.json_logs {
        tracing_subscriber::fmt().json().with_env_filter(filter()).init();
    } else {
        tracing_subscriber::fmt().pretty().with_env_filter(filter()).init();
    }

    tracing::info!("Relay server v{} starting", env!("CARGO_PKG_VERSION"));

    let db = db::init_db(&config.data_dir)?;

    // A configured secret is shared with the account service; otherwise use a local key
    let jwt_secret = match &config.jwt_secret {
        Some(secret) if !secret.is_empty() => secret.as_bytes().to_vec(),
        _ => auth::jwt::load_or_generate_jwt_secret(&config.data_dir)?,
    };

    let mut app_state = AppState::with_sqlite(db, jwt_secret);
    app_state.heartbeat = config.heartbeat();
    app_state.collaborator_timeout = config.collaborator_timeout();

    tracing::info!(
        ping_interval = ?app_state.heartbeat.ping_interval,
        pong_timeout = ?app_state.heartbeat.pong_timeout,
        collaborator_timeout = ?app_state.collaborator_timeout,
        "Relay configured"
    );

    let app = routes::build_router(app_state, &config.allowed_origins);

    let addr = format!("{}:{}", config.bind_address, config.port);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("Listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
