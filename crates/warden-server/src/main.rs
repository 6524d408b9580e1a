use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

mod cli;
mod config;
mod keys;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("warden=info,tower_http=debug")),
        )
        .init();

    let args = cli::Args::parse();
    let config = config::Config::load(&args.config)?;

    ensure_database_dir(&config.database.url);

    let db = warden_db::create_pool(&config.database.url, config.database.max_connections).await?;
    warden_db::run_migrations(&db).await?;

    let keys = keys::load_or_generate(
        config.auth.private_key_path.as_deref(),
        config.auth.public_key_path.as_deref(),
    )?;

    let state = warden_core::AppState {
        db: db.clone(),
        config: warden_core::AppConfig {
            token_pepper: config.auth.token_pepper.clone(),
            access_token_ttl_seconds: config.auth.access_token_ttl_seconds,
            refresh_token_ttl_seconds: config.auth.refresh_token_ttl_seconds,
            reset_token_ttl_seconds: config.auth.reset_token_ttl_seconds,
            cookie_secure: config.server.cookie_secure,
        },
        keys,
        notifier: Arc::new(warden_core::LogNotifier),
    };

    if let (Some(email), Some(password)) = (
        config.admin_seed.email.as_deref(),
        config.admin_seed.password.as_deref(),
    ) {
        warden_core::auth::bootstrap_admin(&state, email, password).await?;
    }

    let router = warden_api::build_router().with_state(state);

    let listener = tokio::net::TcpListener::bind(&config.server.bind_address).await?;
    tracing::info!("listening on {}", config.server.bind_address);
    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    db.close().await;
    Ok(())
}

fn ensure_database_dir(database_url: &str) {
    let Some(path) = database_url.strip_prefix("sqlite://") else {
        return;
    };
    if path.starts_with(':') {
        return; // in-memory
    }
    let file = path.split('?').next().unwrap_or(path);
    if let Some(parent) = std::path::Path::new(file).parent() {
        if !parent.as_os_str().is_empty() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                tracing::warn!("Could not create directory '{}': {}", parent.display(), e);
            }
        }
    }
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received, draining connections");
}
