use std::sync::Arc;

use anyhow::Context;
use tokio::signal;
use tracing::info;

use user_service::{
    app::build_app, cache, config::AppConfig, db, state::AppState, users::repo::PgUserStore,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let env_filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "user_service=debug,tower_http=info".to_string());
    let json_logs = std::env::var("LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(false);

    if json_logs {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }

    let config = AppConfig::from_env()?;
    info!(
        service = %config.service_name,
        environment = %config.environment,
        rate_limit_per_minute = config.rate_limit_per_minute,
        "starting"
    );

    let db = db::connect(&config.database).await?;
    db::migrate(&db, &config.database).await?;

    let cache = cache::connect_best_effort(config.redis_url.as_deref()).await;
    let addr = config.bind_addr();

    let state = AppState::new(
        config,
        Arc::new(PgUserStore::new(db.clone())),
        cache.clone(),
    )?;
    let app = build_app(state);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("bind {addr}"))?;
    info!("listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // serve drops the router, so this is the last handle.
    if let Some(cache) = cache {
        drop(cache);
        info!("cache connection closed");
    }
    db.close().await;
    info!("database pool closed");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut s) => {
                s.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
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
    info!("shutdown signal received");
}
