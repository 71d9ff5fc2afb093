use std::time::Instant;

use anyhow::Context;
use axum::{extract::State, http::StatusCode, routing::get, Router};
use serde_json::{json, Value};
use sysinfo::System;
use time::{format_description::well_known::Rfc3339, OffsetDateTime};
use tracing::{instrument, warn};

use crate::{cache::cache_status, errors::AppError, extract::Json, state::AppState};

pub fn health_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/health/ready", get(ready))
        .route("/health/live", get(live))
        .route("/health/details", get(details))
}

pub async fn root(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "service": state.config.service_name,
        "version": env!("CARGO_PKG_VERSION"),
        "environment": state.config.environment,
        "health": "/health",
    }))
}

#[instrument(skip(state))]
pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    let cache = cache_status(state.cache.as_ref()).await;
    match state.store().ping().await {
        Ok(()) => (
            StatusCode::OK,
            Json(json!({
                "status": "healthy",
                "service": "ok",
                "database": "ok",
                "cache": cache,
            })),
        ),
        Err(e) => {
            warn!(error = %e, "health check: database unreachable");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "detail": {
                        "status": "unhealthy",
                        "service": "ok",
                        "database": "error: store unavailable",
                        "cache": cache,
                    }
                })),
            )
        }
    }
}

#[instrument(skip(state))]
pub async fn ready(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    match state.store().ping().await {
        Ok(()) => (StatusCode::OK, Json(json!({ "status": "ready" }))),
        Err(e) => {
            warn!(error = %e, "readiness check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "detail": {
                        "status": "not ready",
                        "reason": "database not available",
                    }
                })),
            )
        }
    }
}

pub async fn live() -> Json<Value> {
    Json(json!({ "status": "alive" }))
}

/// Diagnostic snapshot. A store failure is reported in the body, not the status.
#[instrument(skip(state))]
pub async fn details(State(state): State<AppState>) -> Result<Json<Value>, AppError> {
    let timestamp = OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .context("format timestamp")?;

    let started = Instant::now();
    let database = match state.store().ping().await {
        Ok(()) => {
            let ms = started.elapsed().as_secs_f64() * 1000.0;
            json!({ "status": "ok", "response_time": format!("{ms:.2}ms") })
        }
        Err(e) => {
            warn!(error = %e, "details: database unreachable");
            json!({ "status": "error", "error": "store unavailable" })
        }
    };

    let cache = cache_status(state.cache.as_ref()).await;

    Ok(Json(json!({
        "service": {
            "status": "ok",
            "timestamp": timestamp,
            "uptime_seconds": state.started_at.elapsed().as_secs(),
            "version": env!("CARGO_PKG_VERSION"),
        },
        "system": system_snapshot(),
        "database": database,
        "cache": { "status": cache },
    })))
}

fn system_snapshot() -> Value {
    let mut sys = System::new();
    sys.refresh_memory();
    let total = sys.total_memory();
    let memory_percent = if total == 0 {
        0.0
    } else {
        (sys.used_memory() as f64 / total as f64 * 1000.0).round() / 10.0
    };
    let cpu_count = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);

    json!({
        "platform": System::long_os_version().unwrap_or_else(|| std::env::consts::OS.to_string()),
        "arch": std::env::consts::ARCH,
        "cpu_count": cpu_count,
        "memory_percent": memory_percent,
    })
}
