use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use serde_json::Value;
use tower::ServiceExt;

use crate::{
    app::build_app,
    config::AppConfig,
    state::AppState,
    users::{
        memory::MemoryUserStore, password::cheap_hasher, repo::UserStore,
        services::AccountService,
    },
};

pub fn test_config() -> AppConfig {
    AppConfig::from_lookup(|key| match key {
        "DATABASE_URL" => Some("postgres://test@localhost/test".into()),
        _ => None,
    })
    .expect("test config")
}

pub fn state_with_store(store: Arc<dyn UserStore>) -> AppState {
    AppState::from_parts(
        Arc::new(test_config()),
        AccountService::new(store, cheap_hasher()),
        None,
    )
}

pub fn app_with_store(store: Arc<dyn UserStore>) -> Router {
    build_app(state_with_store(store))
}

pub fn test_app() -> Router {
    app_with_store(Arc::new(MemoryUserStore::new()))
}

/// Sends a JSON request and decodes the response; an empty body decodes to `Null`.
pub async fn send(
    app: &Router,
    method: Method,
    uri: &str,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let raw = body.map(|b| b.to_string()).unwrap_or_default();
    send_raw(app, method, uri, &raw).await
}

pub async fn send_raw(app: &Router, method: Method, uri: &str, raw: &str) -> (StatusCode, Value) {
    let mut req = Request::builder().method(method).uri(uri);
    if !raw.is_empty() {
        req = req.header(header::CONTENT_TYPE, "application/json");
    }
    let res = app
        .clone()
        .oneshot(req.body(Body::from(raw.to_owned())).unwrap())
        .await
        .unwrap();
    let status = res.status();
    let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}
