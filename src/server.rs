//! HTTP 服务组装
//!
//! - `/api/echo`：受防重放中间件保护的回显接口
//! - `/health`：健康检查
//! - `/metrics`：Prometheus 指标

use std::future::Future;
use std::sync::Arc;

use axum::{
    Json, Router,
    extract::State,
    http::{HeaderMap, Method, StatusCode, header},
    middleware::from_fn_with_state,
    response::IntoResponse,
    routing::get,
};
use prometheus::{Encoder, Registry, TextEncoder};
use replay_guard::{NonceStore, ReplayGuard, register_guard_metrics, replay_protection, store};
use tokio::net::TcpListener;
use tracing::{debug, info};

use crate::config::ShieldConfig;
use crate::error::Result;

/// 共享状态
#[derive(Clone)]
pub struct AppState {
    pub name: Arc<str>,
    pub store: Arc<dyn NonceStore>,
    pub registry: Registry,
}

/// 根据配置构建路由
///
/// 返回的 `NonceStore` 需在服务退出后调用 `shutdown()`
pub async fn build_app(config: &ShieldConfig) -> Result<(Router, Arc<dyn NonceStore>)> {
    let nonce_store = store::from_config(&config.store).await?;
    let guard = ReplayGuard::new(config.guard.clone(), nonce_store.clone())?;

    let registry = Registry::new();
    register_guard_metrics(&registry)?;

    let state = AppState {
        name: Arc::from(config.name.as_str()),
        store: nonce_store.clone(),
        registry,
    };

    let protected = Router::new()
        .route(
            "/api/echo",
            get(echo_handler)
                .post(echo_handler)
                .put(echo_handler)
                .patch(echo_handler)
                .delete(echo_handler),
        )
        .layer(from_fn_with_state(guard, replay_protection));

    let app = Router::new()
        .route("/health", get(health_check_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
        .merge(protected);

    info!(
        "Replay guard enabled on /api/echo (backend: {})",
        nonce_store.backend_name()
    );

    Ok((app, nonce_store))
}

/// 在给定监听器上运行服务，`shutdown` 完成后优雅退出
pub async fn serve<F>(listener: TcpListener, app: Router, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}

async fn echo_handler(method: Method, headers: HeaderMap, body: String) -> impl IntoResponse {
    debug!("echo {} ({} bytes)", method, body.len());

    let content_type = headers
        .get(header::CONTENT_TYPE)
        .cloned()
        .unwrap_or_else(|| header::HeaderValue::from_static("text/plain; charset=utf-8"));

    ([(header::CONTENT_TYPE, content_type)], body)
}

async fn health_check_handler(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "service": state.name.as_ref(),
        "backend": state.store.backend_name(),
    }))
}

async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&state.registry.gather(), &mut buffer) {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            [(header::CONTENT_TYPE, "text/plain".to_string())],
            format!("failed to encode metrics: {e}"),
        );
    }

    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, encoder.format_type().to_string())],
        String::from_utf8_lossy(&buffer).into_owned(),
    )
}
