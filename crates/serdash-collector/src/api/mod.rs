//! HTTP API: маршрутизация и состояние приложения.

pub mod admin_routes;
pub mod agent_routes;
pub mod discovery_routes;
pub mod middleware;
pub mod rate_limit;

use crate::services::scanner::SubnetScanner;
use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use rate_limit::RateLimiter;
use sea_orm::{ConnectionTrait, DatabaseConnection};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Общее состояние приложения.
#[derive(Clone)]
pub struct AppState {
    pub db: DatabaseConnection,
    /// Токен API провижининга; `None` — API отключено
    pub admin_token: Option<Arc<str>>,
    /// Подсеть для /v1/discover без параметра
    pub discovery_subnet: Option<String>,
    pub code_ttl: chrono::Duration,
    pub scanner: Arc<dyn SubnetScanner>,
    pub rate_limiter: RateLimiter,
}

/// Построить маршрутизатор Axum.
pub fn build_router(state: AppState) -> Router {
    // Ограничение частоты только на регистрации: код перебирается вслепую
    let limiter = state.rate_limiter.clone();
    let register_routes = agent_routes::register_routes().layer(axum::middleware::from_fn(
        move |req, next| {
            let limiter = limiter.clone();
            rate_limit::rate_limit_middleware(limiter, req, next)
        },
    ));

    let v1 = Router::new()
        .merge(register_routes)
        .merge(agent_routes::metrics_routes())
        .merge(discovery_routes::routes())
        .nest("/admin", admin_routes::routes());

    Router::new()
        .route("/health", get(health_check))
        .nest("/v1", v1)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// GET /health — проверка работоспособности.
async fn health_check(State(state): State<AppState>) -> Json<serde_json::Value> {
    let db_ok = state.db.execute_unprepared("SELECT 1").await.is_ok();
    Json(serde_json::json!({
        "status": "ok",
        "database": db_ok,
        "service": "serdash-collector"
    }))
}
