//! Маршрут обнаружения хостов в подсети.

use crate::api::AppState;
use crate::error::AppError;
use crate::services::scanner::DiscoveredHost;
use axum::extract::{Query, State};
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct DiscoverQuery {
    pub subnet: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct DiscoverResponse {
    pub success: bool,
    pub subnet: String,
    pub hosts: Vec<DiscoveredHost>,
}

pub fn routes() -> Router<AppState> {
    Router::new().route("/discover", get(discover))
}

/// GET /v1/discover?subnet=192.168.1.0/24 — синхронное сканирование подсети.
async fn discover(
    State(state): State<AppState>,
    Query(query): Query<DiscoverQuery>,
) -> Result<Json<DiscoverResponse>, AppError> {
    let subnet = query
        .subnet
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .or_else(|| {
            state
                .discovery_subnet
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        })
        .ok_or_else(|| {
            AppError::BadRequest(
                "Missing subnet. Use ?subnet=192.168.1.0/24 or set DISCOVERY_SUBNET".into(),
            )
        })?;

    tracing::info!("Обнаружение хостов в {subnet} ({})", state.scanner.name());
    let hosts = state.scanner.scan(&subnet).await?;
    tracing::info!("Обнаружено хостов в {subnet}: {}", hosts.len());

    Ok(Json(DiscoverResponse {
        success: true,
        subnet,
        hosts,
    }))
}
