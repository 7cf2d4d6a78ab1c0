//! Маршруты агентов: регистрация по коду и приём метрик.

use crate::api::middleware::AuthenticatedAgent;
use crate::api::AppState;
use crate::error::{parse_json, AppError};
use crate::services::ingest_service::{self, MetricsBatch};
use crate::services::{ledger_service, registry_service, token_service};
use axum::body::Bytes;
use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

/// Запрос регистрации: код — единственный секрет.
#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    #[serde(default)]
    pub code: Option<String>,
    /// PEM SubjectPublicKeyInfo ключа Ed25519
    #[serde(default)]
    pub public_key: Option<String>,
    #[serde(default)]
    pub hostname: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub success: bool,
    pub agent_id: i32,
}

#[derive(Debug, Serialize)]
pub struct SuccessResponse {
    pub success: bool,
}

pub fn register_routes() -> Router<AppState> {
    Router::new().route("/register", post(register))
}

pub fn metrics_routes() -> Router<AppState> {
    Router::new().route("/metrics", post(ingest_metrics))
}

/// POST /v1/register — погасить код и привязать публичный ключ агента.
async fn register(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<RegisterResponse>, AppError> {
    let req: RegisterRequest = parse_json(&body)?;

    let code = req.code.as_deref().map(str::trim).unwrap_or_default();
    let public_key = req.public_key.as_deref().map(str::trim).unwrap_or_default();
    if code.is_empty() || public_key.is_empty() {
        return Err(AppError::BadRequest("Missing code or public_key".into()));
    }

    // Ключ проверяется до погашения, чтобы не сжечь код впустую
    token_service::pem_to_verifying_key(public_key)
        .map_err(|e| AppError::BadRequest(format!("Invalid public_key: {e}")))?;

    let hostname = req.hostname.as_deref().unwrap_or_default();
    let agent_id = ledger_service::redeem(&state.db, code, public_key, hostname)
        .await
        .inspect_err(|e| tracing::warn!("Регистрация отклонена: {e}"))?;

    tracing::info!("Агент зарегистрирован: сервер {agent_id}");
    Ok(Json(RegisterResponse {
        success: true,
        agent_id,
    }))
}

/// POST /v1/metrics — принять пакет метрик аутентифицированного агента.
///
/// Экстрактор только проверяет токен; `last_seen_at` обновляется лишь после
/// разбора тела и записи пакета.
async fn ingest_metrics(
    State(state): State<AppState>,
    AuthenticatedAgent(agent): AuthenticatedAgent,
    body: Bytes,
) -> Result<Json<SuccessResponse>, AppError> {
    let batch: MetricsBatch = parse_json(&body)?;
    let report = ingest_service::ingest(&state.db, &agent, batch).await?;
    registry_service::touch_last_seen(&state.db, agent.server_id()).await?;

    tracing::debug!(
        "Метрики сервера {}: {} строк, пропущено {}",
        agent.server_id(),
        report.rows(),
        report.skipped
    );
    Ok(Json(SuccessResponse { success: true }))
}
