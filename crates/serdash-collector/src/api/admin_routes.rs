//! Административные маршруты: провижининг серверов и выпуск кодов регистрации.

use crate::api::middleware::AdminUser;
use crate::api::AppState;
use crate::error::{parse_json, AppError};
use crate::services::ledger_service::{self, IssuedCode};
use crate::services::registry_service;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use sea_orm::TransactionTrait;
use serde::{Deserialize, Serialize};
use serdash_entities::servers::{Model, ServerStatus};

#[derive(Debug, Default, Deserialize)]
pub struct ProvisionRequest {
    #[serde(default)]
    pub hostname: Option<String>,
    #[serde(default)]
    pub ip: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct IssuedCodeResponse {
    pub server_id: i32,
    pub code: String,
    pub expires_at: DateTime<Utc>,
}

impl From<IssuedCode> for IssuedCodeResponse {
    fn from(c: IssuedCode) -> Self {
        Self {
            server_id: c.server_id,
            code: c.code,
            expires_at: c.expires_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ServerRow {
    pub id: i32,
    pub hostname: Option<String>,
    pub ip: Option<String>,
    pub status: ServerStatus,
    pub registered: bool,
    pub last_seen_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<Model> for ServerRow {
    fn from(s: Model) -> Self {
        Self {
            registered: s.bound_key().is_some(),
            id: s.id,
            hostname: s.hostname,
            ip: s.ip,
            status: s.status,
            last_seen_at: s.last_seen_at,
            created_at: s.created_at,
        }
    }
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/servers", get(list_servers).post(provision_server))
        .route("/servers/{id}", delete(remove_server))
        .route("/servers/{id}/codes", post(reissue_code))
}

/// POST /v1/admin/servers — создать сервер в ожидании регистрации и выдать код.
async fn provision_server(
    State(state): State<AppState>,
    _admin: AdminUser,
    body: Bytes,
) -> Result<Json<IssuedCodeResponse>, AppError> {
    let req: ProvisionRequest = if body.is_empty() {
        ProvisionRequest::default()
    } else {
        parse_json(&body)?
    };

    let txn = state.db.begin().await?;
    let server = registry_service::provision(&txn, req.hostname, req.ip).await?;
    let issued = ledger_service::issue(&txn, server.id, state.code_ttl).await?;
    txn.commit().await?;

    tracing::info!("Создан сервер {} в ожидании регистрации", server.id);
    Ok(Json(issued.into()))
}

/// GET /v1/admin/servers — список серверов.
async fn list_servers(
    State(state): State<AppState>,
    _admin: AdminUser,
) -> Result<Json<Vec<ServerRow>>, AppError> {
    let servers = registry_service::list_all(&state.db).await?;
    Ok(Json(servers.into_iter().map(ServerRow::from).collect()))
}

/// DELETE /v1/admin/servers/{id} — удалить сервер вместе с кодами и метриками.
async fn remove_server(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<i32>,
) -> Result<Json<serde_json::Value>, AppError> {
    registry_service::remove(&state.db, id).await?;
    tracing::info!("Сервер {id} удалён");
    Ok(Json(serde_json::json!({ "success": true })))
}

/// POST /v1/admin/servers/{id}/codes — новый код для сервера, ещё не прошедшего регистрацию.
async fn reissue_code(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<i32>,
) -> Result<Json<IssuedCodeResponse>, AppError> {
    let issued = ledger_service::issue(&state.db, id, state.code_ttl).await?;
    Ok(Json(issued.into()))
}
