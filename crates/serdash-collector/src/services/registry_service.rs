//! Реестр агентов: поиск, привязка ключа, last_seen, провижининг.

use crate::error::AppError;
use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter,
    QueryOrder,
};
use serdash_entities::servers::{ActiveModel, Column, Entity as ServerEntity, Model, ServerStatus};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Сервер {0} не найден")]
    NotFound(i32),

    #[error("Сервер {0} не ожидает регистрации")]
    Conflict(i32),

    #[error(transparent)]
    Db(#[from] sea_orm::DbErr),
}

impl From<RegistryError> for AppError {
    fn from(e: RegistryError) -> Self {
        match e {
            RegistryError::NotFound(_) => AppError::NotFound(e.to_string()),
            RegistryError::Conflict(_) => AppError::Conflict(e.to_string()),
            RegistryError::Db(db) => db.into(),
        }
    }
}

/// Найти сервер по id.
pub async fn lookup<C: ConnectionTrait>(db: &C, id: i32) -> Result<Model, RegistryError> {
    ServerEntity::find_by_id(id)
        .one(db)
        .await?
        .ok_or(RegistryError::NotFound(id))
}

/// Привязать публичный ключ к серверу и перевести его в `active`.
///
/// Единственная операция, меняющая статус на `active`. Обновление условное
/// (`status = pending_registration`), поэтому повторная привязка невозможна
/// даже при гонке. Пустой hostname заменяется на `server-<id>`.
pub async fn bind_key<C: ConnectionTrait>(
    db: &C,
    id: i32,
    public_key_pem: &str,
    hostname: &str,
) -> Result<(), RegistryError> {
    let now = Utc::now();
    let hostname = match hostname.trim() {
        "" => format!("server-{id}"),
        h => h.to_string(),
    };

    let result = ServerEntity::update_many()
        .col_expr(Column::AgentPublicKey, Expr::value(public_key_pem.trim()))
        .col_expr(Column::Hostname, Expr::value(hostname))
        .col_expr(Column::Status, Expr::value(ServerStatus::Active))
        .col_expr(Column::LastSeenAt, Expr::value(now))
        .col_expr(Column::UpdatedAt, Expr::value(now))
        .filter(Column::Id.eq(id))
        .filter(Column::Status.eq(ServerStatus::PendingRegistration))
        .exec(db)
        .await?;

    if result.rows_affected == 0 {
        // Различаем «нет такого» и «уже не pending»
        lookup(db, id).await?;
        return Err(RegistryError::Conflict(id));
    }

    Ok(())
}

/// Обновить время последнего контакта агента.
pub async fn touch_last_seen<C: ConnectionTrait>(db: &C, id: i32) -> Result<(), RegistryError> {
    let now = Utc::now();
    ServerEntity::update_many()
        .col_expr(Column::LastSeenAt, Expr::value(now))
        .col_expr(Column::UpdatedAt, Expr::value(now))
        .filter(Column::Id.eq(id))
        .exec(db)
        .await?;
    Ok(())
}

/// Создать сервер в состоянии `pending_registration`.
pub async fn provision<C: ConnectionTrait>(
    db: &C,
    hostname: Option<String>,
    ip: Option<String>,
) -> Result<Model, RegistryError> {
    let now = Utc::now();
    let model = ActiveModel {
        hostname: Set(hostname.filter(|h| !h.trim().is_empty())),
        ip: Set(ip.filter(|i| !i.trim().is_empty())),
        agent_public_key: Set(None),
        status: Set(ServerStatus::PendingRegistration),
        last_seen_at: Set(None),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    };
    Ok(model.insert(db).await?)
}

/// Список всех серверов по id.
pub async fn list_all<C: ConnectionTrait>(db: &C) -> Result<Vec<Model>, RegistryError> {
    Ok(ServerEntity::find()
        .order_by_asc(Column::Id)
        .all(db)
        .await?)
}

/// Удалить сервер; коды и сэмплы удаляются каскадно.
pub async fn remove<C: ConnectionTrait>(db: &C, id: i32) -> Result<(), RegistryError> {
    let result = ServerEntity::delete_by_id(id).exec(db).await?;
    if result.rows_affected == 0 {
        return Err(RegistryError::NotFound(id));
    }
    Ok(())
}
