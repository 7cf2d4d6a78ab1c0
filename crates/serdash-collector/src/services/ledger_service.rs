//! Журнал одноразовых кодов регистрации: выпуск и погашение.

use crate::error::AppError;
use crate::services::registry_service::{self, RegistryError};
use chrono::{DateTime, Duration, Utc};
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, ConnectionTrait, DatabaseConnection,
    EntityTrait, QueryFilter, TransactionTrait,
};
use serdash_entities::registration_codes::{ActiveModel, Column, Entity as CodeEntity};
use serdash_entities::servers::ServerStatus;
use thiserror::Error;

/// Число случайных байт кода: 4 байта = 8 hex-символов.
const CODE_BYTES: usize = 4;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Invalid or expired registration code")]
    InvalidOrExpired,

    #[error("Сервер {0} не найден")]
    UnknownServer(i32),

    #[error("Сервер {0} уже зарегистрирован")]
    Conflict(i32),

    #[error("Не удалось сгенерировать код: {0}")]
    Entropy(String),

    #[error("Время жизни кода вне допустимого диапазона")]
    TtlOutOfRange,

    #[error(transparent)]
    Db(#[from] sea_orm::DbErr),
}

impl From<LedgerError> for AppError {
    fn from(e: LedgerError) -> Self {
        match e {
            LedgerError::InvalidOrExpired | LedgerError::UnknownServer(_) => {
                AppError::NotFound(e.to_string())
            }
            LedgerError::Conflict(_) => AppError::Conflict(e.to_string()),
            LedgerError::Entropy(m) => AppError::Internal(m),
            LedgerError::TtlOutOfRange => AppError::Internal(e.to_string()),
            LedgerError::Db(db) => db.into(),
        }
    }
}

impl From<RegistryError> for LedgerError {
    fn from(e: RegistryError) -> Self {
        match e {
            RegistryError::NotFound(id) => LedgerError::UnknownServer(id),
            RegistryError::Conflict(id) => LedgerError::Conflict(id),
            RegistryError::Db(db) => LedgerError::Db(db),
        }
    }
}

/// Выпущенный код регистрации.
#[derive(Debug, Clone)]
pub struct IssuedCode {
    pub server_id: i32,
    pub code: String,
    pub expires_at: DateTime<Utc>,
}

/// Сгенерировать код: hex в верхнем регистре для ручного ввода.
pub fn generate_code() -> Result<String, LedgerError> {
    let mut buf = [0u8; CODE_BYTES];
    getrandom::fill(&mut buf).map_err(|e| LedgerError::Entropy(e.to_string()))?;
    Ok(hex::encode_upper(buf))
}

/// Нормализовать код, введённый человеком.
pub fn normalize_code(code: &str) -> String {
    code.trim().to_ascii_uppercase()
}

/// Выпустить код для сервера, ожидающего регистрации.
pub async fn issue<C: ConnectionTrait>(
    db: &C,
    server_id: i32,
    ttl: Duration,
) -> Result<IssuedCode, LedgerError> {
    let server = registry_service::lookup(db, server_id).await?;
    if server.status != ServerStatus::PendingRegistration {
        return Err(LedgerError::Conflict(server_id));
    }

    let now = Utc::now();
    let expires_at = now
        .checked_add_signed(ttl)
        .ok_or(LedgerError::TtlOutOfRange)?;
    let code = generate_code()?;

    ActiveModel {
        server_id: Set(Some(server_id)),
        code: Set(code.clone()),
        expires_at: Set(expires_at),
        created_at: Set(now),
        ..Default::default()
    }
    .insert(db)
    .await?;

    tracing::info!("Выпущен код регистрации для сервера {server_id} (до {expires_at})");

    Ok(IssuedCode {
        server_id,
        code,
        expires_at,
    })
}

/// Погасить код: привязать ключ к серверу и удалить код одной транзакцией.
///
/// Код «захватывается» условным удалением до привязки ключа: из двух
/// конкурентных погашений удалить строку сможет только одно, второе получит
/// `InvalidOrExpired`. Любая ошибка откатывает транзакцию целиком.
pub async fn redeem(
    db: &DatabaseConnection,
    code: &str,
    public_key_pem: &str,
    hostname: &str,
) -> Result<i32, LedgerError> {
    let code = normalize_code(code);
    let txn = db.begin().await?;

    let row = CodeEntity::find()
        .filter(Column::Code.eq(&code))
        .one(&txn)
        .await?
        .ok_or(LedgerError::InvalidOrExpired)?;

    if row.is_expired(Utc::now()) {
        return Err(LedgerError::InvalidOrExpired);
    }
    let server_id = row.server_id.ok_or(LedgerError::InvalidOrExpired)?;

    let claimed = CodeEntity::delete_many()
        .filter(Column::Id.eq(row.id))
        .exec(&txn)
        .await?;
    if claimed.rows_affected != 1 {
        return Err(LedgerError::InvalidOrExpired);
    }

    registry_service::bind_key(&txn, server_id, public_key_pem, hostname)
        .await
        .map_err(|e| match LedgerError::from(e) {
            // Код без живого сервера равносилен недействительному
            LedgerError::UnknownServer(_) => LedgerError::InvalidOrExpired,
            other => other,
        })?;

    txn.commit().await?;
    Ok(server_id)
}

/// Удалить просроченные коды. Возвращает число удалённых строк.
pub async fn purge_expired<C: ConnectionTrait>(db: &C) -> Result<u64, LedgerError> {
    let result = CodeEntity::delete_many()
        .filter(Column::ExpiresAt.lte(Utc::now()))
        .exec(db)
        .await?;
    Ok(result.rows_affected)
}
