//! Проверка bearer-токенов агентов (EdDSA JWT).
//!
//! Двухфазный протокол: ключ проверки неизвестен, пока не определён агент,
//! поэтому сначала читаются непроверенные claims ([`peek_claims`]), затем
//! токен декодируется повторно с обязательной проверкой подписи ключом,
//! привязанным к серверу ([`verify`]). Доверенный результат существует только
//! в виде [`VerifiedAgent`], который нельзя построить вне этого модуля.

use crate::error::AppError;
use crate::services::registry_service::{self, RegistryError};
use base64::engine::general_purpose::{STANDARD as BASE64, URL_SAFE_NO_PAD};
use base64::Engine;
use ed25519_dalek::{VerifyingKey, PUBLIC_KEY_LENGTH};
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use sea_orm::ConnectionTrait;
use serde::{Deserialize, Deserializer};
use thiserror::Error;

/// Единственный допустимый алгоритм подписи.
pub const TOKEN_ALGORITHM: Algorithm = Algorithm::EdDSA;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Missing Authorization header")]
    MissingToken,

    #[error("Invalid token: {0}")]
    InvalidToken(String),

    #[error("Unknown agent")]
    UnknownAgent(i64),

    #[error("Agent not registered")]
    NotRegistered(i32),

    #[error("Invalid signature: {0}")]
    InvalidSignature(String),

    #[error(transparent)]
    Db(#[from] sea_orm::DbErr),
}

impl From<AuthError> for AppError {
    fn from(e: AuthError) -> Self {
        match e {
            AuthError::Db(db) => db.into(),
            other => AppError::Unauthorized(other.to_string()),
        }
    }
}

/// Непроверенные claims: только для выбора ключа, никогда для записи в БД.
#[derive(Debug, Clone, Deserialize)]
pub struct UntrustedClaims {
    #[serde(default, deserialize_with = "lenient_agent_id")]
    agent_id: Option<i64>,
}

impl UntrustedClaims {
    /// Заявленный идентификатор агента, если он положительный.
    pub fn claimed_agent_id(&self) -> Option<i64> {
        self.agent_id.filter(|id| *id > 0)
    }
}

/// Агент, чей токен прошёл проверку подписи привязанным ключом.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedAgent {
    server_id: i32,
}

impl VerifiedAgent {
    pub fn server_id(&self) -> i32 {
        self.server_id
    }
}

/// Фаза 1: прочитать claims без проверки подписи.
///
/// Payload декодируется напрямую, заголовок не разбирается: алгоритм
/// проверяется только во второй фазе.
pub fn peek_claims(token: &str) -> Result<UntrustedClaims, AuthError> {
    let mut segments = token.split('.');
    let (Some(_header), Some(payload), Some(_signature), None) = (
        segments.next(),
        segments.next(),
        segments.next(),
        segments.next(),
    ) else {
        return Err(AuthError::InvalidToken("malformed token".into()));
    };

    let raw = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .map_err(|e| AuthError::InvalidToken(e.to_string()))?;
    serde_json::from_slice(&raw).map_err(|e| AuthError::InvalidToken(e.to_string()))
}

/// Алгоритм из заголовка должен быть EdDSA; иной или отсутствующий — неверная подпись.
fn check_algorithm(token: &str) -> Result<(), AuthError> {
    let header = token.split('.').next().unwrap_or_default();
    let header: serde_json::Value = URL_SAFE_NO_PAD
        .decode(header.trim_end_matches('='))
        .ok()
        .and_then(|raw| serde_json::from_slice(&raw).ok())
        .ok_or_else(|| AuthError::InvalidSignature("malformed header".into()))?;

    match header.get("alg").and_then(serde_json::Value::as_str) {
        Some("EdDSA") => Ok(()),
        Some(other) => Err(AuthError::InvalidSignature(format!(
            "unexpected algorithm {other}"
        ))),
        None => Err(AuthError::InvalidSignature("missing algorithm".into())),
    }
}

/// Извлечь сырой 32-байтовый ключ Ed25519 из PEM (SubjectPublicKeyInfo).
///
/// Ключ Ed25519 занимает последние 32 байта DER-контейнера.
pub fn pem_to_verifying_key(pem: &str) -> Result<VerifyingKey, String> {
    let body: String = pem
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with("-----"))
        .collect();
    let der = BASE64
        .decode(body.as_bytes())
        .map_err(|e| format!("некорректный PEM: {e}"))?;
    if der.len() < PUBLIC_KEY_LENGTH {
        return Err(format!("ключ слишком короткий: {} байт", der.len()));
    }

    let mut raw = [0u8; PUBLIC_KEY_LENGTH];
    raw.copy_from_slice(&der[der.len() - PUBLIC_KEY_LENGTH..]);
    VerifyingKey::from_bytes(&raw).map_err(|e| format!("некорректный ключ Ed25519: {e}"))
}

/// Фаза 2: аутентифицировать токен ключом, привязанным к заявленному серверу.
///
/// Только чтение: `last_seen_at` обновляет вызывающий после успешной обработки запроса.
pub async fn verify<C: ConnectionTrait>(db: &C, token: &str) -> Result<VerifiedAgent, AuthError> {
    let token = token.trim();
    if token.is_empty() {
        return Err(AuthError::InvalidToken("empty token".into()));
    }

    let claimed = peek_claims(token)?
        .claimed_agent_id()
        .ok_or_else(|| AuthError::InvalidToken("missing agent_id".into()))?;
    let server_id = i32::try_from(claimed).map_err(|_| AuthError::UnknownAgent(claimed))?;

    let server = match registry_service::lookup(db, server_id).await {
        Ok(server) => server,
        Err(RegistryError::NotFound(_)) => return Err(AuthError::UnknownAgent(claimed)),
        Err(RegistryError::Conflict(id)) => return Err(AuthError::NotRegistered(id)),
        Err(RegistryError::Db(e)) => return Err(AuthError::Db(e)),
    };
    let pem = server.bound_key().ok_or(AuthError::NotRegistered(server_id))?;

    check_algorithm(token)?;
    let key = pem_to_verifying_key(pem).map_err(AuthError::InvalidSignature)?;
    let mut validation = Validation::new(TOKEN_ALGORITHM);
    validation.required_spec_claims.clear();
    validation.validate_aud = false;

    jsonwebtoken::decode::<serde_json::Value>(
        token,
        &DecodingKey::from_ed_der(key.as_bytes()),
        &validation,
    )
    .map_err(|e| AuthError::InvalidSignature(e.to_string()))?;

    Ok(VerifiedAgent { server_id })
}

/// agent_id может прийти числом или строкой с числом.
fn lenient_agent_id<'de, D: Deserializer<'de>>(d: D) -> Result<Option<i64>, D::Error> {
    let value = serde_json::Value::deserialize(d)?;
    Ok(match value {
        serde_json::Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    })
}
