//! Экстракторы аутентификации: агент (EdDSA JWT) и администратор (статический токен).

use crate::api::AppState;
use crate::config::verify_admin_token;
use crate::error::AppError;
use crate::services::token_service::{self, AuthError, VerifiedAgent};
use axum::extract::FromRequestParts;
use axum::http::request::Parts;

/// Агент, прошедший проверку подписи токена.
pub struct AuthenticatedAgent(pub VerifiedAgent);

/// Оператор с действующим токеном администратора.
pub struct AdminUser;

impl FromRequestParts<AppState> for AuthenticatedAgent {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = extract_bearer_token(parts)?;
        match token_service::verify(&state.db, token).await {
            Ok(agent) => Ok(AuthenticatedAgent(agent)),
            Err(e) => {
                if !matches!(e, AuthError::Db(_)) {
                    tracing::warn!("Отклонён токен агента: {e}");
                }
                Err(e.into())
            }
        }
    }
}

impl FromRequestParts<AppState> for AdminUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let Some(expected) = state.admin_token.as_deref() else {
            return Err(AppError::Unauthorized("Admin API disabled".into()));
        };
        let token = extract_bearer_token(parts)?;
        if !verify_admin_token(token, expected) {
            tracing::warn!("Неверный токен администратора");
            return Err(AppError::Unauthorized("Invalid admin token".into()));
        }
        Ok(AdminUser)
    }
}

/// Достать токен из `Authorization: Bearer <token>` (схема без учёта регистра).
pub fn extract_bearer_token(parts: &Parts) -> Result<&str, AppError> {
    let header = parts
        .headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AppError::from(AuthError::MissingToken))?
        .trim();

    let token = match header.split_once(char::is_whitespace) {
        Some((scheme, rest)) if scheme.eq_ignore_ascii_case("bearer") => rest.trim(),
        _ => header,
    };
    if token.is_empty() {
        return Err(AuthError::InvalidToken("empty token".into()).into());
    }
    Ok(token)
}
