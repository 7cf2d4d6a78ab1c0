//! Конфигурация коллектора.

use std::time::Duration;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Адрес для прослушивания (например "0.0.0.0:3001")
    pub listen: String,

    /// URL подключения к БД (sqlite или postgres)
    pub db_url: String,

    /// Токен администратора для API провижининга (None — API отключено)
    pub admin_token: Option<String>,

    /// Подсеть по умолчанию для /v1/discover
    pub discovery_subnet: Option<String>,

    /// Время жизни кода регистрации
    pub code_ttl: Duration,

    /// Лимит запросов на /v1/register в минуту с одного IP
    pub register_rate_limit: u32,

    /// Брать IP клиента из X-Forwarded-For (коллектор за прокси)
    pub trust_proxy: bool,

    /// Жёсткий таймаут внешнего сканера
    pub scan_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: "0.0.0.0:3001".to_string(),
            db_url: "sqlite:./serdash.db?mode=rwc".to_string(),
            admin_token: None,
            discovery_subnet: None,
            code_ttl: Duration::from_secs(15 * 60),
            register_rate_limit: 30,
            trust_proxy: false,
            scan_timeout: Duration::from_secs(120),
        }
    }
}

/// Сравнить предъявленный токен администратора с настроенным за постоянное время.
pub fn verify_admin_token(presented: &str, expected: &str) -> bool {
    use subtle::ConstantTimeEq;

    if expected.is_empty() {
        return false;
    }
    presented.as_bytes().ct_eq(expected.as_bytes()).into()
}
