//! Ошибки агента.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("Ошибка ключа: {0}")]
    Key(String),

    #[error("Ошибка токена: {0}")]
    Token(#[from] jsonwebtoken::errors::Error),

    #[error("Ошибка ввода-вывода: {0}")]
    Io(#[from] std::io::Error),

    #[error("Ошибка HTTP: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Коллектор отклонил запрос ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("Агент не зарегистрирован: выполните `serdash-agent register <url> <code>`")]
    NotRegistered,

    #[error("Не задан URL коллектора: укажите --url или выполните register")]
    MissingCollectorUrl,
}
