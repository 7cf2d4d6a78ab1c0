//! Агент serdash: ключ Ed25519, регистрация по коду, сбор и отправка метрик.

pub mod auth;
pub mod collect;
pub mod config;
pub mod error;
pub mod publisher;

pub use auth::AgentIdentity;
pub use error::AgentError;

#[cfg(test)]
mod tests;
