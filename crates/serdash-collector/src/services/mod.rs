//! Сервисный слой: реестр, коды регистрации, токены, приём метрик, сканер.

pub mod cleanup_service;
pub mod ingest_service;
pub mod ledger_service;
pub mod lenient;
pub mod registry_service;
pub mod scanner;
pub mod token_service;
