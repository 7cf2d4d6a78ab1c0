//! Фоновая задача очистки: удаление просроченных кодов регистрации.

use crate::services::ledger_service;
use sea_orm::DatabaseConnection;
use tokio::sync::watch;

/// Период очистки.
const CLEANUP_INTERVAL: tokio::time::Duration = tokio::time::Duration::from_secs(60);

/// Запустить цикл очистки (раз в минуту) до сигнала завершения.
pub async fn run_cleanup_loop(db: DatabaseConnection, mut shutdown_rx: watch::Receiver<bool>) {
    let mut interval = tokio::time::interval(CLEANUP_INTERVAL);
    interval.tick().await; // первый тик срабатывает сразу

    loop {
        tokio::select! {
            _ = interval.tick() => {}
            _ = shutdown_rx.changed() => break,
        }

        match ledger_service::purge_expired(&db).await {
            Ok(0) => {}
            Ok(n) => tracing::info!("Удалено просроченных кодов регистрации: {n}"),
            Err(e) => tracing::error!("Ошибка очистки кодов регистрации: {e}"),
        }
    }
}
