//! Коллектор serdash: регистрация агентов, приём подписанной телеметрии,
//! обнаружение хостов в подсети.

pub mod api;
pub mod config;
pub mod error;
pub mod services;


use api::rate_limit::RateLimiter;
use api::AppState;
use config::ServerConfig;
use sea_orm::{Database, DatabaseConnection};
use serdash_migration::{Migrator, MigratorTrait};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::info;

/// Запустить коллектор.
pub async fn run(config: ServerConfig) -> anyhow::Result<()> {
    // 1. Подключение к БД
    info!("Подключение к базе данных...");
    let db: DatabaseConnection = Database::connect(&config.db_url).await?;

    // 2. Автоматические миграции
    info!("Выполнение миграций...");
    Migrator::up(&db, None).await?;

    if config.admin_token.is_none() {
        tracing::warn!("SERDASH_ADMIN_TOKEN не задан: API провижининга отключено");
    }

    // 3. Стратегия сканирования выбирается один раз
    let scanner = services::scanner::detect(config.scan_timeout).await;

    // 4. Состояние приложения
    let state = AppState {
        db: db.clone(),
        admin_token: config.admin_token.as_deref().map(Arc::from),
        discovery_subnet: config.discovery_subnet.clone(),
        code_ttl: chrono::Duration::from_std(config.code_ttl)?,
        scanner,
        rate_limiter: RateLimiter::new(
            config.register_rate_limit,
            Duration::from_secs(60),
            config.trust_proxy,
        ),
    };
    let app = api::build_router(state);

    // 5. Graceful shutdown
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Получен сигнал завершения, останавливаю коллектор...");
        let _ = shutdown_tx.send(true);
    });

    // 6. Фоновая очистка просроченных кодов
    tokio::spawn(services::cleanup_service::run_cleanup_loop(
        db.clone(),
        shutdown_rx.clone(),
    ));

    // 7. Запуск сервера
    let addr: SocketAddr = config.listen.parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Коллектор слушает {addr}");

    let mut shutdown_rx = shutdown_rx;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move {
        while !*shutdown_rx.borrow_and_update() {
            if shutdown_rx.changed().await.is_err() {
                break;
            }
        }
    })
    .await?;

    db.close().await?;
    info!("Коллектор остановлен");
    Ok(())
}
