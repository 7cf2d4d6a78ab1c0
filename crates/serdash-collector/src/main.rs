//! Точка входа коллектора serdash.

use anyhow::Context;
use clap::Parser;
use serdash_collector::config::ServerConfig;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "serdash-collector",
    about = "Коллектор serdash: регистрация агентов и приём метрик"
)]
struct Cli {
    /// Адрес для прослушивания (host:port)
    #[arg(long, default_value = "0.0.0.0:3001")]
    listen: String,

    /// URL базы данных
    #[arg(
        long,
        default_value = "sqlite:./serdash.db?mode=rwc",
        env = "DATABASE_URL"
    )]
    db_url: String,

    /// Токен администратора для API провижининга
    #[arg(long, env = "SERDASH_ADMIN_TOKEN", hide_env_values = true)]
    admin_token: Option<String>,

    /// Подсеть по умолчанию для /v1/discover
    #[arg(long, env = "DISCOVERY_SUBNET")]
    discovery_subnet: Option<String>,

    /// Время жизни кода регистрации, минуты
    #[arg(long, default_value_t = 15)]
    code_ttl_minutes: u64,

    /// Лимит запросов регистрации в минуту с одного IP
    #[arg(long, default_value_t = 30)]
    register_rate_limit: u32,

    /// Доверять X-Forwarded-For (запуск за обратным прокси)
    #[arg(long)]
    trust_proxy: bool,

    /// Таймаут nmap, секунды
    #[arg(long, default_value_t = 120)]
    scan_timeout_secs: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Инициализация логгера
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let code_ttl_secs = cli
        .code_ttl_minutes
        .checked_mul(60)
        .context("--code-ttl-minutes слишком велик")?;

    let config = ServerConfig {
        listen: cli.listen,
        db_url: cli.db_url,
        admin_token: cli.admin_token.filter(|t| !t.trim().is_empty()),
        discovery_subnet: cli.discovery_subnet,
        code_ttl: Duration::from_secs(code_ttl_secs),
        register_rate_limit: cli.register_rate_limit,
        trust_proxy: cli.trust_proxy,
        scan_timeout: Duration::from_secs(cli.scan_timeout_secs),
    };

    serdash_collector::run(config).await
}
