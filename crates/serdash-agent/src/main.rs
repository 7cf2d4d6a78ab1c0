use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serdash_agent::collect;
use serdash_agent::config::{default_config_dir, AgentState};
use serdash_agent::publisher::CollectorClient;
use serdash_agent::{AgentError, AgentIdentity};
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "serdash-agent", about = "Агент сбора метрик serdash")]
struct Cli {
    /// Каталог ключей и состояния
    #[arg(long, global = true, env = "SERDASH_CONFIG_DIR")]
    config_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Зарегистрироваться в коллекторе по одноразовому коду
    Register {
        /// URL коллектора, например http://10.0.0.1:3001
        url: String,
        /// Код из админ-API коллектора
        code: String,
        #[arg(long)]
        hostname: Option<String>,
    },
    /// Периодически собирать и отправлять метрики
    Run {
        /// URL коллектора (по умолчанию сохранённый при регистрации)
        #[arg(long, env = "SERDASH_COLLECTOR_URL")]
        url: Option<String>,
        /// Интервал отправки, секунды
        #[arg(long, env = "SERDASH_INTERVAL_SECONDS", default_value_t = 1800)]
        interval_secs: u64,
        /// Собрать и отправить один раз
        #[arg(long)]
        once: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let state = AgentState::new(cli.config_dir.unwrap_or_else(default_config_dir));

    match cli.command {
        Command::Register {
            url,
            code,
            hostname,
        } => register(&state, &url, &code, hostname.as_deref()).await,
        Command::Run {
            url,
            interval_secs,
            once,
        } => run(&state, url, Duration::from_secs(interval_secs.max(1)), once).await,
    }
}

async fn register(state: &AgentState, url: &str, code: &str, hostname: Option<&str>) -> Result<()> {
    let identity = AgentIdentity::load_or_create(state.dir())
        .with_context(|| format!("Не удалось подготовить ключи в {}", state.dir().display()))?;
    let client = CollectorClient::new(url)?;

    let agent_id = client
        .register(code, &identity, hostname)
        .await
        .context("Регистрация не удалась")?;
    state.save_registration(agent_id, client.base_url())?;

    tracing::info!("Агент зарегистрирован: agent_id={agent_id}");
    Ok(())
}

async fn run(state: &AgentState, url: Option<String>, interval: Duration, once: bool) -> Result<()> {
    let identity = AgentIdentity::load_or_create(state.dir())?;
    let agent_id = state.agent_id()?;
    let url = url
        .or_else(|| state.collector_url())
        .ok_or(AgentError::MissingCollectorUrl)?;
    let client = CollectorClient::new(&url)?;

    tracing::info!(
        "Агент {agent_id} отправляет метрики в {} каждые {}с",
        client.base_url(),
        interval.as_secs()
    );

    let mut ticker = tokio::time::interval(interval);
    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Получен сигнал остановки");
                return Ok(());
            }
        }

        let snapshot = collect::collect().await;
        match client.publish(&identity, agent_id, &snapshot).await {
            Ok(()) => tracing::info!(
                disks = snapshot.disk.len(),
                interfaces = snapshot.network_interfaces.len(),
                ports = snapshot.listening_ports.len(),
                "Метрики отправлены"
            ),
            Err(e) => tracing::error!("Не удалось отправить метрики: {e}"),
        }

        if once {
            return Ok(());
        }
    }
}
