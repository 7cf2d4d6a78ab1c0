//! Приём пакета метрик: разбор по категориям и запись временных рядов.

use crate::services::lenient;
use crate::services::token_service::VerifiedAgent;
use chrono::{DateTime, NaiveDateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ConnectionTrait, DbErr, EntityTrait, IntoActiveModel,
};
use serde::Deserialize;
use serdash_entities::{
    connection_samples, cpu_samples, disk_samples, listening_port_samples, memory_samples,
    network_interface_samples,
};

/// Пакет телеметрии от агента. Неизвестные поля игнорируются.
#[derive(Debug, Default, Deserialize)]
pub struct MetricsBatch {
    #[serde(default, deserialize_with = "lenient::string")]
    pub sampled_at: Option<String>,

    #[serde(default, deserialize_with = "lenient::seq")]
    pub disk: Vec<DiskEntry>,

    #[serde(default, deserialize_with = "lenient::object")]
    pub memory: Option<MemoryEntry>,

    #[serde(default, deserialize_with = "lenient::object")]
    pub cpu: Option<CpuEntry>,

    #[serde(default, deserialize_with = "lenient::seq")]
    pub network_interfaces: Vec<NetworkInterfaceEntry>,

    #[serde(default, deserialize_with = "lenient::seq")]
    pub listening_ports: Vec<ListeningPortEntry>,

    #[serde(default, deserialize_with = "lenient::seq")]
    pub connections: Vec<ConnectionEntry>,
}

#[derive(Debug, Default, Deserialize)]
pub struct DiskEntry {
    /// Обязательное поле: без него запись пропускается
    #[serde(default, deserialize_with = "lenient::string")]
    pub mount_point: Option<String>,
    #[serde(default, deserialize_with = "lenient::int")]
    pub total_bytes: Option<i64>,
    #[serde(default, deserialize_with = "lenient::int")]
    pub free_bytes: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct MemoryEntry {
    #[serde(default, deserialize_with = "lenient::int")]
    pub total_bytes: Option<i64>,
    #[serde(default, deserialize_with = "lenient::int")]
    pub used_bytes: Option<i64>,
    #[serde(default, deserialize_with = "lenient::int")]
    pub free_bytes: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CpuEntry {
    #[serde(default, deserialize_with = "lenient::float")]
    pub usage_percent: Option<f64>,
    #[serde(default, deserialize_with = "lenient::float")]
    pub temperature_celsius: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct NetworkInterfaceEntry {
    /// Обязательное поле: без него запись пропускается
    #[serde(default, deserialize_with = "lenient::string")]
    pub interface: Option<String>,
    #[serde(default, deserialize_with = "lenient::string")]
    pub status: Option<String>,
    #[serde(default, deserialize_with = "lenient::string_list")]
    pub ip_addresses: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListeningPortEntry {
    #[serde(default, deserialize_with = "lenient::string")]
    pub protocol: Option<String>,
    /// Обязательное поле: без него (или вне 0..=65535) запись пропускается
    #[serde(default, deserialize_with = "lenient::int")]
    pub port: Option<i64>,
    #[serde(default, deserialize_with = "lenient::string")]
    pub process: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ConnectionEntry {
    #[serde(default, deserialize_with = "lenient::string")]
    pub local_addr: Option<String>,
    #[serde(default, deserialize_with = "lenient::string")]
    pub remote_addr: Option<String>,
    #[serde(default, deserialize_with = "lenient::string")]
    pub state: Option<String>,
}

/// Сколько строк записано по каждой категории и сколько записей отброшено.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct IngestReport {
    pub disk: usize,
    pub memory: usize,
    pub cpu: usize,
    pub network_interfaces: usize,
    pub listening_ports: usize,
    pub connections: usize,
    pub skipped: usize,
}

impl IngestReport {
    pub fn rows(&self) -> usize {
        self.disk
            + self.memory
            + self.cpu
            + self.network_interfaces
            + self.listening_ports
            + self.connections
    }
}

/// Время сэмпла: из пакета, если оно есть и разбирается, иначе `now`.
pub fn resolve_sampled_at(raw: Option<&str>, now: DateTime<Utc>) -> DateTime<Utc> {
    let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
        return now;
    };
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return ts.with_timezone(&Utc);
    }
    // Наивное время без зоны считаем UTC
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
        .unwrap_or(now)
}

/// Записать пакет метрик аутентифицированного агента.
///
/// Категории пишутся по очереди без общей транзакции: ошибка хранилища
/// прерывает остаток пакета, уже записанные категории остаются.
pub async fn ingest<C: ConnectionTrait>(
    db: &C,
    agent: &VerifiedAgent,
    batch: MetricsBatch,
) -> Result<IngestReport, DbErr> {
    let server_id = agent.server_id();
    persist(db, server_id, batch).await.inspect_err(|e| {
        tracing::error!("Ошибка записи метрик сервера {server_id}: {e}");
    })
}

async fn persist<C: ConnectionTrait>(
    db: &C,
    server_id: i32,
    batch: MetricsBatch,
) -> Result<IngestReport, DbErr> {
    let now = Utc::now();
    let sampled_at = resolve_sampled_at(batch.sampled_at.as_deref(), now);
    let mut report = IngestReport::default();

    let total = batch.disk.len();
    let rows: Vec<_> = batch
        .disk
        .into_iter()
        .filter_map(|d| {
            let mount_point = d.mount_point.filter(|m| !m.is_empty())?;
            Some(disk_samples::ActiveModel {
                server_id: Set(server_id),
                sampled_at: Set(sampled_at),
                mount_point: Set(mount_point),
                total_bytes: Set(d.total_bytes),
                free_bytes: Set(d.free_bytes),
                created_at: Set(now),
                ..Default::default()
            })
        })
        .collect();
    report.skipped += total - rows.len();
    report.disk = insert_rows(db, rows).await?;

    if let Some(m) = batch.memory {
        let row = memory_samples::ActiveModel {
            server_id: Set(server_id),
            sampled_at: Set(sampled_at),
            total_bytes: Set(m.total_bytes),
            used_bytes: Set(m.used_bytes),
            free_bytes: Set(m.free_bytes),
            created_at: Set(now),
            ..Default::default()
        };
        report.memory = insert_rows(db, vec![row]).await?;
    }

    if let Some(c) = batch.cpu {
        let row = cpu_samples::ActiveModel {
            server_id: Set(server_id),
            sampled_at: Set(sampled_at),
            usage_percent: Set(c.usage_percent),
            temperature_celsius: Set(c.temperature_celsius),
            created_at: Set(now),
            ..Default::default()
        };
        report.cpu = insert_rows(db, vec![row]).await?;
    }

    let total = batch.network_interfaces.len();
    let rows: Vec<_> = batch
        .network_interfaces
        .into_iter()
        .filter_map(|ni| {
            let interface = ni.interface.filter(|i| !i.is_empty())?;
            Some(network_interface_samples::ActiveModel {
                server_id: Set(server_id),
                sampled_at: Set(sampled_at),
                interface: Set(interface),
                status: Set(ni.status),
                ip_addresses: Set(serde_json::Value::from(ni.ip_addresses)),
                created_at: Set(now),
                ..Default::default()
            })
        })
        .collect();
    report.skipped += total - rows.len();
    report.network_interfaces = insert_rows(db, rows).await?;

    let total = batch.listening_ports.len();
    let rows: Vec<_> = batch
        .listening_ports
        .into_iter()
        .filter_map(|lp| {
            let port = lp.port.and_then(|p| u16::try_from(p).ok())?;
            Some(listening_port_samples::ActiveModel {
                server_id: Set(server_id),
                sampled_at: Set(sampled_at),
                protocol: Set(lp
                    .protocol
                    .filter(|p| !p.is_empty())
                    .unwrap_or_else(|| "tcp".to_string())),
                port: Set(i32::from(port)),
                process: Set(lp.process),
                created_at: Set(now),
                ..Default::default()
            })
        })
        .collect();
    report.skipped += total - rows.len();
    report.listening_ports = insert_rows(db, rows).await?;

    let rows: Vec<_> = batch
        .connections
        .into_iter()
        .map(|c| connection_samples::ActiveModel {
            server_id: Set(server_id),
            sampled_at: Set(sampled_at),
            local_addr: Set(c.local_addr),
            remote_addr: Set(c.remote_addr),
            state: Set(c.state),
            created_at: Set(now),
            ..Default::default()
        })
        .collect();
    report.connections = insert_rows(db, rows).await?;

    Ok(report)
}

async fn insert_rows<C, A>(db: &C, rows: Vec<A>) -> Result<usize, DbErr>
where
    C: ConnectionTrait,
    A: ActiveModelTrait + Send,
    <A::Entity as EntityTrait>::Model: IntoActiveModel<A>,
{
    if rows.is_empty() {
        return Ok(0);
    }
    let count = rows.len();
    <A::Entity as EntityTrait>::insert_many(rows)
        .exec_without_returning(db)
        .await?;
    Ok(count)
}
