//! Сбор метрик хоста.
//!
//! Полный набор собирается только на Linux (`/proc`, `df`, `ip`, `ss`);
//! на остальных платформах категории остаются пустыми. Разбор вывода
//! вынесен в чистые функции `parse_*`.

use chrono::Utc;
use serde::Serialize;
use std::time::Duration;
use tokio::process::Command;

const COMMAND_TIMEOUT: Duration = Duration::from_secs(10);
/// Пауза между двумя чтениями /proc/stat для расчёта загрузки CPU
const CPU_SAMPLE_INTERVAL: Duration = Duration::from_millis(500);
/// Разделы меньше 100 МБ не интересны
const MIN_DISK_BYTES: u64 = 100_000_000;

/// Снимок состояния хоста в формате пакета `/v1/metrics`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Snapshot {
    pub sampled_at: String,
    pub hostname: String,
    pub platform: String,
    pub disk: Vec<DiskUsage>,
    pub memory: MemoryUsage,
    pub cpu: CpuUsage,
    pub network_interfaces: Vec<NetworkInterface>,
    pub listening_ports: Vec<ListeningPort>,
    pub connections: Vec<Connection>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiskUsage {
    pub mount_point: String,
    pub total_bytes: u64,
    pub free_bytes: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MemoryUsage {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_bytes: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub used_bytes: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub free_bytes: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CpuUsage {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage_percent: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature_celsius: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub load_average: Option<[f64; 3]>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NetworkInterface {
    pub interface: String,
    pub status: String,
    pub ip_addresses: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ListeningPort {
    pub protocol: String,
    pub port: u16,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Connection {
    pub local_addr: String,
    pub remote_addr: String,
    pub state: String,
}

/// Собрать снимок. Недоступные источники дают пустые категории, а не ошибку.
pub async fn collect() -> Snapshot {
    let mut snapshot = Snapshot {
        sampled_at: Utc::now().to_rfc3339(),
        hostname: hostname().await,
        platform: std::env::consts::OS.to_owned(),
        ..Default::default()
    };

    if cfg!(target_os = "linux") {
        snapshot.disk = run("df", &["-B1", "--output=source,fstype,target,size,avail"])
            .await
            .map(|out| parse_df(&out))
            .unwrap_or_default();
        snapshot.memory = read("/proc/meminfo")
            .await
            .map(|text| parse_meminfo(&text))
            .unwrap_or_default();
        snapshot.cpu = collect_cpu().await;
        snapshot.network_interfaces = run("ip", &["-j", "addr"])
            .await
            .map(|out| parse_ip_addr_json(&out))
            .unwrap_or_default();
        snapshot.listening_ports = run("ss", &["-tuln"])
            .await
            .map(|out| parse_ss_listening(&out))
            .unwrap_or_default();
        snapshot.connections = run("ss", &["-tun"])
            .await
            .map(|out| parse_ss_connections(&out))
            .unwrap_or_default();
    }

    snapshot
}

async fn collect_cpu() -> CpuUsage {
    let first = read("/proc/stat").await.and_then(|t| parse_cpu_times(&t));
    tokio::time::sleep(CPU_SAMPLE_INTERVAL).await;
    let second = read("/proc/stat").await.and_then(|t| parse_cpu_times(&t));

    let usage_percent = match (first, second) {
        (Some(a), Some(b)) => cpu_usage_between(a, b),
        _ => None,
    };
    let temperature_celsius = max_thermal_zone().await;
    let load_average = read("/proc/loadavg").await.and_then(|t| parse_loadavg(&t));

    CpuUsage {
        usage_percent,
        temperature_celsius,
        load_average,
    }
}

/// Максимальная температура среди `thermal_zone*`.
async fn max_thermal_zone() -> Option<f64> {
    let mut entries = tokio::fs::read_dir("/sys/class/thermal").await.ok()?;
    let mut max: Option<f64> = None;
    while let Ok(Some(entry)) = entries.next_entry().await {
        if !entry.file_name().to_string_lossy().starts_with("thermal_zone") {
            continue;
        }
        let Ok(text) = tokio::fs::read_to_string(entry.path().join("temp")).await else {
            continue;
        };
        if let Some(t) = parse_thermal_millidegrees(&text) {
            max = Some(max.map_or(t, |m| m.max(t)));
        }
    }
    max
}

async fn hostname() -> String {
    if let Some(name) = read("/etc/hostname")
        .await
        .map(|s| s.trim().to_owned())
        .filter(|s| !s.is_empty())
    {
        return name;
    }
    run("hostname", &[])
        .await
        .map(|s| s.trim().to_owned())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "unknown".to_owned())
}

async fn read(path: &str) -> Option<String> {
    tokio::fs::read_to_string(path).await.ok()
}

/// Запустить команду с таймаутом; `None`, если она недоступна или упала.
async fn run(program: &str, args: &[&str]) -> Option<String> {
    let mut command = Command::new(program);
    command.args(args).kill_on_drop(true);
    match tokio::time::timeout(COMMAND_TIMEOUT, command.output()).await {
        Ok(Ok(output)) if output.status.success() => {
            Some(String::from_utf8_lossy(&output.stdout).into_owned())
        }
        Ok(Ok(output)) => {
            tracing::debug!("{program} завершился с кодом {:?}", output.status.code());
            None
        }
        Ok(Err(e)) => {
            tracing::debug!("{program} недоступен: {e}");
            None
        }
        Err(_) => {
            tracing::warn!("{program}: превышен таймаут {COMMAND_TIMEOUT:?}");
            None
        }
    }
}

/// Вывод `df -B1 --output=source,fstype,target,size,avail`.
pub fn parse_df(output: &str) -> Vec<DiskUsage> {
    output
        .lines()
        .skip(1)
        .filter_map(|line| {
            let parts: Vec<&str> = line.split_whitespace().collect();
            if parts.len() < 5 {
                return None;
            }
            let mount_point = parts[2];
            let total_bytes: u64 = parts[3].parse().ok()?;
            let free_bytes: u64 = parts[4].parse().ok()?;
            (mount_point.starts_with('/') && total_bytes > MIN_DISK_BYTES).then(|| DiskUsage {
                mount_point: mount_point.to_owned(),
                total_bytes,
                free_bytes,
            })
        })
        .collect()
}

/// `/proc/meminfo`: значения в kB. Занятое = всего − доступно.
pub fn parse_meminfo(text: &str) -> MemoryUsage {
    let field = |name: &str| {
        text.lines().find_map(|line| {
            let rest = line.strip_prefix(name)?.strip_prefix(':')?;
            let kb: u64 = rest.split_whitespace().next()?.parse().ok()?;
            Some(kb * 1024)
        })
    };

    let total = field("MemTotal");
    let available = field("MemAvailable").or_else(|| field("MemFree"));
    MemoryUsage {
        total_bytes: total,
        used_bytes: total.zip(available).map(|(t, a)| t.saturating_sub(a)),
        free_bytes: available,
    }
}

/// Первые три поля `/proc/loadavg`.
pub fn parse_loadavg(text: &str) -> Option<[f64; 3]> {
    let mut parts = text.split_whitespace().map(|p| p.parse::<f64>().ok());
    Some([parts.next()??, parts.next()??, parts.next()??])
}

/// Счётчики строки `cpu` из `/proc/stat`: (простой, всего).
pub fn parse_cpu_times(text: &str) -> Option<(u64, u64)> {
    let line = text.lines().find(|l| l.starts_with("cpu "))?;
    let values: Vec<u64> = line
        .split_whitespace()
        .skip(1)
        .filter_map(|v| v.parse().ok())
        .collect();
    if values.len() < 4 {
        return None;
    }
    // idle + iowait
    let idle = values[3] + values.get(4).copied().unwrap_or(0);
    Some((idle, values.iter().sum()))
}

/// Загрузка CPU в процентах между двумя замерами `/proc/stat`.
pub fn cpu_usage_between(first: (u64, u64), second: (u64, u64)) -> Option<f64> {
    let total = second.1.checked_sub(first.1)?;
    let idle = second.0.checked_sub(first.0)?;
    if total == 0 {
        return None;
    }
    let busy = total.saturating_sub(idle) as f64;
    Some((busy / total as f64 * 1000.0).round() / 10.0)
}

pub fn parse_thermal_millidegrees(text: &str) -> Option<f64> {
    let milli: f64 = text.trim().parse().ok()?;
    Some(milli / 1000.0)
}

/// JSON-вывод `ip -j addr`.
pub fn parse_ip_addr_json(output: &str) -> Vec<NetworkInterface> {
    #[derive(serde::Deserialize)]
    struct Link {
        ifname: String,
        #[serde(default)]
        operstate: Option<String>,
        #[serde(default)]
        addr_info: Vec<AddrInfo>,
    }
    #[derive(serde::Deserialize)]
    struct AddrInfo {
        #[serde(default)]
        local: Option<String>,
    }

    let Ok(links) = serde_json::from_str::<Vec<Link>>(output) else {
        return Vec::new();
    };
    links
        .into_iter()
        .map(|link| NetworkInterface {
            interface: link.ifname,
            status: link
                .operstate
                .map(|s| s.to_ascii_lowercase())
                .unwrap_or_else(|| "unknown".to_owned()),
            ip_addresses: link.addr_info.into_iter().filter_map(|a| a.local).collect(),
        })
        .collect()
}

/// Вывод `ss -tuln`: Netid State Recv-Q Send-Q Local Peer.
pub fn parse_ss_listening(output: &str) -> Vec<ListeningPort> {
    output
        .lines()
        .skip(1)
        .filter_map(|line| {
            let parts: Vec<&str> = line.split_whitespace().collect();
            if parts.len() < 5 {
                return None;
            }
            let port = parts[4].rsplit_once(':')?.1.parse().ok()?;
            Some(ListeningPort {
                protocol: parts[0].to_owned(),
                port,
            })
        })
        .collect()
}

/// Вывод `ss -tun`: Netid State Recv-Q Send-Q Local Peer.
pub fn parse_ss_connections(output: &str) -> Vec<Connection> {
    output
        .lines()
        .skip(1)
        .filter_map(|line| {
            let parts: Vec<&str> = line.split_whitespace().collect();
            (parts.len() >= 6).then(|| Connection {
                local_addr: parts[4].to_owned(),
                remote_addr: parts[5].to_owned(),
                state: parts[1].to_owned(),
            })
        })
        .collect()
}
