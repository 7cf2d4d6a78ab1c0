//! Быстрая стратегия: один запуск `nmap -sn -oG -` на всю подсеть.

use super::{parse_cidr, DiscoveredHost, ScanError, SubnetScanner};
use async_trait::async_trait;
use std::net::Ipv4Addr;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

pub struct NmapScanner {
    timeout: Duration,
}

impl NmapScanner {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

/// Проверить, что `nmap` установлен и запускается.
pub(super) async fn is_available() -> bool {
    Command::new("nmap")
        .arg("--version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await
        .map(|s| s.success())
        .unwrap_or(false)
}

#[async_trait]
impl SubnetScanner for NmapScanner {
    fn name(&self) -> &'static str {
        "nmap"
    }

    async fn scan(&self, subnet: &str) -> Result<Vec<DiscoveredHost>, ScanError> {
        // Аргумент строится из разобранного адреса: сырую строку в nmap не передаём
        let (base, prefix) = parse_cidr(subnet)?;
        let target = format!("{base}/{prefix}");

        let child = Command::new("nmap")
            .args(["-sn", "-oG", "-", &target])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()?;

        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(output) => output?,
            Err(_) => {
                tracing::warn!("nmap не уложился в {}s для {target}", self.timeout.as_secs());
                return Ok(Vec::new());
            }
        };

        if !output.status.success() {
            tracing::warn!("nmap завершился с кодом {:?} для {target}", output.status.code());
            return Ok(Vec::new());
        }

        Ok(parse_greppable(&String::from_utf8_lossy(&output.stdout)))
    }
}

/// Разобрать greppable-вывод nmap.
///
/// Строка хоста: `Host: <ip> (<hostname>)	Status: Up`, иногда с
/// `MAC Address: <mac>`. Пустые скобки означают отсутствие имени.
pub fn parse_greppable(output: &str) -> Vec<DiscoveredHost> {
    output
        .lines()
        .filter_map(|line| {
            let rest = line.strip_prefix("Host: ")?;
            let ip_token = rest.split_whitespace().next()?;
            let ip: Ipv4Addr = ip_token.parse().ok()?;

            let hostname = rest
                .split_once('(')
                .and_then(|(_, tail)| tail.split_once(')'))
                .map(|(name, _)| name.trim())
                .filter(|name| !name.is_empty())
                .map(str::to_string);

            let mac = line
                .split_once("MAC Address: ")
                .map(|(_, tail)| {
                    tail.chars()
                        .take_while(|c| c.is_ascii_hexdigit() || *c == ':')
                        .collect::<String>()
                })
                .filter(|mac| !mac.is_empty());

            Some(DiscoveredHost {
                ip: ip.to_string(),
                hostname,
                mac,
            })
        })
        .collect()
}
