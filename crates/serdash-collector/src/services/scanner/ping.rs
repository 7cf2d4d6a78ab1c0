//! Запасная стратегия: по одному ICMP-запросу на каждый адрес .1–.254.

use super::{parse_cidr, DiscoveredHost, ScanError, SubnetScanner};
use async_trait::async_trait;
use std::net::Ipv4Addr;
use std::ops::RangeInclusive;
use std::process::Stdio;
use tokio::process::Command;

/// Шире /16 обходить слишком дорого.
const SUPPORTED_PREFIXES: RangeInclusive<u8> = 16..=24;

/// Проверка доступности одного адреса.
#[async_trait]
pub trait HostProbe: Send + Sync {
    async fn is_alive(&self, ip: Ipv4Addr) -> bool;
}

/// `ping -c 1 -W 1 <ip>`: один пакет, таймаут 1 секунда.
pub struct IcmpProbe;

#[async_trait]
impl HostProbe for IcmpProbe {
    async fn is_alive(&self, ip: Ipv4Addr) -> bool {
        Command::new("ping")
            .args(["-c", "1", "-W", "1", &ip.to_string()])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .status()
            .await
            .map(|s| s.success())
            .unwrap_or(false)
    }
}

pub struct PingSweep<P> {
    probe: P,
}

impl<P: HostProbe> PingSweep<P> {
    pub fn new(probe: P) -> Self {
        Self { probe }
    }
}

#[async_trait]
impl<P: HostProbe> SubnetScanner for PingSweep<P> {
    fn name(&self) -> &'static str {
        "ping"
    }

    async fn scan(&self, subnet: &str) -> Result<Vec<DiscoveredHost>, ScanError> {
        let (base, prefix) = parse_cidr(subnet)?;
        if !SUPPORTED_PREFIXES.contains(&prefix) {
            return Err(ScanError::UnsupportedPrefix(prefix));
        }

        // Обходится только последний октет базового адреса
        let [a, b, c, _] = base.octets();
        let mut hosts = Vec::new();
        for last in 1..=254u8 {
            let ip = Ipv4Addr::new(a, b, c, last);
            if self.probe.is_alive(ip).await {
                hosts.push(DiscoveredHost::from_ip(ip));
            }
        }
        Ok(hosts)
    }
}
