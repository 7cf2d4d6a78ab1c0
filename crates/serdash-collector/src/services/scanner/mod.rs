//! Обнаружение живых хостов в подсети.
//!
//! Две стратегии: быстрая через внешний `nmap` и медленный последовательный
//! ping-обход. Стратегия выбирается один раз при старте по наличию `nmap`.

mod nmap;
mod ping;

pub use nmap::{parse_greppable, NmapScanner};
pub use ping::{HostProbe, IcmpProbe, PingSweep};

use crate::error::AppError;
use async_trait::async_trait;
use serde::Serialize;
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Префикс по умолчанию, если в строке подсети он не указан.
const DEFAULT_PREFIX: u8 = 24;

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("Некорректная подсеть: {0}")]
    InvalidSubnet(String),

    #[error("Префикс /{0} не поддерживается (допустимо /16../24)")]
    UnsupportedPrefix(u8),

    #[error("Discovery failed: {0}")]
    Io(#[from] std::io::Error),
}

impl From<ScanError> for AppError {
    fn from(e: ScanError) -> Self {
        match e {
            ScanError::Io(_) => AppError::Internal(e.to_string()),
            other => AppError::BadRequest(other.to_string()),
        }
    }
}

/// Обнаруженный хост. Отсутствующие поля не сериализуются.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiscoveredHost {
    pub ip: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mac: Option<String>,
}

impl DiscoveredHost {
    pub fn from_ip(ip: Ipv4Addr) -> Self {
        Self {
            ip: ip.to_string(),
            hostname: None,
            mac: None,
        }
    }
}

/// Стратегия сканирования подсети.
#[async_trait]
pub trait SubnetScanner: Send + Sync {
    /// Короткое имя стратегии для логов.
    fn name(&self) -> &'static str;

    async fn scan(&self, subnet: &str) -> Result<Vec<DiscoveredHost>, ScanError>;
}

/// Разобрать "a.b.c.d/prefix"; без префикса подразумевается /24.
pub fn parse_cidr(subnet: &str) -> Result<(Ipv4Addr, u8), ScanError> {
    let subnet = subnet.trim();
    let (base, prefix) = match subnet.split_once('/') {
        Some((base, prefix)) => {
            let prefix: u8 = prefix
                .trim()
                .parse()
                .map_err(|_| ScanError::InvalidSubnet(subnet.to_string()))?;
            (base, prefix)
        }
        None => (subnet, DEFAULT_PREFIX),
    };
    if prefix > 32 {
        return Err(ScanError::InvalidSubnet(subnet.to_string()));
    }
    let base: Ipv4Addr = base
        .trim()
        .parse()
        .map_err(|_| ScanError::InvalidSubnet(subnet.to_string()))?;
    Ok((base, prefix))
}

/// Выбрать стратегию: `nmap`, если он установлен, иначе ping-обход.
pub async fn detect(scan_timeout: Duration) -> Arc<dyn SubnetScanner> {
    if nmap::is_available().await {
        tracing::info!("Сканер подсети: nmap (таймаут {}s)", scan_timeout.as_secs());
        Arc::new(NmapScanner::new(scan_timeout))
    } else {
        tracing::warn!("nmap не найден, обнаружение через последовательный ping");
        Arc::new(PingSweep::new(IcmpProbe))
    }
}
