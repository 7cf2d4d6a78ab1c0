//! Ограничение частоты запросов по IP клиента (фиксированное окно).

use crate::error::AppError;
use axum::extract::ConnectInfo;
use axum::http::Request;
use axum::middleware::Next;
use axum::response::Response;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

/// Порог размера таблицы, после которого удаляются истёкшие окна.
const PRUNE_THRESHOLD: usize = 4096;

#[derive(Debug)]
struct Window {
    started: Instant,
    hits: u32,
}

#[derive(Clone)]
pub struct RateLimiter {
    windows: Arc<Mutex<HashMap<String, Window>>>,
    limit: u32,
    period: Duration,
    /// Доверять X-Forwarded-For (коллектор за обратным прокси)
    trust_proxy: bool,
}

impl RateLimiter {
    pub fn new(limit: u32, period: Duration, trust_proxy: bool) -> Self {
        Self {
            windows: Arc::new(Mutex::new(HashMap::new())),
            limit,
            period,
            trust_proxy,
        }
    }

    /// Учесть запрос; `false`, если лимит окна исчерпан.
    pub async fn check(&self, key: &str) -> bool {
        let now = Instant::now();
        let mut windows = self.windows.lock().await;

        if windows.len() > PRUNE_THRESHOLD {
            windows.retain(|_, w| now.duration_since(w.started) < self.period);
        }

        let window = windows.entry(key.to_string()).or_insert(Window {
            started: now,
            hits: 0,
        });
        if now.duration_since(window.started) >= self.period {
            window.started = now;
            window.hits = 0;
        }

        window.hits = window.hits.saturating_add(1);
        window.hits <= self.limit
    }

    /// Ключ клиента: адрес соединения или первый адрес X-Forwarded-For.
    pub fn client_key<B>(&self, req: &Request<B>) -> String {
        let forwarded = self
            .trust_proxy
            .then(|| {
                req.headers()
                    .get("x-forwarded-for")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|s| s.split(',').next())
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
            })
            .flatten();

        forwarded
            .or_else(|| {
                req.extensions()
                    .get::<ConnectInfo<SocketAddr>>()
                    .map(|ci| ci.0.ip().to_string())
            })
            .unwrap_or_else(|| "unknown".to_string())
    }
}

/// Middleware: 429 при превышении лимита.
pub async fn rate_limit_middleware(
    limiter: RateLimiter,
    req: Request<axum::body::Body>,
    next: Next,
) -> Result<Response, AppError> {
    let key = limiter.client_key(&req);
    if !limiter.check(&key).await {
        tracing::warn!("Превышен лимит регистраций для {key}");
        return Err(AppError::TooManyRequests);
    }
    Ok(next.run(req).await)
}
