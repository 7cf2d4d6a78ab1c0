//! HTTP-клиент коллектора.

use crate::auth::{AgentIdentity, TOKEN_TTL};
use crate::collect::Snapshot;
use crate::error::AgentError;
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use std::time::Duration;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Serialize)]
struct RegisterRequest<'a> {
    code: &'a str,
    public_key: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    hostname: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct RegisterResponse {
    agent_id: i32,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
}

pub struct CollectorClient {
    http: Client,
    base_url: String,
}

impl CollectorClient {
    pub fn new(base_url: &str) -> Result<Self, AgentError> {
        let http = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_owned(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Обменять одноразовый код на `agent_id`.
    pub async fn register(
        &self,
        code: &str,
        identity: &AgentIdentity,
        hostname: Option<&str>,
    ) -> Result<i32, AgentError> {
        let public_key = identity.public_key_pem()?;
        let body = RegisterRequest {
            code,
            public_key: &public_key,
            hostname,
        };
        let resp = self
            .http
            .post(format!("{}/v1/register", self.base_url))
            .json(&body)
            .send()
            .await?;
        let registered: RegisterResponse = check(resp).await?.json().await?;
        Ok(registered.agent_id)
    }

    /// Отправить снимок со свежим токеном.
    pub async fn publish(
        &self,
        identity: &AgentIdentity,
        agent_id: i32,
        snapshot: &Snapshot,
    ) -> Result<(), AgentError> {
        let token = identity.sign_token(agent_id, TOKEN_TTL)?;
        let resp = self
            .http
            .post(format!("{}/v1/metrics", self.base_url))
            .bearer_auth(token)
            .json(snapshot)
            .send()
            .await?;
        check(resp).await?;
        Ok(())
    }
}

/// Ответ не 2xx превращается в [`AgentError::Rejected`] с текстом из `{"error": ...}`.
async fn check(resp: Response) -> Result<Response, AgentError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let text = resp.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorBody>(&text)
        .map(|body| body.error)
        .unwrap_or(text);
    Err(AgentError::Rejected {
        status: status.as_u16(),
        message,
    })
}
