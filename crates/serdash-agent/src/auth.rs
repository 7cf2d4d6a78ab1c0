//! Ключ Ed25519 агента и подписанные им токены (EdDSA JWT).

use crate::error::AgentError;
use chrono::Utc;
use ed25519_dalek::pkcs8::spki::der::pem::LineEnding;
use ed25519_dalek::pkcs8::{DecodePrivateKey, EncodePrivateKey, EncodePublicKey, KeypairBytes};
use ed25519_dalek::SigningKey;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::Path;
use std::time::Duration;

/// Время жизни токена: новый токен выпускается на каждую отправку.
pub const TOKEN_TTL: Duration = Duration::from_secs(300);

pub(crate) const PRIVATE_KEY_FILE: &str = "agent.key";
pub(crate) const PUBLIC_KEY_FILE: &str = "agent.pub";

/// Claims токена агента.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentClaims {
    pub agent_id: i32,
    pub iat: i64,
    pub exp: i64,
}

/// Долговременная пара ключей агента.
pub struct AgentIdentity {
    signing_key: SigningKey,
}

impl AgentIdentity {
    pub fn generate() -> Self {
        Self {
            signing_key: SigningKey::generate(&mut OsRng),
        }
    }

    /// Детерминированный ключ из 32-байтового seed.
    pub fn from_seed(seed: [u8; 32]) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(&seed),
        }
    }

    pub fn from_private_key_pem(pem: &str) -> Result<Self, AgentError> {
        let signing_key =
            SigningKey::from_pkcs8_pem(pem).map_err(|e| AgentError::Key(e.to_string()))?;
        Ok(Self { signing_key })
    }

    /// Публичный ключ в PEM (SubjectPublicKeyInfo) — в таком виде его хранит коллектор.
    pub fn public_key_pem(&self) -> Result<String, AgentError> {
        self.signing_key
            .verifying_key()
            .to_public_key_pem(LineEnding::LF)
            .map_err(|e| AgentError::Key(e.to_string()))
    }

    fn private_key_pem(&self) -> Result<String, AgentError> {
        self.signing_key
            .to_pkcs8_pem(LineEnding::LF)
            .map(|pem| pem.as_str().to_owned())
            .map_err(|e| AgentError::Key(e.to_string()))
    }

    /// Загрузить ключи из каталога или создать новые (файлы с правами 0600).
    ///
    /// Существующий приватный ключ никогда не перезаписывается: пропавший
    /// публичный файл восстанавливается из него.
    pub fn load_or_create(dir: &Path) -> Result<Self, AgentError> {
        let private_path = dir.join(PRIVATE_KEY_FILE);
        let public_path = dir.join(PUBLIC_KEY_FILE);

        if private_path.exists() {
            let identity = Self::from_private_key_pem(&fs::read_to_string(&private_path)?)?;
            if !public_path.exists() {
                write_private(&public_path, identity.public_key_pem()?.as_bytes())?;
                tracing::warn!("Публичный ключ восстановлен из {}", private_path.display());
            }
            return Ok(identity);
        }

        fs::create_dir_all(dir)?;
        let identity = Self::generate();
        write_private(&private_path, identity.private_key_pem()?.as_bytes())?;
        write_private(&public_path, identity.public_key_pem()?.as_bytes())?;
        tracing::info!("Создана новая пара ключей в {}", dir.display());
        Ok(identity)
    }

    /// Выпустить токен для `agent_id`, подписанный EdDSA.
    pub fn sign_token(&self, agent_id: i32, ttl: Duration) -> Result<String, AgentError> {
        let now = Utc::now().timestamp();
        let ttl = i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX);
        let claims = AgentClaims {
            agent_id,
            iat: now,
            exp: now.saturating_add(ttl),
        };
        jsonwebtoken::encode(&Header::new(Algorithm::EdDSA), &claims, &self.encoding_key()?)
            .map_err(AgentError::from)
    }

    /// Ключ для jsonwebtoken: PKCS#8 v1 (только seed, без публичной части).
    fn encoding_key(&self) -> Result<EncodingKey, AgentError> {
        let der = KeypairBytes {
            secret_key: self.signing_key.to_bytes(),
            public_key: None,
        }
        .to_pkcs8_der()
        .map_err(|e| AgentError::Key(e.to_string()))?;
        Ok(EncodingKey::from_ed_der(der.as_bytes()))
    }
}

impl std::fmt::Debug for AgentIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentIdentity")
            .field("public_key", &hex_prefix(self.signing_key.verifying_key().as_bytes()))
            .finish()
    }
}

fn hex_prefix(bytes: &[u8]) -> String {
    bytes.iter().take(8).map(|b| format!("{b:02x}")).collect()
}

fn write_private(path: &Path, contents: &[u8]) -> Result<(), AgentError> {
    let mut options = fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options.open(path)?;
    file.write_all(contents)?;
    Ok(())
}
