//! Каталог состояния агента: ключи, `agent_id` и URL коллектора.

use crate::error::AgentError;
use std::fs;
use std::path::{Path, PathBuf};

const SYSTEM_DIR: &str = "/etc/serdash-agent";
pub(crate) const AGENT_ID_FILE: &str = "agent_id";
const COLLECTOR_URL_FILE: &str = "collector_url";

/// Системный каталог, если он уже есть, иначе `~/.config/serdash-agent`.
pub fn default_config_dir() -> PathBuf {
    let system = Path::new(SYSTEM_DIR);
    if system.is_dir() {
        return system.to_path_buf();
    }
    std::env::var_os("HOME")
        .map(|home| PathBuf::from(home).join(".config").join("serdash-agent"))
        .unwrap_or_else(|| system.to_path_buf())
}

#[derive(Debug, Clone)]
pub struct AgentState {
    dir: PathBuf,
}

impl AgentState {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Запомнить результат регистрации.
    pub fn save_registration(&self, agent_id: i32, collector_url: &str) -> Result<(), AgentError> {
        fs::create_dir_all(&self.dir)?;
        fs::write(self.dir.join(AGENT_ID_FILE), agent_id.to_string())?;
        fs::write(self.dir.join(COLLECTOR_URL_FILE), collector_url.trim_end_matches('/'))?;
        Ok(())
    }

    pub fn agent_id(&self) -> Result<i32, AgentError> {
        read_trimmed(&self.dir.join(AGENT_ID_FILE))
            .and_then(|raw| raw.parse().ok())
            .ok_or(AgentError::NotRegistered)
    }

    pub fn collector_url(&self) -> Option<String> {
        read_trimmed(&self.dir.join(COLLECTOR_URL_FILE))
    }
}

fn read_trimmed(path: &Path) -> Option<String> {
    fs::read_to_string(path)
        .ok()
        .map(|s| s.trim().to_owned())
        .filter(|s| !s.is_empty())
}
