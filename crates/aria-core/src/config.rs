use std::path::{Path, PathBuf};

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

/// Seconds to wait for a silent user before the default reminder fires.
pub const DEFAULT_INACTIVITY_TIMEOUT_SECS: i64 = 60;
/// Sentinel meaning "do not arm the inactivity timer".
pub const NO_TIMEOUT: i64 = -1;
/// How many past conversations the decision node sees by default.
pub const DEFAULT_RECENT_CONVERSATIONS: usize = 5;

/// Top-level config (aria.toml + ARIA_* env overrides).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AriaConfig {
    #[serde(default)]
    pub provider: ProviderConfig,
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub paths: PathsConfig,
}

impl AriaConfig {
    /// Load from `path`, layering `ARIA_*` environment overrides on top.
    pub fn load(path: &Path) -> Result<Self> {
        Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed("ARIA_").split("_"))
            .extract()
            .map_err(|e| CoreError::Config(e.to_string()))
    }
}

/// LLM provider endpoint. The adapter is OpenAI-compatible; OpenRouter is the
/// default endpoint the reference deployment talks to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_chat_path")]
    pub chat_path: String,
    #[serde(default = "default_model")]
    pub model: String,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: default_base_url(),
            chat_path: default_chat_path(),
            model: default_model(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Path to the persona prompt file. `None` falls back to the built-in.
    pub persona_path: Option<String>,
    #[serde(default = "default_recent_conversations")]
    pub recent_conversations: usize,
    #[serde(default = "default_timeout_secs")]
    pub default_timeout_secs: i64,
    /// Speaker ID handed to the speech-synthesis collaborator.
    #[serde(default = "default_voice_id")]
    pub voice_id: u32,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            persona_path: None,
            recent_conversations: default_recent_conversations(),
            default_timeout_secs: default_timeout_secs(),
            voice_id: default_voice_id(),
        }
    }
}

/// All on-disk artifacts live under one data directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

impl PathsConfig {
    /// Per-session directories holding state snapshots
    /// (`<session>/<ms>_<label>.{bin,json}`) and the append-only
    /// conversation log (`<session>/session_<ts>.txt`).
    pub fn sessions_dir(&self) -> PathBuf {
        Path::new(&self.data_dir).join("sessions")
    }

    /// LLM request/response dumps.
    pub fn api_logs_dir(&self) -> PathBuf {
        Path::new(&self.data_dir).join("api_logs")
    }

    /// SQLite database backing the long-term memory store.
    pub fn memory_db_path(&self) -> PathBuf {
        Path::new(&self.data_dir).join("memory.db")
    }
}

fn default_base_url() -> String {
    "https://openrouter.ai/api".to_string()
}

fn default_chat_path() -> String {
    "/v1/chat/completions".to_string()
}

fn default_model() -> String {
    "google/gemini-2.0-flash-001".to_string()
}

fn default_recent_conversations() -> usize {
    DEFAULT_RECENT_CONVERSATIONS
}

fn default_timeout_secs() -> i64 {
    DEFAULT_INACTIVITY_TIMEOUT_SECS
}

fn default_voice_id() -> u32 {
    10
}

fn default_data_dir() -> String {
    "./data".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let cfg = AriaConfig::default();
        assert_eq!(cfg.agent.default_timeout_secs, 60);
        assert_eq!(cfg.agent.recent_conversations, 5);
        assert!(cfg.provider.base_url.starts_with("https://"));
    }

    #[test]
    fn paths_derive_from_data_dir() {
        let paths = PathsConfig {
            data_dir: "/tmp/aria".to_string(),
        };
        assert_eq!(paths.sessions_dir(), PathBuf::from("/tmp/aria/sessions"));
        assert_eq!(paths.memory_db_path(), PathBuf::from("/tmp/aria/memory.db"));
    }
}
