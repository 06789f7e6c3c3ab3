//! Typed runtime configuration: every knob enumerated in the wire spec's
//! configuration table. Loaded in ascending priority — built-in defaults,
//! `[server]`/`[embedding]`/`[indexing]`/`[retrieval]`/`[transport]`/`[tools]`
//! tables from a project-local `.agent/config.toml`, then `load_and_apply`'s
//! env merge (existing env > .env > XDG toml) overriding individual scalar
//! fields via `AGENT_MCP_*` environment variables.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

fn default_port() -> u16 {
    3001
}

fn default_target_dim() -> usize {
    1536
}

fn default_indexing_interval() -> u64 {
    300
}

fn default_retrieval_k() -> usize {
    13
}

fn default_max_context_tokens() -> usize {
    8000
}

fn default_grace_period_minutes() -> u64 {
    15
}

fn default_sweep_interval_seconds() -> u64 {
    60
}

fn default_enabled_categories() -> BTreeSet<String> {
    ["basic", "rag", "memory", "file_management", "session_state"]
        .into_iter()
        .map(String::from)
        .collect()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingSettings {
    /// `cloud` (default) or `local`; the fallback chain tries providers in
    /// the order `[provider, ..fallback]`.
    pub provider: String,
    pub fallback: Vec<String>,
    pub target_dim: usize,
    /// Base URL for an OpenAI-compatible local server; ignored by `cloud`.
    pub local_base_url: Option<String>,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            provider: "cloud".to_string(),
            fallback: vec!["local".to_string()],
            target_dim: default_target_dim(),
            local_base_url: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexingSettings {
    pub interval_seconds: u64,
    pub enabled: bool,
    pub advanced_code: bool,
}

impl Default for IndexingSettings {
    fn default() -> Self {
        Self {
            interval_seconds: default_indexing_interval(),
            enabled: true,
            advanced_code: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalSettings {
    pub k: usize,
    pub max_context_tokens: usize,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self {
            k: default_retrieval_k(),
            max_context_tokens: default_max_context_tokens(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportSettings {
    pub grace_period_minutes: u64,
    pub sweep_interval_seconds: u64,
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self {
            grace_period_minutes: default_grace_period_minutes(),
            sweep_interval_seconds: default_sweep_interval_seconds(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolSettings {
    pub enabled_categories: BTreeSet<String>,
}

impl Default for ToolSettings {
    fn default() -> Self {
        Self {
            enabled_categories: default_enabled_categories(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub port: u16,
    pub project_dir: PathBuf,
    pub embedding: EmbeddingSettings,
    pub indexing: IndexingSettings,
    pub retrieval: RetrievalSettings,
    pub transport: TransportSettings,
    pub tools: ToolSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            port: default_port(),
            project_dir: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            embedding: EmbeddingSettings::default(),
            indexing: IndexingSettings::default(),
            retrieval: RetrievalSettings::default(),
            transport: TransportSettings::default(),
            tools: ToolSettings::default(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("read config file: {0}")]
    Read(std::io::Error),
    #[error("parse config toml: {0}")]
    Parse(#[from] toml::de::Error),
}

impl Settings {
    /// Merges `<project_dir>/.agent/config.toml` (if present) over the
    /// built-in defaults, then applies a handful of scalar env overrides —
    /// the same `AGENT_MCP_PORT`-style knobs an operator can set without
    /// touching the TOML file. Does not itself call `load_and_apply`; the
    /// daemon calls that first so `.env`/XDG values are already in the
    /// process environment by the time this runs.
    pub fn load(project_dir: impl AsRef<Path>) -> Result<Self, SettingsError> {
        let project_dir = project_dir.as_ref();
        let mut settings = Settings {
            project_dir: project_dir.to_path_buf(),
            ..Settings::default()
        };

        let config_path = project_dir.join(".agent").join("config.toml");
        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path).map_err(SettingsError::Read)?;
            let from_file: Settings = toml::from_str(&content)?;
            settings = Settings {
                project_dir: settings.project_dir,
                ..from_file
            };
        }

        if let Ok(port) = std::env::var("AGENT_MCP_PORT") {
            if let Ok(p) = port.parse() {
                settings.port = p;
            }
        }
        if let Ok(interval) = std::env::var("AGENT_MCP_INDEXING_INTERVAL_SECONDS") {
            if let Ok(v) = interval.parse() {
                settings.indexing.interval_seconds = v;
            }
        }
        if let Ok(dim) = std::env::var("AGENT_MCP_EMBEDDING_TARGET_DIM") {
            if let Ok(v) = dim.parse() {
                settings.embedding.target_dim = v;
            }
        }

        Ok(settings)
    }

    pub fn state_db_path(&self) -> PathBuf {
        self.project_dir.join(".agent").join("state.db")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_settings_match_spec_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.port, 3001);
        assert_eq!(settings.embedding.target_dim, 1536);
        assert_eq!(settings.indexing.interval_seconds, 300);
        assert_eq!(settings.retrieval.k, 13);
        assert_eq!(settings.retrieval.max_context_tokens, 8000);
        assert_eq!(settings.transport.grace_period_minutes, 15);
        assert_eq!(settings.transport.sweep_interval_seconds, 60);
        assert!(settings.tools.enabled_categories.contains("basic"));
        assert!(!settings.tools.enabled_categories.contains("agent_management"));
    }

    #[test]
    fn load_merges_project_toml() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join(".agent")).unwrap();
        std::fs::write(
            dir.path().join(".agent").join("config.toml"),
            "port = 4000\n[retrieval]\nk = 5\n",
        )
        .unwrap();
        let settings = Settings::load(dir.path()).unwrap();
        assert_eq!(settings.port, 4000);
        assert_eq!(settings.retrieval.k, 5);
        assert_eq!(settings.project_dir, dir.path());
    }

    #[test]
    fn load_without_config_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::load(dir.path()).unwrap();
        assert_eq!(settings.port, 3001);
    }

    #[test]
    fn state_db_path_is_under_dot_agent() {
        let settings = Settings {
            project_dir: PathBuf::from("/proj"),
            ..Settings::default()
        };
        assert_eq!(settings.state_db_path(), PathBuf::from("/proj/.agent/state.db"));
    }
}
