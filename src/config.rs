use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

fn default_bind_addr() -> String {
    "127.0.0.1:8090".into()
}

fn default_request_timeout_secs() -> u64 {
    10
}

fn default_initial_backoff_secs() -> u64 {
    2
}

fn default_max_backoff_secs() -> u64 {
    60
}

fn default_max_reconnect_attempts() -> u32 {
    10
}

/// Reconnect policy for a session's wire link.
///
/// Transient disconnects retry with doubling backoff until the attempt cap;
/// a logged-out disconnect never retries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconnectConfig {
    #[serde(default = "default_initial_backoff_secs")]
    pub initial_backoff_secs: u64,
    #[serde(default = "default_max_backoff_secs")]
    pub max_backoff_secs: u64,
    #[serde(default = "default_max_reconnect_attempts")]
    pub max_attempts: u32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_backoff_secs: default_initial_backoff_secs(),
            max_backoff_secs: default_max_backoff_secs(),
            max_attempts: default_max_reconnect_attempts(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Root for collection files and per-session auth material.
    #[serde(default)]
    pub data_dir: Option<String>,
    /// Root for local media referenced by commands with a relative path.
    #[serde(default)]
    pub asset_root: Option<String>,
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    /// Timeout applied to api-command calls and remote media fetches.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default)]
    pub reconnect: ReconnectConfig,

    #[serde(skip)]
    resolved_data_dir: PathBuf,
    #[serde(skip)]
    resolved_asset_root: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        let mut config = Self {
            data_dir: None,
            asset_root: None,
            bind_addr: default_bind_addr(),
            request_timeout_secs: default_request_timeout_secs(),
            reconnect: ReconnectConfig::default(),
            resolved_data_dir: PathBuf::new(),
            resolved_asset_root: PathBuf::new(),
        };
        config.resolve_paths();
        config
    }
}

impl Config {
    /// Load `<home>/.wagate/config.toml`, writing a default file on first run.
    pub fn load_or_init() -> Result<Self, ConfigError> {
        let home = home_dir()?;
        let path = home.join(".wagate").join("config.toml");
        if !path.exists() {
            let config = Self::default();
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let rendered = toml::to_string_pretty(&config)
                .map_err(|e| ConfigError::Load(e.to_string()))?;
            std::fs::write(&path, rendered)?;
            return Ok(config);
        }
        Self::load_from(&path)
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        let mut config: Self = toml::from_str(&raw)?;
        config.resolve_paths();
        Ok(config)
    }

    fn resolve_paths(&mut self) {
        self.resolved_data_dir = match self.data_dir.as_deref() {
            Some(dir) => PathBuf::from(shellexpand::tilde(dir).into_owned()),
            None => home_dir()
                .unwrap_or_else(|_| PathBuf::from("."))
                .join(".wagate"),
        };
        self.resolved_asset_root = match self.asset_root.as_deref() {
            Some(dir) => PathBuf::from(shellexpand::tilde(dir).into_owned()),
            None => self.resolved_data_dir.join("assets"),
        };
    }

    pub fn data_dir(&self) -> &Path {
        &self.resolved_data_dir
    }

    pub fn asset_root(&self) -> &Path {
        &self.resolved_asset_root
    }

    pub fn sessions_file(&self) -> PathBuf {
        self.resolved_data_dir.join("sessions.json")
    }

    pub fn commands_file(&self) -> PathBuf {
        self.resolved_data_dir.join("commands.json")
    }

    pub fn groups_file(&self) -> PathBuf {
        self.resolved_data_dir.join("groups.json")
    }

    /// Per-session credential material, owned by the link layer.
    pub fn auth_dir(&self, session_id: &str) -> PathBuf {
        self.resolved_data_dir.join("auth").join(session_id)
    }

    /// Point every path at `dir`. Used by tests and ad-hoc deployments.
    pub fn with_data_dir(mut self, dir: &Path) -> Self {
        self.data_dir = Some(dir.to_string_lossy().into_owned());
        self.resolve_paths();
        self
    }
}

fn home_dir() -> Result<PathBuf, ConfigError> {
    directories::BaseDirs::new()
        .map(|dirs| dirs.home_dir().to_path_buf())
        .ok_or_else(|| ConfigError::Load("could not determine home directory".into()))
}
