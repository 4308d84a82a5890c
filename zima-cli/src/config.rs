//! `config.toml` and `.env` loading
//!
//! Priority order (highest to lowest):
//! 1. Command line flags
//! 2. `<config dir>/config.toml`
//! 3. Built-in defaults

use std::net::{IpAddr, Ipv4Addr};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use zima_server::auth;

pub const CONFIG_FILE: &str = "config.toml";

/// Load `.env` from the current directory, then from the config directory.
/// Variables already set are never overwritten.
pub fn load_dotenv() {
    if let Ok(path) = dotenvy::dotenv() {
        debug!("Loaded .env from {}", path.display());
    }

    if let Ok(dir) = auth::config_dir() {
        let env_file = dir.join(".env");
        if env_file.exists() {
            match dotenvy::from_path(&env_file) {
                Ok(()) => debug!("Loaded .env from {}", env_file.display()),
                Err(e) => debug!("Failed to load {}: {}", env_file.display(), e),
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct ZimaConfig {
    #[serde(default)]
    pub server: ServerSection,

    #[serde(default)]
    pub executor: ExecutorSection,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerSection {
    #[serde(default = "default_bind")]
    pub bind: IpAddr,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Allow any origin instead of localhost only
    #[serde(default)]
    pub cors_permissive: bool,

    #[serde(default = "default_update_interval_ms")]
    pub update_interval_ms: u64,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            port: default_port(),
            cors_permissive: false,
            update_interval_ms: default_update_interval_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExecutorSection {
    /// A cell run is killed after this many seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_shell")]
    pub shell: String,
}

impl Default for ExecutorSection {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            shell: default_shell(),
        }
    }
}

fn default_bind() -> IpAddr {
    IpAddr::V4(Ipv4Addr::LOCALHOST)
}

fn default_port() -> u16 {
    zima_server::http::server::DEFAULT_PORT
}

fn default_update_interval_ms() -> u64 {
    1000
}

fn default_timeout_secs() -> u64 {
    zima_server::executor::DEFAULT_TIMEOUT_SECS
}

fn default_shell() -> String {
    "sh".to_string()
}

impl ZimaConfig {
    pub fn path() -> Result<PathBuf> {
        Ok(auth::config_dir()?.join(CONFIG_FILE))
    }

    /// Load from the config directory; a missing file means defaults
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::path()?)
    }

    /// Unparseable files are reported and ignored
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        match toml::from_str::<ZimaConfig>(&contents) {
            Ok(config) => {
                debug!("Loaded config from {}", path.display());
                Ok(config)
            }
            Err(e) => {
                warn!("Failed to parse {}: {}", path.display(), e);
                Ok(Self::default())
            }
        }
    }
}
