use crate::vhost::VirtualHost;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Default health-probe threshold: concurrently open connections at or
/// above this answer 503.
const DEFAULT_MAX_LOAD: usize = 30;

/// Typed server configuration, the only thing the core ever sees of the
/// config file.
#[derive(Debug, Clone)]
pub struct Config {
    pub listen_port: u16,
    /// Cache budget in bytes. 0 disables caching.
    pub cache_budget: u64,
    /// Health-probe threshold in concurrent connections.
    pub max_load: usize,
    /// The first entry is the default virtual host.
    pub hosts: Vec<VirtualHost>,
}

/// Why loading failed, split so main can exit with a distinct code per
/// category.
#[derive(Debug)]
pub enum ConfigError {
    Missing(PathBuf),
    Unreadable(PathBuf, std::io::Error),
    Invalid(serde_yaml::Error),
    /// Structurally valid YAML with unusable values (port 0, no hosts).
    BadValues(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Missing(p) => write!(f, "configuration file {} does not exist", p.display()),
            ConfigError::Unreadable(p, e) => {
                write!(f, "cannot read configuration file {}: {e}", p.display())
            }
            ConfigError::Invalid(e) => write!(f, "cannot parse configuration file: {e}"),
            ConfigError::BadValues(msg) => write!(f, "bad configuration: {msg}"),
        }
    }
}

impl std::error::Error for ConfigError {}

#[derive(Deserialize)]
struct RawConfig {
    listen_port: u16,
    #[serde(default)]
    cache_size_kb: u64,
    #[serde(default = "default_max_load")]
    max_load: usize,
    #[serde(default)]
    virtual_hosts: Vec<RawHost>,
}

#[derive(Deserialize)]
struct RawHost {
    server_name: String,
    document_root: PathBuf,
}

fn default_max_load() -> usize {
    DEFAULT_MAX_LOAD
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::Missing(path.to_path_buf()));
        }
        let text = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Unreadable(path.to_path_buf(), e))?;
        Self::parse(&text)
    }

    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        let raw: RawConfig = serde_yaml::from_str(text).map_err(ConfigError::Invalid)?;

        if raw.listen_port == 0 {
            return Err(ConfigError::BadValues("listen_port must be non-zero".into()));
        }
        if raw.virtual_hosts.is_empty() {
            return Err(ConfigError::BadValues(
                "at least one virtual host is required".into(),
            ));
        }

        Ok(Config {
            listen_port: raw.listen_port,
            cache_budget: raw.cache_size_kb * 1024,
            max_load: raw.max_load,
            hosts: raw
                .virtual_hosts
                .into_iter()
                .map(|h| VirtualHost::new(h.server_name, h.document_root))
                .collect(),
        })
    }
}
