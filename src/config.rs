use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub store: StoreConfig,
    /// Namespace used when a command does not pass `--namespace`.
    #[serde(default = "default_namespace")]
    pub default_namespace: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api: ApiConfig::default(),
            store: StoreConfig::default(),
            default_namespace: default_namespace(),
        }
    }
}

impl Config {
    pub fn namespace<'a>(&'a self, override_ns: Option<&'a str>) -> &'a str {
        match override_ns {
            Some(ns) => ns,
            None => self.default_namespace.as_str(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ApiConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Automatic retries for transport failures on idempotent GETs.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    /// Directory holding one `<namespace>.db` SQLite file per namespace.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

impl StoreConfig {
    /// Database file for one namespace.
    pub fn store_path(&self, namespace: &str) -> PathBuf {
        self.data_dir.join(format!("{namespace}.db"))
    }
}

fn default_base_url() -> String {
    "https://webapi.legistar.com/v1".to_string()
}
fn default_timeout_secs() -> u64 {
    10
}
fn default_max_retries() -> u32 {
    2
}
fn default_data_dir() -> PathBuf {
    PathBuf::from(".")
}
fn default_namespace() -> String {
    "mountainview".to_string()
}

/// Load configuration from a TOML file. A missing file is not an error:
/// every setting has a default, so first runs work without any setup.
pub fn load_config(path: &Path) -> Result<Config> {
    if !path.exists() {
        return Ok(Config::default());
    }

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    let mut config: Config =
        toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    if config.default_namespace.is_empty() {
        config.default_namespace = default_namespace();
    }
    if config.api.timeout_secs == 0 {
        anyhow::bail!("api.timeout_secs must be > 0");
    }
    if config.api.base_url.is_empty() {
        anyhow::bail!("api.base_url must not be empty");
    }
    // Normalize so URL building can always append "/{namespace}/...".
    while config.api.base_url.ends_with('/') {
        config.api.base_url.pop();
    }

    Ok(config)
}
