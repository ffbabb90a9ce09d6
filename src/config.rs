use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use crate::day::DayStartTime;
use crate::duration::deserialize_duration;
use crate::settings::JsonFileLocalStore;

/// Environment variable that overrides `remote.token`.
pub const TOKEN_ENV: &str = "DAYBOOK_TOKEN";

fn default_setting_staleness() -> Duration {
    Duration::from_secs(10 * 60)
}

fn default_identity_staleness() -> Duration {
    Duration::from_secs(5 * 60)
}

fn default_lookup_timeout() -> Duration {
    Duration::from_secs(10)
}

/// Remote API connection settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// Base URL of the tracker API, e.g. "https://habits.example.com".
    /// Without it the CLI runs offline against the local cache only.
    pub base_url: Option<String>,

    /// Bearer token for the API. Prefer the `DAYBOOK_TOKEN` env var.
    pub token: Option<String>,
}

/// Freshness windows and time limits for remote lookups.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RefreshConfig {
    #[serde(
        default = "default_setting_staleness",
        deserialize_with = "deserialize_duration"
    )]
    pub setting_staleness: Duration,

    #[serde(
        default = "default_identity_staleness",
        deserialize_with = "deserialize_duration"
    )]
    pub identity_staleness: Duration,

    /// Upper bound on each remote request and on each half of a session load.
    #[serde(
        default = "default_lookup_timeout",
        deserialize_with = "deserialize_duration"
    )]
    pub lookup_timeout: Duration,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            setting_staleness: default_setting_staleness(),
            identity_staleness: default_identity_staleness(),
            lookup_timeout: default_lookup_timeout(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DayConfig {
    /// Day start used when neither the local cache nor the remote has one.
    pub default_start: DayStartTime,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Local settings cache file. Relative paths resolve from the config
    /// file's directory. Defaults to the user cache directory.
    pub cache_file: Option<PathBuf>,

    pub remote: RemoteConfig,

    pub refresh: RefreshConfig,

    pub day: DayConfig,
}

impl Config {
    /// Load config from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn resolve_cache_file(&self, config_dir: &Path) -> PathBuf {
        match &self.cache_file {
            Some(path) if path.is_absolute() => path.clone(),
            Some(path) => config_dir.join(path),
            None => JsonFileLocalStore::default_path()
                .unwrap_or_else(|| config_dir.join(".daybook-cache.json")),
        }
    }
}

/// Loaded configuration with paths resolved and the token located.
#[derive(Debug)]
pub struct ResolvedConfig {
    pub cache_file: PathBuf,
    pub base_url: Option<String>,
    pub token: Option<SecretString>,
    pub refresh: RefreshConfig,
    pub day: DayConfig,
}

/// Returns the default config file path.
///
/// Resolution order:
/// 1. `./daybook.toml` if it exists in current directory
/// 2. `~/.local/share/daybook/daybook.toml` (XDG data directory)
pub fn default_config_path() -> PathBuf {
    let local_config = PathBuf::from("daybook.toml");
    if local_config.exists() {
        return local_config;
    }

    if let Some(data_dir) = dirs::data_dir() {
        return data_dir.join("daybook").join("daybook.toml");
    }

    local_config
}

impl ResolvedConfig {
    /// Load config, falling back to defaults if the file doesn't exist.
    pub fn load_or_default(config_path: &Path) -> Result<Self> {
        let config = Config::load_or_default(config_path)?;

        let config_path = if config_path.is_relative() {
            std::env::current_dir()
                .context("Failed to get current directory")?
                .join(config_path)
        } else {
            config_path.to_path_buf()
        };
        let config_dir = config_path
            .parent()
            .context("Config path has no parent directory")?;

        let env_token = std::env::var(TOKEN_ENV).ok().filter(|t| !t.is_empty());
        Ok(Self::from_config(config, config_dir, env_token))
    }

    fn from_config(config: Config, config_dir: &Path, env_token: Option<String>) -> Self {
        let cache_file = config.resolve_cache_file(config_dir);
        let token = env_token.or(config.remote.token).map(SecretString::from);
        Self {
            cache_file,
            base_url: config.remote.base_url,
            token,
            refresh: config.refresh,
            day: config.day,
        }
    }
}
