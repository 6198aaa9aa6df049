// Provider configuration management
use crate::error::{OidcError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

const APP_DIR: &str = "aws-cli-oidc";
const CONFIG_DIR_ENV: &str = "AWS_CLI_OIDC_CONFIG";

pub const MIN_SESSION_DURATION_SECONDS: i64 = 900;
pub const MAX_SESSION_DURATION_SECONDS: i64 = 43200;
pub const DEFAULT_SESSION_DURATION_SECONDS: i64 = 3600;
pub const DEFAULT_STS_REGION: &str = "eu-central-1";

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub providers: BTreeMap<String, ProviderConfig>,
}

/// Settings for one OIDC identity provider, written by `setup`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProviderConfig {
    /// Name of the provider entry in the config file
    #[serde(skip)]
    pub name: String,

    pub oidc_server: String,
    pub authorization_url: String,
    pub token_url: String,
    pub client_id: String,

    #[serde(default)]
    pub client_secret: String,

    #[serde(default = "default_max_session_duration")]
    pub max_session_duration_seconds: i64,

    /// Fixed loopback port for the login redirect; ephemeral when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redirect_port: Option<u16>,

    /// Upper bound on waiting for the browser login; unbounded when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub login_timeout_seconds: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sts_region: Option<String>,
}

fn default_max_session_duration() -> i64 {
    DEFAULT_SESSION_DURATION_SECONDS
}

impl ProviderConfig {
    pub fn sts_region(&self) -> &str {
        self.sts_region.as_deref().unwrap_or(DEFAULT_STS_REGION)
    }
}

impl Config {
    /// Get the config directory path
    ///
    /// Priority:
    /// 1. AWS_CLI_OIDC_CONFIG (explicit override)
    /// 2. XDG_CONFIG_HOME/aws-cli-oidc (if env var is set)
    /// 3. ~/.config/aws-cli-oidc (if ~/.config exists)
    /// 4. ~/.aws-cli-oidc (fallback on Unix)
    /// 5. Platform default on Windows
    pub fn config_dir() -> Result<PathBuf> {
        if let Ok(dir) = std::env::var(CONFIG_DIR_ENV) {
            if !dir.is_empty() {
                return Ok(PathBuf::from(dir));
            }
        }

        if let Ok(xdg_config) = std::env::var("XDG_CONFIG_HOME") {
            return Ok(PathBuf::from(xdg_config).join(APP_DIR));
        }

        #[cfg(unix)]
        {
            if let Some(home_dir) = dirs::home_dir() {
                let xdg_config = home_dir.join(".config");
                if xdg_config.exists() {
                    return Ok(xdg_config.join(APP_DIR));
                }
                return Ok(home_dir.join(format!(".{}", APP_DIR)));
            }
        }

        #[cfg(not(unix))]
        {
            if let Some(config_dir) = dirs::config_dir() {
                return Ok(config_dir.join(APP_DIR));
            }
        }

        Err(OidcError::Config(
            "Could not determine config directory".to_string(),
        ))
    }

    pub fn config_file_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    pub fn cache_file_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("cache.json"))
    }

    /// Load configuration from the default location.
    /// A missing file yields an empty configuration.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_file_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!("Config file not found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        tracing::debug!("Loading config from: {}", path.display());
        let contents = fs::read_to_string(path)
            .map_err(|e| OidcError::Config(format!("Failed to read config file: {}", e)))?;

        let mut config: Config = toml::from_str(&contents)
            .map_err(|e| OidcError::Config(format!("Failed to parse config file: {}", e)))?;

        for (name, provider) in config.providers.iter_mut() {
            provider.name = name.clone();
        }

        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_file_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            if !dir.exists() {
                fs::create_dir_all(dir).map_err(|e| {
                    OidcError::Config(format!("Failed to create config directory: {}", e))
                })?;
                tracing::info!("Created config directory: {}", dir.display());
            }
        }

        let toml_string = toml::to_string_pretty(self)?;

        fs::write(path, toml_string)
            .map_err(|e| OidcError::Config(format!("Failed to write config file: {}", e)))?;

        tracing::info!("Saved config to: {}", path.display());
        Ok(())
    }

    /// Look up a provider, failing with a hint to run setup
    pub fn provider(&self, name: &str) -> Result<&ProviderConfig> {
        self.providers.get(name).ok_or_else(|| {
            OidcError::Config(format!(
                "Provider '{}' not configured, run `aws-cli-oidc setup {}` to create it",
                name, name
            ))
        })
    }

    pub fn upsert_provider(&mut self, provider: ProviderConfig) {
        self.providers.insert(provider.name.clone(), provider);
    }
}
