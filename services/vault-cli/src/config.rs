//! Configuration types and loading
//!
//! Config precedence: CLI args > env vars > config file > defaults.
//! Tokens are never stored in the TOML; they live in `client.token_file`.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use vault_api::{DeviceType, EnvironmentUrls};
use vault_auth::DeviceInfo;

/// Root configuration
#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub environment: EnvironmentUrls,
    #[serde(default)]
    pub client: ClientConfig,
}

/// Client identity and local state
#[derive(Debug, Deserialize)]
pub struct ClientConfig {
    #[serde(default = "default_device")]
    pub device: DeviceType,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_token_file")]
    pub token_file: PathBuf,
    /// Stable identifier sent with password grants
    #[serde(default)]
    pub device_identifier: Option<String>,
    /// Human-readable device name; the device label when unset
    #[serde(default)]
    pub device_name: Option<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            device: default_device(),
            timeout_secs: default_timeout(),
            token_file: default_token_file(),
            device_identifier: None,
            device_name: None,
        }
    }
}

fn default_device() -> DeviceType {
    DeviceType::Cli
}

fn default_timeout() -> u64 {
    60
}

fn default_token_file() -> PathBuf {
    PathBuf::from("vault-tokens.json")
}

impl ClientConfig {
    /// Device details for the password grant, when an identifier is configured.
    pub fn device_info(&self) -> Option<DeviceInfo> {
        let identifier = self.device_identifier.as_ref()?.trim();
        if identifier.is_empty() {
            return None;
        }
        Some(DeviceInfo {
            device_type: self.device.label().to_string(),
            identifier: identifier.to_string(),
            name: self
                .device_name
                .clone()
                .unwrap_or_else(|| self.device.label().to_string()),
        })
    }
}

impl Config {
    /// Load configuration from a TOML file, then overlay environment variables.
    ///
    /// `VAULT_BASE_URL` replaces the whole `[environment]` table with a
    /// single self-hosted base.
    pub fn load(path: &Path) -> common::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&contents)?;

        if let Ok(base) = std::env::var("VAULT_BASE_URL")
            && !base.trim().is_empty()
        {
            config.environment = EnvironmentUrls::base(base);
        }

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> common::Result<()> {
        let env = &self.environment;
        check_url("environment.base", env.base.as_deref())?;
        check_url("environment.api", env.api.as_deref())?;
        check_url("environment.identity", env.identity.as_deref())?;

        if env.base.is_none() && env.api.is_some() != env.identity.is_some() {
            return Err(common::Error::Config(
                "environment.api and environment.identity must be set together".into(),
            ));
        }

        if self.client.timeout_secs == 0 {
            return Err(common::Error::Config(
                "timeout_secs must be greater than 0".into(),
            ));
        }

        Ok(())
    }

    /// Config file path from `--config` / `CONFIG_PATH`, or the default.
    pub fn resolve_path(cli_path: Option<PathBuf>) -> PathBuf {
        cli_path.unwrap_or_else(|| PathBuf::from("vault-cli.toml"))
    }
}

fn check_url(field: &'static str, value: Option<&str>) -> common::Result<()> {
    let Some(value) = value else {
        return Ok(());
    };
    let invalid = || common::Error::InvalidUrl {
        field,
        value: value.to_string(),
    };
    let parsed = url::Url::parse(value).map_err(|_| invalid())?;
    match parsed.scheme() {
        "http" | "https" => Ok(()),
        _ => Err(invalid()),
    }
}
