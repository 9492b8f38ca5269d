use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::FetchError;

pub const DEFAULT_CONFIG_FILE: &str = "kaggle-fetch.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InstallPolicy {
    /// Run the install command before every download.
    Always,
    /// Install only when the downloader is not on PATH.
    #[default]
    IfMissing,
    Never,
}

/// On-disk shape of `kaggle-fetch.json`. Every field is optional.
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub downloader: Option<String>,
    #[serde(default)]
    pub install_command: Option<Vec<String>>,
    #[serde(default)]
    pub install_policy: Option<InstallPolicy>,
    #[serde(default)]
    pub credentials_path: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct ToolConfig {
    pub downloader: String,
    pub install_command: Vec<String>,
    pub install_policy: InstallPolicy,
    /// Overrides the conventional `kaggle.json` lookup.
    pub credentials_path: Option<PathBuf>,
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            downloader: "kaggle".to_string(),
            install_command: default_install_command(),
            install_policy: InstallPolicy::default(),
            credentials_path: None,
        }
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Loads an explicit config path, or `kaggle-fetch.json` from the working
    /// directory when present. A missing default file yields defaults.
    pub fn resolve(path: Option<&str>) -> Result<ToolConfig, FetchError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(DEFAULT_CONFIG_FILE),
        };

        if path.is_none() && !config_path.exists() {
            return Ok(ToolConfig::default());
        }

        let content = fs::read_to_string(&config_path)
            .map_err(|_| FetchError::ConfigRead(config_path.clone()))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|err| FetchError::ConfigParse(err.to_string()))?;

        Self::resolve_config(config)
    }

    pub fn resolve_config(config: Config) -> Result<ToolConfig, FetchError> {
        let defaults = ToolConfig::default();

        let downloader = match config.downloader {
            Some(value) if value.trim().is_empty() => {
                return Err(FetchError::ConfigParse(
                    "downloader must not be empty".to_string(),
                ));
            }
            Some(value) => value,
            None => defaults.downloader,
        };

        let install_command = match config.install_command {
            Some(command) if command.is_empty() => {
                return Err(FetchError::ConfigParse(
                    "install_command must name a program".to_string(),
                ));
            }
            Some(command) => command,
            None => defaults.install_command,
        };

        Ok(ToolConfig {
            downloader,
            install_command,
            install_policy: config.install_policy.unwrap_or_default(),
            credentials_path: config.credentials_path,
        })
    }
}

pub fn default_install_command() -> Vec<String> {
    vec![
        "python".to_string(),
        "-m".to_string(),
        "pip".to_string(),
        "install".to_string(),
        "kaggle".to_string(),
    ]
}
