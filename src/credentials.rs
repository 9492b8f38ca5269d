use std::path::{Path, PathBuf};

use directories::BaseDirs;

use crate::error::FetchError;

pub const USERNAME_SECRET: &str = "KAGGLE_USERNAME";
pub const KEY_SECRET: &str = "KAGGLE_KEY";
pub const CONFIG_DIR_ENV: &str = "KAGGLE_CONFIG_DIR";
pub const CREDENTIALS_FILE: &str = "kaggle.json";

/// Session-scoped secret store of a hosted notebook runtime.
pub trait SecretStore {
    fn get(&self, name: &str) -> Result<String, FetchError>;
}

/// Hosted runtimes expose session secrets to native processes as
/// environment variables.
#[derive(Debug, Clone, Default)]
pub struct EnvSecretStore;

impl SecretStore for EnvSecretStore {
    fn get(&self, name: &str) -> Result<String, FetchError> {
        match std::env::var(name) {
            Ok(value) if !value.trim().is_empty() => Ok(value),
            _ => Err(FetchError::MissingSecret(name.to_string())),
        }
    }
}

/// How the downloader authenticates for one call.
#[derive(Clone, PartialEq, Eq)]
pub enum Credentials {
    /// Values passed to the child process environment.
    Token { username: String, key: String },
    /// The downloader reads its own credentials file.
    File(PathBuf),
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Credentials::Token { username, .. } => f
                .debug_struct("Token")
                .field("username", username)
                .field("key", &"***")
                .finish(),
            Credentials::File(path) => f.debug_tuple("File").field(path).finish(),
        }
    }
}

impl Credentials {
    pub fn from_secrets(store: &dyn SecretStore) -> Result<Self, FetchError> {
        Ok(Credentials::Token {
            username: store.get(USERNAME_SECRET)?,
            key: store.get(KEY_SECRET)?,
        })
    }

    /// Only checks that the file exists; its contents belong to the downloader.
    pub fn from_file(path: &Path) -> Result<Self, FetchError> {
        if !path.is_file() {
            return Err(FetchError::CredentialsMissing(path.to_path_buf()));
        }
        Ok(Credentials::File(path.to_path_buf()))
    }

    pub fn child_env(&self) -> Vec<(String, String)> {
        match self {
            Credentials::Token { username, key } => vec![
                (USERNAME_SECRET.to_string(), username.clone()),
                (KEY_SECRET.to_string(), key.clone()),
            ],
            Credentials::File(_) => Vec::new(),
        }
    }
}

/// `$KAGGLE_CONFIG_DIR/kaggle.json`, else `~/.kaggle/kaggle.json`.
pub fn default_credentials_path() -> Result<PathBuf, FetchError> {
    if let Some(dir) = std::env::var_os(CONFIG_DIR_ENV) {
        return Ok(PathBuf::from(dir).join(CREDENTIALS_FILE));
    }
    BaseDirs::new()
        .map(|dirs| dirs.home_dir().join(".kaggle").join(CREDENTIALS_FILE))
        .ok_or_else(|| FetchError::Filesystem("unable to resolve home directory".to_string()))
}
