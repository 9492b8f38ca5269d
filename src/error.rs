use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum FetchError {
    #[error("invalid dataset identifier: {0}")]
    #[diagnostic(help("datasets are addressed as <owner>/<name>, competitions as <name>"))]
    InvalidIdentifier(String),

    #[error("local runtime requires a repository root")]
    RepoRootRequired,

    #[error("kaggle credentials not found at {0}")]
    #[diagnostic(help("create an API token on kaggle.com and save it as kaggle.json"))]
    CredentialsMissing(PathBuf),

    #[error("local runtime requires a session label to namespace the data directory")]
    SessionLabelRequired,

    #[error("invalid session label {0:?}: expected a single directory name")]
    InvalidSessionLabel(String),

    #[error("secret {0} is not available in the session secret store")]
    MissingSecret(String),

    #[error("failed to install the downloader: {0}")]
    ExternalToolInstallFailed(String),

    #[error("{command} failed (exit code {code:?}): {message}")]
    DownloadInvocationFailed {
        command: String,
        code: Option<i32>,
        message: String,
    },

    #[error("no archive found in {0}")]
    NoArchiveFound(PathBuf),

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),

    #[error("archive error: {0}")]
    Archive(String),
}
