use std::fs;
use std::time::{Duration, Instant};

use camino::{Utf8Component, Utf8Path, Utf8PathBuf};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::archive;
use crate::config::{ConfigLoader, InstallPolicy, ToolConfig};
use crate::credentials::{self, Credentials, EnvSecretStore, SecretStore};
use crate::domain::{DatasetRef, FetchRequest, ResolvedTarget, RuntimeMode, SourceKind};
use crate::downloader::KaggleCli;
use crate::error::FetchError;
use crate::manifest::{self, Manifest};
use crate::output::ConsoleOutput;
use crate::runner::{CommandRunner, SystemCommandRunner};

pub const DATA_DIR: &str = "data";

#[derive(Debug, Clone, Copy, Default)]
pub struct FetchOptions {
    /// Download even when the target directory is already populated.
    pub force: bool,
    /// Resolve the target and planned commands without touching anything.
    pub dry_run: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum FetchAction {
    Downloaded,
    AlreadyPresent,
    Planned,
}

impl FetchAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            FetchAction::Downloaded => "downloaded",
            FetchAction::AlreadyPresent => "already-present",
            FetchAction::Planned => "planned",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FetchOutcome {
    pub dataset: String,
    pub kind: SourceKind,
    pub runtime_mode: RuntimeMode,
    pub target: ResolvedTarget,
    pub action: FetchAction,
    pub archive: Option<String>,
    /// Files unpacked from the archive, relative to the target directory.
    pub files: Vec<String>,
    pub commands: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
    pub elapsed: Option<Duration>,
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

fn emit(sink: &dyn ProgressSink, message: impl Into<String>) {
    sink.event(ProgressEvent {
        message: message.into(),
        elapsed: None,
    });
}

pub struct DatasetFetcher<S: SecretStore, R: CommandRunner> {
    config: ToolConfig,
    cli: KaggleCli,
    secrets: S,
    runner: R,
    working_dir: Option<Utf8PathBuf>,
}

impl<S: SecretStore, R: CommandRunner> DatasetFetcher<S, R> {
    pub fn new(config: ToolConfig, secrets: S, runner: R) -> Self {
        let cli = KaggleCli::new(&config);
        Self {
            config,
            cli,
            secrets,
            runner,
            working_dir: None,
        }
    }

    /// Hosted mode resolves `data/` under this directory instead of the
    /// process working directory.
    pub fn with_working_dir(mut self, dir: impl Into<Utf8PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    /// Resolves credentials and the target directory, then downloads and
    /// extracts unless the directory is already populated.
    ///
    /// A failed download is an error (`DownloadInvocationFailed` with the exit
    /// code and stderr) rather than a logged warning followed by an empty
    /// directory at extraction time. A failed install is still only logged.
    pub fn fetch(
        &self,
        request: &FetchRequest,
        options: FetchOptions,
        sink: &dyn ProgressSink,
    ) -> Result<FetchOutcome, FetchError> {
        let kind = request.kind();
        if kind == SourceKind::Dataset && !request.dataset.has_owner() {
            return Err(FetchError::InvalidIdentifier(request.dataset.to_string()));
        }
        if request.runtime_mode == RuntimeMode::Local && request.local_repo_root.is_none() {
            return Err(FetchError::RepoRootRequired);
        }

        emit(sink, format!("phase=Resolve; {kind} {}", request.dataset));
        let credentials = self.resolve_credentials(request)?;
        let directory = self
            .resolve_target(
                request.runtime_mode,
                request.local_repo_root.as_deref(),
                request.session_label.as_deref(),
            )?
            .directory_path;
        debug!(?credentials, %directory, "resolved fetch target");

        let download = self
            .cli
            .download_spec(&request.dataset, kind, &directory, &credentials);
        let outcome = |action: FetchAction, archive: Option<String>, files: Vec<String>| FetchOutcome {
            dataset: request.dataset.to_string(),
            kind,
            runtime_mode: request.runtime_mode,
            target: ResolvedTarget {
                directory_path: directory.clone(),
            },
            action,
            archive,
            files,
            commands: vec![download.to_string()],
        };

        if options.dry_run {
            emit(sink, format!("phase=Plan; would run {download}"));
            return Ok(outcome(FetchAction::Planned, None, Vec::new()));
        }

        fs::create_dir_all(directory.as_std_path())
            .map_err(|err| FetchError::Filesystem(format!("create {directory}: {err}")))?;

        if !options.force && archive::is_populated(directory.as_std_path())? {
            self.check_existing(&directory, &request.dataset);
            emit(sink, "phase=Store; data directory already populated");
            info!(dataset = %request.dataset, %directory, "data directory already populated, skipping download");
            return Ok(outcome(FetchAction::AlreadyPresent, None, Vec::new()));
        }

        self.ensure_installed(sink);

        emit(sink, format!("phase=Download; {download}"));
        let start = Instant::now();
        self.runner.run(&download)?.check(&download)?;
        sink.event(ProgressEvent {
            message: "phase=Download; finished".to_string(),
            elapsed: Some(start.elapsed()),
        });

        let expected = self.cli.expected_archive(&request.dataset);
        let archive_path = archive::locate_archive(directory.as_std_path(), &expected)?;
        let archive_name = archive_path
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_else(|| expected.clone());
        if archive_name != expected {
            warn!(%expected, found = %archive_name, "archive name differs from the downloader convention");
        }

        emit(sink, format!("phase=Extract; {archive_name}"));
        let files = archive::extract_zip(&archive_path, directory.as_std_path())?;
        debug!(count = files.len(), archive = %archive_name, "extracted archive");

        Manifest {
            dataset: request.dataset.to_string(),
            kind,
            archive: archive_name.clone(),
            files: files.clone(),
            fetched_at: manifest::now_rfc3339(),
            tool: self.cli.program().to_string(),
        }
        .write(&directory)?;

        let status = format!(
            "Kaggle {kind} {} is downloaded and extracted at {directory}",
            request.dataset
        );
        info!("{status}");
        emit(sink, status);

        Ok(outcome(FetchAction::Downloaded, Some(archive_name), files))
    }

    fn resolve_credentials(&self, request: &FetchRequest) -> Result<Credentials, FetchError> {
        match request.runtime_mode {
            RuntimeMode::Hosted => Credentials::from_secrets(&self.secrets),
            RuntimeMode::Local => {
                let path = match &self.config.credentials_path {
                    Some(path) => path.clone(),
                    None => credentials::default_credentials_path()?,
                };
                Credentials::from_file(&path)
            }
        }
    }

    /// `<cwd>/data` when hosted, `<repo_root>/data/<session_label>` when local.
    pub fn resolve_target(
        &self,
        runtime_mode: RuntimeMode,
        repo_root: Option<&Utf8Path>,
        session_label: Option<&str>,
    ) -> Result<ResolvedTarget, FetchError> {
        let directory_path = match runtime_mode {
            RuntimeMode::Hosted => {
                if session_label.is_some() {
                    debug!("session label is ignored in hosted mode");
                }
                self.working_dir()?.join(DATA_DIR)
            }
            RuntimeMode::Local => {
                let root = repo_root.ok_or(FetchError::RepoRootRequired)?;
                let label = session_label
                    .map(str::trim)
                    .filter(|label| !label.is_empty())
                    .ok_or(FetchError::SessionLabelRequired)?;
                root.join(DATA_DIR).join(session_dir_name(label)?)
            }
        };
        Ok(ResolvedTarget { directory_path })
    }

    fn working_dir(&self) -> Result<Utf8PathBuf, FetchError> {
        if let Some(dir) = &self.working_dir {
            return Ok(dir.clone());
        }
        let cwd = std::env::current_dir().map_err(|err| FetchError::Filesystem(err.to_string()))?;
        Utf8PathBuf::from_path_buf(cwd)
            .map_err(|_| FetchError::Filesystem("invalid working directory path".to_string()))
    }

    // Any non-empty directory counts as fetched; the manifest only adds a warning.
    fn check_existing(&self, directory: &Utf8Path, dataset: &DatasetRef) {
        match Manifest::read(directory) {
            Ok(Some(manifest)) if manifest.dataset != dataset.to_string() => {
                warn!(
                    requested = %dataset,
                    present = %manifest.dataset,
                    %directory,
                    "data directory holds a different dataset"
                );
            }
            Ok(_) => {}
            Err(err) => warn!(%directory, "unreadable manifest: {err}"),
        }
    }

    fn ensure_installed(&self, sink: &dyn ProgressSink) {
        let needed = match self.config.install_policy {
            InstallPolicy::Never => false,
            InstallPolicy::Always => true,
            InstallPolicy::IfMissing => !self.runner.is_installed(self.cli.program()),
        };
        if !needed {
            return;
        }
        let Some(install) = self.cli.install_spec() else {
            return;
        };

        emit(sink, format!("phase=Prepare; {install}"));
        let result = self.runner.run(&install).and_then(|output| {
            if output.success {
                Ok(())
            } else {
                Err(FetchError::ExternalToolInstallFailed(format!(
                    "{install} exited with {:?}: {}",
                    output.code, output.stderr
                )))
            }
        });
        if let Err(err) = result {
            warn!("{err}; continuing with download");
        }
    }
}

/// A session label must stay a single directory under `data/`.
fn session_dir_name(label: &str) -> Result<&str, FetchError> {
    let mut components = Utf8Path::new(label).components();
    match (components.next(), components.next()) {
        (Some(Utf8Component::Normal(name)), None) if !name.contains(['/', '\\']) => Ok(name),
        _ => Err(FetchError::InvalidSessionLabel(label.to_string())),
    }
}

/// Fetches with the system collaborators and default options, returning the
/// data directory.
pub fn download(
    identifier: &str,
    runtime_mode: RuntimeMode,
    is_competition: bool,
    repo_root: Option<&Utf8Path>,
    session_label: Option<&str>,
) -> Result<Utf8PathBuf, FetchError> {
    let request = FetchRequest {
        dataset: identifier.parse()?,
        runtime_mode,
        is_competition,
        local_repo_root: repo_root.map(Utf8Path::to_path_buf),
        session_label: session_label.map(str::to_string),
    };
    let config = ConfigLoader::resolve(None)?;
    let fetcher = DatasetFetcher::new(config, EnvSecretStore, SystemCommandRunner::new());
    let outcome = fetcher.fetch(&request, FetchOptions::default(), &ConsoleOutput)?;
    Ok(outcome.target.directory_path)
}
