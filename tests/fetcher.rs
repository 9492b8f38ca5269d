use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;

use assert_matches::assert_matches;
use camino::{Utf8Path, Utf8PathBuf};
use zip::write::SimpleFileOptions;

use kaggle_fetch::config::{InstallPolicy, ToolConfig};
use kaggle_fetch::credentials::{CONFIG_DIR_ENV, KEY_SECRET, SecretStore, USERNAME_SECRET};
use kaggle_fetch::domain::{FetchRequest, RuntimeMode, SourceKind};
use kaggle_fetch::error::FetchError;
use kaggle_fetch::fetcher::{DatasetFetcher, FetchAction, FetchOptions, download};
use kaggle_fetch::manifest::Manifest;
use kaggle_fetch::output::JsonOutput;
use kaggle_fetch::runner::{CommandOutput, CommandRunner, CommandSpec};

#[derive(Default)]
struct MapSecrets(HashMap<String, String>);

impl MapSecrets {
    fn kaggle() -> Self {
        Self(HashMap::from([
            (USERNAME_SECRET.to_string(), "ada".to_string()),
            (KEY_SECRET.to_string(), "k3y".to_string()),
        ]))
    }
}

impl SecretStore for MapSecrets {
    fn get(&self, name: &str) -> Result<String, FetchError> {
        self.0
            .get(name)
            .cloned()
            .ok_or_else(|| FetchError::MissingSecret(name.to_string()))
    }
}

/// Stands in for the kaggle CLI: records every call and drops a zip into
/// the `-p` directory on download.
struct FakeKaggle {
    calls: Mutex<Vec<CommandSpec>>,
    archive: Option<(&'static str, Vec<(&'static str, &'static [u8])>)>,
    installed: bool,
    install_exit: i32,
    download_exit: i32,
}

impl FakeKaggle {
    fn with_archive(name: &'static str, files: Vec<(&'static str, &'static [u8])>) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            archive: Some((name, files)),
            installed: true,
            install_exit: 0,
            download_exit: 0,
        }
    }

    fn widgets() -> Self {
        Self::with_archive("widgets.zip", vec![("data.csv", &b"id,name\n1,bolt\n"[..])])
    }

    fn calls(&self) -> Vec<CommandSpec> {
        self.calls.lock().unwrap().clone()
    }

    fn downloads(&self) -> Vec<CommandSpec> {
        self.calls()
            .into_iter()
            .filter(|spec| spec.program == "kaggle")
            .collect()
    }
}

impl CommandRunner for FakeKaggle {
    fn run(&self, spec: &CommandSpec) -> Result<CommandOutput, FetchError> {
        self.calls.lock().unwrap().push(spec.clone());
        if spec.program != "kaggle" {
            return Ok(if self.install_exit == 0 {
                CommandOutput::ok()
            } else {
                CommandOutput::failed(self.install_exit, "pip: network unreachable")
            });
        }
        if self.download_exit != 0 {
            return Ok(CommandOutput::failed(self.download_exit, "401 - Unauthorized"));
        }
        if let Some((name, files)) = &self.archive {
            let pos = spec.args.iter().position(|arg| arg == "-p").unwrap();
            let dir = Path::new(&spec.args[pos + 1]);
            write_zip(&dir.join(name), files);
        }
        Ok(CommandOutput::ok())
    }

    fn is_installed(&self, _program: &str) -> bool {
        self.installed
    }
}

fn write_zip(path: &Path, files: &[(&str, &[u8])]) {
    let file = fs::File::create(path).unwrap();
    let mut writer = zip::ZipWriter::new(file);
    for (name, content) in files {
        writer.start_file(*name, SimpleFileOptions::default()).unwrap();
        writer.write_all(content).unwrap();
    }
    writer.finish().unwrap();
}

struct Workspace {
    _temp: tempfile::TempDir,
    root: Utf8PathBuf,
    credentials: Utf8PathBuf,
}

impl Workspace {
    fn new() -> Self {
        let temp = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
        let kaggle_dir = root.join("home/.kaggle");
        fs::create_dir_all(&kaggle_dir).unwrap();
        let credentials = kaggle_dir.join("kaggle.json");
        fs::write(&credentials, br#"{"username":"ada","key":"k3y"}"#).unwrap();
        fs::create_dir_all(root.join("repo")).unwrap();
        Self {
            _temp: temp,
            root,
            credentials,
        }
    }

    fn repo(&self) -> Utf8PathBuf {
        self.root.join("repo")
    }

    fn config(&self) -> ToolConfig {
        ToolConfig {
            credentials_path: Some(self.credentials.clone().into_std_path_buf()),
            ..ToolConfig::default()
        }
    }

    fn fetcher<R: CommandRunner>(&self, runner: R) -> DatasetFetcher<MapSecrets, R> {
        DatasetFetcher::new(self.config(), MapSecrets::kaggle(), runner)
            .with_working_dir(self.root.join("notebook"))
    }
}

fn widgets_local(repo: &Utf8Path) -> FetchRequest {
    FetchRequest::local("acme/widgets".parse().unwrap(), repo, "nb1")
}

#[test]
fn local_fetch_extracts_into_session_dir() {
    let ws = Workspace::new();
    let fetcher = ws.fetcher(FakeKaggle::widgets());

    let outcome = fetcher
        .fetch(&widgets_local(&ws.repo()), FetchOptions::default(), &JsonOutput)
        .unwrap();

    let expected = ws.repo().join("data/nb1");
    assert_eq!(outcome.target.directory_path, expected);
    assert_eq!(outcome.action, FetchAction::Downloaded);
    assert_eq!(outcome.archive.as_deref(), Some("widgets.zip"));
    assert_eq!(outcome.files, vec!["data.csv"]);
    assert_eq!(
        fs::read_to_string(expected.join("data.csv")).unwrap(),
        "id,name\n1,bolt\n"
    );

    let manifest = Manifest::read(&expected).unwrap().unwrap();
    assert_eq!(manifest.dataset, "acme/widgets");
    assert_eq!(manifest.kind, SourceKind::Dataset);
    assert_eq!(manifest.files, vec!["data.csv"]);

    let calls = fetcher.runner().calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(
        calls[0].args,
        vec!["datasets", "download", "acme/widgets", "-p", expected.as_str()]
    );
    assert!(calls[0].envs.is_empty());
}

#[test]
fn hosted_fetch_uses_working_dir_data() {
    let ws = Workspace::new();
    let fetcher = ws.fetcher(FakeKaggle::widgets());
    let request = FetchRequest::hosted("acme/widgets".parse().unwrap());

    let outcome = fetcher
        .fetch(&request, FetchOptions::default(), &JsonOutput)
        .unwrap();

    let expected = ws.root.join("notebook/data");
    assert_eq!(outcome.target.directory_path, expected);
    assert!(fs::read_dir(&expected).unwrap().next().is_some());

    let downloads = fetcher.runner().downloads();
    let download = &downloads[0];
    assert!(
        download
            .envs
            .contains(&(USERNAME_SECRET.to_string(), "ada".to_string()))
    );
    assert!(
        download
            .envs
            .contains(&(KEY_SECRET.to_string(), "k3y".to_string()))
    );
}

#[test]
fn hosted_fetch_without_secret_fails() {
    let ws = Workspace::new();
    let fetcher = DatasetFetcher::new(ws.config(), MapSecrets::default(), FakeKaggle::widgets())
        .with_working_dir(ws.root.join("notebook"));
    let request = FetchRequest::hosted("acme/widgets".parse().unwrap());

    let err = fetcher
        .fetch(&request, FetchOptions::default(), &JsonOutput)
        .unwrap_err();
    assert_matches!(err, FetchError::MissingSecret(name) if name == USERNAME_SECRET);
    assert!(fetcher.runner().calls().is_empty());
}

#[test]
fn local_without_session_label_fails_before_any_call() {
    let ws = Workspace::new();
    let fetcher = ws.fetcher(FakeKaggle::widgets());
    let mut request = widgets_local(&ws.repo());
    request.session_label = None;

    let err = fetcher
        .fetch(&request, FetchOptions::default(), &JsonOutput)
        .unwrap_err();
    assert_matches!(err, FetchError::SessionLabelRequired);
    assert!(fetcher.runner().calls().is_empty());
    assert!(!ws.repo().join("data").exists());
}

#[test]
fn local_without_credentials_fails_before_creating_dirs() {
    let ws = Workspace::new();
    fs::remove_file(&ws.credentials).unwrap();
    let fetcher = ws.fetcher(FakeKaggle::widgets());

    let err = fetcher
        .fetch(&widgets_local(&ws.repo()), FetchOptions::default(), &JsonOutput)
        .unwrap_err();
    assert_matches!(err, FetchError::CredentialsMissing(path) if path == ws.credentials.as_std_path());
    assert!(!ws.repo().join("data").exists());
    assert!(fetcher.runner().calls().is_empty());
}

#[test]
fn local_without_repo_root_fails() {
    let ws = Workspace::new();
    let fetcher = ws.fetcher(FakeKaggle::widgets());
    let mut request = widgets_local(&ws.repo());
    request.local_repo_root = None;

    let err = fetcher
        .fetch(&request, FetchOptions::default(), &JsonOutput)
        .unwrap_err();
    assert_matches!(err, FetchError::RepoRootRequired);
}

#[test]
fn second_fetch_skips_populated_dir() {
    let ws = Workspace::new();
    let fetcher = ws.fetcher(FakeKaggle::widgets());
    let request = widgets_local(&ws.repo());

    let first = fetcher
        .fetch(&request, FetchOptions::default(), &JsonOutput)
        .unwrap();
    let second = fetcher
        .fetch(&request, FetchOptions::default(), &JsonOutput)
        .unwrap();

    assert_eq!(first.target, second.target);
    assert_eq!(second.action, FetchAction::AlreadyPresent);
    assert_eq!(fetcher.runner().downloads().len(), 1);
}

#[test]
fn force_downloads_into_populated_dir() {
    let ws = Workspace::new();
    let fetcher = ws.fetcher(FakeKaggle::widgets());
    let request = widgets_local(&ws.repo());
    let options = FetchOptions {
        force: true,
        dry_run: false,
    };

    fetcher.fetch(&request, options, &JsonOutput).unwrap();
    let again = fetcher.fetch(&request, options, &JsonOutput).unwrap();

    assert_eq!(again.action, FetchAction::Downloaded);
    assert_eq!(fetcher.runner().downloads().len(), 2);
}

#[test]
fn existing_empty_dir_is_not_an_error() {
    let ws = Workspace::new();
    fs::create_dir_all(ws.repo().join("data/nb1")).unwrap();
    let fetcher = ws.fetcher(FakeKaggle::widgets());

    let outcome = fetcher
        .fetch(&widgets_local(&ws.repo()), FetchOptions::default(), &JsonOutput)
        .unwrap();
    assert_eq!(outcome.action, FetchAction::Downloaded);
    assert!(ws.repo().join("data/nb1/data.csv").exists());
}

#[test]
fn competition_uses_competition_verb() {
    let ws = Workspace::new();
    let fetcher = ws.fetcher(FakeKaggle::with_archive(
        "titanic.zip",
        vec![("train.csv", &b"PassengerId\n1\n"[..])],
    ));
    let request =
        FetchRequest::local("titanic".parse().unwrap(), ws.repo(), "nb1").competition(true);

    let outcome = fetcher
        .fetch(&request, FetchOptions::default(), &JsonOutput)
        .unwrap();
    assert_eq!(outcome.kind, SourceKind::Competition);

    let downloads = fetcher.runner().downloads();
    let download = &downloads[0];
    assert_eq!(&download.args[..4], ["competitions", "download", "-c", "titanic"]);
    assert!(!download.args.iter().any(|arg| arg == "datasets"));
    assert!(ws.repo().join("data/nb1/train.csv").exists());
}

#[test]
fn dataset_requires_owner() {
    let ws = Workspace::new();
    let fetcher = ws.fetcher(FakeKaggle::widgets());
    let request = FetchRequest::local("titanic".parse().unwrap(), ws.repo(), "nb1");

    let err = fetcher
        .fetch(&request, FetchOptions::default(), &JsonOutput)
        .unwrap_err();
    assert_matches!(err, FetchError::InvalidIdentifier(_));
}

#[test]
fn failed_download_surfaces_exit_detail() {
    let ws = Workspace::new();
    let mut runner = FakeKaggle::widgets();
    runner.download_exit = 1;
    let fetcher = ws.fetcher(runner);

    let err = fetcher
        .fetch(&widgets_local(&ws.repo()), FetchOptions::default(), &JsonOutput)
        .unwrap_err();
    assert_matches!(
        err,
        FetchError::DownloadInvocationFailed { code: Some(1), ref message, .. }
            if message.contains("Unauthorized")
    );
    assert!(Manifest::read(&ws.repo().join("data/nb1")).unwrap().is_none());
}

#[test]
fn missing_archive_is_reported() {
    let ws = Workspace::new();
    let mut runner = FakeKaggle::widgets();
    runner.archive = None;
    let fetcher = ws.fetcher(runner);

    let err = fetcher
        .fetch(&widgets_local(&ws.repo()), FetchOptions::default(), &JsonOutput)
        .unwrap_err();
    assert_matches!(err, FetchError::NoArchiveFound(_));
}

#[test]
fn install_failure_is_not_fatal() {
    let ws = Workspace::new();
    let mut runner = FakeKaggle::widgets();
    runner.installed = false;
    runner.install_exit = 1;
    let fetcher = ws.fetcher(runner);

    let outcome = fetcher
        .fetch(&widgets_local(&ws.repo()), FetchOptions::default(), &JsonOutput)
        .unwrap();
    assert_eq!(outcome.action, FetchAction::Downloaded);

    let calls = fetcher.runner().calls();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0].to_string(), "python -m pip install kaggle");
}

#[test]
fn install_policy_never_skips_install() {
    let ws = Workspace::new();
    let mut runner = FakeKaggle::widgets();
    runner.installed = false;
    let config = ToolConfig {
        install_policy: InstallPolicy::Never,
        ..ws.config()
    };
    let fetcher = DatasetFetcher::new(config, MapSecrets::kaggle(), runner);

    fetcher
        .fetch(&widgets_local(&ws.repo()), FetchOptions::default(), &JsonOutput)
        .unwrap();
    assert_eq!(fetcher.runner().calls().len(), 1);
}

#[test]
fn dry_run_touches_nothing() {
    let ws = Workspace::new();
    let fetcher = ws.fetcher(FakeKaggle::widgets());
    let options = FetchOptions {
        force: false,
        dry_run: true,
    };

    let outcome = fetcher
        .fetch(&widgets_local(&ws.repo()), options, &JsonOutput)
        .unwrap();
    assert_eq!(outcome.action, FetchAction::Planned);
    assert_eq!(outcome.commands.len(), 1);
    assert!(outcome.commands[0].starts_with("kaggle datasets download acme/widgets -p "));
    assert!(!ws.repo().join("data").exists());
    assert!(fetcher.runner().calls().is_empty());
}

#[test]
fn resolve_target_layouts() {
    let ws = Workspace::new();
    let fetcher = ws.fetcher(FakeKaggle::widgets());

    let hosted = fetcher
        .resolve_target(RuntimeMode::Hosted, None, Some("ignored"))
        .unwrap();
    assert_eq!(hosted.directory_path, ws.root.join("notebook/data"));

    let local = fetcher
        .resolve_target(RuntimeMode::Local, Some(&ws.repo()), Some("nb2"))
        .unwrap();
    assert!(local.directory_path.ends_with("repo/data/nb2"));

    let err = fetcher
        .resolve_target(RuntimeMode::Local, Some(&ws.repo()), Some("  "))
        .unwrap_err();
    assert_matches!(err, FetchError::SessionLabelRequired);

    let outside = ws.root.join("elsewhere");
    for label in [outside.as_str(), "../../outside", "..", ".", "nb1/nested", "./nb1"] {
        let err = fetcher
            .resolve_target(RuntimeMode::Local, Some(&ws.repo()), Some(label))
            .unwrap_err();
        assert_matches!(err, FetchError::InvalidSessionLabel(ref value) if value == label);
    }
}

#[test]
fn escaping_session_label_writes_nothing() {
    let ws = Workspace::new();
    let fetcher = ws.fetcher(FakeKaggle::widgets());
    let request = FetchRequest::local("acme/widgets".parse().unwrap(), ws.repo(), "../escaped");

    let err = fetcher
        .fetch(&request, FetchOptions::default(), &JsonOutput)
        .unwrap_err();
    assert_matches!(err, FetchError::InvalidSessionLabel(_));
    assert!(!ws.repo().join("escaped").exists());
    assert!(!ws.repo().join("data").exists());
    assert!(fetcher.runner().calls().is_empty());
}

#[test]
fn download_without_credentials_file_fails() {
    let temp = tempfile::tempdir().unwrap();
    let config_dir = temp.path().join("kaggle-config");
    fs::create_dir_all(&config_dir).unwrap();
    let root = Utf8PathBuf::from_path_buf(temp.path().join("repo")).unwrap();
    // KAGGLE_CONFIG_DIR is only read by tests that go through `download`.
    unsafe { std::env::set_var(CONFIG_DIR_ENV, &config_dir) };

    let err = download(
        "acme/widgets",
        RuntimeMode::Local,
        false,
        Some(&root),
        Some("nb1"),
    )
    .unwrap_err();
    assert_matches!(err, FetchError::CredentialsMissing(path) if path == config_dir.join("kaggle.json"));
    assert!(!root.join("data").exists());
}

#[test]
fn populated_dir_with_other_dataset_is_still_skipped() {
    let ws = Workspace::new();
    let fetcher = ws.fetcher(FakeKaggle::widgets());
    fetcher
        .fetch(&widgets_local(&ws.repo()), FetchOptions::default(), &JsonOutput)
        .unwrap();

    let other = FetchRequest::local("acme/gadgets".parse().unwrap(), ws.repo(), "nb1");
    let outcome = fetcher
        .fetch(&other, FetchOptions::default(), &JsonOutput)
        .unwrap();
    assert_eq!(outcome.action, FetchAction::AlreadyPresent);
    assert_eq!(fetcher.runner().downloads().len(), 1);
}
