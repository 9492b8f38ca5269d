use camino::Utf8Path;

use crate::config::ToolConfig;
use crate::credentials::Credentials;
use crate::domain::{DatasetRef, SourceKind};
use crate::runner::CommandSpec;

/// Builds invocations of the kaggle CLI.
#[derive(Debug, Clone)]
pub struct KaggleCli {
    program: String,
    install_command: Vec<String>,
}

impl KaggleCli {
    pub fn new(config: &ToolConfig) -> Self {
        Self {
            program: config.downloader.clone(),
            install_command: config.install_command.clone(),
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn install_spec(&self) -> Option<CommandSpec> {
        let (program, args) = self.install_command.split_first()?;
        Some(
            args.iter()
                .fold(CommandSpec::new(program.as_str()), |spec, arg| spec.arg(arg.as_str())),
        )
    }

    pub fn download_spec(
        &self,
        dataset: &DatasetRef,
        kind: SourceKind,
        target_dir: &Utf8Path,
        credentials: &Credentials,
    ) -> CommandSpec {
        let spec = CommandSpec::new(self.program.as_str());
        let spec = match kind {
            SourceKind::Dataset => spec
                .arg("datasets")
                .arg("download")
                .arg(dataset.to_string()),
            SourceKind::Competition => spec
                .arg("competitions")
                .arg("download")
                .arg("-c")
                .arg(dataset.to_string()),
        };
        credentials
            .child_env()
            .into_iter()
            .fold(spec.arg("-p").arg(target_dir.as_str()), |spec, (k, v)| {
                spec.env(k, v)
            })
    }

    /// The CLI names the archive after the dataset or competition slug.
    pub fn expected_archive(&self, dataset: &DatasetRef) -> String {
        format!("{}.zip", dataset.name())
    }
}
