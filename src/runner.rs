use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::error::FetchError;

/// One external program invocation. `envs` are applied to the child only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub envs: Vec<(String, String)>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            envs: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }
}

// Env values are left out so secrets never reach logs.
impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub success: bool,
    pub code: Option<i32>,
    pub stderr: String,
}

impl CommandOutput {
    pub fn ok() -> Self {
        Self {
            success: true,
            code: Some(0),
            stderr: String::new(),
        }
    }

    pub fn failed(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            success: false,
            code: Some(code),
            stderr: stderr.into(),
        }
    }

    /// Converts a non-zero exit into `DownloadInvocationFailed`.
    pub fn check(self, spec: &CommandSpec) -> Result<(), FetchError> {
        if self.success {
            return Ok(());
        }
        let message = if self.stderr.is_empty() {
            "no output on stderr".to_string()
        } else {
            self.stderr
        };
        Err(FetchError::DownloadInvocationFailed {
            command: spec.to_string(),
            code: self.code,
            message,
        })
    }
}

pub trait CommandRunner {
    /// Runs the program to completion. `Err` means it could not be spawned.
    fn run(&self, spec: &CommandSpec) -> Result<CommandOutput, FetchError>;

    fn is_installed(&self, program: &str) -> bool {
        find_in_path(program).is_some()
    }
}

#[derive(Debug, Clone, Default)]
pub struct SystemCommandRunner;

impl SystemCommandRunner {
    pub fn new() -> Self {
        Self
    }
}

impl CommandRunner for SystemCommandRunner {
    fn run(&self, spec: &CommandSpec) -> Result<CommandOutput, FetchError> {
        let output = Command::new(&spec.program)
            .args(&spec.args)
            .envs(spec.envs.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .output()
            .map_err(|err| FetchError::DownloadInvocationFailed {
                command: spec.to_string(),
                code: None,
                message: err.to_string(),
            })?;
        Ok(CommandOutput {
            success: output.status.success(),
            code: output.status.code(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        })
    }
}

/// Resolves a program the way a shell would: a name containing a separator
/// is checked as given, a bare name is searched on `PATH`.
pub fn find_in_path(program: &str) -> Option<PathBuf> {
    let direct = Path::new(program);
    if direct.components().count() > 1 {
        return direct.is_file().then(|| direct.to_path_buf());
    }

    let candidates = [program.to_string(), format!("{program}.exe")];
    std::env::split_paths(&std::env::var_os("PATH")?)
        .flat_map(|dir| candidates.iter().map(move |name| dir.join(name)))
        .find(|candidate| candidate.is_file())
}
