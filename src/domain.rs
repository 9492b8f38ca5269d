use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use camino::Utf8PathBuf;
use clap::ValueEnum;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::FetchError;

fn segment_regex() -> &'static Regex {
    static SEGMENT: OnceLock<Regex> = OnceLock::new();
    SEGMENT.get_or_init(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._-]*$").unwrap())
}

/// Kaggle reference: `<owner>/<name>` for datasets, a bare slug for competitions.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DatasetRef {
    owner: Option<String>,
    name: String,
}

impl DatasetRef {
    pub fn owner(&self) -> Option<&str> {
        self.owner.as_deref()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn has_owner(&self) -> bool {
        self.owner.is_some()
    }
}

impl fmt::Display for DatasetRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.owner {
            Some(owner) => write!(f, "{owner}/{}", self.name),
            None => write!(f, "{}", self.name),
        }
    }
}

impl FromStr for DatasetRef {
    type Err = FetchError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        let (owner, name) = match trimmed.split_once('/') {
            Some((owner, name)) => (Some(owner), name),
            None => (None, trimmed),
        };
        let valid = segment_regex().is_match(name)
            && owner.map(|o| segment_regex().is_match(o)).unwrap_or(true);
        if !valid {
            return Err(FetchError::InvalidIdentifier(value.to_string()));
        }
        Ok(Self {
            owner: owner.map(str::to_string),
            name: name.to_string(),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeMode {
    /// Managed notebook session with a secret store.
    Hosted,
    /// Caller-supplied repository on local disk.
    Local,
}

impl fmt::Display for RuntimeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuntimeMode::Hosted => write!(f, "hosted"),
            RuntimeMode::Local => write!(f, "local"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Dataset,
    Competition,
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceKind::Dataset => write!(f, "dataset"),
            SourceKind::Competition => write!(f, "competition"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub dataset: DatasetRef,
    pub runtime_mode: RuntimeMode,
    pub is_competition: bool,
    pub local_repo_root: Option<Utf8PathBuf>,
    pub session_label: Option<String>,
}

impl FetchRequest {
    pub fn hosted(dataset: DatasetRef) -> Self {
        Self {
            dataset,
            runtime_mode: RuntimeMode::Hosted,
            is_competition: false,
            local_repo_root: None,
            session_label: None,
        }
    }

    pub fn local(
        dataset: DatasetRef,
        repo_root: impl Into<Utf8PathBuf>,
        session_label: impl Into<String>,
    ) -> Self {
        Self {
            dataset,
            runtime_mode: RuntimeMode::Local,
            is_competition: false,
            local_repo_root: Some(repo_root.into()),
            session_label: Some(session_label.into()),
        }
    }

    pub fn competition(mut self, is_competition: bool) -> Self {
        self.is_competition = is_competition;
        self
    }

    pub fn kind(&self) -> SourceKind {
        if self.is_competition {
            SourceKind::Competition
        } else {
            SourceKind::Dataset
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedTarget {
    pub directory_path: Utf8PathBuf,
}
