use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};

use crate::domain::SourceKind;
use crate::error::FetchError;

pub const MANIFEST_FILE: &str = ".kaggle-fetch.json";

/// Record of what was extracted into a data directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub dataset: String,
    pub kind: SourceKind,
    pub archive: String,
    #[serde(default)]
    pub files: Vec<String>,
    pub fetched_at: String,
    pub tool: String,
}

impl Manifest {
    pub fn path_in(dir: &Utf8Path) -> Utf8PathBuf {
        dir.join(MANIFEST_FILE)
    }

    pub fn read(dir: &Utf8Path) -> Result<Option<Manifest>, FetchError> {
        let path = Self::path_in(dir);
        if !path.as_std_path().exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(path.as_std_path())
            .map_err(|err| FetchError::Filesystem(err.to_string()))?;
        let manifest = serde_json::from_str(&content)
            .map_err(|err| FetchError::Filesystem(format!("{path}: {err}")))?;
        Ok(Some(manifest))
    }

    pub fn write(&self, dir: &Utf8Path) -> Result<(), FetchError> {
        let path = Self::path_in(dir);
        let tmp_path = path.with_extension("json.tmp");
        let content = serde_json::to_vec_pretty(self)
            .map_err(|err| FetchError::Filesystem(err.to_string()))?;
        fs::write(tmp_path.as_std_path(), &content)
            .map_err(|err| FetchError::Filesystem(err.to_string()))?;
        fs::rename(tmp_path.as_std_path(), path.as_std_path())
            .map_err(|err| FetchError::Filesystem(err.to_string()))?;
        Ok(())
    }
}

pub fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}
