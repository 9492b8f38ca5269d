use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use zip::ZipArchive;

use crate::error::FetchError;

fn archive_error(err: zip::result::ZipError) -> FetchError {
    FetchError::Archive(err.to_string())
}

fn fs_error(path: &Path, err: io::Error) -> FetchError {
    FetchError::Filesystem(format!("{}: {err}", path.display()))
}

/// Unpacks `zip_path` into `target_dir`, replacing files that already exist.
/// Returns the extracted file paths relative to `target_dir`, in archive order.
pub fn extract_zip(zip_path: &Path, target_dir: &Path) -> Result<Vec<String>, FetchError> {
    let file = fs::File::open(zip_path).map_err(|err| fs_error(zip_path, err))?;
    let mut archive = ZipArchive::new(file).map_err(archive_error)?;

    let mut extracted = Vec::with_capacity(archive.len());
    for index in 0..archive.len() {
        let mut entry = archive.by_index(index).map_err(archive_error)?;
        let Some(relative) = entry.enclosed_name() else {
            return Err(FetchError::Archive(format!(
                "{} escapes the data directory",
                entry.name()
            )));
        };
        let destination = target_dir.join(&relative);

        let dir = if entry.is_dir() {
            Some(destination.as_path())
        } else {
            destination.parent()
        };
        if let Some(dir) = dir {
            fs::create_dir_all(dir).map_err(|err| fs_error(dir, err))?;
        }
        if entry.is_dir() {
            continue;
        }

        let mut out = fs::File::create(&destination).map_err(|err| fs_error(&destination, err))?;
        io::copy(&mut entry, &mut out).map_err(|err| fs_error(&destination, err))?;
        extracted.push(relative.to_string_lossy().replace('\\', "/"));
    }
    Ok(extracted)
}

/// Prefers `expected`; otherwise the lexicographically first `.zip` file.
pub fn locate_archive(dir: &Path, expected: &str) -> Result<PathBuf, FetchError> {
    let preferred = dir.join(expected);
    if preferred.is_file() {
        return Ok(preferred);
    }

    let entries = fs::read_dir(dir).map_err(|err| FetchError::Filesystem(err.to_string()))?;
    let mut archives = entries
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| {
            path.is_file()
                && path
                    .extension()
                    .and_then(|value| value.to_str())
                    .map(|value| value.eq_ignore_ascii_case("zip"))
                    .unwrap_or(false)
        })
        .collect::<Vec<_>>();
    archives.sort();
    archives
        .into_iter()
        .next()
        .ok_or_else(|| FetchError::NoArchiveFound(dir.to_path_buf()))
}

pub fn is_populated(dir: &Path) -> Result<bool, FetchError> {
    let mut entries = fs::read_dir(dir).map_err(|err| FetchError::Filesystem(err.to_string()))?;
    Ok(entries.next().is_some())
}
