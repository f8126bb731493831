//! Checks run at the process boundary, before any row is read.
//!
//! In order: the upload exists, the mapping covers every required field,
//! every mapped header is in the file's header row. The header check
//! collects all mismatches and returns the available headers with them.

use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::PreflightError;
use crate::models::{ColumnMapping, ValidationReport};
use crate::parser::{read_info, CsvInfo};
use crate::validation::validate_mapping;

/// What preflight learned about an accepted file.
#[derive(Debug, Clone)]
pub struct PreflightReport {
    pub info: CsvInfo,
    /// Schema-level report; carries warnings only once accepted.
    pub validation: ValidationReport,
}

/// Validate `mapping` against the file at `path`.
pub fn preflight(path: &Path, mapping: &ColumnMapping) -> Result<PreflightReport, PreflightError> {
    if !path.is_file() {
        return Err(PreflightError::FileNotFound(path.display().to_string()));
    }

    let validation = validate_mapping(mapping, None);
    if !validation.is_valid {
        return Err(PreflightError::IncompleteMapping { errors: validation.errors });
    }

    let info = read_info(path)?;
    let missing: Vec<String> = mapping
        .headers()
        .into_iter()
        .filter(|h| !info.headers.iter().any(|available| available == h))
        .map(str::to_string)
        .collect();

    if !missing.is_empty() {
        return Err(PreflightError::UnknownHeaders {
            missing,
            available: info.headers,
        });
    }

    debug!(path = %path.display(), "preflight passed");
    Ok(PreflightReport { info, validation })
}

/// Resolve an upload id to a path inside `dir`.
///
/// Ids are the tokens handed out at upload time; anything else (path
/// separators, dots) is treated as not found.
pub fn resolve_upload(dir: &Path, file_id: &str) -> Result<PathBuf, PreflightError> {
    let well_formed = !file_id.is_empty()
        && file_id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-');
    if !well_formed {
        return Err(PreflightError::FileNotFound(file_id.to_string()));
    }

    let path = dir.join(format!("{}.csv", file_id));
    if !path.is_file() {
        return Err(PreflightError::FileNotFound(file_id.to_string()));
    }
    Ok(path)
}

/// Owns a temporary upload and removes it exactly once.
///
/// Removal happens on [`UploadedFile::remove`] or, failing that, on drop.
#[derive(Debug)]
pub struct UploadedFile {
    path: PathBuf,
    removed: bool,
}

impl UploadedFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), removed: false }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Disarm the guard and hand the path back; the file is kept.
    pub fn keep(mut self) -> PathBuf {
        self.removed = true;
        std::mem::take(&mut self.path)
    }

    /// Delete the file now. A file that is already gone is not an error.
    pub fn remove(mut self) -> io::Result<()> {
        self.removed = true;
        remove_quietly(&self.path)
    }
}

impl Drop for UploadedFile {
    fn drop(&mut self) {
        if self.removed {
            return;
        }
        self.removed = true;
        if let Err(e) = remove_quietly(&self.path) {
            warn!(path = %self.path.display(), error = %e, "failed to remove upload");
        }
    }
}

/// Remove uploads in `dir` last modified at least `ttl` ago.
///
/// Analyzed files that never get a process request would otherwise pile up.
/// Returns how many were removed.
pub fn sweep_uploads(dir: &Path, ttl: Duration) -> io::Result<usize> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e),
    };

    let mut removed = 0;
    for entry in entries.flatten() {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("csv") {
            continue;
        }
        let stale = entry
            .metadata()
            .and_then(|m| m.modified())
            .ok()
            .and_then(|modified| modified.elapsed().ok())
            .is_some_and(|age| age >= ttl);
        if !stale {
            continue;
        }
        match remove_quietly(&path) {
            Ok(()) => removed += 1,
            Err(e) => warn!(path = %path.display(), error = %e, "failed to sweep upload"),
        }
    }

    if removed > 0 {
        debug!(removed, dir = %dir.display(), "swept stale uploads");
    }
    Ok(removed)
}

fn remove_quietly(path: &Path) -> io::Result<()> {
    match std::fs::remove_file(path) {
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}
