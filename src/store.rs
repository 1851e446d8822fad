//! Candidate and patch storage.
//!
//! Layout, per candidate `n` and accepted patch `k`:
//!
//! ```text
//! <candidates>/<n>/<package path>/<Class>.<ext>
//! <candidates>/<n>/edit
//! <candidates>/<n>/change.json
//! <candidates>/<n>/patch.diff
//! <patches>/<k>/...          same files, plus patch_info.json
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use mendtool_core::change::Change;
use mendtool_core::diff::unified_diff;
use mendtool_core::patch_info::PatchInfo;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize {path}: {source}")]
    Serialize {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl StoreError {
    pub fn path(&self) -> &Path {
        match self {
            StoreError::Io { path, .. } | StoreError::Serialize { path, .. } => path,
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Relative source path of a class: `a.b.C` becomes `a/b/C.<ext>`. Nested
/// classes (`a.b.C$D`) live in their outer class's file.
pub fn class_path(class: &str, extension: &str) -> PathBuf {
    let outer = class.split('$').next().unwrap_or(class);
    let mut path: PathBuf = outer.split('.').collect();
    path.set_extension(extension);
    path
}

/// One rendered candidate and where it came from.
#[derive(Debug, Clone, Copy)]
pub struct Candidate<'a> {
    pub class: &'a str,
    pub extension: &'a str,
    pub original: &'a str,
    pub source: &'a str,
    pub info: &'a PatchInfo,
    pub change: &'a Change,
}

/// Search counters recorded with an accepted patch.
#[derive(Debug, Clone, Serialize)]
pub struct PatchRecord {
    pub patch_id: usize,
    /// Elapsed search time, `h hrs. m min. s sec.`
    pub time: String,
    pub timestamp: String,
    pub candidates: usize,
    pub compile_errors: usize,
    pub test_failures: usize,
    pub concretize: String,
    pub info: PatchInfo,
}

pub struct CandidateStore {
    candidate_dir: PathBuf,
    patch_dir: PathBuf,
}

impl CandidateStore {
    pub fn new(candidate_dir: impl Into<PathBuf>, patch_dir: impl Into<PathBuf>) -> Self {
        CandidateStore {
            candidate_dir: candidate_dir.into(),
            patch_dir: patch_dir.into(),
        }
    }

    pub fn candidate_dir(&self) -> &Path {
        &self.candidate_dir
    }

    pub fn patch_dir(&self) -> &Path {
        &self.patch_dir
    }

    /// Write candidate `n`. Returns the path of the rendered source file.
    pub fn store_candidate(&self, n: usize, candidate: &Candidate<'_>) -> StoreResult<PathBuf> {
        let dir = self.candidate_dir.join(n.to_string());
        let file = write_candidate(&dir, candidate)?;
        debug!(candidate = n, file = %file.display(), "stored candidate");
        Ok(file)
    }

    /// Id for the next accepted patch: the number of numbered entries
    /// already in the patch directory.
    pub fn next_patch_id(&self) -> usize {
        let Ok(entries) = fs::read_dir(&self.patch_dir) else {
            return 0;
        };
        entries
            .filter_map(Result::ok)
            .filter(|e| e.path().is_dir())
            .filter(|e| {
                let name = e.file_name();
                let name = name.to_string_lossy();
                !name.is_empty() && name.chars().all(|c| c.is_ascii_digit())
            })
            .count()
    }

    /// Write an accepted patch with its record. Returns the patch directory.
    pub fn store_patch(
        &self,
        candidate: &Candidate<'_>,
        record: &PatchRecord,
    ) -> StoreResult<PathBuf> {
        let dir = self.patch_dir.join(record.patch_id.to_string());
        write_candidate(&dir, candidate)?;
        let info_path = dir.join("patch_info.json");
        write_json(&info_path, record)?;
        info!(patch = record.patch_id, dir = %dir.display(), "stored patch");
        Ok(dir)
    }
}

fn write_candidate(dir: &Path, candidate: &Candidate<'_>) -> StoreResult<PathBuf> {
    let rel = class_path(candidate.class, candidate.extension);
    let file = dir.join(&rel);
    if let Some(parent) = file.parent() {
        fs::create_dir_all(parent).map_err(io_err(parent))?;
    }
    fs::write(&file, candidate.source).map_err(io_err(&file))?;

    let edit = dir.join("edit");
    fs::write(&edit, candidate.info.edit_text()).map_err(io_err(&edit))?;

    write_json(&dir.join("change.json"), candidate.change)?;

    let diff = dir.join("patch.diff");
    let rel = rel.to_string_lossy().replace('\\', "/");
    let text = unified_diff(&rel, candidate.original, candidate.source);
    fs::write(&diff, text).map_err(io_err(&diff))?;
    Ok(file)
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> StoreResult<()> {
    let json = serde_json::to_string_pretty(value).map_err(|source| StoreError::Serialize {
        path: path.to_path_buf(),
        source,
    })?;
    fs::write(path, json).map_err(io_err(path))
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> StoreError + '_ {
    move |source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// ISO 8601 UTC timestamp.
pub fn format_timestamp(time: SystemTime) -> String {
    use chrono::{DateTime, Utc};

    let datetime: DateTime<Utc> = time.into();
    datetime.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}
