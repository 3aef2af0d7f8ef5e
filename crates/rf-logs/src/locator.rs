//! Log file discovery
//!
//! Each configured path id names a log file family: the current file plus
//! rotated siblings in the same directory. Two rotation schemes are
//! recognized:
//!
//! - numeric, `home-assistant.log.1` (lower is newer)
//! - dated, `packet.log.2024-01-14` (later is newer)
//!
//! Members are addressed by a `file_id` of the form `system:current` or
//! `system:1`. Ids are resolved against the file system on every call, so a
//! rotation between calls is picked up without any cache to invalidate.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local, NaiveDate, NaiveDateTime};
use serde::Serialize;
use tracing::debug;

use crate::error::LogError;

/// Suffix naming the live file of a family
pub const CURRENT_SUFFIX: &str = "current";

/// One member of a log file family
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogFileInfo {
    /// Stable handle, `{path_id}:{suffix}`
    pub file_id: String,
    /// File name
    pub label: String,
    /// Resolved location
    pub path: PathBuf,
    /// True for the live file
    pub is_current: bool,
    /// Size at listing time
    pub size_bytes: u64,
    /// Last modification, local time
    pub modified: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Rotation {
    Numeric(u32),
    Dated(NaiveDate),
}

impl Rotation {
    fn parse(suffix: &str) -> Option<Self> {
        if !suffix.is_empty() && suffix.bytes().all(|b| b.is_ascii_digit()) {
            return suffix.parse().ok().map(Rotation::Numeric);
        }
        NaiveDate::parse_from_str(suffix, "%Y-%m-%d")
            .ok()
            .map(Rotation::Dated)
    }

    /// Newest first: numeric ascending, then dated descending
    fn newest_first(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Rotation::Numeric(a), Rotation::Numeric(b)) => a.cmp(b),
            (Rotation::Dated(a), Rotation::Dated(b)) => b.cmp(a),
            (Rotation::Numeric(_), Rotation::Dated(_)) => Ordering::Less,
            (Rotation::Dated(_), Rotation::Numeric(_)) => Ordering::Greater,
        }
    }
}

/// Maps path ids to log file families
#[derive(Debug, Clone, Default)]
pub struct LogFileLocator {
    paths: BTreeMap<String, PathBuf>,
}

impl LogFileLocator {
    /// Create a locator over the given `path_id -> path` map
    pub fn new(paths: impl IntoIterator<Item = (String, PathBuf)>) -> Self {
        Self {
            paths: paths.into_iter().collect(),
        }
    }

    /// Configured path ids
    pub fn path_ids(&self) -> impl Iterator<Item = &str> {
        self.paths.keys().map(String::as_str)
    }

    /// Path of the current file for a path id
    pub fn base_path(&self, path_id: &str) -> Result<&Path, LogError> {
        self.paths
            .get(path_id)
            .map(PathBuf::as_path)
            .ok_or_else(|| LogError::UnknownPath(path_id.to_string()))
    }

    /// Current file followed by rotated siblings, newest first
    ///
    /// Files that do not exist are omitted; a missing directory yields an
    /// empty list.
    pub fn list_files(&self, path_id: &str) -> Result<Vec<LogFileInfo>, LogError> {
        let base = self.base_path(path_id)?;
        let mut files = Vec::new();

        if let Ok(meta) = std::fs::metadata(base) {
            if meta.is_file() {
                files.push(file_info(path_id, CURRENT_SUFFIX, base, &meta, true));
            }
        }

        let Some(base_name) = base.file_name().and_then(|n| n.to_str()) else {
            return Ok(files);
        };
        let dir = match base.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        };
        let entries = match std::fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("Log directory {} does not exist", dir.display());
                return Ok(files);
            }
            Err(e) => return Err(LogError::unavailable(&current_id(path_id), dir, e)),
        };

        let prefix = format!("{base_name}.");
        let mut rotated: Vec<(Rotation, String, PathBuf, std::fs::Metadata)> = entries
            .filter_map(Result::ok)
            .filter_map(|entry| {
                let name = entry.file_name().into_string().ok()?;
                let suffix = name.strip_prefix(&prefix)?.to_string();
                let rotation = Rotation::parse(&suffix)?;
                let meta = entry.metadata().ok().filter(|m| m.is_file())?;
                Some((rotation, suffix, entry.path(), meta))
            })
            .collect();
        rotated.sort_by(|a, b| a.0.newest_first(&b.0));

        files.extend(
            rotated
                .iter()
                .map(|(_, suffix, path, meta)| file_info(path_id, suffix, path, meta, false)),
        );
        Ok(files)
    }

    /// Resolve a file id to a path
    ///
    /// The path is not required to exist; opening it reports that.
    pub fn resolve(&self, file_id: &str) -> Result<PathBuf, LogError> {
        let (path_id, suffix) = file_id
            .split_once(':')
            .ok_or_else(|| LogError::UnknownFile(file_id.to_string()))?;
        let base = self.base_path(path_id).map_err(|e| match e {
            LogError::UnknownPath(_) => LogError::UnknownFile(file_id.to_string()),
            other => other,
        })?;

        if suffix == CURRENT_SUFFIX {
            return Ok(base.to_path_buf());
        }
        if Rotation::parse(suffix).is_none() {
            return Err(LogError::UnknownFile(file_id.to_string()));
        }
        let mut name = base.as_os_str().to_os_string();
        name.push(".");
        name.push(suffix);
        Ok(PathBuf::from(name))
    }
}

/// File id of the live file for a path id
pub fn current_id(path_id: &str) -> String {
    format!("{path_id}:{CURRENT_SUFFIX}")
}

fn file_info(
    path_id: &str,
    suffix: &str,
    path: &Path,
    meta: &std::fs::Metadata,
    is_current: bool,
) -> LogFileInfo {
    LogFileInfo {
        file_id: format!("{path_id}:{suffix}"),
        label: path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default(),
        path: path.to_path_buf(),
        is_current,
        size_bytes: meta.len(),
        modified: meta
            .modified()
            .ok()
            .map(|t| DateTime::<Local>::from(t).naive_local()),
    }
}
