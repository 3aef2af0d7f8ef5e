//! Shared scan loop for the file-backed message providers

use std::collections::VecDeque;
use std::ops::ControlFlow;
use std::path::PathBuf;

use rf_protocol::{MessageFilter, NormalizedMessage, ParseError};
use serde::Serialize;
use tracing::debug;

use crate::error::LogError;
use crate::locator::{current_id, LogFileLocator};
use crate::reader::for_each_line;

/// Skipped-line warnings kept per call
pub const MAX_PARSE_WARNINGS: usize = 100;

/// Messages read from a log file family
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProviderResult {
    /// Matching messages, oldest first
    pub messages: Vec<NormalizedMessage>,
    /// More messages matched than `limit`
    pub truncated: bool,
    /// One entry per skipped line, `{label}:{line}: {error}`
    pub parse_warnings: Vec<String>,
    /// File ids that were read
    pub files_read: Vec<String>,
    pub lines_scanned: usize,
}

#[derive(Debug, Default)]
struct WarningSink {
    entries: Vec<String>,
    overflow: usize,
}

impl WarningSink {
    fn push(&mut self, warning: String) {
        if self.entries.len() < MAX_PARSE_WARNINGS {
            self.entries.push(warning);
        } else {
            self.overflow += 1;
        }
    }

    fn finish(mut self) -> Vec<String> {
        if self.overflow > 0 {
            self.entries
                .push(format!("... {} more lines skipped", self.overflow));
        }
        self.entries
    }
}

/// Scan a file family, keeping the most recent `limit` matching messages
///
/// `parse` returns `Ok(None)` for lines that are skipped silently. Files are
/// read oldest first so that the retained window is the newest one.
pub(crate) fn collect_messages<F>(
    locator: &LogFileLocator,
    path_id: &str,
    include_rotated: bool,
    filter: &MessageFilter,
    limit: usize,
    mut parse: F,
) -> Result<ProviderResult, LogError>
where
    F: FnMut(&str) -> Result<Option<NormalizedMessage>, ParseError>,
{
    let files: Vec<(String, String, PathBuf)> = if include_rotated {
        let listed = locator.list_files(path_id)?;
        if listed.is_empty() {
            return Err(LogError::unavailable(
                &current_id(path_id),
                locator.base_path(path_id)?,
                std::io::ErrorKind::NotFound.into(),
            ));
        }
        listed
            .into_iter()
            .rev()
            .map(|f| (f.file_id, f.label, f.path))
            .collect()
    } else {
        let path = locator.base_path(path_id)?.to_path_buf();
        let label = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path_id.to_string());
        vec![(current_id(path_id), label, path)]
    };

    let mut kept: VecDeque<NormalizedMessage> = VecDeque::new();
    let mut truncated = false;
    let mut warnings = WarningSink::default();
    let mut files_read = Vec::with_capacity(files.len());
    let mut lines_scanned = 0;

    for (file_id, label, path) in files {
        lines_scanned += for_each_line(&file_id, &path, |index, line| {
            match parse(line) {
                Ok(Some(msg)) if filter.matches(&msg) => {
                    kept.push_back(msg);
                    if kept.len() > limit {
                        kept.pop_front();
                        truncated = true;
                    }
                }
                Ok(_) => {}
                Err(e) => warnings.push(format!("{}:{}: {}", label, index + 1, e)),
            }
            ControlFlow::Continue(())
        })?;
        files_read.push(file_id);
    }

    let mut messages = Vec::from(kept);
    messages.sort_by_key(|m| m.timestamp);
    let parse_warnings = warnings.finish();
    debug!(
        "Read {} lines from '{}': {} messages, {} warnings",
        lines_scanned,
        path_id,
        messages.len(),
        parse_warnings.len()
    );

    Ok(ProviderResult {
        messages,
        truncated,
        parse_warnings,
        files_read,
        lines_scanned,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_warning_cap() {
        let mut sink = WarningSink::default();
        for i in 0..(MAX_PARSE_WARNINGS + 7) {
            sink.push(format!("w{i}"));
        }
        let warnings = sink.finish();
        assert_eq!(warnings.len(), MAX_PARSE_WARNINGS + 1);
        assert_eq!(warnings.last().unwrap(), "... 7 more lines skipped");
    }
}
