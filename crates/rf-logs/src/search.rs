//! Log tail and search
//!
//! Search runs two streaming passes over the file. The first records the
//! line numbers that satisfy the filters, together with their context
//! windows; the second collects the text of the merged windows. Memory use
//! is bounded by the result size, not the file size.
//!
//! Windows are inclusive `(start, end)` pairs of 0-based line numbers. Two
//! windows merge when they overlap or touch, so the blocks of a result are
//! sorted and separated by at least one line.

use std::collections::VecDeque;
use std::ops::ControlFlow;
use std::path::Path;
use std::sync::Arc;

use chrono::NaiveDateTime;
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::LogError;
use crate::line_parser::{LogLevel, LogLineParser, ParsedLine};
use crate::locator::{LogFileInfo, LogFileLocator};
use crate::reader::for_each_line;

/// Lines of context on each side of a match
pub const DEFAULT_CONTEXT_LINES: usize = 3;
/// Matches recorded before a search reports truncation
pub const DEFAULT_MAX_MATCHES: usize = 200;
/// Characters of rendered text before truncation
pub const DEFAULT_MAX_CHARS: usize = 40_000;
/// Lines returned by a tail request
pub const DEFAULT_TAIL_LINES: usize = 200;

/// Patterns that open a stack trace, matched anywhere in a line
pub const DEFAULT_TRACEBACK_PATTERNS: &[&str] = &[
    r"^\s*Traceback \(most recent call last\)",
    r"Stack trace",
    r"stack backtrace",
    r"^\s*Caused by:",
    r"Exception in",
];

const DEFAULT_TRACEBACK_MAX_LINES: usize = 500;

/// Stack trace detection
#[derive(Debug, Clone)]
pub struct TracebackConfig {
    patterns: Vec<Regex>,
    max_lines: usize,
}

impl TracebackConfig {
    /// Compile a list of start patterns
    pub fn new<I, S>(patterns: I) -> Result<Self, LogError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let patterns = patterns
            .into_iter()
            .map(|p| {
                Regex::new(p.as_ref()).map_err(|source| LogError::InvalidPattern {
                    pattern: p.as_ref().to_string(),
                    source,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            patterns,
            max_lines: DEFAULT_TRACEBACK_MAX_LINES,
        })
    }

    /// Cap how far a single trace may extend a window
    pub fn with_max_lines(mut self, max_lines: usize) -> Self {
        self.max_lines = max_lines;
        self
    }

    /// True if `line` opens a stack trace
    pub fn is_start(&self, line: &str) -> bool {
        self.patterns.iter().any(|p| p.is_match(line))
    }
}

impl Default for TracebackConfig {
    fn default() -> Self {
        Self {
            patterns: DEFAULT_TRACEBACK_PATTERNS
                .iter()
                .filter_map(|p| Regex::new(p).ok())
                .collect(),
            max_lines: DEFAULT_TRACEBACK_MAX_LINES,
        }
    }
}

/// Search parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchRequest {
    /// Substring every match must contain
    pub include: Option<String>,
    /// Substring no match may contain
    pub exclude: Option<String>,
    /// Apply `include`/`exclude` case-sensitively
    pub case_sensitive: bool,
    /// Exact severity
    pub level: Option<LogLevel>,
    /// Case-insensitive substring of the logger name
    pub logger: Option<String>,
    /// Only lines from the last N minutes
    pub since_minutes: Option<u32>,
    /// Only the last N lines of the file
    pub tail_lines: Option<usize>,
    /// Context lines on each side of a match
    pub context_lines: usize,
    /// Matches recorded before truncation
    pub max_matches: usize,
    /// Extend windows over stack traces that follow a match
    pub include_tracebacks: bool,
    /// Rendered text budget
    pub max_chars: usize,
}

impl Default for SearchRequest {
    fn default() -> Self {
        Self {
            include: None,
            exclude: None,
            case_sensitive: false,
            level: None,
            logger: None,
            since_minutes: None,
            tail_lines: None,
            context_lines: DEFAULT_CONTEXT_LINES,
            max_matches: DEFAULT_MAX_MATCHES,
            include_tracebacks: false,
            max_chars: DEFAULT_MAX_CHARS,
        }
    }
}

impl SearchRequest {
    /// Reject inconsistent parameters before touching the file
    pub fn validate(&self) -> Result<(), LogError> {
        if self.since_minutes.is_some() && self.tail_lines.is_some() {
            return Err(LogError::InvalidFilter(
                "since_minutes and tail_lines are mutually exclusive".into(),
            ));
        }
        if self.max_matches == 0 {
            return Err(LogError::InvalidFilter("max_matches must be positive".into()));
        }
        if self.since_minutes == Some(0) {
            return Err(LogError::InvalidFilter("since_minutes must be positive".into()));
        }
        if self.tail_lines == Some(0) {
            return Err(LogError::InvalidFilter("tail_lines must be positive".into()));
        }
        Ok(())
    }
}

/// Merge overlapping or adjacent inclusive windows
///
/// The result is sorted by start. Input order does not matter.
pub fn merge_windows(windows: impl IntoIterator<Item = (usize, usize)>) -> Vec<(usize, usize)> {
    let mut windows: Vec<(usize, usize)> = windows.into_iter().collect();
    windows.sort_unstable();

    let mut merged: Vec<(usize, usize)> = Vec::with_capacity(windows.len());
    for (start, end) in windows {
        match merged.last_mut() {
            Some(last) if start <= last.1.saturating_add(1) => last.1 = last.1.max(end),
            _ => merged.push((start, end)),
        }
    }
    merged
}

/// One contiguous extract of a search result
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchBlock {
    /// First line, 0-based
    pub start_line: usize,
    /// Last line, 0-based, inclusive
    pub end_line: usize,
    /// Matching lines within the block
    pub matched_line_numbers: Vec<usize>,
    /// Text of lines `start_line..=end_line`
    pub lines: Vec<String>,
}

/// Result of [`LogSearchEngine::search`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchResult {
    /// Searched file
    pub file_id: String,
    /// Merged windows in file order
    pub blocks: Vec<SearchBlock>,
    /// Blocks rendered with line headers
    pub text_plain: String,
    /// `text_plain` inside a fenced code block
    pub text_markdown: String,
    /// Matches recorded
    pub match_count: usize,
    /// More lines matched than `max_matches`
    pub truncated: bool,
    /// Rendered text was cut to `max_chars`
    pub text_truncated: bool,
    /// Lines read by the matching pass
    pub lines_scanned: usize,
}

/// Result of [`LogSearchEngine::get_tail`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TailResult {
    /// Tailed file
    pub file_id: String,
    /// Returned lines, oldest first
    pub lines: Vec<String>,
    /// 0-based number of the first returned line
    pub first_line: usize,
    /// Lines in the file
    pub total_lines: usize,
    /// `lines` joined and cut to `max_chars`
    pub text: String,
    /// `text` was cut
    pub text_truncated: bool,
}

/// Cut `text` so it holds at most `max_chars` characters
///
/// The kept prefix is followed by a `… [truncated N chars]` marker that
/// counts against the budget. A budget too small for the marker gets a
/// plain cut.
pub fn truncate_text(text: String, max_chars: usize) -> (String, bool) {
    let total = text.chars().count();
    if total <= max_chars {
        return (text, false);
    }

    // The marker can only shrink as more text is kept
    let keep = max_chars.saturating_sub(truncation_marker(total).chars().count());
    let marker = truncation_marker(total - keep);
    if keep + marker.chars().count() > max_chars {
        return (text.chars().take(max_chars).collect(), true);
    }

    let mut kept: String = text.chars().take(keep).collect();
    kept.push_str(&marker);
    (kept, true)
}

fn truncation_marker(removed: usize) -> String {
    format!("\n… [truncated {removed} chars]")
}

/// Render blocks as plain text with a `--- lines A-B ---` header each
pub fn render_plain(blocks: &[SearchBlock]) -> String {
    blocks
        .iter()
        .map(|block| {
            let mut text = format!(
                "--- lines {}-{} ---",
                block.start_line + 1,
                block.end_line + 1
            );
            for line in &block.lines {
                text.push('\n');
                text.push_str(line);
            }
            text
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

const FENCE_OPEN: &str = "```text\n";
const FENCE_CLOSE: &str = "\n```";

/// Wrap plain text in a fenced code block of at most `max_chars` characters
///
/// The body is truncated to leave room for the fence, which always stays
/// closed. A budget smaller than the bare fence yields an empty string.
pub fn render_markdown(plain: &str, max_chars: usize) -> (String, bool) {
    let fence = FENCE_OPEN.len() + FENCE_CLOSE.len();
    let Some(budget) = max_chars.checked_sub(fence) else {
        return (String::new(), !plain.is_empty());
    };
    let (body, truncated) = truncate_text(plain.to_string(), budget);
    (format!("{FENCE_OPEN}{body}{FENCE_CLOSE}"), truncated)
}

struct Matcher {
    include: Option<Regex>,
    exclude: Option<Regex>,
    level: Option<LogLevel>,
    logger: Option<String>,
    cutoff: Option<NaiveDateTime>,
    first_line: usize,
}

impl Matcher {
    fn compile(req: &SearchRequest, now: NaiveDateTime, first_line: usize) -> Result<Self, LogError> {
        let substring = |text: &Option<String>| -> Result<Option<Regex>, LogError> {
            text.as_deref()
                .map(|s| {
                    RegexBuilder::new(&regex::escape(s))
                        .case_insensitive(!req.case_sensitive)
                        .build()
                        .map_err(|source| LogError::InvalidPattern {
                            pattern: s.to_string(),
                            source,
                        })
                })
                .transpose()
        };

        Ok(Self {
            include: substring(&req.include)?,
            exclude: substring(&req.exclude)?,
            level: req.level,
            logger: req.logger.as_ref().map(|l| l.to_lowercase()),
            cutoff: req
                .since_minutes
                .map(|m| now - chrono::Duration::minutes(i64::from(m))),
            first_line,
        })
    }

    fn matches(
        &self,
        index: usize,
        line: &str,
        parsed: &ParsedLine<'_>,
        current_ts: Option<NaiveDateTime>,
    ) -> bool {
        index >= self.first_line
            && self
                .cutoff
                .is_none_or(|cutoff| current_ts.is_some_and(|ts| ts >= cutoff))
            && self.include.as_ref().is_none_or(|re| re.is_match(line))
            && !self.exclude.as_ref().is_some_and(|re| re.is_match(line))
            && self.level.is_none_or(|level| parsed.level == Some(level))
            && self.logger.as_deref().is_none_or(|needle| {
                parsed
                    .logger
                    .is_some_and(|l| l.to_lowercase().contains(needle))
            })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TracePhase {
    /// Matched line was not a trace start; check the next line
    Probe,
    /// Inside a trace
    Extend,
}

#[derive(Debug)]
struct TraceTracker {
    window: usize,
    start: usize,
    phase: TracePhase,
}

/// Tail and search over located log files
#[derive(Debug, Clone)]
pub struct LogSearchEngine {
    locator: Arc<LogFileLocator>,
    traceback: TracebackConfig,
}

impl LogSearchEngine {
    /// Engine over the files known to `locator`
    pub fn new(locator: Arc<LogFileLocator>, traceback: TracebackConfig) -> Self {
        Self { locator, traceback }
    }

    /// The locator used to resolve file IDs
    pub fn locator(&self) -> &LogFileLocator {
        &self.locator
    }

    /// Members of a log file family, newest first
    pub fn list_files(&self, path_id: &str) -> Result<Vec<LogFileInfo>, LogError> {
        self.locator.list_files(path_id)
    }

    /// Last `max_lines` lines of a file
    pub fn get_tail(
        &self,
        file_id: &str,
        max_lines: usize,
        max_chars: usize,
    ) -> Result<TailResult, LogError> {
        if max_lines == 0 {
            return Err(LogError::InvalidFilter("max_lines must be positive".into()));
        }
        let path = self.locator.resolve(file_id)?;

        let mut ring: VecDeque<String> = VecDeque::with_capacity(max_lines.min(4096));
        let total_lines = for_each_line(file_id, &path, |_, line| {
            if ring.len() == max_lines {
                ring.pop_front();
            }
            ring.push_back(line.to_string());
            ControlFlow::Continue(())
        })?;

        let lines = Vec::from(ring);
        let (text, text_truncated) = truncate_text(lines.join("\n"), max_chars);
        Ok(TailResult {
            file_id: file_id.to_string(),
            first_line: total_lines - lines.len(),
            total_lines,
            lines,
            text,
            text_truncated,
        })
    }

    /// Filtered search using the current local time for `since_minutes`
    pub fn search(&self, file_id: &str, req: &SearchRequest) -> Result<SearchResult, LogError> {
        self.search_at(file_id, req, chrono::Local::now().naive_local())
    }

    /// Filtered search evaluated against an explicit `now`
    pub fn search_at(
        &self,
        file_id: &str,
        req: &SearchRequest,
        now: NaiveDateTime,
    ) -> Result<SearchResult, LogError> {
        req.validate()?;
        let path = self.locator.resolve(file_id)?;

        let first_line = match req.tail_lines {
            Some(n) => for_each_line(file_id, &path, |_, _| ControlFlow::Continue(()))?
                .saturating_sub(n),
            None => 0,
        };
        let matcher = Matcher::compile(req, now, first_line)?;

        let scan = self.match_pass(file_id, &path, req, &matcher)?;
        let windows = merge_windows(scan.windows.iter().copied());

        let mut blocks: Vec<SearchBlock> = windows
            .into_iter()
            .map(|(start_line, end_line)| SearchBlock {
                start_line,
                end_line,
                matched_line_numbers: scan
                    .matched
                    .iter()
                    .copied()
                    .filter(|m| (start_line..=end_line).contains(m))
                    .collect(),
                lines: Vec::new(),
            })
            .collect();

        if !blocks.is_empty() {
            extract_blocks(file_id, &path, &mut blocks)?;
        }

        let plain = render_plain(&blocks);
        let (text_markdown, markdown_truncated) = render_markdown(&plain, req.max_chars);
        let (text_plain, plain_truncated) = truncate_text(plain, req.max_chars);
        let text_truncated = plain_truncated || markdown_truncated;

        debug!(
            "Searched {} ({} lines): {} matches in {} blocks{}",
            file_id,
            scan.lines_scanned,
            scan.matched.len(),
            blocks.len(),
            if scan.truncated { ", truncated" } else { "" }
        );

        Ok(SearchResult {
            file_id: file_id.to_string(),
            blocks,
            text_plain,
            text_markdown,
            match_count: scan.matched.len(),
            truncated: scan.truncated,
            text_truncated,
            lines_scanned: scan.lines_scanned,
        })
    }

    fn match_pass(
        &self,
        file_id: &str,
        path: &Path,
        req: &SearchRequest,
        matcher: &Matcher,
    ) -> Result<MatchScan, LogError> {
        let mut matched: Vec<usize> = Vec::new();
        let mut windows: Vec<(usize, usize)> = Vec::new();
        let mut truncated = false;
        let mut tracker: Option<TraceTracker> = None;
        let mut current_ts: Option<NaiveDateTime> = None;

        let lines_scanned = for_each_line(file_id, path, |index, line| {
            let parsed = LogLineParser::parse(line);
            if parsed.timestamp.is_some() {
                current_ts = parsed.timestamp;
            }

            if let Some(trace) = tracker.as_mut() {
                let extends = match trace.phase {
                    // Only a continuation line can open the trace
                    TracePhase::Probe => {
                        !parsed.is_entry_start() && self.traceback.is_start(line)
                    }
                    TracePhase::Extend => {
                        !line.trim().is_empty()
                            && !parsed.is_entry_start()
                            && index - trace.start <= self.traceback.max_lines
                    }
                };
                if extends {
                    trace.phase = TracePhase::Extend;
                    let window = &mut windows[trace.window];
                    window.1 = window.1.max(index);
                } else {
                    tracker = None;
                }
            }

            if matcher.matches(index, line, &parsed, current_ts) {
                if matched.len() < req.max_matches {
                    matched.push(index);
                    windows.push((
                        index
                            .saturating_sub(req.context_lines)
                            .max(matcher.first_line),
                        index.saturating_add(req.context_lines),
                    ));
                    let in_trace = tracker
                        .as_ref()
                        .is_some_and(|t| t.phase == TracePhase::Extend);
                    if req.include_tracebacks && !in_trace {
                        let phase = if self.traceback.is_start(line) {
                            TracePhase::Extend
                        } else {
                            TracePhase::Probe
                        };
                        tracker = Some(TraceTracker {
                            window: windows.len() - 1,
                            start: index,
                            phase,
                        });
                    }
                } else {
                    truncated = true;
                }
            }

            if truncated && tracker.is_none() {
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            }
        })?;

        Ok(MatchScan {
            matched,
            windows,
            truncated,
            lines_scanned,
        })
    }
}

struct MatchScan {
    matched: Vec<usize>,
    windows: Vec<(usize, usize)>,
    truncated: bool,
    lines_scanned: usize,
}

/// Second pass: fill in block text
///
/// Windows may reach past the end of the file; their end is clipped to the
/// last line actually read. Blocks that found no lines (the file shrank
/// between passes) are dropped.
fn extract_blocks(file_id: &str, path: &Path, blocks: &mut Vec<SearchBlock>) -> Result<(), LogError> {
    let mut current = 0;
    for_each_line(file_id, path, |index, line| {
        while current < blocks.len() && index > blocks[current].end_line {
            current += 1;
        }
        let Some(block) = blocks.get_mut(current) else {
            return ControlFlow::Break(());
        };
        if index >= block.start_line {
            block.lines.push(line.to_string());
        }
        ControlFlow::Continue(())
    })?;

    blocks.retain(|b| !b.lines.is_empty());
    for block in blocks.iter_mut() {
        block.end_line = block.start_line + block.lines.len() - 1;
        let end = block.end_line;
        block.matched_line_numbers.retain(|m| *m <= end);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rf_protocol::parse_timestamp;
    use std::path::PathBuf;

    fn engine_with(content: &str) -> (tempfile::TempDir, LogSearchEngine) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("system.log");
        std::fs::write(&path, content).unwrap();
        let locator = LogFileLocator::new([("system".to_string(), path)]);
        (dir, LogSearchEngine::new(Arc::new(locator), TracebackConfig::default()))
    }

    fn request() -> SearchRequest {
        SearchRequest {
            context_lines: 0,
            ..Default::default()
        }
    }

    #[test]
    fn test_merge_windows() {
        assert_eq!(merge_windows([(5, 7), (6, 9), (20, 20)]), vec![(5, 9), (20, 20)]);
        assert_eq!(merge_windows([(20, 20), (6, 9), (5, 7)]), vec![(5, 9), (20, 20)]);
        // Touching windows merge
        assert_eq!(merge_windows([(0, 2), (3, 4)]), vec![(0, 4)]);
        assert_eq!(merge_windows([(0, 2), (4, 4)]), vec![(0, 2), (4, 4)]);
        assert!(merge_windows([]).is_empty());
    }

    #[test]
    fn test_validation() {
        let both = SearchRequest {
            since_minutes: Some(5),
            tail_lines: Some(10),
            ..Default::default()
        };
        let zero_matches = SearchRequest {
            max_matches: 0,
            ..Default::default()
        };
        let zero_since = SearchRequest {
            since_minutes: Some(0),
            ..Default::default()
        };
        let zero_tail = SearchRequest {
            tail_lines: Some(0),
            ..Default::default()
        };
        for req in [both, zero_matches, zero_since, zero_tail] {
            assert!(matches!(req.validate(), Err(LogError::InvalidFilter(_))));
        }
        assert!(SearchRequest::default().validate().is_ok());
    }

    #[test]
    fn test_validation_precedes_io() {
        let engine = LogSearchEngine::new(
            Arc::new(LogFileLocator::new([(
                "system".to_string(),
                PathBuf::from("/nonexistent/system.log"),
            )])),
            TracebackConfig::default(),
        );
        let req = SearchRequest {
            max_matches: 0,
            ..Default::default()
        };
        assert!(matches!(
            engine.search("system:current", &req),
            Err(LogError::InvalidFilter(_))
        ));
        assert!(matches!(
            engine.search("system:current", &SearchRequest::default()),
            Err(LogError::FileUnavailable { .. })
        ));
    }

    #[test]
    fn test_include_is_case_insensitive_by_default() {
        let (_dir, engine) = engine_with("alpha\nBETA\ngamma beta\n");
        let req = SearchRequest {
            include: Some("beta".into()),
            ..request()
        };
        let result = engine.search("system:current", &req).unwrap();
        assert_eq!(result.match_count, 2);

        let req = SearchRequest {
            include: Some("beta".into()),
            case_sensitive: true,
            ..request()
        };
        let result = engine.search("system:current", &req).unwrap();
        assert_eq!(result.match_count, 1);
        assert_eq!(result.blocks[0].start_line, 2);
    }

    #[test]
    fn test_exclude_level_and_logger() {
        let (_dir, engine) = engine_with(
            "2024-01-15 10:00:00 ERROR (MainThread) [ramses_rf.protocol] bad frame\n\
             2024-01-15 10:00:01 ERROR (MainThread) [homeassistant.core] bad frame\n\
             2024-01-15 10:00:02 WARNING (MainThread) [ramses_rf.protocol] bad frame\n\
             2024-01-15 10:00:03 ERROR (MainThread) [ramses_rf.transport] bad frame ignored\n",
        );
        let req = SearchRequest {
            level: Some(LogLevel::Error),
            logger: Some("RAMSES_RF".into()),
            exclude: Some("ignored".into()),
            ..request()
        };
        let result = engine.search("system:current", &req).unwrap();
        assert_eq!(result.match_count, 1);
        assert_eq!(result.blocks[0].matched_line_numbers, vec![0]);
    }

    #[test]
    fn test_since_minutes_inherits_timestamps() {
        let (_dir, engine) = engine_with(
            "orphan error before any timestamp\n\
             2024-01-15 09:00:00 ERROR old\n\
             continuation error of old\n\
             2024-01-15 09:55:00 ERROR recent\n\
             continuation error of recent\n",
        );
        let req = SearchRequest {
            include: Some("error".into()),
            since_minutes: Some(10),
            ..request()
        };
        let now = parse_timestamp("2024-01-15T10:00:00").unwrap();
        let result = engine.search_at("system:current", &req, now).unwrap();
        assert_eq!(result.blocks.len(), 1);
        assert_eq!(result.blocks[0].matched_line_numbers, vec![3, 4]);
    }

    #[test]
    fn test_tail_lines_restricts_search() {
        let (_dir, engine) = engine_with("hit\nhit\nhit\nmiss\nhit\n");
        let req = SearchRequest {
            include: Some("hit".into()),
            tail_lines: Some(2),
            ..request()
        };
        let result = engine.search("system:current", &req).unwrap();
        assert_eq!(result.match_count, 1);
        assert_eq!(result.blocks[0].start_line, 4);
    }

    #[test]
    fn test_tail_lines_clamps_context() {
        let (_dir, engine) = engine_with("a\nb\nc\nhit\nd\n");
        let req = SearchRequest {
            include: Some("hit".into()),
            tail_lines: Some(2),
            context_lines: 3,
            ..Default::default()
        };
        let result = engine.search("system:current", &req).unwrap();
        assert_eq!(result.blocks.len(), 1);
        assert_eq!(result.blocks[0].start_line, 3);
        assert_eq!(result.blocks[0].end_line, 4);
    }

    #[test]
    fn test_context_clipped_at_file_edges() {
        let (_dir, engine) = engine_with("hit\nb\nc\nd\nhit");
        let req = SearchRequest {
            include: Some("hit".into()),
            context_lines: 2,
            ..Default::default()
        };
        let result = engine.search("system:current", &req).unwrap();
        // (0,2) and (2,6) merge; end clipped to the last line
        assert_eq!(result.blocks.len(), 1);
        assert_eq!(result.blocks[0].start_line, 0);
        assert_eq!(result.blocks[0].end_line, 4);
        assert_eq!(result.blocks[0].matched_line_numbers, vec![0, 4]);
    }

    #[test]
    fn test_traceback_extends_window() {
        let (_dir, engine) = engine_with(
            "2024-01-15 10:00:00 ERROR (MainThread) [bridge] Unexpected failure\n\
             Traceback (most recent call last):\n\
             \x20 File \"bridge.py\", line 10, in run\n\
             \x20   self.send()\n\
             ValueError: bad frame\n\
             2024-01-15 10:00:01 INFO (MainThread) [bridge] recovered\n\
             2024-01-15 10:00:02 INFO (MainThread) [bridge] idle\n",
        );
        let mut req = SearchRequest {
            level: Some(LogLevel::Error),
            ..request()
        };

        let plain = engine.search("system:current", &req).unwrap();
        assert_eq!(plain.blocks[0].end_line, 0);

        req.include_tracebacks = true;
        let traced = engine.search("system:current", &req).unwrap();
        assert_eq!(traced.blocks.len(), 1);
        assert_eq!(traced.blocks[0].start_line, 0);
        assert_eq!(traced.blocks[0].end_line, 4);
        assert_eq!(traced.blocks[0].lines[4], "ValueError: bad frame");
    }

    #[test]
    fn test_traceback_stops_at_blank_line() {
        let (_dir, engine) = engine_with(
            "ERROR Exception in worker\n\
             \x20 at step one\n\
             \n\
             unrelated\n",
        );
        let req = SearchRequest {
            include: Some("Exception".into()),
            include_tracebacks: true,
            ..request()
        };
        let result = engine.search("system:current", &req).unwrap();
        assert_eq!(result.blocks[0].end_line, 1);
    }

    #[test]
    fn test_traceback_not_opened_by_next_entry() {
        let (_dir, engine) = engine_with(
            "2024-01-15 10:00:00 INFO (MainThread) [bridge] needle\n\
             2024-01-15 10:00:01 ERROR (MainThread) [core] Error doing job: Exception in callback foo\n\
             Traceback (most recent call last):\n\
             \x20 File \"core.py\", line 3, in foo\n\
             ValueError: nope\n",
        );
        let req = SearchRequest {
            include: Some("needle".into()),
            include_tracebacks: true,
            ..request()
        };
        let result = engine.search("system:current", &req).unwrap();
        assert_eq!(result.blocks.len(), 1);
        assert_eq!(result.blocks[0].end_line, 0);
    }

    #[test]
    fn test_traceback_stops_at_next_entry() {
        let (_dir, engine) = engine_with(
            "2024-01-15 10:00:00 ERROR (MainThread) [bridge] failure\n\
             Traceback (most recent call last):\n\
             ValueError: bad frame\n\
             2024-01-15 10:00:01 INFO (MainThread) [bridge] recovered\n\
             \x20 not part of the trace\n",
        );
        let req = SearchRequest {
            level: Some(LogLevel::Error),
            include_tracebacks: true,
            ..request()
        };
        let result = engine.search("system:current", &req).unwrap();
        assert_eq!(result.blocks[0].end_line, 2);
    }

    #[test]
    fn test_traceback_length_is_capped() {
        let mut content =
            String::from("2024-01-15 10:00:00 ERROR (MainThread) [bridge] failure\n");
        content.push_str("Traceback (most recent call last):\n");
        for i in 0..10 {
            content.push_str(&format!("  frame {i}\n"));
        }
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("system.log");
        std::fs::write(&path, content).unwrap();
        let engine = LogSearchEngine::new(
            Arc::new(LogFileLocator::new([("system".to_string(), path)])),
            TracebackConfig::default().with_max_lines(3),
        );

        let req = SearchRequest {
            level: Some(LogLevel::Error),
            include_tracebacks: true,
            ..request()
        };
        let result = engine.search("system:current", &req).unwrap();
        assert_eq!(result.blocks[0].end_line, 3);
    }

    #[test]
    fn test_match_inside_trace_keeps_extending() {
        let (_dir, engine) = engine_with(
            "2024-01-15 10:00:00 ERROR (MainThread) [bridge] frame failure\n\
             Traceback (most recent call last):\n\
             \x20 File \"frame.py\", line 3, in decode\n\
             \x20   decode()\n\
             ValueError: bad\n\
             2024-01-15 10:00:01 INFO (MainThread) [bridge] idle\n",
        );
        let req = SearchRequest {
            include: Some("frame".into()),
            include_tracebacks: true,
            ..request()
        };
        let result = engine.search("system:current", &req).unwrap();
        assert_eq!(result.blocks.len(), 1);
        assert_eq!(result.blocks[0].matched_line_numbers, vec![0, 2]);
        assert_eq!(result.blocks[0].end_line, 4);
    }

    #[test]
    fn test_custom_traceback_patterns() {
        let config = TracebackConfig::new(["^panicked at"]).unwrap();
        assert!(config.is_start("panicked at src/main.rs:10"));
        assert!(!config.is_start("Traceback (most recent call last):"));
        assert!(matches!(
            TracebackConfig::new(["(unclosed"]),
            Err(LogError::InvalidPattern { .. })
        ));
    }

    #[test]
    fn test_rendering() {
        let (_dir, engine) = engine_with("a\nhit one\nb\nc\nd\nhit two\n");
        let req = SearchRequest {
            include: Some("hit".into()),
            ..request()
        };
        let result = engine.search("system:current", &req).unwrap();
        assert_eq!(
            result.text_plain,
            "--- lines 2-2 ---\nhit one\n\n--- lines 6-6 ---\nhit two"
        );
        assert!(result.text_markdown.starts_with("```text\n--- lines 2-2 ---"));
        assert!(result.text_markdown.ends_with("hit two\n```"));
        assert!(!result.text_truncated);
    }

    #[test]
    fn test_truncate_text() {
        let (text, cut) = truncate_text("a".repeat(100), 40);
        assert!(cut);
        assert!(text.chars().count() <= 40);
        assert!(text.starts_with(&"a".repeat(16)));
        assert!(text.ends_with("… [truncated 84 chars]"));

        let (text, cut) = truncate_text("short".to_string(), 5);
        assert!(!cut);
        assert_eq!(text, "short");
    }

    #[test]
    fn test_truncate_counts_chars_not_bytes() {
        let (text, cut) = truncate_text("é".repeat(60), 30);
        assert!(cut);
        assert_eq!(text.chars().count(), 30);
        assert!(text.starts_with("ééééééé\n…"));
        assert!(text.ends_with("… [truncated 53 chars]"));
    }

    #[test]
    fn test_truncate_below_marker_size() {
        let (text, cut) = truncate_text("héllo wörld".to_string(), 5);
        assert!(cut);
        assert_eq!(text, "héllo");
        assert_eq!(truncate_text("abc".to_string(), 0), (String::new(), true));
    }

    #[test]
    fn test_outputs_respect_max_chars() {
        let (_dir, engine) = engine_with(&"hit with a long line of text\n".repeat(50));
        let req = SearchRequest {
            include: Some("hit".into()),
            max_chars: 100,
            ..request()
        };
        let result = engine.search("system:current", &req).unwrap();
        assert!(result.text_truncated);
        assert!(result.text_plain.chars().count() <= 100);
        assert!(result.text_markdown.chars().count() <= 100);
        assert!(result.text_plain.ends_with("chars]"));
        assert!(result.text_plain.starts_with("--- lines 1-50 ---"));
        assert!(result.text_markdown.starts_with("```text\n--- lines 1-50 ---"));
        assert!(result.text_markdown.ends_with("chars]\n```"));
    }

    #[test]
    fn test_markdown_budget_smaller_than_fence() {
        assert_eq!(render_markdown("anything", 5), (String::new(), true));
        assert_eq!(render_markdown("", 5), (String::new(), false));
        assert_eq!(render_markdown("ab", 14), ("```text\nab\n```".to_string(), false));
    }

    #[test]
    fn test_tail() {
        let (_dir, engine) = engine_with("1\n2\n3\n4\n5\n");
        let tail = engine.get_tail("system:current", 2, 1000).unwrap();
        assert_eq!(tail.lines, vec!["4", "5"]);
        assert_eq!(tail.first_line, 3);
        assert_eq!(tail.total_lines, 5);
        assert_eq!(tail.text, "4\n5");

        let all = engine.get_tail("system:current", 100, 1000).unwrap();
        assert_eq!(all.lines.len(), 5);
        assert_eq!(all.first_line, 0);

        assert!(matches!(
            engine.get_tail("system:current", 0, 1000),
            Err(LogError::InvalidFilter(_))
        ));
        assert!(matches!(
            engine.get_tail("nope:current", 10, 1000),
            Err(LogError::UnknownFile(_))
        ));
    }
}
