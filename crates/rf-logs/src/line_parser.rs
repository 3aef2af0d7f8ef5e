//! System log line parsing
//!
//! Extracts the three fields the search filters care about from one line of
//! text. A typical line looks like:
//!
//! ```text
//! 2024-01-15 10:23:45.123 ERROR (MainThread) [ramses_rf.dispatcher] Invalid packet
//! ```
//!
//! Every field is optional. Continuation lines (traceback frames, wrapped
//! messages) usually yield an empty [`ParsedLine`].

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDateTime;
use rf_protocol::split_leading_timestamp;
use serde::{Deserialize, Serialize};

/// Log severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Debug,
    Info,
    #[serde(alias = "WARN")]
    Warning,
    Error,
    #[serde(alias = "FATAL")]
    Critical,
}

impl LogLevel {
    /// Canonical upper-case name
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warning => "WARNING",
            LogLevel::Error => "ERROR",
            LogLevel::Critical => "CRITICAL",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "DEBUG" => Ok(LogLevel::Debug),
            "INFO" => Ok(LogLevel::Info),
            "WARNING" | "WARN" => Ok(LogLevel::Warning),
            "ERROR" => Ok(LogLevel::Error),
            "CRITICAL" | "FATAL" => Ok(LogLevel::Critical),
            _ => Err(format!("unknown log level: {s}")),
        }
    }
}

/// Fields extracted from one line
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ParsedLine<'a> {
    /// Leading timestamp
    pub timestamp: Option<NaiveDateTime>,
    /// Severity, from the first token or a bracketed field
    pub level: Option<LogLevel>,
    /// First bracketed token that is not a level
    pub logger: Option<&'a str>,
}

impl ParsedLine<'_> {
    /// True if the line opens a new log entry
    pub fn is_entry_start(&self) -> bool {
        self.timestamp.is_some()
    }
}

/// Stateless line parser
#[derive(Debug, Clone, Copy, Default)]
pub struct LogLineParser;

impl LogLineParser {
    /// Parse one line
    pub fn parse(line: &str) -> ParsedLine<'_> {
        let (timestamp, rest) = match split_leading_timestamp(line) {
            Some((ts, rest)) => (Some(ts), rest),
            None => (None, line),
        };

        let mut level = rest
            .split_whitespace()
            .next()
            .map(|token| token.trim_matches(|c| c == '[' || c == ']'))
            .and_then(|token| token.parse::<LogLevel>().ok());
        let mut logger = None;

        for token in bracketed(rest) {
            match token.parse::<LogLevel>() {
                Ok(found) => {
                    level.get_or_insert(found);
                }
                Err(_) if logger.is_none() && !token.is_empty() => logger = Some(token),
                Err(_) => {}
            }
            if level.is_some() && logger.is_some() {
                break;
            }
        }

        ParsedLine {
            timestamp,
            level,
            logger,
        }
    }
}

/// Contents of each `[...]` group, left to right
fn bracketed(text: &str) -> impl Iterator<Item = &str> {
    let mut rest = text;
    std::iter::from_fn(move || {
        let open = rest.find('[')?;
        let after = &rest[open + 1..];
        let close = after.find(']')?;
        let token = after[..close].trim();
        rest = &after[close + 1..];
        Some(token)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_home_assistant_style_line() {
        let parsed = LogLineParser::parse(
            "2024-01-15 10:23:45.123 ERROR (MainThread) [ramses_rf.dispatcher] Invalid packet",
        );
        assert_eq!(
            parsed.timestamp.map(|t| t.to_string()).as_deref(),
            Some("2024-01-15 10:23:45.123")
        );
        assert_eq!(parsed.level, Some(LogLevel::Error));
        assert_eq!(parsed.logger, Some("ramses_rf.dispatcher"));
    }

    #[test]
    fn test_bracketed_level() {
        let parsed = LogLineParser::parse("2024-01-15T10:23:45 [WARN] [bridge.port] Port reopened");
        assert_eq!(parsed.level, Some(LogLevel::Warning));
        assert_eq!(parsed.logger, Some("bridge.port"));
    }

    #[test]
    fn test_continuation_line() {
        let parsed = LogLineParser::parse("  File \"/app/protocol.py\", line 12, in send");
        assert_eq!(parsed, ParsedLine::default());
        assert!(!parsed.is_entry_start());
    }

    #[test]
    fn test_level_without_timestamp() {
        let parsed = LogLineParser::parse("INFO starting bridge");
        assert!(parsed.timestamp.is_none());
        assert_eq!(parsed.level, Some(LogLevel::Info));
        assert!(parsed.logger.is_none());
    }

    #[test]
    fn test_level_aliases() {
        assert_eq!("fatal".parse::<LogLevel>(), Ok(LogLevel::Critical));
        assert_eq!("Warning".parse::<LogLevel>(), Ok(LogLevel::Warning));
        assert!("TRACE".parse::<LogLevel>().is_err());
    }

    #[test]
    fn test_unclosed_bracket_is_ignored() {
        let parsed = LogLineParser::parse("2024-01-15 10:00:00 DEBUG [unterminated");
        assert_eq!(parsed.level, Some(LogLevel::Debug));
        assert!(parsed.logger.is_none());
    }
}
