//! System log provider
//!
//! The bridge integration logs frames it handles at debug level, embedded in
//! ordinary log lines:
//!
//! ```text
//! 2024-01-15 10:23:45.125 DEBUG (MainThread) [ramses_rf.protocol] 2024-01-15T10:23:45.123456 ... RQ --- 18:123456 01:145038 --:------ 30C9 001 00
//! ```
//!
//! The timestamp directly in front of the frame is the bridge's own receive
//! time and wins over the time the log line was written.

use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use rf_protocol::{parse_timestamp, Frame, MessageFilter, NormalizedMessage, Origin, ParseError};

use crate::error::LogError;
use crate::line_parser::LogLineParser;
use crate::locator::LogFileLocator;
use crate::provider::{collect_messages, ProviderResult};

static EMBEDDED_FRAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(concat!(
        r"(?:(?P<ts>\d{4}-\d{2}-\d{2}[T ]\d{2}:\d{2}:\d{2}(?:[.,]\d+)?)\s+)?",
        r"(?P<frame>(?:(?:\d{3}|\.{3})\s+)?(?:RQ|RP|I|W)\s+(?:---|\d{3})",
        r"(?:\s+(?:--:------|\d{2}:\d{6})){3}\s+[0-9A-Fa-f]{4}\s+\d{3}",
        r"(?:\s+[0-9A-Fa-f]+)?)\b",
    ))
    .unwrap_or_else(|_| unreachable!())
});

/// Reads frames embedded in the system log
#[derive(Debug, Clone)]
pub struct SystemLogProvider {
    locator: Arc<LogFileLocator>,
    path_id: String,
    logger_prefix: Option<String>,
}

impl SystemLogProvider {
    pub fn new(locator: Arc<LogFileLocator>, path_id: impl Into<String>) -> Self {
        Self {
            locator,
            path_id: path_id.into(),
            logger_prefix: None,
        }
    }

    /// Only consider lines whose logger starts with `prefix`
    pub fn with_logger_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.logger_prefix = Some(prefix.into());
        self
    }

    pub fn path_id(&self) -> &str {
        &self.path_id
    }

    /// Parse one system log line
    ///
    /// Returns `Ok(None)` for lines without an embedded frame or from a
    /// logger outside the configured prefix.
    pub fn parse_line(&self, line: &str) -> Result<Option<NormalizedMessage>, ParseError> {
        let parsed = LogLineParser::parse(line);
        if let Some(prefix) = &self.logger_prefix {
            if !parsed.logger.is_some_and(|l| l.starts_with(prefix.as_str())) {
                return Ok(None);
            }
        }

        let Some(caps) = EMBEDDED_FRAME.captures(line) else {
            return Ok(None);
        };
        let embedded = caps.name("ts").and_then(|m| parse_timestamp(m.as_str()));
        let timestamp = embedded
            .or(parsed.timestamp)
            .ok_or(ParseError::MissingField("timestamp"))?;
        let frame_text = caps.name("frame").map_or("", |m| m.as_str());

        let mut msg = Frame::parse(frame_text)?.into_message(timestamp, Origin::SystemLog);
        msg.raw_line = Some(line.to_string());
        Ok(Some(msg))
    }

    /// Most recent `limit` messages matching `filter`, oldest first
    pub fn fetch(
        &self,
        filter: &MessageFilter,
        limit: usize,
        include_rotated: bool,
    ) -> Result<ProviderResult, LogError> {
        collect_messages(
            &self.locator,
            &self.path_id,
            include_rotated,
            filter,
            limit,
            |line| self.parse_line(line),
        )
    }
}
