//! Packet log provider
//!
//! The bridge's packet logger writes one frame per line:
//!
//! ```text
//! 2024-01-15T10:23:45.123456 063 RQ --- 18:123456 01:145038 --:------ 30C9 001 00
//! 2024-01-15T10:23:45.140211 064 RP --- 01:145038 18:123456 --:------ 30C9 003 0007D0 # zone 1
//! ```
//!
//! Trailing `#` comments are ignored, as are blank and comment-only lines.

use std::sync::Arc;

use rf_protocol::{Frame, MessageFilter, NormalizedMessage, Origin, ParseError};

use crate::error::LogError;
use crate::locator::LogFileLocator;
use crate::provider::{collect_messages, ProviderResult};

/// Parse one packet log line
///
/// Returns `Ok(None)` for blank and comment lines.
pub fn parse_packet_line(line: &str) -> Result<Option<NormalizedMessage>, ParseError> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }
    let text = line.split_once('#').map_or(line, |(frame, _)| frame);
    let (timestamp, frame) = Frame::parse_timestamped(text)?;
    Ok(Some(frame.into_message(timestamp, Origin::PacketLog)))
}

/// Reads messages from the packet log family
#[derive(Debug, Clone)]
pub struct PacketLogProvider {
    locator: Arc<LogFileLocator>,
    path_id: String,
}

impl PacketLogProvider {
    /// Provider over the family registered as `path_id`
    pub fn new(locator: Arc<LogFileLocator>, path_id: impl Into<String>) -> Self {
        Self {
            locator,
            path_id: path_id.into(),
        }
    }

    /// Family this provider reads
    pub fn path_id(&self) -> &str {
        &self.path_id
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
            parse_packet_line,
        )
    }
}
