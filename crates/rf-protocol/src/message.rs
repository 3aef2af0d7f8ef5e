//! Normalized message model
//!
//! Every traffic source (live events, the packet log, the system log) is
//! reduced to a [`NormalizedMessage`]. Records are immutable once produced;
//! buffers share them behind `Arc`.

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDateTime;

use crate::error::ParseError;

/// Destination used for frames that are not addressed to a single device
pub const BROADCAST_ADDRESS: &str = "--:------";

/// Protocol verb carried by every frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Verb {
    /// Unsolicited information (` I`)
    #[cfg_attr(feature = "serde", serde(rename = "I"))]
    Info,
    /// Request (`RQ`)
    #[cfg_attr(feature = "serde", serde(rename = "RQ"))]
    Request,
    /// Response to a request (`RP`)
    #[cfg_attr(feature = "serde", serde(rename = "RP"))]
    Response,
    /// Write (` W`)
    #[cfg_attr(feature = "serde", serde(rename = "W"))]
    Write,
}

impl Verb {
    /// All verbs, in wire order
    pub const ALL: [Verb; 4] = [Verb::Info, Verb::Request, Verb::Response, Verb::Write];

    /// Short tag without padding
    pub fn as_str(&self) -> &'static str {
        match self {
            Verb::Info => "I",
            Verb::Request => "RQ",
            Verb::Response => "RP",
            Verb::Write => "W",
        }
    }

    /// Two-character tag as it appears in frames
    pub fn padded(&self) -> &'static str {
        match self {
            Verb::Info => " I",
            Verb::Request => "RQ",
            Verb::Response => "RP",
            Verb::Write => " W",
        }
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Verb {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "I" => Ok(Verb::Info),
            "RQ" => Ok(Verb::Request),
            "RP" => Ok(Verb::Response),
            "W" => Ok(Verb::Write),
            other => Err(ParseError::InvalidVerb(other.to_string())),
        }
    }
}

/// Provenance of a normalized message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum Origin {
    /// Live event stream from the bridge
    Live,
    /// On-disk packet log
    PacketLog,
    /// Rotated application/system log
    SystemLog,
}

impl Origin {
    /// All origins
    pub const ALL: [Origin; 3] = [Origin::Live, Origin::PacketLog, Origin::SystemLog];

    /// Wire name of the origin
    pub fn as_str(&self) -> &'static str {
        match self {
            Origin::Live => "live",
            Origin::PacketLog => "packet_log",
            Origin::SystemLog => "system_log",
        }
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Origin {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Origin::ALL
            .into_iter()
            .find(|origin| origin.as_str() == s)
            .ok_or_else(|| ParseError::InvalidFrame(format!("unknown origin: {s}")))
    }
}

/// Ordered pair of device addresses observed communicating
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FlowKey {
    /// Sending device
    pub source_address: String,
    /// Receiving device (or the broadcast sentinel)
    pub dest_address: String,
}

impl FlowKey {
    /// Create a flow key
    pub fn new(source_address: impl Into<String>, dest_address: impl Into<String>) -> Self {
        Self {
            source_address: source_address.into(),
            dest_address: dest_address.into(),
        }
    }
}

impl fmt::Display for FlowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.source_address, self.dest_address)
    }
}

/// The single record shape every source produces
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct NormalizedMessage {
    /// When the frame was seen, in the source's own clock
    pub timestamp: NaiveDateTime,
    /// Sending device
    pub source_address: String,
    /// Receiving device, or [`BROADCAST_ADDRESS`]
    pub dest_address: String,
    /// Frame verb
    pub verb: Verb,
    /// Four hex digit opcode
    pub code: String,
    /// Payload hex, not interpreted here
    pub payload_raw: String,
    /// Canonical frame text, empty when the source only gave fields
    pub packet_raw: String,
    /// Which source produced the record
    pub origin: Origin,
    /// Original log line (system log records only)
    #[cfg_attr(
        feature = "serde",
        serde(default, skip_serializing_if = "Option::is_none")
    )]
    pub raw_line: Option<String>,
    /// Non-fatal issues found while parsing
    #[cfg_attr(feature = "serde", serde(default))]
    pub parse_warnings: Vec<String>,
}

impl NormalizedMessage {
    /// Flow this message belongs to
    pub fn flow_key(&self) -> FlowKey {
        FlowKey::new(self.source_address.clone(), self.dest_address.clone())
    }

    /// True if the device is either end of the message
    pub fn involves(&self, device: &str) -> bool {
        self.source_address == device || self.dest_address == device
    }

    /// True if the destination is the broadcast sentinel
    pub fn is_broadcast(&self) -> bool {
        self.dest_address == BROADCAST_ADDRESS
    }
}
