//! RF frame text format
//!
//! Frames are logged by the bridge as whitespace-separated fields:
//!
//! ```text
//! [RSSI] VERB SEQN ADDR0     ADDR1     ADDR2     CODE LEN PAYLOAD
//!  063   RQ   ---  18:123456 01:145038 --:------ 30C9 001 00
//! ```
//!
//! - `RSSI` is optional (`NNN` or `...`) and discarded
//! - `VERB` is ` I`, `RQ`, `RP` or ` W`
//! - `SEQN` is `---` or a three digit sequence number
//! - `ADDRn` is `NN:NNNNNN` or the `--:------` sentinel
//! - `CODE` is four hex digits, `LEN` three decimal digits
//! - `PAYLOAD` is hex, `LEN` bytes long

use chrono::NaiveDateTime;

use crate::error::ParseError;
use crate::message::{NormalizedMessage, Origin, Verb, BROADCAST_ADDRESS};
use crate::timestamp::split_leading_timestamp;

/// Number of fields after the optional RSSI (payload included)
const FRAME_FIELDS: usize = 8;

/// A parsed frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Frame verb
    pub verb: Verb,
    /// Sequence number, if present
    pub seqn: Option<u16>,
    /// The three address slots, verbatim
    pub addrs: [String; 3],
    /// Opcode, upper-cased
    pub code: String,
    /// Length field as declared on the wire
    pub declared_len: usize,
    /// Payload hex, upper-cased
    pub payload: String,
}

impl Frame {
    /// Parse frame text, with or without a leading RSSI field
    pub fn parse(text: &str) -> Result<Self, ParseError> {
        let mut tokens: Vec<&str> = text.split_whitespace().collect();
        if tokens.is_empty() {
            return Err(ParseError::Empty);
        }

        if tokens[0].parse::<Verb>().is_err() && is_rssi(tokens[0]) {
            tokens.remove(0);
        }

        // A zero-length payload may be omitted entirely
        if tokens.len() == FRAME_FIELDS - 1 {
            tokens.push("");
        }
        if tokens.len() != FRAME_FIELDS {
            return Err(ParseError::InvalidFrame(format!(
                "expected {} fields, found {}",
                FRAME_FIELDS,
                tokens.len()
            )));
        }

        let verb = tokens[0].parse::<Verb>()?;
        let seqn = parse_seqn(tokens[1])?;

        let mut addrs: [String; 3] = Default::default();
        for (slot, token) in addrs.iter_mut().zip(&tokens[2..5]) {
            if !is_device_address(token) {
                return Err(ParseError::InvalidAddress((*token).to_string()));
            }
            *slot = (*token).to_string();
        }

        let code = tokens[5];
        if code.len() != 4 || !code.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(ParseError::InvalidCode(code.to_string()));
        }

        let len = tokens[6];
        if len.len() != 3 || !len.bytes().all(|b| b.is_ascii_digit()) {
            return Err(ParseError::InvalidLength(len.to_string()));
        }
        let declared_len = len
            .parse::<usize>()
            .map_err(|_| ParseError::InvalidLength(len.to_string()))?;

        let payload = tokens[7];
        if payload.len() % 2 != 0 || !payload.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(ParseError::InvalidPayload(payload.to_string()));
        }

        if addrs.iter().all(|a| a == BROADCAST_ADDRESS) {
            return Err(ParseError::InvalidFrame("no device address".into()));
        }

        Ok(Self {
            verb,
            seqn,
            addrs,
            code: code.to_ascii_uppercase(),
            declared_len,
            payload: payload.to_ascii_uppercase(),
        })
    }

    /// Parse a `TIMESTAMP FRAME` line as written by the packet logger
    pub fn parse_timestamped(line: &str) -> Result<(NaiveDateTime, Self), ParseError> {
        let line = line.trim();
        if line.is_empty() {
            return Err(ParseError::Empty);
        }
        let (timestamp, rest) = split_leading_timestamp(line).ok_or_else(|| {
            let head = line.split_whitespace().next().unwrap_or_default();
            ParseError::InvalidTimestamp(head.to_string())
        })?;
        Ok((timestamp, Self::parse(rest)?))
    }

    /// Sending device
    pub fn source(&self) -> &str {
        if self.addrs[0] == BROADCAST_ADDRESS {
            &self.addrs[2]
        } else {
            &self.addrs[0]
        }
    }

    /// Receiving device, or the broadcast sentinel
    pub fn destination(&self) -> &str {
        if self.addrs[1] != BROADCAST_ADDRESS {
            return &self.addrs[1];
        }
        if self.addrs[2] != BROADCAST_ADDRESS && self.addrs[2] != self.source() {
            return &self.addrs[2];
        }
        BROADCAST_ADDRESS
    }

    /// Canonical single-spaced frame text without RSSI
    ///
    /// Equal frames render identically regardless of which source logged
    /// them, which makes this usable as a de-duplication signal.
    pub fn canonical(&self) -> String {
        let seqn = self
            .seqn
            .map(|n| format!("{n:03}"))
            .unwrap_or_else(|| "---".to_string());
        let mut text = format!(
            "{} {} {} {} {} {} {:03}",
            self.verb.as_str(),
            seqn,
            self.addrs[0],
            self.addrs[1],
            self.addrs[2],
            self.code,
            self.declared_len
        );
        if !self.payload.is_empty() {
            text.push(' ');
            text.push_str(&self.payload);
        }
        text
    }

    /// Non-fatal inconsistencies worth surfacing on the record
    pub fn warnings(&self) -> Vec<String> {
        let actual = self.payload.len() / 2;
        if actual == self.declared_len {
            Vec::new()
        } else {
            vec![format!(
                "declared length {} does not match payload length {}",
                self.declared_len, actual
            )]
        }
    }

    /// Convert into a normalized message
    pub fn into_message(self, timestamp: NaiveDateTime, origin: Origin) -> NormalizedMessage {
        NormalizedMessage {
            timestamp,
            source_address: self.source().to_string(),
            dest_address: self.destination().to_string(),
            verb: self.verb,
            code: self.code.clone(),
            payload_raw: self.payload.clone(),
            packet_raw: self.canonical(),
            origin,
            raw_line: None,
            parse_warnings: self.warnings(),
        }
    }
}

/// True for `NN:NNNNNN` device ids and the `--:------` sentinel
pub fn is_device_address(token: &str) -> bool {
    if token == BROADCAST_ADDRESS {
        return true;
    }
    let bytes = token.as_bytes();
    bytes.len() == 9
        && bytes[2] == b':'
        && bytes
            .iter()
            .enumerate()
            .all(|(i, b)| i == 2 || b.is_ascii_digit())
}

fn is_rssi(token: &str) -> bool {
    token == "..." || (token.len() == 3 && token.bytes().all(|b| b.is_ascii_digit()))
}

fn parse_seqn(token: &str) -> Result<Option<u16>, ParseError> {
    if token == "---" {
        return Ok(None);
    }
    if token.len() == 3 {
        if let Ok(n) = token.parse::<u16>() {
            return Ok(Some(n));
        }
    }
    Err(ParseError::InvalidSequence(token.to_string()))
}
