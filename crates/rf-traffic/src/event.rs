//! Live bridge events
//!
//! The bridge publishes one event per received or transmitted frame. Its
//! payload is loosely typed JSON, so parsing happens here, once, on the way
//! into the aggregator.
//!
//! Two payload shapes are accepted:
//!
//! ```json
//! {"dtm": "2024-01-15T10:23:45.123456",
//!  "packet": "063 RQ --- 18:123456 01:145038 --:------ 30C9 001 00"}
//!
//! {"dtm": "2024-01-15T10:23:45.123456", "src": "18:123456", "dst": "01:145038",
//!  "verb": "RQ", "code": "30C9", "payload": "00"}
//! ```

use chrono::NaiveDateTime;
use rf_protocol::{
    is_device_address, parse_timestamp, split_leading_timestamp, Frame, NormalizedMessage,
    Origin, ParseError, Verb, BROADCAST_ADDRESS,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Event name the bridge uses for frame events
pub const DEFAULT_EVENT_NAME: &str = "rf_bridge_message";

/// A single event from the host's event feed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BridgeEvent {
    /// Event name used for subscription routing
    pub event_type: String,
    /// Raw event payload
    pub data: Value,
    /// When the event was received, used if the payload carries no timestamp
    pub received_at: NaiveDateTime,
}

impl BridgeEvent {
    /// Create an event stamped with the current local time
    pub fn new(event_type: impl Into<String>, data: Value) -> Self {
        Self::at(event_type, data, chrono::Local::now().naive_local())
    }

    /// Create an event with an explicit receive time
    pub fn at(event_type: impl Into<String>, data: Value, received_at: NaiveDateTime) -> Self {
        Self {
            event_type: event_type.into(),
            data,
            received_at,
        }
    }

    /// Parse the payload into a live-origin message
    pub fn to_message(&self) -> Result<NormalizedMessage, ParseError> {
        let data = self
            .data
            .as_object()
            .ok_or_else(|| ParseError::InvalidFrame("event data is not an object".into()))?;

        let dtm = match data.get("dtm").and_then(Value::as_str) {
            Some(text) => Some(
                parse_timestamp(text).ok_or_else(|| ParseError::InvalidTimestamp(text.into()))?,
            ),
            None => None,
        };

        if let Some(packet) = data.get("packet").and_then(Value::as_str) {
            let (embedded, frame_text) = match split_leading_timestamp(packet) {
                Some((ts, rest)) => (Some(ts), rest),
                None => (None, packet),
            };
            let frame = Frame::parse(frame_text)?;
            let timestamp = dtm.or(embedded).unwrap_or(self.received_at);
            return Ok(frame.into_message(timestamp, Origin::Live));
        }

        self.message_from_fields(data, dtm.unwrap_or(self.received_at))
    }

    fn message_from_fields(
        &self,
        data: &serde_json::Map<String, Value>,
        timestamp: NaiveDateTime,
    ) -> Result<NormalizedMessage, ParseError> {
        let field = |name: &'static str| data.get(name).and_then(Value::as_str);

        let src = field("src").ok_or(ParseError::MissingField("src"))?;
        if !is_device_address(src) || src == BROADCAST_ADDRESS {
            return Err(ParseError::InvalidAddress(src.to_string()));
        }
        let dst = field("dst").unwrap_or(BROADCAST_ADDRESS);
        if !is_device_address(dst) {
            return Err(ParseError::InvalidAddress(dst.to_string()));
        }

        let verb = field("verb")
            .ok_or(ParseError::MissingField("verb"))?
            .parse::<Verb>()?;

        let code = field("code").ok_or(ParseError::MissingField("code"))?;
        if code.len() != 4 || !code.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(ParseError::InvalidCode(code.to_string()));
        }

        let payload = field("payload").unwrap_or_default();

        Ok(NormalizedMessage {
            timestamp,
            source_address: src.to_string(),
            dest_address: dst.to_string(),
            verb,
            code: code.to_ascii_uppercase(),
            payload_raw: payload.to_ascii_uppercase(),
            packet_raw: String::new(),
            origin: Origin::Live,
            raw_line: None,
            parse_warnings: Vec::new(),
        })
    }
}
