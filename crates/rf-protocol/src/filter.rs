//! Message filter shared by every query path

use chrono::NaiveDateTime;

use crate::message::{NormalizedMessage, Verb};

/// Conjunctive filter over normalized messages
///
/// Every `Some` field must match; an empty filter matches everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct MessageFilter {
    /// Exact sending device
    pub source_address: Option<String>,
    /// Exact receiving device
    pub dest_address: Option<String>,
    /// Device at either end
    pub device: Option<String>,
    /// Frame verb
    pub verb: Option<Verb>,
    /// Opcode (case-insensitive)
    pub code: Option<String>,
    /// Inclusive lower time bound
    pub since: Option<NaiveDateTime>,
    /// Inclusive upper time bound
    pub until: Option<NaiveDateTime>,
}

impl MessageFilter {
    /// Filter on the sending device
    pub fn with_source(mut self, address: impl Into<String>) -> Self {
        self.source_address = Some(address.into());
        self
    }

    /// Filter on the receiving device
    pub fn with_dest(mut self, address: impl Into<String>) -> Self {
        self.dest_address = Some(address.into());
        self
    }

    /// Filter on a device at either end
    pub fn with_device(mut self, address: impl Into<String>) -> Self {
        self.device = Some(address.into());
        self
    }

    /// Filter on the verb
    pub fn with_verb(mut self, verb: Verb) -> Self {
        self.verb = Some(verb);
        self
    }

    /// Filter on the opcode
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    /// Only messages at or after `since`
    pub fn with_since(mut self, since: NaiveDateTime) -> Self {
        self.since = Some(since);
        self
    }

    /// Only messages at or before `until`
    pub fn with_until(mut self, until: NaiveDateTime) -> Self {
        self.until = Some(until);
        self
    }

    /// True if no criterion is set
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Check the address part of the filter against a flow
    pub fn matches_flow(&self, source: &str, dest: &str) -> bool {
        self.source_address.as_deref().is_none_or(|s| s == source)
            && self.dest_address.as_deref().is_none_or(|d| d == dest)
            && self
                .device
                .as_deref()
                .is_none_or(|d| d == source || d == dest)
    }

    /// Check the opcode criterion
    pub fn matches_code(&self, code: &str) -> bool {
        self.code
            .as_deref()
            .is_none_or(|c| c.eq_ignore_ascii_case(code))
    }

    /// Check the time window
    pub fn matches_time(&self, timestamp: NaiveDateTime) -> bool {
        self.since.is_none_or(|since| timestamp >= since)
            && self.until.is_none_or(|until| timestamp <= until)
    }

    /// Check every criterion against a message
    pub fn matches(&self, msg: &NormalizedMessage) -> bool {
        self.matches_flow(&msg.source_address, &msg.dest_address)
            && self.verb.is_none_or(|v| v == msg.verb)
            && self.matches_code(&msg.code)
            && self.matches_time(msg.timestamp)
    }
}
