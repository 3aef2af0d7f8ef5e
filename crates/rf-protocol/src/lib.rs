//! RF Protocol Library
//!
//! This crate provides the record model shared by every part of the RF bridge
//! diagnostics stack:
//!
//! - **Frames**: parsing of the whitespace-separated frame text the bridge
//!   logs (`RQ --- 18:123456 01:145038 --:------ 30C9 001 00`)
//! - **Normalized messages**: the single record shape produced by live
//!   events, the packet log and the system log
//! - **Filters**: the conjunctive filter vocabulary used by every query
//!
//! # Example
//!
//! ```rust
//! use rf_protocol::{Frame, Origin, Verb};
//!
//! let (ts, frame) = Frame::parse_timestamped(
//!     "2024-01-15T10:23:45.123456 063 RQ --- 18:123456 01:145038 --:------ 30C9 001 00",
//! )
//! .unwrap();
//!
//! let msg = frame.into_message(ts, Origin::PacketLog);
//! assert_eq!(msg.verb, Verb::Request);
//! assert_eq!(msg.dest_address, "01:145038");
//! ```

pub mod error;
pub mod filter;
pub mod frame;
pub mod message;
pub mod timestamp;

pub use error::ParseError;
pub use filter::MessageFilter;
pub use frame::{is_device_address, Frame};
pub use message::{FlowKey, NormalizedMessage, Origin, Verb, BROADCAST_ADDRESS};
pub use timestamp::{parse_timestamp, split_leading_timestamp};
