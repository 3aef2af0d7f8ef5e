//! Log exploration for the RF bridge
//!
//! This crate covers everything that reads log files from disk:
//!
//! - [`LogFileLocator`] maps configured path ids to the current file and its
//!   rotated siblings
//! - [`LogSearchEngine`] tails and searches a file, merging ±N line context
//!   windows and optionally extending them over stack traces
//! - [`PacketLogProvider`] and [`SystemLogProvider`] parse frames out of the
//!   packet log and the system log into [`rf_protocol::NormalizedMessage`]s
//!
//! All I/O is blocking and streaming; callers on an async runtime should run
//! these calls on a blocking thread.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use rf_logs::{LogFileLocator, LogSearchEngine, SearchRequest, TracebackConfig};
//!
//! let locator = LogFileLocator::new([(
//!     "system".to_string(),
//!     "/config/home-assistant.log".into(),
//! )]);
//! let engine = LogSearchEngine::new(Arc::new(locator), TracebackConfig::default());
//!
//! let request = SearchRequest {
//!     include: Some("ramses".into()),
//!     include_tracebacks: true,
//!     ..Default::default()
//! };
//! let result = engine.search("system:current", &request)?;
//! println!("{}", result.text_plain);
//! # Ok::<(), rf_logs::LogError>(())
//! ```

pub mod error;
pub mod line_parser;
pub mod locator;
pub mod packet_log;
pub mod provider;
mod reader;
pub mod search;
pub mod system_log;

pub use error::LogError;
pub use line_parser::{LogLevel, LogLineParser, ParsedLine};
pub use locator::{current_id, LogFileInfo, LogFileLocator};
pub use packet_log::{parse_packet_line, PacketLogProvider};
pub use provider::{ProviderResult, MAX_PARSE_WARNINGS};
pub use search::{
    merge_windows, render_markdown, render_plain, truncate_text, LogSearchEngine, SearchBlock,
    SearchRequest, SearchResult, TailResult, TracebackConfig, DEFAULT_CONTEXT_LINES,
    DEFAULT_MAX_CHARS, DEFAULT_MAX_MATCHES, DEFAULT_TAIL_LINES, DEFAULT_TRACEBACK_PATTERNS,
};
pub use system_log::SystemLogProvider;
