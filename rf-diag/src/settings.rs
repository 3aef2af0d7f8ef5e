//! Service settings

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use rf_logs::{
    DEFAULT_CONTEXT_LINES, DEFAULT_MAX_CHARS, DEFAULT_MAX_MATCHES, DEFAULT_TAIL_LINES,
    DEFAULT_TRACEBACK_PATTERNS,
};
use rf_traffic::{TrafficConfig, DEFAULT_EVENT_NAME};
use serde::{Deserialize, Serialize};

/// Overrides the settings directory
pub const CONFIG_DIR_ENV: &str = "RFDIAG_CONFIG_DIR";

/// Defaults applied to log requests that omit a parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchDefaults {
    pub context_lines: usize,
    pub max_matches: usize,
    pub max_chars: usize,
    /// Lines returned by `log/get_tail`
    pub tail_lines: usize,
}

impl Default for SearchDefaults {
    fn default() -> Self {
        Self {
            context_lines: DEFAULT_CONTEXT_LINES,
            max_matches: DEFAULT_MAX_MATCHES,
            max_chars: DEFAULT_MAX_CHARS,
            tail_lines: DEFAULT_TAIL_LINES,
        }
    }
}

/// Application settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Address the RPC server binds to
    pub listen: String,
    /// Event name carrying live frames
    pub event_name: String,
    /// Log file families by path id
    pub log_paths: BTreeMap<String, PathBuf>,
    /// Path id of the system log
    pub system_log_path_id: String,
    /// Path id of the packet log
    pub packet_log_path_id: String,
    /// Read rotated files in message queries
    pub include_rotated: bool,
    /// Aggregator sizing
    pub traffic: TrafficConfig,
    /// Log request defaults
    pub search: SearchDefaults,
    /// Regexes that open a stack trace
    pub traceback_patterns: Vec<String>,
    /// Only read frames from system log lines whose logger has this prefix
    pub system_log_logger_prefix: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            listen: "127.0.0.1:8765".to_string(),
            event_name: DEFAULT_EVENT_NAME.to_string(),
            log_paths: BTreeMap::from([
                (
                    "system".to_string(),
                    PathBuf::from("/config/home-assistant.log"),
                ),
                ("packet".to_string(), PathBuf::from("/config/packet.log")),
            ]),
            system_log_path_id: "system".to_string(),
            packet_log_path_id: "packet".to_string(),
            include_rotated: false,
            traffic: TrafficConfig::default(),
            search: SearchDefaults::default(),
            traceback_patterns: DEFAULT_TRACEBACK_PATTERNS
                .iter()
                .map(|p| p.to_string())
                .collect(),
            system_log_logger_prefix: None,
        }
    }
}

impl Settings {
    /// Directory holding `settings.json`
    ///
    /// `$RFDIAG_CONFIG_DIR` wins, then `$XDG_CONFIG_HOME/rfdiag`, then
    /// `~/.config/rfdiag`.
    pub fn config_dir() -> Option<PathBuf> {
        resolve_config_dir(
            std::env::var_os(CONFIG_DIR_ENV).map(PathBuf::from),
            std::env::var_os("XDG_CONFIG_HOME").map(PathBuf::from),
            dirs::home_dir(),
        )
    }

    /// Default settings file location
    pub fn default_path() -> Option<PathBuf> {
        Self::config_dir().map(|p| p.join("settings.json"))
    }

    /// Load settings
    ///
    /// An explicit path must exist. Without one, the default location is
    /// tried and a missing file yields the defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        match explicit {
            Some(path) => Self::from_file(path),
            None => match Self::default_path() {
                Some(path) if path.exists() => Self::from_file(&path),
                _ => Ok(Self::default()),
            },
        }
    }

    fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings from {}", path.display()))?;
        serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse settings in {}", path.display()))
    }
}

fn resolve_config_dir(
    override_dir: Option<PathBuf>,
    xdg_config: Option<PathBuf>,
    home: Option<PathBuf>,
) -> Option<PathBuf> {
    // Relative values are ignored
    if let Some(dir) = override_dir.filter(|d| d.is_absolute()) {
        return Some(dir);
    }
    if let Some(xdg) = xdg_config.filter(|d| d.is_absolute()) {
        return Some(xdg.join("rfdiag"));
    }
    home.map(|h| h.join(".config").join("rfdiag"))
}
