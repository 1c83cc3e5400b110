//! Shared threadline configuration types.
//!
//! The CLI reads `threadline.toml` into [`ThreadlineConfig`]; the timeline and
//! collaboration crates receive the individual settings they need as plain
//! values rather than depending on this crate.

use serde::{Deserialize, Serialize};

/// Canonical config file name.
pub const CONFIG_FILE_NAME: &str = "threadline.toml";

/// Top-level configuration (persisted as `threadline.toml`).
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct ThreadlineConfig {
    #[serde(default)]
    pub chat: ChatSettings,
    #[serde(default)]
    pub refresh: RefreshSettings,
    #[serde(default)]
    pub workbench: WorkbenchSettings,
    #[serde(default)]
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatSettings {
    /// Render reasoning segments in turn views.
    #[serde(default = "default_true")]
    pub show_reasoning: bool,
    /// Collapse tool-activity cards until the user expands them.
    #[serde(default = "default_true")]
    pub default_collapse_details: bool,
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self {
            show_reasoning: true,
            default_collapse_details: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RefreshSettings {
    /// Minimum spacing between snapshot re-fetches.
    #[serde(default = "default_min_interval_ms")]
    pub min_interval_ms: u64,
    #[serde(default = "default_true")]
    pub suppress_while_streaming: bool,
    /// Follow-mode polling cadence for new log lines.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl Default for RefreshSettings {
    fn default() -> Self {
        Self {
            min_interval_ms: default_min_interval_ms(),
            suppress_while_streaming: true,
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkbenchSettings {
    #[serde(default = "default_true")]
    pub auto_focus: bool,
}

impl Default for WorkbenchSettings {
    fn default() -> Self {
        Self { auto_focus: true }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingSettings {
    /// `tracing` env-filter directive used when `RUST_LOG` is unset.
    #[serde(default = "default_log_filter")]
    pub filter: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
        }
    }
}

fn default_true() -> bool {
    true
}
fn default_min_interval_ms() -> u64 {
    500
}
fn default_poll_interval_ms() -> u64 {
    250
}
fn default_log_filter() -> String {
    "warn".to_string()
}

/// Normalize values older or hand-edited config files may carry.
///
/// `root` is the raw TOML document; it lets the legacy
/// `[refresh] throttle_ms` key stand in for `min_interval_ms`.
/// Returns whether anything changed.
pub fn apply_compat_fallbacks(config: &mut ThreadlineConfig, root: Option<&toml::Value>) -> bool {
    let mut changed = false;

    let refresh = root.and_then(|r| r.get("refresh"));
    let has_modern_interval = refresh.and_then(|r| r.get("min_interval_ms")).is_some();
    if !has_modern_interval {
        if let Some(legacy) = refresh
            .and_then(|r| r.get("throttle_ms"))
            .and_then(toml::Value::as_integer)
            .and_then(|ms| u64::try_from(ms).ok())
        {
            config.refresh.min_interval_ms = legacy;
            changed = true;
        }
    }

    if config.refresh.min_interval_ms == 0 {
        config.refresh.min_interval_ms = default_min_interval_ms();
        changed = true;
    }
    if config.refresh.poll_interval_ms == 0 {
        config.refresh.poll_interval_ms = default_poll_interval_ms();
        changed = true;
    }
    if config.logging.filter.trim().is_empty() {
        config.logging.filter = default_log_filter();
        changed = true;
    }

    changed
}
