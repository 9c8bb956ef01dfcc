//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`TaskhubSettings::default()`]
//! 2. If `~/.taskhub/settings.json` exists, deep-merge user values over defaults
//! 3. Apply `TASKHUB_*` environment variable overrides (highest priority)
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde_json::Value;
use taskhub_core::LogFormat;
use tracing::{debug, warn};

use crate::errors::Result;
use crate::types::TaskhubSettings;

/// Resolve the path to the settings file (`~/.taskhub/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".taskhub").join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<TaskhubSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields defaults. Invalid JSON is an error.
pub fn load_settings_from_path(path: &Path) -> Result<TaskhubSettings> {
    let mut settings = load_file_layer(path)?;
    apply_env_overrides(&mut settings);
    Ok(settings)
}

fn load_file_layer(path: &Path) -> Result<TaskhubSettings> {
    let defaults = serde_json::to_value(TaskhubSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    Ok(serde_json::from_value(merged)?)
}

/// Recursive deep merge of two JSON values.
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = if let Some(target_val) = target_map.remove(&key) {
                    deep_merge(target_val, source_val)
                } else {
                    source_val
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply `TASKHUB_*` environment variable overrides to loaded settings.
pub fn apply_env_overrides(settings: &mut TaskhubSettings) {
    apply_overrides(settings, |name| std::env::var(name).ok());
}

/// Apply overrides read through `lookup`.
///
/// Empty values are treated as unset. Values that fail to parse or fall
/// outside their range are ignored with a warning.
pub fn apply_overrides(settings: &mut TaskhubSettings, lookup: impl Fn(&str) -> Option<String>) {
    let read = |name: &str| lookup(name).filter(|v| !v.is_empty());

    // ── Server ──────────────────────────────────────────────────────
    if let Some(v) = read("TASKHUB_HOST") {
        settings.server.host = v;
    }
    if let Some(v) = ranged(&read, "TASKHUB_PORT", 1u16, 65535) {
        settings.server.port = v;
    }

    // ── Realtime ────────────────────────────────────────────────────
    if let Some(v) = ranged(&read, "TASKHUB_PING_INTERVAL_SECS", 1u64, 3600) {
        settings.realtime.ping_interval_secs = v;
    }
    if let Some(v) = ranged(&read, "TASKHUB_READ_TIMEOUT_SECS", 1u64, 3600) {
        settings.realtime.read_timeout_secs = v;
    }
    if let Some(v) = ranged(&read, "TASKHUB_MAX_MESSAGE_BYTES", 64usize, 1_048_576) {
        settings.realtime.max_message_bytes = v;
    }
    if let Some(v) = ranged(&read, "TASKHUB_OUTBOUND_CAPACITY", 1usize, 65_536) {
        settings.realtime.outbound_capacity = v;
    }

    // ── Auth / logging ──────────────────────────────────────────────
    if let Some(v) = read("TASKHUB_JWT_SECRET") {
        settings.auth.jwt_secret = v;
    }
    if let Some(v) = read("TASKHUB_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = read("TASKHUB_LOG_FORMAT") {
        match LogFormat::from_str(&v) {
            Ok(format) => settings.logging.format = format,
            Err(_) => warn!(key = "TASKHUB_LOG_FORMAT", value = %v, "invalid env var, ignoring"),
        }
    }
}

// ── Pure parsing functions ──────────────────────────────────────────────────

/// Parse a string as a number within an inclusive range.
pub fn parse_range<T>(val: &str, min: T, max: T) -> Option<T>
where
    T: FromStr + PartialOrd,
{
    let n: T = val.trim().parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

fn ranged<T, F>(read: &F, name: &str, min: T, max: T) -> Option<T>
where
    T: FromStr + PartialOrd,
    F: Fn(&str) -> Option<String>,
{
    let val = read(name)?;
    let result = parse_range(&val, min, max);
    if result.is_none() {
        warn!(key = name, value = %val, "invalid env var, ignoring");
    }
    result
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
