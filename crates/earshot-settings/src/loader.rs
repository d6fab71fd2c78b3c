//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`EarshotSettings::default()`]
//! 2. If the settings file exists, deep-merge its values over defaults
//! 3. Apply `EARSHOT_*` environment overrides (highest priority)
//! 4. [`EarshotSettings::validate`]
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::{Result, SettingsError};
use crate::types::{EarshotSettings, PcmEncoding, Quantization};

/// Resolve the default settings file (`~/.earshot/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".earshot").join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<EarshotSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields defaults. Invalid JSON or values that fail
/// validation are errors: the service must not start half-configured.
pub fn load_settings_from_path(path: &Path) -> Result<EarshotSettings> {
    load_with_lookup(path, |name| std::env::var(name).ok())
}

fn load_with_lookup(
    path: &Path,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<EarshotSettings> {
    let defaults = serde_json::to_value(EarshotSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path).map_err(|source| SettingsError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let user: Value =
            serde_json::from_str(&content).map_err(|source| SettingsError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    let mut settings: EarshotSettings = serde_json::from_value(merged)?;
    apply_overrides(&mut settings, lookup);
    settings.validate()?;
    Ok(settings)
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

/// Apply `EARSHOT_*` environment overrides to loaded settings.
pub fn apply_env_overrides(settings: &mut EarshotSettings) {
    apply_overrides(settings, |name| std::env::var(name).ok());
}

/// Apply overrides read through `lookup`.
///
/// Each variable has strict parsing rules; invalid values are logged and
/// ignored (the file/default value stays).
pub fn apply_overrides(settings: &mut EarshotSettings, lookup: impl Fn(&str) -> Option<String>) {
    let env = EnvReader { lookup };

    // ── Server ──────────────────────────────────────────────────────
    if let Some(v) = env.string("EARSHOT_HOST") {
        settings.server.host = v;
    }
    if let Some(v) = env.u64_in("EARSHOT_PORT", 0, 65_535) {
        settings.server.port = v as u16;
    }

    // ── Transcoder ──────────────────────────────────────────────────
    if let Some(v) = env.string("EARSHOT_FFMPEG") {
        settings.transcoder.program = v;
    }
    if let Some(v) = env.string("EARSHOT_INPUT_FORMAT") {
        settings.transcoder.input_format = Some(v);
    }
    if let Some(v) = env.u64_in("EARSHOT_DECODE_TIMEOUT_MS", 1_000, 3_600_000) {
        settings.transcoder.timeout_ms = v;
    }
    if let Some(v) = env.enumeration::<PcmEncoding>("EARSHOT_PCM_ENCODING") {
        settings.transcoder.pcm_encoding = v;
    }

    // ── Engine ──────────────────────────────────────────────────────
    if let Some(v) = env.enumeration("EARSHOT_MODEL") {
        settings.engine.variant = v;
    }
    if let Some(v) = env.enumeration::<Quantization>("EARSHOT_QUANTIZATION") {
        settings.engine.quantization = v;
    }
    if let Some(v) = env.string("EARSHOT_MODEL_DIR") {
        settings.engine.model_dir = Some(v);
    }
    if let Some(v) = env.boolean("EARSHOT_AUTO_DOWNLOAD") {
        settings.engine.auto_download = v;
    }
    if let Some(v) = env.u64_in("EARSHOT_THREADS", 1, 256) {
        settings.engine.intra_threads = v as usize;
    }
    if let Some(v) = env.string("EARSHOT_SCRATCH_DIR") {
        settings.engine.scratch_dir = Some(v);
    }

    // ── Pipeline ────────────────────────────────────────────────────
    if let Some(v) = env.u64_in("EARSHOT_MAX_UPLOAD_BYTES", 1_024, 1_073_741_824) {
        settings.pipeline.max_upload_bytes = v as usize;
    }
    if let Some(v) = env.u64_in("EARSHOT_REQUEST_TIMEOUT_MS", 1_000, 3_600_000) {
        settings.pipeline.request_timeout_ms = v;
    }
    if let Some(v) = env.string("EARSHOT_DEBUG_CAPTURE_DIR") {
        settings.pipeline.debug_capture_dir = Some(v);
    }

    // ── Logging ─────────────────────────────────────────────────────
    if let Some(v) = env.string("EARSHOT_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = env.boolean("EARSHOT_LOG_JSON") {
        settings.logging.json = v;
    }
}

// ── Pure parsing functions ──────────────────────────────────────────────────

/// Parse a string as a boolean.
///
/// Accepts (case-insensitive): `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`.
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse a string as a `u64` within an inclusive range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.trim().parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

struct EnvReader<F> {
    lookup: F,
}

impl<F: Fn(&str) -> Option<String>> EnvReader<F> {
    fn string(&self, name: &str) -> Option<String> {
        (self.lookup)(name).filter(|v| !v.is_empty())
    }

    fn boolean(&self, name: &str) -> Option<bool> {
        let val = self.string(name)?;
        let result = parse_bool(&val);
        if result.is_none() {
            warn!(key = name, value = %val, "invalid boolean env var, ignoring");
        }
        result
    }

    fn u64_in(&self, name: &str, min: u64, max: u64) -> Option<u64> {
        let val = self.string(name)?;
        let result = parse_u64_range(&val, min, max);
        if result.is_none() {
            warn!(key = name, value = %val, min, max, "invalid integer env var, ignoring");
        }
        result
    }

    fn enumeration<T: serde::de::DeserializeOwned>(&self, name: &str) -> Option<T> {
        let val = self.string(name)?;
        match serde_json::from_value(Value::String(val.clone())) {
            Ok(v) => Some(v),
            Err(_) => {
                warn!(key = name, value = %val, "unrecognized env var value, ignoring");
                None
            }
        }
    }
}
