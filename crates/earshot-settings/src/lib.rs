//! # earshot-settings
//!
//! Configuration management with layered sources.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`EarshotSettings::default()`]
//! 2. **Settings file**: `~/.earshot/settings.json` or `--config` (deep-merged over defaults)
//! 3. **Environment variables**: `EARSHOT_*` overrides (highest priority)
//!
//! Settings are fixed at process start. The loaded value is handed to the
//! components that need it; there is no global instance.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{deep_merge, load_settings, load_settings_from_path, settings_path};
pub use types::*;
