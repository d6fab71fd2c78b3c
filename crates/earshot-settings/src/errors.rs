//! Why a settings file was refused.
//!
//! Every variant names the offending file or field so the startup error
//! points straight at the line to fix.

use std::path::PathBuf;

use thiserror::Error;

/// Errors from loading or validating settings.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// The settings file exists but could not be read.
    #[error("cannot read {}: {source}", .path.display())]
    Read {
        /// File that was being read.
        path: PathBuf,
        /// Underlying I/O failure.
        source: std::io::Error,
    },

    /// The settings file is not well-formed JSON.
    #[error("{} is not valid JSON: {source}", .path.display())]
    Parse {
        /// File that was being parsed.
        path: PathBuf,
        /// Syntax error with line and column.
        source: serde_json::Error,
    },

    /// The merged document has a field of the wrong type or an unknown
    /// enum value.
    #[error("settings have the wrong shape: {0}")]
    Schema(#[from] serde_json::Error),

    /// A numeric field lies outside its accepted range.
    #[error("{field} = {value} is outside {min}..={max}")]
    OutOfRange {
        /// Dotted camelCase path, as written in `settings.json`.
        field: &'static str,
        /// Rejected value.
        value: u64,
        /// Smallest accepted value.
        min: u64,
        /// Largest accepted value.
        max: u64,
    },

    /// A field that must be set is blank or zero.
    #[error("{field} must be set")]
    Missing {
        /// Dotted camelCase path, as written in `settings.json`.
        field: &'static str,
    },
}

impl SettingsError {
    /// The `settings.json` field at fault, when the error is about one value.
    pub fn field(&self) -> Option<&'static str> {
        match self {
            Self::OutOfRange { field, .. } | Self::Missing { field } => Some(*field),
            Self::Read { .. } | Self::Parse { .. } | Self::Schema(_) => None,
        }
    }
}

/// Result type for settings operations.
pub type Result<T> = std::result::Result<T, SettingsError>;
