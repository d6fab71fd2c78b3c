//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase", default)]`, so a
//! settings file may be partial: missing fields keep their default value.

mod server;
mod transcription;

pub use server::*;
pub use transcription::*;

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings type.
///
/// # JSON Format
///
/// ```json
/// {
///   "server": { "port": 9000 },
///   "engine": { "variant": "parakeet-tdt-0.6b-v3", "quantization": "int8" },
///   "pipeline": { "debugCaptureDir": "/var/tmp/earshot-captures" }
/// }
/// ```
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EarshotSettings {
    /// HTTP listener settings.
    pub server: ServerSettings,
    /// External decoder settings.
    pub transcoder: TranscoderSettings,
    /// Recognition engine settings.
    pub engine: EngineSettings,
    /// Request pipeline settings.
    pub pipeline: PipelineSettings,
    /// Logging configuration.
    pub logging: LoggingSettings,
}

impl EarshotSettings {
    /// Check cross-field and range constraints that serde cannot express.
    pub fn validate(&self) -> Result<()> {
        let rate = self.pipeline.target_sample_rate;
        if !(8_000..=48_000).contains(&rate) {
            return Err(SettingsError::OutOfRange {
                field: "pipeline.targetSampleRate",
                value: u64::from(rate),
                min: 8_000,
                max: 48_000,
            });
        }
        if self.pipeline.max_upload_bytes == 0 {
            return Err(SettingsError::Missing {
                field: "pipeline.maxUploadBytes",
            });
        }
        if self.transcoder.program.trim().is_empty() {
            return Err(SettingsError::Missing {
                field: "transcoder.program",
            });
        }
        if self.transcoder.timeout_ms == 0 {
            return Err(SettingsError::Missing {
                field: "transcoder.timeoutMs",
            });
        }
        if self.pipeline.request_timeout_ms == 0 {
            return Err(SettingsError::Missing {
                field: "pipeline.requestTimeoutMs",
            });
        }
        if self.engine.intra_threads == 0 {
            return Err(SettingsError::Missing {
                field: "engine.intraThreads",
            });
        }
        Ok(())
    }
}
