//! Decoder, engine, and pipeline settings.

use serde::{Deserialize, Serialize};

/// Sample encoding of the canonical PCM container produced by the decoder.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PcmEncoding {
    /// Signed 16-bit little-endian integers.
    #[default]
    S16,
    /// 32-bit IEEE float.
    F32,
}

impl PcmEncoding {
    /// Codec name passed to the external decoder.
    pub fn codec_name(self) -> &'static str {
        match self {
            Self::S16 => "pcm_s16le",
            Self::F32 => "pcm_f32le",
        }
    }
}

/// External decoder settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TranscoderSettings {
    /// Decoder executable (looked up on `PATH` unless absolute).
    pub program: String,
    /// Force the input container format (e.g. `"webm"`) instead of
    /// inferring it from the upload's content type.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_format: Option<String>,
    /// Maximum time the decoder may run before it is killed.
    pub timeout_ms: u64,
    /// Sample encoding requested from the decoder.
    pub pcm_encoding: PcmEncoding,
}

impl Default for TranscoderSettings {
    fn default() -> Self {
        Self {
            program: "ffmpeg".to_string(),
            input_format: None,
            timeout_ms: 120_000,
            pcm_encoding: PcmEncoding::S16,
        }
    }
}

/// Recognition model variant.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModelVariant {
    /// English-only parakeet TDT 0.6B v2.
    #[serde(rename = "parakeet-tdt-0.6b-v2")]
    ParakeetTdtV2,
    /// Multilingual parakeet TDT 0.6B v3.
    #[default]
    #[serde(rename = "parakeet-tdt-0.6b-v3")]
    ParakeetTdtV3,
}

impl ModelVariant {
    /// Stable identifier, identical to the serialized form.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ParakeetTdtV2 => "parakeet-tdt-0.6b-v2",
            Self::ParakeetTdtV3 => "parakeet-tdt-0.6b-v3",
        }
    }
}

/// Numeric precision of the loaded model weights.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Quantization {
    /// Full-precision weights.
    Fp32,
    /// 8-bit quantized weights.
    #[default]
    Int8,
}

impl Quantization {
    /// Stable identifier, identical to the serialized form.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Fp32 => "fp32",
            Self::Int8 => "int8",
        }
    }
}

/// Recognition engine settings. Fixed for the lifetime of the process.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineSettings {
    /// Model variant to load.
    pub variant: ModelVariant,
    /// Weight precision.
    pub quantization: Quantization,
    /// Directory holding the model files. Defaults to
    /// `~/.earshot/models/<variant>`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_dir: Option<String>,
    /// Download missing model files at startup.
    pub auto_download: bool,
    /// Intra-op threads for the heavy inference sessions.
    pub intra_threads: usize,
    /// Directory for per-request scratch audio. Defaults to the system
    /// temp directory.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scratch_dir: Option<String>,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            variant: ModelVariant::default(),
            quantization: Quantization::default(),
            model_dir: None,
            auto_download: false,
            intra_threads: 4,
            scratch_dir: None,
        }
    }
}

/// Request pipeline settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PipelineSettings {
    /// Sample rate the decoder must produce and the validator accepts.
    pub target_sample_rate: u32,
    /// Largest accepted upload in bytes.
    pub max_upload_bytes: usize,
    /// Deadline for one whole request (decode, validate, transcribe).
    pub request_timeout_ms: u64,
    /// When set, every upload is also written to this directory.
    /// Off by default: uploads are user audio.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub debug_capture_dir: Option<String>,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            target_sample_rate: 16_000,
            max_upload_bytes: 25 * 1024 * 1024,
            request_timeout_ms: 300_000,
            debug_capture_dir: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn variant_serializes_to_model_name() {
        let json = serde_json::to_string(&ModelVariant::ParakeetTdtV2).unwrap();
        assert_eq!(json, "\"parakeet-tdt-0.6b-v2\"");
        let back: ModelVariant = serde_json::from_str("\"parakeet-tdt-0.6b-v3\"").unwrap();
        assert_eq!(back, ModelVariant::ParakeetTdtV3);
        assert_eq!(back.as_str(), "parakeet-tdt-0.6b-v3");
    }

    #[test]
    fn quantization_lowercase() {
        let q: Quantization = serde_json::from_str("\"fp32\"").unwrap();
        assert_eq!(q, Quantization::Fp32);
        assert_eq!(Quantization::Int8.as_str(), "int8");
    }

    #[test]
    fn pcm_encoding_codec_names() {
        assert_eq!(PcmEncoding::S16.codec_name(), "pcm_s16le");
        assert_eq!(PcmEncoding::F32.codec_name(), "pcm_f32le");
    }

    #[test]
    fn engine_defaults() {
        let e = EngineSettings::default();
        assert!(!e.auto_download);
        assert!(e.model_dir.is_none());
        assert_eq!(e.quantization, Quantization::Int8);
        assert_eq!(e.intra_threads, 4);
    }

    #[test]
    fn pipeline_defaults() {
        let p = PipelineSettings::default();
        assert_eq!(p.target_sample_rate, 16_000);
        assert_eq!(p.max_upload_bytes, 26_214_400);
        assert_eq!(p.request_timeout_ms, 300_000);
    }
}
