//! Audio ingestion and transcription pipeline.
//!
//! # Architecture
//!
//! ```text
//! upload bytes → FfmpegTranscoder (external process, stdin → stdout)
//! → canonical WAV (mono, target rate) → StreamValidator
//! → CanonicalPcm (f32 in [-1, 1]) → TranscriptionEngine
//! → scratch WAV → RecognitionModel (serialized, blocking thread)
//! → ordered segments → Pipeline joins texts → Transcript
//! ```
//!
//! Decoding runs concurrently across requests; the model is the one
//! serialized resource. Every failure reaches the caller as a
//! [`PipelineError`] tagged with an [`ErrorKind`].
//!
//! ## Crate Position
//!
//! Depends on: earshot-settings.
//! Depended on by: earshot-server, earshot.

// Always available (no heavy deps)
pub mod engine;
pub mod model;
pub mod pipeline;
pub mod segmenter;
pub mod telemetry;
pub mod transcoder;
pub mod types;
pub mod wav;

// Feature-gated (require ort + ndarray + hf-hub)
#[cfg(feature = "ort")]
pub(crate) mod decoder;
#[cfg(feature = "ort")]
pub mod parakeet;

pub use engine::{ModelDescriptor, RecognitionModel, TranscriptionEngine};
pub use pipeline::Pipeline;
pub use transcoder::{AudioTranscoder, FfmpegTranscoder};
pub use types::{
    AudioUpload, CanonicalPcm, ErrorKind, PipelineError, ResultExt, Segment, Transcript,
    TranscriptionError,
};
pub use wav::StreamValidator;

#[cfg(feature = "ort")]
pub use parakeet::ParakeetModel;
