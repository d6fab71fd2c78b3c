//! Core data and error types for the transcription pipeline.

use std::fmt;
use std::time::Duration;

use serde::Serialize;

/// One uploaded audio file, owned by the request that received it.
#[derive(Debug, Clone, Default)]
pub struct AudioUpload {
    /// Raw compressed container bytes.
    pub bytes: Vec<u8>,
    /// Declared MIME type, if the client sent one.
    pub content_type: Option<String>,
    /// Client-side file name, if any.
    pub file_name: Option<String>,
}

impl AudioUpload {
    /// Upload with bytes only.
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            bytes: bytes.into(),
            ..Self::default()
        }
    }

    /// Attach a declared content type.
    #[must_use]
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }
}

/// Decoded audio in canonical form: mono, target rate, samples in [-1.0, 1.0].
#[derive(Debug, Clone, PartialEq)]
pub struct CanonicalPcm {
    /// Samples per second.
    pub sample_rate: u32,
    /// Channel count (always 1 once validated).
    pub channels: u16,
    /// Normalized amplitudes in source order.
    pub samples: Vec<f32>,
}

impl CanonicalPcm {
    /// Length of the audio in seconds.
    pub fn duration_seconds(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / f64::from(self.sample_rate) / f64::from(self.channels.max(1))
    }
}

/// A recognized span of speech.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Segment {
    /// Start time in seconds (≥ 0).
    pub start_seconds: f64,
    /// End time in seconds (≥ start).
    pub end_seconds: f64,
    /// Recognized text, possibly empty.
    pub text: String,
}

impl Segment {
    /// Build a segment, clamping times so that `0 <= start <= end`.
    pub fn new(start_seconds: f64, end_seconds: f64, text: impl Into<String>) -> Self {
        let start = start_seconds.max(0.0);
        Self {
            start_seconds: start,
            end_seconds: end_seconds.max(start),
            text: text.into(),
        }
    }
}

/// Final result of one pipeline run.
#[derive(Debug, Clone, PartialEq)]
pub struct Transcript {
    /// Space-joined, trimmed segment texts in emission order.
    pub text: String,
    /// Number of segments the engine produced.
    pub segment_count: usize,
    /// Duration of the decoded audio in seconds.
    pub audio_seconds: f64,
}

/// Join segment texts in emission order, space-separated, outer whitespace trimmed.
pub fn assemble_transcript(segments: &[Segment]) -> String {
    segments
        .iter()
        .map(|s| s.text.as_str())
        .collect::<Vec<_>>()
        .join(" ")
        .trim()
        .to_string()
}

/// Errors raised by the pipeline components.
#[derive(Debug, thiserror::Error)]
pub enum TranscriptionError {
    /// The external decoder could not be started.
    #[error("audio decoder unavailable: {0}")]
    TranscoderUnavailable(String),

    /// The external decoder ran but rejected the input.
    #[error("audio decode failed{}: {stderr}", status.map(|c| format!(" (exit status {c})")).unwrap_or_default())]
    Decode {
        /// Exit code, if the process exited normally.
        status: Option<i32>,
        /// The decoder's diagnostic output.
        stderr: String,
    },

    /// The decoded container header could not be parsed.
    #[error("malformed PCM container: {0}")]
    MalformedContainer(String),

    /// The decoded stream has the wrong sample rate.
    #[error("unexpected sample rate {got} Hz, expected {expected} Hz")]
    UnexpectedSampleRate {
        /// Declared rate.
        got: u32,
        /// Required rate.
        expected: u32,
    },

    /// The decoded stream has the wrong channel count.
    #[error("unexpected channel count {got}, expected {expected}")]
    UnexpectedChannelCount {
        /// Declared channel count.
        got: u16,
        /// Required channel count.
        expected: u16,
    },

    /// The recognition model failed.
    #[error("recognition engine error: {0}")]
    Engine(String),

    /// Model files missing or failed to load/download.
    #[error("model not available: {0}")]
    ModelNotAvailable(String),

    /// A stage exceeded its time bound.
    #[error("{stage} timed out after {}ms", after.as_millis())]
    Timeout {
        /// Which stage timed out (`decode` or `request`).
        stage: &'static str,
        /// The bound that was exceeded.
        after: Duration,
    },

    /// The upload carried no bytes.
    #[error("upload is empty")]
    EmptyUpload,

    /// The upload exceeds the configured limit.
    #[error("upload of {size} bytes exceeds limit of {limit} bytes")]
    UploadTooLarge {
        /// Upload size.
        size: usize,
        /// Configured maximum.
        limit: usize,
    },

    /// I/O error (scratch files, pipes).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl TranscriptionError {
    /// Client-facing category of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::TranscoderUnavailable(_) => ErrorKind::TranscoderUnavailable,
            Self::Decode { .. } => ErrorKind::Decode,
            Self::MalformedContainer(_) => ErrorKind::MalformedContainer,
            Self::UnexpectedSampleRate { .. } => ErrorKind::UnexpectedSampleRate,
            Self::UnexpectedChannelCount { .. } => ErrorKind::UnexpectedChannelCount,
            Self::Engine(_) | Self::ModelNotAvailable(_) => ErrorKind::Engine,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::EmptyUpload => ErrorKind::EmptyUpload,
            Self::UploadTooLarge { .. } => ErrorKind::UploadTooLarge,
            Self::Io(_) => ErrorKind::Internal,
        }
    }
}

/// Extension trait to reduce `.map_err()` boilerplate when wrapping errors into `TranscriptionError`.
pub trait ResultExt<T> {
    /// Wrap the error as [`TranscriptionError::Engine`] with `context` prefix.
    fn engine(self, context: &str) -> Result<T, TranscriptionError>;
    /// Wrap the error as [`TranscriptionError::ModelNotAvailable`] with `context` prefix.
    fn model(self, context: &str) -> Result<T, TranscriptionError>;
}

impl<T, E: fmt::Display> ResultExt<T> for Result<T, E> {
    fn engine(self, context: &str) -> Result<T, TranscriptionError> {
        self.map_err(|e| TranscriptionError::Engine(format!("{context}: {e}")))
    }
    fn model(self, context: &str) -> Result<T, TranscriptionError> {
        self.map_err(|e| TranscriptionError::ModelNotAvailable(format!("{context}: {e}")))
    }
}

/// Error category surfaced to callers of the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// External decoder missing or not executable.
    TranscoderUnavailable,
    /// Decoder rejected the upload.
    Decode,
    /// Decoder output could not be parsed.
    MalformedContainer,
    /// Decoder output has the wrong sample rate.
    UnexpectedSampleRate,
    /// Decoder output has the wrong channel count.
    UnexpectedChannelCount,
    /// Recognition failed.
    Engine,
    /// A time bound was exceeded.
    Timeout,
    /// Nothing was uploaded.
    EmptyUpload,
    /// Upload exceeds the size limit.
    UploadTooLarge,
    /// Request could not be understood (boundary-level).
    InvalidRequest,
    /// Unexpected internal failure.
    Internal,
}

impl ErrorKind {
    /// Wire name (snake case).
    pub fn as_str(self) -> &'static str {
        match self {
            Self::TranscoderUnavailable => "transcoder_unavailable",
            Self::Decode => "decode",
            Self::MalformedContainer => "malformed_container",
            Self::UnexpectedSampleRate => "unexpected_sample_rate",
            Self::UnexpectedChannelCount => "unexpected_channel_count",
            Self::Engine => "engine",
            Self::Timeout => "timeout",
            Self::EmptyUpload => "empty_upload",
            Self::UploadTooLarge => "upload_too_large",
            Self::InvalidRequest => "invalid_request",
            Self::Internal => "internal",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The single error type the pipeline returns to its caller.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct PipelineError {
    /// Error category.
    pub kind: ErrorKind,
    /// Human-readable detail.
    pub message: String,
}

impl PipelineError {
    /// Build an error of `kind`.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl From<TranscriptionError> for PipelineError {
    fn from(err: TranscriptionError) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}
