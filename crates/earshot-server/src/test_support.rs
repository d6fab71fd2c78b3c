//! Fakes shared by the router tests.

use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use earshot_settings::PipelineSettings;
use earshot_transcription::{
    AudioTranscoder, ModelDescriptor, Pipeline, RecognitionModel, Segment, TranscriptionEngine,
    TranscriptionError,
};

/// Returns WAV input untouched; anything else fails like ffmpeg would.
pub struct WavPassthrough;

#[async_trait]
impl AudioTranscoder for WavPassthrough {
    async fn decode(
        &self,
        input: &[u8],
        _content_type: Option<&str>,
    ) -> Result<Vec<u8>, TranscriptionError> {
        if input.starts_with(b"RIFF") {
            Ok(input.to_vec())
        } else {
            Err(TranscriptionError::Decode {
                status: Some(1),
                stderr: "pipe:0: Invalid data found when processing input".into(),
            })
        }
    }
}

/// Always reports a missing decoder binary.
pub struct MissingTranscoder;

#[async_trait]
impl AudioTranscoder for MissingTranscoder {
    async fn decode(
        &self,
        _input: &[u8],
        _content_type: Option<&str>,
    ) -> Result<Vec<u8>, TranscriptionError> {
        Err(TranscriptionError::TranscoderUnavailable(
            "ffmpeg: No such file or directory".into(),
        ))
    }
}

/// Hears "hello world" in anything louder than a whisper.
pub struct LoudnessModel;

impl RecognitionModel for LoudnessModel {
    fn descriptor(&self) -> ModelDescriptor {
        ModelDescriptor {
            name: "loudness".into(),
            quantization: "none".into(),
            sample_rate: 16_000,
        }
    }

    fn recognize(&mut self, wav_path: &Path) -> Result<Vec<Segment>, TranscriptionError> {
        let mut reader = hound::WavReader::open(wav_path)
            .map_err(|e| TranscriptionError::Engine(e.to_string()))?;
        let loud = reader
            .samples::<i16>()
            .filter_map(Result::ok)
            .any(|s| s.unsigned_abs() > 1_000);
        if loud {
            Ok(vec![
                Segment::new(0.0, 0.5, "hello"),
                Segment::new(0.5, 1.0, "world"),
            ])
        } else {
            Ok(Vec::new())
        }
    }
}

/// Engine over [`LoudnessModel`]; keep the dir alive as long as the engine.
pub fn engine() -> (TranscriptionEngine, tempfile::TempDir) {
    let scratch = tempfile::tempdir().unwrap();
    let engine = TranscriptionEngine::new(Box::new(LoudnessModel), scratch.path());
    (engine, scratch)
}

/// Pipeline with the given decoder and settings.
pub fn pipeline_with(
    transcoder: Arc<dyn AudioTranscoder>,
    settings: &PipelineSettings,
) -> (Arc<Pipeline>, tempfile::TempDir) {
    let (engine, scratch) = engine();
    let pipeline = Pipeline::new(transcoder, Arc::new(engine), settings);
    (Arc::new(pipeline), scratch)
}

/// Pipeline with [`WavPassthrough`] and default settings.
pub fn pipeline() -> (Arc<Pipeline>, tempfile::TempDir) {
    pipeline_with(Arc::new(WavPassthrough), &PipelineSettings::default())
}

/// A 16-bit WAV of a 440 Hz tone.
pub fn wav(rate: u32, channels: u16, amplitude: f32, seconds: f32) -> Vec<u8> {
    let spec = hound::WavSpec {
        channels,
        sample_rate: rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
        let frames = (rate as f32 * seconds) as usize;
        for i in 0..frames {
            let v = amplitude * (i as f32 * 440.0 * std::f32::consts::TAU / rate as f32).sin();
            for _ in 0..channels {
                writer.write_sample((v * 32_767.0) as i16).unwrap();
            }
        }
        writer.finalize().unwrap();
    }
    cursor.into_inner()
}

/// Hand-built multipart body with one part per `(name, file_name, bytes)`.
pub fn multipart_body(
    boundary: &str,
    parts: &[(&str, Option<&str>, &[u8])],
) -> Vec<u8> {
    let mut body = Vec::new();
    for (name, file_name, bytes) in parts {
        body.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
        match file_name {
            Some(file_name) => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{name}\"; filename=\"{file_name}\"\r\n"
                    )
                    .as_bytes(),
                );
                body.extend_from_slice(b"Content-Type: audio/wav\r\n");
            }
            None => body.extend_from_slice(
                format!("Content-Disposition: form-data; name=\"{name}\"\r\n").as_bytes(),
            ),
        }
        body.extend_from_slice(b"\r\n");
        body.extend_from_slice(bytes);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{boundary}--\r\n").as_bytes());
    body
}
