//! Per-request orchestration: decode → validate → transcribe → join.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use earshot_settings::PipelineSettings;
use tracing::{Instrument, error, info, info_span, warn};
use uuid::Uuid;

use crate::engine::TranscriptionEngine;
use crate::telemetry;
use crate::transcoder::{AudioTranscoder, input_format_for};
use crate::types::{
    AudioUpload, PipelineError, Transcript, TranscriptionError, assemble_transcript,
};
use crate::wav::StreamValidator;

/// Sequences the pipeline components for each upload.
///
/// One instance is built at startup and shared by all requests.
pub struct Pipeline {
    transcoder: Arc<dyn AudioTranscoder>,
    validator: StreamValidator,
    engine: Arc<TranscriptionEngine>,
    max_upload_bytes: usize,
    request_timeout: Duration,
    debug_capture_dir: Option<PathBuf>,
}

impl Pipeline {
    /// Wire the components together under `settings`.
    pub fn new(
        transcoder: Arc<dyn AudioTranscoder>,
        engine: Arc<TranscriptionEngine>,
        settings: &PipelineSettings,
    ) -> Self {
        Self {
            transcoder,
            validator: StreamValidator::new(settings.target_sample_rate),
            engine,
            max_upload_bytes: settings.max_upload_bytes,
            request_timeout: Duration::from_millis(settings.request_timeout_ms),
            debug_capture_dir: settings.debug_capture_dir.as_ref().map(PathBuf::from),
        }
    }

    /// The shared engine.
    pub fn engine(&self) -> &Arc<TranscriptionEngine> {
        &self.engine
    }

    /// Largest accepted upload.
    pub fn max_upload_bytes(&self) -> usize {
        self.max_upload_bytes
    }

    /// Transcribe one upload.
    ///
    /// Any failure is logged here, once, and returned as a tagged
    /// [`PipelineError`]. Nothing is retried.
    pub async fn run(&self, upload: AudioUpload) -> Result<Transcript, PipelineError> {
        let request_id = Uuid::now_v7();
        let span = info_span!("transcribe", %request_id);
        let started = Instant::now();

        let result = self
            .execute(upload, request_id)
            .instrument(span.clone())
            .await;

        let elapsed = started.elapsed();
        metrics::histogram!(telemetry::PIPELINE_DURATION_SECONDS).record(elapsed.as_secs_f64());

        let _enter = span.enter();
        match result {
            Ok(transcript) => {
                metrics::counter!(telemetry::PIPELINE_REQUESTS_TOTAL, "outcome" => "ok")
                    .increment(1);
                info!(
                    segments = transcript.segment_count,
                    audio_seconds = transcript.audio_seconds,
                    chars = transcript.text.len(),
                    elapsed_ms = elapsed.as_millis(),
                    "transcription complete"
                );
                Ok(transcript)
            }
            Err(err) => {
                let err = PipelineError::from(err);
                metrics::counter!(telemetry::PIPELINE_REQUESTS_TOTAL, "outcome" => "error")
                    .increment(1);
                metrics::counter!(telemetry::PIPELINE_ERRORS_TOTAL, "kind" => err.kind.as_str())
                    .increment(1);
                error!(
                    kind = %err.kind,
                    error = %err.message,
                    %request_id,
                    "transcription failed"
                );
                Err(err)
            }
        }
    }

    async fn execute(
        &self,
        upload: AudioUpload,
        request_id: Uuid,
    ) -> Result<Transcript, TranscriptionError> {
        self.check_size(&upload)?;
        tokio::time::timeout(self.request_timeout, self.stages(upload, request_id))
            .await
            .unwrap_or_else(|_| {
                Err(TranscriptionError::Timeout {
                    stage: "request",
                    after: self.request_timeout,
                })
            })
    }

    fn check_size(&self, upload: &AudioUpload) -> Result<(), TranscriptionError> {
        if upload.bytes.is_empty() {
            return Err(TranscriptionError::EmptyUpload);
        }
        if upload.bytes.len() > self.max_upload_bytes {
            return Err(TranscriptionError::UploadTooLarge {
                size: upload.bytes.len(),
                limit: self.max_upload_bytes,
            });
        }
        Ok(())
    }

    async fn stages(
        &self,
        upload: AudioUpload,
        request_id: Uuid,
    ) -> Result<Transcript, TranscriptionError> {
        if let Some(dir) = &self.debug_capture_dir {
            capture_upload(dir, &upload, request_id).await;
        }

        let decode_started = Instant::now();
        let wav = self
            .transcoder
            .decode(&upload.bytes, upload.content_type.as_deref())
            .await?;
        drop(upload);
        metrics::histogram!(telemetry::TRANSCODE_DURATION_SECONDS)
            .record(decode_started.elapsed().as_secs_f64());

        let pcm = self.validator.parse(&wav)?;
        drop(wav);
        let audio_seconds = pcm.duration_seconds();
        metrics::histogram!(telemetry::AUDIO_DURATION_SECONDS).record(audio_seconds);

        let segments = self.engine.transcribe(pcm).await?;
        Ok(Transcript {
            text: assemble_transcript(&segments),
            segment_count: segments.len(),
            audio_seconds,
        })
    }
}

/// File extension for a captured upload.
fn capture_extension(upload: &AudioUpload) -> &str {
    upload
        .file_name
        .as_deref()
        .and_then(|name| Path::new(name).extension())
        .and_then(|ext| ext.to_str())
        .filter(|ext| {
            !ext.is_empty() && ext.len() <= 8 && ext.chars().all(|c| c.is_ascii_alphanumeric())
        })
        .or_else(|| upload.content_type.as_deref().and_then(input_format_for))
        .unwrap_or("bin")
}

/// Write the raw upload to `dir` for offline debugging. Never fails the request.
async fn capture_upload(dir: &Path, upload: &AudioUpload, request_id: Uuid) {
    let path = dir.join(format!("{request_id}.{}", capture_extension(upload)));
    match tokio::fs::write(&path, &upload.bytes).await {
        Ok(()) => info!(path = %path.display(), bytes = upload.bytes.len(), "captured upload"),
        Err(e) => warn!(path = %path.display(), error = %e, "failed to capture upload"),
    }
}
