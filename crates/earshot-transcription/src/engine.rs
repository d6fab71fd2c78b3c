//! The shared recognition engine.
//!
//! One model instance is loaded at startup and shared by every request.
//! Recognition is file-based: samples are written to a scratch WAV that is
//! removed when the request's use of it ends, whatever the outcome.

use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

use serde::Serialize;
use tempfile::NamedTempFile;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::telemetry;
use crate::types::{CanonicalPcm, ResultExt, Segment, TranscriptionError};

/// Identity of a loaded model, reported by `/health` and at startup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModelDescriptor {
    /// Model name, e.g. `parakeet-tdt-0.6b-v3`.
    pub name: String,
    /// Weight precision, e.g. `int8`.
    pub quantization: String,
    /// The only sample rate the model accepts.
    pub sample_rate: u32,
}

/// A speech recognizer that reads audio from a WAV file.
///
/// Implementations are driven from a blocking thread, one call at a time.
pub trait RecognitionModel: Send {
    /// What this model is.
    fn descriptor(&self) -> ModelDescriptor;

    /// Recognize the mono WAV at `wav_path` into segments ordered by start time.
    fn recognize(&mut self, wav_path: &Path) -> Result<Vec<Segment>, TranscriptionError>;
}

/// Decrements the wait counter when a request stops waiting, even if it
/// was cancelled while queued.
struct QueueSlot {
    waiting: Arc<AtomicUsize>,
}

impl QueueSlot {
    fn enter(waiting: &Arc<AtomicUsize>) -> Self {
        let depth = waiting.fetch_add(1, Ordering::SeqCst) + 1;
        metrics::gauge!(telemetry::ENGINE_QUEUE_DEPTH).set(depth as f64);
        Self {
            waiting: Arc::clone(waiting),
        }
    }
}

impl Drop for QueueSlot {
    fn drop(&mut self) {
        let depth = self.waiting.fetch_sub(1, Ordering::SeqCst) - 1;
        metrics::gauge!(telemetry::ENGINE_QUEUE_DEPTH).set(depth as f64);
    }
}

/// Serialized access to the process-wide recognition model.
///
/// Callers wait on an async mutex, so queued requests hold no blocking
/// thread. The owned guard travels into the blocking task and is released
/// when recognition finishes, even if the waiting request was cancelled.
pub struct TranscriptionEngine {
    model: Arc<Mutex<Box<dyn RecognitionModel>>>,
    descriptor: ModelDescriptor,
    scratch_dir: PathBuf,
    waiting: Arc<AtomicUsize>,
}

impl TranscriptionEngine {
    /// Wrap a loaded model. Scratch WAVs are created in `scratch_dir`.
    pub fn new(model: Box<dyn RecognitionModel>, scratch_dir: impl Into<PathBuf>) -> Self {
        let descriptor = model.descriptor();
        let scratch_dir = scratch_dir.into();
        info!(
            model = %descriptor.name,
            quantization = %descriptor.quantization,
            sample_rate = descriptor.sample_rate,
            scratch_dir = %scratch_dir.display(),
            "transcription engine ready"
        );
        Self {
            model: Arc::new(Mutex::new(model)),
            descriptor,
            scratch_dir,
            waiting: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Identity of the loaded model.
    pub fn descriptor(&self) -> &ModelDescriptor {
        &self.descriptor
    }

    /// Requests currently waiting for the model.
    pub fn queue_depth(&self) -> usize {
        self.waiting.load(Ordering::SeqCst)
    }

    /// Transcribe validated PCM into ordered segments. Empty output is success.
    pub async fn transcribe(&self, pcm: CanonicalPcm) -> Result<Vec<Segment>, TranscriptionError> {
        if pcm.sample_rate != self.descriptor.sample_rate {
            return Err(TranscriptionError::UnexpectedSampleRate {
                got: pcm.sample_rate,
                expected: self.descriptor.sample_rate,
            });
        }

        let scratch_dir = self.scratch_dir.clone();
        let scratch = tokio::task::spawn_blocking(move || {
            write_scratch_wav(&scratch_dir, pcm.sample_rate, &pcm.samples)
        })
        .await
        .engine("scratch write task")??;

        let guard = {
            let _slot = QueueSlot::enter(&self.waiting);
            Arc::clone(&self.model).lock_owned().await
        };

        let started = Instant::now();
        let segments = tokio::task::spawn_blocking(move || {
            let mut model = guard;
            let result = model.recognize(scratch.path());
            drop(scratch);
            result
        })
        .await
        .engine("recognition task")??;

        let elapsed = started.elapsed();
        metrics::histogram!(telemetry::ENGINE_SECONDS).record(elapsed.as_secs_f64());
        debug!(
            segments = segments.len(),
            elapsed_ms = elapsed.as_millis(),
            "recognition finished"
        );
        Ok(segments)
    }
}

/// Write mono 16-bit samples to a uniquely named WAV in `dir`.
///
/// The returned handle deletes the file when dropped.
fn write_scratch_wav(
    dir: &Path,
    sample_rate: u32,
    samples: &[f32],
) -> Result<NamedTempFile, TranscriptionError> {
    let file = tempfile::Builder::new()
        .prefix("earshot-")
        .suffix(".wav")
        .tempfile_in(dir)?;

    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer =
        hound::WavWriter::new(BufWriter::new(file.as_file()), spec).engine("scratch wav header")?;
    for &sample in samples {
        writer
            .write_sample((sample.clamp(-1.0, 1.0) * f32::from(i16::MAX)) as i16)
            .engine("scratch wav samples")?;
    }
    writer.finalize().engine("scratch wav finalize")?;
    Ok(file)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use std::sync::atomic::AtomicBool;
    use std::time::Duration;

    /// Reads the scratch WAV back and reports what it heard.
    pub(crate) struct ScriptedModel {
        pub delay: Duration,
        pub busy: Arc<AtomicBool>,
        pub overlapped: Arc<AtomicBool>,
    }

    impl ScriptedModel {
        pub(crate) fn new() -> Self {
            Self {
                delay: Duration::ZERO,
                busy: Arc::new(AtomicBool::new(false)),
                overlapped: Arc::new(AtomicBool::new(false)),
            }
        }
    }

    impl RecognitionModel for ScriptedModel {
        fn descriptor(&self) -> ModelDescriptor {
            ModelDescriptor {
                name: "scripted".into(),
                quantization: "none".into(),
                sample_rate: 16_000,
            }
        }

        fn recognize(&mut self, wav_path: &Path) -> Result<Vec<Segment>, TranscriptionError> {
            if self.busy.swap(true, Ordering::SeqCst) {
                self.overlapped.store(true, Ordering::SeqCst);
            }
            std::thread::sleep(self.delay);

            let mut reader = hound::WavReader::open(wav_path).engine("open")?;
            let samples: Vec<i16> = reader
                .samples::<i16>()
                .collect::<Result<_, _>>()
                .engine("read")?;
            self.busy.store(false, Ordering::SeqCst);

            let peak = samples.iter().map(|s| s.unsigned_abs()).max().unwrap_or(0);
            if peak < 100 {
                return Ok(Vec::new());
            }
            // One segment per second of audio, labelled with the peak level
            let seconds = samples.len().div_ceil(16_000);
            Ok((0..seconds)
                .map(|i| Segment::new(i as f64, (i + 1) as f64, format!("peak{peak}")))
                .collect())
        }
    }

    struct FailingModel;

    impl RecognitionModel for FailingModel {
        fn descriptor(&self) -> ModelDescriptor {
            ModelDescriptor {
                name: "failing".into(),
                quantization: "none".into(),
                sample_rate: 16_000,
            }
        }

        fn recognize(&mut self, _: &Path) -> Result<Vec<Segment>, TranscriptionError> {
            Err(TranscriptionError::Engine("model exploded".into()))
        }
    }

    struct PanickingModel;

    impl RecognitionModel for PanickingModel {
        fn descriptor(&self) -> ModelDescriptor {
            FailingModel.descriptor()
        }

        fn recognize(&mut self, _: &Path) -> Result<Vec<Segment>, TranscriptionError> {
            panic!("model panicked");
        }
    }

    pub(crate) fn tone(amplitude: f32, seconds: f32) -> CanonicalPcm {
        let n = (16_000.0 * seconds) as usize;
        CanonicalPcm {
            sample_rate: 16_000,
            channels: 1,
            samples: (0..n)
                .map(|i| amplitude * (i as f32 * 0.05).sin())
                .collect(),
        }
    }

    fn scratch_is_empty(dir: &Path) -> bool {
        std::fs::read_dir(dir).unwrap().next().is_none()
    }

    #[tokio::test]
    async fn silence_transcribes_to_no_segments() {
        let scratch = tempfile::tempdir().unwrap();
        let engine = TranscriptionEngine::new(Box::new(ScriptedModel::new()), scratch.path());
        let segments = engine.transcribe(tone(0.0, 1.0)).await.unwrap();
        assert!(segments.is_empty());
        assert!(scratch_is_empty(scratch.path()));
    }

    #[tokio::test]
    async fn speech_yields_ordered_segments() {
        let scratch = tempfile::tempdir().unwrap();
        let engine = TranscriptionEngine::new(Box::new(ScriptedModel::new()), scratch.path());
        let segments = engine.transcribe(tone(0.5, 2.5)).await.unwrap();
        assert_eq!(segments.len(), 3);
        assert!(segments.windows(2).all(|w| w[0].start_seconds <= w[1].start_seconds));
        assert!(segments[0].text.starts_with("peak"));
        assert!(scratch_is_empty(scratch.path()));
    }

    #[tokio::test]
    async fn model_error_is_engine_error_and_cleans_up() {
        let scratch = tempfile::tempdir().unwrap();
        let engine = TranscriptionEngine::new(Box::new(FailingModel), scratch.path());
        assert_matches!(
            engine.transcribe(tone(0.5, 0.5)).await,
            Err(TranscriptionError::Engine(m)) if m == "model exploded"
        );
        assert!(scratch_is_empty(scratch.path()));
    }

    #[tokio::test]
    async fn model_panic_is_engine_error_and_cleans_up() {
        let scratch = tempfile::tempdir().unwrap();
        let engine = TranscriptionEngine::new(Box::new(PanickingModel), scratch.path());
        assert_matches!(
            engine.transcribe(tone(0.5, 0.5)).await,
            Err(TranscriptionError::Engine(m)) if m.starts_with("recognition task")
        );
        assert!(scratch_is_empty(scratch.path()));
    }

    #[tokio::test]
    async fn missing_scratch_dir_is_io_error() {
        let engine =
            TranscriptionEngine::new(Box::new(ScriptedModel::new()), "/nonexistent/earshot-scratch");
        assert_matches!(
            engine.transcribe(tone(0.5, 0.1)).await,
            Err(TranscriptionError::Io(_))
        );
    }

    #[tokio::test]
    async fn wrong_rate_rejected_before_model() {
        let scratch = tempfile::tempdir().unwrap();
        let engine = TranscriptionEngine::new(Box::new(FailingModel), scratch.path());
        let mut pcm = tone(0.5, 0.1);
        pcm.sample_rate = 8_000;
        assert_matches!(
            engine.transcribe(pcm).await,
            Err(TranscriptionError::UnexpectedSampleRate { got: 8_000, expected: 16_000 })
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_requests_are_serialized_and_isolated() {
        let scratch = tempfile::tempdir().unwrap();
        let mut model = ScriptedModel::new();
        model.delay = Duration::from_millis(50);
        let overlapped = Arc::clone(&model.overlapped);
        let engine = Arc::new(TranscriptionEngine::new(Box::new(model), scratch.path()));

        let handles: Vec<_> = [0.0f32, 0.2, 0.4, 0.6, 0.8]
            .into_iter()
            .map(|amp| {
                let engine = Arc::clone(&engine);
                tokio::spawn(async move { (amp, engine.transcribe(tone(amp, 1.0)).await) })
            })
            .collect();

        let mut results = Vec::new();
        for handle in handles {
            let (amp, result) = handle.await.unwrap();
            results.push((amp, result.unwrap()));
        }

        assert!(!overlapped.load(Ordering::SeqCst), "model was entered concurrently");
        for (amp, segments) in &results {
            if *amp == 0.0 {
                assert!(segments.is_empty());
            } else {
                let expected = tone(*amp, 1.0)
                    .samples
                    .iter()
                    .map(|s| (s.clamp(-1.0, 1.0) * f32::from(i16::MAX)) as i16)
                    .map(i16::unsigned_abs)
                    .max()
                    .unwrap();
                assert_eq!(segments[0].text, format!("peak{expected}"));
            }
        }
        assert_eq!(engine.queue_depth(), 0);
        assert!(scratch_is_empty(scratch.path()));
    }

    #[tokio::test]
    async fn cancelled_waiter_releases_queue_slot() {
        let scratch = tempfile::tempdir().unwrap();
        let mut model = ScriptedModel::new();
        model.delay = Duration::from_millis(300);
        let engine = Arc::new(TranscriptionEngine::new(Box::new(model), scratch.path()));

        let first = {
            let engine = Arc::clone(&engine);
            tokio::spawn(async move { engine.transcribe(tone(0.5, 0.1)).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;

        let second = tokio::time::timeout(
            Duration::from_millis(50),
            engine.transcribe(tone(0.5, 0.1)),
        )
        .await;
        assert!(second.is_err(), "second request should still be queued");
        assert_eq!(engine.queue_depth(), 0);

        assert!(first.await.unwrap().is_ok());
        assert!(scratch_is_empty(scratch.path()));
    }

    #[test]
    fn scratch_wav_roundtrips_through_hound() {
        let dir = tempfile::tempdir().unwrap();
        let file = write_scratch_wav(dir.path(), 16_000, &[0.0, 1.0, -1.0, 2.0]).unwrap();
        let name = file.path().file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("earshot-") && name.ends_with(".wav"), "{name}");

        let mut reader = hound::WavReader::open(file.path()).unwrap();
        assert_eq!(reader.spec().sample_rate, 16_000);
        assert_eq!(reader.spec().channels, 1);
        let samples: Vec<i16> = reader.samples::<i16>().map(Result::unwrap).collect();
        assert_eq!(samples, vec![0, 32_767, -32_767, 32_767]);

        drop(file);
        assert!(scratch_is_empty(dir.path()));
    }
}
