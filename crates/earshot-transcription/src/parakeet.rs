//! Parakeet TDT recognition model on ONNX Runtime.
//!
//! ```text
//! scratch WAV → hound → f32 samples
//! → nemo128.onnx (preprocessor) → mel features [1, 128, T]
//! → encoder-model → encoder output [T', 1024]
//! → TDT greedy decode (decoder_joint-model in loop) → timed token ids
//! → vocab lookup + segmentation → segments
//! ```

use std::path::{Path, PathBuf};

use earshot_settings::{ModelVariant, Quantization};
use ort::session::Session;
use tracing::{debug, info};

use crate::decoder;
use crate::engine::{ModelDescriptor, RecognitionModel};
use crate::model::{self, ModelPaths, Vocab};
use crate::segmenter;
use crate::types::{ResultExt, Segment, TranscriptionError};

/// Parakeet models are trained on 16 kHz audio.
pub const PARAKEET_SAMPLE_RATE: u32 = 16_000;

/// Decoder steps are sequential; one thread is enough.
const DECODER_THREADS: usize = 1;

/// The three ONNX sessions plus the vocabulary.
pub struct ParakeetModel {
    preprocessor: Session,
    encoder: Session,
    decoder_joint: Session,
    vocab: Vocab,
    variant: ModelVariant,
    quantization: Quantization,
}

impl ParakeetModel {
    /// Load sessions from `model_dir` on a blocking thread.
    ///
    /// This is CPU-intensive (hundreds of MB of weights) and runs once at
    /// startup.
    pub async fn load(
        model_dir: PathBuf,
        variant: ModelVariant,
        quantization: Quantization,
        intra_threads: usize,
    ) -> Result<Self, TranscriptionError> {
        tokio::task::spawn_blocking(move || {
            Self::load_sessions(&model_dir, variant, quantization, intra_threads)
        })
        .await
        .model("task join")?
    }

    fn load_sessions(
        model_dir: &Path,
        variant: ModelVariant,
        quantization: Quantization,
        intra_threads: usize,
    ) -> Result<Self, TranscriptionError> {
        info!(
            model = variant.as_str(),
            quantization = quantization.as_str(),
            "loading recognition model from {}...",
            model_dir.display()
        );
        let paths = ModelPaths::from_dir(model_dir, quantization);
        let missing = paths.missing();
        if !missing.is_empty() {
            let names: Vec<String> = missing.iter().map(|p| p.display().to_string()).collect();
            return Err(TranscriptionError::ModelNotAvailable(format!(
                "missing model files: {}",
                names.join(", ")
            )));
        }

        let preprocessor = session(&paths.preprocessor, intra_threads, "preprocessor")?;
        let encoder = session(&paths.encoder, intra_threads, "encoder")?;
        let decoder_joint = session(&paths.decoder_joint, DECODER_THREADS, "decoder_joint")?;
        let vocab = model::load_vocab(&paths.vocab)?;

        info!(
            vocab_size = vocab.len(),
            blank_idx = vocab.blank_idx,
            "recognition model loaded"
        );

        Ok(Self {
            preprocessor,
            encoder,
            decoder_joint,
            vocab,
            variant,
            quantization,
        })
    }
}

fn session(path: &Path, threads: usize, name: &str) -> Result<Session, TranscriptionError> {
    let session = Session::builder()
        .model("session builder")?
        .with_intra_threads(threads)
        .model("set threads")?
        .commit_from_file(path)
        .model(&format!("load {name}"))?;
    debug!("loaded {name}");
    Ok(session)
}

/// Read a mono WAV written by the engine into normalized samples.
fn read_samples(wav_path: &Path) -> Result<Vec<f32>, TranscriptionError> {
    let mut reader = hound::WavReader::open(wav_path).engine("open scratch wav")?;
    let spec = reader.spec();
    if spec.channels != 1 || spec.sample_rate != PARAKEET_SAMPLE_RATE {
        return Err(TranscriptionError::Engine(format!(
            "expected mono {PARAKEET_SAMPLE_RATE} Hz audio, got {} channels at {} Hz",
            spec.channels, spec.sample_rate
        )));
    }
    match spec.sample_format {
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<Result<Vec<_>, _>>()
            .engine("read samples"),
        hound::SampleFormat::Int => {
            let max_val = (1i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|sample| sample as f32 / max_val))
                .collect::<Result<Vec<_>, _>>()
                .engine("read samples")
        }
    }
}

impl RecognitionModel for ParakeetModel {
    fn descriptor(&self) -> ModelDescriptor {
        ModelDescriptor {
            name: self.variant.as_str().to_string(),
            quantization: self.quantization.as_str().to_string(),
            sample_rate: PARAKEET_SAMPLE_RATE,
        }
    }

    fn recognize(&mut self, wav_path: &Path) -> Result<Vec<Segment>, TranscriptionError> {
        let samples = read_samples(wav_path)?;
        if samples.is_empty() {
            return Ok(Vec::new());
        }

        let (features, features_len) =
            decoder::run_preprocessor(&mut self.preprocessor, &samples)?;
        debug!("mel features: {:?}, len={}", features.shape(), features_len);

        let encoder_out = decoder::run_encoder(&mut self.encoder, &features, features_len)?;
        debug!("encoder output: {:?}", encoder_out.shape());

        let tokens = decoder::greedy_decode(&encoder_out, &mut self.decoder_joint, &self.vocab)?;
        Ok(segmenter::segments_from_tokens(&tokens, &self.vocab))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[tokio::test]
    async fn load_requires_model_files() {
        let tmp = tempfile::tempdir().unwrap();
        let result = ParakeetModel::load(
            tmp.path().to_path_buf(),
            ModelVariant::ParakeetTdtV3,
            Quantization::Int8,
            1,
        )
        .await;
        assert_matches!(
            result,
            Err(TranscriptionError::ModelNotAvailable(m)) if m.contains("missing model files")
        );
    }

    #[test]
    fn read_samples_rejects_wrong_rate() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("a.wav");
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 8_000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut w = hound::WavWriter::create(&path, spec).unwrap();
        w.write_sample(0i16).unwrap();
        w.finalize().unwrap();
        assert_matches!(read_samples(&path), Err(TranscriptionError::Engine(_)));
    }

    #[test]
    fn read_samples_normalizes_int16() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("b.wav");
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: PARAKEET_SAMPLE_RATE,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut w = hound::WavWriter::create(&path, spec).unwrap();
        w.write_sample(16_384i16).unwrap();
        w.write_sample(-32_768i16).unwrap();
        w.finalize().unwrap();
        assert_eq!(read_samples(&path).unwrap(), vec![0.5, -1.0]);
    }

    // Requires the model download; run with `cargo test --features ort -- --ignored`
    #[tokio::test]
    #[ignore]
    async fn recognizes_silence_as_empty() {
        let dir = model::default_model_dir(ModelVariant::ParakeetTdtV3);
        model::ensure_model(&dir, ModelVariant::ParakeetTdtV3, Quantization::Int8)
            .await
            .unwrap();
        let mut parakeet =
            ParakeetModel::load(dir, ModelVariant::ParakeetTdtV3, Quantization::Int8, 2)
                .await
                .unwrap();

        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("silence.wav");
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: PARAKEET_SAMPLE_RATE,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut w = hound::WavWriter::create(&path, spec).unwrap();
        for _ in 0..PARAKEET_SAMPLE_RATE * 2 {
            w.write_sample(0i16).unwrap();
        }
        w.finalize().unwrap();

        let segments = parakeet.recognize(&path).unwrap();
        assert!(segments.iter().all(|s| s.text.trim().is_empty()) || segments.is_empty());
    }
}
