//! Model file management: download from `HuggingFace` and path resolution.

use std::path::{Path, PathBuf};

use earshot_settings::{EngineSettings, ModelVariant, Quantization};

#[cfg(feature = "ort")]
use crate::types::{ResultExt, TranscriptionError};
#[cfg(feature = "ort")]
use tracing::{debug, info, warn};

/// Token emitted when the joint network predicts no output.
pub const BLANK_TOKEN: &str = "<blk>";

/// `HuggingFace` repository holding the ONNX export of `variant`.
pub fn hf_repo(variant: ModelVariant) -> &'static str {
    match variant {
        ModelVariant::ParakeetTdtV2 => "istupakov/parakeet-tdt-0.6b-v2-onnx",
        ModelVariant::ParakeetTdtV3 => "istupakov/parakeet-tdt-0.6b-v3-onnx",
    }
}

/// Typed paths for the model files of one quantization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelPaths {
    /// Mel-spectrogram preprocessor (`nemo128.onnx`).
    pub preprocessor: PathBuf,
    /// Encoder model.
    pub encoder: PathBuf,
    /// Encoder external weights; only the fp32 export has them.
    pub encoder_data: Option<PathBuf>,
    /// Decoder + joint network.
    pub decoder_joint: PathBuf,
    /// Token vocabulary (`vocab.txt`).
    pub vocab: PathBuf,
}

impl ModelPaths {
    /// File names required for `quantization`.
    pub fn file_names(quantization: Quantization) -> &'static [&'static str] {
        match quantization {
            Quantization::Fp32 => &[
                "nemo128.onnx",
                "encoder-model.onnx",
                "encoder-model.onnx.data",
                "decoder_joint-model.onnx",
                "vocab.txt",
            ],
            Quantization::Int8 => &[
                "nemo128.onnx",
                "encoder-model.int8.onnx",
                "decoder_joint-model.int8.onnx",
                "vocab.txt",
            ],
        }
    }

    /// Construct paths for all model files under `dir`.
    pub fn from_dir(dir: impl AsRef<Path>, quantization: Quantization) -> Self {
        let dir = dir.as_ref();
        match quantization {
            Quantization::Fp32 => Self {
                preprocessor: dir.join("nemo128.onnx"),
                encoder: dir.join("encoder-model.onnx"),
                encoder_data: Some(dir.join("encoder-model.onnx.data")),
                decoder_joint: dir.join("decoder_joint-model.onnx"),
                vocab: dir.join("vocab.txt"),
            },
            Quantization::Int8 => Self {
                preprocessor: dir.join("nemo128.onnx"),
                encoder: dir.join("encoder-model.int8.onnx"),
                encoder_data: None,
                decoder_joint: dir.join("decoder_joint-model.int8.onnx"),
                vocab: dir.join("vocab.txt"),
            },
        }
    }

    /// Required files that are not present.
    pub fn missing(&self) -> Vec<&Path> {
        [
            Some(self.preprocessor.as_path()),
            Some(self.encoder.as_path()),
            self.encoder_data.as_deref(),
            Some(self.decoder_joint.as_path()),
            Some(self.vocab.as_path()),
        ]
        .into_iter()
        .flatten()
        .filter(|p| !p.exists())
        .collect()
    }

    /// Check if every required file exists.
    pub fn all_exist(&self) -> bool {
        self.missing().is_empty()
    }
}

/// Default model cache directory, `~/.earshot/models/<variant>`.
pub fn default_model_dir(variant: ModelVariant) -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".into());
    PathBuf::from(home)
        .join(".earshot")
        .join("models")
        .join(variant.as_str())
}

/// Model directory for `settings`: the configured one, else the default.
pub fn model_dir(settings: &EngineSettings) -> PathBuf {
    settings
        .model_dir
        .as_ref()
        .map_or_else(|| default_model_dir(settings.variant), PathBuf::from)
}

/// Check if all required model files exist locally.
pub fn is_model_cached(model_dir: impl AsRef<Path>, quantization: Quantization) -> bool {
    ModelPaths::from_dir(model_dir, quantization).all_exist()
}

/// Download model files from `HuggingFace` if not already cached.
///
/// Files land in `hf-hub`'s cache first and are then copied into `model_dir`.
#[cfg(feature = "ort")]
pub async fn ensure_model(
    model_dir: impl AsRef<Path>,
    variant: ModelVariant,
    quantization: Quantization,
) -> Result<(), TranscriptionError> {
    let model_dir = model_dir.as_ref().to_path_buf();

    if is_model_cached(&model_dir, quantization) {
        debug!("model files already cached at {}", model_dir.display());
        return Ok(());
    }

    info!(
        model = variant.as_str(),
        quantization = quantization.as_str(),
        "downloading model from HuggingFace..."
    );
    std::fs::create_dir_all(&model_dir)?;

    // hf-hub's sync API does blocking HTTP
    let dir = model_dir.clone();
    tokio::task::spawn_blocking(move || download_model_files(&dir, variant, quantization))
        .await
        .model("task join")?
}

#[cfg(feature = "ort")]
fn download_model_files(
    model_dir: &Path,
    variant: ModelVariant,
    quantization: Quantization,
) -> Result<(), TranscriptionError> {
    let api = hf_hub::api::sync::Api::new().model("HF API init")?;
    let repo = api.model(hf_repo(variant).to_string());

    for &filename in ModelPaths::file_names(quantization) {
        let target = model_dir.join(filename);
        if target.exists() {
            debug!("skipping {filename} (already exists)");
            continue;
        }

        info!("downloading {filename}...");
        match repo.get(filename) {
            Ok(cached_path) => {
                if cached_path != target {
                    let _ = std::fs::copy(&cached_path, &target)
                        .model(&format!("copy {filename}"))?;
                }
                debug!("downloaded {filename}");
            }
            Err(e) => {
                warn!("failed to download {filename}: {e}");
                return Err(TranscriptionError::ModelNotAvailable(format!(
                    "download failed for {filename}: {e}"
                )));
            }
        }
    }

    info!("all model files ready at {}", model_dir.display());
    Ok(())
}

/// Token table with the blank index resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Vocab {
    /// Token pieces indexed by id.
    pub tokens: Vec<String>,
    /// Id of the blank token.
    pub blank_idx: usize,
}

impl Vocab {
    /// Parse `vocab.txt`: one `<piece> <id>` per line.
    ///
    /// Lines without a trailing id take their line number as the id. When
    /// no `<blk>` entry exists the blank id is one past the last token.
    pub fn parse(content: &str) -> Self {
        let mut tokens: Vec<String> = Vec::new();
        for (line_no, line) in content.lines().enumerate() {
            if line.is_empty() {
                continue;
            }
            let (piece, id) = match line.rsplit_once(' ') {
                Some((piece, id)) => match id.parse::<usize>() {
                    Ok(id) => (piece, id),
                    Err(_) => (line, line_no),
                },
                None => (line, line_no),
            };
            if tokens.len() <= id {
                tokens.resize(id + 1, String::new());
            }
            tokens[id] = piece.to_string();
        }
        let blank_idx = tokens
            .iter()
            .position(|t| t == BLANK_TOKEN)
            .unwrap_or(tokens.len());
        Self { tokens, blank_idx }
    }

    /// Number of token ids (including the blank when listed).
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    /// True for an empty table.
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

/// Load and parse `vocab.txt`.
#[cfg(feature = "ort")]
pub fn load_vocab(vocab_path: &Path) -> Result<Vocab, TranscriptionError> {
    let content = std::fs::read_to_string(vocab_path).model("read vocab.txt")?;
    let vocab = Vocab::parse(&content);
    if vocab.is_empty() {
        return Err(TranscriptionError::ModelNotAvailable(
            "vocab.txt is empty".into(),
        ));
    }
    Ok(vocab)
}
