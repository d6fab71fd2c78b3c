//! Preprocessor, encoder, and TDT greedy decoding for the `parakeet-tdt` models.
//!
//! ONNX tensor shapes use `i64` dimensions while Rust indexing needs `usize`.
//! These casts are safe because tensor dimensions are always small positive values.

use ndarray::{Array2, Array3, Axis};
use ort::session::Session;
use ort::value::Tensor;
use tracing::debug;

use crate::model::Vocab;
use crate::segmenter::TimedToken;
use crate::types::{ResultExt, TranscriptionError};

/// TDT duration buckets: how many encoder frames to advance per step.
pub const DURATIONS: [usize; 5] = [0, 1, 2, 3, 4];

/// Prediction network LSTM layout: `[layers, batch, hidden]`.
const STATE_LAYERS: usize = 2;
const STATE_DIM: usize = 640;

/// Tokens the decoder may emit without advancing a frame.
const MAX_TOKENS_PER_FRAME: usize = 10;

/// Greedy TDT decoding over `encoder_out` (`[T, hidden]`).
///
/// The `decoder_joint` network takes one encoder frame, the previous token
/// and the LSTM states, and returns token logits followed by duration
/// logits. Non-blank tokens are emitted with the frame they were read at;
/// the predicted duration decides how far to advance.
pub fn greedy_decode(
    encoder_out: &Array2<f32>,
    decoder_joint: &mut Session,
    vocab: &Vocab,
) -> Result<Vec<TimedToken>, TranscriptionError> {
    let time_steps = encoder_out.shape()[0];
    let hidden_dim = encoder_out.shape()[1];
    let vocab_size = vocab.len().max(vocab.blank_idx + 1);
    let state_len = STATE_LAYERS * STATE_DIM;
    let state_shape = [STATE_LAYERS as i64, 1, STATE_DIM as i64];

    let mut tokens: Vec<TimedToken> = Vec::new();
    let mut prev_token = vocab.blank_idx;
    let mut state1 = vec![0.0f32; state_len];
    let mut state2 = vec![0.0f32; state_len];
    let mut step = 0;
    let mut emitted_here = 0;

    while step < time_steps {
        // Encoder frame: [1, hidden, 1]
        let frame: Vec<f32> = encoder_out.row(step).to_vec();
        let encoder_input = Tensor::from_array(([1i64, hidden_dim as i64, 1], frame))
            .engine("encoder frame tensor")?;
        let target =
            Tensor::from_array(([1i64, 1], vec![prev_token as i64])).engine("target tensor")?;
        let target_length =
            Tensor::from_array(([1i64], vec![1i64])).engine("target_length tensor")?;
        let s1 = Tensor::from_array((state_shape, state1.clone())).engine("state1 tensor")?;
        let s2 = Tensor::from_array((state_shape, state2.clone())).engine("state2 tensor")?;

        let outputs = decoder_joint
            .run(ort::inputs![
                "encoder_outputs" => encoder_input,
                "targets" => target,
                "target_length" => target_length,
                "input_states_1" => s1,
                "input_states_2" => s2,
            ])
            .engine("decoder_joint run")?;

        let (_, logits) = outputs["outputs"]
            .try_extract_tensor::<f32>()
            .engine("extract logits")?;
        if logits.len() < vocab_size + DURATIONS.len() {
            return Err(TranscriptionError::Engine(format!(
                "logits too short: {} < {} + {}",
                logits.len(),
                vocab_size,
                DURATIONS.len()
            )));
        }

        let token = argmax(&logits[..vocab_size]);
        let advance = DURATIONS[argmax(&logits[vocab_size..vocab_size + DURATIONS.len()])];

        if token != vocab.blank_idx {
            // States only move forward when a token is emitted
            let (_, s1_data) = outputs["output_states_1"]
                .try_extract_tensor::<f32>()
                .engine("extract state1")?;
            state1 = s1_data.to_vec();
            let (_, s2_data) = outputs["output_states_2"]
                .try_extract_tensor::<f32>()
                .engine("extract state2")?;
            state2 = s2_data.to_vec();

            tokens.push(TimedToken {
                id: token,
                frame: step,
                duration: advance,
            });
            prev_token = token;
            emitted_here += 1;
        }

        if advance > 0 {
            step += advance;
            emitted_here = 0;
        } else if token == vocab.blank_idx || emitted_here >= MAX_TOKENS_PER_FRAME {
            step += 1;
            emitted_here = 0;
        }
    }

    debug!("decoded {} tokens from {} frames", tokens.len(), time_steps);
    Ok(tokens)
}

/// Find the index of the maximum value in a slice.
fn argmax(slice: &[f32]) -> usize {
    slice
        .iter()
        .enumerate()
        .max_by(|(_, a), (_, b)| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal))
        .map_or(0, |(i, _)| i)
}

/// Run the encoder on mel features `[1, 128, T]`.
///
/// The encoder emits `[1, hidden, T']`; the result is transposed to
/// `[T', hidden]` and cut to the valid length.
pub fn run_encoder(
    encoder: &mut Session,
    features: &Array3<f32>,
    features_len: i64,
) -> Result<Array2<f32>, TranscriptionError> {
    let shape = features.shape();
    let flat: Vec<f32> = features.iter().copied().collect();
    let audio_signal =
        Tensor::from_array(([shape[0] as i64, shape[1] as i64, shape[2] as i64], flat))
            .engine("encoder audio_signal tensor")?;
    let length =
        Tensor::from_array(([1i64], vec![features_len])).engine("encoder length tensor")?;

    let outputs = encoder
        .run(ort::inputs![
            "audio_signal" => audio_signal,
            "length" => length,
        ])
        .engine("encoder run")?;

    let (enc_shape, enc_data) = outputs["outputs"]
        .try_extract_tensor::<f32>()
        .engine("extract encoder output")?;
    let (_, enc_len_data) = outputs["encoded_lengths"]
        .try_extract_tensor::<i64>()
        .engine("extract encoded_lengths")?;

    let hidden = enc_shape[1] as usize;
    let frames = enc_shape[2] as usize;
    let valid = (enc_len_data.first().copied().unwrap_or(0).max(0) as usize).min(frames);

    let batch = Array3::from_shape_vec((1, hidden, frames), enc_data.to_vec())
        .engine("reshape encoder")?;
    let out = batch
        .index_axis(Axis(0), 0)
        .t()
        .slice(ndarray::s![..valid, ..])
        .to_owned();
    Ok(out)
}

/// Run the mel preprocessor on raw waveform samples (`[1, N]`, 16 kHz).
pub fn run_preprocessor(
    preprocessor: &mut Session,
    samples: &[f32],
) -> Result<(Array3<f32>, i64), TranscriptionError> {
    let n = samples.len();
    let waveform =
        Tensor::from_array(([1i64, n as i64], samples.to_vec())).engine("waveform tensor")?;
    let waveform_lens =
        Tensor::from_array(([1i64], vec![n as i64])).engine("waveform_lens tensor")?;

    let outputs = preprocessor
        .run(ort::inputs![
            "waveforms" => waveform,
            "waveforms_lens" => waveform_lens,
        ])
        .engine("preprocessor run")?;

    let (feat_shape, feat_data) = outputs["features"]
        .try_extract_tensor::<f32>()
        .engine("extract features")?;
    let (_, feat_len_data) = outputs["features_lens"]
        .try_extract_tensor::<i64>()
        .engine("extract features_lens")?;
    let feat_len = feat_len_data.first().copied().unwrap_or(0);

    let out = Array3::from_shape_vec(
        (
            feat_shape[0] as usize,
            feat_shape[1] as usize,
            feat_shape[2] as usize,
        ),
        feat_data.to_vec(),
    )
    .engine("reshape features")?;

    Ok((out, feat_len))
}
