//! Canonical PCM stream validation.
//!
//! The decoder writes its WAV container to a pipe, so it cannot seek back
//! and patch the RIFF and `data` sizes. Those fields arrive as
//! `0xFFFFFFFF`; symphonia's RIFF reader treats such a `data` chunk as
//! running to the end of the stream. A declared size of `0` is an empty
//! chunk.

use std::io::Cursor;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{CODEC_TYPE_NULL, DecoderOptions};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::types::{CanonicalPcm, TranscriptionError};

/// Only mono streams reach the engine.
pub const REQUIRED_CHANNELS: u16 = 1;

/// Parses decoder output and enforces the canonical rate and channel count.
#[derive(Debug, Clone, Copy)]
pub struct StreamValidator {
    expected_rate: u32,
}

impl StreamValidator {
    /// Validator accepting only `expected_rate` Hz mono streams.
    pub fn new(expected_rate: u32) -> Self {
        Self { expected_rate }
    }

    /// The only sample rate this validator accepts.
    pub fn expected_rate(&self) -> u32 {
        self.expected_rate
    }

    /// Parse a WAV container into normalized mono samples.
    ///
    /// Container problems are reported before format mismatches, and the
    /// sample rate is checked before the channel count. Both are read from
    /// the header; no packet is decoded until they pass.
    pub fn parse(&self, bytes: &[u8]) -> Result<CanonicalPcm, TranscriptionError> {
        let mss = MediaSourceStream::new(Box::new(Cursor::new(bytes.to_vec())), Default::default());
        let mut hint = Hint::new();
        let _ = hint.with_extension("wav");

        let detected = symphonia::default::get_probe()
            .format(
                &hint,
                mss,
                &FormatOptions::default(),
                &MetadataOptions::default(),
            )
            .map_err(|e| malformed(format!("unrecognized container: {e}")))?;
        let mut format = detected.format;

        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| malformed("no audio track"))?;
        let codec_params = track.codec_params.clone();
        let track_id = track.id;

        let sample_rate = codec_params
            .sample_rate
            .ok_or_else(|| malformed("header declares no sample rate"))?;
        let channels = codec_params
            .channels
            .map(|c| c.count())
            .filter(|&n| n > 0)
            .ok_or_else(|| malformed("header declares no channels"))?;

        if sample_rate != self.expected_rate {
            return Err(TranscriptionError::UnexpectedSampleRate {
                got: sample_rate,
                expected: self.expected_rate,
            });
        }
        if channels != usize::from(REQUIRED_CHANNELS) {
            return Err(TranscriptionError::UnexpectedChannelCount {
                got: u16::try_from(channels).unwrap_or(u16::MAX),
                expected: REQUIRED_CHANNELS,
            });
        }

        let mut decoder = symphonia::default::get_codecs()
            .make(&codec_params, &DecoderOptions::default())
            .map_err(|e| malformed(format!("unsupported encoding: {e}")))?;

        let mut samples: Vec<f32> = Vec::new();
        loop {
            let packet = match format.next_packet() {
                Ok(p) => p,
                Err(SymphoniaError::IoError(ref e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    break;
                }
                Err(e) => return Err(malformed(format!("packet read: {e}"))),
            };
            if packet.track_id() != track_id {
                continue;
            }
            if packet.buf().is_empty() {
                break;
            }

            let decoded = decoder
                .decode(&packet)
                .map_err(|e| malformed(format!("decode: {e}")))?;
            let mut buf = SampleBuffer::<f32>::new(decoded.capacity() as u64, *decoded.spec());
            buf.copy_interleaved_ref(decoded);
            samples.extend(buf.samples().iter().map(|s| s.clamp(-1.0, 1.0)));
        }

        Ok(CanonicalPcm {
            sample_rate,
            channels: REQUIRED_CHANNELS,
            samples,
        })
    }
}

fn malformed(msg: impl Into<String>) -> TranscriptionError {
    TranscriptionError::MalformedContainer(msg.into())
}
