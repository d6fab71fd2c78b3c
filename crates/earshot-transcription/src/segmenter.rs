//! Grouping of decoded tokens into timed segments.

use crate::model::Vocab;
use crate::types::Segment;

/// Encoder output stride: one frame per 80 ms of audio.
pub const FRAME_SECONDS: f64 = 0.08;

/// A silence of this many frames between words starts a new segment.
pub const SEGMENT_GAP_FRAMES: usize = 10;

/// SentencePiece word-boundary marker.
const WORD_MARKER: char = '\u{2581}';

/// A decoded token and the encoder frame it was emitted at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimedToken {
    /// Vocabulary id.
    pub id: usize,
    /// Encoder frame index.
    pub frame: usize,
    /// Frames the decoder advanced after emitting it.
    pub duration: usize,
}

struct Pending {
    text: String,
    start: usize,
    end: usize,
}

impl Pending {
    fn flush(self, out: &mut Vec<Segment>) {
        let text = self.text.replace(WORD_MARKER, " ").trim().to_string();
        if !text.is_empty() {
            out.push(Segment::new(
                self.start as f64 * FRAME_SECONDS,
                self.end as f64 * FRAME_SECONDS,
                text,
            ));
        }
    }
}

/// Build segments from tokens in emission order.
///
/// A segment ends after sentence-final punctuation, or before a word that
/// starts at least [`SEGMENT_GAP_FRAMES`] after the previous token ended.
pub fn segments_from_tokens(tokens: &[TimedToken], vocab: &Vocab) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut pending: Option<Pending> = None;

    for token in tokens {
        let Some(piece) = vocab.tokens.get(token.id) else {
            continue;
        };
        if token.id == vocab.blank_idx {
            continue;
        }

        if let Some(current) = pending.take() {
            let gap = token.frame.saturating_sub(current.end);
            if gap >= SEGMENT_GAP_FRAMES && piece.starts_with(WORD_MARKER) {
                current.flush(&mut segments);
            } else {
                pending = Some(current);
            }
        }

        let current = pending.get_or_insert_with(|| Pending {
            text: String::new(),
            start: token.frame,
            end: token.frame,
        });
        current.text.push_str(piece);
        current.end = current.end.max(token.frame + token.duration.max(1));

        if piece.trim_end().ends_with(['.', '?', '!']) {
            if let Some(done) = pending.take() {
                done.flush(&mut segments);
            }
        }
    }

    if let Some(rest) = pending {
        rest.flush(&mut segments);
    }
    segments
}
