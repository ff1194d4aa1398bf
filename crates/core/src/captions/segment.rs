//! Group transcript words into on-screen caption segments.

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::types::{CaptionSegment, Transcript, WordTiming};

/// Default words per segment for fixed-size grouping.
pub const DEFAULT_GROUP_SIZE: usize = 4;

/// Marks that close a sentence.
const SENTENCE_TERMINALS: &[char] = &['.', '?', '!'];

/// Trailing characters ignored when looking for a terminal mark, so
/// `world."` and `(done!)` still close their sentence.
const TRAILING_CLOSERS: &[char] = &['"', '\'', '\u{201d}', '\u{2019}', ')', ']'];

/// How words are grouped into segments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentMode {
    /// Consecutive chunks of N words; the last chunk may be shorter.
    FixedSize(usize),
    /// Close a segment after every word ending in `.`, `?` or `!`.
    Sentence,
    /// Like `Sentence`, but commas also close a segment.
    Clause,
}

impl Default for SegmentMode {
    fn default() -> Self {
        SegmentMode::FixedSize(DEFAULT_GROUP_SIZE)
    }
}

/// Split a transcript into ordered, contiguous caption segments.
///
/// Every word lands in exactly one segment and segment order follows
/// word order. An empty transcript yields no segments.
pub fn segment(
    transcript: &Transcript,
    mode: SegmentMode,
) -> Result<Vec<CaptionSegment>, ValidationError> {
    segment_words(transcript.words(), mode)
}

/// Slice-level variant of [`segment`].
pub fn segment_words(
    words: &[WordTiming],
    mode: SegmentMode,
) -> Result<Vec<CaptionSegment>, ValidationError> {
    match mode {
        SegmentMode::FixedSize(0) => Err(ValidationError::ZeroGroupSize),
        SegmentMode::FixedSize(n) => words
            .chunks(n)
            .map(|chunk| CaptionSegment::new(chunk.to_vec()))
            .collect(),
        SegmentMode::Sentence => split_after(words, SENTENCE_TERMINALS),
        SegmentMode::Clause => split_after(words, &['.', '?', '!', ',']),
    }
}

/// Accumulate words, closing the running segment after any word whose
/// visible text ends in one of `marks`. No lookahead: a short sentence is
/// never merged into its neighbour.
fn split_after(
    words: &[WordTiming],
    marks: &[char],
) -> Result<Vec<CaptionSegment>, ValidationError> {
    let mut segments = Vec::new();
    let mut buffer: Vec<WordTiming> = Vec::new();

    for word in words {
        buffer.push(word.clone());
        if ends_with_mark(word.word(), marks) {
            segments.push(CaptionSegment::new(std::mem::take(&mut buffer))?);
        }
    }

    if !buffer.is_empty() {
        segments.push(CaptionSegment::new(buffer)?);
    }

    Ok(segments)
}

fn ends_with_mark(text: &str, marks: &[char]) -> bool {
    text.trim_end()
        .trim_end_matches(TRAILING_CLOSERS)
        .ends_with(marks)
}
