//! Word-by-word highlight schedule for karaoke captions.
//!
//! Each segment yields one frame per word. Frame `i` shows the whole
//! segment text with word `i` highlighted, from the moment word `i`
//! starts until the next word starts (the last frame runs to the end of
//! the last word). For back-to-back word timings this is exactly
//! `[word.start, word.end)`; gaps between words keep the previous word
//! lit, overlaps hand the highlight over as soon as the next word starts.
//!
//! Zero-width frames are never emitted. Every frame is at least
//! [`MIN_FRAME_SECONDS`] wide; the width is borrowed from neighbouring
//! frames, first later ones and then earlier ones, so no frame runs past
//! the time limit and no two segments are on screen at once. Only when
//! the whole schedule has less than `MIN_FRAME_SECONDS` per word does the
//! minimum shrink to an even share of the available time.

use crate::error::ValidationError;
use crate::types::{CaptionSegment, KaraokeFrame, Timed, WordTiming};

/// Smallest duration a highlight frame may have.
pub const MIN_FRAME_SECONDS: f64 = 0.01;

/// Build the highlight frames for one segment. Frames never end after the
/// segment's last word.
pub fn build_schedule(segment: &CaptionSegment) -> Result<Vec<KaraokeFrame>, ValidationError> {
    build_schedules(std::slice::from_ref(segment), segment.end_time())
}

/// Build highlight frames for every segment, in order, ending no later
/// than `limit` (the audio duration).
pub fn build_schedules(
    segments: &[CaptionSegment],
    limit: f64,
) -> Result<Vec<KaraokeFrame>, ValidationError> {
    if segments.iter().any(CaptionSegment::is_empty) {
        return Err(ValidationError::EmptySegment);
    }
    if segments.is_empty() {
        return Ok(Vec::new());
    }

    let (spans, min_width) = fit_spans(segments, limit);
    let mut frames = Vec::with_capacity(segments.iter().map(CaptionSegment::len).sum());
    for (segment, (start, end)) in segments.iter().zip(spans) {
        if start != segment.start_time() || end != segment.end_time() {
            log::debug!(
                "Moved caption '{}' from {:.3}-{:.3}s to {:.3}-{:.3}s",
                segment.text(),
                segment.start_time(),
                segment.end_time(),
                start,
                end
            );
        }
        frames.extend(segment_frames(segment.words(), start, end, min_width));
    }
    Ok(frames)
}

/// Same as [`build_schedule`] for a bare word slice; an empty slice is an
/// error rather than an empty schedule.
pub fn build_schedule_for_words(words: &[WordTiming]) -> Result<Vec<KaraokeFrame>, ValidationError> {
    build_schedule(&CaptionSegment::new(words.to_vec())?)
}

/// On-screen span of each segment plus the minimum frame width in use.
///
/// Segments keep their own span unless they overlap the previous one or
/// are too short for their words; in that case they push later segments
/// back, and anything pushed past `limit` is pulled forward again.
fn fit_spans(segments: &[CaptionSegment], limit: f64) -> (Vec<(f64, f64)>, f64) {
    let total_words: usize = segments.iter().map(CaptionSegment::len).sum();
    let floor = segments[0].start_time().min(0.0);
    let limit = limit.max(floor);
    let min_width = MIN_FRAME_SECONDS.min((limit - floor) / total_words as f64);

    let mut spans: Vec<(f64, f64)> = segments
        .iter()
        .map(|s| (s.start_time(), s.end_time()))
        .collect();

    let mut previous_end = floor;
    for (segment, span) in segments.iter().zip(spans.iter_mut()) {
        let need = segment.len() as f64 * min_width;
        span.0 = span.0.max(previous_end);
        span.1 = span.1.max(span.0 + need);
        previous_end = span.1;
    }

    let mut next_start = limit;
    for (segment, span) in segments.iter().zip(spans.iter_mut()).rev() {
        let need = segment.len() as f64 * min_width;
        span.1 = span.1.min(next_start);
        span.0 = span.0.min(span.1 - need).max(floor).min(span.1);
        next_start = span.0;
    }

    (spans, min_width)
}

/// Frames tiling `[start, end)` for one segment's words.
fn segment_frames(words: &[WordTiming], start: f64, end: f64, min_width: f64) -> Vec<KaraokeFrame> {
    let texts: Vec<String> = words.iter().map(|w| w.word().to_string()).collect();
    let text = texts.join(" ");

    // bounds[i]..bounds[i + 1] is frame i.
    let n = words.len();
    let mut bounds = Vec::with_capacity(n + 1);
    bounds.push(start);
    bounds.extend(words[1..].iter().map(|w| w.start_time().max(start).min(end)));
    bounds.push(end);
    for i in 1..n {
        bounds[i] = bounds[i].max(bounds[i - 1] + min_width);
    }
    for i in (1..n).rev() {
        bounds[i] = bounds[i].min(bounds[i + 1] - min_width);
    }

    (0..n)
        .map(|i| KaraokeFrame {
            text: text.clone(),
            words: texts.clone(),
            highlight_index: i,
            start_time: bounds[i],
            end_time: bounds[i + 1],
        })
        .collect()
}
