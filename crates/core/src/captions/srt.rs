//! SubRip (SRT) subtitle export and parsing.

use anyhow::{Context, Result, bail};

use crate::captions::segment::{SegmentMode, segment};
use crate::error::ValidationError;
use crate::types::{CaptionSegment, Timed, Transcript};

/// One parsed subtitle block.
#[derive(Debug, Clone, PartialEq)]
pub struct SrtCue {
    pub index: usize,
    pub start: f64,
    pub end: f64,
    pub text: String,
}

/// Export a transcript as SRT, one block per fixed-size segment.
pub fn to_srt(transcript: &Transcript, group_size: usize) -> Result<String, ValidationError> {
    let segments = segment(transcript, SegmentMode::FixedSize(group_size))?;
    Ok(segments_to_srt(&segments))
}

/// Render segments as numbered SRT blocks separated by blank lines.
pub fn segments_to_srt(segments: &[CaptionSegment]) -> String {
    let mut out = String::new();
    for (i, seg) in segments.iter().enumerate() {
        out.push_str(&format!(
            "{}\n{} --> {}\n{}\n\n",
            i + 1,
            format_timestamp(seg.start_time()),
            format_timestamp(seg.end_time()),
            seg.text()
        ));
    }
    out
}

/// Format seconds as `HH:MM:SS,mmm`, rounded to the nearest millisecond.
pub fn format_timestamp(seconds: f64) -> String {
    let total_ms = (seconds.max(0.0) * 1000.0).round() as u64;
    let ms = total_ms % 1000;
    let total_sec = total_ms / 1000;
    let s = total_sec % 60;
    let total_min = total_sec / 60;
    let m = total_min % 60;
    let h = total_min / 60;
    format!("{:02}:{:02}:{:02},{:03}", h, m, s, ms)
}

/// Parse an `HH:MM:SS,mmm` timestamp (a `.` separator is also accepted)
/// back into seconds.
pub fn parse_timestamp(value: &str) -> Result<f64> {
    let cleaned = value.trim().replace(',', ".");
    let (clock, fraction) = cleaned.split_once('.').unwrap_or((cleaned.as_str(), "0"));

    let mut hms = clock.split(':');
    let mut next_field = |name: &str| -> Result<u64> {
        hms.next()
            .with_context(|| format!("Timestamp '{value}' is missing {name}"))?
            .parse::<u64>()
            .with_context(|| format!("Invalid {name} in timestamp '{value}'"))
    };
    let hours = next_field("hours")?;
    let minutes = next_field("minutes")?;
    let secs = next_field("seconds")?;
    if hms.next().is_some() {
        bail!("Timestamp has more than three clock fields: {value}");
    }

    let mut millis_str: String = fraction.chars().take(3).collect();
    while millis_str.len() < 3 {
        millis_str.push('0');
    }
    let millis: u64 = millis_str
        .parse()
        .with_context(|| format!("Invalid milliseconds in timestamp '{value}'"))?;

    let total_ms = (hours * 3600 + minutes * 60 + secs) * 1000 + millis;
    Ok(total_ms as f64 / 1000.0)
}

/// Parse SRT text into cues, in file order.
pub fn parse_srt(input: &str) -> Result<Vec<SrtCue>> {
    let mut cues = Vec::new();
    let mut lines = input.lines().peekable();

    while let Some(line) = lines.next() {
        let index_line = line.trim();
        if index_line.is_empty() {
            continue;
        }
        let index: usize = index_line
            .parse()
            .with_context(|| format!("Expected SRT block index, found '{index_line}'"))?;

        let times = lines
            .next()
            .map(str::trim)
            .with_context(|| format!("SRT block {index} is missing a timestamp line"))?;
        let (start_raw, end_raw) = times
            .split_once("-->")
            .with_context(|| format!("SRT block {index} timestamp line must contain '-->'"))?;
        let start = parse_timestamp(start_raw)?;
        let end = parse_timestamp(end_raw)?;
        if end < start {
            bail!("SRT block {index} ends before it starts: {times}");
        }

        let mut text_lines = Vec::new();
        while let Some(next) = lines.peek() {
            if next.trim().is_empty() {
                break;
            }
            text_lines.push(next.trim().to_string());
            lines.next();
        }

        cues.push(SrtCue {
            index,
            start,
            end,
            text: text_lines.join(" "),
        });
    }

    Ok(cues)
}
