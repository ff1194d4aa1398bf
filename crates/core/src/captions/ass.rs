//! Advanced SubStation (ASS) export, used to burn captions in with ffmpeg.
//!
//! Karaoke frames become one dialogue line each with the highlighted word
//! recolored inline; plain segments become one line each.

use crate::config::{CaptionAppearance, Rgb};
use crate::types::{CaptionSegment, KaraokeFrame, Timed};

/// `&HAABBGGRR` style color.
fn style_color(c: Rgb) -> String {
    format!("&H00{:02X}{:02X}{:02X}", c.2, c.1, c.0)
}

/// `&HBBGGRR&` inline override color.
fn inline_color(c: Rgb) -> String {
    format!("&H{:02X}{:02X}{:02X}&", c.2, c.1, c.0)
}

/// Format seconds as `H:MM:SS.cc`.
pub fn format_timestamp(seconds: f64) -> String {
    let total_cs = (seconds.max(0.0) * 100.0).round() as u64;
    let cs = total_cs % 100;
    let total_sec = total_cs / 100;
    let s = total_sec % 60;
    let m = (total_sec / 60) % 60;
    let h = total_sec / 3600;
    format!("{}:{:02}:{:02}.{:02}", h, m, s, cs)
}

/// Braces and backslashes start override blocks in ASS.
fn escape(text: &str) -> String {
    text.replace('\\', "/")
        .replace('{', "(")
        .replace('}', ")")
        .replace('\n', "\\N")
}

fn header(appearance: &CaptionAppearance, width: u32, height: u32) -> String {
    let bold = if appearance.bold { -1 } else { 0 };
    format!(
        "[Script Info]\n\
         ScriptType: v4.00+\n\
         PlayResX: {width}\n\
         PlayResY: {height}\n\
         WrapStyle: 0\n\
         ScaledBorderAndShadow: yes\n\
         \n\
         [V4+ Styles]\n\
         Format: Name, Fontname, Fontsize, PrimaryColour, SecondaryColour, OutlineColour, BackColour, Bold, Italic, Underline, StrikeOut, ScaleX, ScaleY, Spacing, Angle, BorderStyle, Outline, Shadow, Alignment, MarginL, MarginR, MarginV, Encoding\n\
         Style: Default,{font},{size},{primary},{secondary},{outline},&H00000000,{bold},0,0,0,100,100,0,0,1,{stroke},0,5,{margin},{margin},0,1\n\
         \n\
         [Events]\n\
         Format: Layer, Start, End, Style, Name, MarginL, MarginR, MarginV, Effect, Text\n",
        font = appearance.font,
        size = appearance.font_size,
        primary = style_color(appearance.color),
        secondary = style_color(appearance.highlight_color),
        outline = style_color(appearance.stroke_color),
        stroke = appearance.stroke_width,
        margin = appearance.side_margin,
    )
}

fn dialogue(start: f64, end: f64, text: &str) -> String {
    format!(
        "Dialogue: 0,{},{},Default,,0,0,0,,{}\n",
        format_timestamp(start),
        format_timestamp(end),
        text
    )
}

/// Segment text with the frame's highlighted word recolored.
fn highlighted_text(frame: &KaraokeFrame, highlight: Rgb) -> String {
    frame
        .words
        .iter()
        .enumerate()
        .map(|(i, word)| {
            if i == frame.highlight_index {
                format!("{{\\c{}}}{}{{\\r}}", inline_color(highlight), escape(word))
            } else {
                escape(word)
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// ASS document for a karaoke schedule.
pub fn karaoke_document(
    frames: &[KaraokeFrame],
    appearance: &CaptionAppearance,
    width: u32,
    height: u32,
) -> String {
    let mut doc = header(appearance, width, height);
    for frame in frames {
        doc.push_str(&dialogue(
            frame.start_time,
            frame.end_time,
            &highlighted_text(frame, appearance.highlight_color),
        ));
    }
    doc
}

/// ASS document with one plain line per segment.
pub fn segments_document(
    segments: &[CaptionSegment],
    appearance: &CaptionAppearance,
    width: u32,
    height: u32,
) -> String {
    let mut doc = header(appearance, width, height);
    for seg in segments {
        doc.push_str(&dialogue(seg.start_time(), seg.end_time(), &escape(&seg.text())));
    }
    doc
}
