//! Align a background clip to the narration: loop, trim, and crop.
//!
//! Pure arithmetic; the renderer turns a [`BackgroundPlan`] into actual
//! filter arguments.

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Source and output frame sizes, in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AspectPolicy {
    pub source_width: u32,
    pub source_height: u32,
    pub output_width: u32,
    pub output_height: u32,
}

/// Region of the source frame kept after cropping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CropRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// How a source clip is stretched over `target_duration` seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackgroundPlan {
    pub source_duration: f64,
    pub target_duration: f64,
    /// Copies of the source laid end to end; 0 means a single trimmed pass.
    pub loop_count: u32,
    pub trim_start: f64,
    pub trim_end: f64,
    pub crop: CropRect,
    pub output_width: u32,
    pub output_height: u32,
}

impl BackgroundPlan {
    /// Length of the clip after trimming.
    pub fn trimmed_duration(&self) -> f64 {
        self.trim_end - self.trim_start
    }

    /// Length of the untrimmed material (one pass or all loop copies).
    pub fn covered_duration(&self) -> f64 {
        if self.loop_count == 0 {
            self.source_duration
        } else {
            self.loop_count as f64 * self.source_duration
        }
    }
}

/// Plan how to cover `target_duration` seconds with a source clip of
/// `source_duration` seconds.
///
/// A long enough source is trimmed once. A shorter one is repeated
/// `ceil(target / source)` times and the concatenation trimmed to the
/// target. The crop keeps the center of the source and removes the
/// excess of whichever dimension is too long for the output aspect.
pub fn plan(
    source_duration: f64,
    target_duration: f64,
    aspect: AspectPolicy,
) -> Result<BackgroundPlan, ValidationError> {
    if !source_duration.is_finite() || source_duration <= 0.0 {
        return Err(ValidationError::NonPositiveSourceDuration(source_duration));
    }
    if !target_duration.is_finite() || target_duration <= 0.0 {
        return Err(ValidationError::NonPositiveTargetDuration(target_duration));
    }

    let loop_count = if source_duration >= target_duration {
        0
    } else {
        let n = (target_duration / source_duration).ceil() as u32;
        // Division can land just under an integer; never come up short.
        if n as f64 * source_duration < target_duration {
            n + 1
        } else {
            n
        }
    };

    Ok(BackgroundPlan {
        source_duration,
        target_duration,
        loop_count,
        trim_start: 0.0,
        trim_end: target_duration,
        crop: center_crop(aspect)?,
        output_width: aspect.output_width,
        output_height: aspect.output_height,
    })
}

/// Largest centered rectangle of the source with the output aspect ratio.
pub fn center_crop(aspect: AspectPolicy) -> Result<CropRect, ValidationError> {
    let AspectPolicy {
        source_width: sw,
        source_height: sh,
        output_width: ow,
        output_height: oh,
    } = aspect;
    if sw == 0 || sh == 0 {
        return Err(ValidationError::ZeroDimensions { width: sw, height: sh });
    }
    if ow == 0 || oh == 0 {
        return Err(ValidationError::ZeroDimensions { width: ow, height: oh });
    }

    // Compare sw/sh with ow/oh without floating point.
    let source_side = sw as u64 * oh as u64;
    let output_side = sh as u64 * ow as u64;

    let rect = if source_side > output_side {
        // Too wide: keep full height, trim left and right.
        let width = (output_side / oh as u64) as u32;
        CropRect {
            x: (sw - width) / 2,
            y: 0,
            width,
            height: sh,
        }
    } else if source_side < output_side {
        // Too tall: keep full width, trim top and bottom.
        let height = (source_side / ow as u64) as u32;
        CropRect {
            x: 0,
            y: (sh - height) / 2,
            width: sw,
            height,
        }
    } else {
        CropRect {
            x: 0,
            y: 0,
            width: sw,
            height: sh,
        }
    };
    Ok(rect)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn portrait_from(sw: u32, sh: u32) -> AspectPolicy {
        AspectPolicy {
            source_width: sw,
            source_height: sh,
            output_width: 1080,
            output_height: 1920,
        }
    }

    #[test]
    fn test_short_source_loops() {
        let p = plan(10.0, 25.0, portrait_from(1920, 1080)).unwrap();
        assert_eq!(p.loop_count, 3);
        assert_eq!(p.trimmed_duration(), 25.0);
        assert!(p.covered_duration() >= p.target_duration);
    }

    #[test]
    fn test_long_source_single_trim() {
        let p = plan(60.0, 25.0, portrait_from(1080, 1920)).unwrap();
        assert_eq!(p.loop_count, 0);
        assert_eq!((p.trim_start, p.trim_end), (0.0, 25.0));
    }

    #[test]
    fn test_equal_durations_do_not_loop() {
        let p = plan(25.0, 25.0, portrait_from(1080, 1920)).unwrap();
        assert_eq!(p.loop_count, 0);
    }

    #[test]
    fn test_exact_multiple() {
        let p = plan(5.0, 20.0, portrait_from(1080, 1920)).unwrap();
        assert_eq!(p.loop_count, 4);
        assert_eq!(p.trimmed_duration(), 20.0);
    }

    #[test]
    fn test_trimmed_duration_always_target() {
        let sources = [0.3, 1.0, 7.5, 10.0, 33.3, 120.0];
        let targets = [0.1, 2.0, 25.0, 59.97, 600.0];
        for &s in &sources {
            for &t in &targets {
                let p = plan(s, t, portrait_from(1920, 1080)).unwrap();
                assert_eq!(p.trimmed_duration(), t);
                assert!(p.covered_duration() >= t);
                if s >= t {
                    assert_eq!(p.loop_count, 0);
                }
            }
        }
    }

    #[test]
    fn test_rejects_bad_durations() {
        let a = portrait_from(1920, 1080);
        assert_eq!(plan(0.0, 5.0, a), Err(ValidationError::NonPositiveSourceDuration(0.0)));
        assert_eq!(plan(-1.0, 5.0, a), Err(ValidationError::NonPositiveSourceDuration(-1.0)));
        assert!(plan(f64::NAN, 5.0, a).is_err());
        assert_eq!(plan(5.0, 0.0, a), Err(ValidationError::NonPositiveTargetDuration(0.0)));
    }

    #[test]
    fn test_landscape_crops_sides() {
        let c = center_crop(portrait_from(1920, 1080)).unwrap();
        // 1080 * 1080 / 1920 = 607.5
        assert_eq!(c, CropRect { x: 656, y: 0, width: 607, height: 1080 });
        let right = 1920 - c.x - c.width;
        assert!(right.abs_diff(c.x) <= 1);
    }

    #[test]
    fn test_tall_source_crops_top_and_bottom() {
        let c = center_crop(portrait_from(1000, 2000)).unwrap();
        // 1000 * 1920 / 1080 = 1777.7
        assert_eq!(c.width, 1000);
        assert_eq!(c.height, 1777);
        assert_eq!(c.y, 111);
        let bottom = 2000 - c.y - c.height;
        assert!(bottom.abs_diff(c.y) <= 1);
    }

    #[test]
    fn test_matching_aspect_keeps_frame() {
        let c = center_crop(portrait_from(720, 1280)).unwrap();
        assert_eq!(c, CropRect { x: 0, y: 0, width: 720, height: 1280 });
    }

    #[test]
    fn test_zero_dimensions() {
        assert_eq!(
            center_crop(portrait_from(0, 1080)),
            Err(ValidationError::ZeroDimensions { width: 0, height: 1080 })
        );
    }
}
