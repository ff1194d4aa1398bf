//! Renderer that shells out to the `ffmpeg` command-line tool.
//!
//! The background is looped, trimmed, cropped, and scaled according to
//! its plan; captions are burned in from an ASS file written next to the
//! story's other artifacts; the narration becomes the audio track.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use anyhow::{Context, Result, bail};

use crate::captions::ass;
use crate::paths::atomic_write;
use crate::pipeline::collaborators::Renderer;
use crate::process::wait_until;
use crate::render::{CaptionTrack, RenderJob};

pub struct FfmpegRenderer {
    pub program: PathBuf,
    pub video_codec: String,
    pub audio_codec: String,
    /// x264 preset, e.g. "veryfast". `None` keeps ffmpeg's default.
    pub preset: Option<String>,
}

impl Default for FfmpegRenderer {
    fn default() -> Self {
        Self {
            program: PathBuf::from("ffmpeg"),
            video_codec: "libx264".to_string(),
            audio_codec: "aac".to_string(),
            preset: None,
        }
    }
}

/// Escape a path for use inside an ffmpeg filter argument.
pub fn escape_filter_path(path: &Path) -> String {
    let mut out = String::new();
    for c in path.to_string_lossy().chars() {
        if matches!(c, '\\' | ':' | '\'' | ',' | '[' | ']' | ';') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

impl FfmpegRenderer {
    /// Write the caption file for `job` and return its path.
    pub fn write_subtitles(&self, job: &RenderJob) -> Result<PathBuf> {
        let plan = &job.background.plan;
        let document = match &job.captions {
            CaptionTrack::Karaoke(frames) => {
                ass::karaoke_document(frames, &job.appearance, plan.output_width, plan.output_height)
            }
            CaptionTrack::Segments(segments) => {
                ass::segments_document(segments, &job.appearance, plan.output_width, plan.output_height)
            }
        };
        let path = job.work_dir.join("captions.ass");
        atomic_write(&path, document.as_bytes())?;
        Ok(path)
    }

    /// Full ffmpeg argument list for `job`, reading captions from `subtitles`.
    pub fn build_args(&self, job: &RenderJob, subtitles: &Path) -> Vec<String> {
        let plan = &job.background.plan;
        let crop = plan.crop;
        let mut args: Vec<String> = vec!["-y".into(), "-hide_banner".into()];

        if plan.loop_count > 1 {
            // -stream_loop counts repeats after the first pass.
            args.push("-stream_loop".into());
            args.push((plan.loop_count - 1).to_string());
        }
        args.push("-i".into());
        args.push(job.background.source.locator.to_string_lossy().into_owned());
        args.push("-i".into());
        args.push(job.audio.to_string_lossy().into_owned());

        let filter = format!(
            "trim=start={:.3}:end={:.3},setpts=PTS-STARTPTS,crop={}:{}:{}:{},scale={}:{},fps={},subtitles=filename={}",
            plan.trim_start,
            plan.trim_end,
            crop.width,
            crop.height,
            crop.x,
            crop.y,
            plan.output_width,
            plan.output_height,
            job.fps,
            escape_filter_path(subtitles),
        );
        args.push("-vf".into());
        args.push(filter);

        for a in ["-map", "0:v:0", "-map", "1:a:0", "-c:v"] {
            args.push(a.into());
        }
        args.push(self.video_codec.clone());
        if let Some(preset) = &self.preset {
            args.push("-preset".into());
            args.push(preset.clone());
        }
        for a in ["-pix_fmt", "yuv420p", "-c:a"] {
            args.push(a.into());
        }
        args.push(self.audio_codec.clone());
        args.push("-t".into());
        args.push(format!("{:.3}", plan.trimmed_duration()));
        args.push(job.output.to_string_lossy().into_owned());
        args
    }
}

impl Renderer for FfmpegRenderer {
    fn render(&self, job: &RenderJob) -> Result<PathBuf> {
        let subtitles = self.write_subtitles(job)?;
        let args = self.build_args(job, &subtitles);
        log::info!("Rendering {} with {}", job.story_id, self.program.display());
        log::debug!("ffmpeg args: {:?}", args);

        let child = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("Failed to run {}", self.program.display()))?;

        let finished = wait_until(child, job.deadline, "ffmpeg")?;
        if !finished.status.success() {
            let tail: Vec<&str> = finished.stderr.lines().rev().take(5).collect();
            bail!(
                "ffmpeg exited with {}: {}",
                finished.status,
                tail.into_iter().rev().collect::<Vec<_>>().join(" | ")
            );
        }
        Ok(job.output.clone())
    }
}
