use std::io::Read as _;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use anyhow::Context as _;

use crate::encode::image_seq::SequenceManifest;
use crate::foundation::core::{Fps, Resolution};
use crate::foundation::error::{VisError, VisResult};

/// Hand-off parameters for turning a committed frame directory into a video.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EncodeConfig {
    /// Committed image-sequence directory.
    pub frames_dir: PathBuf,
    /// Zero-padding width of frame file names.
    pub pad_width: usize,
    /// Playback rate.
    pub fps: Fps,
    /// Frame size.
    pub resolution: Resolution,
    /// Video file to produce.
    pub out_path: PathBuf,
    /// Replace an existing video.
    pub overwrite: bool,
}

impl EncodeConfig {
    /// Config derived from a verified sequence manifest.
    pub fn from_manifest(
        frames_dir: impl Into<PathBuf>,
        manifest: &SequenceManifest,
        out_path: impl Into<PathBuf>,
        overwrite: bool,
    ) -> Self {
        Self {
            frames_dir: frames_dir.into(),
            pad_width: manifest.pad_width,
            fps: manifest.fps,
            resolution: manifest.resolution,
            out_path: out_path.into(),
            overwrite,
        }
    }

    /// Check the settings `libx264`/`yuv420p` can accept.
    pub fn validate(&self) -> VisResult<()> {
        let Resolution { width, height } = self.resolution;
        if width == 0 || height == 0 {
            return Err(VisError::validation("encode width/height must be non-zero"));
        }
        if !width.is_multiple_of(2) || !height.is_multiple_of(2) {
            return Err(VisError::validation(
                "encode width/height must be even (required for yuv420p output)",
            ));
        }
        if self.fps.den == 0 || self.fps.num == 0 {
            return Err(VisError::validation("encode fps must be non-zero"));
        }
        Ok(())
    }

    /// Input pattern inside `frames_dir`.
    pub fn input_pattern(&self) -> PathBuf {
        self.frames_dir.join(format!("frame_%0{}d.png", self.pad_width))
    }
}

/// `true` when an `ffmpeg` binary answers `-version`.
pub fn is_ffmpeg_on_path() -> bool {
    Command::new("ffmpeg")
        .arg("-version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

fn ensure_parent_dir(path: &Path) -> VisResult<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create output directory '{}'", parent.display()))?;
    }
    Ok(())
}

/// Runs the system `ffmpeg` over a numbered PNG sequence.
#[derive(Clone, Debug)]
pub struct FfmpegEncoder {
    cfg: EncodeConfig,
}

impl FfmpegEncoder {
    /// Validated encoder.
    pub fn new(cfg: EncodeConfig) -> VisResult<Self> {
        cfg.validate()?;
        Ok(Self { cfg })
    }

    /// Full argument list passed to `ffmpeg`.
    pub fn args(&self) -> Vec<String> {
        let cfg = &self.cfg;
        let mut args = vec![
            if cfg.overwrite { "-y" } else { "-n" }.to_owned(),
            "-loglevel".to_owned(),
            "error".to_owned(),
            "-framerate".to_owned(),
            cfg.fps.to_ffmpeg_arg(),
            "-start_number".to_owned(),
            "0".to_owned(),
            "-i".to_owned(),
            cfg.input_pattern().to_string_lossy().into_owned(),
        ];
        args.extend(
            [
                "-an",
                "-c:v",
                "libx264",
                "-pix_fmt",
                "yuv420p",
                "-movflags",
                "+faststart",
            ]
            .map(str::to_owned),
        );
        args.push(cfg.out_path.to_string_lossy().into_owned());
        args
    }

    /// Encode; a non-zero exit becomes an error carrying ffmpeg's stderr.
    #[tracing::instrument(skip(self), fields(out = %self.cfg.out_path.display()))]
    pub fn run(&self) -> VisResult<()> {
        ensure_parent_dir(&self.cfg.out_path)?;
        if !self.cfg.overwrite && self.cfg.out_path.exists() {
            return Err(VisError::validation(format!(
                "output file '{}' already exists",
                self.cfg.out_path.display()
            )));
        }
        if !is_ffmpeg_on_path() {
            return Err(anyhow::anyhow!(
                "ffmpeg is required for video encoding, but was not found on PATH"
            )
            .into());
        }

        let mut child = Command::new("ffmpeg")
            .args(self.args())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .context("failed to spawn ffmpeg")?;

        // Drained on a thread; a full stderr pipe would stall the child.
        let stderr = child.stderr.take();
        let drain = std::thread::spawn(move || {
            let mut buf = String::new();
            if let Some(mut s) = stderr {
                let _ = s.read_to_string(&mut buf);
            }
            buf
        });

        let status = child.wait().context("failed to wait for ffmpeg")?;
        let stderr = drain.join().unwrap_or_default();
        if !status.success() {
            return Err(
                anyhow::anyhow!("ffmpeg exited with status {status}: {}", stderr.trim()).into(),
            );
        }
        tracing::info!("video encoded");
        Ok(())
    }
}

#[cfg(test)]
#[path = "../../tests/unit/encode/ffmpeg.rs"]
mod tests;
