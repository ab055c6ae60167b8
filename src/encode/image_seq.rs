use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::Context as _;

use crate::foundation::core::{Fps, FrameIndex, Resolution};
use crate::foundation::error::{VisError, VisResult};
use crate::encode::sink::{FrameSink, SequenceReport, SinkConfig};
use crate::render::backend::FrameRGBA;

/// Manifest tag written next to the frames.
pub const MANIFEST_FORMAT: &str = "bhvis.frames";
/// Manifest file name inside the output directory.
pub const MANIFEST_FILE: &str = "manifest.json";

/// Zero-padding width for `total` frames: `max(5, digits(total - 1))`.
pub fn pad_width(total: u64) -> usize {
    let last = total.saturating_sub(1);
    last.to_string().len().max(5)
}

/// File name of frame `index`.
pub fn frame_file_name(index: u64, pad: usize) -> String {
    format!("frame_{index:0pad$}.png")
}

/// One committed frame file.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ManifestEntry {
    /// Frame index.
    pub index: u64,
    /// File name relative to the sequence directory.
    pub file: String,
    /// xxh3-64 of the RGBA8 pixels, lowercase hex.
    pub xxh3: String,
}

/// Description of a committed image sequence.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct SequenceManifest {
    /// Always [`MANIFEST_FORMAT`].
    pub format: String,
    /// Manifest schema version.
    pub version: u32,
    /// Number of indices in the run.
    pub frame_count: u64,
    /// Zero-padding width of file names.
    pub pad_width: usize,
    /// Playback rate.
    pub fps: Fps,
    /// Frame size.
    pub resolution: Resolution,
    /// Frame files in index order.
    pub frames: Vec<ManifestEntry>,
    /// Indices that failed to render.
    #[serde(default)]
    pub missing: Vec<u64>,
    /// Missing indices filled by duplication.
    #[serde(default)]
    pub filled: Vec<u64>,
}

impl SequenceManifest {
    /// `ffmpeg` input pattern, e.g. `frame_%05d.png`.
    pub fn ffmpeg_pattern(&self) -> String {
        format!("frame_%0{}d.png", self.pad_width)
    }
}

fn pixel_hash(data: &[u8]) -> String {
    format!("{:016x}", xxhash_rust::xxh3::xxh3_64(data))
}

/// Writes numbered PNGs into a staging directory and publishes them atomically.
///
/// Nothing appears at `output` until [`FrameSink::end`]; `abort` and `Drop` remove the staging
/// directory.
#[derive(Debug)]
pub struct ImageSequenceSink {
    output: PathBuf,
    overwrite: bool,
    staging: Option<PathBuf>,
    config: Option<SinkConfig>,
    pad: usize,
    entries: Vec<ManifestEntry>,
}

impl ImageSequenceSink {
    /// Sink publishing to directory `output`.
    pub fn new(output: impl Into<PathBuf>, overwrite: bool) -> Self {
        Self {
            output: output.into(),
            overwrite,
            staging: None,
            config: None,
            pad: 5,
            entries: Vec::new(),
        }
    }

    /// Final output directory.
    pub fn output(&self) -> &Path {
        &self.output
    }

    /// Staging directory while a run is open.
    pub fn staging(&self) -> Option<&Path> {
        self.staging.as_deref()
    }

    fn staging_path(&self) -> PathBuf {
        let name = self
            .output
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "frames".to_owned());
        let staged = format!(".{name}.staging-{}", std::process::id());
        match self.output.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.join(staged),
            _ => PathBuf::from(staged),
        }
    }
}

impl FrameSink for ImageSequenceSink {
    fn begin(&mut self, cfg: &SinkConfig) -> VisResult<()> {
        if self.output.exists() && !self.overwrite {
            return Err(VisError::validation(format!(
                "output directory '{}' already exists",
                self.output.display()
            )));
        }
        let staging = self.staging_path();
        if staging.exists() {
            std::fs::remove_dir_all(&staging)
                .with_context(|| format!("remove stale staging '{}'", staging.display()))?;
        }
        std::fs::create_dir_all(&staging)
            .with_context(|| format!("create staging directory '{}'", staging.display()))?;
        tracing::debug!(staging = %staging.display(), "image sequence staging created");

        self.staging = Some(staging);
        self.config = Some(*cfg);
        self.pad = pad_width(cfg.total_frames);
        self.entries.clear();
        Ok(())
    }

    fn push_frame(&mut self, index: FrameIndex, frame: &FrameRGBA) -> VisResult<()> {
        let (Some(staging), Some(cfg)) = (&self.staging, &self.config) else {
            return Err(VisError::validation("push_frame called before begin"));
        };
        if frame.width != cfg.resolution.width || frame.height != cfg.resolution.height {
            return Err(VisError::validation(format!(
                "frame size mismatch: got {}x{}, expected {}x{}",
                frame.width, frame.height, cfg.resolution.width, cfg.resolution.height
            )));
        }

        let file = frame_file_name(index.0, self.pad);
        let final_path = staging.join(&file);
        let tmp_path = staging.join(format!("{file}.tmp"));
        image::save_buffer_with_format(
            &tmp_path,
            &frame.data,
            frame.width,
            frame.height,
            image::ColorType::Rgba8,
            image::ImageFormat::Png,
        )
        .with_context(|| format!("write png '{}'", tmp_path.display()))?;
        std::fs::rename(&tmp_path, &final_path)
            .with_context(|| format!("rename '{}'", tmp_path.display()))?;

        self.entries.push(ManifestEntry {
            index: index.0,
            file,
            xxh3: pixel_hash(&frame.data),
        });
        Ok(())
    }

    fn end(&mut self, report: &SequenceReport) -> VisResult<()> {
        let (Some(staging), Some(cfg)) = (self.staging.clone(), self.config) else {
            return Err(VisError::validation("end called before begin"));
        };

        let manifest = SequenceManifest {
            format: MANIFEST_FORMAT.to_owned(),
            version: 1,
            frame_count: cfg.total_frames,
            pad_width: self.pad,
            fps: cfg.fps,
            resolution: cfg.resolution,
            frames: self.entries.clone(),
            missing: report.missing.clone(),
            filled: report.filled.clone(),
        };
        let json = serde_json::to_vec_pretty(&manifest)
            .map_err(|e| VisError::validation(format!("serialize manifest: {e}")))?;
        let manifest_path = staging.join(MANIFEST_FILE);
        std::fs::write(&manifest_path, json)
            .with_context(|| format!("write '{}'", manifest_path.display()))?;

        if self.output.exists() {
            std::fs::remove_dir_all(&self.output)
                .with_context(|| format!("replace '{}'", self.output.display()))?;
        }
        if let Some(parent) = self.output.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create '{}'", parent.display()))?;
        }
        std::fs::rename(&staging, &self.output).with_context(|| {
            format!(
                "commit '{}' to '{}'",
                staging.display(),
                self.output.display()
            )
        })?;
        self.staging = None;
        tracing::info!(
            output = %self.output.display(),
            frames = self.entries.len(),
            "image sequence committed"
        );
        Ok(())
    }

    fn abort(&mut self) {
        if let Some(staging) = self.staging.take()
            && let Err(e) = std::fs::remove_dir_all(&staging)
        {
            tracing::warn!(staging = %staging.display(), "failed to remove staging: {e}");
        }
        self.entries.clear();
    }
}

impl Drop for ImageSequenceSink {
    fn drop(&mut self) {
        self.abort();
    }
}

/// Re-read a committed sequence and check it is complete and intact.
///
/// Returns [`VisError::Gap`] for absent indices and [`VisError::Format`] for files that do not
/// decode or whose pixels do not match the manifest hash.
pub fn verify_sequence(dir: &Path) -> VisResult<SequenceManifest> {
    let manifest_path = dir.join(MANIFEST_FILE);
    let text = std::fs::read_to_string(&manifest_path)
        .with_context(|| format!("read '{}'", manifest_path.display()))?;
    let manifest: SequenceManifest = serde_json::from_str(&text)
        .map_err(|e| VisError::format(format!("{}: {e}", manifest_path.display())))?;
    if manifest.format != MANIFEST_FORMAT {
        return Err(VisError::format(format!(
            "{}: unexpected format tag '{}'",
            manifest_path.display(),
            manifest.format
        )));
    }

    let by_index: BTreeMap<u64, &ManifestEntry> =
        manifest.frames.iter().map(|e| (e.index, e)).collect();
    let mut missing = Vec::new();
    for i in 0..manifest.frame_count {
        let Some(entry) = by_index.get(&i) else {
            missing.push(i);
            continue;
        };
        let path = dir.join(&entry.file);
        if !path.is_file() {
            missing.push(i);
            continue;
        }
        let img = image::open(&path)
            .map_err(|e| VisError::format(format!("{}: {e}", path.display())))?
            .to_rgba8();
        if pixel_hash(img.as_raw()) != entry.xxh3 {
            return Err(VisError::format(format!(
                "{}: pixel hash does not match manifest",
                path.display()
            )));
        }
    }
    if !missing.is_empty() {
        return Err(VisError::Gap { missing });
    }
    Ok(manifest)
}

#[cfg(test)]
#[path = "../../tests/unit/encode/image_seq.rs"]
mod tests;
