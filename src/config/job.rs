use std::path::{Path, PathBuf};

use anyhow::Context as _;

use crate::data::adapter::LoadOptions;
use crate::foundation::error::{VisError, VisResult};
use crate::normalize::params::NormalizeOpts;
use crate::render::backend::{BackendKind, RenderConfig};
use crate::scene::builder::SceneOpts;
use crate::session::pipeline::SessionOpts;

/// Where the committed sequence goes and what happens after.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OutputOpts {
    /// Image-sequence directory.
    pub dir: Option<PathBuf>,
    /// Video file encoded from the committed sequence with `ffmpeg`.
    pub video: Option<PathBuf>,
    /// Replace existing output.
    pub overwrite: bool,
    /// Re-read and hash-check the sequence before hand-off.
    pub verify: bool,
}

impl Default for OutputOpts {
    fn default() -> Self {
        Self {
            dir: None,
            video: None,
            overwrite: true,
            verify: true,
        }
    }
}

/// Complete description of one render job.
///
/// Every section is optional in the file; command-line flags are applied on top.
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct JobConfig {
    /// Loader options.
    pub load: LoadOptions,
    /// Normalization options.
    pub normalize: NormalizeOpts,
    /// Scene options.
    pub scene: SceneOpts,
    /// Backend selection.
    pub backend: BackendKind,
    /// Raster options.
    pub render: RenderConfig,
    /// Scheduling and failure handling.
    pub session: SessionOpts,
    /// Output destination.
    pub output: OutputOpts,
}

impl JobConfig {
    /// Parse a JSON config file.
    pub fn from_path(path: &Path) -> VisResult<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("read config '{}'", path.display()))?;
        Self::from_json(&text)
            .map_err(|e| VisError::validation(format!("{}: {e}", path.display())))
    }

    /// Parse a JSON config document.
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Validate every section and their combination.
    pub fn validate(&self) -> VisResult<()> {
        self.normalize.validate()?;
        self.scene.validate()?;
        self.render.validate()?;
        self.session.validate()?;
        if self.output.video.is_some() {
            let r = self.render.resolution;
            if !r.width.is_multiple_of(2) || !r.height.is_multiple_of(2) {
                return Err(VisError::validation(format!(
                    "video output needs even dimensions, got {}x{}",
                    r.width, r.height
                )));
            }
            if self.output.dir.is_none() {
                return Err(VisError::validation(
                    "video output needs an image-sequence directory",
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "../../tests/unit/config/job.rs"]
mod tests;
