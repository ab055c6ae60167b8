use std::sync::Arc;

use crate::foundation::core::{Resolution, Rgba8};
use crate::foundation::error::{VisError, VisResult};
use crate::scene::model::Scene;

/// A rendered frame as opaque RGBA8 pixels.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FrameRGBA {
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// RGBA8 bytes, tightly packed, row-major. Alpha is always 255.
    pub data: Vec<u8>,
}

impl FrameRGBA {
    /// Frame filled with one color.
    pub fn filled(width: u32, height: u32, color: Rgba8) -> Self {
        let mut data = Vec::with_capacity(width as usize * height as usize * 4);
        for _ in 0..(width as usize * height as usize) {
            data.extend_from_slice(&[color.r, color.g, color.b, 255]);
        }
        Self {
            width,
            height,
            data,
        }
    }

    /// Mean RGB over all pixels.
    pub fn mean_rgb(&self) -> [f64; 3] {
        let n = (self.data.len() / 4).max(1) as f64;
        let mut acc = [0.0f64; 3];
        for px in self.data.chunks_exact(4) {
            for c in 0..3 {
                acc[c] += f64::from(px[c]);
            }
        }
        acc.map(|v| v / n)
    }

    /// Pixel at `(x, y)`.
    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        let i = (y as usize * self.width as usize + x as usize) * 4;
        [
            self.data[i],
            self.data[i + 1],
            self.data[i + 2],
            self.data[i + 3],
        ]
    }
}

/// Frame background.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Background {
    /// Single color.
    Solid(Rgba8),
    /// Vertical gradient from `top` to `bottom`.
    Gradient {
        /// Color of the first row.
        top: Rgba8,
        /// Color of the last row.
        bottom: Rgba8,
    },
}

impl Default for Background {
    fn default() -> Self {
        Self::Gradient {
            top: Rgba8::rgb(80, 80, 80),
            bottom: Rgba8::rgb(70, 70, 70),
        }
    }
}

impl Background {
    /// Color of row `y` out of `height` rows.
    pub fn row_color(self, y: u32, height: u32) -> Rgba8 {
        match self {
            Self::Solid(c) => c,
            Self::Gradient { top, bottom } => {
                let t = if height > 1 {
                    f64::from(y) / f64::from(height - 1)
                } else {
                    0.0
                };
                top.lerp(bottom, t)
            }
        }
    }

    /// Background-only frame (used to fill gaps at index 0).
    pub fn frame(self, resolution: Resolution) -> FrameRGBA {
        let (w, h) = (resolution.width, resolution.height);
        let mut data = Vec::with_capacity(w as usize * h as usize * 4);
        for y in 0..h {
            let c = self.row_color(y, h);
            for _ in 0..w {
                data.extend_from_slice(&[c.r, c.g, c.b, 255]);
            }
        }
        FrameRGBA {
            width: w,
            height: h,
            data,
        }
    }
}

/// Renderer configuration shared by every frame of a run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RenderConfig {
    /// Output raster size.
    pub resolution: Resolution,
    /// Supersampling factor per axis (1..=4).
    pub supersample: u32,
    /// Frame background.
    pub background: Background,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            resolution: Resolution::default(),
            supersample: 1,
            background: Background::default(),
        }
    }
}

impl RenderConfig {
    /// Validate raster parameters.
    pub fn validate(&self) -> VisResult<()> {
        let Resolution { width, height } = self.resolution;
        if width == 0 || height == 0 {
            return Err(VisError::validation(format!(
                "resolution must be non-zero, got {width}x{height}"
            )));
        }
        if !(1..=4).contains(&self.supersample) {
            return Err(VisError::validation(format!(
                "supersample must be in 1..=4, got {}",
                self.supersample
            )));
        }
        let max = u32::from(u16::MAX);
        let fits = |side: u32| side.checked_mul(self.supersample).is_some_and(|s| s <= max);
        if !fits(width) || !fits(height) {
            return Err(VisError::validation(
                "supersampled raster exceeds 65535 pixels per side",
            ));
        }
        Ok(())
    }
}

/// A rasterizer for [`Scene`]s.
///
/// Implementations own their device/context state; the session decides whether one instance
/// serves one worker or is shared behind a lock.
pub trait RenderBackend: Send {
    /// Short backend name for logs and summaries.
    fn name(&self) -> &'static str;

    /// `true` when identical inputs always produce bit-identical frames.
    fn is_deterministic(&self) -> bool;

    /// Rasterize one scene.
    fn render(&mut self, scene: &Scene, cfg: &RenderConfig) -> VisResult<FrameRGBA>;
}

/// Available backend kinds.
///
/// - `Cpu` is always available.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BackendKind {
    /// CPU raster backend powered by `vello_cpu`.
    #[default]
    Cpu,
}

/// Create a rendering backend implementation.
pub fn create_backend(kind: BackendKind) -> VisResult<Box<dyn RenderBackend>> {
    match kind {
        BackendKind::Cpu => Ok(Box::new(crate::render::cpu::CpuBackend::new())),
    }
}

/// Constructor for fresh backend instances (one per worker, or one shared).
pub type BackendFactory = Arc<dyn Fn() -> VisResult<Box<dyn RenderBackend>> + Send + Sync>;

/// Factory producing backends of `kind`.
pub fn backend_factory(kind: BackendKind) -> BackendFactory {
    Arc::new(move || create_backend(kind))
}

#[cfg(test)]
#[path = "../../tests/unit/render/backend.rs"]
mod tests;
