use crate::foundation::core::{FrameIndex, Rgba8, Vec3};
use crate::scene::camera::{CameraPose, Light};
use crate::scene::colormap::ColorRamp;

/// A renderable description of exactly one time-step.
///
/// Scenes are plain data: building the same step twice yields equal scenes.
#[derive(Clone, Debug, PartialEq)]
pub struct Scene {
    /// Frame index (equals the time-step index).
    pub index: FrameIndex,
    /// Simulation time of the step.
    pub time: f64,
    /// Camera for this frame.
    pub camera: CameraPose,
    /// Directional light.
    pub light: Light,
    /// Primitives in submission order.
    pub primitives: Vec<Primitive>,
    /// Optional color legend.
    pub legend: Option<Legend>,
    /// `true` when the field geometry was replaced by a placeholder.
    pub placeholder: bool,
}

/// Geometric primitives understood by every backend.
#[derive(Clone, Debug, PartialEq)]
pub enum Primitive {
    /// Triangle mesh with per-vertex colors (height surface).
    Mesh {
        /// Vertex positions.
        positions: Vec<Vec3>,
        /// One color per vertex.
        colors: Vec<Rgba8>,
        /// Vertex index triples.
        triangles: Vec<[u32; 3]>,
    },
    /// Independent line segments (iso-contours).
    Segments {
        /// Segment endpoints.
        segments: Vec<[Vec3; 2]>,
        /// Stroke color.
        color: Rgba8,
        /// Stroke width in output pixels.
        width_px: f32,
    },
    /// Connected path (trajectory trail).
    Polyline {
        /// Path vertices in order.
        points: Vec<Vec3>,
        /// Stroke color.
        color: Rgba8,
        /// Stroke width in output pixels.
        width_px: f32,
    },
    /// Shaded sphere glyph (horizon or point sample).
    Glyph {
        /// Center.
        center: Vec3,
        /// Radius in world units.
        radius: f64,
        /// Base color.
        color: Rgba8,
    },
    /// Arrow from `from` to `to` (spin or vector sample).
    Arrow {
        /// Tail.
        from: Vec3,
        /// Head.
        to: Vec3,
        /// Stroke color.
        color: Rgba8,
        /// Shaft width in output pixels.
        width_px: f32,
    },
}

/// Color bar describing the global value domain.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Legend {
    /// Ramp drawn in the bar.
    pub ramp: ColorRamp,
    /// Domain the ramp spans.
    pub domain: [f64; 2],
}
