use crate::data::model::{FieldSample, FieldValues, GridGeometry, TimeStep};
use crate::foundation::core::{FrameIndex, Rgba8, Vec3};
use crate::foundation::error::{VisError, VisResult};
use crate::normalize::params::NormalizationParams;
use crate::scene::camera::{CameraMode, Light};
use crate::scene::colormap::ColorRamp;
use crate::scene::contour::iso_segments;
use crate::scene::model::{Legend, Primitive, Scene};
use crate::scene::tracks::Trajectories;

/// Scene construction options (fixed for the whole run).
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SceneOpts {
    /// Camera placement.
    pub camera: CameraMode,
    /// Directional light.
    pub light: Light,
    /// Value-to-color ramp.
    pub colormap: ColorRamp,
    /// Draw scalar grids as a displaced, colored surface.
    pub surface: bool,
    /// Iso-contour levels as fractions of the global value domain.
    pub iso_levels: Vec<f64>,
    /// Contour stroke color.
    pub contour_color: Rgba8,
    /// Contour stroke width in pixels.
    pub contour_width_px: f32,
    /// Horizon glyph radius when a marker carries none, as a fraction of the horizontal extent.
    pub marker_radius_fraction: f64,
    /// Horizon glyph color.
    pub marker_color: Rgba8,
    /// Trail window in simulation time units; `None` keeps the whole history.
    pub trail_length: Option<f64>,
    /// Draw trajectory trails.
    pub trails: bool,
    /// Trail color.
    pub trail_color: Rgba8,
    /// Trail width in pixels.
    pub trail_width_px: f32,
    /// Longest spin arrow as a fraction of the horizontal extent.
    pub spin_fraction: f64,
    /// Spin arrow color.
    pub spin_color: Rgba8,
    /// Point-sample glyph radius as a fraction of the horizontal extent.
    pub point_radius_fraction: f64,
    /// Draw the color legend.
    pub legend: bool,
}

impl Default for SceneOpts {
    fn default() -> Self {
        Self {
            camera: CameraMode::default(),
            light: Light::default(),
            colormap: ColorRamp::default(),
            surface: true,
            iso_levels: Vec::new(),
            contour_color: Rgba8::rgb(240, 240, 240),
            contour_width_px: 1.5,
            marker_radius_fraction: 0.02,
            marker_color: Rgba8::rgb(15, 15, 15),
            trail_length: None,
            trails: true,
            trail_color: Rgba8::rgb(230, 200, 60),
            trail_width_px: 2.0,
            spin_fraction: 0.08,
            spin_color: Rgba8::rgb(220, 60, 60),
            point_radius_fraction: 0.008,
            legend: true,
        }
    }
}

impl SceneOpts {
    /// Validate option ranges.
    pub fn validate(&self) -> VisResult<()> {
        self.camera.validate()?;
        if let Some(bad) = self
            .iso_levels
            .iter()
            .find(|f| !(f.is_finite() && (0.0..=1.0).contains(*f)))
        {
            return Err(VisError::validation(format!(
                "iso levels are fractions of the value domain in [0, 1], got {bad}"
            )));
        }
        if let Some(l) = self.trail_length
            && !(l > 0.0)
        {
            return Err(VisError::validation("trail_length must be > 0"));
        }
        if !self.surface && self.iso_levels.is_empty() {
            return Err(VisError::validation(
                "scalar grids need the surface or at least one iso level",
            ));
        }
        Ok(())
    }
}

/// Maps time-steps into scenes using only the shared, immutable run parameters.
#[derive(Clone, Copy, Debug)]
pub struct SceneBuilder<'a> {
    params: &'a NormalizationParams,
    tracks: &'a Trajectories,
    opts: &'a SceneOpts,
}

impl<'a> SceneBuilder<'a> {
    /// Create a builder over the run-global parameters.
    pub fn new(
        params: &'a NormalizationParams,
        tracks: &'a Trajectories,
        opts: &'a SceneOpts,
    ) -> Self {
        Self {
            params,
            tracks,
            opts,
        }
    }

    /// Build the scene for `step`.
    ///
    /// Returns [`VisError::MissingGeometry`] when the field yields nothing to draw, or when
    /// iso-levels are configured and no contour exists.
    #[tracing::instrument(level = "trace", skip_all, fields(frame = index.0))]
    pub fn build(&self, step: &TimeStep, index: FrameIndex) -> VisResult<Scene> {
        let mut primitives = Vec::new();
        let field_prims = self.field_primitives(step)?;
        if field_prims.is_empty() {
            return Err(VisError::missing_geometry(format!(
                "time-step {} (t={}) has no renderable field samples",
                index.0, step.time
            )));
        }
        primitives.extend(field_prims);
        self.push_tracks(step, &mut primitives);
        Ok(self.scene(step, index, primitives, false))
    }

    /// Background-only scene that still carries markers, trails and the legend.
    pub fn placeholder(&self, step: &TimeStep, index: FrameIndex) -> Scene {
        let mut primitives = Vec::new();
        self.push_tracks(step, &mut primitives);
        self.scene(step, index, primitives, true)
    }

    fn scene(
        &self,
        step: &TimeStep,
        index: FrameIndex,
        primitives: Vec<Primitive>,
        placeholder: bool,
    ) -> Scene {
        Scene {
            index,
            time: step.time,
            camera: self.opts.camera.pose(step.time, self.params),
            light: self.opts.light,
            primitives,
            legend: self.opts.legend.then_some(Legend {
                ramp: self.opts.colormap,
                domain: self.params.value_domain,
            }),
            placeholder,
        }
    }

    fn extent(&self) -> f64 {
        self.params.spatial_bounds.horizontal_extent().max(1e-9)
    }

    fn color(&self, v: f64) -> Rgba8 {
        self.opts.colormap.color(self.params.unit(v))
    }

    fn field_primitives(&self, step: &TimeStep) -> VisResult<Vec<Primitive>> {
        let mut out = Vec::new();
        match (&step.field, step.field.values()) {
            (FieldSample::Grid { geometry, .. }, FieldValues::Scalar(values)) => {
                if self.opts.surface
                    && let Some(mesh) = self.surface(geometry, values)
                {
                    out.push(mesh);
                }
                out.extend(self.contours(step, geometry, values)?);
            }
            (field, FieldValues::Vector(values)) => {
                let positions = field.positions();
                for (p, v) in positions.iter().zip(values) {
                    let m = v.length();
                    if !(p.is_finite() && v.is_finite()) || m <= 0.0 {
                        continue;
                    }
                    out.push(Primitive::Arrow {
                        from: *p,
                        to: *p + *v * self.params.vector_scale,
                        color: self.color(m),
                        width_px: 1.5,
                    });
                }
            }
            (FieldSample::Points { positions, .. }, FieldValues::Scalar(values)) => {
                let radius = self.opts.point_radius_fraction * self.extent();
                for (p, &v) in positions.iter().zip(values) {
                    if !(p.is_finite() && v.is_finite()) {
                        continue;
                    }
                    out.push(Primitive::Glyph {
                        center: *p + Vec3::new(0.0, 0.0, self.height(v)),
                        radius,
                        color: self.color(v),
                    });
                }
            }
        }
        Ok(out)
    }

    fn height(&self, v: f64) -> f64 {
        self.params.clamp_value(v) * self.params.height_scale
    }

    fn surface(&self, geometry: &GridGeometry, values: &[f64]) -> Option<Primitive> {
        let base = geometry.node_positions();
        let positions: Vec<Vec3> = base
            .iter()
            .zip(values)
            .map(|(p, &v)| {
                let z = if v.is_finite() { self.height(v) } else { 0.0 };
                Vec3::new(p.x, p.y, z)
            })
            .collect();
        let colors: Vec<Rgba8> = values.iter().map(|&v| self.color(v)).collect();

        let mut triangles = Vec::new();
        for [a, b, c, d] in geometry.cells() {
            for tri in [[a, b, c], [a, c, d]] {
                if tri.iter().any(|&n| !values[n].is_finite()) {
                    continue;
                }
                // Polar cells collapse to triangles at the center.
                let [p0, p1, p2] = tri.map(|n| base[n]);
                if (p1 - p0).cross(p2 - p0).length() <= 1e-12 {
                    continue;
                }
                triangles.push(tri.map(|n| n as u32));
            }
        }
        if triangles.is_empty() {
            return None;
        }
        Some(Primitive::Mesh {
            positions,
            colors,
            triangles,
        })
    }

    fn contours(
        &self,
        step: &TimeStep,
        geometry: &GridGeometry,
        values: &[f64],
    ) -> VisResult<Vec<Primitive>> {
        if self.opts.iso_levels.is_empty() {
            return Ok(Vec::new());
        }
        let mut out = Vec::new();
        for &fraction in &self.opts.iso_levels {
            let level = self.params.level(fraction);
            let z = self.height(level);
            let segments: Vec<[Vec3; 2]> = iso_segments(geometry, values, level)
                .into_iter()
                .map(|s| s.map(|p| Vec3::new(p.x, p.y, z)))
                .collect();
            if !segments.is_empty() {
                out.push(Primitive::Segments {
                    segments,
                    color: self.opts.contour_color,
                    width_px: self.opts.contour_width_px,
                });
            }
        }
        if out.is_empty() {
            return Err(VisError::missing_geometry(format!(
                "iso levels {:?} yield no contour at t={}",
                self.opts.iso_levels, step.time
            )));
        }
        Ok(out)
    }

    fn push_tracks(&self, step: &TimeStep, out: &mut Vec<Primitive>) {
        let extent = self.extent();
        if self.opts.trails {
            for m in &step.markers {
                let points = self.tracks.trail(&m.label, step.time, self.opts.trail_length);
                if points.len() >= 2 {
                    out.push(Primitive::Polyline {
                        points,
                        color: self.opts.trail_color,
                        width_px: self.opts.trail_width_px,
                    });
                }
            }
        }
        for m in &step.markers {
            if !m.position.is_finite() {
                continue;
            }
            let radius = m
                .radius
                .filter(|r| *r > 0.0 && r.is_finite())
                .unwrap_or(self.opts.marker_radius_fraction * extent);
            out.push(Primitive::Glyph {
                center: m.position,
                radius,
                color: self.opts.marker_color,
            });
            let max_spin = self.tracks.max_spin();
            if let Some(spin) = m.spin
                && spin.is_finite()
                && max_spin > 0.0
                && spin.length() > 0.0
            {
                let scale = self.opts.spin_fraction * extent / max_spin;
                // Start at the horizon surface so the shaft stays visible.
                let from = m.position + spin.normalized().unwrap_or(Vec3::ZERO) * radius;
                out.push(Primitive::Arrow {
                    from,
                    to: from + spin * scale,
                    color: self.opts.spin_color,
                    width_px: 2.0,
                });
            }
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/scene/builder.rs"]
mod tests;
