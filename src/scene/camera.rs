use crate::foundation::core::Vec3;
use crate::foundation::error::{VisError, VisResult};
use crate::normalize::params::NormalizationParams;

/// How the camera is placed for the whole run.
///
/// Focus and distance always come from the global spatial bounds, never from per-frame data.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "mode", rename_all = "kebab-case")]
pub enum CameraMode {
    /// One pose for every frame.
    Fixed {
        /// Azimuth around +z, degrees from +x.
        #[serde(default = "default_azimuth")]
        azimuth_deg: f64,
        /// Elevation above the z = 0 plane, degrees.
        #[serde(default = "default_elevation")]
        elevation_deg: f64,
        /// Multiplier on the distance that frames the bounding sphere.
        #[serde(default = "default_distance_scale")]
        distance_scale: f64,
        /// Vertical field of view, degrees.
        #[serde(default = "default_fov")]
        fov_deg: f64,
    },
    /// Constant-rate orbit: `azimuth = start + rate * (t - t0)`.
    Orbit {
        /// Azimuth at the first time-step, degrees.
        #[serde(default = "default_azimuth")]
        start_azimuth_deg: f64,
        /// Degrees of azimuth per unit of simulation time.
        #[serde(default = "default_orbit_rate")]
        degrees_per_time: f64,
        /// Elevation above the z = 0 plane, degrees.
        #[serde(default = "default_elevation")]
        elevation_deg: f64,
        /// Multiplier on the distance that frames the bounding sphere.
        #[serde(default = "default_distance_scale")]
        distance_scale: f64,
        /// Vertical field of view, degrees.
        #[serde(default = "default_fov")]
        fov_deg: f64,
    },
}

fn default_azimuth() -> f64 {
    -60.0
}

fn default_elevation() -> f64 {
    35.0
}

fn default_distance_scale() -> f64 {
    1.1
}

fn default_fov() -> f64 {
    30.0
}

fn default_orbit_rate() -> f64 {
    0.1
}

impl Default for CameraMode {
    fn default() -> Self {
        Self::Fixed {
            azimuth_deg: default_azimuth(),
            elevation_deg: default_elevation(),
            distance_scale: default_distance_scale(),
            fov_deg: default_fov(),
        }
    }
}

impl CameraMode {
    /// Check that angles and scales are usable.
    pub fn validate(&self) -> VisResult<()> {
        let (fov, scale, angles) = match *self {
            Self::Fixed {
                azimuth_deg,
                elevation_deg,
                distance_scale,
                fov_deg,
            } => (fov_deg, distance_scale, [azimuth_deg, elevation_deg, 0.0]),
            Self::Orbit {
                start_azimuth_deg,
                degrees_per_time,
                elevation_deg,
                distance_scale,
                fov_deg,
            } => (
                fov_deg,
                distance_scale,
                [start_azimuth_deg, elevation_deg, degrees_per_time],
            ),
        };
        if !(fov > 1.0 && fov < 179.0) {
            return Err(VisError::validation(format!(
                "camera fov must be in (1, 179) degrees, got {fov}"
            )));
        }
        if !(scale > 0.0 && scale.is_finite()) {
            return Err(VisError::validation("camera distance_scale must be > 0"));
        }
        if !angles.iter().all(|a| a.is_finite()) {
            return Err(VisError::validation("camera angles must be finite"));
        }
        Ok(())
    }

    /// Same framing with the mode, azimuth, elevation or orbit rate replaced.
    ///
    /// `orbit: None` keeps the current mode unless a `rate` is given, which implies an orbit.
    pub fn adjusted(
        self,
        orbit: Option<bool>,
        azimuth: Option<f64>,
        elevation: Option<f64>,
        rate: Option<f64>,
    ) -> Self {
        let (az, el, scale, fov, current_rate) = match self {
            Self::Fixed {
                azimuth_deg,
                elevation_deg,
                distance_scale,
                fov_deg,
            } => (azimuth_deg, elevation_deg, distance_scale, fov_deg, None),
            Self::Orbit {
                start_azimuth_deg,
                degrees_per_time,
                elevation_deg,
                distance_scale,
                fov_deg,
            } => (
                start_azimuth_deg,
                elevation_deg,
                distance_scale,
                fov_deg,
                Some(degrees_per_time),
            ),
        };
        let az = azimuth.unwrap_or(az);
        let el = elevation.unwrap_or(el);
        let orbit = orbit.unwrap_or(current_rate.is_some() || rate.is_some());
        if orbit {
            Self::Orbit {
                start_azimuth_deg: az,
                degrees_per_time: rate.or(current_rate).unwrap_or_else(default_orbit_rate),
                elevation_deg: el,
                distance_scale: scale,
                fov_deg: fov,
            }
        } else {
            Self::Fixed {
                azimuth_deg: az,
                elevation_deg: el,
                distance_scale: scale,
                fov_deg: fov,
            }
        }
    }

    /// Camera pose at simulation time `t`.
    pub fn pose(&self, t: f64, params: &NormalizationParams) -> CameraPose {
        let (azimuth, elevation, scale, fov) = match *self {
            Self::Fixed {
                azimuth_deg,
                elevation_deg,
                distance_scale,
                fov_deg,
            } => (azimuth_deg, elevation_deg, distance_scale, fov_deg),
            Self::Orbit {
                start_azimuth_deg,
                degrees_per_time,
                elevation_deg,
                distance_scale,
                fov_deg,
            } => (
                start_azimuth_deg + degrees_per_time * (t - params.time_range[0]),
                elevation_deg,
                distance_scale,
                fov_deg,
            ),
        };

        let bounds = params.spatial_bounds;
        let target = bounds.center();
        let radius = bounds.radius().max(1e-6);
        let distance = radius * scale / (fov.to_radians() * 0.5).sin();

        let (az, el) = (azimuth.to_radians(), elevation.to_radians());
        let dir = Vec3::new(el.cos() * az.cos(), el.cos() * az.sin(), el.sin());
        let up = if el.sin().abs() > 0.999 {
            Vec3::new(0.0, 1.0, 0.0)
        } else {
            Vec3::new(0.0, 0.0, 1.0)
        };

        CameraPose {
            eye: target + dir * distance,
            target,
            up,
            fov_deg: fov,
        }
    }
}

/// A resolved perspective camera.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CameraPose {
    /// Eye position.
    pub eye: Vec3,
    /// Look-at point.
    pub target: Vec3,
    /// Approximate up direction.
    pub up: Vec3,
    /// Vertical field of view, degrees.
    pub fov_deg: f64,
}

/// A point projected to normalized device coordinates.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Projected {
    /// Horizontal NDC, `-1` left to `1` right.
    pub x: f64,
    /// Vertical NDC, `-1` bottom to `1` top.
    pub y: f64,
    /// Distance along the view direction.
    pub depth: f64,
}

impl CameraPose {
    /// Orthonormal `(right, up, forward)` basis.
    pub fn basis(&self) -> (Vec3, Vec3, Vec3) {
        let forward = (self.target - self.eye)
            .normalized()
            .unwrap_or(Vec3::new(0.0, 0.0, -1.0));
        let right = forward
            .cross(self.up)
            .normalized()
            .unwrap_or(Vec3::new(1.0, 0.0, 0.0));
        let up = right.cross(forward);
        (right, up, forward)
    }

    /// Perspective projection for a viewport with `aspect = width / height`.
    ///
    /// Points at or behind the eye plane return `None`.
    pub fn project(&self, p: Vec3, aspect: f64) -> Option<Projected> {
        let (right, up, forward) = self.basis();
        let rel = p - self.eye;
        let depth = rel.dot(forward);
        if !(depth > 1e-9) {
            return None;
        }
        let focal = 1.0 / (self.fov_deg.to_radians() * 0.5).tan();
        Some(Projected {
            x: rel.dot(right) * focal / (depth * aspect),
            y: rel.dot(up) * focal / depth,
            depth,
        })
    }
}

/// Directional light with Phong-style coefficients.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Light {
    /// Direction the light travels.
    pub direction: Vec3,
    /// Ambient term.
    pub ambient: f64,
    /// Diffuse term.
    pub diffuse: f64,
    /// Specular coefficient.
    pub specular: f64,
    /// Specular exponent.
    pub specular_power: f64,
}

impl Default for Light {
    fn default() -> Self {
        Self {
            direction: Vec3::new(0.666, -0.666, -0.666),
            ambient: 0.25,
            diffuse: 0.75,
            specular: 0.13,
            specular_power: 3.2,
        }
    }
}

impl Light {
    /// Shade factor for a surface normal seen from `view` (both pointing away from the surface).
    pub fn intensity(&self, normal: Vec3, view: Vec3) -> f64 {
        let Some(l) = (-self.direction).normalized() else {
            return self.ambient + self.diffuse;
        };
        // Two-sided surface: flip the normal towards the viewer.
        let n = if normal.dot(view) < 0.0 { -normal } else { normal };
        let diffuse = n.dot(l).max(0.0);
        let specular = match (l + view).normalized() {
            Some(h) => n.dot(h).max(0.0).powf(self.specular_power),
            None => 0.0,
        };
        self.ambient + self.diffuse * diffuse + self.specular * specular
    }
}

#[cfg(test)]
#[path = "../../tests/unit/scene/camera.rs"]
mod tests;
