use crate::foundation::core::Aabb3;
use crate::foundation::error::{VisError, VisResult};

/// Options for the normalization pass.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NormalizeOpts {
    /// Clip the value domain to the `[p, 100 - p]` nearest-rank percentiles.
    pub clip_percentile: Option<f64>,
    /// Widen the domain to be symmetric around zero.
    pub symmetric: bool,
    /// Fixed `[lo, hi]` domain replacing the computed one.
    pub domain_override: Option<[f64; 2]>,
    /// Largest height displacement as a fraction of the horizontal extent.
    pub height_fraction: f64,
    /// Longest vector glyph as a fraction of the horizontal extent.
    pub glyph_fraction: f64,
}

impl Default for NormalizeOpts {
    fn default() -> Self {
        Self {
            clip_percentile: None,
            symmetric: false,
            domain_override: None,
            height_fraction: 0.15,
            glyph_fraction: 0.05,
        }
    }
}

impl NormalizeOpts {
    /// Validate option ranges.
    pub fn validate(&self) -> VisResult<()> {
        if let Some(p) = self.clip_percentile
            && !(p > 0.0 && p < 50.0)
        {
            return Err(VisError::validation(format!(
                "clip percentile must be in (0, 50), got {p}"
            )));
        }
        if let Some([lo, hi]) = self.domain_override
            && !(lo.is_finite() && hi.is_finite() && lo < hi)
        {
            return Err(VisError::validation(format!(
                "domain override must satisfy lo < hi, got [{lo}, {hi}]"
            )));
        }
        for (name, v) in [
            ("height_fraction", self.height_fraction),
            ("glyph_fraction", self.glyph_fraction),
        ] {
            if !(v.is_finite() && v >= 0.0) {
                return Err(VisError::validation(format!(
                    "{name} must be finite and >= 0, got {v}"
                )));
            }
        }
        Ok(())
    }
}

/// Global, immutable constants shared by every scene of a run.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct NormalizationParams {
    /// Value-to-color domain `[lo, hi]`, `lo < hi`.
    pub value_domain: [f64; 2],
    /// Union of sample positions, markers and the height-field extent.
    pub spatial_bounds: Aabb3,
    /// Union of trajectory marker positions, if any.
    pub trajectory_bounds: Option<Aabb3>,
    /// World-units per field unit for height displacement (0 for non-surface fields).
    pub height_scale: f64,
    /// World-units per field unit for vector glyphs (0 for scalar fields).
    pub vector_scale: f64,
    /// First and last step time.
    pub time_range: [f64; 2],
    /// Number of steps the parameters were computed from.
    pub step_count: usize,
}

impl NormalizationParams {
    /// Map a field value to `[0, 1]` over the global domain (clamped). NaN stays NaN.
    pub fn unit(&self, v: f64) -> f64 {
        let [lo, hi] = self.value_domain;
        ((v - lo) / (hi - lo)).clamp(0.0, 1.0)
    }

    /// Clamp a field value into the global domain.
    pub fn clamp_value(&self, v: f64) -> f64 {
        let [lo, hi] = self.value_domain;
        v.clamp(lo, hi)
    }

    /// Domain value at fraction `f` of the domain.
    pub fn level(&self, f: f64) -> f64 {
        let [lo, hi] = self.value_domain;
        lo + (hi - lo) * f
    }
}
