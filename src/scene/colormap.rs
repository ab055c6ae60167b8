use crate::foundation::core::Rgba8;

/// Built-in value-to-color ramps.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ColorMap {
    /// Perceptually uniform blue-green-yellow.
    #[default]
    Viridis,
    /// Perceptually uniform black-red-yellow.
    Inferno,
    /// Diverging blue-white-red, suited to signed wave data.
    Coolwarm,
    /// Black to white.
    Grayscale,
}

const VIRIDIS: [[u8; 3]; 9] = [
    [68, 1, 84],
    [71, 44, 122],
    [59, 81, 139],
    [44, 113, 142],
    [33, 144, 141],
    [39, 173, 129],
    [92, 200, 99],
    [170, 220, 50],
    [253, 231, 37],
];

const INFERNO: [[u8; 3]; 9] = [
    [0, 0, 4],
    [31, 12, 72],
    [85, 15, 109],
    [136, 34, 106],
    [186, 54, 85],
    [227, 89, 51],
    [249, 140, 10],
    [249, 201, 50],
    [252, 255, 164],
];

const COOLWARM: [[u8; 3]; 5] = [
    [59, 76, 192],
    [144, 178, 254],
    [221, 221, 221],
    [245, 156, 125],
    [180, 4, 38],
];

const GRAYSCALE: [[u8; 3]; 2] = [[0, 0, 0], [255, 255, 255]];

impl ColorMap {
    fn stops(self) -> &'static [[u8; 3]] {
        match self {
            Self::Viridis => &VIRIDIS,
            Self::Inferno => &INFERNO,
            Self::Coolwarm => &COOLWARM,
            Self::Grayscale => &GRAYSCALE,
        }
    }

    /// Color at `t` in `[0, 1]` (clamped; NaN maps to the low end).
    pub fn sample(self, t: f64) -> Rgba8 {
        let stops = self.stops();
        let t = if t.is_nan() { 0.0 } else { t.clamp(0.0, 1.0) };
        let x = t * (stops.len() - 1) as f64;
        let i = (x.floor() as usize).min(stops.len() - 2);
        let f = x - i as f64;
        let [r0, g0, b0] = stops[i];
        let [r1, g1, b1] = stops[i + 1];
        Rgba8::rgb(r0, g0, b0).lerp(Rgba8::rgb(r1, g1, b1), f)
    }
}

/// A color map plus orientation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ColorRamp {
    /// Ramp to sample.
    pub map: ColorMap,
    /// Reverse the ramp.
    pub invert: bool,
}

impl ColorRamp {
    /// Color for the unit value `t`.
    pub fn color(self, t: f64) -> Rgba8 {
        let t = if self.invert { 1.0 - t } else { t };
        self.map.sample(t)
    }
}

#[cfg(test)]
#[path = "../../tests/unit/scene/colormap.rs"]
mod tests;
