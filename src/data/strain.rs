//! Strain-run adapter: synthesizes a gravitational-wave field on a mesh from an extracted strain
//! mode and attaches horizon trajectories.
//!
//! The field at node `(x, y)` and time `t` is `Re(h(t_ret) * sY_lm(pi/2, phi))` with
//! `t_ret = clamp(t - r + R_ext, t0, tf)`.

use std::f64::consts::{FRAC_PI_2, PI};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use rayon::prelude::*;
use smallvec::SmallVec;

use crate::data::adapter::{DatasetAdapter, sniff};
use crate::data::ascii::{Table, read_table};
use crate::data::model::{
    DatasetMetadata, FieldSample, FieldValues, GridGeometry, SimulationDataset, TimeStep,
    TrajectoryMarker,
};
use crate::foundation::core::Vec3;
use crate::foundation::error::{VisError, VisResult};

pub(crate) const FORMAT_TAG: &str = "bhvis.strain-run";
const VERSION: u32 = 1;

/// Reads `bhvis.strain-run` descriptors.
#[derive(Clone, Copy, Debug, Default)]
pub struct StrainRunAdapter;

/// Spherical-harmonic mode indices.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Mode {
    /// Degree `l`.
    pub l: i32,
    /// Order `m`, `|m| <= l`.
    pub m: i32,
}

/// On-disk run descriptor. Paths are relative to the descriptor.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StrainRunDescriptor {
    /// Must be `bhvis.strain-run`.
    pub format: String,
    /// Must be 1.
    pub version: u32,
    /// Strain table: `time re im`.
    pub strain: PathBuf,
    /// Optional horizon trajectory CSV.
    #[serde(default)]
    pub trajectory: Option<PathBuf>,
    /// Mesh the field is synthesized on.
    pub grid: GridGeometry,
    /// Extraction radius `R_ext` of the strain mode.
    pub extraction_radius: f64,
    /// Mode of the strain table.
    pub mode: Mode,
    /// Spin weight of the harmonic.
    #[serde(default = "default_spin_weight")]
    pub spin_weight: i32,
    /// Use every `stride`-th strain sample as a time-step (no trajectory only).
    #[serde(default = "default_stride")]
    pub stride: usize,
    /// Multiplier applied to the synthesized field.
    #[serde(default = "default_amplitude_scale")]
    pub amplitude_scale: f64,
    /// Horizon glyph radius for both markers.
    #[serde(default)]
    pub horizon_radius: Option<f64>,
    /// Extra metadata.
    #[serde(default)]
    pub metadata: DatasetMetadata,
}

fn default_spin_weight() -> i32 {
    -2
}

fn default_stride() -> usize {
    1
}

fn default_amplitude_scale() -> f64 {
    1.0
}

impl DatasetAdapter for StrainRunAdapter {
    fn name(&self) -> &'static str {
        FORMAT_TAG
    }

    fn probe(&self, path: &Path) -> bool {
        sniff(path, 4096).contains(&format!("\"{FORMAT_TAG}\""))
    }

    #[tracing::instrument(skip(self), fields(path = %path.display()))]
    fn load(&self, path: &Path) -> VisResult<SimulationDataset> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("read strain-run descriptor '{}'", path.display()))?;
        let desc: StrainRunDescriptor = serde_json::from_str(&text).map_err(|e| {
            VisError::format(format!("{}: invalid descriptor: {e}", path.display()))
        })?;
        desc.validate()?;

        let base = path.parent().unwrap_or_else(|| Path::new("."));
        let strain_path = base.join(&desc.strain);
        if !strain_path.is_file() {
            return Err(VisError::incomplete(format!(
                "strain file '{}' not found",
                strain_path.display()
            )));
        }
        let strain = StrainSeries::from_table(&read_table(&strain_path, false)?)
            .map_err(|m| VisError::format(format!("{}: {m}", strain_path.display())))?;

        let tracks = match &desc.trajectory {
            Some(rel) => {
                let p = base.join(rel);
                if !p.is_file() {
                    return Err(VisError::incomplete(format!(
                        "trajectory file '{}' referenced but not found",
                        p.display()
                    )));
                }
                let table = read_table(&p, true)?;
                tracing::debug!(columns = ?table.header, rows = table.rows.len(), "horizon table");
                Some(
                    HorizonTable::from_table(&table)
                        .map_err(|m| VisError::incomplete(format!("{}: {m}", p.display())))?,
                )
            }
            None => None,
        };

        synthesize(&desc, &strain, tracks.as_ref())
    }
}

impl StrainRunDescriptor {
    /// Check tags, mode indices and numeric parameters.
    pub fn validate(&self) -> VisResult<()> {
        if self.format != FORMAT_TAG {
            return Err(VisError::format(format!(
                "expected format '{FORMAT_TAG}', got '{}'",
                self.format
            )));
        }
        if self.version != VERSION {
            return Err(VisError::format(format!(
                "unsupported {FORMAT_TAG} version {} (expected {VERSION})",
                self.version
            )));
        }
        let Mode { l, m } = self.mode;
        if l < self.spin_weight.abs() || m.abs() > l {
            return Err(VisError::format(format!(
                "invalid mode (l={l}, m={m}) for spin weight {}",
                self.spin_weight
            )));
        }
        if self.stride == 0 {
            return Err(VisError::format("stride must be >= 1"));
        }
        if !self.extraction_radius.is_finite() || !self.amplitude_scale.is_finite() {
            return Err(VisError::format(
                "extraction_radius and amplitude_scale must be finite",
            ));
        }
        self.grid.validate()
    }
}

/// Complex number `(re, im)`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct Complex {
    pub re: f64,
    pub im: f64,
}

impl Complex {
    fn mul(self, o: Self) -> Self {
        Self {
            re: self.re * o.re - self.im * o.im,
            im: self.re * o.im + self.im * o.re,
        }
    }

    fn lerp(self, o: Self, t: f64) -> Self {
        Self {
            re: self.re + (o.re - self.re) * t,
            im: self.im + (o.im - self.im) * t,
        }
    }
}

/// Time-sorted complex strain samples.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct StrainSeries {
    times: Vec<f64>,
    values: Vec<Complex>,
}

impl StrainSeries {
    /// Build from `time re im` rows: sorted, exact duplicates dropped.
    pub(crate) fn from_table(table: &Table) -> Result<Self, String> {
        let mut rows = Vec::with_capacity(table.rows.len());
        for (line, row) in &table.rows {
            if row.len() < 3 {
                return Err(format!(
                    "line {line}: expected 'time re im', got {} column(s)",
                    row.len()
                ));
            }
            if !row[0].is_finite() {
                return Err(format!("line {line}: non-finite time"));
            }
            rows.push((
                row[0],
                Complex {
                    re: row[1],
                    im: row[2],
                },
            ));
        }
        if rows.is_empty() {
            return Err("strain table has no samples".to_owned());
        }
        rows.sort_by(|a, b| a.0.total_cmp(&b.0));

        let mut times: Vec<f64> = Vec::with_capacity(rows.len());
        let mut values: Vec<Complex> = Vec::with_capacity(rows.len());
        for (t, h) in rows {
            if times.last() == Some(&t) {
                if values.last() != Some(&h) {
                    return Err(format!("conflicting samples at duplicate time {t}"));
                }
                continue;
            }
            times.push(t);
            values.push(h);
        }
        Ok(Self { times, values })
    }

    pub(crate) fn t0(&self) -> f64 {
        self.times[0]
    }

    pub(crate) fn tf(&self) -> f64 {
        self.times[self.times.len() - 1]
    }

    /// Linear interpolation, clamped to the sampled range.
    pub(crate) fn at(&self, t: f64) -> Complex {
        let t = t.clamp(self.t0(), self.tf());
        let hi = self.times.partition_point(|&x| x < t);
        if hi == 0 {
            return self.values[0];
        }
        if hi >= self.times.len() {
            return self.values[self.values.len() - 1];
        }
        let (t0, t1) = (self.times[hi - 1], self.times[hi]);
        let u = if t1 > t0 { (t - t0) / (t1 - t0) } else { 0.0 };
        self.values[hi - 1].lerp(self.values[hi], u)
    }
}

/// Two-body horizon trajectory rows.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct HorizonTable {
    rows: Vec<HorizonRow>,
}

#[derive(Clone, Copy, Debug, PartialEq)]
struct HorizonRow {
    time: f64,
    pos: [Vec3; 2],
    spin: Option<[Vec3; 2]>,
}

impl HorizonTable {
    /// Accepts 7 columns (positions) or 13 columns (positions and angular momenta).
    pub(crate) fn from_table(table: &Table) -> Result<Self, String> {
        let mut rows = Vec::with_capacity(table.rows.len());
        for (line, r) in &table.rows {
            let v = |i: usize| Vec3::new(r[i], r[i + 1], r[i + 2]);
            let row = match r.len() {
                7 => HorizonRow {
                    time: r[0],
                    pos: [v(1), v(4)],
                    spin: None,
                },
                13 => HorizonRow {
                    time: r[0],
                    pos: [v(1), v(7)],
                    spin: Some([v(4), v(10)]),
                },
                n => return Err(format!("line {line}: expected 7 or 13 columns, got {n}")),
            };
            if !row.time.is_finite() {
                return Err(format!("line {line}: non-finite time"));
            }
            rows.push(row);
        }
        rows.sort_by(|a, b| a.time.total_cmp(&b.time));

        let mut unique: Vec<HorizonRow> = Vec::with_capacity(rows.len());
        for row in rows {
            if let Some(prev) = unique.last()
                && prev.time == row.time
            {
                if *prev != row {
                    return Err(format!("conflicting rows at duplicate time {}", row.time));
                }
                continue;
            }
            unique.push(row);
        }
        Ok(Self { rows: unique })
    }
}

/// `n!` as a float.
fn factorial(n: i32) -> f64 {
    (2..=n.max(0)).map(f64::from).product()
}

fn binomial(n: i32, k: i32) -> f64 {
    if k < 0 || k > n || n < 0 {
        return 0.0;
    }
    factorial(n) / (factorial(k) * factorial(n - k))
}

/// Spin-weighted spherical harmonic `sY_lm(theta, phi)` (Goldberg closed form).
pub(crate) fn swsh(s: i32, l: i32, m: i32, theta: f64, phi: f64) -> Complex {
    if l < s.abs() || m.abs() > l {
        return Complex { re: 0.0, im: 0.0 };
    }
    let sign = |k: i32| if k.rem_euclid(2) == 0 { 1.0 } else { -1.0 };
    let norm = sign(m)
        * (factorial(l + m) * factorial(l - m) * f64::from(2 * l + 1)
            / (4.0 * PI * factorial(l + s) * factorial(l - s)))
            .sqrt();
    let (sh, ch) = ((theta / 2.0).sin(), (theta / 2.0).cos());

    // sin^{2l}(th/2) * cot^k(th/2) == sin^{2l-k}(th/2) * cos^k(th/2)
    let mut sum = 0.0;
    for r in (m - s).max(0)..=(l - s).min(l + m) {
        let k = 2 * r + s - m;
        let term = binomial(l - s, r)
            * binomial(l + s, r + s - m)
            * sign(l - r - s)
            * sh.powi(2 * l - k)
            * ch.powi(k);
        sum += term;
    }
    let amp = norm * sum;
    let arg = f64::from(m) * phi;
    Complex {
        re: amp * arg.cos(),
        im: amp * arg.sin(),
    }
}

fn synthesize(
    desc: &StrainRunDescriptor,
    strain: &StrainSeries,
    tracks: Option<&HorizonTable>,
) -> VisResult<SimulationDataset> {
    let geometry = Arc::new(desc.grid.clone());
    let nodes = geometry.node_positions();

    // The harmonic depends only on the node's azimuth in the equatorial plane.
    let harmonics: Vec<Complex> = nodes
        .iter()
        .map(|p| {
            swsh(
                desc.spin_weight,
                desc.mode.l,
                desc.mode.m,
                FRAC_PI_2,
                p.y.atan2(p.x),
            )
        })
        .collect();
    let radii: Vec<f64> = nodes.iter().map(|p| p.x.hypot(p.y)).collect();

    let samples: Vec<(f64, Option<HorizonRow>)> = match tracks {
        Some(t) => t
            .rows
            .iter()
            .filter(|r| r.time >= strain.t0() && r.time <= strain.tf())
            .map(|r| (r.time, Some(*r)))
            .collect(),
        None => strain
            .times
            .iter()
            .step_by(desc.stride)
            .map(|&t| (t, None))
            .collect(),
    };
    if tracks.is_some() && samples.is_empty() {
        tracing::warn!(
            t0 = strain.t0(),
            tf = strain.tf(),
            "no trajectory sample falls inside the strain time range"
        );
    }

    let steps: Vec<TimeStep> = samples
        .par_iter()
        .map(|(time, row)| {
            let values = radii
                .iter()
                .zip(&harmonics)
                .map(|(&r, &y)| {
                    let t_ret = time - r + desc.extraction_radius;
                    strain.at(t_ret).mul(y).re * desc.amplitude_scale
                })
                .collect();
            let markers: SmallVec<[TrajectoryMarker; 2]> = match row {
                Some(row) => (0..2)
                    .map(|k| TrajectoryMarker {
                        label: format!("bh{}", k + 1),
                        position: row.pos[k],
                        radius: desc.horizon_radius,
                        spin: row.spin.map(|s| s[k]),
                    })
                    .collect(),
                None => SmallVec::new(),
            };
            TimeStep {
                time: *time,
                field: FieldSample::Grid {
                    geometry: Arc::clone(&geometry),
                    values: FieldValues::Scalar(values),
                },
                markers,
            }
        })
        .collect();

    let mut metadata = desc.metadata.clone();
    metadata.source = FORMAT_TAG.to_owned();
    if metadata.units.is_empty() {
        metadata.units = "M".to_owned();
    }
    if metadata.field_name.is_empty() {
        metadata.field_name = format!(
            "Re(h * {}Y_{}{})",
            desc.spin_weight, desc.mode.l, desc.mode.m
        );
    }
    metadata.extraction_radius = Some(desc.extraction_radius);

    SimulationDataset::new(metadata, steps)
}

#[cfg(test)]
#[path = "../../tests/unit/data/strain.rs"]
mod tests;
