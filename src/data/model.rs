use std::f64::consts::TAU;
use std::sync::Arc;

use smallvec::SmallVec;

use crate::foundation::core::{Aabb3, Vec3, bounds_of};
use crate::foundation::error::{VisError, VisResult};

/// Largest node count a grid may declare.
pub const MAX_GRID_NODES: usize = 1 << 26;

/// Structured 2D sampling grid in the z = 0 plane.
///
/// Nodes are addressed as `(i, j)` and stored row-major in `i`: `index = i + j * ni`.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GridGeometry {
    /// Regular lattice: node `(i, j)` sits at `origin + (i * spacing[0], j * spacing[1])`.
    Cartesian {
        /// Position of node `(0, 0)`.
        origin: [f64; 2],
        /// Node spacing along x and y.
        spacing: [f64; 2],
        /// Node counts along x and y.
        dims: [usize; 2],
    },
    /// Polar mesh: `i` walks the radius from 0 to `max_radius`, `j` walks the angle (periodic).
    Polar {
        /// Radius of the outermost ring.
        max_radius: f64,
        /// Number of radial nodes (including the center).
        radial: usize,
        /// Number of angular nodes.
        angular: usize,
    },
}

/// Bilinear sampling stencil: four node indices and their weights.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Stencil {
    /// Node indices.
    pub nodes: [usize; 4],
    /// Weights matching `nodes`, summing to one.
    pub weights: [f64; 4],
}

impl GridGeometry {
    /// Check dimensions and spacing.
    pub fn validate(&self) -> VisResult<()> {
        match *self {
            Self::Cartesian {
                origin,
                spacing,
                dims,
            } => {
                if dims[0] < 2 || dims[1] < 2 {
                    return Err(VisError::format(format!(
                        "cartesian grid needs at least 2x2 nodes, got {}x{}",
                        dims[0], dims[1]
                    )));
                }
                if !(spacing[0] > 0.0 && spacing[1] > 0.0) || !spacing.iter().all(|s| s.is_finite())
                {
                    return Err(VisError::format(
                        "cartesian grid spacing must be positive and finite",
                    ));
                }
                if !origin.iter().all(|o| o.is_finite()) {
                    return Err(VisError::format("cartesian grid origin must be finite"));
                }
            }
            Self::Polar {
                max_radius,
                radial,
                angular,
            } => {
                if radial < 2 || angular < 3 {
                    return Err(VisError::format(format!(
                        "polar grid needs radial >= 2 and angular >= 3, got {radial}x{angular}"
                    )));
                }
                if !(max_radius > 0.0 && max_radius.is_finite()) {
                    return Err(VisError::format("polar grid max_radius must be positive"));
                }
            }
        }
        let (ni, nj) = self.dims();
        match ni.checked_mul(nj) {
            Some(n) if n <= MAX_GRID_NODES => Ok(()),
            _ => Err(VisError::format(format!(
                "grid of {ni}x{nj} nodes exceeds the limit of {MAX_GRID_NODES}"
            ))),
        }
    }

    /// Node counts `(ni, nj)`.
    pub fn dims(&self) -> (usize, usize) {
        match *self {
            Self::Cartesian { dims, .. } => (dims[0], dims[1]),
            Self::Polar {
                radial, angular, ..
            } => (radial, angular),
        }
    }

    /// Total number of nodes, saturating for grids that failed [`GridGeometry::validate`].
    pub fn node_count(&self) -> usize {
        let (ni, nj) = self.dims();
        ni.saturating_mul(nj)
    }

    /// Linear storage index of node `(i, j)`.
    pub fn node_index(&self, i: usize, j: usize) -> usize {
        let (ni, _) = self.dims();
        i + j * ni
    }

    /// `true` when the `j` axis wraps around (polar angle).
    pub fn wraps_j(&self) -> bool {
        matches!(self, Self::Polar { .. })
    }

    /// World-space position of node `(i, j)` (z = 0).
    pub fn node_position(&self, i: usize, j: usize) -> Vec3 {
        match *self {
            Self::Cartesian {
                origin, spacing, ..
            } => Vec3::new(
                origin[0] + i as f64 * spacing[0],
                origin[1] + j as f64 * spacing[1],
                0.0,
            ),
            Self::Polar {
                max_radius,
                radial,
                angular,
            } => {
                let r = max_radius * i as f64 / (radial - 1) as f64;
                let theta = TAU * j as f64 / angular as f64;
                Vec3::new(r * theta.cos(), r * theta.sin(), 0.0)
            }
        }
    }

    /// All node positions in storage order.
    pub fn node_positions(&self) -> Vec<Vec3> {
        let (ni, nj) = self.dims();
        let mut out = Vec::with_capacity(ni * nj);
        for j in 0..nj {
            for i in 0..ni {
                out.push(self.node_position(i, j));
            }
        }
        out
    }

    /// Quad cells as node indices in winding order `(i,j) (i+1,j) (i+1,j+1) (i,j+1)`.
    pub fn cells(&self) -> Vec<[usize; 4]> {
        let (ni, nj) = self.dims();
        let j_cells = if self.wraps_j() { nj } else { nj - 1 };
        let mut out = Vec::with_capacity((ni - 1) * j_cells);
        for j in 0..j_cells {
            let j1 = (j + 1) % nj;
            for i in 0..ni - 1 {
                out.push([
                    self.node_index(i, j),
                    self.node_index(i + 1, j),
                    self.node_index(i + 1, j1),
                    self.node_index(i, j1),
                ]);
            }
        }
        out
    }

    /// Bilinear stencil for the world point `(x, y)`, or `None` outside the grid.
    pub fn locate(&self, x: f64, y: f64) -> Option<Stencil> {
        const EPS: f64 = 1e-9;
        if !(x.is_finite() && y.is_finite()) {
            return None;
        }
        let (ni, nj) = self.dims();
        let (fi, fj) = match *self {
            Self::Cartesian {
                origin, spacing, ..
            } => (
                (x - origin[0]) / spacing[0],
                (y - origin[1]) / spacing[1],
            ),
            Self::Polar {
                max_radius,
                radial,
                angular,
            } => {
                let r = x.hypot(y);
                let theta = y.atan2(x).rem_euclid(TAU);
                (
                    r / max_radius * (radial - 1) as f64,
                    theta / TAU * angular as f64,
                )
            }
        };

        let max_i = (ni - 1) as f64;
        if fi < -EPS || fi > max_i + EPS {
            return None;
        }
        let fi = fi.clamp(0.0, max_i);
        let i0 = (fi.floor() as usize).min(ni - 2);
        let ti = fi - i0 as f64;

        let (j0, j1, tj) = if self.wraps_j() {
            let fj = fj.rem_euclid(nj as f64);
            let j0 = (fj.floor() as usize) % nj;
            (j0, (j0 + 1) % nj, fj - fj.floor())
        } else {
            let max_j = (nj - 1) as f64;
            if fj < -EPS || fj > max_j + EPS {
                return None;
            }
            let fj = fj.clamp(0.0, max_j);
            let j0 = (fj.floor() as usize).min(nj - 2);
            (j0, j0 + 1, fj - j0 as f64)
        };

        Some(Stencil {
            nodes: [
                self.node_index(i0, j0),
                self.node_index(i0 + 1, j0),
                self.node_index(i0, j1),
                self.node_index(i0 + 1, j1),
            ],
            weights: [
                (1.0 - ti) * (1.0 - tj),
                ti * (1.0 - tj),
                (1.0 - ti) * tj,
                ti * tj,
            ],
        })
    }
}

/// Per-node sample values: scalars, or vectors encoded by magnitude.
#[derive(Clone, Debug, PartialEq)]
pub enum FieldValues {
    /// One scalar per node/point.
    Scalar(Vec<f64>),
    /// One vector per node/point.
    Vector(Vec<Vec3>),
}

impl FieldValues {
    /// Number of samples.
    pub fn len(&self) -> usize {
        match self {
            Self::Scalar(v) => v.len(),
            Self::Vector(v) => v.len(),
        }
    }

    /// `true` when there are no samples.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Scalar encoding of sample `i` (the magnitude for vectors).
    pub fn encoded(&self, i: usize) -> f64 {
        match self {
            Self::Scalar(v) => v[i],
            Self::Vector(v) => v[i].length(),
        }
    }

    /// Iterate the scalar encoding of every sample.
    pub fn encoded_iter(&self) -> impl Iterator<Item = f64> + '_ {
        (0..self.len()).map(|i| self.encoded(i))
    }

    /// `true` for vector-valued samples.
    pub fn is_vector(&self) -> bool {
        matches!(self, Self::Vector(_))
    }
}

/// One instant's field data on a grid or an unstructured point set.
#[derive(Clone, Debug, PartialEq)]
pub enum FieldSample {
    /// Values on a structured grid (geometry shared between steps).
    Grid {
        /// Sampling geometry.
        geometry: Arc<GridGeometry>,
        /// One value per grid node, in storage order.
        values: FieldValues,
    },
    /// Values on scattered points.
    Points {
        /// Point positions.
        positions: Vec<Vec3>,
        /// One value per point.
        values: FieldValues,
    },
}

impl FieldSample {
    /// Check that value counts match the geometry.
    pub fn validate(&self) -> VisResult<()> {
        match self {
            Self::Grid { geometry, values } => {
                geometry.validate()?;
                if values.len() != geometry.node_count() {
                    return Err(VisError::incomplete(format!(
                        "grid field has {} values, expected {}",
                        values.len(),
                        geometry.node_count()
                    )));
                }
            }
            Self::Points { positions, values } => {
                if positions.len() != values.len() {
                    return Err(VisError::incomplete(format!(
                        "point field has {} positions but {} values",
                        positions.len(),
                        values.len()
                    )));
                }
            }
        }
        Ok(())
    }

    /// The sample values.
    pub fn values(&self) -> &FieldValues {
        match self {
            Self::Grid { values, .. } | Self::Points { values, .. } => values,
        }
    }

    /// Base (un-displaced) positions of every sample.
    pub fn positions(&self) -> Vec<Vec3> {
        match self {
            Self::Grid { geometry, .. } => geometry.node_positions(),
            Self::Points { positions, .. } => positions.clone(),
        }
    }

    /// Grid geometry, when gridded.
    pub fn geometry(&self) -> Option<&Arc<GridGeometry>> {
        match self {
            Self::Grid { geometry, .. } => Some(geometry),
            Self::Points { .. } => None,
        }
    }

    /// Short kind name for diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Grid { .. } => "grid",
            Self::Points { .. } => "points",
        }
    }
}

/// A tracked point valid at one instant (e.g. an apparent-horizon center).
#[derive(Clone, Debug, PartialEq)]
pub struct TrajectoryMarker {
    /// Stable identity across steps (e.g. `"bh1"`).
    pub label: String,
    /// Position in simulation coordinates.
    pub position: Vec3,
    /// Glyph radius in simulation units; `None` uses the scene default.
    pub radius: Option<f64>,
    /// Optional angular-momentum vector, drawn as an arrow from `position`.
    pub spin: Option<Vec3>,
}

/// One discrete simulation instant.
#[derive(Clone, Debug, PartialEq)]
pub struct TimeStep {
    /// Simulation time.
    pub time: f64,
    /// Field sample at `time`.
    pub field: FieldSample,
    /// Trajectory markers valid at `time`.
    pub markers: SmallVec<[TrajectoryMarker; 2]>,
}

/// Source description carried through to the summary and `inspect` output.
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct DatasetMetadata {
    /// Adapter that produced the dataset.
    pub source: String,
    /// Unit system label (e.g. `"M"` for geometric units scaled by total mass).
    pub units: String,
    /// Coordinate convention label.
    pub coordinates: String,
    /// Name of the sampled quantity.
    pub field_name: String,
    /// Wave extraction radius, when the field was synthesized from extracted modes.
    pub extraction_radius: Option<f64>,
}

/// Full time-ordered collection of samples.
///
/// Invariant: step times are finite and strictly increasing.
#[derive(Clone, Debug)]
pub struct SimulationDataset {
    metadata: DatasetMetadata,
    steps: Vec<TimeStep>,
    bounds: Option<Aabb3>,
}

impl SimulationDataset {
    /// Validate and assemble a dataset.
    pub fn new(metadata: DatasetMetadata, steps: Vec<TimeStep>) -> VisResult<Self> {
        for (idx, step) in steps.iter().enumerate() {
            if !step.time.is_finite() {
                return Err(VisError::format(format!("step {idx} has a non-finite time")));
            }
            if idx > 0 && step.time <= steps[idx - 1].time {
                return Err(VisError::format(format!(
                    "step times must be strictly increasing: step {} has t={} after t={}",
                    idx,
                    step.time,
                    steps[idx - 1].time
                )));
            }
            step.field
                .validate()
                .map_err(|e| prefix_step_error(idx, e))?;
            for (k, m) in step.markers.iter().enumerate() {
                if step.markers[..k].iter().any(|o| o.label == m.label) {
                    return Err(VisError::format(format!(
                        "step {idx} has duplicate marker label '{}'",
                        m.label
                    )));
                }
            }
            if idx > 0 {
                let first = &steps[0].markers;
                let same = first.len() == step.markers.len()
                    && first
                        .iter()
                        .all(|a| step.markers.iter().any(|b| b.label == a.label));
                if !same {
                    return Err(VisError::incomplete(format!(
                        "step {idx} markers [{}] differ from step 0 markers [{}]",
                        marker_labels(&step.markers),
                        marker_labels(first)
                    )));
                }
            }
        }

        let bounds = compute_bounds(&steps);
        Ok(Self {
            metadata,
            steps,
            bounds,
        })
    }

    /// Source metadata.
    pub fn metadata(&self) -> &DatasetMetadata {
        &self.metadata
    }

    /// All steps in time order.
    pub fn steps(&self) -> &[TimeStep] {
        &self.steps
    }

    /// Step `idx`, if present.
    pub fn step(&self, idx: usize) -> Option<&TimeStep> {
        self.steps.get(idx)
    }

    /// Number of steps.
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// `true` when there are no steps.
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Union bounding box of sample positions and markers (un-displaced).
    pub fn bounds(&self) -> Option<Aabb3> {
        self.bounds
    }

    /// First and last step time.
    pub fn time_range(&self) -> Option<(f64, f64)> {
        Some((self.steps.first()?.time, self.steps.last()?.time))
    }

    pub(crate) fn into_parts(self) -> (DatasetMetadata, Vec<TimeStep>) {
        (self.metadata, self.steps)
    }
}

fn marker_labels(markers: &[TrajectoryMarker]) -> String {
    markers
        .iter()
        .map(|m| m.label.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

fn prefix_step_error(idx: usize, err: VisError) -> VisError {
    match err {
        VisError::Format(m) => VisError::format(format!("step {idx}: {m}")),
        VisError::IncompleteData(m) => VisError::incomplete(format!("step {idx}: {m}")),
        other => other,
    }
}

fn compute_bounds(steps: &[TimeStep]) -> Option<Aabb3> {
    let mut out: Option<Aabb3> = None;
    let mut last_geometry: Option<&Arc<GridGeometry>> = None;
    for step in steps {
        let field_bounds = match &step.field {
            FieldSample::Grid { geometry, .. } => {
                // Shared geometries only need to be visited once.
                if last_geometry.is_some_and(|g| Arc::ptr_eq(g, geometry)) {
                    None
                } else {
                    last_geometry = Some(geometry);
                    bounds_of(geometry.node_positions())
                }
            }
            FieldSample::Points { positions, .. } => bounds_of(positions.iter().copied()),
        };
        let marker_bounds = bounds_of(step.markers.iter().map(|m| m.position));
        for b in [field_bounds, marker_bounds].into_iter().flatten() {
            out = Some(match out {
                Some(acc) => acc.union(b),
                None => b,
            });
        }
    }
    out
}

#[cfg(test)]
#[path = "../../tests/unit/data/model.rs"]
mod tests;
