use std::io::Read;
use std::path::Path;
use std::sync::Arc;

use anyhow::Context;

use crate::data::json::DatasetJsonAdapter;
use crate::data::model::{FieldSample, FieldValues, GridGeometry, SimulationDataset, TimeStep};
use crate::data::strain::StrainRunAdapter;
use crate::foundation::core::Vec3;
use crate::foundation::error::{VisError, VisResult};

/// A loader for one on-disk simulation output format.
///
/// Adapters are registered in an [`AdapterRegistry`]; downstream stages only ever see the
/// resulting [`SimulationDataset`].
pub trait DatasetAdapter: Send + Sync {
    /// Stable adapter name (also the `format` tag it reads).
    fn name(&self) -> &'static str;
    /// Cheap check whether `path` looks like this adapter's format.
    fn probe(&self, path: &Path) -> bool;
    /// Parse `path` into a validated dataset.
    fn load(&self, path: &Path) -> VisResult<SimulationDataset>;
}

/// Explicit input format selection.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InputFormat {
    /// Probe every registered adapter in order.
    #[default]
    Auto,
    /// `bhvis.dataset` JSON.
    Dataset,
    /// `bhvis.strain-run` JSON descriptor.
    StrainRun,
}

impl InputFormat {
    fn adapter_name(self) -> Option<&'static str> {
        match self {
            Self::Auto => None,
            Self::Dataset => Some(crate::data::json::FORMAT_TAG),
            Self::StrainRun => Some(crate::data::strain::FORMAT_TAG),
        }
    }
}

/// What to do when time-steps disagree on their sampling grid.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GridPolicy {
    /// Fail with [`VisError::GridMismatch`].
    #[default]
    Reject,
    /// Bilinearly resample every step onto step 0's grid.
    Resample,
}

/// Loader options.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoadOptions {
    /// Input format, or [`InputFormat::Auto`].
    pub format: InputFormat,
    /// Grid consistency policy.
    pub grid_policy: GridPolicy,
}

/// Ordered set of dataset adapters.
pub struct AdapterRegistry {
    adapters: Vec<Box<dyn DatasetAdapter>>,
}

impl Default for AdapterRegistry {
    fn default() -> Self {
        Self::with_builtin()
    }
}

impl AdapterRegistry {
    /// An empty registry.
    pub fn empty() -> Self {
        Self {
            adapters: Vec::new(),
        }
    }

    /// Registry with the built-in adapters (`bhvis.dataset`, `bhvis.strain-run`).
    pub fn with_builtin() -> Self {
        let mut r = Self::empty();
        r.register(Box::new(DatasetJsonAdapter));
        r.register(Box::new(StrainRunAdapter));
        r
    }

    /// Append an adapter; earlier adapters win when probing.
    pub fn register(&mut self, adapter: Box<dyn DatasetAdapter>) {
        self.adapters.push(adapter);
    }

    /// Registered adapter names in priority order.
    pub fn names(&self) -> Vec<&'static str> {
        self.adapters.iter().map(|a| a.name()).collect()
    }

    /// Resolve the adapter for `path`.
    pub fn resolve(&self, path: &Path, format: InputFormat) -> VisResult<&dyn DatasetAdapter> {
        let found = match format.adapter_name() {
            Some(name) => self.adapters.iter().find(|a| a.name() == name),
            None => self.adapters.iter().find(|a| a.probe(path)),
        };
        found.map(|a| a.as_ref()).ok_or_else(|| {
            VisError::format(format!(
                "no adapter recognizes '{}' (known: {})",
                path.display(),
                self.names().join(", ")
            ))
        })
    }

    /// Load `path` and apply the grid policy.
    #[tracing::instrument(skip(self, opts), fields(path = %path.display()))]
    pub fn load(&self, path: &Path, opts: &LoadOptions) -> VisResult<SimulationDataset> {
        let adapter = self.resolve(path, opts.format)?;
        tracing::debug!(adapter = adapter.name(), "resolved dataset adapter");
        let dataset = adapter.load(path)?;
        let dataset = harmonize_grids(dataset, opts.grid_policy)?;
        tracing::info!(
            adapter = adapter.name(),
            steps = dataset.len(),
            "dataset loaded"
        );
        Ok(dataset)
    }
}

/// Load a dataset with the built-in adapters.
pub fn load_dataset(path: &Path, opts: &LoadOptions) -> VisResult<SimulationDataset> {
    AdapterRegistry::with_builtin().load(path, opts)
}

/// Read up to `n` leading bytes of a file for probing. Failures read as empty.
pub(crate) fn sniff(path: &Path, n: u64) -> String {
    let mut buf = Vec::new();
    let read = std::fs::File::open(path)
        .with_context(|| format!("open '{}'", path.display()))
        .and_then(|f| {
            f.take(n)
                .read_to_end(&mut buf)
                .context("read probe bytes")
        });
    match read {
        Ok(_) => String::from_utf8_lossy(&buf).into_owned(),
        Err(_) => String::new(),
    }
}

/// Enforce one canonical grid across all grid-sampled steps.
pub fn harmonize_grids(
    dataset: SimulationDataset,
    policy: GridPolicy,
) -> VisResult<SimulationDataset> {
    let Some(first) = dataset.step(0) else {
        return Ok(dataset);
    };
    let reference = first.field.geometry().cloned();

    let mut needs_resample = false;
    for (idx, step) in dataset.steps().iter().enumerate().skip(1) {
        match (&reference, &step.field) {
            (Some(r), FieldSample::Grid { geometry, .. }) => {
                if !Arc::ptr_eq(r, geometry) && **r != **geometry {
                    match policy {
                        GridPolicy::Reject => {
                            return Err(VisError::grid_mismatch(format!(
                                "step {idx} (t={}) uses {:?}, step 0 uses {:?}",
                                step.time, geometry, r
                            )));
                        }
                        GridPolicy::Resample => needs_resample = true,
                    }
                }
            }
            (None, FieldSample::Points { .. }) => {}
            (_, other) => {
                return Err(VisError::grid_mismatch(format!(
                    "step {idx} is sampled on {} but step 0 is sampled on {}",
                    other.kind(),
                    first.field.kind()
                )));
            }
        }
    }

    let Some(reference) = reference else {
        return Ok(dataset);
    };
    if !needs_resample {
        return Ok(dataset);
    }

    let (metadata, steps) = dataset.into_parts();
    let mut resampled = 0usize;
    let steps = steps
        .into_iter()
        .map(|step| {
            let TimeStep {
                time,
                field,
                markers,
            } = step;
            let field = match field {
                FieldSample::Grid { geometry, values } if *geometry != *reference => {
                    resampled += 1;
                    FieldSample::Grid {
                        values: resample_values(&geometry, &values, &reference),
                        geometry: Arc::clone(&reference),
                    }
                }
                FieldSample::Grid { values, .. } => FieldSample::Grid {
                    geometry: Arc::clone(&reference),
                    values,
                },
                other => other,
            };
            TimeStep {
                time,
                field,
                markers,
            }
        })
        .collect();
    tracing::info!(resampled, "resampled time-steps onto the reference grid");
    SimulationDataset::new(metadata, steps)
}

/// Bilinear resample of `values` from `src` onto the nodes of `dst`. Outside nodes become NaN.
pub fn resample_values(
    src: &GridGeometry,
    values: &FieldValues,
    dst: &GridGeometry,
) -> FieldValues {
    let targets = dst.node_positions();
    match values {
        FieldValues::Scalar(v) => FieldValues::Scalar(
            targets
                .iter()
                .map(|p| match src.locate(p.x, p.y) {
                    Some(s) => s
                        .nodes
                        .iter()
                        .zip(s.weights)
                        .map(|(&n, w)| v[n] * w)
                        .sum(),
                    None => f64::NAN,
                })
                .collect(),
        ),
        FieldValues::Vector(v) => FieldValues::Vector(
            targets
                .iter()
                .map(|p| match src.locate(p.x, p.y) {
                    Some(s) => s
                        .nodes
                        .iter()
                        .zip(s.weights)
                        .fold(Vec3::ZERO, |acc, (&n, w)| acc + v[n] * w),
                    None => Vec3::new(f64::NAN, f64::NAN, f64::NAN),
                })
                .collect(),
        ),
    }
}

#[cfg(test)]
#[path = "../../tests/unit/data/adapter.rs"]
mod tests;
