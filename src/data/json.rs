use std::path::Path;
use std::sync::Arc;

use anyhow::Context;

use crate::data::adapter::{DatasetAdapter, sniff};
use crate::data::model::{
    DatasetMetadata, FieldSample, FieldValues, GridGeometry, SimulationDataset, TimeStep,
    TrajectoryMarker,
};
use crate::foundation::core::Vec3;
use crate::foundation::error::{VisError, VisResult};

pub(crate) const FORMAT_TAG: &str = "bhvis.dataset";
const VERSION: u32 = 1;

/// Reads self-contained `bhvis.dataset` JSON files (all steps inline).
#[derive(Clone, Copy, Debug, Default)]
pub struct DatasetJsonAdapter;

#[derive(serde::Deserialize)]
#[serde(deny_unknown_fields)]
struct DatasetFile {
    format: String,
    version: u32,
    #[serde(default)]
    metadata: DatasetMetadata,
    steps: Vec<StepDto>,
}

#[derive(serde::Deserialize)]
#[serde(deny_unknown_fields)]
struct StepDto {
    time: f64,
    field: FieldDto,
    #[serde(default)]
    markers: Vec<MarkerDto>,
}

#[derive(serde::Deserialize)]
#[serde(deny_unknown_fields)]
struct FieldDto {
    #[serde(default)]
    grid: Option<GridGeometry>,
    #[serde(default)]
    points: Option<Vec<Vec3>>,
    values: ValuesDto,
}

// `null` reads as a missing (NaN) sample.
#[derive(serde::Deserialize)]
#[serde(untagged)]
enum ValuesDto {
    Scalar(Vec<Option<f64>>),
    Vector(Vec<Option<Vec3>>),
}

#[derive(serde::Deserialize)]
#[serde(deny_unknown_fields)]
struct MarkerDto {
    label: String,
    position: Vec3,
    #[serde(default)]
    radius: Option<f64>,
    #[serde(default)]
    spin: Option<Vec3>,
}

impl From<ValuesDto> for FieldValues {
    fn from(v: ValuesDto) -> Self {
        match v {
            ValuesDto::Scalar(v) => {
                Self::Scalar(v.into_iter().map(|x| x.unwrap_or(f64::NAN)).collect())
            }
            ValuesDto::Vector(v) => Self::Vector(
                v.into_iter()
                    .map(|x| x.unwrap_or(Vec3::new(f64::NAN, f64::NAN, f64::NAN)))
                    .collect(),
            ),
        }
    }
}

impl DatasetAdapter for DatasetJsonAdapter {
    fn name(&self) -> &'static str {
        FORMAT_TAG
    }

    fn probe(&self, path: &Path) -> bool {
        sniff(path, 4096).contains(&format!("\"{FORMAT_TAG}\""))
    }

    fn load(&self, path: &Path) -> VisResult<SimulationDataset> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("read dataset '{}'", path.display()))?;
        parse_dataset(&text).map_err(|e| match e {
            VisError::Format(m) => VisError::format(format!("{}: {m}", path.display())),
            other => other,
        })
    }
}

/// Parse a `bhvis.dataset` document.
pub fn parse_dataset(text: &str) -> VisResult<SimulationDataset> {
    let file: DatasetFile =
        serde_json::from_str(text).map_err(|e| VisError::format(format!("invalid json: {e}")))?;
    if file.format != FORMAT_TAG {
        return Err(VisError::format(format!(
            "expected format '{FORMAT_TAG}', got '{}'",
            file.format
        )));
    }
    if file.version != VERSION {
        return Err(VisError::format(format!(
            "unsupported {FORMAT_TAG} version {} (expected {VERSION})",
            file.version
        )));
    }

    let mut metadata = file.metadata;
    if metadata.source.is_empty() {
        metadata.source = FORMAT_TAG.to_owned();
    }

    let mut last_geometry: Option<Arc<GridGeometry>> = None;
    let mut steps = Vec::with_capacity(file.steps.len());
    for (idx, s) in file.steps.into_iter().enumerate() {
        let values = FieldValues::from(s.field.values);
        let field = match (s.field.grid, s.field.points) {
            (Some(grid), None) => {
                // Consecutive steps on the same grid share one geometry.
                let geometry = match &last_geometry {
                    Some(g) if **g == grid => Arc::clone(g),
                    _ => Arc::new(grid),
                };
                last_geometry = Some(Arc::clone(&geometry));
                FieldSample::Grid { geometry, values }
            }
            (None, Some(positions)) => FieldSample::Points { positions, values },
            (Some(_), Some(_)) => {
                return Err(VisError::format(format!(
                    "step {idx}: field has both 'grid' and 'points'"
                )));
            }
            (None, None) => {
                return Err(VisError::incomplete(format!(
                    "step {idx}: field has neither 'grid' nor 'points'"
                )));
            }
        };
        let markers = s
            .markers
            .into_iter()
            .map(|m| TrajectoryMarker {
                label: m.label,
                position: m.position,
                radius: m.radius,
                spin: m.spin,
            })
            .collect();
        steps.push(TimeStep {
            time: s.time,
            field,
            markers,
        });
    }

    SimulationDataset::new(metadata, steps)
}

#[cfg(test)]
#[path = "../../tests/unit/data/json.rs"]
mod tests;
