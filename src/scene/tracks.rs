use crate::data::model::SimulationDataset;
use crate::foundation::core::Vec3;

/// Time-ordered path of one tracked marker.
#[derive(Clone, Debug, PartialEq)]
pub struct TrackPath {
    /// Marker label.
    pub label: String,
    /// `(time, position)` samples in increasing time.
    pub samples: Vec<(f64, Vec3)>,
}

/// Per-label marker paths, computed once per dataset and shared read-only by every scene.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Trajectories {
    paths: Vec<TrackPath>,
    max_spin: f64,
}

impl Trajectories {
    /// Collect every marker of `dataset` into per-label paths.
    pub fn from_dataset(dataset: &SimulationDataset) -> Self {
        let mut paths: Vec<TrackPath> = Vec::new();
        let mut max_spin = 0.0f64;
        for step in dataset.steps() {
            for m in &step.markers {
                if let Some(s) = m.spin
                    && s.is_finite()
                {
                    max_spin = max_spin.max(s.length());
                }
                if !m.position.is_finite() {
                    continue;
                }
                match paths.iter_mut().find(|p| p.label == m.label) {
                    Some(p) => p.samples.push((step.time, m.position)),
                    None => paths.push(TrackPath {
                        label: m.label.clone(),
                        samples: vec![(step.time, m.position)],
                    }),
                }
            }
        }
        Self { paths, max_spin }
    }

    /// All paths in first-seen order.
    pub fn paths(&self) -> &[TrackPath] {
        &self.paths
    }

    /// Largest spin magnitude over the whole run (0 when no spins).
    pub fn max_spin(&self) -> f64 {
        self.max_spin
    }

    /// Path of `label` up to time `t`, limited to the last `trail_length` time units.
    pub fn trail(&self, label: &str, t: f64, trail_length: Option<f64>) -> Vec<Vec3> {
        let Some(path) = self.paths.iter().find(|p| p.label == label) else {
            return Vec::new();
        };
        let start = trail_length.map_or(f64::NEG_INFINITY, |l| t - l);
        path.samples
            .iter()
            .filter(|(ts, _)| *ts >= start && *ts <= t)
            .map(|(_, p)| *p)
            .collect()
    }
}

#[cfg(test)]
#[path = "../../tests/unit/scene/tracks.rs"]
mod tests;
