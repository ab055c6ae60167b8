use std::sync::Arc;

use smallvec::smallvec;

use super::*;
use crate::data::model::{DatasetMetadata, FieldValues, GridGeometry, TrajectoryMarker};

fn dataset(n: usize) -> SimulationDataset {
    let geometry = Arc::new(GridGeometry::Cartesian {
        origin: [-2.0, -2.0],
        spacing: [1.0, 1.0],
        dims: [5, 5],
    });
    let steps = (0..n)
        .map(|i| {
            let t = i as f64;
            let values = geometry
                .node_positions()
                .iter()
                .map(|p| (p.x * 0.7 + p.y * 0.3 + t * 0.37).sin() * (1.0 + t))
                .collect();
            TimeStep {
                time: t,
                field: FieldSample::Grid {
                    geometry: Arc::clone(&geometry),
                    values: FieldValues::Scalar(values),
                },
                markers: smallvec![TrajectoryMarker {
                    label: "bh1".to_owned(),
                    position: Vec3::new(t.cos() * 3.0, t.sin() * 3.0, 0.0),
                    radius: None,
                    spin: None,
                }],
            }
        })
        .collect();
    SimulationDataset::new(DatasetMetadata::default(), steps).unwrap()
}

#[test]
fn result_is_independent_of_iteration_order() {
    let ds = dataset(12);
    let opts = NormalizeOpts {
        clip_percentile: Some(2.0),
        ..NormalizeOpts::default()
    };
    let forward = normalize_steps(ds.steps().iter(), &opts).unwrap();
    let reverse = normalize_steps(ds.steps().iter().rev(), &opts).unwrap();
    let mut shuffled: Vec<&TimeStep> = ds.steps().iter().collect();
    shuffled.swap(0, 7);
    shuffled.swap(3, 11);
    let shuffled = normalize_steps(shuffled.into_iter(), &opts).unwrap();
    assert_eq!(forward, reverse);
    assert_eq!(forward, shuffled);
    assert_eq!(forward, normalize(&ds, &opts).unwrap());
}

#[test]
fn empty_dataset_fails() {
    let ds = SimulationDataset::new(DatasetMetadata::default(), Vec::new()).unwrap();
    assert!(matches!(
        normalize(&ds, &NormalizeOpts::default()),
        Err(VisError::EmptyDataset(_))
    ));
}

#[test]
fn all_nan_values_fail_as_empty() {
    let step = TimeStep {
        time: 0.0,
        field: FieldSample::Points {
            positions: vec![Vec3::ZERO],
            values: FieldValues::Scalar(vec![f64::NAN]),
        },
        markers: smallvec![],
    };
    let ds = SimulationDataset::new(DatasetMetadata::default(), vec![step]).unwrap();
    assert!(matches!(
        normalize(&ds, &NormalizeOpts::default()),
        Err(VisError::EmptyDataset(_))
    ));
}

#[test]
fn domain_covers_all_steps_and_bounds_cover_markers() {
    let ds = dataset(10);
    let p = normalize(&ds, &NormalizeOpts::default()).unwrap();
    let all: Vec<f64> = ds
        .steps()
        .iter()
        .flat_map(|s| s.field.values().encoded_iter().collect::<Vec<_>>())
        .collect();
    let lo = all.iter().copied().fold(f64::INFINITY, f64::min);
    let hi = all.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    assert_eq!(p.value_domain, [lo, hi]);
    assert_eq!(p.time_range, [0.0, 9.0]);
    assert_eq!(p.step_count, 10);

    let tb = p.trajectory_bounds.unwrap();
    assert!(tb.max.x > 2.9 && tb.min.x < -2.9);
    assert!(p.spatial_bounds.min.x <= tb.min.x);
    assert!(p.spatial_bounds.max.z > 0.0 && p.spatial_bounds.min.z < 0.0);
    assert!(p.height_scale > 0.0);
    assert_eq!(p.vector_scale, 0.0);
}

#[test]
fn percentile_clip_symmetric_and_override() {
    let values: Vec<f64> = (0..100).map(|i| f64::from(i) - 20.0).collect();
    let step = TimeStep {
        time: 0.0,
        field: FieldSample::Points {
            positions: vec![Vec3::ZERO; values.len()],
            values: FieldValues::Scalar(values),
        },
        markers: smallvec![],
    };
    let ds = SimulationDataset::new(DatasetMetadata::default(), vec![step]).unwrap();

    let clipped = normalize(
        &ds,
        &NormalizeOpts {
            clip_percentile: Some(5.0),
            ..NormalizeOpts::default()
        },
    )
    .unwrap();
    assert_eq!(clipped.value_domain, [-16.0, 74.0]);
    assert_eq!(clipped.height_scale, 0.0);

    let sym = normalize(
        &ds,
        &NormalizeOpts {
            symmetric: true,
            ..NormalizeOpts::default()
        },
    )
    .unwrap();
    assert_eq!(sym.value_domain, [-79.0, 79.0]);

    let pinned = normalize(
        &ds,
        &NormalizeOpts {
            domain_override: Some([-1.0, 1.0]),
            ..NormalizeOpts::default()
        },
    )
    .unwrap();
    assert_eq!(pinned.value_domain, [-1.0, 1.0]);
    assert_eq!(pinned.unit(5.0), 1.0);
    assert_eq!(pinned.unit(0.0), 0.5);
}

#[test]
fn constant_field_domain_is_widened() {
    let step = TimeStep {
        time: 0.0,
        field: FieldSample::Points {
            positions: vec![Vec3::ZERO, Vec3::new(1.0, 0.0, 0.0)],
            values: FieldValues::Scalar(vec![3.0, 3.0]),
        },
        markers: smallvec![],
    };
    let ds = SimulationDataset::new(DatasetMetadata::default(), vec![step]).unwrap();
    let p = normalize(&ds, &NormalizeOpts::default()).unwrap();
    assert_eq!(p.value_domain, [2.5, 3.5]);
}

#[test]
fn invalid_options_are_rejected() {
    let ds = dataset(1);
    let bad = NormalizeOpts {
        clip_percentile: Some(60.0),
        ..NormalizeOpts::default()
    };
    assert!(matches!(normalize(&ds, &bad), Err(VisError::Validation(_))));
}
